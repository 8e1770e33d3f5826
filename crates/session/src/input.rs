/// Keys the reader reacts to. Everything else arrives as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// A physical input as captured by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawInput {
    Key(Key),
    Click(MouseButton),
}

/// What an input asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavAction {
    Next,
    Prev,
    First,
    Last,
    None,
}

/// How physical inputs translate into navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputMapping {
    /// Arrow keys turn pages, Home and End jump to either end.
    pub arrow_keys: bool,
    /// A left click turns forward and a right click back. Swapped when
    /// `false`, for right-to-left reading.
    pub left_click_next: bool,
}

impl Default for InputMapping {
    fn default() -> Self {
        Self { arrow_keys: true, left_click_next: true }
    }
}

impl InputMapping {
    pub fn resolve(&self, input: RawInput) -> NavAction {
        match input {
            RawInput::Key(_) if !self.arrow_keys => NavAction::None,
            RawInput::Key(Key::Right | Key::Down) => NavAction::Next,
            RawInput::Key(Key::Left | Key::Up) => NavAction::Prev,
            RawInput::Key(Key::Home) => NavAction::First,
            RawInput::Key(Key::End) => NavAction::Last,
            RawInput::Key(Key::Other) => NavAction::None,
            RawInput::Click(MouseButton::Left) if self.left_click_next => NavAction::Next,
            RawInput::Click(MouseButton::Left) => NavAction::Prev,
            RawInput::Click(MouseButton::Right) if self.left_click_next => NavAction::Prev,
            RawInput::Click(MouseButton::Right) => NavAction::Next,
            RawInput::Click(MouseButton::Middle) => NavAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DEFAULT: InputMapping = InputMapping { arrow_keys: true, left_click_next: true };
    const NO_KEYS: InputMapping = InputMapping { arrow_keys: false, left_click_next: true };
    const SWAPPED: InputMapping = InputMapping { arrow_keys: true, left_click_next: false };

    #[rstest]
    #[case(DEFAULT, RawInput::Key(Key::Right), NavAction::Next)]
    #[case(DEFAULT, RawInput::Key(Key::Down), NavAction::Next)]
    #[case(DEFAULT, RawInput::Key(Key::Left), NavAction::Prev)]
    #[case(DEFAULT, RawInput::Key(Key::Up), NavAction::Prev)]
    #[case(DEFAULT, RawInput::Key(Key::Home), NavAction::First)]
    #[case(DEFAULT, RawInput::Key(Key::End), NavAction::Last)]
    #[case(DEFAULT, RawInput::Key(Key::Other), NavAction::None)]
    #[case(DEFAULT, RawInput::Click(MouseButton::Left), NavAction::Next)]
    #[case(DEFAULT, RawInput::Click(MouseButton::Right), NavAction::Prev)]
    #[case(DEFAULT, RawInput::Click(MouseButton::Middle), NavAction::None)]
    #[case(NO_KEYS, RawInput::Key(Key::Right), NavAction::None)]
    #[case(NO_KEYS, RawInput::Key(Key::End), NavAction::None)]
    #[case(NO_KEYS, RawInput::Click(MouseButton::Left), NavAction::Next)]
    #[case(SWAPPED, RawInput::Click(MouseButton::Left), NavAction::Prev)]
    #[case(SWAPPED, RawInput::Click(MouseButton::Right), NavAction::Next)]
    #[case(SWAPPED, RawInput::Key(Key::Right), NavAction::Next)]
    fn test_resolve(#[case] mapping: InputMapping, #[case] input: RawInput, #[case] expected: NavAction) {
        assert_eq!(mapping.resolve(input), expected);
    }

    #[test]
    fn test_default_mapping() {
        assert_eq!(InputMapping::default(), DEFAULT);
    }
}
