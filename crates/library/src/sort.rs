//! Natural ordering for title and volume names.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Compare two names the way a reader expects: runs of ASCII digits compare
/// by numeric value, everything else compares case-insensitively.
///
/// Names that only differ in case or leading zeros fall back to a plain
/// byte comparison, so the order is total.
///
/// ```
/// use hondana_library::natural_cmp;
/// use std::cmp::Ordering;
/// assert_eq!(natural_cmp("vol2.pdf", "vol10.pdf"), Ordering::Less);
/// assert_eq!(natural_cmp("Vol 3", "vol 12"), Ordering::Less);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let ordering = compare_numbers(&take_digits(&mut left), &take_digits(&mut right));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            },
            (Some(x), Some(y)) => {
                let ordering = x.to_lowercase().cmp(y.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            },
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}

/// Compare digit runs of any length without parsing into an integer.
fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("vol1.pdf", "vol2.pdf", Ordering::Less)]
    #[case("vol2.pdf", "vol10.pdf", Ordering::Less)]
    #[case("vol10.pdf", "vol9.pdf", Ordering::Greater)]
    #[case("Series-A", "series-b", Ordering::Less)]
    #[case("vol007", "vol7", Ordering::Less)]
    #[case("vol", "vol1", Ordering::Less)]
    #[case("a1b2", "a1b10", Ordering::Less)]
    #[case("vol99999999999999999999999", "vol100000000000000000000000", Ordering::Less)]
    #[case("same", "same", Ordering::Equal)]
    fn test_natural_cmp(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(natural_cmp(a, b), expected);
        assert_eq!(natural_cmp(b, a), expected.reverse());
    }

    #[test]
    fn test_sorting() {
        let mut names = vec!["vol10.pdf", "Vol2.pdf", "vol1.pdf", "extra.pdf"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["extra.pdf", "vol1.pdf", "Vol2.pdf", "vol10.pdf"]);
    }
}
