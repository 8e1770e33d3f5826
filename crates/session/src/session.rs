use crate::error::{ErrorKind, Result};
use crate::input::{InputMapping, NavAction, RawInput};
use exn::ResultExt;
use hondana_library::VolumeId;
use hondana_render::error::ErrorKind as RenderErrorKind;
use hondana_render::{Bitmap, DecoderHandle, Document};
use hondana_store::{BookmarkStore, clamp_page};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_AUTO_ADVANCE: Duration = Duration::from_secs(10);
pub const MIN_AUTO_ADVANCE: Duration = Duration::from_secs(1);
pub const MAX_AUTO_ADVANCE: Duration = Duration::from_secs(60);
const MIN_ZOOM: f32 = 0.1;
const MAX_ZOOM: f32 = 8.0;
const DEFAULT_ZOOM: f32 = 1.5;

/// Immutable snapshot of the reader's preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub input: InputMapping,
    pub auto_advance_interval: Duration,
}
impl Default for SessionSettings {
    fn default() -> Self {
        Self { input: InputMapping::default(), auto_advance_interval: DEFAULT_AUTO_ADVANCE }
    }
}

/// Whether `interval` is an accepted auto-advance interval.
pub fn check_interval(interval: Duration) -> Result<Duration> {
    if !(MIN_AUTO_ADVANCE..=MAX_AUTO_ADVANCE).contains(&interval) {
        exn::bail!(ErrorKind::InvalidInterval(interval));
    }
    Ok(interval)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
}

/// Presentation flags. None of these touch the reading position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub zoom: f32,
    pub fit_to_window: bool,
    pub fullscreen: bool,
    pub auto_advance: bool,
}
impl Default for ViewState {
    fn default() -> Self {
        Self { zoom: DEFAULT_ZOOM, fit_to_window: true, fullscreen: false, auto_advance: false }
    }
}

/// Where the reader is in the open volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Zero-based, always below `page_count`.
    pub page: u32,
    pub page_count: u32,
}
impl Position {
    pub fn is_last(&self) -> bool {
        self.page + 1 >= self.page_count
    }
}

struct OpenVolume {
    id: VolumeId,
    path: PathBuf,
    position: Position,
    // Taken while a page renders on the blocking pool.
    document: Option<Box<dyn Document>>,
}

/// Reading a single volume.
///
/// Every page change is pushed to the [`BookmarkStore`], which debounces
/// the writes; moves that leave the page unchanged write nothing. Closing
/// the session, or opening another volume, flushes the store.
pub struct ReadingSession {
    decoder: DecoderHandle,
    bookmarks: BookmarkStore,
    settings: SessionSettings,
    state: SessionState,
    volume: Option<OpenVolume>,
    view: ViewState,
}

impl ReadingSession {
    pub fn new(decoder: DecoderHandle, bookmarks: BookmarkStore, settings: SessionSettings) -> Self {
        Self { decoder, bookmarks, settings, state: SessionState::Closed, volume: None, view: ViewState::default() }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Replace the preferences snapshot. Applies to the next input or tick.
    pub fn set_settings(&mut self, settings: SessionSettings) {
        self.settings = settings;
    }

    pub fn volume_id(&self) -> Option<&VolumeId> {
        self.volume.as_ref().map(|v| &v.id)
    }

    pub fn position(&self) -> Option<Position> {
        self.volume.as_ref().map(|v| v.position)
    }

    /// Open a volume at its bookmarked page, or the first page without one.
    ///
    /// A volume already open is closed first. Returns the starting position,
    /// whose `page_count` the caller may record in the library index.
    ///
    /// # Errors
    ///
    /// [`Unreadable`](ErrorKind::Unreadable) when the decoder cannot open
    /// the file or it has no pages. The session is then closed.
    #[instrument(skip(self, id, path), fields(volume = %id))]
    pub async fn open(&mut self, id: &VolumeId, path: impl AsRef<Path>) -> Result<Position> {
        if let Err(err) = self.close().await {
            warn!(error = ?err, "could not flush bookmarks of the previous volume");
        }
        let path = path.as_ref().to_path_buf();
        self.state = SessionState::Opening;
        let opened = Self::open_document(Arc::clone(&self.decoder), path.clone()).await;
        let (page_count, document) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                self.state = SessionState::Closed;
                return Err(err);
            },
        };
        let page = self.bookmarks.get(id).map_or(0, |b| clamp_page(i64::from(b.last_page), page_count));
        let position = Position { page, page_count };
        self.bookmarks.set(id, i64::from(page), page_count);
        self.volume = Some(OpenVolume { id: id.clone(), path, position, document: Some(document) });
        self.state = SessionState::Open;
        info!(page, page_count, "volume opened");
        Ok(position)
    }

    async fn open_document(decoder: DecoderHandle, path: PathBuf) -> Result<(u32, Box<dyn Document>)> {
        let unreadable = path.clone();
        let (page_count, document) = tokio::task::spawn_blocking(move || {
            let document = decoder.open(&path)?;
            Ok::<_, hondana_render::error::Error>((document.page_count(), document))
        })
        .await
        .or_raise(|| ErrorKind::Unreadable(unreadable.clone()))?
        .or_raise(|| ErrorKind::Unreadable(unreadable.clone()))?;
        if page_count == 0 {
            exn::bail!(ErrorKind::Unreadable(unreadable));
        }
        Ok((page_count, document))
    }

    /// Close the open volume and write its bookmark now.
    ///
    /// Closing an already closed session does nothing.
    pub async fn close(&mut self) -> Result<()> {
        self.view.auto_advance = false;
        self.state = SessionState::Closed;
        let Some(volume) = self.volume.take() else {
            return Ok(());
        };
        debug!(volume = %volume.id, page = volume.position.page, "closing volume");
        self.bookmarks.flush().await.or_raise(|| ErrorKind::Bookmarks)
    }

    /// Move to `page`, clamped into the volume.
    ///
    /// Returns whether the page changed.
    pub fn goto(&mut self, page: i64) -> Result<bool> {
        let volume = self.volume.as_mut().ok_or_else(|| exn::Exn::from(ErrorKind::NotOpen))?;
        let target = clamp_page(page, volume.position.page_count);
        if target == volume.position.page {
            return Ok(false);
        }
        volume.position.page = target;
        self.bookmarks.set(&volume.id, i64::from(target), volume.position.page_count);
        debug!(volume = %volume.id, page = target, "page changed");
        Ok(true)
    }

    pub fn next(&mut self) -> Result<bool> {
        let page = self.current_page()?;
        self.goto(i64::from(page) + 1)
    }

    pub fn prev(&mut self) -> Result<bool> {
        let page = self.current_page()?;
        self.goto(i64::from(page) - 1)
    }

    pub fn goto_first(&mut self) -> Result<bool> {
        self.goto(0)
    }

    pub fn goto_last(&mut self) -> Result<bool> {
        self.goto(i64::MAX)
    }

    fn current_page(&self) -> Result<u32> {
        self.position().map(|p| p.page).ok_or_else(|| exn::Exn::from(ErrorKind::NotOpen))
    }

    /// Translate a physical input through the current mapping.
    pub fn input_event(&self, input: RawInput) -> NavAction {
        self.settings.input.resolve(input)
    }

    pub fn apply(&mut self, action: NavAction) -> Result<bool> {
        match action {
            NavAction::Next => self.next(),
            NavAction::Prev => self.prev(),
            NavAction::First => self.goto_first(),
            NavAction::Last => self.goto_last(),
            NavAction::None => Ok(false),
        }
    }

    /// Set the zoom factor, clamped to a sane range. Non-finite values are
    /// ignored. Returns the zoom in effect.
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        if zoom.is_finite() {
            self.view.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
        self.view.zoom
    }

    pub fn toggle_fit_to_window(&mut self) -> bool {
        self.view.fit_to_window = !self.view.fit_to_window;
        self.view.fit_to_window
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.view.fullscreen = !self.view.fullscreen;
        self.view.fullscreen
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.view.auto_advance = enabled;
    }

    pub fn set_auto_advance_interval(&mut self, interval: Duration) -> Result<()> {
        self.settings.auto_advance_interval = check_interval(interval)?;
        Ok(())
    }

    /// One auto-advance step: behaves as [`next()`](Self::next) while
    /// auto-advance is on. At the last page it switches auto-advance off
    /// instead. Returns whether the page changed.
    pub fn tick(&mut self) -> Result<bool> {
        if !self.view.auto_advance {
            return Ok(false);
        }
        let Some(position) = self.position() else {
            self.view.auto_advance = false;
            return Ok(false);
        };
        if position.is_last() {
            debug!("auto-advance reached the last page");
            self.view.auto_advance = false;
            return Ok(false);
        }
        self.next()
    }

    /// Turn auto-advance on and turn pages every interval until the last
    /// page. Returns how many pages were turned.
    ///
    /// Drop the future to stop early.
    pub async fn run_auto_advance(&mut self) -> Result<u32> {
        let period = check_interval(self.settings.auto_advance_interval)?;
        if self.volume.is_none() {
            exn::bail!(ErrorKind::NotOpen);
        }
        self.view.auto_advance = true;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut turned = 0;
        loop {
            interval.tick().await;
            if !self.tick()? {
                break;
            }
            turned += 1;
        }
        Ok(turned)
    }

    /// Render the current page at its natural size on the blocking pool.
    pub async fn render_current(&mut self) -> Result<Bitmap> {
        let volume = self.volume.as_mut().ok_or_else(|| exn::Exn::from(ErrorKind::NotOpen))?;
        let page = volume.position.page;
        let document = volume.document.take();
        let decoder = Arc::clone(&self.decoder);
        let path = volume.path.clone();
        let (document, rendered) = tokio::task::spawn_blocking(move || {
            let mut document = match document {
                Some(document) => document,
                None => match decoder.open(&path) {
                    Ok(document) => document,
                    Err(err) => return (None, Err(err)),
                },
            };
            let rendered = document.render_page(page);
            (Some(document), rendered)
        })
        .await
        .or_raise(|| ErrorKind::Render(page))?;
        volume.document = document;
        rendered.map_err(|err| {
            if matches!(&*err, RenderErrorKind::Unreadable(_)) {
                err.raise(ErrorKind::Unreadable(volume.path.clone()))
            } else {
                err.raise(ErrorKind::Render(page))
            }
        })
    }
}
