//! Scriptable decoder for testing.

use crate::error::{ErrorKind, Result};
use crate::{Bitmap, Decoder, Document};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct MockVolume {
    pages: u32,
    width: u32,
    height: u32,
    broken_pages: bool,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    renders: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Decoder over a table of registered paths.
///
/// Every page of a registered volume renders as a solid bitmap whose red
/// channel is the page index, so tests can tell pages apart. Unregistered
/// paths are [`Unreadable`](ErrorKind::Unreadable).
///
/// ```ignore
/// use hondana_render::{Decoder, MockDecoder};
/// use std::path::Path;
///
/// let decoder = MockDecoder::default().with_volume("/library/Series-A/vol1.pdf", 20);
/// let mut document = decoder.open(Path::new("/library/Series-A/vol1.pdf")).unwrap();
/// assert_eq!(document.page_count(), 20);
/// assert_eq!(document.render_page(3).unwrap().pixels()[0], 3);
/// ```
#[derive(Default)]
pub struct MockDecoder {
    volumes: RwLock<HashMap<PathBuf, MockVolume>>,
    delay: RwLock<Duration>,
    counters: Arc<Counters>,
}

impl MockDecoder {
    /// Register a volume with `pages` pages of 600x900 pixels.
    pub fn with_volume(self, path: impl Into<PathBuf>, pages: u32) -> Self {
        self.add_volume(path, pages);
        self
    }

    pub fn add_volume(&self, path: impl Into<PathBuf>, pages: u32) {
        let volume = MockVolume { pages, width: 600, height: 900, broken_pages: false };
        self.volumes.write().insert(path.into(), volume);
    }

    /// Register a volume that opens fine but fails to render any page.
    pub fn add_broken_volume(&self, path: impl Into<PathBuf>, pages: u32) {
        let volume = MockVolume { pages, width: 600, height: 900, broken_pages: true };
        self.volumes.write().insert(path.into(), volume);
    }

    /// Make a registered volume unreadable, as if its file were deleted.
    pub fn remove_volume(&self, path: impl AsRef<Path>) {
        self.volumes.write().remove(path.as_ref());
    }

    /// Block every page render for `delay`.
    pub fn set_render_delay(&self, delay: Duration) {
        *self.delay.write() = delay;
    }

    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn render_count(&self) -> usize {
        self.counters.renders.load(Ordering::SeqCst)
    }

    /// Most page renders ever in progress at the same time.
    pub fn peak_concurrent_renders(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }
}

impl Decoder for MockDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let volume = *self.volumes.read().get(path).ok_or_else(|| exn::Exn::from(ErrorKind::Unreadable(path.into())))?;
        Ok(Box::new(MockDocument { volume, delay: *self.delay.read(), counters: Arc::clone(&self.counters) }))
    }
}

struct MockDocument {
    volume: MockVolume,
    delay: Duration,
    counters: Arc<Counters>,
}

impl Document for MockDocument {
    fn page_count(&self) -> u32 {
        self.volume.pages
    }

    fn render_page(&mut self, index: u32) -> Result<Bitmap> {
        if index >= self.volume.pages {
            exn::bail!(ErrorKind::PageOutOfRange(index));
        }
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.renders.fetch_add(1, Ordering::SeqCst);
        if self.volume.broken_pages {
            exn::bail!(ErrorKind::Render(index));
        }
        let red = u8::try_from(index % 256).unwrap_or(0);
        Bitmap::solid(self.volume.width, self.volume.height, [red, 0, 0, 255])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_volume() {
        let decoder = MockDecoder::default().with_volume("/library/Series-A/vol1.pdf", 20);
        let mut document = decoder.open(Path::new("/library/Series-A/vol1.pdf")).unwrap();
        assert_eq!(document.page_count(), 20);
        assert_eq!(document.render_page(3).unwrap().pixels()[0], 3);
        assert!(matches!(&*document.render_page(20).unwrap_err(), ErrorKind::PageOutOfRange(20)));
        assert_eq!(decoder.open_count(), 1);
        assert_eq!(decoder.render_count(), 1);
        assert_eq!(decoder.peak_concurrent_renders(), 1);
    }

    #[test]
    fn test_unknown_and_removed_volumes_are_unreadable() {
        let decoder = MockDecoder::default().with_volume("/library/a.pdf", 1);
        assert!(matches!(&*decoder.open(Path::new("/library/b.pdf")).err().unwrap(), ErrorKind::Unreadable(_)));
        decoder.remove_volume("/library/a.pdf");
        assert!(decoder.open(Path::new("/library/a.pdf")).is_err());
    }

    #[test]
    fn test_broken_pages() {
        let decoder = MockDecoder::default();
        decoder.add_broken_volume("/library/broken.pdf", 4);
        let mut document = decoder.open(Path::new("/library/broken.pdf")).unwrap();
        assert_eq!(document.page_count(), 4);
        assert!(matches!(&*document.render_page(0).unwrap_err(), ErrorKind::Render(0)));
    }
}
