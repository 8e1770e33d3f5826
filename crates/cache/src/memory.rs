use crate::thumbnail::Thumbnail;
use hondana_library::VolumeId;
use lru::LruCache;
use std::num::NonZeroUsize;
use time::OffsetDateTime;
use tokio::time::Instant;

/// Strict LRU over thumbnails, bounded by entry count and by pixel bytes.
///
/// Placeholders weigh nothing and vanish once expired.
pub(crate) struct MemoryCache {
    entries: LruCache<VolumeId, Thumbnail>,
    bytes: usize,
    max_bytes: usize,
}

impl MemoryCache {
    pub fn new(max_entries: NonZeroUsize, max_bytes: usize) -> Self {
        Self { entries: LruCache::new(max_entries), bytes: 0, max_bytes }
    }

    /// A fresh entry for `id` rendered from `mtime`, promoted to most
    /// recently used. Stale and expired entries are dropped on the way.
    pub fn get(&mut self, id: &VolumeId, mtime: OffsetDateTime, now: Instant) -> Option<Thumbnail> {
        let usable = self.entries.peek(id).map(|t| t.source_mtime == mtime && !t.is_expired(now))?;
        if !usable {
            self.remove(id);
            return None;
        }
        self.entries.get(id).cloned()
    }

    pub fn insert(&mut self, thumbnail: Thumbnail) {
        self.bytes += thumbnail.weight();
        if let Some((_, evicted)) = self.entries.push(thumbnail.volume_id.clone(), thumbnail) {
            self.bytes -= evicted.weight();
        }
        // Always keep the newest entry, even when it alone is over budget.
        while self.bytes > self.max_bytes && self.entries.len() > 1 {
            let Some((_, evicted)) = self.entries.pop_lru() else {
                break;
            };
            self.bytes -= evicted.weight();
        }
    }

    pub fn remove(&mut self, id: &VolumeId) -> bool {
        match self.entries.pop(id) {
            Some(removed) => {
                self.bytes -= removed.weight();
                true
            },
            None => false,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnail::Preview;
    use hondana_library::identify;
    use hondana_render::Bitmap;
    use std::time::Duration;

    fn vol(n: u32) -> VolumeId {
        identify(format!("/library/Series-A/vol{n}.pdf")).unwrap()
    }

    fn image(n: u32, side: u32) -> Thumbnail {
        Thumbnail {
            volume_id: vol(n),
            source_mtime: OffsetDateTime::UNIX_EPOCH,
            generated_at: OffsetDateTime::UNIX_EPOCH,
            preview: Preview::Image(Bitmap::solid(side, side, [0, 0, 0, 255]).unwrap()),
        }
    }

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_entry_limit_evicts_least_recently_used() {
        let now = Instant::now();
        let mut cache = MemoryCache::new(capacity(2), usize::MAX);
        cache.insert(image(1, 2));
        cache.insert(image(2, 2));
        assert!(cache.get(&vol(1), OffsetDateTime::UNIX_EPOCH, now).is_some());
        cache.insert(image(3, 2));
        assert!(cache.get(&vol(2), OffsetDateTime::UNIX_EPOCH, now).is_none());
        assert!(cache.get(&vol(1), OffsetDateTime::UNIX_EPOCH, now).is_some());
        assert_eq!(cache.bytes(), 2 * 16);
    }

    #[test]
    fn test_byte_budget() {
        let now = Instant::now();
        // Each 4x4 thumbnail weighs 64 bytes.
        let mut cache = MemoryCache::new(capacity(100), 150);
        for n in 1..=3 {
            cache.insert(image(n, 4));
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.bytes(), 128);
        assert!(cache.get(&vol(1), OffsetDateTime::UNIX_EPOCH, now).is_none());
    }

    #[test]
    fn test_replacing_entry_keeps_byte_count() {
        let mut cache = MemoryCache::new(capacity(4), usize::MAX);
        cache.insert(image(1, 4));
        cache.insert(image(1, 2));
        assert_eq!(cache.bytes(), 16);
        assert!(cache.remove(&vol(1)));
        assert_eq!(cache.bytes(), 0);
    }

    #[test]
    fn test_stale_mtime_is_a_miss() {
        let now = Instant::now();
        let mut cache = MemoryCache::new(capacity(4), usize::MAX);
        cache.insert(image(1, 2));
        let changed = OffsetDateTime::UNIX_EPOCH + Duration::from_secs(1);
        assert!(cache.get(&vol(1), changed, now).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_placeholder_expires() {
        let now = Instant::now();
        let mut cache = MemoryCache::new(capacity(4), usize::MAX);
        cache.insert(Thumbnail {
            preview: Preview::Placeholder { expires_at: now + Duration::from_secs(30) },
            ..image(1, 1)
        });
        assert!(cache.get(&vol(1), OffsetDateTime::UNIX_EPOCH, now).unwrap().is_placeholder());
        assert_eq!(cache.bytes(), 0);
        assert!(cache.get(&vol(1), OffsetDateTime::UNIX_EPOCH, now + Duration::from_secs(31)).is_none());
    }
}
