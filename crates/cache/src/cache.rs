use crate::disk::DiskCache;
use crate::error::{ErrorKind, Result};
use crate::memory::MemoryCache;
use crate::thumbnail::{Pending, Preview, Request, Thumbnail, ThumbnailEvent, ThumbnailSource};
use crate::{DATABASE_FILE, Database};
use exn::ResultExt;
use hondana_library::VolumeId;
use hondana_render::error::ErrorKind as RenderErrorKind;
use hondana_render::{Bitmap, DecoderHandle};
use hondana_storage::backend::LocalBackend;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::path::Path;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

const EVENT_CAPACITY: usize = 64;
const MAX_DEFAULT_WORKERS: usize = 4;
const REPRESENTATIVE_PAGE: u32 = 0;

/// Immutable snapshot of the cache's tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Renders that may run at once.
    pub workers: usize,
    pub memory_entries: usize,
    /// Pixel bytes the memory tier may hold.
    pub memory_bytes: usize,
    /// Combined PNG size on disk; unbounded when `None`.
    pub disk_capacity_bytes: Option<u64>,
    /// Longest edge of a thumbnail, in pixels.
    pub max_dimension: u32,
    pub placeholder_ttl: Duration,
    pub render_timeout: Duration,
}
impl Default for CacheSettings {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            workers: workers.min(MAX_DEFAULT_WORKERS),
            memory_entries: 512,
            memory_bytes: 64 * 1024 * 1024,
            disk_capacity_bytes: None,
            max_dimension: 240,
            placeholder_ttl: Duration::from_secs(30),
            render_timeout: Duration::from_secs(30),
        }
    }
}

struct InFlight {
    source: ThumbnailSource,
    started: bool,
    /// The source changed or was invalidated while rendering; render again
    /// once done.
    requeue: bool,
    /// Ignore the disk tier on the next run.
    skip_disk: bool,
    waiters: Vec<oneshot::Sender<Thumbnail>>,
}

struct Job {
    source: ThumbnailSource,
    skip_disk: bool,
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<VolumeId>,
    in_flight: HashMap<VolumeId, InFlight>,
    closed: bool,
}

struct Inner {
    settings: CacheSettings,
    decoder: DecoderHandle,
    database: Option<Database>,
    disk: Option<DiskCache>,
    // Lock order: queue before memory.
    queue: Mutex<Queue>,
    memory: Mutex<MemoryCache>,
    /// One permit per render slot. A permit is held until the decoder
    /// returns, even when the render already timed out.
    slots: Arc<Semaphore>,
    wake: Notify,
    events: broadcast::Sender<ThumbnailEvent>,
}

/// Asynchronous thumbnail cache.
///
/// Requests are answered from the memory tier when possible, otherwise
/// queued for a fixed pool of workers. A worker consults the disk tier
/// before rendering. At most one job exists per volume; later requests for
/// the same volume attach to it and receive the same [`Thumbnail`].
///
/// Must be created inside a Tokio runtime.
pub struct ThumbnailCache {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThumbnailCache {
    /// Open a cache persisting to `cache_dir` (created if missing).
    pub async fn open(cache_dir: impl AsRef<Path>, decoder: DecoderHandle, settings: CacheSettings) -> Result<Self> {
        let cache_dir = cache_dir.as_ref();
        let backend = LocalBackend::new("thumbnails", cache_dir).or_raise(|| ErrorKind::Storage)?;
        let database = Database::connect(cache_dir.join(DATABASE_FILE)).await?;
        let disk = DiskCache::new(database.repository(), Arc::new(backend), settings.disk_capacity_bytes);
        Ok(Self::start(decoder, settings, Some(database), Some(disk)))
    }

    pub fn with_disk_cache(disk: DiskCache, decoder: DecoderHandle, settings: CacheSettings) -> Self {
        Self::start(decoder, settings, None, Some(disk))
    }

    /// A cache without a disk tier. Every restart renders from scratch.
    pub fn memory_only(decoder: DecoderHandle, settings: CacheSettings) -> Self {
        Self::start(decoder, settings, None, None)
    }

    fn start(
        decoder: DecoderHandle,
        settings: CacheSettings,
        database: Option<Database>,
        disk: Option<DiskCache>,
    ) -> Self {
        let entries = NonZeroUsize::new(settings.memory_entries).unwrap_or(NonZeroUsize::MIN);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            memory: Mutex::new(MemoryCache::new(entries, settings.memory_bytes)),
            slots: Arc::new(Semaphore::new(settings.workers.max(1))),
            settings,
            decoder,
            database,
            disk,
            queue: Mutex::new(Queue::default()),
            wake: Notify::new(),
            events,
        });
        let workers = (0..inner.settings.workers.max(1))
            .map(|worker| tokio::spawn(run_worker(worker, Arc::clone(&inner))))
            .collect();
        Self { inner, workers: Mutex::new(workers) }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// Ask for the thumbnail of `source`.
    ///
    /// Never blocks on I/O: a memory hit is returned immediately, anything
    /// else is queued (or attached to the job already queued for that
    /// volume). A request for a different `mtime` than the queued job
    /// updates the job; if it is already rendering, it renders again once
    /// finished and every waiter receives the newer result.
    pub fn request(&self, source: ThumbnailSource) -> Request {
        let mut guard = self.inner.queue.lock();
        let queue = &mut *guard;
        if let Some(hit) = self.inner.memory.lock().get(&source.volume_id, source.mtime, Instant::now()) {
            return Request::Ready(hit);
        }
        if queue.closed {
            return Request::Pending(Pending::closed());
        }
        let (sender, receiver) = oneshot::channel();
        match queue.in_flight.entry(source.volume_id.clone()) {
            Entry::Occupied(mut entry) => {
                let job = entry.get_mut();
                if job.source != source {
                    debug!(volume = %source.volume_id, started = job.started, "source changed for queued thumbnail");
                    job.requeue |= job.started;
                    job.source = source;
                }
                job.waiters.push(sender);
            },
            Entry::Vacant(entry) => {
                queue.jobs.push_back(source.volume_id.clone());
                entry.insert(InFlight { source, started: false, requeue: false, skip_disk: false, waiters: vec![sender] });
                self.inner.wake.notify_one();
            },
        }
        Request::Pending(Pending::new(receiver))
    }

    /// Withdraw a request no worker has picked up yet. Its waiters observe
    /// [`Cancelled`](ErrorKind::Cancelled). Returns `false` when nothing is
    /// queued for `id` or the render already started.
    pub fn cancel(&self, id: &VolumeId) -> bool {
        let mut queue = self.inner.queue.lock();
        if !queue.in_flight.get(id).is_some_and(|job| !job.started) {
            return false;
        }
        queue.in_flight.remove(id);
        queue.jobs.retain(|queued| queued != id);
        debug!(volume = %id, "thumbnail request cancelled");
        true
    }

    /// Forget every cached thumbnail of `id`, in memory and on disk.
    ///
    /// A job already queued or rendering for `id` renders afresh and
    /// skips the disk tier; the result of a render in progress is
    /// discarded.
    pub async fn invalidate(&self, id: &VolumeId) -> Result<()> {
        {
            let mut queue = self.inner.queue.lock();
            if let Some(job) = queue.in_flight.get_mut(id) {
                job.requeue |= job.started;
                job.skip_disk = true;
            }
            self.inner.memory.lock().remove(id);
        }
        if let Some(disk) = &self.inner.disk {
            disk.remove(id).await?;
        }
        debug!(volume = %id, "thumbnail invalidated");
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThumbnailEvent> {
        self.inner.events.subscribe()
    }

    /// Stop accepting requests, drop the queued ones and wait for renders
    /// already running to finish.
    pub async fn shutdown(&self) {
        let dropped = {
            let mut guard = self.inner.queue.lock();
            let queue = &mut *guard;
            queue.closed = true;
            self.inner.slots.close();
            let dropped = queue.jobs.len();
            for id in queue.jobs.drain(..) {
                queue.in_flight.remove(&id);
            }
            dropped
        };
        self.inner.wake.notify_waiters();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "thumbnail worker panicked");
            }
        }
        if let Some(database) = &self.inner.database {
            database.close().await;
        }
        debug!(dropped, "thumbnail cache shut down");
    }
}

impl Drop for ThumbnailCache {
    fn drop(&mut self) {
        self.inner.queue.lock().closed = true;
        self.inner.slots.close();
        self.inner.wake.notify_waiters();
    }
}

#[instrument(name = "thumbnail worker", skip(inner))]
async fn run_worker(worker: usize, inner: Arc<Inner>) {
    loop {
        // Waits while a timed-out render of this worker still runs.
        let Ok(slot) = Arc::clone(&inner.slots).acquire_owned().await else {
            break;
        };
        let Some(job) = inner.next_job().await else {
            break;
        };
        let thumbnail = inner.produce(&job, slot).await;
        inner.complete(&job.source.volume_id, thumbnail);
    }
    debug!("thumbnail worker stopped");
}

impl Inner {
    async fn next_job(&self) -> Option<Job> {
        loop {
            let mut notified = pin!(self.wake.notified());
            notified.as_mut().enable();
            {
                let mut guard = self.queue.lock();
                let queue = &mut *guard;
                if queue.closed {
                    return None;
                }
                while let Some(id) = queue.jobs.pop_front() {
                    if let Some(job) = queue.in_flight.get_mut(&id) {
                        job.started = true;
                        let skip_disk = std::mem::take(&mut job.skip_disk);
                        return Some(Job { source: job.source.clone(), skip_disk });
                    }
                }
            }
            notified.await;
        }
    }

    /// Disk hit, fresh render, or placeholder. Never fails.
    #[instrument(skip_all, fields(volume = %job.source.volume_id))]
    async fn produce(&self, job: &Job, slot: OwnedSemaphorePermit) -> Thumbnail {
        let source = &job.source;
        if let Some(disk) = self.disk.as_ref().filter(|_| !job.skip_disk) {
            match disk.load(&source.volume_id, source.mtime).await {
                Ok(Some((record, bitmap))) => {
                    debug!("thumbnail served from disk");
                    return Thumbnail {
                        volume_id: source.volume_id.clone(),
                        source_mtime: record.source_mtime,
                        generated_at: record.generated_at,
                        preview: Preview::Image(bitmap),
                    };
                },
                Ok(None) => {},
                Err(err) => warn!(error = ?err, "thumbnail disk lookup failed"),
            }
        }
        match self.render(source, slot).await {
            Ok(bitmap) => {
                let mut generated_at = OffsetDateTime::now_utc();
                if let Some(disk) = &self.disk {
                    match disk.store(&source.volume_id, source.mtime, &bitmap).await {
                        Ok(record) => generated_at = record.generated_at,
                        Err(err) => warn!(error = ?err, "could not persist thumbnail"),
                    }
                }
                Thumbnail {
                    volume_id: source.volume_id.clone(),
                    source_mtime: source.mtime,
                    generated_at,
                    preview: Preview::Image(bitmap),
                }
            },
            Err(err) => {
                warn!(error = ?err, "thumbnail render failed, caching placeholder");
                Thumbnail {
                    volume_id: source.volume_id.clone(),
                    source_mtime: source.mtime,
                    generated_at: OffsetDateTime::now_utc(),
                    preview: Preview::Placeholder { expires_at: Instant::now() + self.settings.placeholder_ttl },
                }
            },
        }
    }

    async fn render(&self, source: &ThumbnailSource, slot: OwnedSemaphorePermit) -> Result<Bitmap> {
        let decoder = Arc::clone(&self.decoder);
        let path = source.path.clone();
        let max_dimension = self.settings.max_dimension;
        let task = tokio::task::spawn_blocking(move || -> hondana_render::error::Result<Bitmap> {
            let _slot = slot;
            let mut document = decoder.open(&path)?;
            let count = document.page_count();
            if count == 0 {
                exn::bail!(RenderErrorKind::Unreadable(path));
            }
            document.render_page(REPRESENTATIVE_PAGE.min(count - 1))?.downscale(max_dimension)
        });
        tokio::time::timeout(self.settings.render_timeout, task)
            .await
            .or_raise(|| ErrorKind::Timeout)?
            .or_raise(|| ErrorKind::Render)?
            .or_raise(|| ErrorKind::Render)
    }

    fn complete(&self, id: &VolumeId, thumbnail: Thumbnail) {
        let waiters = {
            let mut guard = self.queue.lock();
            let queue = &mut *guard;
            let Some(job) = queue.in_flight.get_mut(id) else {
                return;
            };
            if job.requeue && !queue.closed {
                job.requeue = false;
                job.started = false;
                queue.jobs.push_front(id.clone());
                self.wake.notify_one();
                return;
            }
            let Some(job) = queue.in_flight.remove(id) else {
                return;
            };
            if job.requeue {
                // Shut down mid-render with a newer source pending.
                return;
            }
            self.memory.lock().insert(thumbnail.clone());
            job.waiters
        };
        debug!(volume = %id, waiters = waiters.len(), placeholder = thumbnail.is_placeholder(), "thumbnail ready");
        for waiter in waiters {
            // The requester may have stopped waiting.
            _ = waiter.send(thumbnail.clone());
        }
        _ = self.events.send(ThumbnailEvent::Ready(thumbnail));
    }
}
