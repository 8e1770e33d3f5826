use crate::error::{Error, ErrorKind, Result};
use hondana_library::{Volume, VolumeId};
use hondana_render::Bitmap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// The volume a thumbnail is requested for.
///
/// `mtime` decides freshness: a cached thumbnail rendered from a different
/// modification time is treated as a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailSource {
    pub volume_id: VolumeId,
    pub path: PathBuf,
    pub mtime: OffsetDateTime,
}
impl From<&Volume> for ThumbnailSource {
    fn from(volume: &Volume) -> Self {
        Self { volume_id: volume.id.clone(), path: volume.path.clone(), mtime: volume.mtime }
    }
}

#[derive(Debug, Clone)]
pub enum Preview {
    Image(Bitmap),
    /// Rendering failed. Cached in memory only, until `expires_at`.
    Placeholder { expires_at: Instant },
}

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub volume_id: VolumeId,
    pub source_mtime: OffsetDateTime,
    pub generated_at: OffsetDateTime,
    pub preview: Preview,
}
impl Thumbnail {
    pub fn bitmap(&self) -> Option<&Bitmap> {
        match &self.preview {
            Preview::Image(bitmap) => Some(bitmap),
            Preview::Placeholder { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.preview, Preview::Placeholder { .. })
    }

    /// Bytes this entry counts against the memory budget.
    pub(crate) fn weight(&self) -> usize {
        self.bitmap().map_or(0, Bitmap::byte_len)
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        matches!(self.preview, Preview::Placeholder { expires_at } if expires_at <= now)
    }
}

/// Broadcast to every [`subscribe()`](crate::ThumbnailCache::subscribe)r.
#[derive(Debug, Clone)]
pub enum ThumbnailEvent {
    /// A worker finished a request, with a real preview or a placeholder.
    Ready(Thumbnail),
}

/// Outcome of [`ThumbnailCache::request()`](crate::ThumbnailCache::request).
#[derive(Debug)]
pub enum Request {
    /// Served from the memory cache without touching a worker.
    Ready(Thumbnail),
    /// Queued or attached to an identical in-flight job.
    Pending(Pending),
}
impl Request {
    /// Wait for the thumbnail, whichever way it arrives.
    pub async fn resolve(self) -> Result<Thumbnail> {
        match self {
            Self::Ready(thumbnail) => Ok(thumbnail),
            Self::Pending(pending) => pending.await,
        }
    }
}

/// Completion of a queued request.
///
/// Resolves to [`Cancelled`](ErrorKind::Cancelled) when the request was
/// cancelled or dropped by shutdown before a worker picked it up.
/// Dropping a `Pending` does not cancel the job.
#[derive(Debug)]
pub struct Pending {
    receiver: Option<oneshot::Receiver<Thumbnail>>,
}
impl Pending {
    pub(crate) fn new(receiver: oneshot::Receiver<Thumbnail>) -> Self {
        Self { receiver: Some(receiver) }
    }

    pub(crate) fn closed() -> Self {
        Self { receiver: None }
    }
}
impl Future for Pending {
    type Output = Result<Thumbnail>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Poll::Ready(Err(Error::from(ErrorKind::Closed)));
        };
        Pin::new(receiver).poll(cx).map(|result| result.map_err(|_| Error::from(ErrorKind::Cancelled)))
    }
}
