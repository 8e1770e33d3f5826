//! Versioned JSON documents with atomic, retried writes.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hondana_storage::BackendHandle;
use hondana_storage::error::ErrorKind as StorageErrorKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Envelope version written by this build.
pub const DOCUMENT_VERSION: u32 = 1;
const WRITE_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// One JSON document in a storage backend, wrapped as
/// `{"version":1,"data":...}`.
///
/// Unknown fields inside `data` are ignored on load as long as the payload
/// type does not deny them.
#[derive(Clone)]
pub struct Document {
    backend: BackendHandle,
    path: PathBuf,
}

impl Document {
    pub fn new(backend: BackendHandle, path: impl Into<PathBuf>) -> Self {
        Self { backend, path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the payload, or its default when the document does not exist yet.
    pub async fn load<T: DeserializeOwned + Default>(&self) -> Result<T> {
        let bytes = match self.backend.read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {
                debug!(document = %self.path.display(), "document missing, starting empty");
                return Ok(T::default());
            },
            Err(err) => return Err(err.raise(ErrorKind::ReadFailure(self.path.clone()))),
        };
        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Corrupt(self.path.clone()))?;
        if envelope.version > DOCUMENT_VERSION {
            exn::bail!(ErrorKind::UnsupportedVersion(envelope.version));
        }
        Ok(envelope.data)
    }

    /// Replace the document with `data`.
    ///
    /// Failed writes are retried with doubling backoff; after the last
    /// attempt the storage error is raised as
    /// [`WriteFailure`](ErrorKind::WriteFailure).
    pub async fn save<T: Serialize>(&self, data: &T) -> Result<()> {
        let envelope = EnvelopeRef { version: DOCUMENT_VERSION, data };
        let bytes = serde_json::to_vec_pretty(&envelope).or_raise(|| ErrorKind::WriteFailure(self.path.clone()))?;
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.backend.write(&self.path, &bytes).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < WRITE_ATTEMPTS && err.is_retryable() => {
                    warn!(document = %self.path.display(), attempt, error = %err, "write failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                },
                Err(err) => return Err(err.raise(ErrorKind::WriteFailure(self.path.clone()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hondana_storage::backend::{LocalBackend, MockBackend};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn document(backend: &Arc<MockBackend>) -> Document {
        Document::new(Arc::clone(backend) as BackendHandle, "state.json")
    }

    #[tokio::test]
    async fn test_missing_document_is_default() {
        let backend = Arc::new(MockBackend::default());
        let loaded: Vec<String> = document(&backend).load().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_envelope_format() {
        let backend = Arc::new(MockBackend::default());
        document(&backend).save(&vec!["a".to_string()]).await.unwrap();
        let raw = backend.contents("state.json").await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value, serde_json::json!({"version": 1, "data": ["a"]}));
    }

    #[tokio::test]
    async fn test_unknown_fields_ignored() {
        let backend = Arc::new(MockBackend::with_files([(
            "state.json",
            br#"{"version":1,"written_by":"future","data":{"a":1}}"#.to_vec(),
        )]));
        let loaded: BTreeMap<String, u32> = document(&backend).load().await.unwrap();
        assert_eq!(loaded.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn test_corrupt_and_future_documents() {
        let backend = Arc::new(MockBackend::with_files([("state.json", b"{not json".to_vec())]));
        let err = document(&backend).load::<Vec<String>>().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Corrupt(_)));

        let backend = Arc::new(MockBackend::with_files([("state.json", br#"{"version":2,"data":[]}"#.to_vec())]));
        let err = document(&backend).load::<Vec<String>>().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedVersion(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_retries_then_succeeds() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_next_writes(2);
        document(&backend).save(&vec![1u32]).await.unwrap();
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_gives_up_after_three_attempts() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_next_writes(3);
        let err = document(&backend).save(&vec![1u32]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::WriteFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(backend.write_count(), 0);
        assert!(backend.contents("state.json").await.is_none());
    }

    #[tokio::test]
    async fn test_local_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let backend: BackendHandle = Arc::new(LocalBackend::new("state", temp.path()).unwrap());
        let document = Document::new(backend, "favorites.json");
        document.save(&vec!["x".to_string()]).await.unwrap();
        document.save(&vec!["y".to_string()]).await.unwrap();
        let loaded: Vec<String> = document.load().await.unwrap();
        assert_eq!(loaded, vec!["y".to_string()]);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
