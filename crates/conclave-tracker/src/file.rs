//! File-backed key-value backend.
//!
//! One file per key under a base directory, written atomically (temp file,
//! then rename). Key segments map to subdirectories, so the tracker's
//! `session_tracker/<id>` keys land in a `session_tracker/` directory.
//!
//! Atomicity is process-local: a mutex serializes read-modify-write pairs
//! inside this process, and the rename keeps readers from ever observing a
//! torn value. Cross-process writers should point at separate directories.

use crate::{KvBackend, TrackerError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// A [`KvBackend`] storing each key as a file.
#[derive(Debug)]
pub struct FileBackend {
    base: PathBuf,
    // Serializes CAS and create so compare+write pairs stay atomic.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens (and creates if needed) a backend rooted at `base`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Io`] if the directory cannot be created.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, TrackerError> {
        let base = base.into();
        std::fs::create_dir_all(&base)
            .map_err(|e| TrackerError::Io(format!("create {}: {e}", base.display())))?;

        Ok(Self {
            base,
            write_lock: Mutex::new(()),
        })
    }

    /// The backing directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.base.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        path
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, TrackerError> {
        let path = self.key_path(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TrackerError::NotFound(key.to_string()))
            }
            Err(e) => Err(TrackerError::Io(format!("read {}: {e}", path.display()))),
        }
    }

    async fn write_atomic(&self, key: &str, value: &[u8]) -> Result<(), TrackerError> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TrackerError::Io(format!("mkdir {}: {e}", parent.display())))?;
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)
            .await
            .map_err(|e| TrackerError::Io(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| TrackerError::Io(format!("rename {}: {e}", path.display())))?;

        Ok(())
    }
}

#[async_trait]
impl KvBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Vec<u8>, TrackerError> {
        self.read(key).await
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<(), TrackerError> {
        let _guard = self.write_lock.lock().await;

        match self.read(key).await {
            Ok(_) => Err(TrackerError::AlreadyExists(key.to_string())),
            Err(TrackerError::NotFound(_)) => self.write_atomic(key, &value).await,
            Err(e) => Err(e),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new: Vec<u8>,
    ) -> Result<(), TrackerError> {
        let _guard = self.write_lock.lock().await;

        let current = self.read(key).await?;
        if current != expected {
            return Err(TrackerError::CompareFailed(key.to_string()));
        }

        self.write_atomic(key, &new).await
    }

    async fn delete(&self, key: &str) -> Result<(), TrackerError> {
        let _guard = self.write_lock.lock().await;

        let path = self.key_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TrackerError::NotFound(key.to_string()))
            }
            Err(e) => Err(TrackerError::Io(format!("remove {}: {e}", path.display()))),
        }
    }
}
