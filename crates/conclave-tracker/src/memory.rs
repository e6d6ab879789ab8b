//! In-memory key-value backend.
//!
//! The default backend for tests and embedded single-process use. All
//! operations are atomic under one mutex, which is exactly the per-key
//! atomicity the [`KvBackend`] contract asks for.

use crate::{KvBackend, TrackerError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A [`KvBackend`] over a process-local map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys. Test helper.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Vec<u8>, TrackerError> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<(), TrackerError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Err(TrackerError::AlreadyExists(key.to_string()));
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new: Vec<u8>,
    ) -> Result<(), TrackerError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => Err(TrackerError::NotFound(key.to_string())),
            Some(current) if current.as_slice() != expected => {
                Err(TrackerError::CompareFailed(key.to_string()))
            }
            Some(_) => {
                entries.insert(key.to_string(), new);
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), TrackerError> {
        self.entries
            .lock()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))
    }
}
