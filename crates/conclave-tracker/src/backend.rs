//! Key-value backend abstraction.
//!
//! The tracker store is written against a minimal per-key-atomic surface so
//! it can run on anything from an in-memory map to a replicated store. No
//! cross-key transactions exist; the store layers its own consistency
//! discipline (list-first writes, CAS retries) on top.

use crate::TrackerError;
use async_trait::async_trait;

/// A per-key-atomic key-value store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Reads the value at `key`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] if the key does not exist.
    async fn get(&self, key: &str) -> Result<Vec<u8>, TrackerError>;

    /// Creates `key` with `value`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::AlreadyExists`] if the key exists.
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<(), TrackerError>;

    /// Replaces the value at `key` iff the stored value equals `expected`.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::CompareFailed`] if the stored value differs.
    /// - [`TrackerError::NotFound`] if the key does not exist.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new: Vec<u8>,
    ) -> Result<(), TrackerError>;

    /// Deletes `key`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] if the key does not exist.
    async fn delete(&self, key: &str) -> Result<(), TrackerError>;
}
