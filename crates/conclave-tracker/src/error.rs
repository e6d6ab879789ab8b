//! Tracker layer errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`TrackerError::NotFound`] | `TRACKER_NOT_FOUND` | No |
//! | [`TrackerError::AlreadyExists`] | `TRACKER_ALREADY_EXISTS` | No |
//! | [`TrackerError::CompareFailed`] | `TRACKER_COMPARE_FAILED` | Yes |
//! | [`TrackerError::Corrupt`] | `TRACKER_CORRUPT` | No |
//! | [`TrackerError::Io`] | `TRACKER_IO` | Yes |
//!
//! `CompareFailed` is normally invisible to callers: the store retries it
//! with backoff. It only surfaces once the retry cap is exhausted, at which
//! point something is genuinely wrong with the backend's write traffic.

use conclave_types::ErrorCode;
use thiserror::Error;

/// Error from the key-value backend or the tracker store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The key (or session id) does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// `create` hit an existing key.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Compare-and-swap lost the race: the stored value differs from the
    /// expected one.
    #[error("compare failed for {0}")]
    CompareFailed(String),

    /// The stored value failed to deserialize.
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Backend I/O failure.
    #[error("backend io error: {0}")]
    Io(String),
}

impl ErrorCode for TrackerError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "TRACKER_NOT_FOUND",
            Self::AlreadyExists(_) => "TRACKER_ALREADY_EXISTS",
            Self::CompareFailed(_) => "TRACKER_COMPARE_FAILED",
            Self::Corrupt { .. } => "TRACKER_CORRUPT",
            Self::Io(_) => "TRACKER_IO",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::CompareFailed(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_types::assert_error_codes;

    fn all_variants() -> Vec<TrackerError> {
        vec![
            TrackerError::NotFound("x".into()),
            TrackerError::AlreadyExists("x".into()),
            TrackerError::CompareFailed("x".into()),
            TrackerError::Corrupt {
                key: "x".into(),
                reason: "y".into(),
            },
            TrackerError::Io("x".into()),
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "TRACKER_");
    }

    #[test]
    fn compare_failed_is_recoverable() {
        assert!(TrackerError::CompareFailed("k".into()).is_recoverable());
        assert!(!TrackerError::NotFound("k".into()).is_recoverable());
    }
}
