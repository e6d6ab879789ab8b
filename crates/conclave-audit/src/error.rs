//! Audit layer errors.
//!
//! Audit failures are deliberately low-stakes: the orchestrator logs them
//! and moves on. They are still typed so sinks can report what went wrong.

use conclave_types::ErrorCode;
use thiserror::Error;

/// Error from an audit emitter or recording sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// The event or chunk could not be delivered to the stream.
    #[error("audit stream error: {0}")]
    Stream(String),

    /// The sink was already closed.
    #[error("audit sink closed")]
    Closed,
}

impl ErrorCode for AuditError {
    fn code(&self) -> &'static str {
        match self {
            Self::Stream(_) => "AUDIT_STREAM",
            Self::Closed => "AUDIT_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        // A stream hiccup may clear; a closed sink stays closed.
        matches!(self, Self::Stream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[AuditError::Stream("x".into()), AuditError::Closed],
            "AUDIT_",
        );
    }

    #[test]
    fn stream_errors_are_recoverable() {
        assert!(AuditError::Stream("x".into()).is_recoverable());
        assert!(!AuditError::Closed.is_recoverable());
    }
}
