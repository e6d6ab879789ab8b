//! Runtime layer errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`SessionError::AccessDenied`] | `SESSION_ACCESS_DENIED` | No |
//! | [`SessionError::NotFound`] | `SESSION_NOT_FOUND` | No |
//! | [`SessionError::Terminated`] | `SESSION_TERMINATED` | No |
//! | [`SessionError::Policy`] | `SESSION_POLICY` | No |
//! | [`SessionError::Tracker`] | `SESSION_TRACKER` | Varies |
//! | [`SessionError::Transport`] | `SESSION_TRANSPORT` | No |
//!
//! Join and leave failures report upward and leave the session alive;
//! transport failures are fatal to the session and trigger close.

use conclave_access::AccessError;
use conclave_tracker::TrackerError;
use conclave_types::ErrorCode;
use thiserror::Error;

/// Error from the session orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The user may not join or launch with the requested parameters.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Unknown session, party, or role.
    #[error("{0} not found")]
    NotFound(String),

    /// The session has already terminated.
    #[error("session terminated")]
    Terminated,

    /// Policy evaluation failed; surfaced, never treated as "allow".
    #[error(transparent)]
    Policy(#[from] AccessError),

    /// Tracker store failure.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Transport or execution backend failure; fatal to the session.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::AccessDenied(_) => "SESSION_ACCESS_DENIED",
            Self::NotFound(_) => "SESSION_NOT_FOUND",
            Self::Terminated => "SESSION_TERMINATED",
            Self::Policy(_) => "SESSION_POLICY",
            Self::Tracker(_) => "SESSION_TRACKER",
            Self::Transport(_) => "SESSION_TRANSPORT",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Tracker(inner) => inner.is_recoverable(),
            _ => false,
        }
    }
}
