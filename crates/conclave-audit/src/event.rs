//! Audit events emitted over a session's lifetime.
//!
//! The wire encoding belongs to the collaborator behind
//! [`AuditEmitter`](crate::AuditEmitter); this module only fixes the event
//! names and their minimum payloads. The serde representation is an
//! internally tagged enum so a JSON sink produces one self-describing
//! object per event.

use chrono::{DateTime, Utc};
use conclave_types::{SessionId, SessionKind, SessionMode, TerminalSize};
use serde::{Deserialize, Serialize};

/// One audit event.
///
/// | Variant | When |
/// |---------|------|
/// | `SessionStart` | tty launch |
/// | `SessionJoin` | a party joined |
/// | `SessionLeave` | a party left |
/// | `Resize` | the terminal was resized |
/// | `SessionData` | tty end, byte counters |
/// | `SessionEnd` | tty end, roster and timing |
/// | `Exec` | non-tty end |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    SessionStart {
        session_id: SessionId,
        kind: SessionKind,
        user: String,
        login: String,
        /// MFA device identifier when the initiator was MFA-verified.
        mfa: bool,
        initial_command: Vec<String>,
        /// Pod name for kubernetes sessions; empty for ssh.
        #[serde(default, skip_serializing_if = "String::is_empty")]
        pod_name: String,
    },

    SessionJoin {
        session_id: SessionId,
        user: String,
        mode: SessionMode,
    },

    SessionLeave {
        session_id: SessionId,
        user: String,
    },

    Resize {
        session_id: SessionId,
        size: TerminalSize,
    },

    SessionData {
        session_id: SessionId,
        /// Bytes transmitted from participants to the execution backend.
        bytes_tx: u64,
        /// Bytes received from the backend by participants.
        bytes_rx: u64,
    },

    SessionEnd {
        session_id: SessionId,
        /// Every user that was ever part of the session.
        participants: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    Exec {
        session_id: SessionId,
        command: String,
        /// Exit code when the backend reported one.
        exit_code: Option<i32>,
        /// Terminal error carried by the session, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AuditEvent {
    /// The session this event belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::SessionStart { session_id, .. }
            | Self::SessionJoin { session_id, .. }
            | Self::SessionLeave { session_id, .. }
            | Self::Resize { session_id, .. }
            | Self::SessionData { session_id, .. }
            | Self::SessionEnd { session_id, .. }
            | Self::Exec { session_id, .. } => *session_id,
        }
    }

    /// Stable event name, as used in the wire tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::SessionJoin { .. } => "session_join",
            Self::SessionLeave { .. } => "session_leave",
            Self::Resize { .. } => "resize",
            Self::SessionData { .. } => "session_data",
            Self::SessionEnd { .. } => "session_end",
            Self::Exec { .. } => "exec",
        }
    }
}
