//! Emitter and recording interfaces.
//!
//! The orchestrator never talks to audit storage directly. It hands events
//! to an [`AuditEmitter`] and raw terminal output to a [`RecordingSink`];
//! both are collaborator-provided. Emit failures are the collaborator's
//! problem to report; the orchestrator logs and swallows them, so a broken
//! audit pipeline can never take a session down.

use crate::{AuditError, AuditEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Destination for audit events.
#[async_trait]
pub trait AuditEmitter: Send + Sync {
    /// Emits one event.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the event could not be delivered. The
    /// caller is expected to log and continue.
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Destination for recorded terminal output bytes.
///
/// Registered as a writer on the session's I/O hub for tty sessions, so the
/// recording sees exactly what participants saw.
pub trait RecordingSink: Send + Sync {
    /// Appends a chunk of terminal output to the recording.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the chunk could not be persisted.
    fn record(&self, chunk: &[u8]) -> Result<(), AuditError>;

    /// Finalizes the recording. Called exactly once, at session close.
    fn close(&self);
}

/// Builds recording sinks for sessions that want one.
pub trait AuditStreamer: Send + Sync {
    /// Opens a recording for the given session.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the recording cannot be opened; the
    /// session proceeds unrecorded.
    fn new_recording(
        &self,
        session_id: conclave_types::SessionId,
    ) -> Result<Arc<dyn RecordingSink>, AuditError>;
}

/// An emitter that discards every event.
///
/// The orchestrator's default until a real emitter is installed, mirroring
/// a disabled audit pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmitter;

#[async_trait]
impl AuditEmitter for NullEmitter {
    async fn emit(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// An emitter that retains every event in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryEmitter {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryEmitter {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All events emitted so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Names of all events emitted so far, in order.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(AuditEvent::name).collect()
    }
}

#[async_trait]
impl AuditEmitter for MemoryEmitter {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// A recording sink that buffers bytes in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryRecording {
    bytes: Mutex<Vec<u8>>,
    closed: Mutex<bool>,
}

impl MemoryRecording {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl RecordingSink for MemoryRecording {
    fn record(&self, chunk: &[u8]) -> Result<(), AuditError> {
        self.bytes.lock().extend_from_slice(chunk);
        Ok(())
    }

    fn close(&self) {
        *self.closed.lock() = true;
    }
}
