//! Audit event model and emitter interfaces for Conclave.
//!
//! Sessions narrate their lifetime as a stream of [`AuditEvent`]s and,
//! for tty sessions, a raw byte recording. Both destinations are
//! collaborator-provided behind [`AuditEmitter`] and [`AuditStreamer`];
//! this crate fixes the event vocabulary and ships in-memory
//! implementations for tests ([`MemoryEmitter`], [`MemoryRecording`])
//! plus the discarding default ([`NullEmitter`]).

mod emitter;
mod error;
mod event;

pub use emitter::{
    AuditEmitter, AuditStreamer, MemoryEmitter, MemoryRecording, NullEmitter, RecordingSink,
};
pub use error::AuditError;
pub use event::AuditEvent;
