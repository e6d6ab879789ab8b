//! CAS-backed session tracker store for Conclave.
//!
//! The tracker is the *published* view of each live session (roster,
//! lifecycle state, timestamps), kept in a key-value backend so that other
//! processes (and the `conclave` CLI) can enumerate and inspect sessions
//! without touching the orchestrator.
//!
//! # Consistency model
//!
//! - A sentinel list key enumerates the session ids that exist; it is the
//!   source of truth for enumeration.
//! - Every mutation is a compare-and-swap; lost races retry with a bounded
//!   backoff loop. Per-id writes are therefore single-writer-linearizable;
//!   there is no ordering across different session ids.
//! - Removal drops list entries first and record keys second, and
//!   opportunistically collects terminated-and-aged or expired entries.
//!   A client that observed `state = terminated` must assume the record
//!   may disappear at any later point.

mod backend;
mod error;
mod file;
mod memory;
mod record;
mod store;

pub use backend::KvBackend;
pub use error::TrackerError;
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use record::{CreateTrackerRequest, TrackerParticipant, TrackerRecord};
pub use store::{TrackerConfig, TrackerStore};
