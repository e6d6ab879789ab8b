//! Live session orchestration for Conclave.
//!
//! This crate is the hub of the subsystem: it admits and removes parties,
//! drives the session lifecycle, pipes bytes between participants and the
//! execution backend, enforces moderator presence, and narrates everything
//! to the audit stream.
//!
//! # Architecture
//!
//! ```text
//!                    ┌────────────────────────────┐
//!   RemoteClient ───►│          Session           │───► AuditEmitter
//!   RemoteClient ───►│  roster · state machine    │───► TrackerStore
//!                    │  presence · expiry         │
//!                    └──────┬──────────────┬──────┘
//!                           │              │
//!                     TermManager   ResizeMultiplexer
//!                           │              │
//!                           └──► Executor ◄┘
//! ```
//!
//! Policy decisions come from `conclave-access` (called on every join and
//! leave); persistence goes through `conclave-tracker`. The transport
//! behind each [`RemoteClient`] and the backend behind [`Executor`] are
//! collaborator-provided; [`testing`] ships channel-backed fakes.

mod config;
mod error;
mod io;
mod session;
pub mod testing;
mod traits;

pub use config::SessionConfig;
pub use error::SessionError;
pub use io::{ResizeCallback, ResizeMultiplexer, SessionIo, TermManager, WriteErrorCallback};
pub use session::{
    CreateSessionRequest, JoinRequest, Party, RosterEntry, Session, SessionManager,
};
pub use traits::{Executor, ExitStatus, RemoteClient, RoleDirectory};

pub(crate) use traits::resolve_roles;
