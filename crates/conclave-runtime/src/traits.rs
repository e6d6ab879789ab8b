//! Collaborator interfaces consumed by the orchestrator.
//!
//! The orchestrator moves bytes and policy decisions between three
//! externally provided pieces: the per-party transport ([`RemoteClient`]),
//! the execution backend ([`Executor`]), and the role directory
//! ([`RoleDirectory`]). Production implementations live with their
//! transports; `crate::testing` ships channel-backed fakes.

use crate::{SessionError, SessionIo};
use async_trait::async_trait;
use conclave_types::{Role, TerminalSize};
use tokio::sync::mpsc;

/// Exit status reported by the execution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Process exit code, when the backend reported one.
    pub code: Option<i32>,
}

impl ExitStatus {
    #[must_use]
    pub fn with_code(code: i32) -> Self {
        Self { code: Some(code) }
    }
}

/// One participant's transport connection.
///
/// Stream handles are take-once: the orchestrator claims stdin, resize,
/// and force-terminate exactly once at join. `stdout` is a cloneable
/// sender and is also used for history replay.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Claims the party's input byte stream, if it has one and it has not
    /// been claimed yet.
    fn take_stdin(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>>;

    /// The party's output sink.
    fn stdout(&self) -> mpsc::UnboundedSender<Vec<u8>>;

    /// Claims the party's window-size stream.
    fn take_resize(&self) -> Option<mpsc::UnboundedReceiver<TerminalSize>>;

    /// Claims the party's force-terminate stream.
    fn take_force_terminate(&self) -> Option<mpsc::UnboundedReceiver<()>>;

    /// Applies a window size originating from another party.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] when the control message cannot be
    /// delivered.
    async fn resize(&self, size: TerminalSize) -> Result<(), SessionError>;

    /// Reports the executor's outcome to the remote end.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] when the status cannot be delivered.
    async fn send_status(&self, result: &Result<ExitStatus, SessionError>)
        -> Result<(), SessionError>;

    /// Disconnects the remote end. Must be idempotent.
    fn close(&self);
}

/// The execution backend: a remote command streamed over the session hub.
///
/// `stream` blocks for the whole life of the command; the session
/// terminates when it returns.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs the command with the hub as stdin/stdout and the merged
    /// resize queue.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] when the backend stream fails.
    async fn stream(&self, io: SessionIo, tty: bool) -> Result<ExitStatus, SessionError>;
}

/// Resolves role names to [`Role`] definitions.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Looks up one role.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotFound`] for unknown names.
    async fn get_role(&self, name: &str) -> Result<Role, SessionError>;
}

/// Resolves a list of role names, preserving order.
pub(crate) async fn resolve_roles(
    directory: &dyn RoleDirectory,
    names: &[String],
) -> Result<Vec<Role>, SessionError> {
    let mut roles = Vec::with_capacity(names.len());
    for name in names {
        roles.push(directory.get_role(name).await?);
    }
    Ok(roles)
}
