//! The wire surface a joining client talks through.
//!
//! Concrete transports (the TLS/WebSocket proxy stream, the SSH channel)
//! live with their protocol stacks; the adapter only needs the handshake
//! pair, the output byte stream, and the resize/force-terminate control
//! channel.

use crate::ClientError;
use async_trait::async_trait;
use conclave_types::{SessionMode, TerminalSize};
use tokio::sync::mpsc;

/// What the client advertises when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientHandshake {
    pub mode: SessionMode,
}

/// What the server answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHandshake {
    /// The session enforces MFA presence; moderators must run the
    /// challenge loop.
    pub presence_required: bool,
}

/// A connected session stream.
///
/// Stream handles are take-once, claimed by the adapter's pump tasks.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Exchanges the join handshakes.
    ///
    /// # Errors
    ///
    /// [`ClientError::Handshake`] when the server rejects the join.
    async fn handshake(&self, client: ClientHandshake) -> Result<ServerHandshake, ClientError>;

    /// Claims the remote output byte stream.
    fn take_output(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>>;

    /// Claims the remote-originated resize stream.
    fn take_resize(&self) -> Option<mpsc::UnboundedReceiver<TerminalSize>>;

    /// Sends local keystrokes into the session's input stream.
    ///
    /// # Errors
    ///
    /// [`ClientError::Transport`] when the stream is gone.
    async fn send_input(&self, bytes: &[u8]) -> Result<(), ClientError>;

    /// Sends a local window size to the session.
    ///
    /// # Errors
    ///
    /// [`ClientError::Transport`] when the control message cannot be sent.
    async fn send_resize(&self, size: TerminalSize) -> Result<(), ClientError>;

    /// Sends the force-terminate control message.
    ///
    /// # Errors
    ///
    /// [`ClientError::Transport`] when the control message cannot be sent.
    async fn force_terminate(&self) -> Result<(), ClientError>;

    /// Tears the connection down. Must be idempotent.
    fn close(&self);
}
