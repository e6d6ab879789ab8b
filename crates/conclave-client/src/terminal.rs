//! The local terminal surface the adapter drives.

use crate::ClientError;
use async_trait::async_trait;
use conclave_types::TerminalSize;
use tokio::sync::mpsc;

/// A local terminal: raw-mode control, byte I/O, and resize events.
#[async_trait]
pub trait LocalTerminal: Send + Sync {
    /// Whether a real terminal is attached (as opposed to a pipe).
    fn is_attached(&self) -> bool;

    /// Switches raw mode on or off. A no-op when not attached.
    fn set_raw(&self, enabled: bool);

    /// Claims the keystroke stream.
    fn take_stdin(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>>;

    /// Claims the local window-resize event stream.
    fn take_resize_events(&self) -> Option<mpsc::UnboundedReceiver<TerminalSize>>;

    /// Writes remote output to the local display.
    ///
    /// # Errors
    ///
    /// [`ClientError::Terminal`] when the display is gone.
    async fn write_stdout(&self, bytes: &[u8]) -> Result<(), ClientError>;

    /// Applies a remote window size locally.
    fn apply_resize(&self, size: TerminalSize);
}
