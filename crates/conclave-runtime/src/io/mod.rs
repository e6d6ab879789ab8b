//! Session I/O plumbing: the terminal fan-out hub and the merged resize
//! queue, plus the handle the executor streams through.

mod resize;
mod term;

pub use resize::{ResizeCallback, ResizeMultiplexer};
pub use term::{TermManager, WriteErrorCallback};

use conclave_types::TerminalSize;
use std::sync::Arc;

/// The executor's view of a session: merged stdin, fan-out stdout, and
/// the merged resize queue.
#[derive(Clone)]
pub struct SessionIo {
    term: Arc<TermManager>,
    resize: Arc<ResizeMultiplexer>,
}

impl SessionIo {
    #[must_use]
    pub fn new(term: Arc<TermManager>, resize: Arc<ResizeMultiplexer>) -> Self {
        Self { term, resize }
    }

    /// Reads merged participant input. Returns 0 once the session closes.
    pub async fn read_input(&self, buf: &mut [u8]) -> usize {
        self.term.read_input(buf).await
    }

    /// Writes backend output to every participant.
    pub async fn write_output(&self, chunk: &[u8]) -> usize {
        self.term.write_output(chunk).await
    }

    /// The next merged window size, or `None` once the session closes.
    pub async fn next_resize(&self) -> Option<TerminalSize> {
        self.resize.next().await
    }
}
