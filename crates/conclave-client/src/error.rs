//! Client layer errors.

use conclave_types::ErrorCode;
use thiserror::Error;

/// Error from the join adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The server rejected or garbled the join handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The session stream or a control message failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The local terminal could not be driven.
    #[error("terminal error: {0}")]
    Terminal(String),

    /// A presence challenge could not be answered.
    #[error("presence challenge failed: {0}")]
    Presence(String),
}

impl ErrorCode for ClientError {
    fn code(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "CLIENT_HANDSHAKE",
            Self::Transport(_) => "CLIENT_TRANSPORT",
            Self::Terminal(_) => "CLIENT_TERMINAL",
            Self::Presence(_) => "CLIENT_PRESENCE",
        }
    }

    fn is_recoverable(&self) -> bool {
        // A missed presence challenge can be answered on the next round;
        // the rest require reconnecting.
        matches!(self, Self::Presence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[
                ClientError::Handshake("x".into()),
                ClientError::Transport("x".into()),
                ClientError::Terminal("x".into()),
                ClientError::Presence("x".into()),
            ],
            "CLIENT_",
        );
    }
}
