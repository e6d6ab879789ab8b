//! Moderator presence attestation.
//!
//! A moderated session initiated by an MFA-verified identity demands that
//! its moderators keep proving liveness: the adapter answers a challenge
//! from the auth backend on a fixed cadence, and a moderator that stops
//! answering is ejected server-side by the presence ticker.

use crate::ClientError;
use async_trait::async_trait;
use conclave_types::SessionId;

/// Answers presence challenges against the auth backend.
///
/// One `attest` call is one full round: fetch the challenge, sign it with
/// the local MFA device, and deliver the assertion.
#[async_trait]
pub trait PresenceAuthClient: Send + Sync {
    /// Runs one challenge round for the session.
    ///
    /// # Errors
    ///
    /// [`ClientError::Presence`] when the round cannot be completed; the
    /// loop keeps trying, and the server ejects moderators whose
    /// attestations lapse.
    async fn attest(&self, session_id: SessionId) -> Result<(), ClientError>;
}
