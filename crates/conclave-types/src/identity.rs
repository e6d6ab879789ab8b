//! Identity of an authenticated user, as handed to the subsystem.
//!
//! Conclave never authenticates anyone. The caller passes a verified
//! [`Identity`] in; the subsystem only reads it.

use crate::Role;
use serde::{Deserialize, Serialize};

/// An authenticated user as seen by the session subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Login name.
    pub username: String,
    /// Names of the roles attached to this user; resolved to [`Role`]s
    /// through the role directory when policies are evaluated.
    pub role_names: Vec<String>,
    /// Whether this identity was verified with an MFA device. Sessions
    /// initiated by an MFA-verified identity require moderator presence.
    pub mfa_verified: bool,
}

impl Identity {
    /// Creates an identity without MFA verification.
    #[must_use]
    pub fn new(username: impl Into<String>, role_names: Vec<String>) -> Self {
        Self {
            username: username.into(),
            role_names,
            mfa_verified: false,
        }
    }

    /// Marks the identity as MFA-verified.
    #[must_use]
    pub fn with_mfa_verified(mut self) -> Self {
        self.mfa_verified = true;
        self
    }
}

/// The evaluation context for one candidate participant: who they are and
/// the resolved roles their allow policies come from.
#[derive(Debug, Clone)]
pub struct ParticipantContext {
    pub username: String,
    pub roles: Vec<Role>,
}

impl ParticipantContext {
    #[must_use]
    pub fn new(username: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            username: username.into(),
            roles,
        }
    }

    /// Names of the participant's roles, in role order.
    #[must_use]
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_defaults_to_unverified() {
        let id = Identity::new("alice", vec!["dev".into()]);
        assert!(!id.mfa_verified);
        assert!(id.with_mfa_verified().mfa_verified);
    }

    #[test]
    fn participant_context_role_names_preserve_order() {
        let ctx = ParticipantContext::new(
            "bob",
            vec![Role::new("auditor"), Role::new("dev")],
        );
        assert_eq!(ctx.role_names(), vec!["auditor", "dev"]);
    }
}
