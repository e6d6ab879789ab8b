//! Roles and the session policies attached to them.
//!
//! A [`Role`] carries two policy sets:
//!
//! - **Require policies**: attached to the *host* user's roles; each declares
//!   a minimum count of participants matching a filter before a session of
//!   the named kinds may run, and what happens when one of them leaves.
//! - **Join policies**: attached to a *joining* user's roles; each declares
//!   which host roles (by glob pattern), session kinds, and modes that user
//!   may join with.
//!
//! Policy `kinds`, `modes`, and `on_leave` fields are kept as configured
//! strings: unknown values must surface as configuration errors at
//! evaluation time, not be silently normalized away.

use crate::TypeError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Role schema version.
///
/// Versions `V1..V4` predate moderated sessions; their presence on a host
/// role set disables access controls for SSH sessions entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleVersion {
    V1,
    V2,
    V3,
    V4,
    V5,
}

impl RoleVersion {
    /// Returns `true` for versions without moderated-session semantics.
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        !matches!(self, Self::V5)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
            Self::V4 => "v4",
            Self::V5 => "v5",
        }
    }
}

impl std::fmt::Display for RoleVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleVersion {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            "v3" => Ok(Self::V3),
            "v4" => Ok(Self::V4),
            "v5" => Ok(Self::V5),
            other => Err(TypeError::UnknownRoleVersion(other.to_string())),
        }
    }
}

/// What happens to a running session when a required participant leaves.
pub const ON_LEAVE_TERMINATE: &str = "terminate";
/// Pause the session and wait for the requirement to be met again.
pub const ON_LEAVE_PAUSE: &str = "pause";

/// A host-role-attached rule gating session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirePolicy {
    /// Boolean filter over the candidate participant's namespace
    /// (`participant.name`, `participant.roles`).
    pub filter: String,
    /// Session kinds this policy applies to; may contain `"*"`.
    pub kinds: Vec<String>,
    /// How many distinct matching participants are required.
    pub count: u32,
    /// `"terminate"` or `"pause"`; anything else is a configuration error
    /// surfaced at evaluation.
    pub on_leave: String,
}

/// A user-role-attached rule gating session join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPolicy {
    /// Glob patterns matched against host role names (`*` and `?`).
    pub roles: Vec<String>,
    /// Session kinds this policy applies to; may contain `"*"`.
    pub kinds: Vec<String>,
    /// Mode names this policy grants; may contain `"*"`.
    pub modes: Vec<String>,
}

/// A named role with its session policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub version: RoleVersion,
    #[serde(default)]
    pub require_policies: Vec<RequirePolicy>,
    #[serde(default)]
    pub join_policies: Vec<JoinPolicy>,
}

impl Role {
    /// Creates a v5 role with no policies.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: RoleVersion::V5,
            require_policies: Vec::new(),
            join_policies: Vec::new(),
        }
    }

    /// Sets the role version.
    #[must_use]
    pub fn with_version(mut self, version: RoleVersion) -> Self {
        self.version = version;
        self
    }

    /// Appends a require policy.
    #[must_use]
    pub fn with_require_policy(mut self, policy: RequirePolicy) -> Self {
        self.require_policies.push(policy);
        self
    }

    /// Appends a join policy.
    #[must_use]
    pub fn with_join_policy(mut self, policy: JoinPolicy) -> Self {
        self.join_policies.push(policy);
        self
    }
}
