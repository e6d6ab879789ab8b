//! Session kinds, participant modes, lifecycle states, and terminal geometry.

use crate::TypeError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The interactive protocol family a session belongs to.
///
/// Policy `kinds` lists are kept as configured strings (they may contain the
/// wildcard `"*"`); a [`SessionKind`] is always concrete. Use
/// [`kind_list_matches`] to test a configured list against a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// A shell-like SSH session.
    Ssh,
    /// A Kubernetes `exec` session.
    #[serde(rename = "k8s")]
    Kubernetes,
}

impl SessionKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Kubernetes => "k8s",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh" => Ok(Self::Ssh),
            "k8s" | "kubernetes" => Ok(Self::Kubernetes),
            other => Err(TypeError::UnknownSessionKind(other.to_string())),
        }
    }
}

/// Returns `true` if a configured kind list admits `kind`.
///
/// A list admits a kind if it names it exactly or carries the wildcard `"*"`.
#[must_use]
pub fn kind_list_matches(kinds: &[String], kind: SessionKind) -> bool {
    kinds.iter().any(|k| k == kind.as_str() || k == "*")
}

/// A participant's capability profile within a session.
///
/// `Wildcard` is a legitimate *configured* value: join policies may grant
/// `"*"`, and the evaluator reports it as-is. The orchestrator compares
/// modes literally; expanding `Wildcard` into the concrete modes is the
/// client's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Shares input with the initiator.
    Peer,
    /// Read-only.
    Observer,
    /// May force-terminate; may be required to stay present.
    Moderator,
    /// Any mode; granted by policy, expanded client-side.
    #[serde(rename = "*")]
    Wildcard,
}

impl SessionMode {
    /// Returns the wire name of this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Peer => "peer",
            Self::Observer => "observer",
            Self::Moderator => "moderator",
            Self::Wildcard => "*",
        }
    }

    /// The concrete modes `Wildcard` stands for.
    #[must_use]
    pub fn concrete() -> [SessionMode; 3] {
        [Self::Peer, Self::Observer, Self::Moderator]
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "peer" => Ok(Self::Peer),
            "observer" => Ok(Self::Observer),
            "moderator" => Ok(Self::Moderator),
            "*" => Ok(Self::Wildcard),
            other => Err(TypeError::UnknownSessionMode(other.to_string())),
        }
    }
}

/// Lifecycle state of a session.
///
/// `Pending → Running` when the access requirements are fulfilled,
/// `Running → Pending` when a leave unfulfills them with a pause policy,
/// and `Terminated` is absorbing: no transition ever leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for required participants; never launched or paused.
    Pending,
    /// The executor is streaming.
    Running,
    /// Closed; final.
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// A terminal window size, in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub width: u16,
    pub height: u16,
}

impl TerminalSize {
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}
