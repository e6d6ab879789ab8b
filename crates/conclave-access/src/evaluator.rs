//! Session access evaluation.
//!
//! [`SessionAccessEvaluator`] takes the host user's roles and a session
//! kind, and answers two questions:
//!
//! - [`fulfilled_for`](SessionAccessEvaluator::fulfilled_for): may a session
//!   run with this set of participants?
//! - [`can_join`](SessionAccessEvaluator::can_join): with which modes may a
//!   given user join?
//!
//! The implementation is a deliberate brute-force scan: the number of roles
//! and policies on a session is small, and the quadratic walk keeps the
//! semantics readable.

use crate::{any_glob_matches, AccessError, Expr, FilterContext};
use conclave_types::{
    kind_list_matches, JoinPolicy, ParticipantContext, RequirePolicy, Role, SessionKind,
    SessionMode, ON_LEAVE_PAUSE, ON_LEAVE_TERMINATE,
};
use tracing::debug;

/// Session settings determined by the require policy that fulfilled the
/// session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOptions {
    /// Terminate (rather than pause) the session when a required
    /// participant leaves.
    pub terminate_on_leave: bool,
}

impl FilterContext for ParticipantContext {
    fn name(&self) -> &str {
        &self.username
    }

    fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

/// Policy decision engine for one session.
///
/// Immutable after construction; holds no locks and performs no I/O, so a
/// reference can be shared freely across the orchestrator's tasks.
#[derive(Debug, Clone)]
pub struct SessionAccessEvaluator {
    kind: SessionKind,
    requires: Vec<RequirePolicy>,
    host_roles: Vec<Role>,
}

impl SessionAccessEvaluator {
    /// Creates an evaluator for a session of `kind` hosted under
    /// `host_roles`.
    ///
    /// Require policies are collected from every host role: flat
    /// concatenation, order preserved, duplicates kept.
    #[must_use]
    pub fn new(host_roles: Vec<Role>, kind: SessionKind) -> Self {
        let requires = host_roles
            .iter()
            .flat_map(|role| role.require_policies.iter().cloned())
            .collect();

        Self {
            kind,
            requires,
            host_roles,
        }
    }

    /// The session kind this evaluator was built for.
    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Checks whether moderated-session access controls apply.
    ///
    /// SSH sessions predate moderation: a host role set containing any
    /// v1–v4 role keeps the pre-moderation behavior, as does an empty role
    /// set. Kubernetes multiparty sessions have no such history and are
    /// always governed.
    fn supports_access_controls(&self) -> bool {
        match self.kind {
            SessionKind::Ssh => {
                !self.host_roles.is_empty()
                    && self.host_roles.iter().all(|r| !r.version.is_legacy())
            }
            SessionKind::Kubernetes => true,
        }
    }

    /// Checks if a session may run with the given participants.
    ///
    /// Returns `(fulfilled, options)`. Any single require policy being
    /// satisfied is sufficient; within a policy, `count` distinct
    /// participants must match. A participant matches a policy if some
    /// join policy of theirs passes the kind gates, the require filter
    /// holds in their namespace, and one of their join policy role
    /// patterns matches a host role name.
    ///
    /// # Errors
    ///
    /// Filter syntax/type errors and unsupported `on_leave` values
    /// surface as [`AccessError`]; they never mean "allow".
    pub fn fulfilled_for(
        &self,
        participants: &[ParticipantContext],
    ) -> Result<(bool, PolicyOptions), AccessError> {
        if self.requires.is_empty() || !self.supports_access_controls() {
            return Ok((true, PolicyOptions::default()));
        }

        for require in &self.requires {
            let mut remaining = require.count;

            if remaining == 0 {
                // A zero-count policy is satisfied by anyone, including
                // the empty participant set.
                return Ok((true, on_leave_options(require)?));
            }

            for participant in participants {
                for allow in allow_policies(participant) {
                    if self.matches_require(participant, require, allow)?
                        && self.matches_join(allow)
                    {
                        remaining = remaining.saturating_sub(1);
                        break;
                    }
                }

                if remaining == 0 {
                    debug!(
                        filter = %require.filter,
                        count = require.count,
                        "require policy fulfilled"
                    );
                    return Ok((true, on_leave_options(require)?));
                }
            }
        }

        Ok((false, PolicyOptions::default()))
    }

    /// Returns the modes `user` may join this session with.
    ///
    /// An empty list means the user has no access to join at all. Modes
    /// are collected across the user's join policies in first-seen order,
    /// deduplicated, and reported as granted, including
    /// [`SessionMode::Wildcard`], which the caller compares or expands.
    ///
    /// # Errors
    ///
    /// A join policy granting an unknown mode string surfaces as
    /// [`AccessError::BadMode`].
    pub fn can_join(&self, user: &ParticipantContext) -> Result<Vec<SessionMode>, AccessError> {
        if !self.supports_access_controls() {
            return Ok(pre_access_controls_modes(self.kind));
        }

        let mut modes: Vec<SessionMode> = Vec::new();
        for allow in allow_policies(user) {
            if !self.matches_join(allow) {
                continue;
            }

            for mode_str in &allow.modes {
                let mode: SessionMode = mode_str.parse()?;
                if !modes.contains(&mode) {
                    modes.push(mode);
                }
            }
        }

        Ok(modes)
    }

    /// Kind gates plus the require filter, evaluated in the participant's
    /// namespace.
    fn matches_require(
        &self,
        participant: &ParticipantContext,
        require: &RequirePolicy,
        allow: &JoinPolicy,
    ) -> Result<bool, AccessError> {
        if !kind_list_matches(&require.kinds, self.kind)
            || !kind_list_matches(&allow.kinds, self.kind)
        {
            return Ok(false);
        }

        Expr::parse(&require.filter)?.evaluate_bool(participant)
    }

    /// Kind gate plus host-role name matching for one join policy.
    fn matches_join(&self, allow: &JoinPolicy) -> bool {
        if !kind_list_matches(&allow.kinds, self.kind) {
            return false;
        }

        self.host_roles
            .iter()
            .any(|host| any_glob_matches(&allow.roles, &host.name))
    }
}

/// The union of join policies across a participant's roles, in role order.
fn allow_policies(participant: &ParticipantContext) -> impl Iterator<Item = &JoinPolicy> {
    participant
        .roles
        .iter()
        .flat_map(|role| role.join_policies.iter())
}

fn on_leave_options(require: &RequirePolicy) -> Result<PolicyOptions, AccessError> {
    match require.on_leave.as_str() {
        ON_LEAVE_TERMINATE => Ok(PolicyOptions {
            terminate_on_leave: true,
        }),
        ON_LEAVE_PAUSE => Ok(PolicyOptions {
            terminate_on_leave: false,
        }),
        other => Err(AccessError::UnsupportedOnLeave(other.to_string())),
    }
}

/// Join modes granted before access controls existed: plain SSH joining
/// as a peer; nothing else.
fn pre_access_controls_modes(kind: SessionKind) -> Vec<SessionMode> {
    match kind {
        SessionKind::Ssh => vec![SessionMode::Peer],
        SessionKind::Kubernetes => Vec::new(),
    }
}
