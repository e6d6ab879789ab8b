//! The persisted view of a live session.

use chrono::{DateTime, Utc};
use conclave_types::{PartyId, Role, SessionId, SessionKind, SessionMode, SessionState};
use serde::{Deserialize, Serialize};

/// One participant as recorded in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerParticipant {
    pub id: PartyId,
    pub user: String,
    /// Mode within the session; the initiator predates any mode choice.
    pub mode: Option<SessionMode>,
    /// Last presence attestation (or join time before any attestation).
    pub last_active: DateTime<Utc>,
}

impl TrackerParticipant {
    #[must_use]
    pub fn new(id: PartyId, user: impl Into<String>, mode: Option<SessionMode>) -> Self {
        Self {
            id,
            user: user.into(),
            mode,
            last_active: Utc::now(),
        }
    }
}

/// The tracker record for one session.
///
/// The record is the *published* roster and state; the orchestrator's
/// in-memory view leads it by at most one CAS round-trip. Once `state` is
/// [`SessionState::Terminated`] the record may disappear at any later
/// point (GC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRecord {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub state: SessionState,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    /// Target host, or pod name for kubernetes sessions.
    pub hostname: String,
    pub login: String,
    pub host_user: String,
    /// The host roles the session's evaluator was built from: exactly the
    /// converted roles, nothing more.
    pub host_roles: Vec<Role>,
    pub participants: Vec<TrackerParticipant>,
}

impl TrackerRecord {
    /// Refreshes `last_active` for every participant entry of `user`.
    pub fn update_presence(&mut self, user: &str, now: DateTime<Utc>) {
        for participant in &mut self.participants {
            if participant.user == user {
                participant.last_active = now;
            }
        }
    }

    /// Appends a participant.
    pub fn add_participant(&mut self, participant: TrackerParticipant) {
        self.participants.push(participant);
    }

    /// Removes the participant with the given party id, if present.
    pub fn remove_participant(&mut self, id: PartyId) {
        self.participants.retain(|p| p.id != id);
    }
}

/// Everything the store needs to create a tracker record.
#[derive(Debug, Clone)]
pub struct CreateTrackerRequest {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub hostname: String,
    pub login: String,
    pub host_user: String,
    pub host_roles: Vec<Role>,
    pub initiator: TrackerParticipant,
    pub expires: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> TrackerRecord {
        let now = Utc::now();
        TrackerRecord {
            session_id: SessionId::new(),
            kind: SessionKind::Ssh,
            state: SessionState::Pending,
            created: now,
            expires: now + Duration::hours(24),
            hostname: "node-1".into(),
            login: "root".into(),
            host_user: "alice".into(),
            host_roles: vec![Role::new("host")],
            participants: vec![TrackerParticipant::new(PartyId::new(), "alice", None)],
        }
    }

    #[test]
    fn update_presence_touches_only_named_user() {
        let mut rec = record();
        let bob = PartyId::new();
        rec.add_participant(TrackerParticipant::new(
            bob,
            "bob",
            Some(SessionMode::Moderator),
        ));

        let past = Utc::now() - Duration::seconds(90);
        for p in &mut rec.participants {
            p.last_active = past;
        }

        let now = Utc::now();
        rec.update_presence("bob", now);

        let alice_entry = rec.participants.iter().find(|p| p.user == "alice").unwrap();
        let bob_entry = rec.participants.iter().find(|p| p.user == "bob").unwrap();
        assert_eq!(alice_entry.last_active, past);
        assert_eq!(bob_entry.last_active, now);
    }

    #[test]
    fn remove_participant_by_id() {
        let mut rec = record();
        let bob = PartyId::new();
        rec.add_participant(TrackerParticipant::new(bob, "bob", Some(SessionMode::Peer)));
        assert_eq!(rec.participants.len(), 2);

        rec.remove_participant(bob);
        assert_eq!(rec.participants.len(), 1);
        assert_eq!(rec.participants[0].user, "alice");
    }

    #[test]
    fn record_serde_roundtrip() {
        let rec = record();
        let json = serde_json::to_vec(&rec).expect("record should serialize");
        let back: TrackerRecord = serde_json::from_slice(&json).expect("should deserialize");
        assert_eq!(rec, back);
    }
}
