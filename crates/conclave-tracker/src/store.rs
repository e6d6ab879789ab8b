//! The session tracker store.
//!
//! A registry of live sessions over a [`KvBackend`]: one record per session
//! plus a sentinel list key enumerating the ids that exist. The list is the
//! source of truth for enumeration; records may lag behind it briefly
//! (create writes the list first) or outlive their list entry briefly
//! (remove drops the list entry before deleting records).
//!
//! All mutations go through compare-and-swap. A lost race sleeps the retry
//! delay and goes again, up to a bounded number of attempts; only then does
//! [`TrackerError::CompareFailed`] surface to the caller.

use crate::{CreateTrackerRequest, KvBackend, TrackerError, TrackerParticipant, TrackerRecord};
use chrono::Utc;
use conclave_types::{PartyId, SessionId, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "session_tracker";
const LIST_KEY: &str = "session_tracker/list";

/// Tunables for the tracker store.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Sleep between CAS retries.
    pub retry_delay: Duration,
    /// CAS attempts before the conflict surfaces as an error.
    pub retry_cap: u32,
    /// How long a terminated record lingers before the GC may take it.
    pub gc_delay: chrono::Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            retry_cap: 10,
            gc_delay: chrono::Duration::minutes(5),
        }
    }
}

/// Session tracker registry over a key-value backend.
pub struct TrackerStore {
    backend: Arc<dyn KvBackend>,
    config: TrackerConfig,
}

impl TrackerStore {
    /// Opens the store, creating the sentinel list key if missing.
    ///
    /// # Errors
    ///
    /// Backend errors other than the benign already-exists race surface.
    pub async fn new(
        backend: Arc<dyn KvBackend>,
        config: TrackerConfig,
    ) -> Result<Self, TrackerError> {
        match backend.get(LIST_KEY).await {
            Ok(_) => {}
            Err(TrackerError::NotFound(_)) => {
                match backend.create(LIST_KEY, b"[]".to_vec()).await {
                    Ok(()) | Err(TrackerError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }

        Ok(Self { backend, config })
    }

    fn record_key(id: SessionId) -> String {
        format!("{KEY_PREFIX}/{id}")
    }

    /// Creates a tracker record in `Pending` state.
    ///
    /// The id is appended to the list first, then the record is written:
    /// a crash between the two leaves a dangling list entry that `get`
    /// reports as missing and a later GC pass drops, never an orphan
    /// record invisible to enumeration.
    ///
    /// # Errors
    ///
    /// [`TrackerError::AlreadyExists`] for duplicate ids; CAS exhaustion
    /// and backend failures surface as-is.
    pub async fn create(&self, req: CreateTrackerRequest) -> Result<TrackerRecord, TrackerError> {
        let record = TrackerRecord {
            session_id: req.session_id,
            kind: req.kind,
            state: SessionState::Pending,
            created: Utc::now(),
            expires: req.expires,
            hostname: req.hostname,
            login: req.login,
            host_user: req.host_user,
            host_roles: req.host_roles,
            participants: vec![req.initiator],
        };

        self.add_to_list(req.session_id).await?;
        self.backend
            .create(&Self::record_key(req.session_id), encode(&record)?)
            .await?;

        debug!(session = %req.session_id, "tracker record created");
        Ok(record)
    }

    /// Reads one record.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for unknown or already-collected ids.
    pub async fn get(&self, id: SessionId) -> Result<TrackerRecord, TrackerError> {
        let key = Self::record_key(id);
        let bytes = self.backend.get(&key).await?;
        decode(&key, &bytes)
    }

    /// Lists the records of every id on the list.
    ///
    /// Ids whose record is already gone (a concurrent remove between the
    /// list read and the record read) are skipped.
    ///
    /// # Errors
    ///
    /// List-key and decode failures surface.
    pub async fn list(&self) -> Result<Vec<TrackerRecord>, TrackerError> {
        let ids = self.read_list().await?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(id).await {
                Ok(record) => records.push(record),
                Err(TrackerError::NotFound(_)) => {
                    debug!(session = %id, "listed id has no record; skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }

    /// Refreshes the presence timestamp of `user`'s entries.
    ///
    /// # Errors
    ///
    /// CAS exhaustion and backend failures surface; conflicts below the
    /// retry cap do not.
    pub async fn update_presence(&self, id: SessionId, user: &str) -> Result<(), TrackerError> {
        let user = user.to_string();
        self.update_record(id, move |record| {
            record.update_presence(&user, Utc::now());
        })
        .await
    }

    /// Publishes a state transition.
    pub async fn update_state(
        &self,
        id: SessionId,
        state: SessionState,
    ) -> Result<(), TrackerError> {
        self.update_record(id, move |record| {
            record.state = state;
        })
        .await
    }

    /// Publishes a joined participant.
    pub async fn add_participant(
        &self,
        id: SessionId,
        participant: TrackerParticipant,
    ) -> Result<(), TrackerError> {
        self.update_record(id, move |record| {
            record.add_participant(participant.clone());
        })
        .await
    }

    /// Publishes a departed participant.
    pub async fn remove_participant(
        &self,
        id: SessionId,
        party: PartyId,
    ) -> Result<(), TrackerError> {
        self.update_record(id, move |record| {
            record.remove_participant(party);
        })
        .await
    }

    /// Removes a session: drops it from the list, opportunistically
    /// collecting terminated-and-aged or expired entries in the same swap,
    /// then deletes the affected record keys.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] if `id` was not on the list.
    pub async fn remove(&self, id: SessionId) -> Result<(), TrackerError> {
        let collected = self.remove_from_list(Some(id)).await?;

        for dead in collected {
            match self.backend.delete(&Self::record_key(dead)).await {
                Ok(()) | Err(TrackerError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Runs the GC pass alone: sweeps terminated-and-aged or expired
    /// entries without requiring a target id. Returns the collected ids.
    pub async fn prune(&self) -> Result<Vec<SessionId>, TrackerError> {
        let collected = self.remove_from_list(None).await?;

        for dead in &collected {
            match self.backend.delete(&Self::record_key(*dead)).await {
                Ok(()) | Err(TrackerError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(collected)
    }

    // ── internals ────────────────────────────────────────────

    async fn read_list(&self) -> Result<Vec<SessionId>, TrackerError> {
        let bytes = self.backend.get(LIST_KEY).await?;
        decode(LIST_KEY, &bytes)
    }

    /// Read-modify-write with CAS and bounded retry.
    async fn update_record<F>(&self, id: SessionId, mut apply: F) -> Result<(), TrackerError>
    where
        F: FnMut(&mut TrackerRecord) + Send,
    {
        let key = Self::record_key(id);

        let mut attempts = 0;
        loop {
            let old_bytes = self.backend.get(&key).await?;
            let mut record: TrackerRecord = decode(&key, &old_bytes)?;
            apply(&mut record);

            match self
                .backend
                .compare_and_swap(&key, &old_bytes, encode(&record)?)
                .await
            {
                Ok(()) => return Ok(()),
                Err(TrackerError::CompareFailed(_)) if attempts + 1 < self.config.retry_cap => {
                    attempts += 1;
                    debug!(session = %id, attempts, "tracker update lost CAS race, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    if matches!(e, TrackerError::CompareFailed(_)) {
                        warn!(session = %id, attempts, "tracker update exhausted CAS retries");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn add_to_list(&self, id: SessionId) -> Result<(), TrackerError> {
        let mut attempts = 0;
        loop {
            let old_bytes = self.backend.get(LIST_KEY).await?;
            let mut list: Vec<SessionId> = decode(LIST_KEY, &old_bytes)?;
            if list.contains(&id) {
                return Err(TrackerError::AlreadyExists(id.to_string()));
            }
            list.push(id);

            match self
                .backend
                .compare_and_swap(LIST_KEY, &old_bytes, encode(&list)?)
                .await
            {
                Ok(()) => return Ok(()),
                Err(TrackerError::CompareFailed(_)) if attempts + 1 < self.config.retry_cap => {
                    attempts += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Rewrites the list without `target` and without garbage, in one swap.
    /// Scans the whole list; one removal must not shadow another. Returns
    /// every id whose record should be deleted.
    async fn remove_from_list(
        &self,
        target: Option<SessionId>,
    ) -> Result<Vec<SessionId>, TrackerError> {
        let mut attempts = 0;
        loop {
            let old_bytes = self.backend.get(LIST_KEY).await?;
            let list: Vec<SessionId> = decode(LIST_KEY, &old_bytes)?;

            let now = Utc::now();
            let mut kept = Vec::with_capacity(list.len());
            let mut collected = Vec::new();
            let mut found = false;

            for id in list {
                if Some(id) == target {
                    found = true;
                    collected.push(id);
                    continue;
                }

                match self.get(id).await {
                    Ok(record) => {
                        let aged_out = record.state == SessionState::Terminated
                            && record.created + self.config.gc_delay < now;
                        let stale = record.expires < now;
                        if aged_out || stale {
                            debug!(session = %id, aged_out, stale, "collecting tracker entry");
                            collected.push(id);
                        } else {
                            kept.push(id);
                        }
                    }
                    // Dangling list entry (create crashed mid-way, or a
                    // concurrent remove); drop it from the list.
                    Err(TrackerError::NotFound(_)) => collected.push(id),
                    Err(e) => return Err(e),
                }
            }

            if let Some(target) = target {
                if !found {
                    return Err(TrackerError::NotFound(target.to_string()));
                }
            }

            match self
                .backend
                .compare_and_swap(LIST_KEY, &old_bytes, encode(&kept)?)
                .await
            {
                Ok(()) => return Ok(collected),
                Err(TrackerError::CompareFailed(_)) if attempts + 1 < self.config.retry_cap => {
                    attempts += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, TrackerError> {
    serde_json::to_vec(value).map_err(|e| TrackerError::Io(format!("encode: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, TrackerError> {
    serde_json::from_slice(bytes).map_err(|e| TrackerError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use conclave_types::{Role, SessionKind, SessionMode};

    fn request(id: SessionId, expires_in: ChronoDuration) -> CreateTrackerRequest {
        CreateTrackerRequest {
            session_id: id,
            kind: SessionKind::Kubernetes,
            hostname: "pod-1".into(),
            login: "root".into(),
            host_user: "alice".into(),
            host_roles: vec![Role::new("host")],
            initiator: TrackerParticipant::new(PartyId::new(), "alice", None),
            expires: Utc::now() + expires_in,
        }
    }

    fn fast_config() -> TrackerConfig {
        TrackerConfig {
            retry_delay: Duration::from_millis(5),
            retry_cap: 10,
            gc_delay: ChronoDuration::minutes(5),
        }
    }

    async fn store() -> (Arc<MemoryBackend>, TrackerStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = TrackerStore::new(backend.clone(), fast_config())
            .await
            .expect("store should open");
        (backend, store)
    }

    #[tokio::test]
    async fn create_then_get_returns_same_record() {
        let (_bk, store) = store().await;
        let id = SessionId::new();

        let created = store.create(request(id, ChronoDuration::hours(24))).await.unwrap();
        let fetched = store.get(id).await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.state, SessionState::Pending);
        assert_eq!(fetched.participants.len(), 1);
        assert_eq!(fetched.host_roles.len(), 1, "exactly the converted roles");
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let (_bk, store) = store().await;
        let id = SessionId::new();
        store.create(request(id, ChronoDuration::hours(1))).await.unwrap();

        assert!(matches!(
            store.create(request(id, ChronoDuration::hours(1))).await,
            Err(TrackerError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn list_enumerates_created_sessions() {
        let (_bk, store) = store().await;
        let a = SessionId::new();
        let b = SessionId::new();
        store.create(request(a, ChronoDuration::hours(1))).await.unwrap();
        store.create(request(b, ChronoDuration::hours(1))).await.unwrap();

        let listed = store.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.session_id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn state_and_participant_updates_roundtrip() {
        let (_bk, store) = store().await;
        let id = SessionId::new();
        store.create(request(id, ChronoDuration::hours(1))).await.unwrap();

        let bob = PartyId::new();
        store
            .add_participant(
                id,
                TrackerParticipant::new(bob, "bob", Some(SessionMode::Moderator)),
            )
            .await
            .unwrap();
        store.update_state(id, SessionState::Running).await.unwrap();

        let rec = store.get(id).await.unwrap();
        assert_eq!(rec.state, SessionState::Running);
        assert_eq!(rec.participants.len(), 2);

        store.remove_participant(id, bob).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().participants.len(), 1);
    }

    #[tokio::test]
    async fn presence_updates_under_contention_converge() {
        let (_bk, store) = store().await;
        let store = Arc::new(store);
        let id = SessionId::new();
        store.create(request(id, ChronoDuration::hours(1))).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.update_presence(id, "alice").await
            }));
        }

        for task in tasks {
            task.await.expect("task should not panic").expect("update should converge");
        }
    }

    #[tokio::test]
    async fn remove_deletes_record_and_list_entry() {
        let (bk, store) = store().await;
        let id = SessionId::new();
        store.create(request(id, ChronoDuration::hours(1))).await.unwrap();

        store.remove(id).await.unwrap();

        assert!(matches!(store.get(id).await, Err(TrackerError::NotFound(_))));
        assert!(store.list().await.unwrap().is_empty());
        // Only the list key remains.
        assert_eq!(bk.len(), 1);
    }

    #[tokio::test]
    async fn remove_of_unknown_id_is_not_found() {
        let (_bk, store) = store().await;
        assert!(matches!(
            store.remove(SessionId::new()).await,
            Err(TrackerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_collects_every_garbage_entry_in_one_pass() {
        let (_bk, store) = store().await;

        // Two expired sessions plus one live one and one removal target.
        let stale_a = SessionId::new();
        let stale_b = SessionId::new();
        let live = SessionId::new();
        let target = SessionId::new();
        store.create(request(stale_a, ChronoDuration::seconds(-10))).await.unwrap();
        store.create(request(stale_b, ChronoDuration::seconds(-10))).await.unwrap();
        store.create(request(live, ChronoDuration::hours(1))).await.unwrap();
        store.create(request(target, ChronoDuration::hours(1))).await.unwrap();

        store.remove(target).await.unwrap();

        let remaining: Vec<_> = store
            .list()
            .await
            .unwrap()
            .iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(remaining, vec![live], "both stale entries must go in one pass");
    }

    #[tokio::test]
    async fn prune_collects_terminated_after_gc_delay() {
        let backend = Arc::new(MemoryBackend::new());
        let config = TrackerConfig {
            gc_delay: ChronoDuration::zero(),
            ..fast_config()
        };
        let store = TrackerStore::new(backend, config).await.unwrap();

        let done = SessionId::new();
        let live = SessionId::new();
        store.create(request(done, ChronoDuration::hours(1))).await.unwrap();
        store.create(request(live, ChronoDuration::hours(1))).await.unwrap();
        store.update_state(done, SessionState::Terminated).await.unwrap();

        let collected = store.prune().await.unwrap();
        assert_eq!(collected, vec![done]);
        assert!(matches!(store.get(done).await, Err(TrackerError::NotFound(_))));
        assert!(store.get(live).await.is_ok());
    }

    #[tokio::test]
    async fn fresh_terminated_record_survives_prune() {
        let (_bk, store) = store().await;
        let id = SessionId::new();
        store.create(request(id, ChronoDuration::hours(1))).await.unwrap();
        store.update_state(id, SessionState::Terminated).await.unwrap();

        // gc_delay is five minutes; a just-terminated record stays.
        assert!(store.prune().await.unwrap().is_empty());
        assert!(store.get(id).await.is_ok());
    }

    /// Backend wrapper whose CAS always loses.
    struct ContestedBackend(MemoryBackend);

    #[async_trait]
    impl KvBackend for ContestedBackend {
        async fn get(&self, key: &str) -> Result<Vec<u8>, TrackerError> {
            self.0.get(key).await
        }
        async fn create(&self, key: &str, value: Vec<u8>) -> Result<(), TrackerError> {
            self.0.create(key, value).await
        }
        async fn compare_and_swap(
            &self,
            key: &str,
            _expected: &[u8],
            _new: Vec<u8>,
        ) -> Result<(), TrackerError> {
            Err(TrackerError::CompareFailed(key.to_string()))
        }
        async fn delete(&self, key: &str) -> Result<(), TrackerError> {
            self.0.delete(key).await
        }
    }

    #[tokio::test]
    async fn exhausted_cas_retries_surface_compare_failed() {
        let inner = MemoryBackend::new();
        let id = SessionId::new();
        let key = format!("session_tracker/{id}");
        let record = TrackerRecord {
            session_id: id,
            kind: SessionKind::Ssh,
            state: SessionState::Pending,
            created: Utc::now(),
            expires: Utc::now() + ChronoDuration::hours(1),
            hostname: "h".into(),
            login: "root".into(),
            host_user: "alice".into(),
            host_roles: vec![],
            participants: vec![],
        };
        inner.create(&key, serde_json::to_vec(&record).unwrap()).await.unwrap();
        inner
            .create(LIST_KEY, serde_json::to_vec(&vec![id]).unwrap())
            .await
            .unwrap();

        let config = TrackerConfig {
            retry_delay: Duration::from_millis(1),
            retry_cap: 3,
            ..fast_config()
        };
        let store = TrackerStore::new(Arc::new(ContestedBackend(inner)), config)
            .await
            .unwrap();

        let start = std::time::Instant::now();
        let err = store.update_presence(id, "alice").await.unwrap_err();
        assert!(matches!(err, TrackerError::CompareFailed(_)));
        // Two sleeps for three attempts; well under a second either way.
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
