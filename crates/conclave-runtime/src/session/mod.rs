//! The live session orchestrator.
//!
//! A [`Session`] owns the party roster, the lifecycle state machine
//! (`Pending → Running → Terminated`, with re-entry to `Pending` when a
//! required participant leaves under a pause policy), the I/O hub wiring,
//! presence enforcement, audit emission, and coordinated shutdown.
//! [`SessionManager`] is the explicit registry sessions are created
//! through: constructed once at startup and passed down, never global.
//!
//! # Locking
//!
//! One async mutex serializes roster and state mutation; state observers
//! subscribe to a broadcast channel and see every transition in order.
//! The session lock may be held across tracker round-trips but is never
//! taken from inside the I/O hub's lock (hub callbacks spawn tasks).

use crate::{
    resolve_roles, Executor, ExitStatus, RemoteClient, ResizeMultiplexer, RoleDirectory,
    SessionConfig, SessionError, SessionIo, TermManager,
};
use chrono::{DateTime, Utc};
use conclave_access::{PolicyOptions, SessionAccessEvaluator};
use conclave_audit::{AuditEmitter, AuditEvent, AuditStreamer, RecordingSink};
use conclave_tracker::{CreateTrackerRequest, TrackerParticipant, TrackerStore};
use conclave_types::{
    Identity, ParticipantContext, PartyId, SessionId, SessionKind, SessionMode, SessionState,
    TerminalSize,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, error, warn};

/// One connected participant.
pub struct Party {
    pub id: PartyId,
    pub identity: Identity,
    pub mode: SessionMode,
    client: Arc<dyn RemoteClient>,
}

impl Party {
    fn new(identity: Identity, mode: SessionMode, client: Arc<dyn RemoteClient>) -> Self {
        Self {
            id: PartyId::new(),
            identity,
            mode,
            client,
        }
    }
}

/// A join attempt.
pub struct JoinRequest {
    pub identity: Identity,
    pub mode: SessionMode,
    pub client: Arc<dyn RemoteClient>,
}

/// Everything needed to create a session.
pub struct CreateSessionRequest {
    pub kind: SessionKind,
    pub tty: bool,
    /// Target host, or pod name for kubernetes sessions.
    pub hostname: String,
    pub login: String,
    pub command: Vec<String>,
    pub initiator: Identity,
    pub initiator_mode: SessionMode,
    pub initiator_client: Arc<dyn RemoteClient>,
    pub executor: Arc<dyn Executor>,
    /// Absolute expiry; defaults to now + the configured session lifetime.
    pub expires: Option<DateTime<Utc>>,
}

/// A party as reported by [`Session::roster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PartyId,
    pub username: String,
    pub mode: SessionMode,
}

struct Shared {
    state: SessionState,
    started: bool,
    closed: bool,
    parties: HashMap<PartyId, Party>,
    /// Every party that was ever admitted, for the end-of-session audit.
    historical: HashMap<PartyId, String>,
    /// Options of the require policy that last fulfilled the session;
    /// consulted when a leave unfulfills it.
    last_options: PolicyOptions,
    recorder: Option<Arc<dyn RecordingSink>>,
}

/// A live moderated session.
pub struct Session {
    id: SessionId,
    kind: SessionKind,
    tty: bool,
    hostname: String,
    login: String,
    command: Vec<String>,
    initiator: Identity,
    initiator_id: PartyId,
    presence_required: bool,
    expires: DateTime<Utc>,
    evaluator: SessionAccessEvaluator,
    io: Arc<TermManager>,
    resize: Arc<ResizeMultiplexer>,
    tracker: Arc<TrackerStore>,
    emitter: Arc<dyn AuditEmitter>,
    streamer: Option<Arc<dyn AuditStreamer>>,
    roles: Arc<dyn RoleDirectory>,
    executor: Arc<dyn Executor>,
    config: SessionConfig,
    shared: Mutex<Shared>,
    state_tx: broadcast::Sender<SessionState>,
    close_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("tty", &self.tty)
            .field("hostname", &self.hostname)
            .field("login", &self.login)
            .field("command", &self.command)
            .field("initiator_id", &self.initiator_id)
            .field("presence_required", &self.presence_required)
            .field("expires", &self.expires)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// The session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The session kind.
    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Whether the session drives a terminal.
    #[must_use]
    pub fn tty(&self) -> bool {
        self.tty
    }

    /// Whether close has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }

    /// The session's I/O hub.
    #[must_use]
    pub fn io(&self) -> &Arc<TermManager> {
        &self.io
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.shared.lock().await.state
    }

    /// Current roster.
    pub async fn roster(&self) -> Vec<RosterEntry> {
        self.shared
            .lock()
            .await
            .parties
            .values()
            .map(|p| RosterEntry {
                id: p.id,
                username: p.identity.username.clone(),
                mode: p.mode,
            })
            .collect()
    }

    /// Subscribes to lifecycle transitions. Every transition after the
    /// subscription is observed, in order.
    #[must_use]
    pub fn subscribe_state(&self) -> broadcast::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Attempts to add a party.
    ///
    /// # Errors
    ///
    /// [`SessionError::AccessDenied`] when policy forbids the requested
    /// mode, or when a non-interactive session lacks its required
    /// participants. Evaluator and tracker failures surface and leave the
    /// session alive.
    pub async fn join(self: &Arc<Self>, req: JoinRequest) -> Result<PartyId, SessionError> {
        let party = Party::new(req.identity, req.mode, req.client);
        self.admit(party).await
    }

    /// Removes a party. May pause or close the session.
    ///
    /// # Errors
    ///
    /// Tracker failures surface. Leaving a terminated session or an
    /// unknown party is a no-op.
    pub async fn leave(self: &Arc<Self>, party_id: PartyId) -> Result<(), SessionError> {
        let mut shared = self.shared.lock().await;
        self.leave_locked(&mut shared, party_id).await
    }

    /// Terminates the session and releases every resource. Idempotent.
    pub async fn close(self: &Arc<Self>) {
        let mut shared = self.shared.lock().await;
        if shared.closed {
            return;
        }
        shared.closed = true;

        debug!(session = %self.id, "closing session");
        self.io.broadcast_message("Closing session...");
        shared.state = SessionState::Terminated;
        self.io.close();
        let _ = self.state_tx.send(SessionState::Terminated);

        if let Err(e) = self
            .tracker
            .update_state(self.id, SessionState::Terminated)
            .await
        {
            error!(session = %self.id, error = %e, "failed to mark tracker terminated");
        }

        self.close_tx.send_replace(true);
        self.resize.close();

        for party in shared.parties.values() {
            party.client.close();
        }

        if let Some(recorder) = shared.recorder.take() {
            recorder.close();
        }
    }

    // ── Join protocol ────────────────────────────────────────

    async fn admit(self: &Arc<Self>, party: Party) -> Result<PartyId, SessionError> {
        let mut shared = self.shared.lock().await;
        if shared.state == SessionState::Terminated {
            return Err(SessionError::Terminated);
        }

        // Initiator (or an extra connection by the same user) skips the
        // access check; everyone else must hold a join policy granting
        // the requested mode.
        if party.identity.username != self.initiator.username {
            let roles = resolve_roles(self.roles.as_ref(), &party.identity.role_names).await?;
            let ctx = ParticipantContext::new(party.identity.username.clone(), roles);
            let modes = self.evaluator.can_join(&ctx)?;
            if !modes.contains(&party.mode) {
                return Err(SessionError::AccessDenied(
                    "insufficient permissions to join session".into(),
                ));
            }
        }

        let party_id = party.id;
        let name = party_id.to_string();
        let username = party.identity.username.clone();
        let is_initiator_party = party_id == self.initiator_id;
        let same_user = username == self.initiator.username;
        let client = party.client.clone();
        let mode = party.mode;

        shared.parties.insert(party_id, party);
        shared.historical.insert(party_id, username.clone());

        // The create path already recorded the initiator participant.
        if !is_initiator_party {
            if let Err(e) = self
                .tracker
                .add_participant(self.id, TrackerParticipant::new(party_id, &username, Some(mode)))
                .await
            {
                shared.parties.remove(&party_id);
                shared.historical.remove(&party_id);
                return Err(e.into());
            }
        }

        self.emit(AuditEvent::SessionJoin {
            session_id: self.id,
            user: username.clone(),
            mode,
        })
        .await;

        self.io
            .broadcast_message(&format!("User {username} joined the session."));

        if self.tty {
            if let Some(rx) = client.take_resize() {
                self.resize.add(&name, rx);
            }
        }

        if self.tty && same_user {
            if let Some(rx) = client.take_stdin() {
                self.io.add_reader(&name, rx);
            }
        }

        let recent = self.io.recent_history();
        if !recent.is_empty() && client.stdout().send(recent).is_err() {
            return Err(SessionError::Transport(
                "failed to replay session history".into(),
            ));
        }
        self.io.add_writer(&name, client.stdout());

        if mode != SessionMode::Observer {
            self.watch_force_terminate(&client);
        }

        if shared.state != SessionState::Pending {
            return Ok(party_id);
        }

        let (can_start, options) = self.can_start(&shared).await?;
        if can_start {
            shared.last_options = options;
        }

        if shared.started && can_start {
            shared.state = SessionState::Running;
            let _ = self.state_tx.send(SessionState::Running);
            return Ok(party_id);
        }

        if can_start {
            let session = self.clone();
            tokio::spawn(async move { session.launch().await });
        } else if !self.tty {
            return Err(SessionError::AccessDenied(
                "insufficient permissions to launch non-interactive session".into(),
            ));
        } else {
            self.io
                .broadcast_message("Waiting for required participants...");
        }

        Ok(party_id)
    }

    fn watch_force_terminate(self: &Arc<Self>, client: &Arc<dyn RemoteClient>) {
        let Some(mut force_rx) = client.take_force_terminate() else {
            return;
        };

        let session = Arc::downgrade(self);
        let mut close_rx = self.close_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                received = force_rx.recv() => {
                    if received.is_none() {
                        return;
                    }
                    let Some(session) = session.upgrade() else { return };
                    debug!(session = %session.id, "received force termination request");
                    session.close().await;
                }
                _ = close_rx.changed() => {}
            }
        });
    }

    // ── Leave protocol ───────────────────────────────────────

    async fn leave_locked(
        self: &Arc<Self>,
        shared: &mut Shared,
        party_id: PartyId,
    ) -> Result<(), SessionError> {
        if shared.state == SessionState::Terminated {
            return Ok(());
        }
        let Some(party) = shared.parties.remove(&party_id) else {
            return Ok(());
        };

        let name = party_id.to_string();
        self.resize.remove(&name);
        self.io.remove_reader(&name);
        self.io.remove_writer(&name);
        self.io.broadcast_message(&format!(
            "User {} left the session.",
            party.identity.username
        ));

        self.emit(AuditEvent::SessionLeave {
            session_id: self.id,
            user: party.identity.username.clone(),
        })
        .await;

        self.tracker.remove_participant(self.id, party_id).await?;
        party.client.close();

        if shared.parties.is_empty() || party_id == self.initiator_id {
            let session = self.clone();
            tokio::spawn(async move { session.close().await });
            return Ok(());
        }

        let (can_start, options) = self.can_start(shared).await?;
        if can_start {
            shared.last_options = options;
            return Ok(());
        }

        if shared.last_options.terminate_on_leave {
            let session = self.clone();
            tokio::spawn(async move { session.close().await });
        } else {
            shared.state = SessionState::Pending;
            let _ = self.state_tx.send(SessionState::Pending);

            // Subscribe before releasing the lock so a quick resume
            // cannot slip past the waiter.
            let state_rx = self.state_tx.subscribe();
            let session = self.clone();
            tokio::spawn(async move { session.wait_on_access(state_rx).await });
        }

        Ok(())
    }

    /// Gates the I/O off until the session resumes or terminates.
    async fn wait_on_access(&self, mut state_rx: broadcast::Receiver<SessionState>) {
        self.io.set_off();
        self.io
            .broadcast_message("Session paused, Waiting for required participants...");

        loop {
            match state_rx.recv().await {
                Ok(SessionState::Pending) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Ok(SessionState::Terminated) | Err(broadcast::error::RecvError::Closed) => return,
                Ok(SessionState::Running) => break,
            }
        }

        self.io.broadcast_message("Resuming session...");
        self.io.set_on();
    }

    /// Evaluates the require policies against the current roster,
    /// excluding the initiator's own connections.
    async fn can_start(&self, shared: &Shared) -> Result<(bool, PolicyOptions), SessionError> {
        let mut participants = Vec::new();
        for party in shared.parties.values() {
            if party.identity.username == self.initiator.username {
                continue;
            }
            let roles = resolve_roles(self.roles.as_ref(), &party.identity.role_names).await?;
            participants.push(ParticipantContext::new(
                party.identity.username.clone(),
                roles,
            ));
        }

        Ok(self.evaluator.fulfilled_for(&participants)?)
    }

    // ── Launch protocol ──────────────────────────────────────

    async fn launch(self: Arc<Self>) {
        let started_at = Utc::now();
        let result = match self.launch_inner().await {
            // A leave or close won the race before the launch committed;
            // whoever won owns the session state now.
            Ok(None) => return,
            Ok(Some(status)) => Ok(status),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!(session = %self.id, error = %e, "session stream ended with error");
        }

        let clients: Vec<Arc<dyn RemoteClient>> = {
            let shared = self.shared.lock().await;
            shared.parties.values().map(|p| p.client.clone()).collect()
        };
        for client in clients {
            if let Err(e) = client.send_status(&result).await {
                warn!(session = %self.id, error = %e, "failed to send status to party");
            }
        }

        if self.tty {
            self.emit(AuditEvent::SessionData {
                session_id: self.id,
                bytes_tx: self.io.bytes_read(),
                bytes_rx: self.io.bytes_written(),
            })
            .await;

            let participants = {
                let shared = self.shared.lock().await;
                shared.historical.values().cloned().collect()
            };
            self.emit(AuditEvent::SessionEnd {
                session_id: self.id,
                participants,
                start: started_at,
                end: Utc::now(),
            })
            .await;
        } else {
            let (exit_code, error) = match &result {
                Ok(status) => (status.code, None),
                Err(e) => (None, Some(e.to_string())),
            };
            self.emit(AuditEvent::Exec {
                session_id: self.id,
                command: self.command.join(" "),
                exit_code,
                error,
            })
            .await;
        }

        self.close().await;
    }

    /// Commits the session to `Running` and streams the executor.
    ///
    /// `Ok(None)` means the launch was abandoned before committing:
    /// launches run on a detached task, so a party can leave (or the
    /// session can close) between the fulfilled evaluation that spawned
    /// the launch and the launch taking the lock. The requirements are
    /// re-verified here; an unfulfilled session stays exactly as the
    /// racing leave left it.
    async fn launch_inner(self: &Arc<Self>) -> Result<Option<ExitStatus>, SessionError> {
        {
            let mut shared = self.shared.lock().await;
            if shared.closed {
                return Ok(None);
            }

            let (can_start, options) = self.can_start(&shared).await?;
            if !can_start {
                debug!(session = %self.id, "launch abandoned, access requirements no longer fulfilled");
                return Ok(None);
            }
            shared.last_options = options;

            debug!(session = %self.id, "launching session");
            self.io.broadcast_message("Launching session...");

            self.spawn_expiry_watcher();
            if self.presence_required {
                self.spawn_presence_checker();
            }

            self.tracker
                .update_state(self.id, SessionState::Running)
                .await?;
            shared.started = true;
            shared.state = SessionState::Running;
            let _ = self.state_tx.send(SessionState::Running);

            self.install_write_error_handler();

            if self.tty {
                if let Some(streamer) = &self.streamer {
                    let sink = streamer
                        .new_recording(self.id)
                        .map_err(|e| SessionError::Transport(e.to_string()))?;
                    self.attach_recorder(&mut shared, sink);
                }

                self.install_resize_handler();

                self.emit(AuditEvent::SessionStart {
                    session_id: self.id,
                    kind: self.kind,
                    user: self.initiator.username.clone(),
                    login: self.login.clone(),
                    mfa: self.initiator.mfa_verified,
                    initial_command: self.command.clone(),
                    pod_name: self.hostname.clone(),
                })
                .await;
            }
        }

        let io = SessionIo::new(self.io.clone(), self.resize.clone());
        self.executor.stream(io, self.tty).await.map(Some)
    }

    fn attach_recorder(&self, shared: &mut Shared, sink: Arc<dyn RecordingSink>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let pump_sink = sink.clone();
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if let Err(e) = pump_sink.record(&chunk) {
                    warn!(error = %e, "failed to record session output");
                }
            }
        });

        self.io.add_writer("recorder", tx);
        shared.recorder = Some(sink);
    }

    /// Ejects a party whose output channel failed.
    fn install_write_error_handler(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        self.io.set_on_write_error(Arc::new(move |name| {
            let Ok(party_id) = PartyId::parse(name) else {
                // The recorder writer is not a party.
                return;
            };
            let Some(session) = session.upgrade() else { return };
            tokio::spawn(async move {
                warn!(session = %session.id, party = %party_id, "write failed, disconnecting party");
                if let Err(e) = session.leave(party_id).await {
                    error!(session = %session.id, party = %party_id, error = %e, "failed to disconnect party");
                }
            });
        }));
    }

    /// Fans each merged size out to every party and records it.
    fn install_resize_handler(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        self.resize.set_callback(Arc::new(move |size| {
            let Some(session) = session.upgrade() else { return };
            tokio::spawn(async move { session.fan_out_resize(size).await });
        }));
    }

    async fn fan_out_resize(self: Arc<Self>, size: TerminalSize) {
        let clients: Vec<(PartyId, Arc<dyn RemoteClient>)> = {
            let shared = self.shared.lock().await;
            shared
                .parties
                .values()
                .map(|p| (p.id, p.client.clone()))
                .collect()
        };

        for (party_id, client) in clients {
            if let Err(e) = client.resize(size).await {
                warn!(session = %self.id, party = %party_id, error = %e, "failed to resize client");
            }
        }

        self.emit(AuditEvent::Resize {
            session_id: self.id,
            size,
        })
        .await;
    }

    fn spawn_expiry_watcher(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        let mut close_rx = self.close_tx.subscribe();
        let expires = self.expires;

        tokio::spawn(async move {
            let until = (expires - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::select! {
                () = tokio::time::sleep(until) => {
                    let Some(session) = session.upgrade() else { return };
                    session.io.broadcast_message("Session expired, closing...");
                    session.close().await;
                }
                _ = close_rx.changed() => {}
            }
        });
    }

    fn spawn_presence_checker(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        let mut close_rx = self.close_tx.subscribe();
        let interval = self.config.presence_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // immediate first tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(session) = session.upgrade() else { return };
                        if let Err(e) = session.check_presence().await {
                            // Fail safe: no presence data means no session.
                            error!(session = %session.id, error = %e, "presence check failed, closing session");
                            session.close().await;
                            return;
                        }
                    }
                    _ = close_rx.changed() => return,
                }
            }
        });
    }

    /// Ejects non-initiator moderators whose presence attestations have
    /// gone stale.
    async fn check_presence(self: &Arc<Self>) -> Result<(), SessionError> {
        let record = self.tracker.get(self.id).await?;
        let now = Utc::now();

        let stale: Vec<PartyId> = record
            .participants
            .iter()
            .filter(|p| p.id != self.initiator_id)
            .filter(|p| p.mode == Some(SessionMode::Moderator))
            .filter(|p| now > p.last_active + self.config.presence_max_lag)
            .map(|p| p.id)
            .collect();

        for party_id in stale {
            debug!(session = %self.id, party = %party_id, "participant not active, kicking");
            if let Err(e) = self.leave(party_id).await {
                warn!(session = %self.id, party = %party_id, error = %e, "failed to kick inactive participant");
            }
        }

        Ok(())
    }

    async fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.emitter.emit(event).await {
            warn!(session = %self.id, error = %e, "failed to emit audit event");
        }
    }
}

/// Explicit registry and factory for sessions.
///
/// Holds the shared collaborators (tracker, audit, role directory) and the
/// orchestration config; constructed once at startup and injected wherever
/// sessions are created.
pub struct SessionManager {
    tracker: Arc<TrackerStore>,
    emitter: Arc<dyn AuditEmitter>,
    streamer: Option<Arc<dyn AuditStreamer>>,
    roles: Arc<dyn RoleDirectory>,
    config: SessionConfig,
    sessions: parking_lot::Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        tracker: Arc<TrackerStore>,
        emitter: Arc<dyn AuditEmitter>,
        roles: Arc<dyn RoleDirectory>,
        config: SessionConfig,
    ) -> Self {
        Self {
            tracker,
            emitter,
            streamer: None,
            roles,
            config,
            sessions: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Enables session recording through the given streamer.
    #[must_use]
    pub fn with_streamer(mut self, streamer: Arc<dyn AuditStreamer>) -> Self {
        self.streamer = Some(streamer);
        self
    }

    /// Creates a session in `Pending` state, records the tracker, and
    /// admits the initiator.
    ///
    /// # Errors
    ///
    /// Role resolution and tracker failures surface; on an admit failure
    /// the half-created session is closed before the error propagates.
    pub async fn create(
        self: &Arc<Self>,
        req: CreateSessionRequest,
    ) -> Result<Arc<Session>, SessionError> {
        let host_roles = resolve_roles(self.roles.as_ref(), &req.initiator.role_names).await?;
        let evaluator = SessionAccessEvaluator::new(host_roles.clone(), req.kind);

        let id = SessionId::new();
        let io = TermManager::new(self.config.history_size);
        io.broadcast_message(&format!("Creating session with ID: {id}..."));

        let initiator_party = Party::new(
            req.initiator.clone(),
            req.initiator_mode,
            req.initiator_client,
        );
        let expires = req
            .expires
            .unwrap_or_else(|| Utc::now() + self.config.default_expiry);

        self.tracker
            .create(CreateTrackerRequest {
                session_id: id,
                kind: req.kind,
                hostname: req.hostname.clone(),
                login: req.login.clone(),
                host_user: req.initiator.username.clone(),
                host_roles,
                initiator: TrackerParticipant::new(
                    initiator_party.id,
                    &req.initiator.username,
                    None,
                ),
                expires,
            })
            .await?;

        let (state_tx, _) = broadcast::channel(16);
        let (close_tx, _) = watch::channel(false);
        let session = Arc::new(Session {
            id,
            kind: req.kind,
            tty: req.tty,
            hostname: req.hostname,
            login: req.login,
            command: req.command,
            initiator: req.initiator,
            initiator_id: initiator_party.id,
            presence_required: initiator_party.identity.mfa_verified,
            expires,
            evaluator,
            io,
            resize: ResizeMultiplexer::new(),
            tracker: self.tracker.clone(),
            emitter: self.emitter.clone(),
            streamer: self.streamer.clone(),
            roles: self.roles.clone(),
            executor: req.executor,
            config: self.config.clone(),
            shared: Mutex::new(Shared {
                state: SessionState::Pending,
                started: false,
                closed: false,
                parties: HashMap::new(),
                historical: HashMap::new(),
                last_options: PolicyOptions::default(),
                recorder: None,
            }),
            state_tx,
            close_tx,
        });

        self.sessions.lock().insert(id, session.clone());

        if let Err(e) = session.admit(initiator_party).await {
            session.close().await;
            self.sessions.lock().remove(&id);
            return Err(e);
        }

        Ok(session)
    }

    /// Looks up a live session.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().get(&id).cloned()
    }

    /// Drops terminated sessions from the registry, returning how many
    /// were reaped.
    pub fn reap_terminated(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_closed());
        before - sessions.len()
    }
}
