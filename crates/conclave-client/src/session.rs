//! The joined session: terminal wiring, control keys, presence loop.

use crate::{
    ClientError, ClientHandshake, LocalTerminal, PresenceAuthClient, SessionTransport,
};
use conclave_types::{SessionId, SessionMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// `Ctrl-C`: drop out of the session locally.
const KEY_LEAVE: u8 = 0x03;
/// `t`: force-terminate the whole session.
const KEY_FORCE_TERMINATE: u8 = b't';

/// Knobs for joining.
#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub mode: SessionMode,
    /// Cadence of the moderator presence challenge loop.
    pub presence_interval: Duration,
}

impl JoinOptions {
    #[must_use]
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            presence_interval: Duration::from_secs(15),
        }
    }
}

/// Expands a granted mode list for selection: `Wildcard` stands for every
/// concrete mode. The server compares modes literally; expansion is the
/// client's job.
#[must_use]
pub fn expand_modes(granted: &[SessionMode]) -> Vec<SessionMode> {
    let mut expanded = Vec::new();
    let mut push = |mode: SessionMode| {
        if !expanded.contains(&mode) {
            expanded.push(mode);
        }
    };
    for &mode in granted {
        if mode == SessionMode::Wildcard {
            for concrete in SessionMode::concrete() {
                push(concrete);
            }
        } else {
            push(mode);
        }
    }
    expanded
}

/// A live joined session from the client side.
///
/// Construction wires the local terminal to the remote stream and spawns
/// the pump tasks; [`wait`](Self::wait) blocks until the session ends,
/// remotely (stream closed) or locally (`Ctrl-C`, force-terminate, or
/// [`close`](Self::close)).
pub struct JoinedSession {
    terminal: Arc<dyn LocalTerminal>,
    transport: Arc<dyn SessionTransport>,
    cancel_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for JoinedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinedSession").finish_non_exhaustive()
    }
}

impl JoinedSession {
    /// Joins a session: handshakes, enters raw mode when a terminal is
    /// attached, and starts the pumps.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Handshake`] when the server rejects the join.
    /// - [`ClientError::Handshake`] when the server demands presence for
    ///   a moderator but no auth client was supplied.
    pub async fn connect(
        session_id: SessionId,
        transport: Arc<dyn SessionTransport>,
        terminal: Arc<dyn LocalTerminal>,
        auth: Option<Arc<dyn PresenceAuthClient>>,
        options: JoinOptions,
    ) -> Result<Self, ClientError> {
        let server = transport
            .handshake(ClientHandshake { mode: options.mode })
            .await?;

        if terminal.is_attached() {
            terminal.set_raw(true);
        }

        let (cancel_tx, _) = watch::channel(false);
        let mut session = Self {
            terminal,
            transport,
            cancel_tx,
            tasks: Vec::new(),
        };

        session.spawn_output_pump();
        session.spawn_stdin_pump();
        session.spawn_outgoing_resize();
        session.spawn_incoming_resize();

        if server.presence_required && options.mode == SessionMode::Moderator {
            let Some(auth) = auth else {
                return Err(ClientError::Handshake(
                    "session requires MFA presence but no auth client is available".into(),
                ));
            };
            session.spawn_presence_loop(session_id, auth, options.presence_interval);
        }

        Ok(session)
    }

    /// Waits for every pump to finish.
    pub async fn wait(&mut self) {
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    /// Ends the local side of the session and waits for the pumps.
    pub async fn close(&mut self) {
        let _ = self.cancel_tx.send(true);
        self.transport.close();
        self.wait().await;
        self.terminal.set_raw(false);
    }

    // ── pumps ────────────────────────────────────────────────

    /// Remote stream → local display. The stream ending means the session
    /// is over; everything else unwinds.
    fn spawn_output_pump(&mut self) {
        let Some(mut output) = self.transport.take_output() else {
            return;
        };
        let terminal = self.terminal.clone();
        let cancel_tx = self.cancel_tx.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    chunk = output.recv() => {
                        let Some(chunk) = chunk else { break };
                        if let Err(e) = terminal.write_stdout(&chunk).await {
                            warn!(error = %e, "failed to render session output");
                            break;
                        }
                    }
                    _ = cancel_rx.changed() => return,
                }
            }
            let _ = cancel_tx.send(true);
        }));
    }

    /// Local keystrokes → session input, with the control keys
    /// intercepted: `Ctrl-C` drops out locally, `t` force-terminates.
    fn spawn_stdin_pump(&mut self) {
        let Some(mut stdin) = self.terminal.take_stdin() else {
            return;
        };
        let terminal = self.terminal.clone();
        let transport = self.transport.clone();
        let cancel_tx = self.cancel_tx.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            'pump: loop {
                tokio::select! {
                    chunk = stdin.recv() => {
                        let Some(chunk) = chunk else { break };
                        let mut pending = Vec::with_capacity(chunk.len());
                        for &byte in &chunk {
                            match byte {
                                KEY_LEAVE => {
                                    flush(&transport, &mut pending).await;
                                    let _ = terminal.write_stdout(b"\r\nLeft session\r\n").await;
                                    break 'pump;
                                }
                                KEY_FORCE_TERMINATE => {
                                    flush(&transport, &mut pending).await;
                                    let _ = terminal
                                        .write_stdout(b"\r\nForcefully terminated session\r\n")
                                        .await;
                                    if let Err(e) = transport.force_terminate().await {
                                        warn!(error = %e, "failed to send force-terminate");
                                    }
                                    break 'pump;
                                }
                                other => pending.push(other),
                            }
                        }
                        if !pending.is_empty() {
                            if let Err(e) = transport.send_input(&pending).await {
                                warn!(error = %e, "failed to forward session input");
                                break;
                            }
                        }
                    }
                    _ = cancel_rx.changed() => return,
                }
            }
            let _ = cancel_tx.send(true);
        }));
    }

    /// Local resize events → remote control messages.
    fn spawn_outgoing_resize(&mut self) {
        let Some(mut events) = self.terminal.take_resize_events() else {
            return;
        };
        let transport = self.transport.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    size = events.recv() => {
                        let Some(size) = size else { return };
                        if let Err(e) = transport.send_resize(size).await {
                            warn!(error = %e, "failed to forward terminal resize");
                        }
                    }
                    _ = cancel_rx.changed() => return,
                }
            }
        }));
    }

    /// Remote resizes → local terminal.
    fn spawn_incoming_resize(&mut self) {
        let Some(mut sizes) = self.transport.take_resize() else {
            return;
        };
        let terminal = self.terminal.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    size = sizes.recv() => {
                        let Some(size) = size else { return };
                        terminal.apply_resize(size);
                    }
                    _ = cancel_rx.changed() => return,
                }
            }
        }));
    }

    /// Presence challenge loop for moderators.
    fn spawn_presence_loop(
        &mut self,
        session_id: SessionId,
        auth: Arc<dyn PresenceAuthClient>,
        interval: Duration,
    ) {
        let mut cancel_rx = self.cancel_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match auth.attest(session_id).await {
                            Ok(()) => debug!(session = %session_id, "presence attested"),
                            Err(e) => {
                                // The server ejects us once the lag grows;
                                // keep trying until then.
                                warn!(session = %session_id, error = %e, "presence challenge failed");
                            }
                        }
                    }
                    _ = cancel_rx.changed() => return,
                }
            }
        }));
    }
}

/// Forwards buffered keystrokes, clearing the buffer.
async fn flush(transport: &Arc<dyn SessionTransport>, pending: &mut Vec<u8>) {
    if pending.is_empty() {
        return;
    }
    if let Err(e) = transport.send_input(pending).await {
        warn!(error = %e, "failed to forward session input");
    }
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ServerHandshake, SessionTransport};
    use async_trait::async_trait;
    use conclave_types::TerminalSize;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(100);

    struct FakeTransport {
        presence_required: bool,
        output_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
        resize_rx: Mutex<Option<mpsc::UnboundedReceiver<TerminalSize>>>,
        sent_input: Mutex<Vec<u8>>,
        sent_resizes: Mutex<Vec<TerminalSize>>,
        force_terminated: AtomicBool,
        closed: AtomicBool,
        handshook_mode: Mutex<Option<SessionMode>>,
    }

    struct TransportHandles {
        output: mpsc::UnboundedSender<Vec<u8>>,
        resize: mpsc::UnboundedSender<TerminalSize>,
    }

    impl FakeTransport {
        fn new(presence_required: bool) -> (Arc<Self>, TransportHandles) {
            let (output_tx, output_rx) = mpsc::unbounded_channel();
            let (resize_tx, resize_rx) = mpsc::unbounded_channel();
            let transport = Arc::new(Self {
                presence_required,
                output_rx: Mutex::new(Some(output_rx)),
                resize_rx: Mutex::new(Some(resize_rx)),
                sent_input: Mutex::new(Vec::new()),
                sent_resizes: Mutex::new(Vec::new()),
                force_terminated: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                handshook_mode: Mutex::new(None),
            });
            (
                transport,
                TransportHandles {
                    output: output_tx,
                    resize: resize_tx,
                },
            )
        }
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn handshake(
            &self,
            client: ClientHandshake,
        ) -> Result<ServerHandshake, ClientError> {
            *self.handshook_mode.lock() = Some(client.mode);
            Ok(ServerHandshake {
                presence_required: self.presence_required,
            })
        }

        fn take_output(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
            self.output_rx.lock().take()
        }

        fn take_resize(&self) -> Option<mpsc::UnboundedReceiver<TerminalSize>> {
            self.resize_rx.lock().take()
        }

        async fn send_input(&self, bytes: &[u8]) -> Result<(), ClientError> {
            self.sent_input.lock().extend_from_slice(bytes);
            Ok(())
        }

        async fn send_resize(&self, size: TerminalSize) -> Result<(), ClientError> {
            self.sent_resizes.lock().push(size);
            Ok(())
        }

        async fn force_terminate(&self) -> Result<(), ClientError> {
            self.force_terminated.store(true, Ordering::Release);
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    struct FakeTerminal {
        attached: bool,
        raw: AtomicBool,
        stdin_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
        resize_rx: Mutex<Option<mpsc::UnboundedReceiver<TerminalSize>>>,
        written: Mutex<Vec<u8>>,
        applied: Mutex<Vec<TerminalSize>>,
    }

    struct TerminalHandles {
        stdin: mpsc::UnboundedSender<Vec<u8>>,
        resize: mpsc::UnboundedSender<TerminalSize>,
    }

    impl FakeTerminal {
        fn new(attached: bool) -> (Arc<Self>, TerminalHandles) {
            let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
            let (resize_tx, resize_rx) = mpsc::unbounded_channel();
            let terminal = Arc::new(Self {
                attached,
                raw: AtomicBool::new(false),
                stdin_rx: Mutex::new(Some(stdin_rx)),
                resize_rx: Mutex::new(Some(resize_rx)),
                written: Mutex::new(Vec::new()),
                applied: Mutex::new(Vec::new()),
            });
            (
                terminal,
                TerminalHandles {
                    stdin: stdin_tx,
                    resize: resize_tx,
                },
            )
        }

        fn written_text(&self) -> String {
            String::from_utf8_lossy(&self.written.lock()).into_owned()
        }
    }

    #[async_trait]
    impl LocalTerminal for FakeTerminal {
        fn is_attached(&self) -> bool {
            self.attached
        }

        fn set_raw(&self, enabled: bool) {
            self.raw.store(enabled, Ordering::Release);
        }

        fn take_stdin(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
            self.stdin_rx.lock().take()
        }

        fn take_resize_events(&self) -> Option<mpsc::UnboundedReceiver<TerminalSize>> {
            self.resize_rx.lock().take()
        }

        async fn write_stdout(&self, bytes: &[u8]) -> Result<(), ClientError> {
            self.written.lock().extend_from_slice(bytes);
            Ok(())
        }

        fn apply_resize(&self, size: TerminalSize) {
            self.applied.lock().push(size);
        }
    }

    struct CountingAuth {
        attests: AtomicUsize,
    }

    #[async_trait]
    impl PresenceAuthClient for CountingAuth {
        async fn attest(&self, _session_id: SessionId) -> Result<(), ClientError> {
            self.attests.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    async fn connect(
        presence_required: bool,
        mode: SessionMode,
        auth: Option<Arc<CountingAuth>>,
        presence_interval: Duration,
    ) -> (
        JoinedSession,
        Arc<FakeTransport>,
        TransportHandles,
        Arc<FakeTerminal>,
        TerminalHandles,
    ) {
        let (transport, transport_handles) = FakeTransport::new(presence_required);
        let (terminal, terminal_handles) = FakeTerminal::new(true);
        let mut options = JoinOptions::new(mode);
        options.presence_interval = presence_interval;

        let session = JoinedSession::connect(
            SessionId::new(),
            transport.clone(),
            terminal.clone(),
            auth.map(|a| a as Arc<dyn PresenceAuthClient>),
            options,
        )
        .await
        .expect("connect should succeed");

        (session, transport, transport_handles, terminal, terminal_handles)
    }

    #[tokio::test]
    async fn handshake_advertises_mode_and_enters_raw() {
        let (_session, transport, _th, terminal, _tl) = connect(
            false,
            SessionMode::Observer,
            None,
            Duration::from_secs(15),
        )
        .await;

        assert_eq!(*transport.handshook_mode.lock(), Some(SessionMode::Observer));
        assert!(terminal.raw.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn remote_output_reaches_local_display() {
        let (_session, _t, th, terminal, _tl) =
            connect(false, SessionMode::Observer, None, Duration::from_secs(15)).await;

        th.output.send(b"remote bytes".to_vec()).unwrap();
        timeout(SHORT, async {
            while !terminal.written_text().contains("remote bytes") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("output should be rendered");
    }

    #[tokio::test]
    async fn ctrl_c_ends_participation_locally() {
        let (mut session, transport, _th, terminal, tl) =
            connect(false, SessionMode::Peer, None, Duration::from_secs(15)).await;

        tl.stdin.send(vec![0x03]).unwrap();
        timeout(SHORT, session.wait()).await.expect("pumps should unwind");

        assert!(terminal.written_text().contains("Left session"));
        assert!(
            !transport.force_terminated.load(Ordering::Acquire),
            "Ctrl-C must not force-terminate the whole session"
        );
    }

    #[tokio::test]
    async fn t_key_sends_force_terminate() {
        let (mut session, transport, _th, terminal, tl) =
            connect(false, SessionMode::Moderator, None, Duration::from_secs(15)).await;

        tl.stdin.send(b"t".to_vec()).unwrap();
        timeout(SHORT, session.wait()).await.expect("pumps should unwind");

        assert!(transport.force_terminated.load(Ordering::Acquire));
        assert!(terminal.written_text().contains("Forcefully terminated session"));
    }

    #[tokio::test]
    async fn ordinary_keystrokes_are_forwarded_to_the_stream() {
        let (_session, transport, _th, _terminal, tl) =
            connect(false, SessionMode::Peer, None, Duration::from_secs(15)).await;

        tl.stdin.send(b"ls -la\n".to_vec()).unwrap();

        timeout(SHORT, async {
            while transport.sent_input.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("input should be forwarded");

        assert_eq!(transport.sent_input.lock().as_slice(), b"ls -la\n");
        assert!(!transport.force_terminated.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn input_around_a_control_key_splits_at_the_key() {
        let (mut session, transport, _th, _terminal, tl) =
            connect(false, SessionMode::Peer, None, Duration::from_secs(15)).await;

        // "ab" is typed in the same chunk as Ctrl-C; "cd" follows the drop.
        tl.stdin.send(b"ab\x03cd".to_vec()).unwrap();
        timeout(SHORT, session.wait()).await.expect("pumps should unwind");

        assert_eq!(
            transport.sent_input.lock().as_slice(),
            b"ab",
            "bytes before the drop go out, bytes after it are discarded"
        );
    }

    #[tokio::test]
    async fn resize_flows_both_ways() {
        let (_session, transport, th, terminal, tl) =
            connect(false, SessionMode::Peer, None, Duration::from_secs(15)).await;

        tl.resize.send(TerminalSize::new(120, 40)).unwrap();
        th.resize.send(TerminalSize::new(80, 24)).unwrap();

        timeout(SHORT, async {
            while transport.sent_resizes.lock().is_empty() || terminal.applied.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("resizes should propagate");

        assert_eq!(transport.sent_resizes.lock().as_slice(), [TerminalSize::new(120, 40)]);
        assert_eq!(terminal.applied.lock().as_slice(), [TerminalSize::new(80, 24)]);
    }

    #[tokio::test]
    async fn moderator_runs_presence_loop_when_required() {
        let auth = Arc::new(CountingAuth {
            attests: AtomicUsize::new(0),
        });
        let (_session, _t, _th, _terminal, _tl) = connect(
            true,
            SessionMode::Moderator,
            Some(auth.clone()),
            Duration::from_millis(20),
        )
        .await;

        timeout(SHORT, async {
            while auth.attests.load(Ordering::Relaxed) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("presence loop should attest repeatedly");
    }

    #[tokio::test]
    async fn non_moderator_skips_presence_loop() {
        let auth = Arc::new(CountingAuth {
            attests: AtomicUsize::new(0),
        });
        let (_session, _t, _th, _terminal, _tl) = connect(
            true,
            SessionMode::Observer,
            Some(auth.clone()),
            Duration::from_millis(20),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(auth.attests.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn moderator_without_auth_client_is_rejected() {
        let (transport, _th) = FakeTransport::new(true);
        let (terminal, _tl) = FakeTerminal::new(true);

        let err = JoinedSession::connect(
            SessionId::new(),
            transport,
            terminal,
            None,
            JoinOptions::new(SessionMode::Moderator),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::Handshake(_)));
    }

    #[tokio::test]
    async fn close_tears_down_transport_and_raw_mode() {
        let (mut session, transport, _th, terminal, _tl) =
            connect(false, SessionMode::Peer, None, Duration::from_secs(15)).await;

        session.close().await;

        assert!(transport.closed.load(Ordering::Acquire));
        assert!(!terminal.raw.load(Ordering::Acquire));
    }

    // ── Mode expansion ───────────────────────────────────────

    #[test]
    fn wildcard_expands_to_concrete_modes() {
        assert_eq!(
            expand_modes(&[SessionMode::Wildcard]),
            vec![SessionMode::Peer, SessionMode::Observer, SessionMode::Moderator]
        );
    }

    #[test]
    fn expansion_dedupes_and_preserves_order() {
        assert_eq!(
            expand_modes(&[SessionMode::Moderator, SessionMode::Wildcard]),
            vec![SessionMode::Moderator, SessionMode::Peer, SessionMode::Observer]
        );
        assert!(expand_modes(&[]).is_empty());
    }
}
