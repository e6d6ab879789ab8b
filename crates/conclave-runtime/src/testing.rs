//! Channel-backed fakes for orchestrator tests.
//!
//! These stand in for the transport- and backend-owned collaborators:
//! [`FakeClient`] for a party's connection, [`ScriptedExecutor`] for the
//! execution backend, and [`StaticRoleDirectory`] for role resolution.
//! They live in the crate (not behind `cfg(test)`) so downstream crates
//! can drive sessions in their own tests.

use crate::{Executor, ExitStatus, RemoteClient, RoleDirectory, SessionError, SessionIo};
use async_trait::async_trait;
use conclave_types::{Role, TerminalSize};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// The local ends of a [`FakeClient`]'s channels.
#[derive(Debug)]
pub struct FakeClientHandles {
    /// Feed bytes "typed" by this party.
    pub stdin: mpsc::UnboundedSender<Vec<u8>>,
    /// Receive bytes rendered at this party.
    pub stdout: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Feed window sizes from this party's terminal.
    pub resize: mpsc::UnboundedSender<TerminalSize>,
    /// Fire a force-terminate request.
    pub force_terminate: mpsc::UnboundedSender<()>,
}

#[derive(Debug)]
struct FakeClientState {
    stdin: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    resize: Option<mpsc::UnboundedReceiver<TerminalSize>>,
    force_terminate: Option<mpsc::UnboundedReceiver<()>>,
    resizes_applied: Vec<TerminalSize>,
    statuses: Vec<Result<ExitStatus, SessionError>>,
}

/// An in-memory [`RemoteClient`].
#[derive(Debug)]
pub struct FakeClient {
    stdout_tx: mpsc::UnboundedSender<Vec<u8>>,
    state: Mutex<FakeClientState>,
    closed: AtomicBool,
}

impl FakeClient {
    /// Creates a fake client plus the handles a test drives it with.
    #[must_use]
    pub fn new() -> (Arc<Self>, FakeClientHandles) {
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (resize_tx, resize_rx) = mpsc::unbounded_channel();
        let (force_tx, force_rx) = mpsc::unbounded_channel();

        let client = Arc::new(Self {
            stdout_tx,
            state: Mutex::new(FakeClientState {
                stdin: Some(stdin_rx),
                resize: Some(resize_rx),
                force_terminate: Some(force_rx),
                resizes_applied: Vec::new(),
                statuses: Vec::new(),
            }),
            closed: AtomicBool::new(false),
        });

        let handles = FakeClientHandles {
            stdin: stdin_tx,
            stdout: stdout_rx,
            resize: resize_tx,
            force_terminate: force_tx,
        };

        (client, handles)
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Window sizes applied via [`RemoteClient::resize`].
    #[must_use]
    pub fn resizes_applied(&self) -> Vec<TerminalSize> {
        self.state.lock().resizes_applied.clone()
    }

    /// Statuses delivered via [`RemoteClient::send_status`].
    #[must_use]
    pub fn statuses(&self) -> Vec<Result<ExitStatus, SessionError>> {
        self.state.lock().statuses.clone()
    }
}

#[async_trait]
impl RemoteClient for FakeClient {
    fn take_stdin(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.state.lock().stdin.take()
    }

    fn stdout(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        self.stdout_tx.clone()
    }

    fn take_resize(&self) -> Option<mpsc::UnboundedReceiver<TerminalSize>> {
        self.state.lock().resize.take()
    }

    fn take_force_terminate(&self) -> Option<mpsc::UnboundedReceiver<()>> {
        self.state.lock().force_terminate.take()
    }

    async fn resize(&self, size: TerminalSize) -> Result<(), SessionError> {
        self.state.lock().resizes_applied.push(size);
        Ok(())
    }

    async fn send_status(
        &self,
        result: &Result<ExitStatus, SessionError>,
    ) -> Result<(), SessionError> {
        self.state.lock().statuses.push(result.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// An [`Executor`] that writes a fixed banner, then pumps the session
/// input until the hub closes or [`finish`](Self::finish) is called.
pub struct ScriptedExecutor {
    banner: Vec<u8>,
    result: Mutex<Option<Result<ExitStatus, SessionError>>>,
    finished: Notify,
    started: AtomicBool,
}

impl ScriptedExecutor {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_banner(b"")
    }

    /// An executor that emits `banner` as its first output.
    #[must_use]
    pub fn with_banner(banner: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            banner: banner.to_vec(),
            result: Mutex::new(None),
            finished: Notify::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Whether `stream` has been invoked.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Ends the stream with `result`.
    pub fn finish(&self, result: Result<ExitStatus, SessionError>) {
        *self.result.lock() = Some(result);
        self.finished.notify_one();
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn stream(&self, io: SessionIo, _tty: bool) -> Result<ExitStatus, SessionError> {
        self.started.store(true, Ordering::Release);

        if !self.banner.is_empty() {
            io.write_output(&self.banner).await;
        }

        let mut buf = [0u8; 256];
        loop {
            tokio::select! {
                n = io.read_input(&mut buf) => {
                    if n == 0 {
                        // Hub closed underneath us.
                        break;
                    }
                    // Echo, as a stand-in for a remote shell.
                    io.write_output(&buf[..n]).await;
                }
                () = self.finished.notified() => break,
            }
        }

        self.result
            .lock()
            .take()
            .unwrap_or(Ok(ExitStatus { code: Some(0) }))
    }
}

/// A [`RoleDirectory`] over a fixed set of roles.
#[derive(Debug, Default)]
pub struct StaticRoleDirectory {
    roles: HashMap<String, Role>,
}

impl StaticRoleDirectory {
    #[must_use]
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Arc<Self> {
        Arc::new(Self {
            roles: roles.into_iter().map(|r| (r.name.clone(), r)).collect(),
        })
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn get_role(&self, name: &str) -> Result<Role, SessionError> {
        self.roles
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("role {name}")))
    }
}
