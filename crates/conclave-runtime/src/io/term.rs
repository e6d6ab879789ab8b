//! The terminal I/O hub.
//!
//! One [`TermManager`] sits between every party and the execution backend:
//!
//! ```text
//!  party stdin ──┐                       ┌── party stdout
//!  party stdin ──┼──► input buffer ──►   │
//!                │        (read)    hub ─┼── party stdout
//!  recorder ◄────┴────────────────(write)└── recorder
//! ```
//!
//! - Named **readers** feed the merged input buffer; bytes from a single
//!   reader keep their order, interleaving across readers is unspecified.
//! - Named **writers** mirror every output chunk; a writer whose channel
//!   has gone away is dropped and reported through the write-error
//!   callback.
//! - A bounded **history ring** keeps the most recent output for replay to
//!   late joiners.
//! - An **on/off gate** pauses the session: reads and writes block while
//!   the gate is off.
//!
//! One mutex guards the reader/writer sets and buffers; channel sends are
//! delivered on clones so nothing external runs under the lock. The
//! write-error callback in particular runs strictly after the lock is
//! released: it re-enters the session, and the session lock is always
//! taken before the hub's.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// Callback invoked with the name of a writer whose channel failed.
pub type WriteErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct TermState {
    writers: HashMap<String, mpsc::UnboundedSender<Vec<u8>>>,
    readers: HashMap<String, JoinHandle<()>>,
    input: VecDeque<u8>,
    history: VecDeque<u8>,
}

/// Multi-reader/multi-writer terminal fan-out hub.
pub struct TermManager {
    state: Mutex<TermState>,
    on_write_error: Mutex<Option<WriteErrorCallback>>,
    // Gate bit: true = on. Readers and writers wait on this.
    gate: watch::Sender<bool>,
    // Wakes the input consumer on new data, gate flips, and shutdown.
    input_ready: Notify,
    closed: AtomicBool,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    history_size: usize,
}

impl TermManager {
    /// Creates a hub with the gate on and an empty roster.
    #[must_use]
    pub fn new(history_size: usize) -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            state: Mutex::new(TermState {
                writers: HashMap::new(),
                readers: HashMap::new(),
                input: VecDeque::new(),
                history: VecDeque::new(),
            }),
            on_write_error: Mutex::new(None),
            gate,
            input_ready: Notify::new(),
            closed: AtomicBool::new(false),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            history_size,
        })
    }

    /// Installs the write-error callback. Invoked outside the hub lock.
    pub fn set_on_write_error(&self, callback: WriteErrorCallback) {
        *self.on_write_error.lock() = Some(callback);
    }

    /// Registers an input source; a pump task appends its chunks to the
    /// merged input buffer in arrival order.
    pub fn add_reader(self: &Arc<Self>, name: &str, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        let hub = Arc::downgrade(self);
        let pump = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                let Some(hub) = hub.upgrade() else { return };
                if hub.is_closed() {
                    return;
                }
                hub.push_input(&chunk);
            }
        });

        let mut state = self.state.lock();
        if let Some(old) = state.readers.insert(name.to_string(), pump) {
            old.abort();
        }
    }

    /// Deregisters an input source.
    pub fn remove_reader(&self, name: &str) {
        if let Some(pump) = self.state.lock().readers.remove(name) {
            pump.abort();
        }
    }

    /// Registers an output sink.
    pub fn add_writer(&self, name: &str, tx: mpsc::UnboundedSender<Vec<u8>>) {
        self.state.lock().writers.insert(name.to_string(), tx);
    }

    /// Deregisters an output sink.
    pub fn remove_writer(&self, name: &str) {
        self.state.lock().writers.remove(name);
    }

    /// The most recent output bytes, for replay to a new writer.
    #[must_use]
    pub fn recent_history(&self) -> Vec<u8> {
        self.state.lock().history.iter().copied().collect()
    }

    /// Total bytes consumed from the input buffer.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Total bytes mirrored to writers.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Whether the gate is on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        *self.gate.borrow()
    }

    /// Whether the hub has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Turns the gate on, releasing blocked reads and writes.
    pub fn set_on(&self) {
        self.gate.send_replace(true);
        self.input_ready.notify_one();
    }

    /// Turns the gate off; subsequent reads and writes block.
    pub fn set_off(&self) {
        self.gate.send_replace(false);
        self.input_ready.notify_one();
    }

    /// Sends a banner line to every writer.
    ///
    /// Messages bypass the gate, the history ring, and the byte counters:
    /// a paused session still announces why it paused.
    pub fn broadcast_message(&self, message: &str) {
        let line = format!("\r\n{message}\r\n").into_bytes();
        let writers: Vec<_> = self.state.lock().writers.values().cloned().collect();
        for tx in writers {
            let _ = tx.send(line.clone());
        }
    }

    /// Appends input bytes from a reader.
    fn push_input(&self, chunk: &[u8]) {
        {
            let mut state = self.state.lock();
            state.input.extend(chunk.iter().copied());
        }
        self.input_ready.notify_one();
    }

    /// Reads from the merged input stream into `buf`.
    ///
    /// Blocks while the gate is off or no input is buffered. Returns 0
    /// exactly once the hub is closed.
    pub async fn read_input(&self, buf: &mut [u8]) -> usize {
        loop {
            if self.is_closed() {
                return 0;
            }
            if !self.is_on() {
                self.wait_until_on().await;
                continue;
            }

            let ready = self.input_ready.notified();
            {
                let mut state = self.state.lock();
                if !state.input.is_empty() {
                    let n = buf.len().min(state.input.len());
                    for slot in buf.iter_mut().take(n) {
                        // Length checked above; the buffer cannot run dry.
                        *slot = state.input.pop_front().unwrap_or_default();
                    }
                    self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                    return n;
                }
            }
            ready.await;
        }
    }

    /// Mirrors `chunk` to every writer, recording it in the history ring.
    ///
    /// Blocks while the gate is off. Writers whose channel has gone away
    /// are dropped and reported through the write-error callback, after
    /// the hub lock is released. Returns the number of bytes accepted
    /// (0 once closed).
    pub async fn write_output(&self, chunk: &[u8]) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.wait_until_on().await;
        if self.is_closed() {
            return 0;
        }

        let mut failed = Vec::new();
        {
            let mut state = self.state.lock();

            state.history.extend(chunk.iter().copied());
            while state.history.len() > self.history_size {
                state.history.pop_front();
            }

            let targets: Vec<_> = state
                .writers
                .iter()
                .map(|(name, tx)| (name.clone(), tx.clone()))
                .collect();
            for (name, tx) in targets {
                if tx.send(chunk.to_vec()).is_err() {
                    failed.push(name);
                }
            }
            for name in &failed {
                state.writers.remove(name);
            }
        }
        self.bytes_written.fetch_add(chunk.len() as u64, Ordering::Relaxed);

        if !failed.is_empty() {
            let callback = self.on_write_error.lock().clone();
            if let Some(callback) = callback {
                for name in &failed {
                    debug!(writer = %name, "writer channel failed, ejecting");
                    callback(name);
                }
            }
        }

        chunk.len()
    }

    /// Shuts the hub: readers stop pumping, blocked reads return 0, and
    /// the writer set is dropped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut state = self.state.lock();
        for (_, pump) in state.readers.drain() {
            pump.abort();
        }
        state.writers.clear();
        drop(state);

        // Release anything parked on the gate or the input buffer.
        self.gate.send_replace(true);
        self.input_ready.notify_one();
    }

    async fn wait_until_on(&self) {
        let mut rx = self.gate.subscribe();
        loop {
            if self.is_closed() || *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
