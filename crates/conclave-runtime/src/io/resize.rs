//! Multi-source window-size merging.
//!
//! Every party with a terminal feeds window sizes into its own channel;
//! the executor consumes a single merged queue. Each source gets one
//! forwarding task, so sources can be added and removed while the consumer
//! is mid-receive, and a per-size callback (audit emission, peer resize
//! fan-out) runs on the forwarding task before the size is queued.

use conclave_types::TerminalSize;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Callback invoked for each merged size.
pub type ResizeCallback = Arc<dyn Fn(TerminalSize) + Send + Sync>;

/// Merges any number of window-size channels into one queue.
pub struct ResizeMultiplexer {
    // Master sender; dropping it (close) ends the merged stream once the
    // forwarders are gone.
    out_tx: Mutex<Option<mpsc::UnboundedSender<TerminalSize>>>,
    out_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TerminalSize>>,
    sources: Mutex<HashMap<String, JoinHandle<()>>>,
    callback: Arc<Mutex<Option<ResizeCallback>>>,
}

impl ResizeMultiplexer {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            out_tx: Mutex::new(Some(out_tx)),
            out_rx: tokio::sync::Mutex::new(out_rx),
            sources: Mutex::new(HashMap::new()),
            callback: Arc::new(Mutex::new(None)),
        })
    }

    /// Installs the per-size callback.
    pub fn set_callback(&self, callback: ResizeCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// Adds a size source. Replacing an existing id stops its forwarder.
    pub fn add(&self, id: &str, mut rx: mpsc::UnboundedReceiver<TerminalSize>) {
        let Some(tx) = self.out_tx.lock().clone() else {
            // Already closed; nothing to feed.
            return;
        };
        let callback = self.callback.clone();

        let forward = tokio::spawn(async move {
            while let Some(size) = rx.recv().await {
                let cb = callback.lock().clone();
                if let Some(cb) = cb {
                    cb(size);
                }
                if tx.send(size).is_err() {
                    return;
                }
            }
        });

        let mut sources = self.sources.lock();
        if let Some(old) = sources.insert(id.to_string(), forward) {
            old.abort();
        }
    }

    /// Removes a size source.
    pub fn remove(&self, id: &str) {
        if let Some(forward) = self.sources.lock().remove(id) {
            forward.abort();
        }
    }

    /// The next merged size, or `None` once the queue is closed and
    /// drained.
    pub async fn next(&self) -> Option<TerminalSize> {
        self.out_rx.lock().await.recv().await
    }

    /// Ends the merged stream: stops every forwarder and drops the master
    /// sender, so pending sizes drain and `next` then yields `None`.
    pub fn close(&self) {
        for (_, forward) in self.sources.lock().drain() {
            forward.abort();
        }
        self.out_tx.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    fn size(w: u16, h: u16) -> TerminalSize {
        TerminalSize::new(w, h)
    }

    #[tokio::test]
    async fn merges_multiple_sources() {
        let mux = ResizeMultiplexer::new();
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        mux.add("a", rx_a);
        mux.add("b", rx_b);

        tx_a.send(size(80, 24)).unwrap();
        tx_b.send(size(120, 40)).unwrap();

        let mut seen = vec![
            timeout(SHORT, mux.next()).await.unwrap().unwrap(),
            timeout(SHORT, mux.next()).await.unwrap().unwrap(),
        ];
        seen.sort_by_key(|s| s.width);
        assert_eq!(seen, vec![size(80, 24), size(120, 40)]);
    }

    #[tokio::test]
    async fn callback_runs_per_size() {
        let mux = ResizeMultiplexer::new();
        let seen: Arc<Mutex<Vec<TerminalSize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        mux.set_callback(Arc::new(move |s| sink.lock().push(s)));

        let (tx, rx) = mpsc::unbounded_channel();
        mux.add("a", rx);
        tx.send(size(100, 30)).unwrap();

        timeout(SHORT, mux.next()).await.unwrap().unwrap();
        assert_eq!(seen.lock().as_slice(), [size(100, 30)]);
    }

    #[tokio::test]
    async fn removed_source_stops_flowing() {
        let mux = ResizeMultiplexer::new();
        let (tx, rx) = mpsc::unbounded_channel();
        mux.add("a", rx);
        mux.remove("a");

        tx.send(size(80, 24)).ok();
        assert!(timeout(SHORT, mux.next()).await.is_err());
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let mux = ResizeMultiplexer::new();
        let (tx, rx) = mpsc::unbounded_channel();
        mux.add("a", rx);
        tx.send(size(80, 24)).unwrap();

        // Let the forwarder move the size into the merged queue.
        tokio::task::yield_now().await;
        mux.close();

        assert_eq!(mux.next().await, Some(size(80, 24)));
        assert_eq!(mux.next().await, None);
    }

    #[tokio::test]
    async fn add_after_close_is_inert() {
        let mux = ResizeMultiplexer::new();
        mux.close();

        let (tx, rx) = mpsc::unbounded_channel();
        mux.add("late", rx);
        tx.send(size(80, 24)).ok();

        assert_eq!(mux.next().await, None);
    }
}
