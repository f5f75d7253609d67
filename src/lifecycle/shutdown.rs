//! Shutdown coordination for servers.

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Holds a latched flag that all long-running tasks can subscribe to; a
/// receiver created after `trigger` still observes the request.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once shutdown has been triggered.
///
/// A dropped coordinator is not a shutdown request: the future then stays
/// pending, so a server whose caller discarded the `Shutdown` keeps running.
pub async fn requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|triggered| *triggered).await.is_err() {
        std::future::pending::<()>().await;
    }
}
