//! Shutdown coordination.

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// The server and any background task subscribe; one `trigger` stops them all.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a coordinator with no subscribers yet.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// A receiver that resolves through [`wait`] once shutdown is triggered.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber to stop.
    pub fn trigger(&self) {
        let subscribers = self.tx.send(()).unwrap_or(0);
        tracing::info!(subscribers, "Shutdown triggered");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once a shutdown is signalled, or the sender is gone.
pub async fn wait(mut rx: broadcast::Receiver<()>) {
    // Lagged and Closed both mean a shutdown was (or can no longer be) sent.
    let _ = rx.recv().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_all_subscribers() {
        let shutdown = Shutdown::new();
        let a = shutdown.subscribe();
        let b = shutdown.subscribe();

        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), async {
            wait(a).await;
            wait(b).await;
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_coordinator_releases_waiters() {
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        drop(shutdown);

        tokio::time::timeout(Duration::from_secs(1), wait(rx)).await.unwrap();
    }
}
