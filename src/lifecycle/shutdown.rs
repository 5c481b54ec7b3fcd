//! Cancellation signal for long-running tasks.

use tokio::sync::broadcast;

/// One-shot cancellation broadcast.
///
/// Every watcher and the push listener subscribe once; a single
/// [`trigger`](Shutdown::trigger) stops all of them and releases their
/// filesystem watch handles.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let subscribers = self.tx.send(()).unwrap_or(0);
        tracing::debug!(subscribers, "Shutdown triggered");
    }

    /// Tasks still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let mut rx = shutdown.subscribe();
                tokio::spawn(async move { rx.recv().await.is_ok() })
            })
            .collect();
        assert_eq!(shutdown.receiver_count(), 3);

        shutdown.trigger();
        for task in tasks {
            let stopped = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
            assert!(stopped);
        }
    }

    #[test]
    fn trigger_without_subscribers_is_harmless() {
        Shutdown::new().trigger();
    }
}
