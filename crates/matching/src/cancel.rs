//! Cooperative cancellation shared by every matcher of one decision.

use std::sync::Arc;
use tokio::sync::watch;

use crate::error::MatcherError;

/// Cloneable cancellation flag. Cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only resolves on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// `Err(Cancelled)` once cancelled, for checkpoints inside a matcher.
    pub fn check(&self, matcher_id: &str) -> Result<(), MatcherError> {
        if self.is_cancelled() {
            Err(MatcherError::Cancelled {
                matcher_id: matcher_id.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_shared() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();
        assert!(signal.check("geo").is_ok());
        clone.cancel();
        assert!(signal.is_cancelled());
        assert!(matches!(signal.check("geo"), Err(MatcherError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let signal = CancellationSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
