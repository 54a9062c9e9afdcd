use tokio::sync::watch;

/// One-shot signal that the directory cache has been populated at least once.
///
/// The server waits on it before accepting RPCs. Cloning shares
/// the same latch.
#[derive(Debug, Clone)]
pub struct ReadinessLatch {
    tx: watch::Sender<bool>,
}

impl ReadinessLatch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Opens the latch. Later calls are no-ops.
    pub fn mark_ready(&self) {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `mark_ready` has been called, immediately if it already was
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadinessLatch {
    fn default() -> Self {
        Self::new()
    }
}
