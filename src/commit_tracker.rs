//! Commit-index signalling.
//!
//! The coordinator publishes every commit-index advance into a watch
//! channel; waiters re-check their target index on each change and race a
//! deadline.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Error;
use crate::error::Result;

pub(crate) struct CommitTracker {
    tx: watch::Sender<u64>,
}

impl CommitTracker {
    pub fn new(commit_index: u64) -> Self {
        let (tx, _rx) = watch::channel(commit_index);
        Self { tx }
    }

    /// Wake every waiter with the current commit index. Called only after
    /// the node state has been flushed, so observers never get ahead of
    /// durable state.
    pub fn publish(&self, commit_index: u64) {
        self.tx.send_replace(commit_index);
    }

    /// Wait until the published commit index reaches `index`.
    pub async fn wait_for(&self, index: u64, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut rx = self.tx.subscribe();

        loop {
            if *rx.borrow_and_update() >= index {
                return Ok(());
            }

            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => {}
                // The sender only closes when the store is torn down.
                Ok(Err(_)) | Err(_) => return Err(Error::CommitTimeout { index, timeout }),
            }
        }
    }
}
