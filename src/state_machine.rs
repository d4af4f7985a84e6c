//! Embedder hooks.
//!
//! The store drives the user state machine: every committed entry is passed
//! to [`StateMachine::apply`] exactly once, in index order. When the
//! embedder also provides a [`SnapshotBuilder`], the store folds whole
//! committed partitions into a snapshot entry and reclaims their files.

use crate::entry::LogEntry;
use crate::error::Result;

/// The replicated application state the log feeds.
#[allow(async_fn_in_trait)]
pub trait StateMachine: Send + Sync + 'static {
    /// Builder used to compact committed entries into a snapshot.
    type Builder: SnapshotBuilder;

    /// Apply one committed entry. During snapshot installation this is also
    /// invoked with the snapshot entry itself.
    async fn apply(&self, index: u64, entry: &LogEntry) -> Result<()>;

    /// Start building a snapshot, or return `None` to opt out of log
    /// compaction.
    fn snapshot_builder(&self) -> Option<Self::Builder>;
}

/// Incrementally folds committed entries into a snapshot entry.
#[allow(async_fn_in_trait)]
pub trait SnapshotBuilder: Send {
    /// Fold one entry into the snapshot under construction. The existing
    /// snapshot entry, when there is one, is fed first.
    async fn apply(&mut self, index: u64, entry: &LogEntry) -> Result<()>;

    /// Serialize the accumulated state as the snapshot entry replacing the
    /// log up to `snapshot_index`.
    async fn build(self, snapshot_index: u64) -> Result<LogEntry>;
}

/// Builder type for state machines that never produce snapshots.
///
/// The enum has no variants, so the methods are unreachable; use it as the
/// [`StateMachine::Builder`] of an implementation whose `snapshot_builder`
/// returns `None`.
pub enum NoSnapshotBuilder {}

impl SnapshotBuilder for NoSnapshotBuilder {
    async fn apply(&mut self, _index: u64, _entry: &LogEntry) -> Result<()> {
        match *self {}
    }

    async fn build(self, _snapshot_index: u64) -> Result<LogEntry> {
        match self {}
    }
}
