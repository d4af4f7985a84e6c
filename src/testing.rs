//! Test doubles for embedders of [`WalStore`](crate::WalStore).
//!
//! Shared by this crate's own tests; applications can reuse them to unit
//! test code that is generic over [`StateMachine`].

use std::sync::Mutex;

use crate::entry::LogEntry;
use crate::error::Result;
use crate::state_machine::NoSnapshotBuilder;
use crate::state_machine::SnapshotBuilder;
use crate::state_machine::StateMachine;

/// A state machine that ignores every entry and never snapshots, leaving
/// all partitions in place.
pub struct NullStateMachine;

impl StateMachine for NullStateMachine {
    type Builder = NoSnapshotBuilder;

    async fn apply(&self, _index: u64, _entry: &LogEntry) -> Result<()> {
        Ok(())
    }

    fn snapshot_builder(&self) -> Option<Self::Builder> {
        None
    }
}

/// Records every applied entry and compacts by joining payloads.
#[derive(Default)]
pub struct RecordingStateMachine {
    applied: Mutex<Vec<(u64, Vec<u8>)>>,
}

impl RecordingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(index, payload)` pair applied so far, in order.
    pub fn applied(&self) -> Vec<(u64, Vec<u8>)> {
        self.applied.lock().unwrap().clone()
    }
}

impl StateMachine for RecordingStateMachine {
    type Builder = JoiningSnapshotBuilder;

    async fn apply(&self, index: u64, entry: &LogEntry) -> Result<()> {
        self.applied.lock().unwrap().push((index, entry.payload().to_vec()));
        Ok(())
    }

    fn snapshot_builder(&self) -> Option<Self::Builder> {
        Some(JoiningSnapshotBuilder::default())
    }
}

/// Builds a snapshot whose payload is the comma-joined payloads of the
/// entries fed in, stamped with the highest term observed.
#[derive(Default)]
pub struct JoiningSnapshotBuilder {
    term: i64,
    parts: Vec<Vec<u8>>,
}

impl SnapshotBuilder for JoiningSnapshotBuilder {
    async fn apply(&mut self, _index: u64, entry: &LogEntry) -> Result<()> {
        self.term = self.term.max(entry.term());
        self.parts.push(entry.payload().to_vec());
        Ok(())
    }

    async fn build(self, snapshot_index: u64) -> Result<LogEntry> {
        let payload = self.parts.join(&b","[..]);
        Ok(LogEntry::snapshot(self.term, snapshot_index, payload))
    }
}
