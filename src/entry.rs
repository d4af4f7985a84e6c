//! Log entry value type.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// The entry occupying index 0 of every log. It is never written to disk.
static INITIAL: LogEntry = LogEntry {
    term: 0,
    timestamp: 0,
    payload: Vec::new(),
    snapshot_index: None,
};

/// A single record of the audit trail.
///
/// Regular entries carry an opaque payload created in some Raft `term`.
/// A snapshot entry additionally names the last log index it replaces;
/// the log stores at most one snapshot at a time.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
pub struct LogEntry {
    term: i64,
    timestamp: i64,
    payload: Vec<u8>,
    snapshot_index: Option<u64>,
}

impl LogEntry {
    /// Create a regular entry stamped with the current wall-clock time.
    pub fn new(term: i64, payload: Vec<u8>) -> Self {
        Self {
            term,
            timestamp: unix_millis(),
            payload,
            snapshot_index: None,
        }
    }

    /// Create a snapshot entry replacing every index up to and including
    /// `snapshot_index`.
    pub fn snapshot(term: i64, snapshot_index: u64, payload: Vec<u8>) -> Self {
        Self {
            term,
            timestamp: unix_millis(),
            payload,
            snapshot_index: Some(snapshot_index),
        }
    }

    pub(crate) fn from_parts(term: i64, timestamp: i64, payload: Vec<u8>, snapshot_index: Option<u64>) -> Self {
        Self {
            term,
            timestamp,
            payload,
            snapshot_index,
        }
    }

    /// The shared ephemeral entry at index 0.
    pub(crate) fn initial() -> &'static LogEntry {
        &INITIAL
    }

    /// Raft term the entry was created in.
    pub fn term(&self) -> i64 {
        self.term
    }

    /// Wall-clock creation time, in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The opaque application payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the entry, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// For a snapshot entry, the last index it replaces.
    pub fn snapshot_index(&self) -> Option<u64> {
        self.snapshot_index
    }

    /// Whether this entry is a compacted snapshot.
    pub fn is_snapshot(&self) -> bool {
        self.snapshot_index.is_some()
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
