use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;

/// Result type of every fallible `walstore` operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by the store.
///
/// I/O failures and commit-wait timeouts are operational and may be retried.
/// The remaining variants indicate a call that violates the log contract,
/// such as writing over the committed prefix.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store was opened with invalid [`Options`](crate::Options).
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// The requested index is beyond the end of the log.
    #[error("index {index} is out of range, last index is {last_index}")]
    IndexOutOfRange {
        /// The offending index.
        index: u64,
        /// The highest index the log holds.
        last_index: u64,
    },

    /// A snapshot must replace a whole number of partitions.
    #[error(
        "snapshot index {index} does not end a partition (records per partition: {records_per_partition})"
    )]
    MisalignedSnapshotIndex {
        /// The offending snapshot index.
        index: u64,
        /// Partition capacity the index must align with.
        records_per_partition: u32,
    },

    /// A write would replace an entry that is already committed.
    #[error("write at index {index} would overwrite the committed prefix (commit index: {commit_index})")]
    Overwrite {
        /// The offending index.
        index: u64,
        /// The current commit index.
        commit_index: u64,
    },

    /// Snapshot entries are installed one at a time, never inside a batch.
    #[error("snapshot entries cannot be appended in a batch")]
    SnapshotInBatch,

    /// An entry below the commit index is gone from its partition.
    #[error("log entry {index} is not present in partition {partition}")]
    MissingEntry {
        /// Partition number the entry belongs to.
        partition: u64,
        /// The missing index.
        index: u64,
    },

    /// A metadata region ended before the expected number of bytes.
    #[error("unexpected end of file in {}", .path.display())]
    UnexpectedEof {
        /// The truncated file.
        path: PathBuf,
    },

    /// The requested read span does not fit in a single buffer.
    #[error("a read of {requested} entries exceeds the supported span")]
    BufferOverflow {
        /// Number of entries requested.
        requested: u64,
    },

    /// `wait_for_commit` reached its deadline.
    #[error("timeout after {timeout:?} waiting for commit index {index}")]
    CommitTimeout {
        /// The awaited commit index.
        index: u64,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Underlying filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
