//! Partitioned on-disk write-ahead log backing a Raft implementation.
//!
//! The audit trail is stored under a single directory:
//!
//! - `<n>` (a decimal number): a partition file holding a fixed count of log
//!   entries as an allocation table followed by a payload region,
//! - `snapshot`: the compacted prefix of the log as a single entry,
//! - `node.state`: the persistent Raft node state (term, vote, commit index,
//!   last index, last applied).
//!
//! [`WalStore`] coordinates the files and exposes the operations Raft needs:
//! ordered append, random-access range reads, commit-index advancement with
//! state-machine apply, tail truncation, snapshot installation and
//! log compaction. One writer and up to a configured number of readers run
//! concurrently; `wait_for_commit` lets callers block until replication
//! progress reaches an index.
//!
//! The embedder supplies a [`StateMachine`] that receives every committed
//! entry, and optionally a [`SnapshotBuilder`] that folds committed entries
//! into a snapshot so full partitions can be reclaimed.
//!
//! ```ignore
//! let store = WalStore::open("/var/lib/app/wal", Options::default(), sm).await?;
//! let first = store.append_entries(vec![LogEntry::new(term, cmd)]).await?;
//! store.commit(Some(first)).await?;
//! ```

#![deny(unused_qualifications)]

mod commit_tracker;
mod config;
mod entry;
mod error;
mod metadata;
mod node_state;
mod partition;
mod pio;
mod session;
mod snapshot;
mod state_machine;
mod store;

pub mod testing;

pub use config::ConfigError;
pub use config::Options;
pub use entry::LogEntry;
pub use error::Error;
pub use error::Result;
pub use node_state::NodeId;
pub use state_machine::NoSnapshotBuilder;
pub use state_machine::SnapshotBuilder;
pub use state_machine::StateMachine;
pub use store::WalStore;
