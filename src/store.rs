//! The persistent log coordinator.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::commit_tracker::CommitTracker;
use crate::config::Options;
use crate::entry::LogEntry;
use crate::error::Error;
use crate::error::Result;
use crate::node_state::NodeId;
use crate::node_state::NodeState;
use crate::partition::Partition;
use crate::session::Session;
use crate::session::SessionPool;
use crate::snapshot::SnapshotFile;
use crate::snapshot::SNAPSHOT_FILE;
use crate::snapshot::SNAPSHOT_TEMP_FILE;
use crate::state_machine::SnapshotBuilder;
use crate::state_machine::StateMachine;

const NODE_STATE_FILE: &str = "node.state";

/// The durable, partitioned audit trail of a Raft node.
///
/// All operations run under one shared asynchronous lock admitting either a
/// single writer or up to `max_concurrent_reads` readers, so appends are
/// totally ordered while range reads proceed in parallel. Durability points
/// are explicit: an append flushes the partitions it touched and then the
/// node state, and commit advancement is observable through
/// [`wait_for_commit`](Self::wait_for_commit) only after the node state
/// reached disk.
///
/// The type parameter is the embedder's [`StateMachine`], which receives
/// every committed entry exactly once, in index order.
pub struct WalStore<M: StateMachine> {
    dir: PathBuf,
    options: Options,
    state_machine: M,
    inner: RwLock<Inner>,
    sessions: SessionPool,
    commits: CommitTracker,
}

struct Inner {
    /// Live partitions, keyed and iterated by partition number.
    partitions: BTreeMap<u64, Partition>,
    snapshot: SnapshotFile,
    node: NodeState,
    /// Scratch session reserved for the exclusive-lock holder.
    write_session: Session,
}

impl<M: StateMachine> WalStore<M> {
    /// Open the log rooted at `dir`, creating the directory when missing.
    ///
    /// Every file whose name parses as a decimal number is loaded as a
    /// partition; the snapshot and node state are restored alongside.
    /// Partitions that lie entirely past the recorded last index are
    /// leftovers of a crash between a partition write and the node-state
    /// flush, and are deleted.
    pub async fn open(dir: impl Into<PathBuf>, options: Options, state_machine: M) -> Result<Self> {
        let dir = dir.into();
        let options = options.validate()?;

        fs::create_dir_all(&dir)?;

        let node = NodeState::open(&dir.join(NODE_STATE_FILE))?;
        let mut write_session = Session::new(options.buffer_size as usize);

        let mut partitions = BTreeMap::new();
        for dirent in fs::read_dir(&dir)? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(number) = name.parse::<u64>() else { continue };

            let partition = Partition::open(&dir, number, &options, &mut write_session)?;
            partitions.insert(number, partition);
        }

        let last_index = node.last_index();
        let orphans: Vec<u64> = partitions
            .iter()
            .filter(|(_, p)| p.first_index() > last_index)
            .map(|(&n, _)| n)
            .collect();
        for number in orphans {
            tracing::warn!(partition = number, "removing partition past the recorded last index");
            if let Some(partition) = partitions.remove(&number) {
                partition.destroy()?;
            }
        }

        if dir.join(SNAPSHOT_TEMP_FILE).exists() {
            tracing::warn!("found {}; a snapshot installation did not complete", SNAPSHOT_TEMP_FILE);
        }

        let snapshot = SnapshotFile::open(&dir, false)?;

        tracing::info!(
            path = %dir.display(),
            partitions = partitions.len(),
            last_index = node.last_index(),
            commit_index = node.commit_index(),
            snapshot_index = snapshot.index(),
            "opened write-ahead log"
        );

        let commits = CommitTracker::new(node.commit_index());
        let sessions = SessionPool::new(options.buffer_size as usize, options.max_concurrent_reads as usize);
        let max_readers = options.max_concurrent_reads;

        Ok(Self {
            dir,
            options,
            state_machine,
            inner: RwLock::with_max_readers(
                Inner {
                    partitions,
                    snapshot,
                    node,
                    write_session,
                },
                max_readers,
            ),
            sessions,
            commits,
        })
    }

    /// The embedder's state machine.
    pub fn state_machine(&self) -> &M {
        &self.state_machine
    }

    /// The ephemeral entry at index 0. It always exists and is never
    /// persisted.
    pub fn first(&self) -> &'static LogEntry {
        LogEntry::initial()
    }

    /// The highest stored index, or with `committed` set, the commit index.
    pub async fn last_index(&self, committed: bool) -> u64 {
        let inner = self.inner.read().await;
        if committed {
            inner.node.commit_index()
        } else {
            inner.node.last_index()
        }
    }

    /// The current Raft term.
    pub async fn term(&self) -> i64 {
        self.inner.read().await.node.term()
    }

    /// Move to the next term, returning it. The vote is reset.
    pub async fn increment_term(&self) -> Result<i64> {
        let mut inner = self.inner.write().await;
        let term = inner.node.increment_term();
        inner.node.persist()?;
        Ok(term)
    }

    /// Adopt a greater term observed from a peer; stale terms are ignored.
    pub async fn update_term(&self, term: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.node.update_term(term);
        inner.node.persist()?;
        Ok(())
    }

    /// Whether a vote can be granted to `member` in the current term.
    pub async fn is_voted_for(&self, member: NodeId) -> bool {
        self.inner.read().await.node.is_voted_for(member)
    }

    /// Record the vote cast in the current term.
    pub async fn update_voted_for(&self, member: Option<NodeId>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.node.set_voted_for(member);
        inner.node.persist()?;
        tracing::debug!(term = inner.node.term(), voted_for = ?inner.node.voted_for(), "vote recorded");
        Ok(())
    }

    /// Term of the highest entry the log holds, whether it lives in a
    /// partition, in the snapshot, or is the initial entry.
    pub async fn last_entry_term(&self) -> Result<i64> {
        let inner = self.inner.read().await;

        let last_index = inner.node.last_index();
        if last_index == 0 {
            return Ok(0);
        }

        let number = last_index / self.options.records_per_partition as u64;
        if let Some(partition) = inner.partitions.get(&number) {
            let mut session = self.sessions.acquire();
            let meta = partition.metadata(&mut session, (last_index - partition.first_index()) as u32);
            self.sessions.release(session);

            let meta = meta?;
            if !meta.is_vacant() {
                return Ok(meta.term);
            }
        }

        if inner.snapshot.index() == last_index {
            return Ok(inner.snapshot.term());
        }

        Ok(0)
    }

    /// Append a batch at the tail of the log, returning the index assigned
    /// to its first entry.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn append_entries<I>(&self, entries: I) -> Result<u64>
    where I: IntoIterator<Item = LogEntry> {
        let mut guard = self.inner.write().await;
        let first_index = guard.node.last_index() + 1;
        self.append_locked(&mut guard, entries, first_index, false)?;
        Ok(first_index)
    }

    /// Append a batch starting at `start_index`, which must not be past the
    /// end of the log. Entries at or below the commit index fail with
    /// [`Error::Overwrite`] unless `skip_committed` is set, in which case
    /// they are skipped without being written; snapshot entries are
    /// rejected outright.
    #[tracing::instrument(level = "trace", skip_all, fields(start_index = start_index, skip_committed = skip_committed))]
    pub async fn append<I>(&self, entries: I, start_index: u64, skip_committed: bool) -> Result<()>
    where I: IntoIterator<Item = LogEntry> {
        let mut guard = self.inner.write().await;
        self.append_locked(&mut guard, entries, start_index, skip_committed)
    }

    /// Append one entry at `start_index`, replacing any uncommitted tail
    /// the log had past it. A snapshot entry instead installs a snapshot
    /// covering the log up to `start_index`.
    #[tracing::instrument(level = "trace", skip_all, fields(start_index = start_index))]
    pub async fn append_at(&self, entry: &LogEntry, start_index: u64) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        if entry.is_snapshot() {
            return self.install_snapshot(inner, entry, start_index).await;
        }

        let commit_index = inner.node.commit_index();
        if start_index <= commit_index {
            return Err(Error::Overwrite {
                index: start_index,
                commit_index,
            });
        }
        if start_index > inner.node.last_index() + 1 {
            return Err(Error::IndexOutOfRange {
                index: start_index,
                last_index: inner.node.last_index(),
            });
        }

        let Inner {
            partitions,
            node,
            write_session,
            ..
        } = inner;

        let number = start_index / self.options.records_per_partition as u64;
        let partition = self.partition_mut(partitions, write_session, number)?;
        partition.write(write_session, entry, start_index)?;
        partition.flush()?;

        node.set_last_index(start_index);
        node.persist()?;

        Ok(())
    }

    /// Pass the entries in `[start_index, end_index]` to `reader` and
    /// return its result.
    ///
    /// When the range begins inside the compacted prefix, the first entry
    /// handed over is the snapshot entry and the second callback argument
    /// carries its index; plain ranges get `None`. An inverted range is
    /// answered with an empty slice.
    #[tracing::instrument(level = "trace", skip_all, fields(start_index = start_index, end_index = end_index))]
    pub async fn read<T, F>(&self, start_index: u64, end_index: u64, reader: F) -> Result<T>
    where F: FnOnce(&[LogEntry], Option<u64>) -> T {
        if end_index < start_index {
            return Ok(reader(&[], None));
        }

        let inner = self.inner.read().await;

        let last_index = inner.node.last_index();
        if start_index > last_index {
            return Err(Error::IndexOutOfRange {
                index: start_index,
                last_index,
            });
        }
        if end_index > last_index {
            return Err(Error::IndexOutOfRange {
                index: end_index,
                last_index,
            });
        }

        let requested = end_index - start_index + 1;
        if requested > i32::MAX as u64 {
            return Err(Error::BufferOverflow { requested });
        }

        let mut session = self.sessions.acquire();
        let collected = self.collect_range(&inner, &mut session, start_index, end_index);
        self.sessions.release(session);

        let (entries, snapshot_index) = collected?;
        Ok(reader(&entries, snapshot_index))
    }

    /// Pass the entries from `start_index` through the end of the log to
    /// `reader` and return its result.
    #[tracing::instrument(level = "trace", skip_all, fields(start_index = start_index))]
    pub async fn read_to_end<T, F>(&self, start_index: u64, reader: F) -> Result<T>
    where F: FnOnce(&[LogEntry], Option<u64>) -> T {
        let inner = self.inner.read().await;

        let last_index = inner.node.last_index();
        if start_index > last_index {
            return Err(Error::IndexOutOfRange {
                index: start_index,
                last_index,
            });
        }

        let mut session = self.sessions.acquire();
        let collected = self.collect_range(&inner, &mut session, start_index, last_index);
        self.sessions.release(session);

        let (entries, snapshot_index) = collected?;
        Ok(reader(&entries, snapshot_index))
    }

    /// Advance the commit index through `end_index` (or the end of the log)
    /// and apply every newly committed entry to the state machine. Returns
    /// the number of entries committed, 0 when there is nothing new.
    ///
    /// When enough committed entries have accumulated past the snapshot and
    /// the state machine provides a builder, full partitions are compacted
    /// before the call returns.
    #[tracing::instrument(level = "trace", skip_all, fields(end_index = ?end_index))]
    pub async fn commit(&self, end_index: Option<u64>) -> Result<u64> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let last_index = inner.node.last_index();
        let end = end_index.unwrap_or(last_index).min(last_index);
        let commit_index = inner.node.commit_index();
        if end <= commit_index {
            return Ok(0);
        }

        let count = end - commit_index;
        inner.node.set_commit_index(end);

        self.apply_committed(inner).await?;
        self.force_compaction(inner).await?;
        self.commits.publish(end);

        tracing::debug!(commit_index = end, count, "commit index advanced");
        Ok(count)
    }

    /// Drop every entry at and after `start_index`, which must be above the
    /// commit index. Returns the number of entries dropped.
    #[tracing::instrument(level = "trace", skip_all, fields(start_index = start_index))]
    pub async fn truncate(&self, start_index: u64) -> Result<u64> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let commit_index = inner.node.commit_index();
        if start_index <= commit_index {
            return Err(Error::Overwrite {
                index: start_index,
                commit_index,
            });
        }

        let last_index = inner.node.last_index();
        if start_index > last_index {
            return Ok(0);
        }

        tracing::debug!("truncate: [{}, +oo)", start_index);

        let count = last_index - start_index + 1;
        inner.node.set_last_index(start_index - 1);
        inner.node.persist()?;

        // Partitions that start at or after the cut hold nothing else.
        let first_removed = start_index.div_ceil(self.options.records_per_partition as u64);
        let doomed: Vec<u64> = inner.partitions.range(first_removed..).map(|(&n, _)| n).collect();
        for number in doomed {
            if let Some(partition) = inner.partitions.remove(&number) {
                partition.destroy()?;
                tracing::debug!(partition = number, "removed truncated partition");
            }
        }

        Ok(count)
    }

    /// Wait until the commit index reaches `index`, or fail with
    /// [`Error::CommitTimeout`].
    #[tracing::instrument(level = "trace", skip_all, fields(index = index, timeout = ?timeout))]
    pub async fn wait_for_commit(&self, index: u64, timeout: Duration) -> Result<()> {
        self.commits.wait_for(index, timeout).await
    }

    /// Apply every committed entry the state machine has not seen yet.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn ensure_consistency(&self) -> Result<()> {
        let mut guard = self.inner.write().await;
        self.apply_committed(&mut guard).await
    }

    fn partition_mut<'a>(
        &self,
        partitions: &'a mut BTreeMap<u64, Partition>,
        session: &mut Session,
        number: u64,
    ) -> Result<&'a mut Partition> {
        match partitions.entry(number) {
            btree_map::Entry::Occupied(e) => Ok(e.into_mut()),
            btree_map::Entry::Vacant(v) => {
                let partition = Partition::open(&self.dir, number, &self.options, session)?;
                Ok(v.insert(partition))
            }
        }
    }

    fn append_locked<I>(&self, inner: &mut Inner, entries: I, start_index: u64, skip_committed: bool) -> Result<()>
    where I: IntoIterator<Item = LogEntry> {
        let Inner {
            partitions,
            node,
            write_session,
            ..
        } = inner;

        if start_index > node.last_index() + 1 {
            return Err(Error::IndexOutOfRange {
                index: start_index,
                last_index: node.last_index(),
            });
        }

        let mut index = start_index;
        let mut touched: Option<u64> = None;

        for entry in entries {
            if entry.is_snapshot() {
                return Err(Error::SnapshotInBatch);
            }

            if index > node.commit_index() {
                let number = index / self.options.records_per_partition as u64;

                // Crossing a partition boundary; make the finished one
                // durable before moving on.
                if let Some(previous) = touched {
                    if previous != number {
                        if let Some(partition) = partitions.get(&previous) {
                            partition.flush()?;
                        }
                    }
                }

                let partition = self.partition_mut(partitions, write_session, number)?;
                partition.write(write_session, &entry, index)?;
                node.set_last_index(index);
                touched = Some(number);
            } else if !skip_committed {
                return Err(Error::Overwrite {
                    index,
                    commit_index: node.commit_index(),
                });
            }

            index += 1;
        }

        if let Some(number) = touched {
            if let Some(partition) = partitions.get(&number) {
                partition.flush()?;
            }
        }
        node.persist()?;

        Ok(())
    }

    /// Replace the snapshot with `entry`, covering the log up to
    /// `snapshot_index`, then reclaim every partition it swallows.
    async fn install_snapshot(&self, inner: &mut Inner, entry: &LogEntry, snapshot_index: u64) -> Result<()> {
        if (snapshot_index + 1) % self.options.records_per_partition as u64 != 0 {
            return Err(Error::MisalignedSnapshotIndex {
                index: snapshot_index,
                records_per_partition: self.options.records_per_partition,
            });
        }

        tracing::info!(snapshot_index, "installing snapshot");

        let mut staged = SnapshotFile::open(&self.dir, true)?;
        staged.write(entry, snapshot_index)?;
        staged.flush()?;
        drop(staged);

        // Failing between the delete and the rename leaves only
        // `snapshot.new` on disk, a state an operator must repair by hand;
        // the process cannot keep running against it.
        if let Err(e) = fs::remove_file(self.dir.join(SNAPSHOT_FILE)) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::error!(error = %e, "cannot remove the snapshot being replaced");
                std::process::abort();
            }
        }
        if let Err(e) = fs::rename(self.dir.join(SNAPSHOT_TEMP_FILE), self.dir.join(SNAPSHOT_FILE)) {
            tracing::error!(error = %e, "snapshot rename failed mid-swap");
            std::process::abort();
        }

        inner.snapshot = SnapshotFile::open(&self.dir, false)?;

        let covered: Vec<u64> = inner
            .partitions
            .iter()
            .filter(|(_, p)| p.last_index() <= snapshot_index)
            .map(|(&n, _)| n)
            .collect();
        for number in covered {
            if let Some(partition) = inner.partitions.remove(&number) {
                partition.destroy()?;
                tracing::debug!(partition = number, "removed partition covered by the snapshot");
            }
        }

        inner.node.set_last_index(snapshot_index.max(inner.node.last_index()));
        inner.node.set_commit_index(snapshot_index);

        let snapshot_entry = inner.snapshot.read()?;
        self.state_machine.apply(snapshot_index, &snapshot_entry).await?;
        inner.node.set_last_applied(snapshot_index);
        inner.node.persist()?;

        self.commits.publish(inner.node.commit_index());

        Ok(())
    }

    /// Feed entries in `(last_applied, commit_index]` to the state machine,
    /// then persist the advanced watermark.
    async fn apply_committed(&self, inner: &mut Inner) -> Result<()> {
        let records = self.options.records_per_partition as u64;

        let Inner {
            partitions,
            node,
            write_session,
            ..
        } = inner;

        let commit_index = node.commit_index();
        let mut index = node.last_applied() + 1;

        while index <= commit_index {
            let number = index / records;
            let partition = partitions.get(&number).ok_or(Error::MissingEntry {
                partition: number,
                index,
            })?;
            let entry = partition.read(write_session, index, true)?.ok_or(Error::MissingEntry {
                partition: number,
                index,
            })?;

            self.state_machine.apply(index, &entry).await?;
            index += 1;
        }

        node.set_last_applied(commit_index);
        node.persist()?;

        Ok(())
    }

    /// Squash every partition that lies fully below the commit index into
    /// the snapshot, once the committed tail has outgrown a partition.
    async fn force_compaction(&self, inner: &mut Inner) -> Result<()> {
        let records = self.options.records_per_partition as u64;

        let commit_index = inner.node.commit_index();
        if commit_index - inner.snapshot.index() <= records {
            return Ok(());
        }
        let Some(mut builder) = self.state_machine.snapshot_builder() else {
            return Ok(());
        };

        let Inner {
            partitions,
            snapshot,
            write_session,
            ..
        } = inner;

        let compactable: Vec<u64> = partitions
            .iter()
            .filter(|(_, p)| p.last_index() <= commit_index)
            .map(|(&n, _)| n)
            .collect();
        if compactable.is_empty() {
            return Ok(());
        }

        // Consecutive compactions accumulate; the current snapshot goes in
        // first.
        if !snapshot.is_empty() {
            let seed = snapshot.read()?;
            builder.apply(snapshot.index(), &seed).await?;
        }

        let mut snapshot_index = snapshot.index();
        for number in &compactable {
            let partition = &partitions[number];
            partition.flush()?;

            for slot in 0..records {
                let index = partition.first_index() + slot;
                if index == 0 {
                    continue;
                }

                let entry = partition.read(write_session, index, true)?.ok_or(Error::MissingEntry {
                    partition: *number,
                    index,
                })?;
                builder.apply(index, &entry).await?;
            }

            snapshot_index = partition.last_index();
        }

        let entry = builder.build(snapshot_index).await?;
        snapshot.write(&entry, snapshot_index)?;
        snapshot.flush()?;

        for number in compactable {
            if let Some(partition) = partitions.remove(&number) {
                partition.destroy()?;
            }
        }

        tracing::info!(snapshot_index, "compacted committed partitions into the snapshot");
        Ok(())
    }

    fn collect_range(
        &self,
        inner: &Inner,
        session: &mut Session,
        start_index: u64,
        end_index: u64,
    ) -> Result<(Vec<LogEntry>, Option<u64>)> {
        let records = self.options.records_per_partition as u64;
        let mut entries = Vec::with_capacity((end_index - start_index + 1) as usize);
        let mut snapshot_index = None;

        let mut index = start_index;
        while index <= end_index {
            if index == 0 {
                entries.push(LogEntry::initial().clone());
                index += 1;
                continue;
            }

            let number = index / records;
            if let Some(partition) = inner.partitions.get(&number) {
                match partition.read(session, index, true)? {
                    Some(entry) => {
                        entries.push(entry);
                        index += 1;
                    }
                    // A vacant slot ends the readable range.
                    None => break,
                }
            } else if index <= inner.node.commit_index() && !inner.snapshot.is_empty() {
                entries.push(inner.snapshot.read()?);
                snapshot_index = Some(inner.snapshot.index());
                // Resume right after the compacted prefix.
                index = inner.snapshot.index() + 1;
            } else {
                break;
            }
        }

        Ok((entries, snapshot_index))
    }
}
