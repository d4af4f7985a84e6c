use anyhow::Result;
use pretty_assertions::assert_eq;
use walstore::Error;
use walstore::LogEntry;
use walstore::Options;
use walstore::WalStore;

use crate::fixtures::entries;
use crate::fixtures::entry;
use crate::fixtures::open_null;
use crate::fixtures::read_all;

#[tokio::test]
async fn appends_span_partitions_and_survive_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let batch = entries(42..=46);

    {
        let store = open_null(dir.path(), 4).await?;
        assert_eq!(store.append_entries(batch.clone()).await?, 1);

        assert_eq!(store.last_index(false).await, 5);
        assert_eq!(store.last_index(true).await, 0);

        let (read, snapshot) = read_all(&store, 0, 5).await?;
        assert_eq!(snapshot, None);
        assert_eq!(read.len(), 6);
        assert_eq!(read[0], *store.first());
        assert_eq!(read[1..], batch[..]);
    }

    let store = open_null(dir.path(), 4).await?;
    assert_eq!(store.last_index(false).await, 5);

    let (read, _) = read_all(&store, 0, 5).await?;
    assert_eq!(read[1..], batch[..]);

    Ok(())
}

#[tokio::test]
async fn append_past_the_tail_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    let err = store.append(vec![entry(1, "late")], 3, false).await.unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 3, last_index: 0 }));

    Ok(())
}

#[tokio::test]
async fn snapshot_entries_are_rejected_in_batches() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    let snapshot = LogEntry::snapshot(1, 3, b"state".to_vec());
    let err = store.append(vec![snapshot], 1, false).await.unwrap_err();
    assert!(matches!(err, Error::SnapshotInBatch));

    Ok(())
}

#[tokio::test]
async fn skip_committed_replays_a_batch_idempotently() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    store.append_entries(entries(1..=3)).await?;
    store.commit(Some(2)).await?;

    // A leader retransmission overlaps the committed prefix.
    let replay = vec![entry(1, "replayed-1"), entry(2, "replayed-2"), entry(3, "replayed-3")];

    let err = store.append(replay.clone(), 1, false).await.unwrap_err();
    assert!(matches!(err, Error::Overwrite { index: 1, commit_index: 2 }));

    store.append(replay, 1, true).await?;
    assert_eq!(store.last_index(false).await, 3);

    let (read, _) = read_all(&store, 1, 3).await?;
    assert_eq!(read[0].payload(), b"cmd-1");
    assert_eq!(read[1].payload(), b"cmd-2");
    assert_eq!(read[2].payload(), b"replayed-3");

    Ok(())
}

#[tokio::test]
async fn fresh_partitions_are_preallocated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let options = Options {
        records_per_partition: 4,
        initial_partition_size: 4096,
        ..Options::default()
    };
    let store = WalStore::open(dir.path(), options, walstore::testing::NullStateMachine).await?;

    store.append_entries(entries(1..=2)).await?;

    // Allocation table of 4 records plus the preallocated payload region.
    let len = std::fs::metadata(dir.path().join("0"))?.len();
    assert_eq!(len, 4 * 32 + 4096);

    let (read, _) = read_all(&store, 1, 2).await?;
    assert_eq!(read.len(), 2);

    Ok(())
}

#[tokio::test]
async fn leftover_partition_beyond_last_index_is_discarded() -> Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let store = open_null(dir.path(), 4).await?;
        store.append_entries(entries(1..=2)).await?;
    }

    // A partition file past the recorded last index, as left behind by a
    // crash between a partition write and the node-state flush.
    std::fs::write(dir.path().join("7"), b"")?;

    let store = open_null(dir.path(), 4).await?;
    assert_eq!(store.last_index(false).await, 2);
    assert!(!dir.path().join("7").exists());

    Ok(())
}
