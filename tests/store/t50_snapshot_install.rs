use anyhow::Result;
use pretty_assertions::assert_eq;
use walstore::Error;
use walstore::LogEntry;

use crate::fixtures::entries;
use crate::fixtures::open_recording;
use crate::fixtures::read_all;

#[tokio::test]
async fn installed_snapshot_replaces_the_covered_prefix() -> Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let store = open_recording(dir.path(), 4).await?;
        store.append_entries(entries(1..=9)).await?;
        store.commit(Some(3)).await?;

        store.append_at(&LogEntry::snapshot(3, 7, b"snap-7".to_vec()), 7).await?;

        assert_eq!(store.last_index(true).await, 7);
        assert_eq!(store.last_index(false).await, 9);

        // The snapshot entry reaches the state machine like a commit.
        let applied = store.state_machine().applied();
        assert_eq!(applied.last(), Some(&(7, b"snap-7".to_vec())));

        let (read, snapshot) = read_all(&store, 6, 9).await?;
        assert_eq!(snapshot, Some(7));
        assert_eq!(read.len(), 3);
        assert!(read[0].is_snapshot());
        assert_eq!(read[0].snapshot_index(), Some(7));
        assert_eq!(read[0].payload(), b"snap-7");
        assert!(!read[1].is_snapshot());
        assert!(!read[2].is_snapshot());
        assert_eq!(read[1].payload(), b"cmd-8");
        assert_eq!(read[2].payload(), b"cmd-9");

        // Partitions 0 and 1 were swallowed whole; partition 2 lives on.
        assert!(!dir.path().join("0").exists());
        assert!(!dir.path().join("1").exists());
        assert!(dir.path().join("2").exists());
    }

    // Everything above is durable.
    let store = open_recording(dir.path(), 4).await?;
    let (read, snapshot) = read_all(&store, 6, 9).await?;
    assert_eq!(snapshot, Some(7));
    assert_eq!(read.len(), 3);
    assert_eq!(read[0].snapshot_index(), Some(7));

    // A newer snapshot supersedes both the old one and the remaining tail.
    store.append_at(&LogEntry::snapshot(4, 11, b"snap-11".to_vec()), 11).await?;

    assert_eq!(store.last_index(false).await, 11);
    assert_eq!(store.last_index(true).await, 11);
    assert!(!dir.path().join("2").exists());

    let (read, snapshot) = read_all(&store, 6, 9).await?;
    assert_eq!(snapshot, Some(11));
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].snapshot_index(), Some(11));
    assert_eq!(read[0].payload(), b"snap-11");

    Ok(())
}

#[tokio::test]
async fn misaligned_snapshot_index_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_recording(dir.path(), 4).await?;
    store.append_entries(entries(1..=6)).await?;

    let err = store.append_at(&LogEntry::snapshot(2, 6, b"s".to_vec()), 6).await.unwrap_err();
    assert!(matches!(
        err,
        Error::MisalignedSnapshotIndex {
            index: 6,
            records_per_partition: 4,
        }
    ));

    Ok(())
}
