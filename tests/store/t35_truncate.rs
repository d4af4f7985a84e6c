use anyhow::Result;
use pretty_assertions::assert_eq;
use walstore::Error;

use crate::fixtures::entries;
use crate::fixtures::entry;
use crate::fixtures::open_null;
use crate::fixtures::read_all;

#[tokio::test]
async fn truncate_drops_the_uncommitted_tail() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;
    store.append_entries(entries(1..=5)).await?;
    store.commit(Some(3)).await?;

    assert_eq!(store.truncate(4).await?, 2);
    assert_eq!(store.last_index(false).await, 3);

    // Partition 1 held nothing but the dropped tail.
    assert!(!dir.path().join("1").exists());
    assert!(dir.path().join("0").exists());

    let err = read_all(&store, 4, 4).await.unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 4, .. }));

    Ok(())
}

#[tokio::test]
async fn truncating_the_committed_prefix_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;
    store.append_entries(entries(1..=5)).await?;
    store.commit(Some(3)).await?;

    let err = store.truncate(1).await.unwrap_err();
    assert!(matches!(err, Error::Overwrite { index: 1, commit_index: 3 }));
    assert_eq!(store.last_index(false).await, 5);

    Ok(())
}

#[tokio::test]
async fn truncate_past_the_tail_is_a_noop() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;
    store.append_entries(entries(1..=3)).await?;

    assert_eq!(store.truncate(9).await?, 0);
    assert_eq!(store.last_index(false).await, 3);

    Ok(())
}

#[tokio::test]
async fn truncate_mid_partition_keeps_the_shared_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;
    store.append_entries(entries(1..=5)).await?;

    assert_eq!(store.truncate(2).await?, 4);
    assert_eq!(store.last_index(false).await, 1);
    assert!(dir.path().join("0").exists());
    assert!(!dir.path().join("1").exists());

    // The cut slot is writable again.
    let replacement = entry(9, "replacement");
    store.append_at(&replacement, 2).await?;

    let (read, _) = read_all(&store, 2, 2).await?;
    assert_eq!(read, vec![replacement]);

    Ok(())
}
