use std::sync::Arc;

use anyhow::Result;
use pretty_assertions::assert_eq;
use walstore::Error;
use walstore::Options;
use walstore::WalStore;

use crate::fixtures::entries;
use crate::fixtures::open_null;
use crate::fixtures::read_all;

#[tokio::test]
async fn inverted_range_yields_an_empty_slice() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    let (read, snapshot) = read_all(&store, 5, 2).await?;
    assert!(read.is_empty());
    assert_eq!(snapshot, None);

    Ok(())
}

#[tokio::test]
async fn out_of_range_reads_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;
    store.append_entries(entries(1..=2)).await?;

    let err = read_all(&store, 0, 3).await.unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 3, last_index: 2 }));

    let err = read_all(&store, 5, 7).await.unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 5, last_index: 2 }));

    Ok(())
}

#[tokio::test]
async fn reads_cross_partition_boundaries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 2).await?;

    let batch = entries(1..=5);
    store.append_entries(batch.clone()).await?;

    let (read, snapshot) = read_all(&store, 0, 5).await?;
    assert_eq!(snapshot, None);
    assert_eq!(read.len(), 6);
    assert_eq!(read[1..], batch[..]);

    Ok(())
}

#[tokio::test]
async fn read_to_end_covers_the_tail() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    let batch = entries(1..=5);
    store.append_entries(batch.clone()).await?;

    let read = store.read_to_end(3, |entries, _| entries.to_vec()).await?;
    assert_eq!(read[..], batch[2..]);

    Ok(())
}

#[tokio::test]
async fn uncached_stores_read_identically() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let options = Options {
        records_per_partition: 4,
        use_caching: false,
        ..Options::default()
    };
    let store = WalStore::open(dir.path(), options, walstore::testing::NullStateMachine).await?;

    let batch = entries(1..=5);
    store.append_entries(batch.clone()).await?;

    let (read, _) = read_all(&store, 1, 5).await?;
    assert_eq!(read[..], batch[..]);

    Ok(())
}

#[tokio::test]
async fn readers_run_concurrently() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(open_null(dir.path(), 4).await?);
    store.append_entries(entries(1..=9)).await?;

    let mut readers = Vec::new();
    for _ in 0..6 {
        let store = store.clone();
        readers.push(tokio::spawn(async move {
            store.read(0, 9, |entries, _| entries.len()).await
        }));
    }

    for reader in readers {
        assert_eq!(reader.await??, 10);
    }

    Ok(())
}
