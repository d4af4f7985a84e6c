use anyhow::Result;
use pretty_assertions::assert_eq;
use walstore::LogEntry;

use crate::fixtures::entries;
use crate::fixtures::open_null;

#[tokio::test]
async fn term_and_vote_survive_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let store = open_null(dir.path(), 4).await?;
        assert_eq!(store.increment_term().await?, 1);
        assert_eq!(store.increment_term().await?, 2);
        store.update_voted_for(Some(5)).await?;

        store.append_entries(entries(1..=2)).await?;
        store.commit(Some(1)).await?;
    }

    let store = open_null(dir.path(), 4).await?;
    assert_eq!(store.term().await, 2);
    assert!(store.is_voted_for(5).await);
    assert!(!store.is_voted_for(6).await);
    assert_eq!(store.last_index(true).await, 1);
    assert_eq!(store.last_index(false).await, 2);

    Ok(())
}

#[tokio::test]
async fn votes_gate_on_the_member() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    // No vote cast yet; anyone is acceptable.
    assert!(store.is_voted_for(1).await);
    assert!(store.is_voted_for(2).await);

    store.update_voted_for(Some(1)).await?;
    assert!(store.is_voted_for(1).await);
    assert!(!store.is_voted_for(2).await);

    store.update_voted_for(None).await?;
    assert!(store.is_voted_for(2).await);

    Ok(())
}

#[tokio::test]
async fn update_term_adopts_only_greater_terms() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    store.update_term(7).await?;
    assert_eq!(store.term().await, 7);

    store.update_term(3).await?;
    assert_eq!(store.term().await, 7);

    assert_eq!(store.increment_term().await?, 8);

    Ok(())
}

#[tokio::test]
async fn a_new_term_resets_the_vote() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    store.update_voted_for(Some(3)).await?;
    store.increment_term().await?;

    assert!(store.is_voted_for(1).await);

    Ok(())
}

#[tokio::test]
async fn last_entry_term_tracks_the_tail() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_null(dir.path(), 4).await?;

    assert_eq!(store.last_entry_term().await?, 0);

    store.append_entries(entries(1..=7)).await?;
    assert_eq!(store.last_entry_term().await?, 7);

    // After installation the tail is the snapshot itself.
    store.append_at(&LogEntry::snapshot(8, 7, b"s".to_vec()), 7).await?;
    assert_eq!(store.last_index(false).await, 7);
    assert_eq!(store.last_entry_term().await?, 8);

    Ok(())
}
