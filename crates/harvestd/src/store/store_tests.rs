// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;

fn new_token(value: &str, class: TokenClass) -> NewToken {
    NewToken {
        value: value.to_owned(),
        class,
        origin_action: "test".to_owned(),
        source_agent_id: 0,
    }
}

fn temp_store() -> anyhow::Result<(tempfile::TempDir, TokenStore)> {
    let dir = tempfile::tempdir()?;
    let store = TokenStore::open(dir.path().join("tokens.json"));
    Ok((dir, store))
}

#[tokio::test]
async fn append_latest_consume_walkthrough() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;

    let total = store.append(new_token("tok1", TokenClass::Primary)).await?;
    assert_eq!(total, 1);

    let latest = store.latest(Some(TokenClass::Primary), Duration::ZERO).await;
    assert_eq!(latest.map(|t| t.value), Some("tok1".to_owned()));

    assert!(store.consume("tok1").await?);
    assert_eq!(store.total_count().await, 0);
    assert!(!store.consume("tok1").await?);
    Ok(())
}

#[tokio::test]
async fn consume_then_latest_never_returns_value() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.append(new_token("a", TokenClass::Primary)).await?;
    store.append(new_token("b", TokenClass::Primary)).await?;

    assert!(store.consume("b").await?);
    let latest = store.latest(None, Duration::ZERO).await;
    assert_eq!(latest.map(|t| t.value), Some("a".to_owned()));
    Ok(())
}

#[tokio::test]
async fn duplicate_value_is_replaced_not_duplicated() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.append(new_token("same", TokenClass::Primary)).await?;
    let total = store.append(new_token("same", TokenClass::Secondary)).await?;
    assert_eq!(total, 1);

    let all = store.list_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].class, TokenClass::Secondary);
    Ok(())
}

#[tokio::test]
async fn sequence_numbers_strictly_increase_without_gaps() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    for i in 0..5 {
        store.append(new_token(&format!("t{i}"), TokenClass::Secondary)).await?;
    }
    let seqs: Vec<u64> = store.list_all().await.iter().map(|t| t.sequence_number).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn sequence_numbers_survive_consume_of_maximum() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.append(new_token("a", TokenClass::Primary)).await?;
    store.append(new_token("b", TokenClass::Primary)).await?;
    assert!(store.consume("b").await?);

    store.append(new_token("c", TokenClass::Primary)).await?;
    let latest = store.latest(None, Duration::ZERO).await.map(|t| t.sequence_number);
    assert_eq!(latest, Some(3));
    Ok(())
}

#[tokio::test]
async fn concurrent_appends_are_totally_ordered() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(TokenStore::open(dir.path().join("tokens.json")));

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.append(new_token(&format!("tok-{i}"), TokenClass::Secondary)).await
        }));
    }
    for h in handles {
        h.await??;
    }

    let all = store.list_all().await;
    assert_eq!(all.len(), 8);
    let seqs: Vec<u64> = all.iter().map(|t| t.sequence_number).collect();
    // List order is insertion order, which must match assignment order.
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
    assert_eq!(seqs, (1..=8).collect::<Vec<u64>>());
    Ok(())
}

#[tokio::test]
async fn latest_filters_by_class_and_prefers_recency() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.append(new_token("p1", TokenClass::Primary)).await?;
    store.append(new_token("s1", TokenClass::Secondary)).await?;
    store.append(new_token("p2", TokenClass::Primary)).await?;

    let latest = store.latest(Some(TokenClass::Primary), Duration::ZERO).await;
    assert_eq!(latest.map(|t| t.value), Some("p2".to_owned()));

    let latest = store.latest(Some(TokenClass::Bootstrap), Duration::ZERO).await;
    assert!(latest.is_none());
    Ok(())
}

#[tokio::test]
async fn freshness_window_is_inclusive_at_the_boundary() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let now = epoch_ms();

    // Seed the file directly so token ages are under test control.
    let mk = |value: &str, age_ms: u64, seq: u64| Token {
        value: value.to_owned(),
        class: TokenClass::Primary,
        origin_action: String::new(),
        source_agent_id: 0,
        sequence_number: seq,
        created_at_ms: now - age_ms,
    };
    let data = persist::PersistedTokens {
        tokens: vec![mk("stale", 10_000, 1), mk("boundary", 5_000, 2)],
        total_count: 2,
        last_updated_ms: now,
    };
    persist::save(&path, &data)?;

    let store = TokenStore::open(&path);
    // 5s-old token is included by a 5s window (inclusive boundary, modulo
    // the few millis this test takes); the 10s-old one is excluded.
    let latest = store.latest(None, Duration::from_millis(5_200)).await;
    assert_eq!(latest.map(|t| t.value), Some("boundary".to_owned()));
    let latest = store.latest(None, Duration::from_millis(4_000)).await;
    assert!(latest.is_none());
    // Zero window skips the age check.
    let latest = store.latest(None, Duration::ZERO).await;
    assert_eq!(latest.map(|t| t.value), Some("boundary".to_owned()));
    Ok(())
}

#[tokio::test]
async fn clear_reports_removed_count_and_persists_empty() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let store = TokenStore::open(&path);
    store.append(new_token("a", TokenClass::Primary)).await?;
    store.append(new_token("b", TokenClass::Secondary)).await?;

    assert_eq!(store.clear().await?, 2);
    assert_eq!(store.clear().await?, 0);

    // Reopen from disk: still empty, still parseable.
    let reopened = TokenStore::open(&path);
    assert!(reopened.list_all().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn store_survives_reopen_with_sequence_floor() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    {
        let store = TokenStore::open(&path);
        store.append(new_token("a", TokenClass::Primary)).await?;
        store.append(new_token("b", TokenClass::Primary)).await?;
    }
    let store = TokenStore::open(&path);
    store.append(new_token("c", TokenClass::Primary)).await?;
    let seqs: Vec<u64> = store.list_all().await.iter().map(|t| t.sequence_number).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn corrupt_file_rehydrates_empty() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    std::fs::write(&path, "{not json")?;
    let data = persist::load_or_default(&path);
    assert!(data.tokens.is_empty());
    Ok(())
}

#[tokio::test]
async fn peer_handles_on_same_path_observe_each_other() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    // Two independent handles stand in for the daemon and the exchange
    // client mutating the same file from separate processes.
    let a = TokenStore::open(&path);
    let b = TokenStore::open(&path);

    let (ra, rb) = tokio::join!(
        a.append(new_token("from-a", TokenClass::Primary)),
        b.append(new_token("from-b", TokenClass::Secondary)),
    );
    ra?;
    rb?;
    assert_eq!(a.total_count().await, 2, "one append overwrote the other");

    // A consume through one handle is visible through the other.
    assert!(b.consume("from-a").await?);
    let values: Vec<String> = a.list_all().await.into_iter().map(|t| t.value).collect();
    assert_eq!(values, vec!["from-b".to_owned()]);

    // Sequence assignment accounts for the peer's appends.
    a.append(new_token("again", TokenClass::Primary)).await?;
    let max_seq = a.list_all().await.iter().map(|t| t.sequence_number).max();
    assert_eq!(max_seq, Some(3));
    Ok(())
}
