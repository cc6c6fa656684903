// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dedup index against real SQLite storage, plus normalization properties.

use std::sync::Arc;

use herald_config::model::StorageConfig;
use herald_core::{BroadcastStore, CleaningRules, Feed, RawItem, SystemClock};
use herald_dedup::{DedupIndex, content_hash, normalize_title, normalize_url};
use herald_storage::SqliteStorage;
use proptest::prelude::*;

async fn setup() -> (DedupIndex, Arc<SqliteStorage>, Feed, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        database_path: dir.path().join("dedup.db").display().to_string(),
        wal_mode: true,
    };
    let store = Arc::new(SqliteStorage::open(&config).await.unwrap());
    let feed = Feed {
        id: "news".into(),
        url: "https://example.com/feed.json".into(),
        feed_type: "json".into(),
        enabled: true,
        fetch_interval_minutes: 10,
        last_fetched_at: None,
        parse_config: None,
        cleaning_rules: CleaningRules {
            strip_params: vec!["src".into()],
            strip_title_prefixes: vec!["BREAKING:".into()],
        },
    };
    store.upsert_feed(&feed).await.unwrap();
    let index = DedupIndex::new(store.clone(), Arc::new(SystemClock));
    (index, store, feed, dir)
}

fn raw(guid: &str, title: &str, url: &str) -> RawItem {
    RawItem {
        guid: Some(guid.into()),
        title: title.into(),
        url: url.into(),
        description: None,
        published_at: None,
    }
}

#[tokio::test]
async fn same_title_and_url_twice_yields_one_item() {
    let (index, store, feed, _dir) = setup().await;
    let first = raw("g1", "Rates rise", "https://example.com/rates");
    assert!(index.is_new(&feed, &first).await.unwrap());
    assert!(index.admit(&feed, &first).await.unwrap().is_some());

    // New GUID, tracking params, prefix and different spacing: still a duplicate.
    let again = raw(
        "g2",
        "BREAKING:  Rates   RISE",
        "https://EXAMPLE.com/rates/?utm_source=tw&src=rss#x",
    );
    assert!(!index.is_new(&feed, &again).await.unwrap());
    assert!(index.admit(&feed, &again).await.unwrap().is_none());

    assert_eq!(store.pending_items("news", "s", &["t".to_string()], 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn different_url_is_new() {
    let (index, _store, feed, _dir) = setup().await;
    index
        .admit(&feed, &raw("g1", "Rates rise", "https://example.com/rates"))
        .await
        .unwrap();
    let other = raw("g1", "Rates rise", "https://example.com/rates-2");
    assert!(index.admit(&feed, &other).await.unwrap().is_some());
}

proptest! {
    #[test]
    fn title_normalization_is_idempotent(title in "\\PC{0,40}") {
        let once = normalize_title(&title, &[]);
        prop_assert_eq!(normalize_title(&once, &[]), once);
    }

    #[test]
    fn url_normalization_is_idempotent(
        host in "[a-z]{1,10}",
        path in "(/[a-z0-9]{1,6}){0,3}/?",
        id in 0u32..1000,
    ) {
        let url = format!("https://{host}.example.com{path}?id={id}&utm_medium=x");
        let once = normalize_url(&url, &[]);
        prop_assert_eq!(normalize_url(&once, &[]), once);
    }

    #[test]
    fn hash_ignores_case_and_whitespace_in_title(words in prop::collection::vec("[a-z]{1,8}", 1..6)) {
        let plain = words.join(" ");
        let noisy = words.iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join("   ");
        let url = normalize_url("https://example.com/x", &[]);
        prop_assert_eq!(
            content_hash(&normalize_title(&plain, &[]), &url, ""),
            content_hash(&normalize_title(&noisy, &[]), &url, "")
        );
    }
}
