// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dedup index: "have we seen this content for this feed?"

use std::sync::Arc;

use herald_core::{BroadcastStore, Clock, Feed, FeedItem, HeraldError, RawItem};
use tracing::debug;

use crate::fingerprint::content_hash;
use crate::normalize::{normalize_body, normalize_title, normalize_url};

/// Fingerprint index over the stored items of each feed.
///
/// Check-then-insert is safe without locking because only the lease holder
/// ingests; [`DedupIndex::admit`] also relies on the store's
/// `(feed_id, content_hash)` uniqueness, so a lost race still yields one row.
pub struct DedupIndex {
    store: Arc<dyn BroadcastStore>,
    clock: Arc<dyn Clock>,
}

impl DedupIndex {
    pub fn new(store: Arc<dyn BroadcastStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Normalize a candidate under `feed`'s cleaning rules into an unsaved item.
    pub fn prepare(&self, feed: &Feed, raw: &RawItem) -> FeedItem {
        let rules = &feed.cleaning_rules;
        let normalized_title = normalize_title(&raw.title, &rules.strip_title_prefixes);
        let normalized_url = if raw.url.trim().is_empty() {
            String::new()
        } else {
            normalize_url(&raw.url, &rules.strip_params)
        };
        let body = raw
            .description
            .as_deref()
            .map(normalize_body)
            .unwrap_or_default();

        FeedItem {
            id: uuid::Uuid::new_v4().to_string(),
            feed_id: feed.id.clone(),
            guid: raw.guid.clone(),
            title: raw.title.clone(),
            url: raw.url.clone(),
            description: raw.description.clone(),
            content_hash: content_hash(&normalized_title, &normalized_url, &body),
            normalized_title,
            normalized_url,
            published_at: raw.published_at,
            created_at: self.clock.now(),
        }
    }

    /// Returns `true` if no stored item of `feed` has the candidate's fingerprint.
    ///
    /// A `true` answer must be followed by persisting the item before it is
    /// treated as dispatchable; [`DedupIndex::admit`] does both.
    pub async fn is_new(&self, feed: &Feed, raw: &RawItem) -> Result<bool, HeraldError> {
        let item = self.prepare(feed, raw);
        let seen = self
            .store
            .content_hash_exists(&feed.id, &item.content_hash)
            .await?;
        Ok(!seen)
    }

    /// Persist the candidate if it is new. Returns the stored item, or `None`
    /// for a duplicate.
    pub async fn admit(&self, feed: &Feed, raw: &RawItem) -> Result<Option<FeedItem>, HeraldError> {
        let item = self.prepare(feed, raw);
        if self.store.insert_feed_item(&item).await? {
            debug!(feed_id = %feed.id, item_id = %item.id, hash = %item.content_hash, "admitted feed item");
            Ok(Some(item))
        } else {
            debug!(feed_id = %feed.id, hash = %item.content_hash, "duplicate feed item");
            Ok(None)
        }
    }
}
