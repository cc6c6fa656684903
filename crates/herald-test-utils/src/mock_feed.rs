// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock feed source with per-feed canned candidates or failures.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use herald_core::{Feed, FeedSource, HeraldError, RawItem};

#[derive(Default)]
pub struct MockFeedSource {
    responses: Mutex<HashMap<String, Result<Vec<RawItem>, String>>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MockFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch of `feed_id` returns `items` from now on.
    pub fn set_items(&self, feed_id: &str, items: Vec<RawItem>) {
        self.responses
            .lock()
            .unwrap()
            .insert(feed_id.to_string(), Ok(items));
    }

    /// Every fetch of `feed_id` fails from now on.
    pub fn fail(&self, feed_id: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(feed_id.to_string(), Err(message.to_string()));
    }

    pub fn fetch_count(&self, feed_id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(feed_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl FeedSource for MockFeedSource {
    async fn fetch_candidates(&self, feed: &Feed) -> Result<Vec<RawItem>, HeraldError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(feed.id.clone())
            .or_default() += 1;
        match self.responses.lock().unwrap().get(&feed.id) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(message)) => Err(HeraldError::Feed {
                message: message.clone(),
                source: None,
            }),
            None => Ok(Vec::new()),
        }
    }
}
