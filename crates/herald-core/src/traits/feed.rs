// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feed fetch collaborator.

use async_trait::async_trait;

use crate::error::HeraldError;
use crate::types::{Feed, RawItem};

/// Fetches and parses a feed into raw candidate items.
///
/// The engine only consumes the returned sequence; fetching and parsing are
/// entirely the implementor's concern.
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    async fn fetch_candidates(&self, feed: &Feed) -> Result<Vec<RawItem>, HeraldError>;
}
