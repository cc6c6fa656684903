// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feed ingestion pass: fetch due feeds and admit new items.

use std::sync::Arc;

use herald_core::{BroadcastStore, Clock, Feed, FeedSource, HeraldError};
use herald_dedup::DedupIndex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub feeds_fetched: usize,
    pub feeds_failed: usize,
    pub admitted: usize,
    pub duplicates: usize,
}

pub struct Ingestor {
    store: Arc<dyn BroadcastStore>,
    source: Arc<dyn FeedSource>,
    index: DedupIndex,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn BroadcastStore>,
        source: Arc<dyn FeedSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            index: DedupIndex::new(store.clone(), clock.clone()),
            store,
            source,
            clock,
        }
    }

    /// Fetches every enabled feed whose interval has elapsed.
    ///
    /// A feed that fails to fetch or parse keeps its old `last_fetched_at`
    /// and is retried next pass without aborting the others. Storage errors
    /// are fatal and end the pass.
    pub async fn run_pass(&self) -> Result<IngestReport, HeraldError> {
        let now = self.clock.now();
        let mut report = IngestReport::default();

        for feed in self.store.list_feeds().await? {
            if !feed.fetch_due(now) {
                continue;
            }
            match self.ingest_feed(&feed, &mut report).await {
                Ok(()) => report.feeds_fetched += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(feed = feed.id.as_str(), url = feed.url.as_str(), error = %e, "feed ingestion failed");
                    report.feeds_failed += 1;
                }
            }
        }

        if report.feeds_fetched + report.feeds_failed > 0 {
            info!(
                fetched = report.feeds_fetched,
                failed = report.feeds_failed,
                admitted = report.admitted,
                duplicates = report.duplicates,
                "ingestion pass finished"
            );
        }
        Ok(report)
    }

    async fn ingest_feed(&self, feed: &Feed, report: &mut IngestReport) -> Result<(), HeraldError> {
        let candidates = self.source.fetch_candidates(feed).await?;
        debug!(feed = feed.id.as_str(), candidates = candidates.len(), "feed fetched");

        for raw in &candidates {
            if self.index.admit(feed, raw).await?.is_some() {
                report.admitted += 1;
            } else {
                report.duplicates += 1;
            }
        }
        self.store.mark_feed_fetched(&feed.id, self.clock.now()).await
    }
}
