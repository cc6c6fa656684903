// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits for broadcast entities and the message log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::HeraldError;
use crate::types::{
    ConnectionSession, ControlCommand, ControlRequest, DeliveryRecord, Feed, FeedItem, LogFilter,
    MessageLogEntry, Schedule, Target, Template, TriggerRequest,
};

/// Persistence for feeds, items, targets, templates and schedules.
///
/// Operators own most of these entities; the engine reads them and performs
/// the few writes the broadcast flow needs (new items, fetch stamps,
/// `last_run_at`, trigger bookkeeping, status snapshots).
#[async_trait]
pub trait BroadcastStore: Send + Sync + 'static {
    // --- Feeds ---

    async fn upsert_feed(&self, feed: &Feed) -> Result<(), HeraldError>;

    async fn list_feeds(&self) -> Result<Vec<Feed>, HeraldError>;

    async fn mark_feed_fetched(&self, feed_id: &str, at: DateTime<Utc>)
    -> Result<(), HeraldError>;

    // --- Feed items ---

    /// Returns `true` if `feed_id` already has an item with `content_hash`.
    async fn content_hash_exists(
        &self,
        feed_id: &str,
        content_hash: &str,
    ) -> Result<bool, HeraldError>;

    /// Inserts a new item. Returns `false` when `(feed_id, content_hash)`
    /// already exists, in which case nothing is written.
    async fn insert_feed_item(&self, item: &FeedItem) -> Result<bool, HeraldError>;

    /// Items of `feed_id`, oldest first, that still lack a terminal
    /// (`sent`/`skipped`) log row under `schedule_id` for at least one of
    /// `target_ids`. Items created before the schedule was first stored are
    /// left out.
    async fn pending_items(
        &self,
        feed_id: &str,
        schedule_id: &str,
        target_ids: &[String],
        limit: usize,
    ) -> Result<Vec<FeedItem>, HeraldError>;

    // --- Targets and templates ---

    async fn upsert_target(&self, target: &Target) -> Result<(), HeraldError>;

    /// Loads the targets with the given IDs, skipping unknown IDs.
    async fn get_targets(&self, ids: &[String]) -> Result<Vec<Target>, HeraldError>;

    async fn upsert_template(&self, template: &Template) -> Result<(), HeraldError>;

    async fn get_template(&self, id: &str) -> Result<Option<Template>, HeraldError>;

    // --- Schedules ---

    async fn upsert_schedule(&self, schedule: &Schedule) -> Result<(), HeraldError>;

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, HeraldError>;

    async fn list_schedules(&self, enabled_only: bool) -> Result<Vec<Schedule>, HeraldError>;

    async fn set_schedule_last_run(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), HeraldError>;

    async fn set_schedule_enabled(&self, id: &str, enabled: bool) -> Result<(), HeraldError>;

    // --- Manual triggers ---

    async fn enqueue_trigger(&self, schedule_id: &str) -> Result<i64, HeraldError>;

    /// Atomically claims every pending trigger, oldest first.
    async fn claim_triggers(&self) -> Result<Vec<TriggerRequest>, HeraldError>;

    async fn complete_trigger(&self, id: i64) -> Result<(), HeraldError>;

    // --- Operator controls ---

    async fn enqueue_control(
        &self,
        session_name: &str,
        command: ControlCommand,
    ) -> Result<i64, HeraldError>;

    /// Takes every queued command for `session_name`, oldest first.
    async fn claim_controls(&self, session_name: &str)
    -> Result<Vec<ControlRequest>, HeraldError>;

    // --- Status board ---

    /// Publishes the latest connection snapshot for operators.
    async fn publish_connection(
        &self,
        session_name: &str,
        session: &ConnectionSession,
    ) -> Result<(), HeraldError>;

    async fn read_connection(
        &self,
        session_name: &str,
    ) -> Result<Option<ConnectionSession>, HeraldError>;
}

/// Append-only ledger of dispatch attempts.
#[async_trait]
pub trait MessageLog: Send + Sync + 'static {
    /// Returns `true` if a `sent` row exists for the triple.
    async fn has_sent(
        &self,
        feed_item_id: &str,
        target_id: &str,
        schedule_id: &str,
    ) -> Result<bool, HeraldError>;

    /// Appends a row. Returns `None` when a `sent` row for the same triple
    /// already existed and the append was dropped.
    async fn append(&self, record: &DeliveryRecord) -> Result<Option<i64>, HeraldError>;

    async fn query(&self, filter: &LogFilter) -> Result<Vec<MessageLogEntry>, HeraldError>;
}
