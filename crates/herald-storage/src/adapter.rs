// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the Herald store traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use herald_config::model::StorageConfig;
use herald_core::{
    AcquireOutcome, BroadcastStore, Clock, ConnectionSession, ControlCommand, ControlRequest,
    CredentialStore, Credentials, DeliveryRecord, Feed, FeedItem, HeraldError, Lease, LeaseStore,
    LogFilter, MessageLog, MessageLogEntry, RenewOutcome, Schedule, SystemClock, Target, Template,
    TriggerRequest,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage implementing every store trait.
///
/// Lease expiry is judged against the injected [`Clock`], so all workers
/// sharing one database file must agree on wall-clock time.
#[derive(Clone)]
pub struct SqliteStorage {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteStorage {
    /// Open the configured database with the system clock.
    pub async fn open(config: &StorageConfig) -> Result<Self, HeraldError> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        config: &StorageConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HeraldError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        Ok(Self::new(db, clock))
    }

    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint and close the underlying database.
    pub async fn close(self) -> Result<(), HeraldError> {
        self.db.close().await
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[async_trait]
impl LeaseStore for SqliteStorage {
    async fn acquire(
        &self,
        session_name: &str,
        owner_id: &str,
        ttl: Duration,
    ) -> Result<AcquireOutcome, HeraldError> {
        let outcome =
            queries::leases::acquire(&self.db, session_name, owner_id, self.now(), ttl).await?;
        debug!(session_name, owner_id, ?outcome, "lease acquire");
        Ok(outcome)
    }

    async fn renew(
        &self,
        session_name: &str,
        owner_id: &str,
        fencing_token: u64,
        ttl: Duration,
    ) -> Result<RenewOutcome, HeraldError> {
        queries::leases::renew(
            &self.db,
            session_name,
            owner_id,
            fencing_token,
            self.now(),
            ttl,
        )
        .await
    }

    async fn release(
        &self,
        session_name: &str,
        owner_id: &str,
        fencing_token: u64,
    ) -> Result<bool, HeraldError> {
        queries::leases::release(&self.db, session_name, owner_id, fencing_token).await
    }

    async fn current(&self, session_name: &str) -> Result<Option<Lease>, HeraldError> {
        queries::leases::current(&self.db, session_name, self.now()).await
    }
}

#[async_trait]
impl CredentialStore for SqliteStorage {
    async fn load(&self, session_name: &str) -> Result<Option<Credentials>, HeraldError> {
        queries::credentials::load(&self.db, session_name).await
    }

    async fn save(
        &self,
        session_name: &str,
        credentials: &Credentials,
    ) -> Result<(), HeraldError> {
        queries::credentials::save(&self.db, session_name, credentials, self.now()).await
    }

    async fn clear(&self, session_name: &str) -> Result<(), HeraldError> {
        queries::credentials::clear(&self.db, session_name).await
    }
}

#[async_trait]
impl BroadcastStore for SqliteStorage {
    async fn upsert_feed(&self, feed: &Feed) -> Result<(), HeraldError> {
        queries::feeds::upsert(&self.db, feed).await
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>, HeraldError> {
        queries::feeds::list(&self.db).await
    }

    async fn mark_feed_fetched(
        &self,
        feed_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), HeraldError> {
        queries::feeds::mark_fetched(&self.db, feed_id, at).await
    }

    async fn content_hash_exists(
        &self,
        feed_id: &str,
        content_hash: &str,
    ) -> Result<bool, HeraldError> {
        queries::items::content_hash_exists(&self.db, feed_id, content_hash).await
    }

    async fn insert_feed_item(&self, item: &FeedItem) -> Result<bool, HeraldError> {
        queries::items::insert(&self.db, item).await
    }

    async fn pending_items(
        &self,
        feed_id: &str,
        schedule_id: &str,
        target_ids: &[String],
        limit: usize,
    ) -> Result<Vec<FeedItem>, HeraldError> {
        queries::items::pending(&self.db, feed_id, schedule_id, target_ids, limit).await
    }

    async fn upsert_target(&self, target: &Target) -> Result<(), HeraldError> {
        queries::targets::upsert_target(&self.db, target).await
    }

    async fn get_targets(&self, ids: &[String]) -> Result<Vec<Target>, HeraldError> {
        queries::targets::get_targets(&self.db, ids).await
    }

    async fn upsert_template(&self, template: &Template) -> Result<(), HeraldError> {
        queries::targets::upsert_template(&self.db, template).await
    }

    async fn get_template(&self, id: &str) -> Result<Option<Template>, HeraldError> {
        queries::targets::get_template(&self.db, id).await
    }

    async fn upsert_schedule(&self, schedule: &Schedule) -> Result<(), HeraldError> {
        queries::schedules::upsert(&self.db, schedule, self.now()).await
    }

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, HeraldError> {
        queries::schedules::get(&self.db, id).await
    }

    async fn list_schedules(&self, enabled_only: bool) -> Result<Vec<Schedule>, HeraldError> {
        queries::schedules::list(&self.db, enabled_only).await
    }

    async fn set_schedule_last_run(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), HeraldError> {
        queries::schedules::set_last_run(&self.db, id, at).await
    }

    async fn set_schedule_enabled(&self, id: &str, enabled: bool) -> Result<(), HeraldError> {
        queries::schedules::set_enabled(&self.db, id, enabled).await
    }

    async fn enqueue_trigger(&self, schedule_id: &str) -> Result<i64, HeraldError> {
        queries::triggers::enqueue(&self.db, schedule_id, self.now()).await
    }

    async fn claim_triggers(&self) -> Result<Vec<TriggerRequest>, HeraldError> {
        queries::triggers::claim(&self.db).await
    }

    async fn complete_trigger(&self, id: i64) -> Result<(), HeraldError> {
        queries::triggers::complete(&self.db, id, self.now()).await
    }

    async fn enqueue_control(
        &self,
        session_name: &str,
        command: ControlCommand,
    ) -> Result<i64, HeraldError> {
        queries::controls::enqueue(&self.db, session_name, command, self.now()).await
    }

    async fn claim_controls(
        &self,
        session_name: &str,
    ) -> Result<Vec<ControlRequest>, HeraldError> {
        queries::controls::claim(&self.db, session_name).await
    }

    async fn publish_connection(
        &self,
        session_name: &str,
        session: &ConnectionSession,
    ) -> Result<(), HeraldError> {
        queries::snapshots::publish(&self.db, session_name, session).await
    }

    async fn read_connection(
        &self,
        session_name: &str,
    ) -> Result<Option<ConnectionSession>, HeraldError> {
        queries::snapshots::read(&self.db, session_name).await
    }
}

#[async_trait]
impl MessageLog for SqliteStorage {
    async fn has_sent(
        &self,
        feed_item_id: &str,
        target_id: &str,
        schedule_id: &str,
    ) -> Result<bool, HeraldError> {
        queries::message_log::has_sent(&self.db, feed_item_id, target_id, schedule_id).await
    }

    async fn append(&self, record: &DeliveryRecord) -> Result<Option<i64>, HeraldError> {
        queries::message_log::append(&self.db, record, self.now()).await
    }

    async fn query(&self, filter: &LogFilter) -> Result<Vec<MessageLogEntry>, HeraldError> {
        queries::message_log::query(&self.db, filter).await
    }
}
