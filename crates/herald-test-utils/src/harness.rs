// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine tests.
//!
//! `TestHarness` assembles a [`BroadcastEngine`] over a temp SQLite database,
//! a [`ManualClock`], a [`MockTransport`] and a [`MockFeedSource`]. Several
//! harnesses can share one database file and clock to model workers racing
//! for the same session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use herald_config::HeraldConfig;
use herald_core::{
    BroadcastStore, CleaningRules, ConnectionSession, ConnectionStatus, Feed, FeedItem,
    HeraldError, LogFilter, ManualClock, MessageLog, MessageLogEntry, Schedule, ScheduleMode,
    Target, TargetType, Template,
};
use herald_engine::{BroadcastEngine, EngineDeps};
use herald_storage::{Database, SqliteStorage};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::mock_feed::MockFeedSource;
use crate::mock_transport::MockTransport;

type ConfigTweak = Box<dyn FnOnce(&mut HeraldConfig) + Send>;

/// Builder for test environments.
pub struct TestHarnessBuilder {
    instance_id: String,
    shared: Option<(Arc<TempDir>, String, Arc<ManualClock>)>,
    tweaks: Vec<ConfigTweak>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            instance_id: "worker-a".to_string(),
            shared: None,
            tweaks: Vec::new(),
        }
    }

    pub fn with_instance_id(mut self, id: &str) -> Self {
        self.instance_id = id.to_string();
        self
    }

    /// Adjust the generated configuration before the engine is built.
    pub fn with_config(mut self, tweak: impl FnOnce(&mut HeraldConfig) + Send + 'static) -> Self {
        self.tweaks.push(Box::new(tweak));
        self
    }

    /// Open the same database file and share the clock of `other`.
    pub fn sharing_database_with(mut self, other: &TestHarness) -> Self {
        self.shared = Some((
            other.temp_dir.clone(),
            other.db_path.clone(),
            other.clock.clone(),
        ));
        self
    }

    pub async fn build(self) -> Result<TestHarness, HeraldError> {
        let (temp_dir, db_path, clock) = match self.shared {
            Some(shared) => shared,
            None => {
                let dir = TempDir::new().map_err(HeraldError::storage)?;
                let path = dir.path().join("herald.db").to_string_lossy().to_string();
                let clock = Arc::new(ManualClock::new(start_time()));
                (Arc::new(dir), path, clock)
            }
        };

        let mut config = HeraldConfig::default();
        config.engine.instance_id = self.instance_id;
        config.engine.session_name = "default".to_string();
        config.engine.tick_interval_secs = 1;
        config.engine.drain_timeout_secs = 1;
        config.storage.database_path = db_path.clone();
        config.connection.backoff_base_ms = 5;
        config.connection.backoff_max_ms = 20;
        config.connection.connect_timeout_secs = 5;
        for tweak in self.tweaks {
            tweak(&mut config);
        }

        let db = Database::open_with(&db_path, config.storage.wal_mode).await?;
        let storage = SqliteStorage::new(db, clock.clone());
        let transport = Arc::new(MockTransport::new());
        let feeds = Arc::new(MockFeedSource::new());

        let engine = BroadcastEngine::new(
            config.clone(),
            EngineDeps {
                lease_store: Arc::new(storage.clone()),
                credentials: Arc::new(storage.clone()),
                store: Arc::new(storage.clone()),
                log: Arc::new(storage.clone()),
                transport: transport.clone(),
                feeds: feeds.clone(),
                clock: clock.clone(),
            },
        );

        Ok(TestHarness {
            engine: Arc::new(engine),
            storage,
            clock,
            transport,
            feeds,
            config,
            db_path,
            temp_dir,
            background: CancellationToken::new(),
            connection_started: AtomicBool::new(false),
        })
    }
}

/// The instant every fresh harness clock starts at.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// A complete engine over mocks, for integration tests.
pub struct TestHarness {
    pub engine: Arc<BroadcastEngine>,
    pub storage: SqliteStorage,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<MockTransport>,
    pub feeds: Arc<MockFeedSource>,
    pub config: HeraldConfig,
    db_path: String,
    temp_dir: Arc<TempDir>,
    background: CancellationToken,
    connection_started: AtomicBool,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Start the connection manager in the background. Idempotent.
    pub fn start_connection(&self) {
        if self.connection_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let connection = self.engine.connection().clone();
        tokio::spawn(connection.run(self.background.child_token()));
    }

    /// Take the lease and wait until the connection is up.
    pub async fn connect(&self) -> Result<ConnectionSession, HeraldError> {
        if !self.engine.lease().try_acquire().await? {
            return Err(HeraldError::LeaseConflict {
                session: self.config.engine.session_name.clone(),
                owner: None,
            });
        }
        self.start_connection();
        self.wait_for_status(ConnectionStatus::Connected).await
    }

    pub async fn wait_for_status(
        &self,
        status: ConnectionStatus,
    ) -> Result<ConnectionSession, HeraldError> {
        let mut rx = self.engine.connection().subscribe();
        let timeout = Duration::from_secs(5);
        match tokio::time::timeout(timeout, rx.wait_for(|s| s.status == status)).await {
            Ok(Ok(session)) => Ok(session.clone()),
            Ok(Err(_)) => Err(HeraldError::Internal("connection manager went away".into())),
            Err(_) => Err(HeraldError::Timeout { duration: timeout }),
        }
    }

    /// Stop background tasks started by this harness.
    pub fn shutdown(&self) {
        self.background.cancel();
    }

    // --- Seeding ---

    pub async fn seed_feed(&self, id: &str) -> Result<Feed, HeraldError> {
        let feed = Feed {
            id: id.to_string(),
            url: format!("https://{id}.example/feed.json"),
            feed_type: "json".to_string(),
            enabled: true,
            fetch_interval_minutes: 5,
            last_fetched_at: None,
            parse_config: None,
            cleaning_rules: CleaningRules::default(),
        };
        self.storage.upsert_feed(&feed).await?;
        Ok(feed)
    }

    pub async fn seed_target(&self, id: &str, intra_delay_sec: u32) -> Result<Target, HeraldError> {
        let target = Target {
            id: id.to_string(),
            jid: format!("{id}@g.us"),
            target_type: TargetType::Group,
            enabled: true,
            intra_delay_sec,
        };
        self.storage.upsert_target(&target).await?;
        Ok(target)
    }

    pub async fn seed_template(&self, id: &str, body: &str) -> Result<(), HeraldError> {
        self.storage
            .upsert_template(&Template {
                id: id.to_string(),
                name: id.to_string(),
                body: body.to_string(),
            })
            .await
    }

    pub async fn seed_schedule(&self, schedule: &Schedule) -> Result<(), HeraldError> {
        self.storage.upsert_schedule(schedule).await
    }

    /// Stores an item as if ingestion had admitted it now.
    pub async fn insert_item(&self, feed_id: &str, slug: &str) -> Result<FeedItem, HeraldError> {
        let item = FeedItem {
            id: format!("{feed_id}-{slug}"),
            feed_id: feed_id.to_string(),
            guid: None,
            title: format!("Story {slug}"),
            url: format!("https://{feed_id}.example/{slug}"),
            description: None,
            normalized_title: format!("story {slug}"),
            normalized_url: format!("https://{feed_id}.example/{slug}"),
            content_hash: format!("hash-{slug}"),
            published_at: None,
            created_at: herald_core::Clock::now(self.clock.as_ref()),
        };
        self.storage.insert_feed_item(&item).await?;
        Ok(item)
    }

    pub async fn log(&self) -> Result<Vec<MessageLogEntry>, HeraldError> {
        self.storage.query(&LogFilter::default()).await
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.background.cancel();
    }
}

/// An enabled `immediate` schedule using template `plain`.
pub fn immediate_schedule(id: &str, feed_ids: &[&str], target_ids: &[&str]) -> Schedule {
    Schedule {
        id: id.to_string(),
        name: id.to_string(),
        mode: ScheduleMode::Immediate,
        interval_minutes: None,
        times: Vec::new(),
        timezone: "UTC".to_string(),
        feed_ids: feed_ids.iter().map(|s| s.to_string()).collect(),
        target_ids: target_ids.iter().map(|s| s.to_string()).collect(),
        template_id: "plain".to_string(),
        enabled: true,
        last_run_at: None,
    }
}
