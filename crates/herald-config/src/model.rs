// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Herald broadcast engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Herald configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeraldConfig {
    /// Process identity and driver loop settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Session lease settings.
    #[serde(default)]
    pub lease: LeaseConfig,

    /// Outbound connection and reconnect policy.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Dispatch pipeline limits.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Feed ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Process identity and driver loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Unique identifier of this worker. Used as the lease owner ID.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Logical name of the outbound session guarded by the lease.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Seconds between driver ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Upper bound on draining the in-flight tick during shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            session_name: default_session_name(),
            tick_interval_secs: default_tick_interval_secs(),
            log_level: default_log_level(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn default_instance_id() -> String {
    format!("herald-{}", uuid::Uuid::new_v4())
}

fn default_session_name() -> String {
    "default".to_string()
}

fn default_tick_interval_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_drain_timeout_secs() -> u64 {
    30
}

/// Session lease configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseConfig {
    /// Lease time-to-live. Renewal runs every third of this.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Seconds between acquire attempts while another owner holds the lease.
    #[serde(default = "default_takeover_interval_secs")]
    pub takeover_interval_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            takeover_interval_secs: default_takeover_interval_secs(),
        }
    }
}

impl LeaseConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Renewal cadence: one third of the TTL.
    pub fn renew_interval(&self) -> Duration {
        Duration::from_millis(self.ttl_secs * 1000 / 3)
    }

    pub fn takeover_interval(&self) -> Duration {
        Duration::from_secs(self.takeover_interval_secs)
    }
}

fn default_ttl_secs() -> u64 {
    30
}

fn default_takeover_interval_secs() -> u64 {
    10
}

/// Outbound connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Reconnect attempts before the connection is marked failed.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base delay of the exponential reconnect backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap on a single reconnect delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Timeout for one connect attempt.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_connect_timeout_secs() -> u64 {
    60
}

/// Dispatch pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Targets processed concurrently within one process.
    #[serde(default = "default_max_parallel_targets")]
    pub max_parallel_targets: usize,

    /// Due schedules run concurrently within one tick.
    #[serde(default = "default_max_parallel_schedules")]
    pub max_parallel_schedules: usize,

    /// Failed sends after which a run stops starting new pairs.
    #[serde(default = "default_error_budget")]
    pub error_budget: usize,

    /// Items considered per feed in one run.
    #[serde(default = "default_max_items_per_run")]
    pub max_items_per_run: usize,

    /// Timeout for one send.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_parallel_targets: default_max_parallel_targets(),
            max_parallel_schedules: default_max_parallel_schedules(),
            error_budget: default_error_budget(),
            max_items_per_run: default_max_items_per_run(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

fn default_max_parallel_targets() -> usize {
    4
}

fn default_max_parallel_schedules() -> usize {
    2
}

fn default_error_budget() -> usize {
    10
}

fn default_max_items_per_run() -> usize {
    20
}

fn default_send_timeout_secs() -> u64 {
    30
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file shared by all workers on this host.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("herald").join("herald.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "herald.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Feed ingestion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Run ingestion passes on the driver tick.
    #[serde(default = "default_ingest_enabled")]
    pub enabled: bool,

    /// HTTP timeout for feed fetches.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: default_ingest_enabled(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_ingest_enabled() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    20
}
