// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.
//!
//! All problems are collected; validation never stops at the first one.

use crate::diagnostic::ConfigError;
use crate::model::HeraldConfig;

/// Shortest lease TTL that still leaves a usable renew interval.
pub const MIN_LEASE_TTL_SECS: u64 = 3;

/// Longest tick that cannot step over a whole minute.
pub const MAX_TICK_INTERVAL_SECS: u64 = 59;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &HeraldConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |key: &str, message: String| {
        errors.push(ConfigError::Validation {
            key: key.to_string(),
            message,
        });
    };

    if config.engine.instance_id.trim().is_empty() {
        fail("engine.instance_id", "must not be empty".into());
    }
    if config.engine.session_name.trim().is_empty() {
        fail("engine.session_name", "must not be empty".into());
    }
    if config.engine.tick_interval_secs == 0 {
        fail("engine.tick_interval_secs", "must be greater than 0".into());
    }
    // `times` schedules fire only in their exact local minute.
    if config.engine.tick_interval_secs > MAX_TICK_INTERVAL_SECS {
        fail(
            "engine.tick_interval_secs",
            format!(
                "must be at most {MAX_TICK_INTERVAL_SECS}, got {}",
                config.engine.tick_interval_secs
            ),
        );
    }
    if !LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        fail(
            "engine.log_level",
            format!(
                "`{}` is not one of {}",
                config.engine.log_level,
                LOG_LEVELS.join(", ")
            ),
        );
    }

    if config.lease.ttl_secs < MIN_LEASE_TTL_SECS {
        fail(
            "lease.ttl_secs",
            format!(
                "must be at least {MIN_LEASE_TTL_SECS}, got {}",
                config.lease.ttl_secs
            ),
        );
    }
    if config.lease.takeover_interval_secs == 0 {
        fail("lease.takeover_interval_secs", "must be greater than 0".into());
    }

    if config.connection.backoff_base_ms == 0 {
        fail("connection.backoff_base_ms", "must be greater than 0".into());
    }
    if config.connection.backoff_base_ms > config.connection.backoff_max_ms {
        fail(
            "connection.backoff_base_ms",
            format!(
                "must not exceed connection.backoff_max_ms ({})",
                config.connection.backoff_max_ms
            ),
        );
    }
    if config.connection.connect_timeout_secs == 0 {
        fail("connection.connect_timeout_secs", "must be greater than 0".into());
    }

    for (key, value) in [
        ("dispatch.max_parallel_targets", config.dispatch.max_parallel_targets),
        ("dispatch.max_parallel_schedules", config.dispatch.max_parallel_schedules),
        ("dispatch.error_budget", config.dispatch.error_budget),
        ("dispatch.max_items_per_run", config.dispatch.max_items_per_run),
    ] {
        if value == 0 {
            fail(key, "must be at least 1".into());
        }
    }
    if config.dispatch.send_timeout_secs == 0 {
        fail("dispatch.send_timeout_secs", "must be greater than 0".into());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path", "must not be empty".into());
    }

    if config.ingest.request_timeout_secs == 0 {
        fail("ingest.request_timeout_secs", "must be greater than 0".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
