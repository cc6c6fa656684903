// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald serve` command implementation.
//!
//! Opens the shared SQLite database, assembles the broadcast engine and runs
//! it until SIGINT or SIGTERM. Every worker pointed at the same database and
//! session name competes for the one lease; the rest idle as standbys.

use std::sync::Arc;
use std::time::Duration;

use herald_config::HeraldConfig;
use herald_core::{HeraldError, SystemClock, Transport};
use herald_engine::{BroadcastEngine, EngineDeps, install_signal_handler};
use herald_storage::SqliteStorage;
use tracing::info;

use crate::feed::JsonFeedSource;
use crate::transport::DryRunTransport;

/// Runs the `herald serve` command.
pub async fn run_serve(config: HeraldConfig, dry_run: bool) -> Result<(), HeraldError> {
    let transport = select_transport(dry_run)?;
    init_tracing(&config.engine.log_level);

    info!(
        instance = config.engine.instance_id.as_str(),
        session = config.engine.session_name.as_str(),
        database = config.storage.database_path.as_str(),
        transport = transport.name(),
        "starting herald serve"
    );

    let storage = SqliteStorage::open(&config.storage).await?;
    let feeds = JsonFeedSource::new(Duration::from_secs(config.ingest.request_timeout_secs))?;

    let engine = BroadcastEngine::new(
        config,
        EngineDeps {
            lease_store: Arc::new(storage.clone()),
            credentials: Arc::new(storage.clone()),
            store: Arc::new(storage.clone()),
            log: Arc::new(storage.clone()),
            transport,
            feeds: Arc::new(feeds),
            clock: Arc::new(SystemClock),
        },
    );

    let cancel = install_signal_handler();
    let outcome = engine.run(cancel).await;
    drop(engine);

    storage.close().await?;
    info!("herald serve stopped");
    outcome
}

/// The outbound protocol transport is an external collaborator; this
/// binary only ships the dry-run implementation.
fn select_transport(dry_run: bool) -> Result<Arc<dyn Transport>, HeraldError> {
    if dry_run {
        Ok(Arc::new(DryRunTransport::new()))
    } else {
        Err(HeraldError::Config(
            "no messaging transport is linked into this build; run `herald serve --dry-run`"
                .into(),
        ))
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("herald={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_selects_the_logging_transport() {
        let transport = select_transport(true).unwrap();
        assert_eq!(transport.name(), "dry-run");
    }

    #[test]
    fn live_mode_without_a_transport_is_a_config_error() {
        let err = select_transport(false).err().unwrap();
        assert!(matches!(err, HeraldError::Config(_)));
    }
}
