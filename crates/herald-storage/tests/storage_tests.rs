// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two storage handles on one database file behave like two workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use herald_config::model::StorageConfig;
use herald_core::{AcquireOutcome, LeaseStore, ManualClock, RenewOutcome};
use herald_storage::SqliteStorage;

const TTL: Duration = Duration::from_secs(30);

async fn worker(config: &StorageConfig, clock: Arc<ManualClock>) -> SqliteStorage {
    SqliteStorage::open_with_clock(config, clock).await.unwrap()
}

#[tokio::test]
async fn lease_failover_between_two_handles() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        database_path: dir.path().join("shared.db").display().to_string(),
        wal_mode: true,
    };
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    ));
    let a = worker(&config, clock.clone()).await;
    let b = worker(&config, clock.clone()).await;

    let token_a = match a.acquire("wa", "worker-a", TTL).await.unwrap() {
        AcquireOutcome::Acquired { fencing_token, .. } => fencing_token,
        other => panic!("a should acquire: {other:?}"),
    };
    assert!(!b.acquire("wa", "worker-b", TTL).await.unwrap().is_acquired());
    assert_eq!(
        b.current("wa").await.unwrap().unwrap().owner_id,
        "worker-a"
    );

    // A stops renewing; the lease lapses and B takes over.
    clock.advance(chrono::Duration::seconds(31));
    let token_b = match b.acquire("wa", "worker-b", TTL).await.unwrap() {
        AcquireOutcome::Acquired { fencing_token, .. } => fencing_token,
        other => panic!("b should take over: {other:?}"),
    };
    assert!(token_b > token_a);

    assert_eq!(
        a.renew("wa", "worker-a", token_a, TTL).await.unwrap(),
        RenewOutcome::Fenced
    );
    assert!(matches!(
        b.renew("wa", "worker-b", token_b, TTL).await.unwrap(),
        RenewOutcome::Renewed { .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_elect_exactly_one_owner() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        database_path: dir.path().join("race.db").display().to_string(),
        wal_mode: true,
    };
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    ));
    let mut workers = Vec::new();
    for _ in 0..8 {
        workers.push(worker(&config, clock.clone()).await);
    }

    let outcomes = futures::future::join_all(workers.iter().enumerate().map(|(i, w)| {
        let owner = format!("worker-{i}");
        async move { (owner.clone(), w.acquire("wa", &owner, TTL).await.unwrap()) }
    }))
    .await;

    let winners: Vec<&String> = outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_acquired())
        .map(|(owner, _)| owner)
        .collect();
    assert_eq!(winners.len(), 1, "outcomes: {outcomes:?}");
    for (_, outcome) in &outcomes {
        if let AcquireOutcome::Held { current_owner, .. } = outcome {
            assert_eq!(current_owner, winners[0]);
        }
    }
    let lease = workers[0].current("wa").await.unwrap().unwrap();
    assert_eq!(&lease.owner_id, winners[0]);
    assert_eq!(lease.fencing_token, 1);
}

