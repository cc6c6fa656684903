// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lease keeper.
//!
//! One keeper per process. It acquires the session lease, renews it every
//! third of the TTL and publishes its view of the lease on a watch channel.
//! The connection manager and the dispatch driver both read that channel;
//! neither talks to the lease store directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_config::HeraldConfig;
use herald_core::{AcquireOutcome, HeraldError, LeaseStore, RenewOutcome};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consecutive failed renewals after which the lease is treated as lost.
pub const MAX_MISSED_RENEWALS: u32 = 2;

/// Timing and identity for one lease keeper.
#[derive(Debug, Clone)]
pub struct LeaseSettings {
    pub session_name: String,
    pub owner_id: String,
    pub ttl: Duration,
    pub renew_interval: Duration,
    pub takeover_interval: Duration,
}

impl LeaseSettings {
    pub fn from_config(config: &HeraldConfig) -> Self {
        Self {
            session_name: config.engine.session_name.clone(),
            owner_id: config.engine.instance_id.clone(),
            ttl: config.lease.ttl(),
            renew_interval: config.lease.renew_interval(),
            takeover_interval: config.lease.takeover_interval(),
        }
    }
}

/// This process's view of the session lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    /// Not held. Acquire attempts run on the takeover interval.
    Unheld,
    Held {
        fencing_token: u64,
        expires_at: DateTime<Utc>,
    },
    /// A renewal found that another owner took the lease.
    Fenced,
    /// Renewals failed too many times in a row.
    Lost,
}

impl LeaseStatus {
    pub fn token(&self) -> Option<u64> {
        match self {
            Self::Held { fencing_token, .. } => Some(*fencing_token),
            _ => None,
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, Self::Held { .. })
    }

    /// Held and not yet expired by local reckoning.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::Held { expires_at, .. } if *expires_at > now)
    }
}

/// Acquires, renews and releases the session lease.
pub struct LeaseKeeper {
    store: Arc<dyn LeaseStore>,
    settings: LeaseSettings,
    status: watch::Sender<LeaseStatus>,
    missed: AtomicU32,
}

impl LeaseKeeper {
    pub fn new(store: Arc<dyn LeaseStore>, settings: LeaseSettings) -> Self {
        let (status, _) = watch::channel(LeaseStatus::Unheld);
        Self {
            store,
            settings,
            status,
            missed: AtomicU32::new(0),
        }
    }

    pub fn settings(&self) -> &LeaseSettings {
        &self.settings
    }

    pub fn status(&self) -> LeaseStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LeaseStatus> {
        self.status.subscribe()
    }

    /// Try to take the lease. Returns `true` when this process now holds it.
    pub async fn try_acquire(&self) -> Result<bool, HeraldError> {
        let s = &self.settings;
        match self
            .store
            .acquire(&s.session_name, &s.owner_id, s.ttl)
            .await?
        {
            AcquireOutcome::Acquired {
                fencing_token,
                expires_at,
            } => {
                self.missed.store(0, Ordering::Relaxed);
                self.status.send_replace(LeaseStatus::Held {
                    fencing_token,
                    expires_at,
                });
                info!(
                    session = s.session_name.as_str(),
                    owner = s.owner_id.as_str(),
                    fencing_token,
                    "session lease acquired"
                );
                Ok(true)
            }
            AcquireOutcome::Held {
                current_owner,
                expires_at,
            } => {
                debug!(
                    session = s.session_name.as_str(),
                    current_owner = current_owner.as_str(),
                    %expires_at,
                    "session lease held elsewhere"
                );
                Ok(false)
            }
        }
    }

    /// Renew the held lease once. Store errors and lapses count as misses.
    pub async fn renew(&self) -> LeaseStatus {
        let Some(fencing_token) = self.status().token() else {
            return self.status();
        };
        let s = &self.settings;
        let outcome = self
            .store
            .renew(&s.session_name, &s.owner_id, fencing_token, s.ttl)
            .await;

        match outcome {
            Ok(RenewOutcome::Renewed { expires_at }) => {
                self.missed.store(0, Ordering::Relaxed);
                self.status.send_replace(LeaseStatus::Held {
                    fencing_token,
                    expires_at,
                });
                debug!(session = s.session_name.as_str(), %expires_at, "lease renewed");
            }
            Ok(RenewOutcome::Fenced) => {
                warn!(
                    session = s.session_name.as_str(),
                    fencing_token, "lease fenced by another owner"
                );
                self.status.send_replace(LeaseStatus::Fenced);
            }
            Ok(RenewOutcome::Expired) => self.miss("lease expired before renewal"),
            Err(e) => self.miss(&e.to_string()),
        }
        self.status()
    }

    fn miss(&self, reason: &str) {
        let missed = self.missed.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            session = self.settings.session_name.as_str(),
            missed,
            reason,
            "lease renewal missed"
        );
        if missed >= MAX_MISSED_RENEWALS {
            self.status.send_replace(LeaseStatus::Lost);
        }
    }

    /// One keeper step. Returns how long to wait before the next one.
    pub async fn step(&self) -> Duration {
        if self.status().is_held() {
            self.renew().await;
        } else if let Err(e) = self.try_acquire().await {
            warn!(error = %e, "lease acquire failed");
        }
        if self.status().is_held() {
            self.settings.renew_interval
        } else {
            self.settings.takeover_interval
        }
    }

    /// Runs the keeper until `cancel` fires, then releases the lease.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let wait = self.step().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        self.release().await;
    }

    /// Best-effort release. The status becomes `Unheld` either way.
    pub async fn release(&self) {
        if let Some(fencing_token) = self.status().token() {
            let s = &self.settings;
            match self
                .store
                .release(&s.session_name, &s.owner_id, fencing_token)
                .await
            {
                Ok(true) => info!(session = s.session_name.as_str(), "session lease released"),
                Ok(false) => debug!(session = s.session_name.as_str(), "lease already gone"),
                Err(e) => warn!(error = %e, "lease release failed"),
            }
        }
        self.missed.store(0, Ordering::Relaxed);
        self.status.send_replace(LeaseStatus::Unheld);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use herald_core::{Clock, ManualClock};
    use herald_test_utils::MemoryLeaseStore;

    fn settings(owner: &str) -> LeaseSettings {
        LeaseSettings {
            session_name: "default".into(),
            owner_id: owner.into(),
            ttl: Duration::from_secs(30),
            renew_interval: Duration::from_secs(10),
            takeover_interval: Duration::from_secs(10),
        }
    }

    fn setup() -> (Arc<ManualClock>, Arc<MemoryLeaseStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryLeaseStore::new(clock.clone()));
        (clock, store)
    }

    #[tokio::test]
    async fn second_owner_waits_until_expiry() {
        let (clock, store) = setup();
        let a = LeaseKeeper::new(store.clone(), settings("a"));
        let b = LeaseKeeper::new(store.clone(), settings("b"));

        assert!(a.try_acquire().await.unwrap());
        assert!(!b.try_acquire().await.unwrap());
        assert_eq!(b.status(), LeaseStatus::Unheld);

        clock.advance(chrono::Duration::seconds(31));
        assert!(b.try_acquire().await.unwrap());
        assert!(b.status().token().unwrap() > 1);

        // `a` learns it was fenced at its next renewal.
        assert_eq!(a.renew().await, LeaseStatus::Fenced);
    }

    #[tokio::test]
    async fn renewal_extends_expiry() {
        let (clock, store) = setup();
        let keeper = LeaseKeeper::new(store, settings("a"));
        keeper.try_acquire().await.unwrap();

        clock.advance(chrono::Duration::seconds(10));
        let LeaseStatus::Held { expires_at, .. } = keeper.renew().await else {
            panic!("expected held");
        };
        assert_eq!(expires_at, clock.now() + chrono::Duration::seconds(30));
        assert!(keeper.status().is_valid_at(clock.now()));
    }

    #[tokio::test]
    async fn two_missed_renewals_lose_the_lease() {
        let (_clock, store) = setup();
        let keeper = LeaseKeeper::new(store.clone(), settings("a"));
        keeper.try_acquire().await.unwrap();

        store.fail_next_renewals(2);
        assert!(keeper.renew().await.is_held());
        assert_eq!(keeper.renew().await, LeaseStatus::Lost);
    }

    #[tokio::test]
    async fn a_successful_renewal_resets_the_miss_count() {
        let (_clock, store) = setup();
        let keeper = LeaseKeeper::new(store.clone(), settings("a"));
        keeper.try_acquire().await.unwrap();

        store.fail_next_renewals(1);
        keeper.renew().await;
        keeper.renew().await;
        store.fail_next_renewals(1);
        assert!(keeper.renew().await.is_held());
    }

    #[tokio::test]
    async fn release_lets_the_next_owner_in_immediately() {
        let (_clock, store) = setup();
        let a = LeaseKeeper::new(store.clone(), settings("a"));
        let b = LeaseKeeper::new(store.clone(), settings("b"));
        a.try_acquire().await.unwrap();
        let mut seen = a.subscribe();

        a.release().await;
        assert_eq!(*seen.borrow_and_update(), LeaseStatus::Unheld);
        assert!(b.try_acquire().await.unwrap());
    }

    #[test]
    fn validity_tracks_local_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let held = LeaseStatus::Held {
            fencing_token: 3,
            expires_at: now + chrono::Duration::seconds(5),
        };
        assert!(held.is_valid_at(now));
        assert!(!held.is_valid_at(now + chrono::Duration::seconds(5)));
        assert!(!LeaseStatus::Fenced.is_valid_at(now));
        assert_eq!(LeaseStatus::Lost.token(), None);
    }
}
