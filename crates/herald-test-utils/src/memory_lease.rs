// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory lease store with injectable renewal failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::{AcquireOutcome, Clock, HeraldError, Lease, LeaseStore, RenewOutcome};

#[derive(Default)]
struct Table {
    leases: HashMap<String, Lease>,
    last_token: HashMap<String, u64>,
}

pub struct MemoryLeaseStore {
    clock: Arc<dyn Clock>,
    table: Mutex<Table>,
    failing_renewals: AtomicUsize,
}

impl MemoryLeaseStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            table: Mutex::new(Table::default()),
            failing_renewals: AtomicUsize::new(0),
        }
    }

    /// The next `n` renewals fail with a storage error.
    pub fn fail_next_renewals(&self, n: usize) {
        self.failing_renewals.store(n, Ordering::SeqCst);
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn acquire(
        &self,
        session_name: &str,
        owner_id: &str,
        ttl: Duration,
    ) -> Result<AcquireOutcome, HeraldError> {
        let now = self.clock.now();
        let mut table = self.table.lock().unwrap();
        if let Some(lease) = table.leases.get(session_name)
            && lease.is_live(now)
            && lease.owner_id != owner_id
        {
            return Ok(AcquireOutcome::Held {
                current_owner: lease.owner_id.clone(),
                expires_at: lease.expires_at,
            });
        }

        let token = table.last_token.entry(session_name.to_string()).or_default();
        *token += 1;
        let fencing_token = *token;
        let expires_at = self.expiry(ttl);
        table.leases.insert(
            session_name.to_string(),
            Lease {
                session_name: session_name.to_string(),
                owner_id: owner_id.to_string(),
                expires_at,
                fencing_token,
            },
        );
        Ok(AcquireOutcome::Acquired {
            fencing_token,
            expires_at,
        })
    }

    async fn renew(
        &self,
        session_name: &str,
        owner_id: &str,
        fencing_token: u64,
        ttl: Duration,
    ) -> Result<RenewOutcome, HeraldError> {
        if self
            .failing_renewals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(HeraldError::storage("injected renewal failure"));
        }

        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut table = self.table.lock().unwrap();
        Ok(match table.leases.get_mut(session_name) {
            Some(lease) if lease.owner_id == owner_id && lease.fencing_token == fencing_token => {
                if lease.is_live(now) {
                    lease.expires_at = expires_at;
                    RenewOutcome::Renewed { expires_at }
                } else {
                    RenewOutcome::Expired
                }
            }
            Some(_) => RenewOutcome::Fenced,
            None => RenewOutcome::Expired,
        })
    }

    async fn release(
        &self,
        session_name: &str,
        owner_id: &str,
        fencing_token: u64,
    ) -> Result<bool, HeraldError> {
        let mut table = self.table.lock().unwrap();
        let ours = table
            .leases
            .get(session_name)
            .is_some_and(|l| l.owner_id == owner_id && l.fencing_token == fencing_token);
        if ours {
            table.leases.remove(session_name);
        }
        Ok(ours)
    }

    async fn current(&self, session_name: &str) -> Result<Option<Lease>, HeraldError> {
        let now = self.clock.now();
        Ok(self
            .table
            .lock()
            .unwrap()
            .leases
            .get(session_name)
            .filter(|l| l.is_live(now))
            .cloned())
    }
}
