// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease store trait for cross-process ownership of the outbound connection.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::HeraldError;
use crate::types::{AcquireOutcome, Lease, RenewOutcome};

/// Durable store of session leases.
///
/// Every mutating operation must be a single atomic conditional write against
/// the backing store. Implementations never check-then-write in two steps.
#[async_trait]
pub trait LeaseStore: Send + Sync + 'static {
    /// Acquires the lease for `session_name`.
    ///
    /// Succeeds when no unexpired lease exists or when `owner_id` already owns
    /// it. Every success issues a fencing token greater than any issued before
    /// for this session.
    async fn acquire(
        &self,
        session_name: &str,
        owner_id: &str,
        ttl: Duration,
    ) -> Result<AcquireOutcome, HeraldError>;

    /// Extends a lease still held under `fencing_token`.
    async fn renew(
        &self,
        session_name: &str,
        owner_id: &str,
        fencing_token: u64,
        ttl: Duration,
    ) -> Result<RenewOutcome, HeraldError>;

    /// Best-effort release. Returns `false` if the caller no longer held it.
    async fn release(
        &self,
        session_name: &str,
        owner_id: &str,
        fencing_token: u64,
    ) -> Result<bool, HeraldError>;

    /// Returns the live lease for `session_name`, if any.
    async fn current(&self, session_name: &str) -> Result<Option<Lease>, HeraldError>;
}
