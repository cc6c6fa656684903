// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lease rows.
//!
//! Acquire is a single conditional UPSERT: it either inserts the first row,
//! takes over an expired row, or refreshes a row the caller already owns,
//! bumping the fencing token in every case. Nothing is ever read first and
//! written second.

use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_core::{AcquireOutcome, HeraldError, Lease, RenewOutcome};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, from_millis, map_tr_err, to_millis};

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

pub async fn acquire(
    db: &Database,
    session_name: &str,
    owner_id: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<AcquireOutcome, HeraldError> {
    let session_name = session_name.to_string();
    let owner_id = owner_id.to_string();
    let now_ms = to_millis(now);
    let expires_ms = now_ms.saturating_add(ttl_millis(ttl));

    db.connection()
        .call(move |conn| {
            let won: Option<(i64, i64)> = conn
                .query_row(
                    "INSERT INTO leases (session_name, owner_id, expires_at, fencing_token)
                     VALUES (?1, ?2, ?3, 1)
                     ON CONFLICT(session_name) DO UPDATE SET
                         owner_id = excluded.owner_id,
                         expires_at = excluded.expires_at,
                         fencing_token = leases.fencing_token + 1
                     WHERE leases.expires_at <= ?4 OR leases.owner_id = excluded.owner_id
                     RETURNING fencing_token, expires_at",
                    params![session_name, owner_id, expires_ms, now_ms],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match won {
                Some((token, expires_at)) => Ok(AcquireOutcome::Acquired {
                    fencing_token: token as u64,
                    expires_at: from_millis(expires_at),
                }),
                None => {
                    let (current_owner, expires_at): (String, i64) = conn.query_row(
                        "SELECT owner_id, expires_at FROM leases WHERE session_name = ?1",
                        params![session_name],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )?;
                    Ok(AcquireOutcome::Held {
                        current_owner,
                        expires_at: from_millis(expires_at),
                    })
                }
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn renew(
    db: &Database,
    session_name: &str,
    owner_id: &str,
    fencing_token: u64,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<RenewOutcome, HeraldError> {
    let session_name = session_name.to_string();
    let owner_id = owner_id.to_string();
    let token = fencing_token as i64;
    let now_ms = to_millis(now);
    let expires_ms = now_ms.saturating_add(ttl_millis(ttl));

    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE leases SET expires_at = ?1
                 WHERE session_name = ?2 AND owner_id = ?3 AND fencing_token = ?4
                   AND expires_at > ?5",
                params![expires_ms, session_name, owner_id, token, now_ms],
            )?;
            if changed == 1 {
                return Ok(RenewOutcome::Renewed {
                    expires_at: from_millis(expires_ms),
                });
            }

            let stored: Option<(String, i64)> = conn
                .query_row(
                    "SELECT owner_id, fencing_token FROM leases WHERE session_name = ?1",
                    params![session_name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(match stored {
                Some((owner, stored_token)) if owner != owner_id || stored_token != token => {
                    RenewOutcome::Fenced
                }
                _ => RenewOutcome::Expired,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Expire the lease in place. The row stays so the token counter survives.
pub async fn release(
    db: &Database,
    session_name: &str,
    owner_id: &str,
    fencing_token: u64,
) -> Result<bool, HeraldError> {
    let session_name = session_name.to_string();
    let owner_id = owner_id.to_string();
    let token = fencing_token as i64;
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE leases SET expires_at = 0
                 WHERE session_name = ?1 AND owner_id = ?2 AND fencing_token = ?3",
                params![session_name, owner_id, token],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// The lease for `session_name` if it is still live at `now`.
pub async fn current(
    db: &Database,
    session_name: &str,
    now: DateTime<Utc>,
) -> Result<Option<Lease>, HeraldError> {
    let session_name = session_name.to_string();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT session_name, owner_id, expires_at, fencing_token
                 FROM leases WHERE session_name = ?1 AND expires_at > ?2",
                params![session_name, now_ms],
                |row| {
                    Ok(Lease {
                        session_name: row.get(0)?,
                        owner_id: row.get(1)?,
                        expires_at: from_millis(row.get(2)?),
                        fencing_token: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::queries::test_support::open_test_db;

    const TTL: Duration = Duration::from_secs(30);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    fn token(outcome: &AcquireOutcome) -> u64 {
        match outcome {
            AcquireOutcome::Acquired { fencing_token, .. } => *fencing_token,
            other => panic!("expected Acquired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_owner_is_refused_while_lease_is_live() {
        let (db, _dir) = open_test_db().await;
        let a = acquire(&db, "s", "a", t0(), TTL).await.unwrap();
        assert_eq!(token(&a), 1);

        let b = acquire(&db, "s", "b", t0() + secs(10), TTL).await.unwrap();
        match b {
            AcquireOutcome::Held { current_owner, .. } => assert_eq!(current_owner, "a"),
            other => panic!("expected Held, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn takeover_after_expiry_issues_larger_token() {
        let (db, _dir) = open_test_db().await;
        let a = token(&acquire(&db, "s", "a", t0(), TTL).await.unwrap());
        let b = token(&acquire(&db, "s", "b", t0() + secs(30), TTL).await.unwrap());
        assert!(b > a);

        // A's renew with its stale token is fenced.
        let renew_a = renew(&db, "s", "a", a, t0() + secs(31), TTL).await.unwrap();
        assert_eq!(renew_a, RenewOutcome::Fenced);
    }

    #[tokio::test]
    async fn reacquire_by_owner_is_idempotent_and_bumps_token() {
        let (db, _dir) = open_test_db().await;
        let first = token(&acquire(&db, "s", "a", t0(), TTL).await.unwrap());
        let second = token(&acquire(&db, "s", "a", t0() + secs(5), TTL).await.unwrap());
        assert!(second > first);
        // The old token no longer renews.
        assert_eq!(
            renew(&db, "s", "a", first, t0() + secs(6), TTL).await.unwrap(),
            RenewOutcome::Fenced
        );
    }

    #[tokio::test]
    async fn renew_extends_and_expired_is_reported() {
        let (db, _dir) = open_test_db().await;
        let tok = token(&acquire(&db, "s", "a", t0(), TTL).await.unwrap());

        let renewed = renew(&db, "s", "a", tok, t0() + secs(10), TTL).await.unwrap();
        assert_eq!(
            renewed,
            RenewOutcome::Renewed {
                expires_at: t0() + secs(40)
            }
        );

        let late = renew(&db, "s", "a", tok, t0() + secs(41), TTL).await.unwrap();
        assert_eq!(late, RenewOutcome::Expired);
    }

    #[tokio::test]
    async fn release_keeps_token_counter() {
        let (db, _dir) = open_test_db().await;
        let a = token(&acquire(&db, "s", "a", t0(), TTL).await.unwrap());
        assert!(release(&db, "s", "a", a).await.unwrap());
        assert!(current(&db, "s", t0() + secs(1)).await.unwrap().is_none());

        let b = token(&acquire(&db, "s", "b", t0() + secs(1), TTL).await.unwrap());
        assert!(b > a);
        // Releasing with a stale token is a no-op.
        assert!(!release(&db, "s", "a", a).await.unwrap());
    }

    #[tokio::test]
    async fn current_reports_live_owner() {
        let (db, _dir) = open_test_db().await;
        assert!(current(&db, "s", t0()).await.unwrap().is_none());
        acquire(&db, "s", "a", t0(), TTL).await.unwrap();
        let lease = current(&db, "s", t0() + secs(1)).await.unwrap().unwrap();
        assert_eq!(lease.owner_id, "a");
        assert_eq!(lease.fencing_token, 1);
        assert!(current(&db, "s", t0() + secs(30)).await.unwrap().is_none());
    }
}
