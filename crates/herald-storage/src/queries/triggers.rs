// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable queue of operator-requested schedule runs.

use chrono::{DateTime, Utc};
use herald_core::{HeraldError, TriggerRequest};
use rusqlite::params;

use crate::database::{Database, from_millis, map_tr_err, to_millis};

pub async fn enqueue(
    db: &Database,
    schedule_id: &str,
    now: DateTime<Utc>,
) -> Result<i64, HeraldError> {
    let schedule_id = schedule_id.to_string();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO trigger_requests (schedule_id, requested_at, status)
                 VALUES (?1, ?2, 'pending')",
                params![schedule_id, now_ms],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claim every open request, oldest first, in one transaction.
///
/// `processing` rows are included: only the lease holder claims, so a
/// `processing` row here was abandoned by a previous holder.
pub async fn claim(db: &Database) -> Result<Vec<TriggerRequest>, HeraldError> {
    db.connection()
        .call(|conn| {
            let tx = conn.transaction()?;
            let requests = {
                let mut stmt = tx.prepare(
                    "SELECT id, schedule_id, requested_at FROM trigger_requests
                     WHERE status IN ('pending', 'processing')
                     ORDER BY id ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(TriggerRequest {
                        id: row.get(0)?,
                        schedule_id: row.get(1)?,
                        requested_at: from_millis(row.get(2)?),
                        status: "processing".to_string(),
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            for request in &requests {
                tx.execute(
                    "UPDATE trigger_requests SET status = 'processing' WHERE id = ?1",
                    params![request.id],
                )?;
            }
            tx.commit()?;
            Ok(requests)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn complete(db: &Database, id: i64, now: DateTime<Utc>) -> Result<(), HeraldError> {
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE trigger_requests SET status = 'completed', completed_at = ?1
                 WHERE id = ?2",
                params![now_ms, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
