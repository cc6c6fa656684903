// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message log.
//!
//! A partial unique index admits at most one `sent` row per
//! `(feed_item_id, target_id, schedule_id)`; appends that would break it are
//! dropped with `INSERT OR IGNORE`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use herald_core::{DeliveryRecord, DeliveryStatus, HeraldError, LogFilter, MessageLogEntry};
use rusqlite::params;
use rusqlite::types::Value;

use crate::database::{Database, from_millis, map_tr_err, to_millis};

/// Row cap when the filter does not set one.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

pub async fn has_sent(
    db: &Database,
    feed_item_id: &str,
    target_id: &str,
    schedule_id: &str,
) -> Result<bool, HeraldError> {
    let (item, target, schedule) = (
        feed_item_id.to_string(),
        target_id.to_string(),
        schedule_id.to_string(),
    );
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM message_log
                 WHERE feed_item_id = ?1 AND target_id = ?2 AND schedule_id = ?3
                   AND status = 'sent')",
                params![item, target, schedule],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Append a row. `None` means a `sent` row for the triple already existed.
pub async fn append(
    db: &Database,
    record: &DeliveryRecord,
    now: DateTime<Utc>,
) -> Result<Option<i64>, HeraldError> {
    let record = record.clone();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO message_log
                     (feed_item_id, target_id, schedule_id, status, error, sent_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.feed_item_id,
                    record.target_id,
                    record.schedule_id,
                    record.status.to_string(),
                    record.error,
                    record.sent_at.map(to_millis),
                    now_ms,
                ],
            )?;
            Ok((changed == 1).then(|| conn.last_insert_rowid()))
        })
        .await
        .map_err(map_tr_err)
}

/// Newest first, filtered by whichever fields of `filter` are set.
pub async fn query(db: &Database, filter: &LogFilter) -> Result<Vec<MessageLogEntry>, HeraldError> {
    let mut clauses = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(schedule_id) = &filter.schedule_id {
        clauses.push("schedule_id = ?");
        values.push(Value::Text(schedule_id.clone()));
    }
    if let Some(target_id) = &filter.target_id {
        clauses.push("target_id = ?");
        values.push(Value::Text(target_id.clone()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Value::Text(status.to_string()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let limit = filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT) as i64;
    values.push(Value::Integer(limit));

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, feed_item_id, target_id, schedule_id, status, error, sent_at, created_at
                 FROM message_log {where_sql}
                 ORDER BY id DESC
                 LIMIT ?"
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
                let status: String = row.get(4)?;
                Ok(MessageLogEntry {
                    id: row.get(0)?,
                    feed_item_id: row.get(1)?,
                    target_id: row.get(2)?,
                    schedule_id: row.get(3)?,
                    status: DeliveryStatus::from_str(&status).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            4,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    error: row.get(5)?,
                    sent_at: row.get::<_, Option<i64>>(6)?.map(from_millis),
                    created_at: from_millis(row.get(7)?),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::open_test_db;

    fn record(item: &str, target: &str, status: DeliveryStatus) -> DeliveryRecord {
        DeliveryRecord {
            feed_item_id: item.into(),
            target_id: target.into(),
            schedule_id: "s".into(),
            status,
            error: (status == DeliveryStatus::Failed).then(|| "timeout".to_string()),
            sent_at: (status == DeliveryStatus::Sent).then(Utc::now),
        }
    }

    #[tokio::test]
    async fn second_sent_row_is_dropped() {
        let (db, _dir) = open_test_db().await;
        let now = Utc::now();
        assert!(!has_sent(&db, "i", "t", "s").await.unwrap());

        let first = append(&db, &record("i", "t", DeliveryStatus::Sent), now).await.unwrap();
        assert!(first.is_some());
        let second = append(&db, &record("i", "t", DeliveryStatus::Sent), now).await.unwrap();
        assert!(second.is_none());
        assert!(has_sent(&db, "i", "t", "s").await.unwrap());

        let sent = query(
            &db,
            &LogFilter {
                status: Some(DeliveryStatus::Sent),
                ..LogFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn failed_rows_accumulate() {
        let (db, _dir) = open_test_db().await;
        let now = Utc::now();
        for _ in 0..3 {
            let id = append(&db, &record("i", "t", DeliveryStatus::Failed), now)
                .await
                .unwrap();
            assert!(id.is_some());
        }
        assert!(!has_sent(&db, "i", "t", "s").await.unwrap());
    }

    #[tokio::test]
    async fn query_filters_newest_first_with_limit() {
        let (db, _dir) = open_test_db().await;
        let now = Utc::now();
        append(&db, &record("i1", "t1", DeliveryStatus::Sent), now).await.unwrap();
        append(&db, &record("i1", "t2", DeliveryStatus::Skipped), now).await.unwrap();
        append(&db, &record("i2", "t1", DeliveryStatus::Failed), now).await.unwrap();

        let t1 = query(
            &db,
            &LogFilter {
                target_id: Some("t1".into()),
                ..LogFilter::default()
            },
        )
        .await
        .unwrap();
        let items: Vec<&str> = t1.iter().map(|e| e.feed_item_id.as_str()).collect();
        assert_eq!(items, vec!["i2", "i1"]);

        let limited = query(
            &db,
            &LogFilter {
                limit: Some(1),
                ..LogFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].feed_item_id, "i2");
        assert_eq!(limited[0].status, DeliveryStatus::Failed);
        assert_eq!(limited[0].error.as_deref(), Some("timeout"));
    }
}
