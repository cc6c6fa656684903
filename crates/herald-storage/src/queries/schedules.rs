// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schedules. List columns are stored as JSON arrays.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use herald_core::{HeraldError, Schedule, ScheduleMode};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, conversion_err, from_millis, map_tr_err, to_millis};
use crate::queries::feeds::json_column_err;

const SCHEDULE_COLUMNS: &str = "id, name, mode, interval_minutes, times, timezone, feed_ids,
     target_ids, template_id, enabled, last_run_at";

fn json_list(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| json_column_err(idx, e))
}

fn schedule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    let mode: String = row.get(2)?;
    Ok(Schedule {
        id: row.get(0)?,
        name: row.get(1)?,
        mode: ScheduleMode::from_str(&mode).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        interval_minutes: row.get(3)?,
        times: json_list(row, 4)?,
        timezone: row.get(5)?,
        feed_ids: json_list(row, 6)?,
        target_ids: json_list(row, 7)?,
        template_id: row.get(8)?,
        enabled: row.get(9)?,
        last_run_at: row.get::<_, Option<i64>>(10)?.map(from_millis),
    })
}

/// Insert or replace the operator-owned fields. `last_run_at` is kept unless
/// the incoming schedule carries one. `created_at` is stamped with `now` on
/// first insert and never moves afterwards.
pub async fn upsert(
    db: &Database,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<(), HeraldError> {
    let s = schedule.clone();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| {
            let times = serde_json::to_string(&s.times).map_err(conversion_err)?;
            let feed_ids = serde_json::to_string(&s.feed_ids).map_err(conversion_err)?;
            let target_ids = serde_json::to_string(&s.target_ids).map_err(conversion_err)?;
            conn.execute(
                "INSERT INTO schedules (id, name, mode, interval_minutes, times, timezone,
                                        feed_ids, target_ids, template_id, enabled, last_run_at,
                                        created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     mode = excluded.mode,
                     interval_minutes = excluded.interval_minutes,
                     times = excluded.times,
                     timezone = excluded.timezone,
                     feed_ids = excluded.feed_ids,
                     target_ids = excluded.target_ids,
                     template_id = excluded.template_id,
                     enabled = excluded.enabled,
                     last_run_at = COALESCE(excluded.last_run_at, schedules.last_run_at)",
                params![
                    s.id,
                    s.name,
                    s.mode.to_string(),
                    s.interval_minutes,
                    times,
                    s.timezone,
                    feed_ids,
                    target_ids,
                    s.template_id,
                    s.enabled,
                    s.last_run_at.map(to_millis),
                    now_ms,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Schedule>, HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
                params![id],
                schedule_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list(db: &Database, enabled_only: bool) -> Result<Vec<Schedule>, HeraldError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SCHEDULE_COLUMNS} FROM schedules
                 WHERE ?1 = 0 OR enabled = 1
                 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![enabled_only], schedule_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_last_run(db: &Database, id: &str, at: DateTime<Utc>) -> Result<(), HeraldError> {
    let id = id.to_string();
    let at_ms = to_millis(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE schedules SET last_run_at = ?1 WHERE id = ?2",
                params![at_ms, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_enabled(db: &Database, id: &str, enabled: bool) -> Result<(), HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE schedules SET enabled = ?1 WHERE id = ?2",
                params![enabled, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::open_test_db;

    fn schedule(id: &str, enabled: bool) -> Schedule {
        Schedule {
            id: id.into(),
            name: format!("Schedule {id}"),
            mode: ScheduleMode::Times,
            interval_minutes: None,
            times: vec!["09:00".into(), "18:30".into()],
            timezone: "Asia/Jakarta".into(),
            feed_ids: vec!["f1".into()],
            target_ids: vec!["t1".into(), "t2".into()],
            template_id: "tpl".into(),
            enabled,
            last_run_at: None,
        }
    }

    #[tokio::test]
    async fn round_trip_and_enabled_filter() {
        let (db, _dir) = open_test_db().await;
        upsert(&db, &schedule("a", true), Utc::now()).await.unwrap();
        upsert(&db, &schedule("b", false), Utc::now()).await.unwrap();

        assert_eq!(get(&db, "a").await.unwrap(), Some(schedule("a", true)));
        assert_eq!(list(&db, false).await.unwrap().len(), 2);
        let enabled = list(&db, true).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "a");
    }

    #[tokio::test]
    async fn last_run_survives_operator_edit() {
        let (db, _dir) = open_test_db().await;
        upsert(&db, &schedule("a", true), Utc::now()).await.unwrap();
        let at = Utc::now();
        set_last_run(&db, "a", at).await.unwrap();
        upsert(&db, &schedule("a", true), Utc::now()).await.unwrap();

        let stored = get(&db, "a").await.unwrap().unwrap();
        assert_eq!(
            stored.last_run_at.map(|t| t.timestamp_millis()),
            Some(at.timestamp_millis())
        );

        set_enabled(&db, "a", false).await.unwrap();
        assert!(!get(&db, "a").await.unwrap().unwrap().enabled);
    }
}
