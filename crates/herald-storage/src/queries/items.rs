// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feed items. Append-only; `(feed_id, content_hash)` is unique.

use herald_core::{FeedItem, HeraldError};
use rusqlite::params;

use crate::database::{Database, from_millis, map_tr_err, to_millis};

const ITEM_COLUMNS: &str = "id, feed_id, guid, title, url, description, normalized_title,
     normalized_url, content_hash, published_at, created_at";

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeedItem> {
    Ok(FeedItem {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        guid: row.get(2)?,
        title: row.get(3)?,
        url: row.get(4)?,
        description: row.get(5)?,
        normalized_title: row.get(6)?,
        normalized_url: row.get(7)?,
        content_hash: row.get(8)?,
        published_at: row.get::<_, Option<i64>>(9)?.map(from_millis),
        created_at: from_millis(row.get(10)?),
    })
}

pub async fn content_hash_exists(
    db: &Database,
    feed_id: &str,
    content_hash: &str,
) -> Result<bool, HeraldError> {
    let feed_id = feed_id.to_string();
    let content_hash = content_hash.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM feed_items WHERE feed_id = ?1 AND content_hash = ?2)",
                params![feed_id, content_hash],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Insert unless the feed already has this content hash.
/// Returns `true` when a row was written.
pub async fn insert(db: &Database, item: &FeedItem) -> Result<bool, HeraldError> {
    let item = item.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO feed_items (id, feed_id, guid, title, url, description,
                     normalized_title, normalized_url, content_hash, published_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    item.id,
                    item.feed_id,
                    item.guid,
                    item.title,
                    item.url,
                    item.description,
                    item.normalized_title,
                    item.normalized_url,
                    item.content_hash,
                    item.published_at.map(to_millis),
                    to_millis(item.created_at),
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Oldest-first items of `feed_id` for which at least one of `target_ids`
/// has no terminal (`sent` or `skipped`) log row under `schedule_id`.
///
/// Items created before the schedule row was first stored are not owed.
/// Unknown schedules have no cut-off.
pub async fn pending(
    db: &Database,
    feed_id: &str,
    schedule_id: &str,
    target_ids: &[String],
    limit: usize,
) -> Result<Vec<FeedItem>, HeraldError> {
    let feed_id = feed_id.to_string();
    let schedule_id = schedule_id.to_string();
    let targets = serde_json::to_string(target_ids).map_err(HeraldError::storage)?;
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM feed_items fi
                 WHERE fi.feed_id = ?1
                   AND fi.created_at >= COALESCE(
                       (SELECT s.created_at FROM schedules s WHERE s.id = ?2), 0)
                   AND EXISTS (
                       SELECT 1 FROM json_each(?3) t
                       WHERE NOT EXISTS (
                           SELECT 1 FROM message_log ml
                           WHERE ml.feed_item_id = fi.id
                             AND ml.schedule_id = ?2
                             AND ml.target_id = t.value
                             AND ml.status IN ('sent', 'skipped')))
                 ORDER BY fi.created_at ASC, fi.rowid ASC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![feed_id, schedule_id, targets, limit], item_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
