// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feed definitions and fetch bookkeeping.

use chrono::{DateTime, Utc};
use herald_core::{CleaningRules, Feed, HeraldError};
use rusqlite::params;

use crate::database::{Database, conversion_err, from_millis, map_tr_err, to_millis};

pub async fn upsert(db: &Database, feed: &Feed) -> Result<(), HeraldError> {
    let feed = feed.clone();
    db.connection()
        .call(move |conn| {
            let parse_config = feed
                .parse_config
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(conversion_err)?;
            let cleaning_rules =
                serde_json::to_string(&feed.cleaning_rules).map_err(conversion_err)?;
            conn.execute(
                "INSERT INTO feeds (id, url, feed_type, enabled, fetch_interval_minutes,
                                    last_fetched_at, parse_config, cleaning_rules)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     url = excluded.url,
                     feed_type = excluded.feed_type,
                     enabled = excluded.enabled,
                     fetch_interval_minutes = excluded.fetch_interval_minutes,
                     last_fetched_at = COALESCE(excluded.last_fetched_at, feeds.last_fetched_at),
                     parse_config = excluded.parse_config,
                     cleaning_rules = excluded.cleaning_rules",
                params![
                    feed.id,
                    feed.url,
                    feed.feed_type,
                    feed.enabled,
                    feed.fetch_interval_minutes,
                    feed.last_fetched_at.map(to_millis),
                    parse_config,
                    cleaning_rules,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list(db: &Database) -> Result<Vec<Feed>, HeraldError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, feed_type, enabled, fetch_interval_minutes,
                        last_fetched_at, parse_config, cleaning_rules
                 FROM feeds ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                let parse_config: Option<String> = row.get(6)?;
                let cleaning_rules: String = row.get(7)?;
                Ok(Feed {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    feed_type: row.get(2)?,
                    enabled: row.get(3)?,
                    fetch_interval_minutes: row.get(4)?,
                    last_fetched_at: row.get::<_, Option<i64>>(5)?.map(from_millis),
                    parse_config: parse_config
                        .map(|raw| serde_json::from_str(&raw))
                        .transpose()
                        .map_err(|e| json_column_err(6, e))?,
                    cleaning_rules: serde_json::from_str::<CleaningRules>(&cleaning_rules)
                        .map_err(|e| json_column_err(7, e))?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_fetched(
    db: &Database,
    feed_id: &str,
    at: DateTime<Utc>,
) -> Result<(), HeraldError> {
    let feed_id = feed_id.to_string();
    let at_ms = to_millis(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE feeds SET last_fetched_at = ?1 WHERE id = ?2",
                params![at_ms, feed_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// A JSON column that failed to decode.
pub(crate) fn json_column_err(idx: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::open_test_db;

    pub(crate) fn feed(id: &str) -> Feed {
        Feed {
            id: id.to_string(),
            url: format!("https://example.com/{id}.json"),
            feed_type: "json".to_string(),
            enabled: true,
            fetch_interval_minutes: 15,
            last_fetched_at: None,
            parse_config: Some(serde_json::json!({"items": "$.items"})),
            cleaning_rules: CleaningRules {
                strip_params: vec!["src".into()],
                strip_title_prefixes: vec!["BREAKING:".into()],
            },
        }
    }

    #[tokio::test]
    async fn upsert_and_list_round_trip_json_columns() {
        let (db, _dir) = open_test_db().await;
        upsert(&db, &feed("a")).await.unwrap();
        let feeds = list(&db).await.unwrap();
        assert_eq!(feeds, vec![feed("a")]);
    }

    #[tokio::test]
    async fn operator_upsert_does_not_reset_fetch_stamp() {
        let (db, _dir) = open_test_db().await;
        upsert(&db, &feed("a")).await.unwrap();
        let at = Utc::now();
        mark_fetched(&db, "a", at).await.unwrap();

        let mut edited = feed("a");
        edited.fetch_interval_minutes = 60;
        upsert(&db, &edited).await.unwrap();

        let stored = &list(&db).await.unwrap()[0];
        assert_eq!(stored.fetch_interval_minutes, 60);
        assert_eq!(
            stored.last_fetched_at.map(|t| t.timestamp_millis()),
            Some(at.timestamp_millis())
        );
    }
}
