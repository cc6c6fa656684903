// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stored transport credentials, one row per session name.

use chrono::{DateTime, Utc};
use herald_core::{Credentials, HeraldError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, to_millis};

pub async fn load(db: &Database, session_name: &str) -> Result<Option<Credentials>, HeraldError> {
    let session_name = session_name.to_string();
    let payload: Option<String> = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT payload FROM credentials WHERE session_name = ?1",
                params![session_name],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(payload.map(Credentials::new))
}

pub async fn save(
    db: &Database,
    session_name: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<(), HeraldError> {
    let session_name = session_name.to_string();
    let payload = credentials.expose().to_string();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO credentials (session_name, payload, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_name) DO UPDATE SET
                     payload = excluded.payload,
                     updated_at = excluded.updated_at",
                params![session_name, payload, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn clear(db: &Database, session_name: &str) -> Result<(), HeraldError> {
    let session_name = session_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM credentials WHERE session_name = ?1",
                params![session_name],
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

    #[tokio::test]
    async fn save_load_clear() {
        let (db, _dir) = open_test_db().await;
        assert!(load(&db, "s").await.unwrap().is_none());

        save(&db, "s", &Credentials::new("v1"), Utc::now()).await.unwrap();
        save(&db, "s", &Credentials::new("v2"), Utc::now()).await.unwrap();
        assert_eq!(load(&db, "s").await.unwrap().unwrap().expose(), "v2");

        clear(&db, "s").await.unwrap();
        assert!(load(&db, "s").await.unwrap().is_none());
    }
}
