// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Latest connection snapshot per session, for operators in other processes.

use herald_core::{ConnectionSession, HeraldError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, to_millis};
use crate::queries::feeds::json_column_err;

pub async fn publish(
    db: &Database,
    session_name: &str,
    session: &ConnectionSession,
) -> Result<(), HeraldError> {
    let session_name = session_name.to_string();
    let updated_at = to_millis(session.updated_at);
    let payload = serde_json::to_string(session).map_err(HeraldError::storage)?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO connection_snapshots (session_name, payload, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_name) DO UPDATE SET
                     payload = excluded.payload,
                     updated_at = excluded.updated_at",
                params![session_name, payload, updated_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn read(
    db: &Database,
    session_name: &str,
) -> Result<Option<ConnectionSession>, HeraldError> {
    let session_name = session_name.to_string();
    db.connection()
        .call(move |conn| {
            let payload: Option<String> = conn
                .query_row(
                    "SELECT payload FROM connection_snapshots WHERE session_name = ?1",
                    params![session_name],
                    |row| row.get(0),
                )
                .optional()?;
            payload
                .map(|raw| serde_json::from_str(&raw).map_err(|e| json_column_err(0, e)))
                .transpose()
        })
        .await
        .map_err(map_tr_err)
}
