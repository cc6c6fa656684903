// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator command queue. Rows are deleted as they are claimed.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use herald_core::{ControlCommand, ControlRequest, HeraldError};
use rusqlite::params;

use crate::database::{Database, from_millis, map_tr_err, to_millis};

pub async fn enqueue(
    db: &Database,
    session_name: &str,
    command: ControlCommand,
    now: DateTime<Utc>,
) -> Result<i64, HeraldError> {
    let session_name = session_name.to_string();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO control_requests (session_name, command, requested_at)
                 VALUES (?1, ?2, ?3)",
                params![session_name, command.to_string(), now_ms],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn claim(db: &Database, session_name: &str) -> Result<Vec<ControlRequest>, HeraldError> {
    let session_name = session_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let requests = {
                let mut stmt = tx.prepare(
                    "SELECT id, session_name, command, requested_at FROM control_requests
                     WHERE session_name = ?1
                     ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![session_name], |row| {
                    let command: String = row.get(2)?;
                    Ok(ControlRequest {
                        id: row.get(0)?,
                        session_name: row.get(1)?,
                        command: ControlCommand::from_str(&command).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                2,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                        requested_at: from_millis(row.get(3)?),
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            tx.execute(
                "DELETE FROM control_requests WHERE session_name = ?1",
                params![session_name],
            )?;
            tx.commit()?;
            Ok(requests)
        })
        .await
        .map_err(map_tr_err)
}
