// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging targets and message templates.

use std::str::FromStr;

use herald_core::{HeraldError, Target, TargetType, Template};
use rusqlite::{OptionalExtension, params, params_from_iter};

use crate::database::{Database, map_tr_err};

fn parse_target_type(idx: usize, raw: &str) -> rusqlite::Result<TargetType> {
    TargetType::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub async fn upsert_target(db: &Database, target: &Target) -> Result<(), HeraldError> {
    let target = target.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO targets (id, jid, target_type, enabled, intra_delay_sec)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     jid = excluded.jid,
                     target_type = excluded.target_type,
                     enabled = excluded.enabled,
                     intra_delay_sec = excluded.intra_delay_sec",
                params![
                    target.id,
                    target.jid,
                    target.target_type.to_string(),
                    target.enabled,
                    target.intra_delay_sec,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Targets with the given IDs, in the order requested. Unknown IDs are skipped.
pub async fn get_targets(db: &Database, ids: &[String]) -> Result<Vec<Target>, HeraldError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT id, jid, target_type, enabled, intra_delay_sec
                 FROM targets WHERE id IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                let kind: String = row.get(2)?;
                Ok(Target {
                    id: row.get(0)?,
                    jid: row.get(1)?,
                    target_type: parse_target_type(2, &kind)?,
                    enabled: row.get(3)?,
                    intra_delay_sec: row.get(4)?,
                })
            })?;
            let mut targets = rows.collect::<Result<Vec<_>, _>>()?;
            targets.sort_by_key(|t| ids.iter().position(|id| *id == t.id));
            Ok(targets)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_template(db: &Database, template: &Template) -> Result<(), HeraldError> {
    let template = template.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO templates (id, name, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, body = excluded.body",
                params![template.id, template.name, template.body],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_template(db: &Database, id: &str) -> Result<Option<Template>, HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, name, body FROM templates WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Template {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        body: row.get(2)?,
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
    use super::*;
    use crate::queries::test_support::open_test_db;

    fn target(id: &str) -> Target {
        Target {
            id: id.into(),
            jid: format!("{id}@g.us"),
            target_type: TargetType::Group,
            enabled: true,
            intra_delay_sec: 3,
        }
    }

    #[tokio::test]
    async fn get_targets_keeps_requested_order_and_skips_unknown() {
        let (db, _dir) = open_test_db().await;
        for id in ["a", "b", "c"] {
            upsert_target(&db, &target(id)).await.unwrap();
        }
        let ids = vec!["c".to_string(), "missing".to_string(), "a".to_string()];
        let got: Vec<String> = get_targets(&db, &ids)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(got, vec!["c", "a"]);
        assert!(get_targets(&db, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn template_round_trip() {
        let (db, _dir) = open_test_db().await;
        assert!(get_template(&db, "t").await.unwrap().is_none());
        let template = Template {
            id: "t".into(),
            name: "Headline".into(),
            body: "*{title}*\n{url}".into(),
        };
        upsert_template(&db, &template).await.unwrap();
        assert_eq!(get_template(&db, "t").await.unwrap(), Some(template));
    }
}
