// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald log` command implementation.

use std::io::IsTerminal;
use std::str::FromStr;

use herald_config::HeraldConfig;
use herald_core::{DeliveryStatus, HeraldError, LogFilter, MessageLog, MessageLogEntry};
use herald_storage::SqliteStorage;

pub struct LogArgs {
    pub schedule: Option<String>,
    pub target: Option<String>,
    pub status: Option<String>,
    pub limit: usize,
    pub json: bool,
}

impl LogArgs {
    fn filter(&self) -> Result<LogFilter, HeraldError> {
        let status = self
            .status
            .as_deref()
            .map(|s| {
                DeliveryStatus::from_str(s).map_err(|_| {
                    HeraldError::Config(format!(
                        "unknown status `{s}` (expected queued, sent, skipped or failed)"
                    ))
                })
            })
            .transpose()?;
        Ok(LogFilter {
            schedule_id: self.schedule.clone(),
            target_id: self.target.clone(),
            status,
            limit: Some(self.limit),
        })
    }
}

pub async fn run_log(config: &HeraldConfig, args: LogArgs) -> Result<(), HeraldError> {
    let filter = args.filter()?;
    let storage = SqliteStorage::open(&config.storage).await?;
    let entries = storage.query(&filter).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }

    if entries.is_empty() {
        println!("no message log entries");
        return Ok(());
    }
    let use_color = std::io::stdout().is_terminal();
    for entry in &entries {
        println!("{}", format_entry(entry, use_color));
    }
    Ok(())
}

fn format_entry(entry: &MessageLogEntry, use_color: bool) -> String {
    use colored::Colorize;

    let status = format!("{:<7}", entry.status.to_string());
    let status = match (use_color, entry.status) {
        (false, _) => status,
        (true, DeliveryStatus::Sent) => status.green().to_string(),
        (true, DeliveryStatus::Failed) => status.red().to_string(),
        (true, DeliveryStatus::Skipped) => status.yellow().to_string(),
        (true, DeliveryStatus::Queued) => status.dimmed().to_string(),
    };
    let mut line = format!(
        "{}  {}  {:<16} -> {:<16} {}",
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        status,
        entry.schedule_id,
        entry.target_id,
        entry.feed_item_id,
    );
    if let Some(error) = &entry.error {
        line.push_str(&format!("  ({error})"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn args(status: Option<&str>) -> LogArgs {
        LogArgs {
            schedule: Some("morning".into()),
            target: None,
            status: status.map(String::from),
            limit: 10,
            json: false,
        }
    }

    #[test]
    fn status_filter_parses() {
        let filter = args(Some("skipped")).filter().unwrap();
        assert_eq!(filter.status, Some(DeliveryStatus::Skipped));
        assert_eq!(filter.schedule_id.as_deref(), Some("morning"));
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = args(Some("bounced")).filter().unwrap_err();
        assert!(err.to_string().contains("unknown status `bounced`"));
    }

    #[test]
    fn entries_render_on_one_line_with_their_error() {
        let entry = MessageLogEntry {
            id: 1,
            feed_item_id: "item-1".into(),
            target_id: "newsroom".into(),
            schedule_id: "morning".into(),
            status: DeliveryStatus::Skipped,
            error: Some("permanent transport error: not a group member".into()),
            sent_at: None,
            created_at: Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
        };
        let line = format_entry(&entry, false);
        assert!(line.starts_with("2026-05-01 09:00:00  skipped"));
        assert!(line.contains("newsroom"));
        assert!(line.ends_with("(permanent transport error: not a group member)"));
    }
}
