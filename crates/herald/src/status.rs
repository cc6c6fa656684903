// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald status` command implementation.
//!
//! Reads the lease table and the published connection snapshot from the
//! shared database. Works whether or not any worker is running.

use std::io::IsTerminal;

use chrono::{DateTime, Utc};
use herald_config::HeraldConfig;
use herald_core::{
    BroadcastStore, ConnectionSession, ConnectionStatus, HeraldError, Lease, LeaseStore,
};
use herald_storage::SqliteStorage;
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session: String,
    /// The live lease, if any worker holds one.
    pub lease: Option<Lease>,
    /// Last snapshot published by the most recent holder.
    pub connection: Option<ConnectionSession>,
}

/// Runs the `herald status` command.
pub async fn run_status(config: &HeraldConfig, json: bool, plain: bool) -> Result<(), HeraldError> {
    let storage = SqliteStorage::open(&config.storage).await?;
    let session = config.engine.session_name.clone();
    let response = StatusResponse {
        lease: storage.current(&session).await?,
        connection: storage.read_connection(&session).await?,
        session,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&response, Utc::now(), use_color);
    }
    Ok(())
}

fn describe_lease(lease: Option<&Lease>, now: DateTime<Utc>) -> String {
    match lease {
        Some(lease) => format!(
            "held by {} (token {}, expires in {}s)",
            lease.owner_id,
            lease.fencing_token,
            (lease.expires_at - now).num_seconds().max(0)
        ),
        None => "free".to_string(),
    }
}

fn print_status(response: &StatusResponse, now: DateTime<Utc>, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  herald status ({})", response.session);
    println!("  {}", "-".repeat(35));

    let lease = describe_lease(response.lease.as_ref(), now);
    if use_color && response.lease.is_some() {
        println!("    Lease:      {}", lease.green());
    } else {
        println!("    Lease:      {lease}");
    }

    match &response.connection {
        Some(conn) => {
            let state = conn.status.to_string();
            let healthy = conn.status == ConnectionStatus::Connected;
            let failed = conn.status == ConnectionStatus::Failed;
            match (use_color, healthy, failed) {
                (true, true, _) => println!("    Connection: {} {}", "✓".green(), state.green()),
                (true, _, true) => println!("    Connection: {} {}", "✗".red(), state.red()),
                (true, _, _) => println!("    Connection: {}", state.yellow()),
                (false, _, _) => println!("    Connection: {state}"),
            }
            println!("    Worker:     {}", conn.instance_id);
            if let Some(error) = &conn.last_error {
                println!("    Last error: {error}");
            }
            if conn.status == ConnectionStatus::QrPending {
                println!("    Pairing:    waiting for the operator to scan the code");
            }
            if failed {
                println!();
                println!("  Revive with: herald reset");
            }
        }
        None => println!("    Connection: never connected"),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn free_lease_is_described() {
        assert_eq!(describe_lease(None, now()), "free");
    }

    #[test]
    fn held_lease_shows_owner_and_remaining_time() {
        let lease = Lease {
            session_name: "default".into(),
            owner_id: "worker-a".into(),
            expires_at: now() + chrono::Duration::seconds(25),
            fencing_token: 7,
        };
        assert_eq!(
            describe_lease(Some(&lease), now()),
            "held by worker-a (token 7, expires in 25s)"
        );
    }

    #[test]
    fn status_response_serializes() {
        let resp = StatusResponse {
            session: "default".into(),
            lease: None,
            connection: Some(ConnectionSession::new("worker-a", now())),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"lease\":null"));
        assert!(json.contains("\"status\":\"disconnected\""));
    }
}
