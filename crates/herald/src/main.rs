// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Herald - lease-elected feed broadcaster.
//!
//! This is the binary entry point. `serve` runs the engine; the other
//! subcommands are one-shot operator tools against the shared database.

mod control;
mod feed;
mod history;
mod serve;
mod status;
mod transport;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use herald_config::HeraldConfig;

/// Herald - lease-elected feed broadcaster.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the broadcast engine until interrupted.
    Serve {
        /// Log rendered messages instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the lease owner and connection state.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Ask the lease holder to run a schedule on its next tick.
    Trigger {
        /// Schedule ID.
        schedule_id: String,
    },
    /// Show message log rows, newest first.
    Log {
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long)]
        target: Option<String>,
        /// One of queued, sent, skipped, failed.
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Drop the paired device: clear credentials and release the lease.
    Logout,
    /// Move a failed connection back to disconnected so it can be taken over.
    Reset,
}

fn load_config(path: Option<&PathBuf>) -> HeraldConfig {
    let loaded = match path {
        Some(path) => herald_config::load_and_validate_path(path),
        None => herald_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            herald_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Commands::Serve { dry_run } => serve::run_serve(config, dry_run).await,
        Commands::Status { json, plain } => status::run_status(&config, json, plain).await,
        Commands::Trigger { schedule_id } => control::run_trigger(&config, &schedule_id).await,
        Commands::Log {
            schedule,
            target,
            status,
            limit,
            json,
        } => {
            history::run_log(
                &config,
                history::LogArgs {
                    schedule,
                    target,
                    status,
                    limit,
                    json,
                },
            )
            .await
        }
        Commands::Logout => control::run_logout(&config).await,
        Commands::Reset => control::run_reset(&config).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
