// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown: signal handling and bounded draining.
//!
//! SIGTERM and SIGINT (Ctrl+C) cancel a [`CancellationToken`]. The driver
//! stops evaluating schedules, lets in-flight jobs finish within the drain
//! timeout, then closes the connection and releases the lease.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs handlers for SIGTERM and SIGINT.
///
/// The returned token is cancelled when either signal arrives.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT, shutting down"),
                        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                        _ = trigger.cancelled() => return,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT, shutting down"),
                        _ = trigger.cancelled() => return,
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = ctrl_c => info!("received Ctrl+C, shutting down"),
                _ = trigger.cancelled() => return,
            }
        }

        trigger.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Awaits `work` for at most `timeout`. Returns `None` if it was cut off.
pub async fn drain<F: Future>(work: F, timeout: Duration) -> Option<F::Output> {
    match tokio::time::timeout(timeout, work).await {
        Ok(output) => Some(output),
        Err(_) => {
            warn!(?timeout, "drain timeout reached, abandoning in-flight work");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_signal_handler_returns_live_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_returns_finished_work() {
        let out = drain(
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                7
            },
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(out, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_cuts_off_slow_work() {
        let out = drain(
            tokio::time::sleep(Duration::from_secs(60)),
            Duration::from_secs(5),
        )
        .await;
        assert!(out.is_none());
    }
}
