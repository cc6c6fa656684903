// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dry-run transport for `herald serve --dry-run`.
//!
//! Pairs instantly and logs every rendered message instead of sending it,
//! so schedules, pacing and the message log can be exercised end to end
//! without a device.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use herald_core::{
    Credentials, HeraldError, OutboundMessage, Transport, TransportEvent, TransportHandle,
    TransportSession,
};
use tokio::sync::mpsc;
use tracing::info;

pub struct DryRunTransport {
    next_handle: AtomicU64,
    open: Mutex<HashMap<String, mpsc::Sender<TransportEvent>>>,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            open: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn connect(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<TransportSession, HeraldError> {
        let handle = format!("dry-run-{}", self.next_handle.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(8);

        if credentials.is_none() {
            let paired = format!("dry-run:{}", chrono::Utc::now().timestamp());
            for event in [
                TransportEvent::Qr(format!("{handle}@pairing")),
                TransportEvent::CredentialsUpdated(Credentials::new(paired)),
                TransportEvent::Paired,
            ] {
                tx.try_send(event)
                    .map_err(|e| HeraldError::Internal(format!("dry-run pairing: {e}")))?;
            }
        }

        self.open
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(handle.clone(), tx);
        info!(handle = handle.as_str(), "dry-run transport connected");
        Ok(TransportSession {
            handle: TransportHandle(handle),
            authenticated: credentials.is_some(),
            events: rx,
        })
    }

    async fn send(
        &self,
        handle: &TransportHandle,
        message: &OutboundMessage,
    ) -> Result<(), HeraldError> {
        info!(
            handle = handle.0.as_str(),
            jid = message.jid.as_str(),
            text = message.text.as_str(),
            "dry run, message not sent"
        );
        Ok(())
    }

    async fn disconnect(&self, handle: &TransportHandle) -> Result<(), HeraldError> {
        self.open
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&handle.0);
        Ok(())
    }
}
