// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drives the connection state machine against the transport.
//!
//! All state changes happen on the manager's run loop. Connect attempts,
//! backoff timers and transport event streams run in their own tasks and
//! report back through an internal channel tagged with the link epoch, so
//! results that arrive after the link was torn down are discarded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use herald_config::HeraldConfig;
use herald_core::{
    BroadcastStore, Clock, ConnectionSession, ConnectionStatus, CredentialStore, HeraldError,
    OutboundMessage, Transport, TransportEvent, TransportHandle, TransportSession,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::connection::machine::{ConnectionEvent, Effect, MachineLimits, transition};
use crate::lease::{LeaseKeeper, LeaseStatus};

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub session_name: String,
    pub instance_id: String,
    pub limits: MachineLimits,
    pub backoff: Backoff,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &HeraldConfig) -> Self {
        Self {
            session_name: config.engine.session_name.clone(),
            instance_id: config.engine.instance_id.clone(),
            limits: MachineLimits {
                max_reconnect_attempts: config.connection.max_reconnect_attempts,
            },
            backoff: Backoff::from_config(&config.connection),
            connect_timeout: Duration::from_secs(config.connection.connect_timeout_secs),
            send_timeout: Duration::from_secs(config.dispatch.send_timeout_secs),
        }
    }
}

enum Signal {
    Event(ConnectionEvent),
    Connected {
        epoch: u64,
        reconnect: bool,
        result: Result<TransportSession, HeraldError>,
    },
    Transport {
        epoch: u64,
        event: TransportEvent,
    },
    ReconnectDue {
        epoch: u64,
        attempt: u32,
    },
}

struct Link {
    epoch: u64,
    handle: Option<TransportHandle>,
    in_flight: CancellationToken,
}

/// Owner of the single outbound connection of this process.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    board: Arc<dyn BroadcastStore>,
    lease: Arc<LeaseKeeper>,
    clock: Arc<dyn Clock>,
    settings: ConnectionSettings,
    session: watch::Sender<ConnectionSession>,
    link: Mutex<Link>,
    send_turn: tokio::sync::Mutex<()>,
    signals: mpsc::UnboundedSender<Signal>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        board: Arc<dyn BroadcastStore>,
        lease: Arc<LeaseKeeper>,
        clock: Arc<dyn Clock>,
        settings: ConnectionSettings,
    ) -> Self {
        let (signals, inbox) = mpsc::unbounded_channel();
        let (session, _) = watch::channel(ConnectionSession::new(
            settings.instance_id.clone(),
            clock.now(),
        ));
        Self {
            transport,
            credentials,
            board,
            lease,
            clock,
            settings,
            session,
            link: Mutex::new(Link {
                epoch: 0,
                handle: None,
                in_flight: CancellationToken::new(),
            }),
            send_turn: tokio::sync::Mutex::new(()),
            signals,
            inbox: Mutex::new(Some(inbox)),
        }
    }

    pub fn session(&self) -> ConnectionSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSession> {
        self.session.subscribe()
    }

    /// Connected and still holding a valid lease.
    pub fn is_ready(&self) -> bool {
        self.session.borrow().status == ConnectionStatus::Connected
            && self.lease.status().is_valid_at(self.clock.now())
    }

    /// Queue an event for the run loop. Used for operator commands.
    pub fn handle(&self, event: ConnectionEvent) {
        let _ = self.signals.send(Signal::Event(event));
    }

    /// Sends one message over the live connection.
    ///
    /// Sends are serialized. Readiness and lease validity are checked after
    /// this call's turn comes up, and a connection loss while waiting on the
    /// transport aborts the send with [`HeraldError::NotReady`].
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), HeraldError> {
        let _turn = self.send_turn.lock().await;
        let (handle, cancelled) = self.ready_link()?;

        tokio::select! {
            biased;
            _ = cancelled.cancelled() => Err(HeraldError::NotReady {
                reason: "connection lost during send".to_string(),
            }),
            result = tokio::time::timeout(
                self.settings.send_timeout,
                self.transport.send(&handle, message),
            ) => match result {
                Ok(sent) => sent,
                Err(_) => Err(HeraldError::Timeout {
                    duration: self.settings.send_timeout,
                }),
            },
        }
    }

    fn ready_link(&self) -> Result<(TransportHandle, CancellationToken), HeraldError> {
        let status = self.session.borrow().status;
        if status != ConnectionStatus::Connected {
            return Err(HeraldError::NotReady {
                reason: format!("connection is {status}"),
            });
        }
        if !self.lease.status().is_valid_at(self.clock.now()) {
            return Err(HeraldError::NotReady {
                reason: "session lease is not valid".to_string(),
            });
        }
        let link = self.lock_link();
        let handle = link.handle.clone().ok_or_else(|| HeraldError::NotReady {
            reason: "no transport handle".to_string(),
        })?;
        Ok((handle, link.in_flight.clone()))
    }

    fn lock_link(&self) -> std::sync::MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Runs the state machine until `cancel` fires, then closes the link.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), HeraldError> {
        let mut inbox = self
            .inbox
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .ok_or_else(|| HeraldError::Internal("connection manager already running".into()))?;
        let mut lease = self.lease.subscribe();
        let initial = *lease.borrow_and_update();
        self.on_lease(initial).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = lease.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *lease.borrow_and_update();
                    self.on_lease(status).await;
                }
                Some(signal) = inbox.recv() => self.on_signal(signal).await,
            }
        }

        self.close().await;
        Ok(())
    }

    async fn on_lease(&self, status: LeaseStatus) {
        match status {
            LeaseStatus::Held { fencing_token, .. } => {
                let recorded = self.session.borrow().fencing_token;
                if recorded.is_some_and(|t| t != fencing_token) {
                    self.apply(ConnectionEvent::LeaseLost).await;
                }
                self.apply(ConnectionEvent::LeaseAcquired {
                    owner_id: self.settings.instance_id.clone(),
                    fencing_token,
                })
                .await;
            }
            LeaseStatus::Fenced => self.apply(ConnectionEvent::LeaseFenced).await,
            LeaseStatus::Lost => self.apply(ConnectionEvent::LeaseLost).await,
            LeaseStatus::Unheld => {}
        }
    }

    async fn on_signal(&self, signal: Signal) {
        match signal {
            Signal::Event(event) => self.apply(event).await,
            Signal::Connected {
                epoch,
                reconnect,
                result,
            } => {
                if epoch != self.lock_link().epoch {
                    if let Ok(stale) = result {
                        debug!(handle = stale.handle.0.as_str(), "discarding stale connection");
                        let _ = self.transport.disconnect(&stale.handle).await;
                    }
                    return;
                }
                let event = match result {
                    Ok(session) => {
                        let authenticated = session.authenticated;
                        self.install(epoch, session);
                        match (authenticated, reconnect) {
                            (false, _) => ConnectionEvent::NoCredentials,
                            (true, false) => ConnectionEvent::CredentialsValid,
                            (true, true) => ConnectionEvent::ReconnectSucceeded,
                        }
                    }
                    Err(HeraldError::AuthExpired(reason)) => ConnectionEvent::AuthRejected { reason },
                    Err(e) if reconnect => ConnectionEvent::ReconnectFailed {
                        error: e.to_string(),
                    },
                    Err(e) => ConnectionEvent::ConnectFailed {
                        error: e.to_string(),
                    },
                };
                self.apply(event).await;
            }
            Signal::Transport { epoch, event } => {
                if epoch != self.lock_link().epoch {
                    return;
                }
                let event = match event {
                    TransportEvent::Qr(code) => {
                        info!(
                            session = self.settings.session_name.as_str(),
                            "pairing code ready, scan it to link the device"
                        );
                        ConnectionEvent::QrCode(code)
                    }
                    TransportEvent::CredentialsUpdated(credentials) => {
                        if let Err(e) = self
                            .credentials
                            .save(&self.settings.session_name, &credentials)
                            .await
                        {
                            warn!(error = %e, "failed to persist credentials");
                        }
                        return;
                    }
                    TransportEvent::Paired => ConnectionEvent::PairingConfirmed,
                    TransportEvent::Disconnected {
                        reason,
                        recoverable,
                    } => ConnectionEvent::TransportDropped {
                        reason,
                        recoverable,
                    },
                    TransportEvent::LoggedOut => ConnectionEvent::LoggedOut,
                };
                self.apply(event).await;
            }
            Signal::ReconnectDue { epoch, attempt } => {
                let session = self.session();
                if epoch != self.lock_link().epoch
                    || session.status != ConnectionStatus::Reconnecting
                    || session.reconnect_attempt != attempt
                {
                    return;
                }
                if self.lease.status().is_valid_at(self.clock.now()) {
                    debug!(attempt, "reconnecting");
                    self.start_connect(true).await;
                } else {
                    self.apply(ConnectionEvent::ReconnectLeaseInvalid).await;
                }
            }
        }
    }

    async fn apply(&self, event: ConnectionEvent) {
        let current = self.session();
        let label = format!("{event:?}");
        let step = transition(&current, event, self.settings.limits, self.clock.now());
        if step.is_noop(&current) {
            debug!(state = %current.status, event = label.as_str(), "event ignored");
            return;
        }

        if step.next.status != current.status {
            info!(
                session = self.settings.session_name.as_str(),
                from = %current.status,
                to = %step.next.status,
                error = step.next.last_error.as_deref().unwrap_or(""),
                "connection state changed"
            );
        }
        self.session.send_replace(step.next.clone());
        if let Err(e) = self
            .board
            .publish_connection(&self.settings.session_name, &step.next)
            .await
        {
            warn!(error = %e, "failed to publish connection snapshot");
        }

        for effect in step.effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::Connect => self.start_connect(false).await,
            Effect::ScheduleReconnect { attempt } => {
                let delay = self.settings.backoff.delay(attempt);
                let epoch = self.lock_link().epoch;
                let signals = self.signals.clone();
                debug!(attempt, ?delay, "reconnect scheduled");
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = signals.send(Signal::ReconnectDue { epoch, attempt });
                });
            }
            Effect::CancelInFlight => {
                let mut link = self.lock_link();
                link.in_flight.cancel();
                link.in_flight = CancellationToken::new();
            }
            Effect::Disconnect => self.drop_link().await,
            Effect::ClearCredentials => {
                if let Err(e) = self.credentials.clear(&self.settings.session_name).await {
                    warn!(error = %e, "failed to clear credentials");
                }
            }
            Effect::ReleaseLease => self.lease.release().await,
        }
    }

    async fn start_connect(&self, reconnect: bool) {
        self.drop_link().await;
        let epoch = self.lock_link().epoch;

        let transport = self.transport.clone();
        let credentials = self.credentials.clone();
        let session_name = self.settings.session_name.clone();
        let timeout = self.settings.connect_timeout;
        let signals = self.signals.clone();
        tokio::spawn(async move {
            let result = async {
                let stored = credentials.load(&session_name).await?;
                tokio::time::timeout(timeout, transport.connect(stored.as_ref()))
                    .await
                    .map_err(|_| HeraldError::Timeout { duration: timeout })?
            }
            .await;
            let _ = signals.send(Signal::Connected {
                epoch,
                reconnect,
                result,
            });
        });
    }

    fn install(&self, epoch: u64, session: TransportSession) {
        self.lock_link().handle = Some(session.handle);
        let signals = self.signals.clone();
        let mut events = session.events;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if signals.send(Signal::Transport { epoch, event }).is_err() {
                    return;
                }
            }
            let _ = signals.send(Signal::Transport {
                epoch,
                event: TransportEvent::Disconnected {
                    reason: "transport event stream closed".to_string(),
                    recoverable: true,
                },
            });
        });
    }

    /// Closes the current handle, if any, and invalidates everything tagged
    /// with the old epoch.
    async fn drop_link(&self) {
        let handle = {
            let mut link = self.lock_link();
            link.epoch += 1;
            link.handle.take()
        };
        if let Some(handle) = handle
            && let Err(e) = self.transport.disconnect(&handle).await
        {
            warn!(error = %e, "transport disconnect failed");
        }
    }

    async fn close(&self) {
        self.run_effect(Effect::CancelInFlight).await;
        self.drop_link().await;
        let mut closed = self.session();
        closed.status = ConnectionStatus::Disconnected;
        closed.qr_code = None;
        closed.reconnect_attempt = 0;
        closed.lease_owner_id = None;
        closed.fencing_token = None;
        closed.updated_at = self.clock.now();
        self.session.send_replace(closed.clone());
        if let Err(e) = self
            .board
            .publish_connection(&self.settings.session_name, &closed)
            .await
        {
            warn!(error = %e, "failed to publish connection snapshot");
        }
        info!(session = self.settings.session_name.as_str(), "connection closed");
    }
}
