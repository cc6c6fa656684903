// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic connection and dispatch tests.
//!
//! Connect outcomes and send results are scripted up front; anything not
//! scripted succeeds. Delivered messages are captured with the (tokio) time
//! they completed, and events can be pushed into the latest connection.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use herald_core::{
    Credentials, HeraldError, OutboundMessage, Transport, TransportEvent, TransportHandle,
    TransportSession,
};
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

/// Outcome of the next `connect` call.
#[derive(Debug, Clone)]
pub enum ConnectScript {
    Authenticated,
    /// Open in pairing mode, as if no credentials were stored.
    Pairing,
    AuthExpired,
    /// Fail with a transient error carrying this message.
    Fail(String),
}

/// A message the mock delivered.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub handle: String,
    pub jid: String,
    pub text: String,
    pub at: Instant,
}

pub struct MockTransport {
    connects: Mutex<VecDeque<ConnectScript>>,
    send_results: Mutex<VecDeque<Result<(), HeraldError>>>,
    send_delay: Mutex<Duration>,
    sent: Mutex<Vec<SentMessage>>,
    events: Mutex<Option<(String, mpsc::Sender<TransportEvent>)>>,
    connect_count: AtomicUsize,
    disconnect_count: AtomicUsize,
    sends_started: AtomicUsize,
    active_sends: AtomicUsize,
    max_active_sends: AtomicUsize,
    progress: Notify,
}

struct ActiveSend<'a>(&'a AtomicUsize);

impl Drop for ActiveSend<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            connects: Mutex::new(VecDeque::new()),
            send_results: Mutex::new(VecDeque::new()),
            send_delay: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            connect_count: AtomicUsize::new(0),
            disconnect_count: AtomicUsize::new(0),
            sends_started: AtomicUsize::new(0),
            active_sends: AtomicUsize::new(0),
            max_active_sends: AtomicUsize::new(0),
            progress: Notify::new(),
        }
    }

    /// Queue the outcome of a future `connect` call.
    pub fn script_connect(&self, script: ConnectScript) {
        self.connects.lock().unwrap().push_back(script);
    }

    /// Queue the result of a future `send` call.
    pub fn push_send_result(&self, result: Result<(), HeraldError>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    /// Make every send take `delay` before it resolves.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    /// Highest number of sends that were in progress at the same time.
    pub fn max_concurrent_sends(&self) -> usize {
        self.max_active_sends.load(Ordering::SeqCst)
    }

    /// Push an event into the most recent connection.
    pub async fn emit(&self, event: TransportEvent) {
        let sender = self.events.lock().unwrap().as_ref().map(|(_, tx)| tx.clone());
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    async fn wait_until(&self, done: impl Fn(&Self) -> bool) {
        loop {
            let notified = self.progress.notified();
            if done(self) {
                return;
            }
            notified.await;
        }
    }

    pub async fn wait_for_connects(&self, n: usize) {
        self.wait_until(|t| t.connect_count() >= n).await;
    }

    pub async fn wait_for_sends(&self, n: usize) {
        self.wait_until(|t| t.sent.lock().unwrap().len() >= n).await;
    }

    pub async fn wait_for_send_started(&self) {
        self.wait_until(|t| t.sends_started.load(Ordering::SeqCst) > 0)
            .await;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(
        &self,
        _credentials: Option<&Credentials>,
    ) -> Result<TransportSession, HeraldError> {
        let n = self.connect_count.fetch_add(1, Ordering::SeqCst) + 1;
        let script = self
            .connects
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectScript::Authenticated);

        let result = match script {
            ConnectScript::AuthExpired => {
                Err(HeraldError::AuthExpired("credentials rejected".into()))
            }
            ConnectScript::Fail(message) => Err(HeraldError::transient(message)),
            ConnectScript::Authenticated | ConnectScript::Pairing => {
                let handle = format!("mock-{n}");
                let (tx, rx) = mpsc::channel(32);
                *self.events.lock().unwrap() = Some((handle.clone(), tx));
                Ok(TransportSession {
                    handle: TransportHandle(handle),
                    authenticated: matches!(script, ConnectScript::Authenticated),
                    events: rx,
                })
            }
        };
        self.progress.notify_waiters();
        result
    }

    async fn send(
        &self,
        handle: &TransportHandle,
        message: &OutboundMessage,
    ) -> Result<(), HeraldError> {
        let active = self.active_sends.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveSend(&self.active_sends);
        self.max_active_sends.fetch_max(active, Ordering::SeqCst);
        self.sends_started.fetch_add(1, Ordering::SeqCst);
        self.progress.notify_waiters();

        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.send_results.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.sent.lock().unwrap().push(SentMessage {
                handle: handle.0.clone(),
                jid: message.jid.clone(),
                text: message.text.clone(),
                at: Instant::now(),
            });
        }
        self.progress.notify_waiters();
        result
    }

    async fn disconnect(&self, handle: &TransportHandle) -> Result<(), HeraldError> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events.lock().unwrap();
        if events.as_ref().is_some_and(|(h, _)| *h == handle.0) {
            events.take();
        }
        Ok(())
    }
}
