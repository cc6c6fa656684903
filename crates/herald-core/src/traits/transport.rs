// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound protocol transport, treated as an opaque capability.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::HeraldError;
use crate::types::{Credentials, OutboundMessage};

/// Opaque handle to an open transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub String);

/// Asynchronous events emitted by an open transport connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// A new pairing code to show the operator.
    Qr(String),
    /// The transport rotated or produced credentials; they must be persisted.
    CredentialsUpdated(Credentials),
    /// The operator scanned the pairing code.
    Paired,
    /// The connection dropped.
    Disconnected { reason: String, recoverable: bool },
    /// The remote side logged this device out.
    LoggedOut,
}

/// An open transport connection plus its event stream.
#[derive(Debug)]
pub struct TransportSession {
    pub handle: TransportHandle,
    /// `true` when the connection authenticated with stored credentials;
    /// `false` when it opened in pairing mode.
    pub authenticated: bool,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// The outbound messaging protocol.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Returns the human-readable name of this transport.
    fn name(&self) -> &str;

    /// Opens a connection. Without credentials the connection starts pairing
    /// and emits [`TransportEvent::Qr`] events. Rejected credentials yield
    /// [`HeraldError::AuthExpired`].
    async fn connect(&self, credentials: Option<&Credentials>)
    -> Result<TransportSession, HeraldError>;

    /// Sends one message. Overlapping calls on the same handle are not allowed.
    async fn send(
        &self,
        handle: &TransportHandle,
        message: &OutboundMessage,
    ) -> Result<(), HeraldError>;

    /// Closes the connection without logging out.
    async fn disconnect(&self, handle: &TransportHandle) -> Result<(), HeraldError>;
}
