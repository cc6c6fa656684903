// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential store trait for paired transport sessions.

use async_trait::async_trait;

use crate::error::HeraldError;
use crate::types::Credentials;

/// Persists the authentication material of the outbound session.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn load(&self, session_name: &str) -> Result<Option<Credentials>, HeraldError>;

    async fn save(&self, session_name: &str, credentials: &Credentials)
    -> Result<(), HeraldError>;

    /// Forgets stored credentials (logout, expired authentication).
    async fn clear(&self, session_name: &str) -> Result<(), HeraldError>;
}
