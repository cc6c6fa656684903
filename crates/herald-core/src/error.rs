// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Herald broadcast engine.
//!
//! The variants follow the engine's failure taxonomy: lease conflicts and
//! connection errors are handled locally by the state machine, dispatch errors
//! become per-pair message log rows, and only storage failures are fatal.

use std::time::Duration;

use thiserror::Error;

use crate::types::DeliveryStatus;

/// The primary error type used across all Herald traits and core operations.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Configuration loading errors (invalid TOML, bad env overrides).
    #[error("configuration error: {0}")]
    Config(String),

    /// A malformed schedule, target or template. Surfaced to operators and
    /// never fatal to the process.
    #[error("invalid {entity}: {message}")]
    ConfigInvalid { entity: String, message: String },

    /// Storage backend errors. Fatal: correctness cannot be guaranteed
    /// without durable lease and message log writes.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Another owner holds, or has fenced, the session lease.
    #[error("lease conflict on `{session}` (held by {})", owner.as_deref().unwrap_or("unknown"))]
    LeaseConflict {
        session: String,
        owner: Option<String>,
    },

    /// The connection is not in a state that allows sending.
    #[error("connection not ready: {reason}")]
    NotReady { reason: String },

    /// Retryable transport failure (timeout, rate limit, dropped socket).
    #[error("transient transport error: {message}")]
    TransportTransient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Non-retryable transport failure (invalid target, rejected content).
    #[error("permanent transport error: {message}")]
    TransportPermanent {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Stored credentials were rejected; the session must be re-paired.
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    /// Feed collaborator failed to produce candidates.
    #[error("feed error: {message}")]
    Feed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HeraldError {
    /// Shorthand for a [`HeraldError::ConfigInvalid`].
    pub fn invalid(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`HeraldError::TransportTransient`] without a source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransportTransient {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`HeraldError::TransportPermanent`] without a source.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::TransportPermanent {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap any driver error as a storage failure.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }

    /// Returns `true` for errors that must propagate to process-level failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// Maps a send failure onto the message log status it should be recorded as.
    ///
    /// Permanent failures are `skipped` and never retried; everything else that
    /// can come out of a send is `failed` and eligible for the next run.
    /// Fatal errors have no log status.
    pub fn classify(&self) -> Option<DeliveryStatus> {
        match self {
            Self::TransportPermanent { .. } | Self::ConfigInvalid { .. } => {
                Some(DeliveryStatus::Skipped)
            }
            Self::Storage { .. } => None,
            _ => Some(DeliveryStatus::Failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_fatal() {
        assert!(HeraldError::storage("disk full").is_fatal());
        assert!(!HeraldError::transient("timeout").is_fatal());
        assert!(!HeraldError::LeaseConflict {
            session: "main".into(),
            owner: Some("b".into()),
        }
        .is_fatal());
        assert!(!HeraldError::invalid("schedule", "no times").is_fatal());
    }

    #[test]
    fn send_failures_classify_into_log_statuses() {
        assert_eq!(
            HeraldError::transient("rate limited").classify(),
            Some(DeliveryStatus::Failed)
        );
        assert_eq!(
            HeraldError::permanent("unknown jid").classify(),
            Some(DeliveryStatus::Skipped)
        );
        assert_eq!(
            HeraldError::NotReady {
                reason: "reconnecting".into()
            }
            .classify(),
            Some(DeliveryStatus::Failed)
        );
        assert_eq!(HeraldError::storage("locked").classify(), None);
    }

    #[test]
    fn lease_conflict_message_names_owner() {
        let err = HeraldError::LeaseConflict {
            session: "main".into(),
            owner: Some("worker-b".into()),
        };
        assert_eq!(
            err.to_string(),
            "lease conflict on `main` (held by worker-b)"
        );
    }
}
