// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Herald workspace.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// --- Lease types ---

/// A time-bounded exclusive ownership record for one session name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub session_name: String,
    pub owner_id: String,
    pub expires_at: DateTime<Utc>,
    /// Strictly increases on every successful acquire.
    pub fencing_token: u64,
}

impl Lease {
    /// Returns `true` while the lease has not yet expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Outcome of an acquire attempt against the lease store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now owns the lease.
    Acquired {
        fencing_token: u64,
        expires_at: DateTime<Utc>,
    },
    /// Another owner holds an unexpired lease.
    Held {
        current_owner: String,
        expires_at: DateTime<Utc>,
    },
}

impl AcquireOutcome {
    /// Returns `true` if the lease was acquired.
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }
}

/// Outcome of a renewal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewOutcome {
    /// The lease was extended.
    Renewed { expires_at: DateTime<Utc> },
    /// The lease lapsed before renewal, but nobody has taken it over.
    Expired,
    /// Another owner has acquired the lease since our token was issued.
    Fenced,
}

// --- Connection types ---

/// Lifecycle states of the single outbound connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    QrPending,
    Connected,
    Reconnecting,
    Failed,
}

/// Process-local view of the outbound connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSession {
    pub instance_id: String,
    pub status: ConnectionStatus,
    /// Latest pairing code while in `qr_pending`.
    pub qr_code: Option<String>,
    pub last_error: Option<String>,
    /// Owner recorded on the lease this session was opened under.
    pub lease_owner_id: Option<String>,
    pub fencing_token: Option<u64>,
    /// Reconnect attempts spent in the current outage.
    pub reconnect_attempt: u32,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionSession {
    /// A fresh disconnected session for this process.
    pub fn new(instance_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            instance_id: instance_id.into(),
            status: ConnectionStatus::Disconnected,
            qr_code: None,
            last_error: None,
            lease_owner_id: None,
            fencing_token: None,
            reconnect_attempt: 0,
            updated_at: now,
        }
    }
}

/// Opaque authentication material produced by the transport after pairing.
///
/// The secret is never printed by `Debug`.
#[derive(Debug)]
pub struct Credentials(SecretString);

impl Credentials {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(SecretString::from(raw.into()))
    }

    /// Borrow the raw credential material.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// A rendered message addressed to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Platform address of the recipient (e.g. a group JID).
    pub jid: String,
    pub text: String,
}

// --- Feed types ---

/// Per-feed normalization rules applied before fingerprinting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningRules {
    /// Extra query parameters to drop, on top of the built-in tracking list.
    pub strip_params: Vec<String>,
    /// Title prefixes removed before hashing (matched case-insensitively).
    pub strip_title_prefixes: Vec<String>,
}

/// An ingestion source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub url: String,
    pub feed_type: String,
    pub enabled: bool,
    pub fetch_interval_minutes: u32,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Opaque settings for the fetch collaborator.
    pub parse_config: Option<serde_json::Value>,
    pub cleaning_rules: CleaningRules,
}

impl Feed {
    /// Returns `true` if the feed is enabled and its fetch interval has elapsed.
    pub fn fetch_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_fetched_at {
            None => true,
            Some(last) => {
                now - last >= chrono::Duration::minutes(i64::from(self.fetch_interval_minutes))
            }
        }
    }
}

/// A raw candidate item as delivered by the fetch collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub guid: Option<String>,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A deduplicated, persisted feed item. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub feed_id: String,
    pub guid: Option<String>,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub normalized_title: String,
    pub normalized_url: String,
    pub content_hash: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// --- Dispatch types ---

/// Kind of messaging target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Contact,
    Group,
    Channel,
}

/// A messaging destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub jid: String,
    pub target_type: TargetType,
    pub enabled: bool,
    /// Minimum spacing between consecutive sends to this target.
    pub intra_delay_sec: u32,
}

/// Trigger policy of a schedule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    Immediate,
    Interval,
    Times,
}

/// A broadcast schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub mode: ScheduleMode,
    pub interval_minutes: Option<u32>,
    /// Local times of day as `HH:MM`, in `timezone`.
    pub times: Vec<String>,
    /// IANA timezone name, e.g. `Asia/Jakarta`.
    pub timezone: String,
    pub feed_ids: Vec<String>,
    pub target_ids: Vec<String>,
    pub template_id: String,
    pub enabled: bool,
    /// Only written by the dispatch pipeline.
    pub last_run_at: Option<DateTime<Utc>>,
}

/// A message template with `{placeholder}` tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub body: String,
}

/// Status of one dispatch attempt in the message log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Skipped,
    Failed,
}

/// A row to append to the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub feed_item_id: String,
    pub target_id: String,
    pub schedule_id: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A persisted message log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub id: i64,
    pub feed_item_id: String,
    pub target_id: String,
    pub schedule_id: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Filter for reading the message log. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub schedule_id: Option<String>,
    pub target_id: Option<String>,
    pub status: Option<DeliveryStatus>,
    pub limit: Option<usize>,
}

/// An operator request to run a schedule out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub id: i64,
    pub schedule_id: String,
    pub requested_at: DateTime<Utc>,
    pub status: String,
}

/// Operator commands addressed to the process serving a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Revive a `failed` connection.
    Reset,
    /// Log the device out and forget its credentials.
    Logout,
}

/// A queued operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub id: i64,
    pub session_name: String,
    pub command: ControlCommand,
    pub requested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn connection_status_uses_snake_case_names() {
        assert_eq!(ConnectionStatus::QrPending.to_string(), "qr_pending");
        assert_eq!(
            ConnectionStatus::from_str("reconnecting").unwrap(),
            ConnectionStatus::Reconnecting
        );
        let json = serde_json::to_string(&ConnectionStatus::QrPending).unwrap();
        assert_eq!(json, "\"qr_pending\"");
    }

    #[test]
    fn lease_liveness_is_exclusive_at_expiry() {
        let lease = Lease {
            session_name: "main".into(),
            owner_id: "a".into(),
            expires_at: ts("2026-03-01T10:00:30Z"),
            fencing_token: 1,
        };
        assert!(lease.is_live(ts("2026-03-01T10:00:29Z")));
        assert!(!lease.is_live(ts("2026-03-01T10:00:30Z")));
    }

    #[test]
    fn feed_fetch_gating() {
        let mut feed = Feed {
            id: "f1".into(),
            url: "https://example.com/feed.json".into(),
            feed_type: "json".into(),
            enabled: true,
            fetch_interval_minutes: 15,
            last_fetched_at: None,
            parse_config: None,
            cleaning_rules: CleaningRules::default(),
        };
        let now = ts("2026-03-01T10:00:00Z");
        assert!(feed.fetch_due(now));

        feed.last_fetched_at = Some(ts("2026-03-01T09:50:00Z"));
        assert!(!feed.fetch_due(now));

        feed.last_fetched_at = Some(ts("2026-03-01T09:45:00Z"));
        assert!(feed.fetch_due(now));

        feed.enabled = false;
        assert!(!feed.fetch_due(now));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("super-secret-session-blob");
        assert_eq!(creds.expose(), "super-secret-session-blob");
        assert!(!format!("{creds:?}").contains("super-secret"));
    }

    #[test]
    fn cleaning_rules_default_when_fields_missing() {
        let rules: CleaningRules = serde_json::from_str(r#"{"strip_params":["src"]}"#).unwrap();
        assert_eq!(rules.strip_params, vec!["src"]);
        assert!(rules.strip_title_prefixes.is_empty());
    }
}
