// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Herald broadcast engine.
//!
//! This crate provides the error taxonomy, domain types, clock abstraction
//! and the collaborator traits (lease store, transport, credential store,
//! feed source, persistence) that the rest of the workspace builds on.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::HeraldError;
pub use types::{
    AcquireOutcome, CleaningRules, ConnectionSession, ConnectionStatus, ControlCommand,
    ControlRequest, Credentials, DeliveryRecord, DeliveryStatus, Feed, FeedItem, Lease, LogFilter,
    MessageLogEntry, OutboundMessage, RawItem, RenewOutcome, Schedule, ScheduleMode, Target,
    TargetType, Template, TriggerRequest,
};

// Re-export all collaborator traits at crate root.
pub use traits::{
    BroadcastStore, CredentialStore, FeedSource, LeaseStore, MessageLog, Transport,
    TransportEvent, TransportHandle, TransportSession,
};
