// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! The engine consumes every external capability (lease store, transport,
//! credential store, feed fetcher, persistence) through these traits and uses
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod credentials;
pub mod feed;
pub mod lease;
pub mod storage;
pub mod transport;

pub use credentials::CredentialStore;
pub use feed::FeedSource;
pub use lease::LeaseStore;
pub use storage::{BroadcastStore, MessageLog};
pub use transport::{Transport, TransportEvent, TransportHandle, TransportSession};
