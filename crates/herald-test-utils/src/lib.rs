// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Herald.
//!
//! Mock collaborators with scripted behavior and captured output, plus a
//! [`TestHarness`] that assembles a complete engine over a temp SQLite
//! database and a manual clock.

pub mod harness;
pub mod memory_lease;
pub mod mock_feed;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder, immediate_schedule, start_time};
pub use memory_lease::MemoryLeaseStore;
pub use mock_feed::MockFeedSource;
pub use mock_transport::{ConnectScript, MockTransport, SentMessage};
