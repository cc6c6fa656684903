// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single outbound connection: a pure state machine plus the task that
//! drives it against the transport.

pub mod machine;
pub mod manager;

pub use machine::{ConnectionEvent, Effect, MachineLimits, Transition, transition};
pub use manager::{ConnectionManager, ConnectionSettings};
