// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes `&Database` and runs its
//! statements on the single writer thread.

pub mod controls;
pub mod credentials;
pub mod feeds;
pub mod items;
pub mod leases;
pub mod message_log;
pub mod schedules;
pub mod snapshots;
pub mod targets;
pub mod triggers;
