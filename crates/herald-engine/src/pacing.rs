// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-target send pacing.
//!
//! Each target has one lane. Holding a lane serializes that target's sends
//! across concurrently running schedules, and [`Lane::wait_turn`] keeps
//! consecutive attempts at least `intra_delay_sec` apart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

#[derive(Default)]
pub struct TargetPacer {
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Option<Instant>>>>>,
}

/// Exclusive use of one target's lane.
pub struct Lane {
    last_attempt: OwnedMutexGuard<Option<Instant>>,
}

impl TargetPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other run is sending to `target_id`.
    pub async fn acquire(&self, target_id: &str) -> Lane {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|p| p.into_inner());
            lanes.entry(target_id.to_string()).or_default().clone()
        };
        Lane {
            last_attempt: lane.lock_owned().await,
        }
    }
}

impl Lane {
    /// Sleeps until `min_gap` has passed since the previous attempt on this
    /// target, then stamps the new attempt.
    pub async fn wait_turn(&mut self, min_gap: Duration) {
        if let Some(previous) = *self.last_attempt {
            tokio::time::sleep_until(previous + min_gap).await;
        }
        *self.last_attempt = Some(Instant::now());
    }
}
