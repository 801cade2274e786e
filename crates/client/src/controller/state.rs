// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;
use tokio::time::Instant;

use crate::connection::{ConnectionState, PoseSnapshot};

/// Snapshot of robot state, written by the controller's background tasks.
///
/// `state()` hands callers an independent copy; mutating it never touches
/// the live state.
#[derive(Debug, Clone, Default)]
pub struct RobotState {
    pub battery_percent: u8,
    pub pose: PoseSnapshot,
    pub is_command_running: bool,
    pub last_updated: Option<Instant>,
    pub moving_shelf_id: Option<String>,
    pub shelf_dropped: bool,
    pub connection_state: ConnectionState,
    pub disconnected_at: Option<Instant>,
    pub last_reconnect_at: Option<Instant>,
}

/// Poll metrics collected during command execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerMetrics {
    /// Round-trip time of each successful completion poll, in milliseconds.
    pub poll_rtt_ms: Vec<f64>,
    pub poll_count: u64,
    pub poll_success_count: u64,
    pub poll_failure_count: u64,
}

impl ControllerMetrics {
    pub fn reset(&mut self) {
        self.poll_rtt_ms.clear();
        self.poll_count = 0;
        self.poll_success_count = 0;
        self.poll_failure_count = 0;
    }

    pub(crate) fn record_success(&mut self, rtt_ms: f64) {
        self.poll_rtt_ms.push(rtt_ms);
        self.poll_success_count += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.poll_failure_count += 1;
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
