// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::transport::api::CameraSide;

/// gRPC port a Kachaka robot listens on when none is given.
pub const DEFAULT_PORT: u16 = 26400;

/// Per-connection tunables.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Default per-call deadline in milliseconds, injected into every unary
    /// call that does not carry its own deadline.
    pub call_timeout_ms: u64,

    /// Health probe interval in milliseconds.
    pub health_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { call_timeout_ms: 5000, health_interval_ms: 5000 }
    }
}

impl ConnectionConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

/// Controller sampling and polling tunables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Fast state cycle (pose, command-running flag) in milliseconds.
    pub fast_interval_ms: u64,

    /// Slow state cycle (battery) in milliseconds.
    pub slow_interval_ms: u64,

    /// Command-completion poll cadence in milliseconds.
    pub poll_interval_ms: u64,

    /// Base delay between deadline-bounded retries in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: 1000,
            slow_interval_ms: 30_000,
            poll_interval_ms: 1000,
            retry_delay_ms: 1000,
        }
    }
}

impl ControllerConfig {
    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Camera sampler tunables.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Capture interval in milliseconds.
    pub interval_ms: u64,

    /// Which camera to sample.
    pub camera: CameraSide,

    /// Attach object detection records to each frame.
    pub detect: bool,

    /// Hand each frame to the annotator. Implies `detect`.
    pub annotate: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, camera: CameraSide::Front, detect: false, annotate: false }
    }
}

impl CameraConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
