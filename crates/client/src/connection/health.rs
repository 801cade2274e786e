// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-state health machine and its background prober.
//!
//! A ping (serial number + pose) is the sole health oracle. The prober
//! pings on a fixed interval; every CONNECTED↔DISCONNECTED flip wakes
//! `wait_for_state` waiters, fans out to broadcast subscribers, and
//! invokes the optional listener on the prober task.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Connection;

/// Health of one connection as judged by its prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked on every state transition, on the prober task.
pub type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Handle to a running prober; dropped on `stop_monitoring`.
pub(crate) struct HealthMonitor {
    pub(crate) cancel: CancellationToken,
    pub(crate) handle: JoinHandle<()>,
    pub(crate) interval: Duration,
}

/// Spawn the background prober for `conn`.
pub(crate) fn spawn_prober(
    conn: Arc<Connection>,
    interval: Duration,
    listener: Option<StateListener>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            let report = conn.ping().await;
            let next = if report.ok {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            };
            conn.publish_state(next, listener.as_ref());
        }
    })
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
