// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pooled, health-monitored handle to one robot.
//!
//! A [`Connection`] owns the transport (materialized once, never rebuilt),
//! the shelf/location name resolver, and the two-state health machine.
//! Handles are obtained through the [`pool`] so that every caller of the
//! same target shares one connection.

pub mod health;
pub mod pool;
pub mod resolver;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch, OnceCell};
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::error::format_status;
use crate::transport::api::RobotApi;
use crate::transport::grpc::GrpcTransport;
use crate::transport::proto;

pub use health::{ConnectionState, StateListener};
pub use pool::{canonical_target, ConnectionPool};

use health::HealthMonitor;
use resolver::NameResolver;

/// Robot pose on the map, in metres and radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PoseSnapshot {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl From<proto::Pose> for PoseSnapshot {
    fn from(pose: proto::Pose) -> Self {
        Self { x: pose.x, y: pose.y, theta: pose.theta }
    }
}

/// Outcome of a ping: the paired serial-number and pose read that serves
/// as the health oracle.
#[derive(Debug, Clone, Serialize)]
pub struct PingReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PingReport {
    fn failed(error: String) -> Self {
        Self { ok: false, serial: None, pose: None, error: Some(error) }
    }
}

/// Pooled handle to a single robot.
pub struct Connection {
    target: String,
    config: ConnectionConfig,
    api: OnceCell<Arc<dyn RobotApi>>,
    resolver: parking_lot::RwLock<NameResolver>,
    resolver_init: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    monitor: parking_lot::Mutex<Option<HealthMonitor>>,
}

impl Connection {
    pub(crate) fn bare(target: String, config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        let (transitions, _) = broadcast::channel(16);
        Self {
            target,
            config,
            api: OnceCell::new(),
            resolver: parking_lot::RwLock::new(NameResolver::default()),
            resolver_init: tokio::sync::Mutex::new(()),
            state_tx,
            transitions,
            monitor: parking_lot::Mutex::new(None),
        }
    }

    /// Connection backed by an explicit [`RobotApi`] instead of a dialed
    /// channel. Used by tests and embedders with their own transport.
    pub fn with_api(target: &str, api: Arc<dyn RobotApi>, config: ConnectionConfig) -> Arc<Self> {
        let conn = Self::bare(canonical_target(target), config);
        let _ = conn.api.set(api);
        Arc::new(conn)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The transport, materializing it on first access.
    ///
    /// Initialization issues a best-effort serial-number probe; a probe
    /// failure is logged but does not fail the call, because the retry
    /// policy re-exercises the transport on real traffic.
    pub async fn api(&self) -> anyhow::Result<Arc<dyn RobotApi>> {
        let api = self
            .api
            .get_or_try_init(|| async {
                tracing::info!(robot = %self.target, "connecting");
                let transport = GrpcTransport::connect(&self.target, self.config.call_timeout())?;
                let api: Arc<dyn RobotApi> = Arc::new(transport);
                match api.get_robot_serial_number().await {
                    Ok(serial) => {
                        tracing::info!(robot = %self.target, serial = %serial, "connected");
                    }
                    Err(e) => tracing::warn!(
                        robot = %self.target,
                        err = %e,
                        "transport created but probe failed"
                    ),
                }
                anyhow::Ok(api)
            })
            .await?;
        Ok(Arc::clone(api))
    }

    // ── Health ───────────────────────────────────────────────────────

    /// Verify connectivity by reading serial number and pose.
    pub async fn ping(&self) -> PingReport {
        let api = match self.api().await {
            Ok(api) => api,
            Err(e) => return PingReport::failed(e.to_string()),
        };
        let serial = match api.get_robot_serial_number().await {
            Ok(serial) => serial,
            Err(status) => return PingReport::failed(format_status(&status)),
        };
        let pose = match api.get_robot_pose().await {
            Ok(pose) => pose,
            Err(status) => return PingReport::failed(format_status(&status)),
        };
        PingReport { ok: true, serial: Some(serial), pose: Some(pose.into()), error: None }
    }

    /// Current health state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to health transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    /// Start the background prober. A second call is a no-op.
    pub fn start_monitoring(
        self: &Arc<Self>,
        interval: Duration,
        listener: Option<StateListener>,
    ) {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = health::spawn_prober(Arc::clone(self), interval, listener, cancel.clone());
        *monitor = Some(HealthMonitor { cancel, handle, interval });
        tracing::info!(
            robot = %self.target,
            interval_ms = interval.as_millis() as u64,
            "health monitoring started"
        );
    }

    /// Signal the prober to exit and join it within a bounded timeout.
    pub async fn stop_monitoring(&self) {
        let monitor = self.monitor.lock().take();
        let Some(monitor) = monitor else { return };
        monitor.cancel.cancel();
        let join_timeout = monitor.interval.saturating_mul(3).max(Duration::from_secs(1));
        if tokio::time::timeout(join_timeout, monitor.handle).await.is_err() {
            tracing::warn!(robot = %self.target, "health prober did not stop within timeout");
        } else {
            tracing::info!(robot = %self.target, "health monitoring stopped");
        }
    }

    /// Block until the health state equals `target_state` or the timeout
    /// elapses. Returns whether the state was reached.
    pub async fn wait_for_state(
        &self,
        target_state: ConnectionState,
        timeout: Option<Duration>,
    ) -> bool {
        let mut rx = self.state_tx.subscribe();
        let wait = rx.wait_for(|state| *state == target_state);
        match timeout {
            Some(limit) => matches!(tokio::time::timeout(limit, wait).await, Ok(Ok(_))),
            None => wait.await.is_ok(),
        }
    }

    /// Record a prober verdict: on change, update the watch value, fan out
    /// to subscribers, and invoke the listener on the calling task.
    pub(crate) fn publish_state(
        &self,
        next: ConnectionState,
        listener: Option<&StateListener>,
    ) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if !changed {
            return;
        }
        match next {
            ConnectionState::Disconnected => {
                tracing::warn!(robot = %self.target, "connection lost");
            }
            ConnectionState::Connected => {
                tracing::info!(robot = %self.target, "connection restored");
            }
        }
        let _ = self.transitions.send(next);
        if let Some(listener) = listener {
            let listener = Arc::clone(listener);
            crate::listener::invoke("on_state_change", move || listener(next));
        }
    }

    // ── Resolver ─────────────────────────────────────────────────────

    /// Fetch shelf/location lists and build the name→id maps. Idempotent;
    /// returns whether the resolver is ready.
    pub async fn ensure_resolver(&self) -> bool {
        if self.resolver.read().is_ready() {
            return true;
        }
        let _guard = self.resolver_init.lock().await;
        if self.resolver.read().is_ready() {
            return true;
        }
        let api = match self.api().await {
            Ok(api) => api,
            Err(e) => {
                tracing::warn!(robot = %self.target, err = %e, "resolver init failed");
                return false;
            }
        };
        let shelves = match api.get_shelves().await {
            Ok(shelves) => shelves,
            Err(status) => {
                tracing::warn!(robot = %self.target, err = %status, "resolver init failed");
                return false;
            }
        };
        let locations = match api.get_locations().await {
            Ok(locations) => locations,
            Err(status) => {
                tracing::warn!(robot = %self.target, err = %status, "resolver init failed");
                return false;
            }
        };
        self.resolver.write().load(&shelves, &locations);
        tracing::info!(
            robot = %self.target,
            shelves = shelves.len(),
            locations = locations.len(),
            "resolver ready"
        );
        true
    }

    /// Resolve a shelf name or id to its canonical id.
    pub fn resolve_shelf(&self, name_or_id: &str) -> String {
        self.resolver.read().resolve_shelf(name_or_id)
    }

    /// Resolve a location name or id to its canonical id.
    pub fn resolve_location(&self, name_or_id: &str) -> String {
        self.resolver.read().resolve_location(name_or_id)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.target)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
