// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background state sampling plus deadline-bounded command execution.
//!
//! A [`RobotController`] runs one sampler task (fast cycle: pose and
//! command-running flag; slow cycle: battery), watches the connection's
//! health machine, and executes commands with per-command identity
//! verification and shelf-drop monitoring. Command execution is not
//! re-entrant: callers must serialize commands on one controller.

pub mod command;
pub mod executor;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::connection::{Connection, ConnectionState};
use crate::error::describe_error;
use crate::retry::RetryPolicy;

pub use command::{Command, CommandOptions, CommandResult};
pub use state::{ControllerMetrics, RobotState};

/// Default wall-clock budget for point-to-point movement commands.
pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(120);
/// Default wall-clock budget for return-home / return-shelf.
pub const DEFAULT_RETURN_TIMEOUT: Duration = Duration::from_secs(60);

/// Callback fired with the shelf id when a carried shelf goes missing.
pub type ShelfDropListener = Arc<dyn Fn(&str) + Send + Sync>;

pub(crate) struct ControllerShared {
    pub(crate) state: parking_lot::Mutex<RobotState>,
    pub(crate) metrics: parking_lot::Mutex<ControllerMetrics>,
    pub(crate) monitoring_shelf: AtomicBool,
    pub(crate) on_shelf_dropped: Option<ShelfDropListener>,
}

struct ControllerTasks {
    cancel: CancellationToken,
    sampler: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

/// Per-robot command and state-sampling runtime.
pub struct RobotController {
    pub(crate) conn: Arc<Connection>,
    pub(crate) config: ControllerConfig,
    pub(crate) shared: Arc<ControllerShared>,
    tasks: parking_lot::Mutex<Option<ControllerTasks>>,
}

impl RobotController {
    pub fn new(
        conn: Arc<Connection>,
        config: ControllerConfig,
        on_shelf_dropped: Option<ShelfDropListener>,
    ) -> Self {
        Self {
            conn,
            config,
            shared: Arc::new(ControllerShared {
                state: parking_lot::Mutex::new(RobotState::default()),
                metrics: parking_lot::Mutex::new(ControllerMetrics::default()),
                monitoring_shelf: AtomicBool::new(false),
                on_shelf_dropped,
            }),
            tasks: parking_lot::Mutex::new(None),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the state sampler and connection watcher. No-op if running.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let transitions = self.conn.subscribe();
        self.shared.state.lock().connection_state = self.conn.state();
        let sampler = spawn_state_sampler(
            Arc::clone(&self.conn),
            Arc::clone(&self.shared),
            self.config.clone(),
            cancel.clone(),
        );
        let watcher = spawn_connection_watcher(
            Arc::clone(&self.conn),
            Arc::clone(&self.shared),
            transitions,
            cancel.clone(),
        );
        *tasks = Some(ControllerTasks { cancel, sampler, watcher });
        tracing::info!(
            robot = %self.conn.target(),
            fast_ms = self.config.fast_interval_ms,
            slow_ms = self.config.slow_interval_ms,
            "controller started"
        );
    }

    /// Signal the background tasks to exit and join them within a bounded
    /// timeout. No-op if not running.
    pub async fn stop(&self) {
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else { return };
        tasks.cancel.cancel();
        let join_timeout =
            self.config.fast_interval().saturating_mul(3).max(Duration::from_secs(1));
        let joined = tokio::time::timeout(join_timeout, async {
            let _ = tasks.sampler.await;
            let _ = tasks.watcher.await;
        })
        .await;
        if joined.is_err() {
            tracing::warn!(robot = %self.conn.target(), "controller tasks did not stop within timeout");
        } else {
            tracing::info!(robot = %self.conn.target(), "controller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().as_ref().is_some_and(|t| !t.sampler.is_finished())
    }

    // ── Observability ────────────────────────────────────────────────

    /// Independent snapshot of the current robot state.
    pub fn state(&self) -> RobotState {
        self.shared.state.lock().clone()
    }

    /// Snapshot of the collected poll metrics.
    pub fn metrics(&self) -> ControllerMetrics {
        self.shared.metrics.lock().clone()
    }

    pub fn reset_metrics(&self) {
        self.shared.metrics.lock().reset();
    }

    /// Clear the shelf-dropped flag and stop shelf monitoring.
    pub fn reset_shelf_monitor(&self) {
        self.shared.monitoring_shelf.store(false, Ordering::Relaxed);
        let mut state = self.shared.state.lock();
        state.shelf_dropped = false;
        state.moving_shelf_id = None;
    }

    // ── Movement wrappers ────────────────────────────────────────────

    pub async fn move_to_location(
        &self,
        location: &str,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        self.conn.ensure_resolver().await;
        let location_id = self.conn.resolve_location(location);
        self.execute_command(
            Command::MoveToLocation { target_location_id: location_id },
            Some(location.to_owned()),
            timeout,
            opts,
        )
        .await
    }

    pub async fn move_to_pose(
        &self,
        x: f64,
        y: f64,
        yaw: f64,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        self.execute_command(
            Command::MoveToPose { x, y, yaw },
            Some(format!("({x}, {y}, {yaw})")),
            timeout,
            opts,
        )
        .await
    }

    /// Move forward (positive) or backward (negative). `speed = 0` lets the
    /// robot decide.
    pub async fn move_forward(
        &self,
        distance_meter: f64,
        speed: f64,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        self.execute_command(
            Command::MoveForward { distance_meter, speed },
            Some(format!("{distance_meter}m")),
            timeout,
            opts,
        )
        .await
    }

    /// Rotate in place; positive is counter-clockwise.
    pub async fn rotate_in_place(
        &self,
        angle_radian: f64,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        self.execute_command(
            Command::RotateInPlace { angle_radian },
            Some(format!("{angle_radian}rad")),
            timeout,
            opts,
        )
        .await
    }

    pub async fn return_home(&self, timeout: Duration, opts: CommandOptions) -> CommandResult {
        self.execute_command(Command::ReturnHome, None, timeout, opts).await
    }

    /// Pick up `shelf` and deliver it to `location`.
    ///
    /// Shelf monitoring is armed before the command starts, and the moving
    /// shelf id is seeded with the target shelf, so a first-poll
    /// transition to empty still registers as a drop.
    pub async fn move_shelf(
        &self,
        shelf: &str,
        location: &str,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        self.conn.ensure_resolver().await;
        let shelf_id = self.conn.resolve_shelf(shelf);
        let location_id = self.conn.resolve_location(location);
        {
            let mut state = self.shared.state.lock();
            state.shelf_dropped = false;
            state.moving_shelf_id = Some(shelf_id.clone());
        }
        self.shared.monitoring_shelf.store(true, Ordering::Relaxed);
        self.execute_command(
            Command::MoveShelf { target_shelf_id: shelf_id, destination_location_id: location_id },
            Some(format!("{shelf} -> {location}")),
            timeout,
            opts,
        )
        .await
    }

    /// Return a shelf to its home location. With no shelf given, the robot
    /// returns whatever it is carrying.
    pub async fn return_shelf(
        &self,
        shelf: Option<&str>,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        let shelf_id = match shelf {
            Some(name) => {
                self.conn.ensure_resolver().await;
                self.conn.resolve_shelf(name)
            }
            None => String::new(),
        };
        let result = self
            .execute_command(
                Command::ReturnShelf { target_shelf_id: shelf_id },
                shelf.map(str::to_owned),
                timeout,
                opts,
            )
            .await;
        self.shared.monitoring_shelf.store(false, Ordering::Relaxed);
        result
    }

    pub async fn dock_shelf(&self, timeout: Duration, opts: CommandOptions) -> CommandResult {
        self.execute_command(Command::DockShelf, None, timeout, opts).await
    }

    pub async fn undock_shelf(&self, timeout: Duration, opts: CommandOptions) -> CommandResult {
        self.execute_command(Command::UndockShelf, None, timeout, opts).await
    }

    pub async fn speak(
        &self,
        text: &str,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        let label = text.chars().take(40).collect::<String>();
        self.execute_command(
            Command::Speak { text: text.to_owned() },
            Some(label),
            timeout,
            opts,
        )
        .await
    }

    /// Set speaker volume, clamped to 0..=10.
    pub async fn set_speaker_volume(
        &self,
        volume: i32,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        let volume = volume.clamp(0, 10);
        self.execute_command(
            Command::SetSpeakerVolume { volume },
            Some(volume.to_string()),
            timeout,
            opts,
        )
        .await
    }

    /// Reset the recorded pose of a shelf. Direct RPC, no command lifecycle.
    pub async fn reset_shelf_pose(&self, shelf: &str) -> CommandResult {
        let started = Instant::now();
        self.conn.ensure_resolver().await;
        let shelf_id = self.conn.resolve_shelf(shelf);
        let api = match self.conn.api().await {
            Ok(api) => api,
            Err(e) => {
                return CommandResult::failure(
                    "reset_shelf_pose",
                    Some(shelf.to_owned()),
                    e.to_string(),
                    started.elapsed(),
                )
            }
        };
        let outcome = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                let shelf_id = shelf_id.clone();
                async move { api.reset_shelf_pose(shelf_id).await }
            })
            .await;
        match outcome {
            Ok(result) if result.success => {
                CommandResult::success("reset_shelf_pose", Some(shelf.to_owned()), started.elapsed())
            }
            Ok(result) => {
                let error = describe_error(&api, result.error_code).await;
                CommandResult::rejected(
                    "reset_shelf_pose",
                    Some(shelf.to_owned()),
                    result.error_code,
                    error,
                    started.elapsed(),
                )
            }
            Err(e) => CommandResult::failure(
                "reset_shelf_pose",
                Some(shelf.to_owned()),
                e.to_string(),
                started.elapsed(),
            ),
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

fn clamp_percent(pct: f64) -> u8 {
    pct.clamp(0.0, 100.0).round() as u8
}

/// Spawn the periodic state sampler.
fn spawn_state_sampler(
    conn: Arc<Connection>,
    shared: Arc<ControllerShared>,
    config: ControllerConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_slow: Option<Instant> = None;

        loop {
            let api = match conn.api().await {
                Ok(api) => Some(api),
                Err(e) => {
                    tracing::debug!(robot = %conn.target(), err = %e, "state sampler has no transport");
                    None
                }
            };

            if let Some(api) = api {
                // Fast cycle: pose + command-running flag. Each read fails
                // independently so one fault cannot starve the other fields.
                let pose = match api.get_robot_pose().await {
                    Ok(pose) => Some(pose),
                    Err(e) => {
                        tracing::debug!(robot = %conn.target(), err = %e, "pose poll failed");
                        None
                    }
                };
                let running = match api.is_command_running().await {
                    Ok(running) => Some(running),
                    Err(e) => {
                        tracing::debug!(robot = %conn.target(), err = %e, "command-running poll failed");
                        None
                    }
                };
                if pose.is_some() || running.is_some() {
                    let now = Instant::now();
                    let mut state = shared.state.lock();
                    if let Some(pose) = pose {
                        state.pose = pose.into();
                    }
                    if let Some(running) = running {
                        state.is_command_running = running;
                    }
                    state.last_updated = Some(now);
                }

                // Slow cycle: battery.
                if last_slow.is_none_or(|t| t.elapsed() >= config.slow_interval()) {
                    match api.get_battery_info().await {
                        Ok((pct, _)) => {
                            shared.state.lock().battery_percent = clamp_percent(pct);
                            last_slow = Some(Instant::now());
                        }
                        Err(e) => {
                            tracing::debug!(robot = %conn.target(), err = %e, "battery poll failed");
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.fast_interval()) => {}
            }
        }
    })
}

/// Spawn the health-transition watcher.
fn spawn_connection_watcher(
    conn: Arc<Connection>,
    shared: Arc<ControllerShared>,
    mut transitions: broadcast::Receiver<ConnectionState>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut prev = conn.state();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = transitions.recv() => match next {
                    Ok(next) => {
                        let now = Instant::now();
                        match next {
                            ConnectionState::Disconnected => {
                                let mut state = shared.state.lock();
                                state.connection_state = ConnectionState::Disconnected;
                                state.disconnected_at = Some(now);
                            }
                            ConnectionState::Connected => {
                                {
                                    let mut state = shared.state.lock();
                                    state.connection_state = ConnectionState::Connected;
                                    if prev == ConnectionState::Disconnected {
                                        state.last_reconnect_at = Some(now);
                                    }
                                }
                                if prev == ConnectionState::Disconnected {
                                    spawn_reconnect_probe(Arc::clone(&conn), Arc::clone(&shared));
                                }
                            }
                        }
                        prev = next;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Missed transitions; resync from the watch value.
                        prev = conn.state();
                        shared.state.lock().connection_state = prev;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    })
}

/// Refresh pose, battery, and command state right after a reconnect,
/// without waiting for the next sampler cycles.
fn spawn_reconnect_probe(conn: Arc<Connection>, shared: Arc<ControllerShared>) {
    tokio::spawn(async move {
        let Ok(api) = conn.api().await else { return };
        let pose = api.get_robot_pose().await.ok();
        let battery = api.get_battery_info().await.ok();
        let running = api.is_command_running().await.ok();

        let now = Instant::now();
        let mut state = shared.state.lock();
        if let Some(pose) = pose {
            state.pose = pose.into();
            state.last_updated = Some(now);
        }
        if let Some((pct, _)) = battery {
            state.battery_percent = clamp_percent(pct);
        }
        if let Some(running) = running {
            state.is_command_running = running;
            state.last_updated = Some(now);
        }
    });
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
