// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end health monitoring and camera recovery.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use kachaka::camera::CameraStreamer;
use kachaka::config::{CameraConfig, ControllerConfig};
use kachaka::connection::{ConnectionPool, ConnectionState, StateListener};
use kachaka::controller::RobotController;
use kachaka::transport::api::CameraSide;

use kachaka_specs::{init_tracing, spawn_robot};

#[tokio::test]
async fn prober_tracks_wifi_drops_and_recovery() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    let pool = ConnectionPool::new();
    let conn = pool.acquire(robot.target()).await?;

    let transitions: Arc<Mutex<Vec<ConnectionState>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&transitions);
    let listener: StateListener = Arc::new(move |state| sink.lock().push(state));
    conn.start_monitoring(Duration::from_millis(50), Some(listener));

    robot.sim.ping_down.store(true, Ordering::SeqCst);
    assert!(
        conn.wait_for_state(ConnectionState::Disconnected, Some(Duration::from_secs(3))).await,
        "prober must observe the drop"
    );

    robot.sim.ping_down.store(false, Ordering::SeqCst);
    assert!(
        conn.wait_for_state(ConnectionState::Connected, Some(Duration::from_secs(3))).await,
        "prober must observe the recovery"
    );

    conn.stop_monitoring().await;
    assert_eq!(
        transitions.lock().clone(),
        vec![ConnectionState::Disconnected, ConnectionState::Connected]
    );
    Ok(())
}

#[tokio::test]
async fn controller_snapshot_carries_connection_history() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    let pool = ConnectionPool::new();
    let conn = pool.acquire(robot.target()).await?;

    let config = ControllerConfig {
        fast_interval_ms: 50,
        slow_interval_ms: 5000,
        poll_interval_ms: 50,
        retry_delay_ms: 50,
    };
    let ctrl = RobotController::new(Arc::clone(&conn), config, None);
    ctrl.start();
    conn.start_monitoring(Duration::from_millis(50), None);

    robot.sim.ping_down.store(true, Ordering::SeqCst);
    assert!(conn.wait_for_state(ConnectionState::Disconnected, Some(Duration::from_secs(3))).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = ctrl.state();
    assert_eq!(state.connection_state, ConnectionState::Disconnected);
    assert!(state.disconnected_at.is_some());

    robot.sim.ping_down.store(false, Ordering::SeqCst);
    assert!(conn.wait_for_state(ConnectionState::Connected, Some(Duration::from_secs(3))).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = ctrl.state();
    assert_eq!(state.connection_state, ConnectionState::Connected);
    assert!(state.last_reconnect_at.is_some());

    conn.stop_monitoring().await;
    ctrl.stop().await;
    Ok(())
}

#[tokio::test]
async fn camera_recovers_and_reports_latency() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    let pool = ConnectionPool::new();
    let conn = pool.acquire(robot.target()).await?;

    let config = CameraConfig {
        interval_ms: 50,
        camera: CameraSide::Front,
        detect: false,
        annotate: false,
    };
    let streamer = Arc::new(CameraStreamer::new(Arc::clone(&conn), config, None, None));

    // Wire health transitions into the streamer, the way the façade does.
    let wired = Arc::clone(&streamer);
    let listener: StateListener = Arc::new(move |state| wired.notify_state_change(state));

    robot.sim.ping_down.store(true, Ordering::SeqCst);
    streamer.start();
    conn.start_monitoring(Duration::from_millis(50), Some(listener));
    assert!(conn.wait_for_state(ConnectionState::Disconnected, Some(Duration::from_secs(3))).await);
    tokio::time::sleep(Duration::from_millis(150)).await;

    robot.sim.ping_down.store(false, Ordering::SeqCst);
    assert!(conn.wait_for_state(ConnectionState::Connected, Some(Duration::from_secs(3))).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    streamer.stop().await;
    conn.stop_monitoring().await;

    let stats = streamer.stats();
    assert!(stats.dropped > 0, "offline captures must count as drops");
    assert!(stats.total_frames > stats.dropped, "captures must resume after recovery");
    let latency = stats.recovery_latency_ms;
    assert!(latency.is_some(), "recovery latency must be recorded: {stats:?}");
    assert!(stats.drop_rate_percent > 0.0);

    let frame = streamer.latest_frame();
    assert!(frame.is_some_and(|f| f.ok));
    Ok(())
}
