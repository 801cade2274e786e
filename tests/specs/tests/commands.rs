// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end command execution against the robot double.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use kachaka::config::ControllerConfig;
use kachaka::commands::RobotCommands;
use kachaka::connection::ConnectionPool;
use kachaka::controller::{CommandOptions, RobotController, ShelfDropListener};
use kachaka::transport::proto;

use kachaka_specs::{init_tracing, seed_inventory, spawn_robot, MockRobot};

fn fast_config() -> ControllerConfig {
    ControllerConfig {
        fast_interval_ms: 100,
        slow_interval_ms: 5000,
        poll_interval_ms: 50,
        retry_delay_ms: 50,
    }
}

async fn controller(robot: &MockRobot) -> anyhow::Result<RobotController> {
    let pool = ConnectionPool::new();
    let conn = pool.acquire(robot.target()).await?;
    Ok(RobotController::new(conn, fast_config(), None))
}

#[tokio::test]
async fn move_to_location_resolves_names_and_completes() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    seed_inventory(&robot.sim);
    robot.sim.polls_until_done.store(2, Ordering::SeqCst);
    let ctrl = controller(&robot).await?;

    let result = ctrl
        .move_to_location("kitchen", Duration::from_secs(10), CommandOptions::default())
        .await;

    assert!(result.ok, "command failed: {result:?}");
    assert_eq!(result.action, "move_to_location");
    assert_eq!(result.target.as_deref(), Some("kitchen"));
    assert!(result.elapsed < 10.0);

    let started = robot.sim.started.lock();
    match &started[0].command {
        Some(proto::Command { command: Some(proto::command::Command::MoveToLocation(c)) }) => {
            assert_eq!(c.target_location_id, "L01", "name must resolve to an id");
        }
        other => anyhow::bail!("wrong command on the wire: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn rejected_command_carries_catalog_description() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    *robot.sim.reject_code.lock() = Some(42);
    robot.sim.error_definitions.lock().push(proto::ErrorCodeDefinition {
        code: 42,
        title: String::new(),
        title_en: "Path blocked".to_owned(),
        description: String::new(),
        description_en: String::new(),
    });
    let ctrl = controller(&robot).await?;

    let result = ctrl.return_home(Duration::from_secs(5), CommandOptions::default()).await;

    assert!(!result.ok);
    assert_eq!(result.error_code, Some(42));
    assert_eq!(result.error.as_deref(), Some("error_code=42: Path blocked"));
    Ok(())
}

#[tokio::test]
async fn unfinished_command_times_out() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    robot.sim.polls_until_done.store(-1, Ordering::SeqCst);
    let ctrl = controller(&robot).await?;

    let result = ctrl
        .return_home(Duration::from_millis(600), CommandOptions::default())
        .await;

    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some("TIMEOUT"));
    assert_eq!(result.timeout, Some(0.6));
    Ok(())
}

#[tokio::test]
async fn failed_command_reports_its_error_code() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    robot.sim.polls_until_done.store(2, Ordering::SeqCst);
    robot.sim.next_success.store(false, Ordering::SeqCst);
    robot.sim.fail_code.store(7, Ordering::SeqCst);
    let ctrl = controller(&robot).await?;

    let result = ctrl.return_home(Duration::from_secs(10), CommandOptions::default()).await;

    assert!(!result.ok);
    assert_eq!(result.error_code, Some(7));
    Ok(())
}

#[tokio::test]
async fn shelf_drop_is_detected_mid_transit() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    seed_inventory(&robot.sim);
    robot.sim.polls_until_done.store(-1, Ordering::SeqCst);
    {
        let mut moving = robot.sim.moving_shelf.lock();
        moving.push_back("S01".to_owned());
        moving.push_back(String::new());
    }

    let dropped: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&dropped);
    let listener: ShelfDropListener = Arc::new(move |shelf_id| {
        *sink.lock() = Some(shelf_id.to_owned());
    });

    let pool = ConnectionPool::new();
    let conn = pool.acquire(robot.target()).await?;
    let ctrl = RobotController::new(conn, fast_config(), Some(listener));

    let result = ctrl
        .move_shelf("pantry shelf", "kitchen", Duration::from_millis(800), CommandOptions::default())
        .await;

    assert!(!result.ok, "the command itself cannot finish");
    let state = ctrl.state();
    assert!(state.shelf_dropped, "drop must be recorded");
    assert_eq!(dropped.lock().as_deref(), Some("S01"));
    Ok(())
}

#[tokio::test]
async fn poll_until_complete_sees_an_idle_robot() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    let pool = ConnectionPool::new();
    let commands = RobotCommands::new(pool.acquire(robot.target()).await?);

    let outcome = commands
        .poll_until_complete(Duration::from_secs(2), Duration::from_millis(50))
        .await;
    assert!(outcome.ok);
    Ok(())
}

#[tokio::test]
async fn command_results_serialize_to_the_wire_shape() -> anyhow::Result<()> {
    init_tracing();
    let robot = spawn_robot().await?;
    robot.sim.polls_until_done.store(2, Ordering::SeqCst);
    let ctrl = controller(&robot).await?;

    let result = ctrl.return_home(Duration::from_secs(10), CommandOptions::default()).await;
    let json = serde_json::to_value(&result)?;

    assert_eq!(json["ok"], true);
    assert_eq!(json["action"], "return_home");
    assert!(json["elapsed"].is_number());
    assert!(json.get("error").is_none());
    Ok(())
}
