// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-process [`RobotApi`] fake.
//!
//! Each RPC reads from its own response queue: entries are popped in order
//! and the final entry is sticky, so a script like `[Running, Unspecified]`
//! keeps answering `Unspecified` once drained. Unscripted RPCs answer a
//! benign default. Every call is recorded for assertions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tonic::{Code, Status};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::transport::api::{CameraSide, RobotApi};
use crate::transport::proto;

/// Scripted response queue for one RPC.
pub struct Script<T>(Mutex<VecDeque<Result<T, (Code, String)>>>);

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self(Mutex::new(VecDeque::new()))
    }

    /// Queue a successful response.
    pub fn push_ok(&self, value: T) {
        self.0.lock().push_back(Ok(value));
    }

    /// Queue a failing response.
    pub fn push_err(&self, code: Code, message: &str) {
        self.0.lock().push_back(Err((code, message.to_owned())));
    }

    fn next_or(&self, default: T) -> Result<T, Status> {
        let mut queue = self.0.lock();
        let entry = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match entry {
            Some(Ok(value)) => Ok(value),
            Some(Err((code, message))) => Err(Status::new(code, message)),
            None => Ok(default),
        }
    }
}

fn ok_result() -> proto::Result {
    proto::Result { success: true, error_code: 0 }
}

/// In-process robot double.
#[derive(Default)]
pub struct FakeRobot {
    pub serial: Script<String>,
    pub version: Script<String>,
    pub pose: Script<proto::Pose>,
    pub battery: Script<(f64, proto::PowerSupplyStatus)>,
    pub start_response: Script<(proto::Result, String)>,
    pub command_state: Script<(proto::CommandState, String)>,
    pub last_result: Script<(proto::Result, String)>,
    pub running: Script<bool>,
    pub moving_shelf: Script<String>,
    pub frame: Script<proto::RosCompressedImage>,
    pub detection: Script<Vec<proto::ObjectDetection>>,
    pub ack: Script<proto::Result>,
    pub speaker_volume: Script<i32>,

    pub shelves: Mutex<Vec<proto::Shelf>>,
    pub locations: Mutex<Vec<proto::Location>>,
    pub error_definitions: Mutex<Vec<proto::ErrorCodeDefinition>>,
    pub active_errors: Mutex<Vec<i32>>,
    pub shortcuts: Mutex<Vec<proto::Shortcut>>,
    pub histories: Mutex<Vec<proto::History>>,

    /// Every RPC name, in call order.
    pub calls: Mutex<Vec<&'static str>>,
    /// Every `StartCommand` request, in call order.
    pub started: Mutex<Vec<proto::StartCommandRequest>>,
    /// Every `SetRobotVelocity` request, in call order.
    pub velocity_calls: Mutex<Vec<(f64, f64)>>,
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRobot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wrap this fake in a pooled-style connection handle.
    pub fn connect(self: &Arc<Self>, target: &str) -> Arc<Connection> {
        let api: Arc<dyn RobotApi> = Arc::clone(self) as Arc<dyn RobotApi>;
        Connection::with_api(target, api, ConnectionConfig::default())
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == name).count()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().push(name);
    }
}

#[tonic::async_trait]
impl RobotApi for FakeRobot {
    async fn get_robot_serial_number(&self) -> Result<String, Status> {
        self.record("get_robot_serial_number");
        self.serial.next_or("KCK-0001".to_owned())
    }

    async fn get_robot_version(&self) -> Result<String, Status> {
        self.record("get_robot_version");
        self.version.next_or("2.6.0".to_owned())
    }

    async fn get_robot_pose(&self) -> Result<proto::Pose, Status> {
        self.record("get_robot_pose");
        self.pose.next_or(proto::Pose::default())
    }

    async fn get_battery_info(&self) -> Result<(f64, proto::PowerSupplyStatus), Status> {
        self.record("get_battery_info");
        self.battery.next_or((100.0, proto::PowerSupplyStatus::Discharging))
    }

    async fn get_shelves(&self) -> Result<Vec<proto::Shelf>, Status> {
        self.record("get_shelves");
        Ok(self.shelves.lock().clone())
    }

    async fn get_locations(&self) -> Result<Vec<proto::Location>, Status> {
        self.record("get_locations");
        Ok(self.locations.lock().clone())
    }

    async fn get_map_list(&self) -> Result<Vec<proto::MapListEntry>, Status> {
        self.record("get_map_list");
        Ok(Vec::new())
    }

    async fn get_current_map_id(&self) -> Result<String, Status> {
        self.record("get_current_map_id");
        Ok(String::new())
    }

    async fn get_png_map(&self) -> Result<proto::GetPngMapResponse, Status> {
        self.record("get_png_map");
        Ok(proto::GetPngMapResponse::default())
    }

    async fn start_command(
        &self,
        command: proto::Command,
        cancel_all: bool,
        tts_on_success: String,
        title: String,
        _deadline: Option<Duration>,
    ) -> Result<(proto::Result, String), Status> {
        self.record("start_command");
        self.started.lock().push(proto::StartCommandRequest {
            command: Some(command),
            cancel_all,
            tts_on_success,
            title,
        });
        self.start_response.next_or((ok_result(), "cmd-1".to_owned()))
    }

    async fn get_command_state(
        &self,
        _deadline: Option<Duration>,
    ) -> Result<(proto::CommandState, String), Status> {
        self.record("get_command_state");
        self.command_state.next_or((proto::CommandState::Unspecified, String::new()))
    }

    async fn get_last_command_result(
        &self,
        _deadline: Option<Duration>,
    ) -> Result<(proto::Result, String), Status> {
        self.record("get_last_command_result");
        self.last_result.next_or((ok_result(), String::new()))
    }

    async fn is_command_running(&self) -> Result<bool, Status> {
        self.record("is_command_running");
        self.running.next_or(false)
    }

    async fn cancel_command(&self) -> Result<proto::Result, Status> {
        self.record("cancel_command");
        self.ack.next_or(ok_result())
    }

    async fn proceed(&self) -> Result<proto::Result, Status> {
        self.record("proceed");
        self.ack.next_or(ok_result())
    }

    async fn get_moving_shelf_id(&self) -> Result<String, Status> {
        self.record("get_moving_shelf_id");
        self.moving_shelf.next_or(String::new())
    }

    async fn reset_shelf_pose(&self, _shelf_id: String) -> Result<proto::Result, Status> {
        self.record("reset_shelf_pose");
        self.ack.next_or(ok_result())
    }

    async fn get_robot_error_codes(&self) -> Result<Vec<proto::ErrorCodeDefinition>, Status> {
        self.record("get_robot_error_codes");
        Ok(self.error_definitions.lock().clone())
    }

    async fn get_active_errors(&self) -> Result<Vec<i32>, Status> {
        self.record("get_active_errors");
        Ok(self.active_errors.lock().clone())
    }

    async fn get_camera_image(
        &self,
        _camera: CameraSide,
    ) -> Result<proto::RosCompressedImage, Status> {
        self.record("get_camera_image");
        self.frame.next_or(proto::RosCompressedImage {
            format: "jpeg".to_owned(),
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
        })
    }

    async fn get_object_detection(&self) -> Result<Vec<proto::ObjectDetection>, Status> {
        self.record("get_object_detection");
        self.detection.next_or(Vec::new())
    }

    async fn get_speaker_volume(&self) -> Result<i32, Status> {
        self.record("get_speaker_volume");
        self.speaker_volume.next_or(5)
    }

    async fn set_manual_control_enabled(&self, _enable: bool) -> Result<proto::Result, Status> {
        self.record("set_manual_control_enabled");
        self.ack.next_or(ok_result())
    }

    async fn set_robot_velocity(
        &self,
        linear: f64,
        angular: f64,
    ) -> Result<proto::Result, Status> {
        self.record("set_robot_velocity");
        self.velocity_calls.lock().push((linear, angular));
        self.ack.next_or(ok_result())
    }

    async fn set_robot_stop(&self) -> Result<proto::Result, Status> {
        self.record("set_robot_stop");
        self.ack.next_or(ok_result())
    }

    async fn get_shortcuts(&self) -> Result<Vec<proto::Shortcut>, Status> {
        self.record("get_shortcuts");
        Ok(self.shortcuts.lock().clone())
    }

    async fn get_history_list(&self) -> Result<Vec<proto::History>, Status> {
        self.record("get_history_list");
        Ok(self.histories.lock().clone())
    }
}
