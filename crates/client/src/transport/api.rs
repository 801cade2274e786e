// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The unary call surface a Kachaka robot exposes, as a trait so the
//! runtime can run against the gRPC transport or an in-process fake.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tonic::Status;

use super::proto;

/// Which onboard camera to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSide {
    Front,
    Back,
}

impl CameraSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

impl fmt::Display for CameraSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary RPC surface of one robot.
///
/// Every method resolves within the transport's per-call deadline; a call
/// that outlives it surfaces as `DEADLINE_EXCEEDED` and enters the retry
/// taxonomy like any other transient fault. The command-lifecycle calls
/// take an optional deadline override: when set it is honored unmodified,
/// when `None` the transport default applies. Callers bounded by an
/// absolute command deadline use the override so no single call can
/// outlive the remaining budget.
#[tonic::async_trait]
pub trait RobotApi: Send + Sync {
    // Identity
    async fn get_robot_serial_number(&self) -> Result<String, Status>;
    async fn get_robot_version(&self) -> Result<String, Status>;

    // Pose and battery
    async fn get_robot_pose(&self) -> Result<proto::Pose, Status>;
    async fn get_battery_info(&self) -> Result<(f64, proto::PowerSupplyStatus), Status>;

    // Lists
    async fn get_shelves(&self) -> Result<Vec<proto::Shelf>, Status>;
    async fn get_locations(&self) -> Result<Vec<proto::Location>, Status>;
    async fn get_map_list(&self) -> Result<Vec<proto::MapListEntry>, Status>;
    async fn get_current_map_id(&self) -> Result<String, Status>;
    async fn get_png_map(&self) -> Result<proto::GetPngMapResponse, Status>;

    // Command lifecycle
    async fn start_command(
        &self,
        command: proto::Command,
        cancel_all: bool,
        tts_on_success: String,
        title: String,
        deadline: Option<Duration>,
    ) -> Result<(proto::Result, String), Status>;
    async fn get_command_state(
        &self,
        deadline: Option<Duration>,
    ) -> Result<(proto::CommandState, String), Status>;
    async fn get_last_command_result(
        &self,
        deadline: Option<Duration>,
    ) -> Result<(proto::Result, String), Status>;
    async fn is_command_running(&self) -> Result<bool, Status>;
    async fn cancel_command(&self) -> Result<proto::Result, Status>;
    async fn proceed(&self) -> Result<proto::Result, Status>;

    // Shelf in transit
    async fn get_moving_shelf_id(&self) -> Result<String, Status>;
    async fn reset_shelf_pose(&self, shelf_id: String) -> Result<proto::Result, Status>;

    // Error catalog
    async fn get_robot_error_codes(&self) -> Result<Vec<proto::ErrorCodeDefinition>, Status>;
    async fn get_active_errors(&self) -> Result<Vec<i32>, Status>;

    // Media
    async fn get_camera_image(
        &self,
        camera: CameraSide,
    ) -> Result<proto::RosCompressedImage, Status>;
    async fn get_object_detection(&self) -> Result<Vec<proto::ObjectDetection>, Status>;

    // Speaker
    async fn get_speaker_volume(&self) -> Result<i32, Status>;

    // Manual control
    async fn set_manual_control_enabled(&self, enable: bool) -> Result<proto::Result, Status>;
    async fn set_robot_velocity(&self, linear: f64, angular: f64)
        -> Result<proto::Result, Status>;
    async fn set_robot_stop(&self) -> Result<proto::Result, Status>;

    // Shortcuts and history
    async fn get_shortcuts(&self) -> Result<Vec<proto::Shortcut>, Status>;
    async fn get_history_list(&self) -> Result<Vec<proto::History>, Status>;
}
