// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound command variants and the normalized execution result.

use std::time::Duration;

use serde::Serialize;

use crate::transport::proto;

/// One robot command. Shelf and location payloads carry ids, never names;
/// resolution happens before a command is built.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    MoveToLocation { target_location_id: String },
    MoveToPose { x: f64, y: f64, yaw: f64 },
    MoveForward { distance_meter: f64, speed: f64 },
    RotateInPlace { angle_radian: f64 },
    ReturnHome,
    MoveShelf { target_shelf_id: String, destination_location_id: String },
    ReturnShelf { target_shelf_id: String },
    DockShelf,
    UndockShelf,
    Speak { text: String },
    SetSpeakerVolume { volume: i32 },
}

impl Command {
    /// Action label used in results and logs.
    pub fn action(&self) -> &'static str {
        match self {
            Self::MoveToLocation { .. } => "move_to_location",
            Self::MoveToPose { .. } => "move_to_pose",
            Self::MoveForward { .. } => "move_forward",
            Self::RotateInPlace { .. } => "rotate_in_place",
            Self::ReturnHome => "return_home",
            Self::MoveShelf { .. } => "move_shelf",
            Self::ReturnShelf { .. } => "return_shelf",
            Self::DockShelf => "dock_shelf",
            Self::UndockShelf => "undock_shelf",
            Self::Speak { .. } => "speak",
            Self::SetSpeakerVolume { .. } => "set_speaker_volume",
        }
    }

    pub(crate) fn into_proto(self) -> proto::Command {
        use proto::command::Command as Variant;
        let variant = match self {
            Self::MoveToLocation { target_location_id } => {
                Variant::MoveToLocation(proto::MoveToLocationCommand { target_location_id })
            }
            Self::MoveToPose { x, y, yaw } => {
                Variant::MoveToPose(proto::MoveToPoseCommand { x, y, yaw })
            }
            Self::MoveForward { distance_meter, speed } => {
                Variant::MoveForward(proto::MoveForwardCommand { distance_meter, speed })
            }
            Self::RotateInPlace { angle_radian } => {
                Variant::RotateInPlace(proto::RotateInPlaceCommand { angle_radian })
            }
            Self::ReturnHome => Variant::ReturnHome(proto::ReturnHomeCommand {}),
            Self::MoveShelf { target_shelf_id, destination_location_id } => {
                Variant::MoveShelf(proto::MoveShelfCommand {
                    target_shelf_id,
                    destination_location_id,
                })
            }
            Self::ReturnShelf { target_shelf_id } => {
                Variant::ReturnShelf(proto::ReturnShelfCommand { target_shelf_id })
            }
            Self::DockShelf => Variant::DockShelf(proto::DockShelfCommand {}),
            Self::UndockShelf => Variant::UndockShelf(proto::UndockShelfCommand {}),
            Self::Speak { text } => Variant::Speak(proto::SpeakCommand { text }),
            Self::SetSpeakerVolume { volume } => {
                Variant::SetSpeakerVolume(proto::SetSpeakerVolumeCommand { volume })
            }
        };
        proto::Command { command: Some(variant) }
    }
}

/// Options forwarded with every started command.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Cancel whatever the robot is currently doing first.
    pub cancel_all: bool,
    /// Phrase spoken on successful completion.
    pub tts_on_success: String,
    /// Display title on the robot's interface.
    pub title: String,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self { cancel_all: true, tts_on_success: String::new(), title: String::new() }
    }
}

/// Normalized result of one executed command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub ok: bool,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Wall-clock seconds from start to completion or failure.
    pub elapsed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl CommandResult {
    pub(crate) fn success(action: &str, target: Option<String>, elapsed: Duration) -> Self {
        Self {
            ok: true,
            action: action.to_owned(),
            target,
            elapsed: elapsed.as_secs_f64(),
            error_code: None,
            error: None,
            timeout: None,
        }
    }

    pub(crate) fn failure(
        action: &str,
        target: Option<String>,
        error: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            ok: false,
            action: action.to_owned(),
            target,
            elapsed: elapsed.as_secs_f64(),
            error_code: None,
            error: Some(error),
            timeout: None,
        }
    }

    pub(crate) fn rejected(
        action: &str,
        target: Option<String>,
        error_code: i32,
        error: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            ok: false,
            action: action.to_owned(),
            target,
            elapsed: elapsed.as_secs_f64(),
            error_code: Some(error_code),
            error: Some(error),
            timeout: None,
        }
    }

    pub(crate) fn disconnected(action: &str, target: Option<String>, elapsed: Duration) -> Self {
        Self::failure(action, target, "DISCONNECTED".to_owned(), elapsed)
    }

    pub(crate) fn timed_out(action: &str, target: Option<String>, timeout: Duration) -> Self {
        Self {
            ok: false,
            action: action.to_owned(),
            target,
            elapsed: timeout.as_secs_f64(),
            error_code: None,
            error: Some("TIMEOUT".to_owned()),
            timeout: Some(timeout.as_secs_f64()),
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
