// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only status queries: pose, battery, lists, media, catalogs.
//!
//! Every query is retry-wrapped (count mode) and returns a typed value;
//! serialization to a generic map is the façade's job.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

use crate::camera::{epoch_ms, Frame};
use crate::connection::{Connection, PoseSnapshot};
use crate::error::RpcFailure;
use crate::retry::RetryPolicy;
use crate::transport::api::{CameraSide, RobotApi};
use crate::transport::proto;

/// Battery percentage and charging status.
#[derive(Debug, Clone, Serialize)]
pub struct BatteryReading {
    pub percentage: f64,
    pub power_status: String,
}

/// Current command execution state.
#[derive(Debug, Clone, Serialize)]
pub struct CommandStateInfo {
    pub state: String,
    pub command_id: String,
    pub is_running: bool,
}

/// Result of the most recently completed command.
#[derive(Debug, Clone, Serialize)]
pub struct LastCommandInfo {
    pub success: bool,
    pub error_code: i32,
    pub command_id: String,
}

/// Combined status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RobotStatus {
    pub pose: PoseSnapshot,
    pub battery: BatteryReading,
    pub command: CommandStateInfo,
    pub errors: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moving_shelf_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationInfo {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub pose: PoseSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShelfInfo {
    pub id: String,
    pub name: String,
    pub home_location_id: String,
}

/// Current map rendered as a base64 PNG.
#[derive(Debug, Clone, Serialize)]
pub struct MapImage {
    pub image_base64: String,
    pub format: String,
    pub name: String,
    pub resolution: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapCatalog {
    pub maps: Vec<MapEntry>,
    pub current_map_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapEntry {
    pub id: String,
    pub name: String,
}

/// One entry of the robot's error-code catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDefinition {
    pub code: i32,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShortcutInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub id: String,
    pub command: String,
    pub success: bool,
    pub error_code: i32,
    pub executed_at_ms: u64,
}

/// Read-only queries for one robot.
pub struct RobotQueries {
    conn: Arc<Connection>,
}

impl RobotQueries {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    async fn api(&self) -> Result<Arc<dyn RobotApi>, RpcFailure> {
        self.conn.api().await.map_err(|e| RpcFailure::internal(e.to_string()))
    }

    /// Full snapshot: pose, battery, command state, active errors, shelf.
    pub async fn status(&self) -> Result<RobotStatus, RpcFailure> {
        let api = self.api().await?;
        let status = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move {
                    let pose = api.get_robot_pose().await?;
                    let (percentage, power) = api.get_battery_info().await?;
                    let (state, command_id) = api.get_command_state(None).await?;
                    let is_running = api.is_command_running().await?;
                    let errors = api.get_active_errors().await?;
                    let moving_shelf = api.get_moving_shelf_id().await?;
                    Ok(RobotStatus {
                        pose: pose.into(),
                        battery: BatteryReading {
                            percentage,
                            power_status: power.as_str_name().to_owned(),
                        },
                        command: CommandStateInfo {
                            state: state.as_str_name().to_owned(),
                            command_id,
                            is_running,
                        },
                        errors,
                        moving_shelf_id: (!moving_shelf.is_empty()).then_some(moving_shelf),
                    })
                }
            })
            .await?;
        Ok(status)
    }

    pub async fn pose(&self) -> Result<PoseSnapshot, RpcFailure> {
        let api = self.api().await?;
        let pose = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_robot_pose().await }
            })
            .await?;
        Ok(pose.into())
    }

    pub async fn battery(&self) -> Result<BatteryReading, RpcFailure> {
        let api = self.api().await?;
        let (percentage, power) = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_battery_info().await }
            })
            .await?;
        Ok(BatteryReading { percentage, power_status: power.as_str_name().to_owned() })
    }

    /// All registered locations.
    pub async fn locations(&self) -> Result<Vec<LocationInfo>, RpcFailure> {
        let api = self.api().await?;
        let locations = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_locations().await }
            })
            .await?;
        Ok(locations
            .into_iter()
            .map(|l| {
                let kind = proto::LocationType::try_from(l.r#type)
                    .unwrap_or(proto::LocationType::Unspecified)
                    .as_str_name()
                    .to_owned();
                LocationInfo {
                    id: l.id,
                    name: l.name,
                    kind,
                    pose: l.pose.unwrap_or_default().into(),
                }
            })
            .collect())
    }

    /// All registered shelves.
    pub async fn shelves(&self) -> Result<Vec<ShelfInfo>, RpcFailure> {
        let api = self.api().await?;
        let shelves = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_shelves().await }
            })
            .await?;
        Ok(shelves
            .into_iter()
            .map(|s| ShelfInfo { id: s.id, name: s.name, home_location_id: s.home_location_id })
            .collect())
    }

    /// Id of the shelf in transit, if any.
    pub async fn moving_shelf(&self) -> Result<Option<String>, RpcFailure> {
        let api = self.api().await?;
        let shelf_id = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_moving_shelf_id().await }
            })
            .await?;
        Ok((!shelf_id.is_empty()).then_some(shelf_id))
    }

    pub async fn command_state(&self) -> Result<CommandStateInfo, RpcFailure> {
        let api = self.api().await?;
        let info = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move {
                    let (state, command_id) = api.get_command_state(None).await?;
                    let is_running = api.is_command_running().await?;
                    Ok(CommandStateInfo {
                        state: state.as_str_name().to_owned(),
                        command_id,
                        is_running,
                    })
                }
            })
            .await?;
        Ok(info)
    }

    pub async fn last_command_result(&self) -> Result<LastCommandInfo, RpcFailure> {
        let api = self.api().await?;
        let (result, command_id) = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_last_command_result(None).await }
            })
            .await?;
        Ok(LastCommandInfo { success: result.success, error_code: result.error_code, command_id })
    }

    /// One compressed frame from the given camera.
    pub async fn camera_frame(&self, camera: CameraSide) -> Result<Frame, RpcFailure> {
        let api = self.api().await?;
        let image = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_camera_image(camera).await }
            })
            .await?;
        Ok(Frame {
            ok: true,
            image_base64: BASE64.encode(&image.data),
            format: if image.format.is_empty() { "jpeg".to_owned() } else { image.format },
            timestamp_ms: epoch_ms(),
            objects: None,
        })
    }

    /// Current map as base64 PNG.
    pub async fn map(&self) -> Result<MapImage, RpcFailure> {
        let api = self.api().await?;
        let png = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_png_map().await }
            })
            .await?;
        Ok(MapImage {
            image_base64: BASE64.encode(&png.data),
            format: "png".to_owned(),
            name: png.name,
            resolution: png.resolution,
            width: png.width,
            height: png.height,
        })
    }

    /// All available maps plus the active one.
    pub async fn maps(&self) -> Result<MapCatalog, RpcFailure> {
        let api = self.api().await?;
        let catalog = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move {
                    let maps = api.get_map_list().await?;
                    let current_map_id = api.get_current_map_id().await?;
                    Ok(MapCatalog {
                        maps: maps
                            .into_iter()
                            .map(|m| MapEntry { id: m.id, name: m.name })
                            .collect(),
                        current_map_id,
                    })
                }
            })
            .await?;
        Ok(catalog)
    }

    /// Error codes currently active on the robot.
    pub async fn active_errors(&self) -> Result<Vec<i32>, RpcFailure> {
        let api = self.api().await?;
        let errors = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_active_errors().await }
            })
            .await?;
        Ok(errors)
    }

    /// The robot firmware's error-code catalog.
    pub async fn error_catalog(&self) -> Result<Vec<ErrorDefinition>, RpcFailure> {
        let api = self.api().await?;
        let definitions = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_robot_error_codes().await }
            })
            .await?;
        Ok(definitions
            .into_iter()
            .map(|d| ErrorDefinition {
                code: d.code,
                title: if d.title_en.is_empty() { d.title } else { d.title_en },
                description: if d.description_en.is_empty() { d.description } else { d.description_en },
            })
            .collect())
    }

    pub async fn serial_number(&self) -> Result<String, RpcFailure> {
        let api = self.api().await?;
        let serial = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_robot_serial_number().await }
            })
            .await?;
        Ok(serial)
    }

    pub async fn version(&self) -> Result<String, RpcFailure> {
        let api = self.api().await?;
        let version = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_robot_version().await }
            })
            .await?;
        Ok(version)
    }

    /// Current speaker volume (0–10).
    pub async fn speaker_volume(&self) -> Result<i32, RpcFailure> {
        let api = self.api().await?;
        let volume = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_speaker_volume().await }
            })
            .await?;
        Ok(volume)
    }

    /// All registered shortcuts.
    pub async fn shortcuts(&self) -> Result<Vec<ShortcutInfo>, RpcFailure> {
        let api = self.api().await?;
        let shortcuts = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_shortcuts().await }
            })
            .await?;
        Ok(shortcuts.into_iter().map(|s| ShortcutInfo { id: s.id, name: s.name }).collect())
    }

    /// Command execution history.
    pub async fn history(&self) -> Result<Vec<HistoryRecord>, RpcFailure> {
        let api = self.api().await?;
        let histories = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_history_list().await }
            })
            .await?;
        Ok(histories
            .into_iter()
            .map(|h| HistoryRecord {
                id: h.id,
                command: h.command_summary,
                success: h.success,
                error_code: h.error_code,
                executed_at_ms: h.command_executed_time,
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "queries_tests.rs"]
mod tests;
