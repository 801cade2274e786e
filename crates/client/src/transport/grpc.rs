// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gRPC transport with default per-call deadline injection.
//!
//! The upstream service sets no deadlines of its own; without one, a silent
//! TCP partition can park a call for hundreds of seconds. Every unary call
//! therefore runs under a client-side timer: the caller-supplied deadline
//! when one is given, the transport default otherwise. Nothing else about
//! the call is altered.

use std::future::Future;
use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::{Response, Status};

use super::api::{CameraSide, RobotApi};
use super::proto;
use super::proto::kachaka_api_client::KachakaApiClient;

/// Channel to one robot, shared by everything built on its connection.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    target: String,
    client: KachakaApiClient<Channel>,
    default_timeout: Duration,
}

impl GrpcTransport {
    /// Build a lazily connecting transport for `target` (canonical
    /// `host:port`). The channel is not dialed until the first call.
    pub fn connect(target: &str, default_timeout: Duration) -> anyhow::Result<Self> {
        let endpoint =
            Endpoint::from_shared(format!("http://{target}"))?.connect_timeout(default_timeout);
        let channel = endpoint.connect_lazy();
        Ok(Self {
            target: target.to_owned(),
            client: KachakaApiClient::new(channel),
            default_timeout,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run one unary call under a deadline. `deadline` overrides the
    /// transport default when set; an elapsed timer surfaces as
    /// `DEADLINE_EXCEEDED` so it classifies as transient downstream.
    async fn unary<T, Fut>(&self, deadline: Option<Duration>, call: Fut) -> Result<T, Status>
    where
        Fut: Future<Output = Result<Response<T>, Status>>,
    {
        let limit = deadline.unwrap_or(self.default_timeout);
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map(Response::into_inner),
            Err(_) => Err(Status::deadline_exceeded(format!(
                "no reply from {} within {}ms",
                self.target,
                limit.as_millis()
            ))),
        }
    }
}

#[tonic::async_trait]
impl RobotApi for GrpcTransport {
    async fn get_robot_serial_number(&self) -> Result<String, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_robot_serial_number(proto::GetRequest {})).await?;
        Ok(resp.serial_number)
    }

    async fn get_robot_version(&self) -> Result<String, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_robot_version(proto::GetRequest {})).await?;
        Ok(resp.version)
    }

    async fn get_robot_pose(&self) -> Result<proto::Pose, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_robot_pose(proto::GetRequest {})).await?;
        Ok(resp.pose.unwrap_or_default())
    }

    async fn get_battery_info(&self) -> Result<(f64, proto::PowerSupplyStatus), Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_battery_info(proto::GetRequest {})).await?;
        let status = proto::PowerSupplyStatus::try_from(resp.power_supply_status)
            .unwrap_or(proto::PowerSupplyStatus::Unspecified);
        Ok((resp.remaining_percentage, status))
    }

    async fn get_shelves(&self) -> Result<Vec<proto::Shelf>, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_shelves(proto::GetRequest {})).await?;
        Ok(resp.shelves)
    }

    async fn get_locations(&self) -> Result<Vec<proto::Location>, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_locations(proto::GetRequest {})).await?;
        Ok(resp.locations)
    }

    async fn get_map_list(&self) -> Result<Vec<proto::MapListEntry>, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_map_list(proto::GetRequest {})).await?;
        Ok(resp.map_list)
    }

    async fn get_current_map_id(&self) -> Result<String, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_current_map_id(proto::GetRequest {})).await?;
        Ok(resp.id)
    }

    async fn get_png_map(&self) -> Result<proto::GetPngMapResponse, Status> {
        let mut client = self.client.clone();
        self.unary(None, client.get_png_map(proto::GetRequest {})).await
    }

    async fn start_command(
        &self,
        command: proto::Command,
        cancel_all: bool,
        tts_on_success: String,
        title: String,
        deadline: Option<Duration>,
    ) -> Result<(proto::Result, String), Status> {
        let mut client = self.client.clone();
        let request = proto::StartCommandRequest {
            command: Some(command),
            cancel_all,
            tts_on_success,
            title,
        };
        let resp = self.unary(deadline, client.start_command(request)).await?;
        Ok((resp.result.unwrap_or_default(), resp.command_id))
    }

    async fn get_command_state(
        &self,
        deadline: Option<Duration>,
    ) -> Result<(proto::CommandState, String), Status> {
        let mut client = self.client.clone();
        let resp = self.unary(deadline, client.get_command_state(proto::GetRequest {})).await?;
        let state = proto::CommandState::try_from(resp.state)
            .unwrap_or(proto::CommandState::Unspecified);
        Ok((state, resp.command_id))
    }

    async fn get_last_command_result(
        &self,
        deadline: Option<Duration>,
    ) -> Result<(proto::Result, String), Status> {
        let mut client = self.client.clone();
        let resp =
            self.unary(deadline, client.get_last_command_result(proto::GetRequest {})).await?;
        Ok((resp.result.unwrap_or_default(), resp.command_id))
    }

    async fn is_command_running(&self) -> Result<bool, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.is_command_running(proto::GetRequest {})).await?;
        Ok(resp.running)
    }

    async fn cancel_command(&self) -> Result<proto::Result, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.cancel_command(proto::GetRequest {})).await?;
        Ok(resp.result.unwrap_or_default())
    }

    async fn proceed(&self) -> Result<proto::Result, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.proceed(proto::GetRequest {})).await?;
        Ok(resp.result.unwrap_or_default())
    }

    async fn get_moving_shelf_id(&self) -> Result<String, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_moving_shelf_id(proto::GetRequest {})).await?;
        Ok(resp.shelf_id)
    }

    async fn reset_shelf_pose(&self, shelf_id: String) -> Result<proto::Result, Status> {
        let mut client = self.client.clone();
        let resp =
            self.unary(None, client.reset_shelf_pose(proto::ResetShelfPoseRequest { shelf_id }))
                .await?;
        Ok(resp.result.unwrap_or_default())
    }

    async fn get_robot_error_codes(&self) -> Result<Vec<proto::ErrorCodeDefinition>, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_robot_error_code(proto::GetRequest {})).await?;
        Ok(resp.definitions)
    }

    async fn get_active_errors(&self) -> Result<Vec<i32>, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_error(proto::GetRequest {})).await?;
        Ok(resp.error_codes)
    }

    async fn get_camera_image(
        &self,
        camera: CameraSide,
    ) -> Result<proto::RosCompressedImage, Status> {
        let mut client = self.client.clone();
        match camera {
            CameraSide::Front => {
                self.unary(None, client.get_front_camera_ros_compressed_image(proto::GetRequest {}))
                    .await
            }
            CameraSide::Back => {
                self.unary(None, client.get_back_camera_ros_compressed_image(proto::GetRequest {}))
                    .await
            }
        }
    }

    async fn get_object_detection(&self) -> Result<Vec<proto::ObjectDetection>, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_object_detection(proto::GetRequest {})).await?;
        Ok(resp.objects)
    }

    async fn get_speaker_volume(&self) -> Result<i32, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_speaker_volume(proto::GetRequest {})).await?;
        Ok(resp.volume)
    }

    async fn set_manual_control_enabled(&self, enable: bool) -> Result<proto::Result, Status> {
        let mut client = self.client.clone();
        let request = proto::SetManualControlEnabledRequest { enable };
        let resp = self.unary(None, client.set_manual_control_enabled(request)).await?;
        Ok(resp.result.unwrap_or_default())
    }

    async fn set_robot_velocity(
        &self,
        linear: f64,
        angular: f64,
    ) -> Result<proto::Result, Status> {
        let mut client = self.client.clone();
        let request = proto::SetRobotVelocityRequest { linear, angular };
        let resp = self.unary(None, client.set_robot_velocity(request)).await?;
        Ok(resp.result.unwrap_or_default())
    }

    async fn set_robot_stop(&self) -> Result<proto::Result, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.set_robot_stop(proto::GetRequest {})).await?;
        Ok(resp.result.unwrap_or_default())
    }

    async fn get_shortcuts(&self) -> Result<Vec<proto::Shortcut>, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_shortcuts(proto::GetRequest {})).await?;
        Ok(resp.shortcuts)
    }

    async fn get_history_list(&self) -> Result<Vec<proto::History>, Status> {
        let mut client = self.client.clone();
        let resp = self.unary(None, client.get_history_list(proto::GetRequest {})).await?;
        Ok(resp.histories)
    }
}

#[cfg(test)]
#[path = "grpc_tests.rs"]
mod tests;
