// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenario tests.
//!
//! Spawns an in-process robot double behind a real tonic server on an
//! ephemeral port and exercises the client runtime against it over
//! loopback gRPC.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use kachaka::transport::proto;
use kachaka::transport::proto::kachaka_api_server::{KachakaApi, KachakaApiServer};

/// Install a compact tracing subscriber for debugging a failing spec.
/// Safe to call from every test; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn ok_result() -> proto::Result {
    proto::Result { success: true, error_code: 0 }
}

/// Scriptable robot behavior shared with the running server.
pub struct RobotSim {
    pub serial: Mutex<String>,
    /// When set, pings fail with UNAVAILABLE while the server stays up.
    pub ping_down: AtomicBool,
    pub pose: Mutex<proto::Pose>,
    pub battery_percentage: Mutex<f64>,

    pub shelves: Mutex<Vec<proto::Shelf>>,
    pub locations: Mutex<Vec<proto::Location>>,
    pub error_definitions: Mutex<Vec<proto::ErrorCodeDefinition>>,

    /// Reject every started command with this error code.
    pub reject_code: Mutex<Option<i32>>,
    /// Completion countdown: the command finishes after this many state
    /// polls. Negative keeps it running forever.
    pub polls_until_done: AtomicI32,
    /// Whether the next completed command reports success.
    pub next_success: AtomicBool,
    /// Error code used when `next_success` is false.
    pub fail_code: AtomicI32,
    /// Every StartCommand request, in arrival order.
    pub started: Mutex<Vec<proto::StartCommandRequest>>,

    /// Moving-shelf readings; entries pop in order, the last is sticky.
    pub moving_shelf: Mutex<VecDeque<String>>,
    /// Fail this many camera captures before serving frames again.
    pub camera_failures: AtomicU32,
    pub detections: Mutex<Vec<proto::ObjectDetection>>,

    next_command: AtomicU64,
    current: Mutex<(i32, String)>,
    last_result: Mutex<(proto::Result, String)>,
}

impl Default for RobotSim {
    fn default() -> Self {
        Self {
            serial: Mutex::new("KCK-SIM-001".to_owned()),
            ping_down: AtomicBool::new(false),
            pose: Mutex::new(proto::Pose::default()),
            battery_percentage: Mutex::new(100.0),
            shelves: Mutex::new(Vec::new()),
            locations: Mutex::new(Vec::new()),
            error_definitions: Mutex::new(Vec::new()),
            reject_code: Mutex::new(None),
            polls_until_done: AtomicI32::new(3),
            next_success: AtomicBool::new(true),
            fail_code: AtomicI32::new(0),
            started: Mutex::new(Vec::new()),
            moving_shelf: Mutex::new(VecDeque::new()),
            camera_failures: AtomicU32::new(0),
            detections: Mutex::new(Vec::new()),
            next_command: AtomicU64::new(0),
            current: Mutex::new((proto::CommandState::Unspecified as i32, String::new())),
            last_result: Mutex::new((ok_result(), String::new())),
        }
    }
}

impl RobotSim {
    fn next_moving_shelf(&self) -> String {
        let mut queue = self.moving_shelf.lock();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        }
    }
}

struct SimService {
    sim: Arc<RobotSim>,
}

#[tonic::async_trait]
impl KachakaApi for SimService {
    async fn get_robot_serial_number(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetRobotSerialNumberResponse>, Status> {
        if self.sim.ping_down.load(Ordering::SeqCst) {
            return Err(Status::unavailable("simulated wifi drop"));
        }
        Ok(Response::new(proto::GetRobotSerialNumberResponse {
            serial_number: self.sim.serial.lock().clone(),
        }))
    }

    async fn get_robot_version(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetRobotVersionResponse>, Status> {
        Ok(Response::new(proto::GetRobotVersionResponse { version: "sim-2.6.0".to_owned() }))
    }

    async fn get_robot_pose(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetRobotPoseResponse>, Status> {
        if self.sim.ping_down.load(Ordering::SeqCst) {
            return Err(Status::unavailable("simulated wifi drop"));
        }
        Ok(Response::new(proto::GetRobotPoseResponse {
            pose: Some(self.sim.pose.lock().clone()),
        }))
    }

    async fn get_battery_info(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetBatteryInfoResponse>, Status> {
        Ok(Response::new(proto::GetBatteryInfoResponse {
            remaining_percentage: *self.sim.battery_percentage.lock(),
            power_supply_status: proto::PowerSupplyStatus::Discharging as i32,
        }))
    }

    async fn get_shelves(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetShelvesResponse>, Status> {
        Ok(Response::new(proto::GetShelvesResponse { shelves: self.sim.shelves.lock().clone() }))
    }

    async fn get_locations(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetLocationsResponse>, Status> {
        Ok(Response::new(proto::GetLocationsResponse {
            locations: self.sim.locations.lock().clone(),
        }))
    }

    async fn get_map_list(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetMapListResponse>, Status> {
        Ok(Response::new(proto::GetMapListResponse {
            map_list: vec![proto::MapListEntry { id: "map-1".to_owned(), name: "floor".to_owned() }],
        }))
    }

    async fn get_current_map_id(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetCurrentMapIdResponse>, Status> {
        Ok(Response::new(proto::GetCurrentMapIdResponse { id: "map-1".to_owned() }))
    }

    async fn get_png_map(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetPngMapResponse>, Status> {
        Ok(Response::new(proto::GetPngMapResponse {
            name: "floor".to_owned(),
            resolution: 0.05,
            width: 4,
            height: 4,
            data: vec![0x89, 0x50, 0x4E, 0x47],
        }))
    }

    async fn start_command(
        &self,
        request: Request<proto::StartCommandRequest>,
    ) -> Result<Response<proto::StartCommandResponse>, Status> {
        let request = request.into_inner();
        self.sim.started.lock().push(request);

        if let Some(code) = *self.sim.reject_code.lock() {
            return Ok(Response::new(proto::StartCommandResponse {
                result: Some(proto::Result { success: false, error_code: code }),
                command_id: String::new(),
            }));
        }

        let n = self.sim.next_command.fetch_add(1, Ordering::SeqCst) + 1;
        let command_id = format!("cmd-{n}");
        *self.sim.current.lock() =
            (proto::CommandState::Running as i32, command_id.clone());
        Ok(Response::new(proto::StartCommandResponse {
            result: Some(ok_result()),
            command_id,
        }))
    }

    async fn get_command_state(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetCommandStateResponse>, Status> {
        let sim = &self.sim;
        let mut current = sim.current.lock();
        if current.0 == proto::CommandState::Running as i32
            && sim.polls_until_done.load(Ordering::SeqCst) > 0
            && sim.polls_until_done.fetch_sub(1, Ordering::SeqCst) == 1
        {
            let success = sim.next_success.load(Ordering::SeqCst);
            let result = proto::Result {
                success,
                error_code: if success { 0 } else { sim.fail_code.load(Ordering::SeqCst) },
            };
            let command_id = current.1.clone();
            *sim.last_result.lock() = (result, command_id.clone());
            *current = (proto::CommandState::Unspecified as i32, command_id);
        }
        Ok(Response::new(proto::GetCommandStateResponse {
            state: current.0,
            command_id: current.1.clone(),
        }))
    }

    async fn get_last_command_result(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetLastCommandResultResponse>, Status> {
        let (result, command_id) = self.sim.last_result.lock().clone();
        Ok(Response::new(proto::GetLastCommandResultResponse {
            result: Some(result),
            command_id,
        }))
    }

    async fn is_command_running(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::IsCommandRunningResponse>, Status> {
        let running =
            self.sim.current.lock().0 == proto::CommandState::Running as i32;
        Ok(Response::new(proto::IsCommandRunningResponse { running }))
    }

    async fn cancel_command(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::CancelCommandResponse>, Status> {
        *self.sim.current.lock() =
            (proto::CommandState::Unspecified as i32, String::new());
        Ok(Response::new(proto::CancelCommandResponse { result: Some(ok_result()) }))
    }

    async fn proceed(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::ProceedResponse>, Status> {
        Ok(Response::new(proto::ProceedResponse { result: Some(ok_result()) }))
    }

    async fn get_moving_shelf_id(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetMovingShelfIdResponse>, Status> {
        Ok(Response::new(proto::GetMovingShelfIdResponse {
            shelf_id: self.sim.next_moving_shelf(),
        }))
    }

    async fn reset_shelf_pose(
        &self,
        _request: Request<proto::ResetShelfPoseRequest>,
    ) -> Result<Response<proto::ResetShelfPoseResponse>, Status> {
        Ok(Response::new(proto::ResetShelfPoseResponse { result: Some(ok_result()) }))
    }

    async fn get_robot_error_code(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetRobotErrorCodeResponse>, Status> {
        Ok(Response::new(proto::GetRobotErrorCodeResponse {
            definitions: self.sim.error_definitions.lock().clone(),
        }))
    }

    async fn get_error(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetErrorResponse>, Status> {
        Ok(Response::new(proto::GetErrorResponse { error_codes: Vec::new() }))
    }

    async fn get_front_camera_ros_compressed_image(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::RosCompressedImage>, Status> {
        self.capture()
    }

    async fn get_back_camera_ros_compressed_image(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::RosCompressedImage>, Status> {
        self.capture()
    }

    async fn get_object_detection(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetObjectDetectionResponse>, Status> {
        Ok(Response::new(proto::GetObjectDetectionResponse {
            objects: self.sim.detections.lock().clone(),
        }))
    }

    async fn get_speaker_volume(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetSpeakerVolumeResponse>, Status> {
        Ok(Response::new(proto::GetSpeakerVolumeResponse { volume: 5 }))
    }

    async fn set_manual_control_enabled(
        &self,
        _request: Request<proto::SetManualControlEnabledRequest>,
    ) -> Result<Response<proto::SetManualControlEnabledResponse>, Status> {
        Ok(Response::new(proto::SetManualControlEnabledResponse { result: Some(ok_result()) }))
    }

    async fn set_robot_velocity(
        &self,
        _request: Request<proto::SetRobotVelocityRequest>,
    ) -> Result<Response<proto::SetRobotVelocityResponse>, Status> {
        Ok(Response::new(proto::SetRobotVelocityResponse { result: Some(ok_result()) }))
    }

    async fn set_robot_stop(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::SetRobotStopResponse>, Status> {
        Ok(Response::new(proto::SetRobotStopResponse { result: Some(ok_result()) }))
    }

    async fn get_shortcuts(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetShortcutsResponse>, Status> {
        Ok(Response::new(proto::GetShortcutsResponse { shortcuts: Vec::new() }))
    }

    async fn get_history_list(
        &self,
        _request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetHistoryListResponse>, Status> {
        Ok(Response::new(proto::GetHistoryListResponse { histories: Vec::new() }))
    }
}

impl SimService {
    fn capture(&self) -> Result<Response<proto::RosCompressedImage>, Status> {
        if self.sim.ping_down.load(Ordering::SeqCst) {
            return Err(Status::unavailable("simulated wifi drop"));
        }
        let remaining = self.sim.camera_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.sim.camera_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Status::unavailable("camera offline"));
        }
        Ok(Response::new(proto::RosCompressedImage {
            format: "jpeg".to_owned(),
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
        }))
    }
}

/// A running robot double, shut down on drop.
pub struct MockRobot {
    target: String,
    pub sim: Arc<RobotSim>,
    cancel: CancellationToken,
}

impl MockRobot {
    /// Canonical `host:port` of the listening server.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Stop the server, severing every in-flight and future call.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for MockRobot {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn a robot double on an ephemeral loopback port.
pub async fn spawn_robot() -> anyhow::Result<MockRobot> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let sim = Arc::new(RobotSim::default());
    let cancel = CancellationToken::new();

    let service = KachakaApiServer::new(SimService { sim: Arc::clone(&sim) });
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let incoming = TcpListenerStream::new(listener);
        let _ = tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(incoming, shutdown.cancelled_owned())
            .await;
    });

    Ok(MockRobot { target: format!("127.0.0.1:{}", addr.port()), sim, cancel })
}

/// Seed a shelf and a location so resolver-dependent flows work.
pub fn seed_inventory(sim: &RobotSim) {
    sim.shelves.lock().push(proto::Shelf {
        id: "S01".to_owned(),
        name: "pantry shelf".to_owned(),
        home_location_id: "L02".to_owned(),
    });
    sim.locations.lock().push(proto::Location {
        id: "L01".to_owned(),
        name: "kitchen".to_owned(),
        r#type: proto::LocationType::Unspecified as i32,
        pose: Some(proto::Pose { x: 1.0, y: 2.0, theta: 0.0 }),
    });
    sim.locations.lock().push(proto::Location {
        id: "L02".to_owned(),
        name: "dock".to_owned(),
        r#type: proto::LocationType::ShelfHome as i32,
        pose: Some(proto::Pose::default()),
    });
}
