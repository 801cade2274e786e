// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct robot operations outside the command lifecycle: cancel, proceed,
//! manual velocity control, emergency stop, and completion polling.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::connection::Connection;
use crate::error::{describe_error, format_status, RpcFailure};
use crate::retry::RetryPolicy;
use crate::transport::api::RobotApi;
use crate::transport::proto;

/// Velocity clamp: the robot refuses faster manual commands.
pub const MAX_LINEAR_VELOCITY: f64 = 0.3;
pub const MAX_ANGULAR_VELOCITY: f64 = 1.57;

/// Acknowledgement of a direct operation.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub ok: bool,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    async fn from_result(
        api: &Arc<dyn RobotApi>,
        result: proto::Result,
        action: &str,
        target: Option<String>,
    ) -> Self {
        if result.success {
            Self {
                ok: true,
                action: action.to_owned(),
                target,
                error_code: None,
                error: None,
            }
        } else {
            let error = describe_error(api, result.error_code).await;
            Self {
                ok: false,
                action: action.to_owned(),
                target,
                error_code: Some(result.error_code),
                error: Some(error),
            }
        }
    }
}

/// Final state reported by [`RobotCommands::poll_until_complete`].
#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

/// Direct command surface for one robot.
pub struct RobotCommands {
    conn: Arc<Connection>,
}

impl RobotCommands {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    async fn api(&self) -> Result<Arc<dyn RobotApi>, RpcFailure> {
        self.conn.api().await.map_err(|e| RpcFailure::internal(e.to_string()))
    }

    /// Cancel whatever command the robot is running.
    pub async fn cancel_command(&self) -> Result<Ack, RpcFailure> {
        let api = self.api().await?;
        let result = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.cancel_command().await }
            })
            .await?;
        Ok(Ack::from_result(&api, result, "cancel_command", None).await)
    }

    /// Resume a command waiting for user confirmation.
    pub async fn proceed(&self) -> Result<Ack, RpcFailure> {
        let api = self.api().await?;
        let result = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.proceed().await }
            })
            .await?;
        Ok(Ack::from_result(&api, result, "proceed", None).await)
    }

    /// Enable or disable manual velocity control mode.
    pub async fn set_manual_control(&self, enabled: bool) -> Result<Ack, RpcFailure> {
        let api = self.api().await?;
        let result = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.set_manual_control_enabled(enabled).await }
            })
            .await?;
        Ok(Ack::from_result(&api, result, "set_manual_control", Some(enabled.to_string())).await)
    }

    /// Send one velocity command (requires manual-control mode). Inputs are
    /// clamped to the robot's limits.
    pub async fn set_velocity(&self, linear: f64, angular: f64) -> Result<Ack, RpcFailure> {
        let linear = linear.clamp(-MAX_LINEAR_VELOCITY, MAX_LINEAR_VELOCITY);
        let angular = angular.clamp(-MAX_ANGULAR_VELOCITY, MAX_ANGULAR_VELOCITY);
        let api = self.api().await?;
        let result = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.set_robot_velocity(linear, angular).await }
            })
            .await?;
        Ok(Ack::from_result(
            &api,
            result,
            "set_velocity",
            Some(format!("lin={linear}, ang={angular}")),
        )
        .await)
    }

    /// Emergency stop: zero velocity, manual control off. Issued once,
    /// unretried, bounded only by the transport deadline.
    pub async fn stop(&self) -> Ack {
        let api = match self.conn.api().await {
            Ok(api) => api,
            Err(e) => {
                return Ack {
                    ok: false,
                    action: "stop".to_owned(),
                    target: None,
                    error_code: None,
                    error: Some(e.to_string()),
                }
            }
        };
        match api.set_robot_stop().await {
            Ok(result) => Ack::from_result(&api, result, "stop", None).await,
            Err(status) => Ack {
                ok: false,
                action: "stop".to_owned(),
                target: None,
                error_code: None,
                error: Some(format_status(&status)),
            },
        }
    }

    /// Block until the current command finishes or `timeout` expires.
    pub async fn poll_until_complete(&self, timeout: Duration, interval: Duration) -> PollOutcome {
        let started = Instant::now();
        let api = match self.conn.api().await {
            Ok(api) => api,
            Err(e) => {
                return PollOutcome {
                    ok: false,
                    error_code: None,
                    command_id: None,
                    elapsed: None,
                    error: Some(e.to_string()),
                    timeout: None,
                }
            }
        };

        while started.elapsed() < timeout {
            match api.is_command_running().await {
                Ok(false) => match api.get_last_command_result(None).await {
                    Ok((result, command_id)) => {
                        let elapsed = (started.elapsed().as_secs_f64() * 10.0).round() / 10.0;
                        return PollOutcome {
                            ok: result.success,
                            error_code: Some(result.error_code),
                            command_id: (!command_id.is_empty()).then_some(command_id),
                            elapsed: Some(elapsed),
                            error: None,
                            timeout: None,
                        }
                    }
                    Err(status) => {
                        tracing::debug!(err = %status, "last-result poll failed");
                    }
                },
                Ok(true) => {}
                Err(status) => {
                    tracing::debug!(err = %status, "completion poll failed");
                }
            }
            tokio::time::sleep(interval).await;
        }

        PollOutcome {
            ok: false,
            error_code: None,
            command_id: None,
            elapsed: None,
            error: Some("timeout".to_owned()),
            timeout: Some(timeout.as_secs_f64()),
        }
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
