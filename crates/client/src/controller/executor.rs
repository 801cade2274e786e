// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command execution engine.
//!
//! Starting a command on the robot and trusting the next "finished" signal
//! is not enough: a later command can displace ours server-side, and the
//! last-result slot may still hold a stale entry. The executor therefore
//! verifies the command id at every step — it never reports success unless
//! the final result carries the id it started.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::connection::ConnectionState;
use crate::error::describe_error;
use crate::retry::RetryPolicy;
use crate::transport::api::RobotApi;
use crate::transport::proto;

use super::command::{Command, CommandOptions, CommandResult};
use super::RobotController;

/// How long to wait for the server to adopt our command id as current.
const REGISTRATION_WINDOW: Duration = Duration::from_secs(5);
/// Poll cadence during the registration wait.
const REGISTRATION_CADENCE: Duration = Duration::from_millis(200);

fn is_active(state: proto::CommandState) -> bool {
    matches!(state, proto::CommandState::Running | proto::CommandState::Pending)
}

/// Per-call deadline override for lifecycle RPCs: the transport default
/// applies unless the remaining command budget is shorter, so no single
/// call can outlive the overall deadline.
fn call_deadline(deadline: Instant, default: Duration) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    (remaining < default).then_some(remaining)
}

impl RobotController {
    /// Start `command` on the robot and poll until completion, displacement,
    /// or the wall-clock `timeout`.
    ///
    /// Not re-entrant: callers must serialize command execution on one
    /// controller.
    pub async fn execute_command(
        &self,
        command: Command,
        target: Option<String>,
        timeout: Duration,
        opts: CommandOptions,
    ) -> CommandResult {
        let action = command.action();
        let started = Instant::now();
        let deadline = started + timeout;

        // 1. Disconnect gate: a command started into a dead link would burn
        // its whole budget on transport timeouts.
        if self.conn.state() == ConnectionState::Disconnected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.conn.wait_for_state(ConnectionState::Connected, Some(remaining)).await {
                return CommandResult::disconnected(action, target, started.elapsed());
            }
        }

        let api = match self.conn.api().await {
            Ok(api) => api,
            Err(e) => {
                return CommandResult::failure(action, target, e.to_string(), started.elapsed())
            }
        };

        let policy = RetryPolicy::until(deadline, self.config.retry_delay());
        let call_budget = self.conn.config().call_timeout();

        // 2. Start the command, retrying transient faults until the deadline.
        let proto_command = command.into_proto();
        let start = policy
            .run(|| {
                let api = Arc::clone(&api);
                let command = proto_command.clone();
                let opts = opts.clone();
                let per_call = call_deadline(deadline, call_budget);
                async move {
                    api.start_command(
                        command,
                        opts.cancel_all,
                        opts.tts_on_success,
                        opts.title,
                        per_call,
                    )
                    .await
                }
            })
            .await;
        let (accepted, command_id) = match start {
            Ok(response) => response,
            Err(e) => {
                return CommandResult::failure(action, target, e.to_string(), started.elapsed())
            }
        };
        if !accepted.success {
            let error = describe_error(&api, accepted.error_code).await;
            return CommandResult::rejected(
                action,
                target,
                accepted.error_code,
                error,
                started.elapsed(),
            );
        }

        // 3. Registration wait: confirm the server adopted our id before
        // trusting completion signals. Unconfirmed registration is not
        // fatal — the result phase detects completion by other means.
        let reg_deadline = (Instant::now() + REGISTRATION_WINDOW).min(deadline);
        let mut registered = false;
        while Instant::now() < reg_deadline {
            if let Ok((state, current_id)) =
                api.get_command_state(call_deadline(deadline, call_budget)).await
            {
                if current_id == command_id && is_active(state) {
                    registered = true;
                    break;
                }
            }
            tokio::time::sleep(REGISTRATION_CADENCE).await;
        }
        if !registered {
            tracing::debug!(command_id = %command_id, "registration not confirmed within window");
        }

        // 4. Main polling loop.
        while Instant::now() < deadline {
            self.shared.metrics.lock().poll_count += 1;
            let poll_started = Instant::now();
            let polled = api.get_command_state(call_deadline(deadline, call_budget)).await;
            let (state, current_id) = match polled {
                Ok(value) => {
                    let rtt_ms = poll_started.elapsed().as_secs_f64() * 1000.0;
                    self.shared.metrics.lock().record_success(rtt_ms);
                    value
                }
                Err(e) => {
                    self.shared.metrics.lock().record_failure();
                    tracing::debug!(err = %e, "command state poll failed");
                    tokio::time::sleep(self.config.poll_interval()).await;
                    continue;
                }
            };

            if self.shared.monitoring_shelf.load(Ordering::Relaxed) {
                self.poll_shelf_monitor(&api).await;
            }

            // 5. Completion: our command left RUNNING/PENDING, or a newer
            // command displaced it.
            if !is_active(state) || current_id != command_id {
                let fetched = policy
                    .run(|| {
                        let api = Arc::clone(&api);
                        let per_call = call_deadline(deadline, call_budget);
                        async move { api.get_last_command_result(per_call).await }
                    })
                    .await;
                let (result, result_id) = match fetched {
                    Ok(value) => value,
                    Err(e) => {
                        return CommandResult::failure(
                            action,
                            target,
                            e.to_string(),
                            started.elapsed(),
                        )
                    }
                };
                if result_id == command_id {
                    if result.success {
                        return CommandResult::success(action, target, started.elapsed());
                    }
                    let error = describe_error(&api, result.error_code).await;
                    return CommandResult::rejected(
                        action,
                        target,
                        result.error_code,
                        error,
                        started.elapsed(),
                    );
                }
                // Stale result from an earlier command; ours may still land.
                tracing::debug!(
                    ours = %command_id,
                    got = %result_id,
                    "command id mismatch on last result, continuing poll"
                );
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }

        // 6. Out of budget.
        CommandResult::timed_out(action, target, timeout)
    }

    /// One shelf-monitor observation: a non-empty → empty transition of the
    /// moving-shelf id means the shelf was lost in transit.
    async fn poll_shelf_monitor(&self, api: &Arc<dyn RobotApi>) {
        let current = match api.get_moving_shelf_id().await {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(err = %e, "shelf monitor poll failed");
                return;
            }
        };

        let mut dropped_shelf = None;
        {
            let mut state = self.shared.state.lock();
            let prev = state.moving_shelf_id.clone();
            state.moving_shelf_id =
                if current.is_empty() { None } else { Some(current.clone()) };
            if let Some(prev) = prev {
                if current.is_empty() {
                    state.shelf_dropped = true;
                    dropped_shelf = Some(prev);
                }
            }
        }

        if let Some(shelf_id) = dropped_shelf {
            tracing::warn!(shelf_id = %shelf_id, "shelf dropped during command");
            self.shared.monitoring_shelf.store(false, Ordering::Relaxed);
            if let Some(listener) = &self.shared.on_shelf_dropped {
                let listener = Arc::clone(listener);
                crate::listener::invoke("on_shelf_dropped", move || listener(&shelf_id));
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
