// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential-backoff retry for unary RPC calls.
//!
//! Two operating modes:
//! - **Count mode** (no deadline): up to `max_attempts` attempts.
//! - **Deadline mode** (deadline set): attempts until the wall clock passes
//!   the deadline; `max_attempts` is ignored. Sleeps are clamped to the
//!   remaining time so the policy terminates within one sleep quantum of
//!   the deadline.
//!
//! Only transient statuses (UNAVAILABLE, DEADLINE_EXCEEDED,
//! RESOURCE_EXHAUSTED) are retried; anything else returns immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tonic::Status;

use crate::error::{code_name, format_status, is_retryable, RpcFailure};

/// Retry policy for a single logical operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt budget in count mode (including the first call).
    pub max_attempts: u32,
    /// Initial backoff delay.
    pub base_delay: Duration,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
    /// Absolute cutoff. When set, the policy runs in deadline mode.
    pub deadline: Option<Instant>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Deadline-mode policy with the given cutoff and base delay.
    pub fn until(deadline: Instant, base_delay: Duration) -> Self {
        Self { deadline: Some(deadline), base_delay, ..Self::default() }
    }

    /// Backoff before the next attempt: `min(base · 2^(attempt−1), max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` under this policy.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        match self.deadline {
            None => self.run_counted(&mut op).await,
            Some(deadline) => self.run_until(deadline, &mut op).await,
        }
    }

    async fn run_counted<T, F, Fut>(&self, op: &mut F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(status) if !is_retryable(status.code()) => {
                    tracing::warn!(
                        code = code_name(status.code()),
                        details = status.message(),
                        "non-retryable status"
                    );
                    return Err(RetryError::Permanent(status));
                }
                Err(status) => {
                    if attempt >= self.max_attempts {
                        return Err(RetryError::Exhausted { last: status, attempts: attempt });
                    }
                    let delay = self.backoff(attempt);
                    tracing::info!(
                        code = code_name(status.code()),
                        delay_ms = delay.as_millis() as u64,
                        attempt,
                        max_attempts = self.max_attempts,
                        "transient status, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_until<T, F, Fut>(&self, deadline: Instant, op: &mut F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let mut attempt = 0;
        let mut last: Option<Status> = None;
        while Instant::now() < deadline {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(status) if !is_retryable(status.code()) => {
                    tracing::warn!(
                        code = code_name(status.code()),
                        details = status.message(),
                        "non-retryable status"
                    );
                    return Err(RetryError::Permanent(status));
                }
                Err(status) => {
                    tracing::debug!(
                        code = code_name(status.code()),
                        attempt,
                        "transient status under deadline"
                    );
                    last = Some(status);
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    tokio::time::sleep(self.backoff(attempt).min(remaining)).await;
                }
            }
        }
        match last {
            Some(last) => Err(RetryError::Exhausted { last, attempts: attempt }),
            None => Err(RetryError::NoAttempt),
        }
    }
}

/// Terminal outcome of a retried operation.
#[derive(Debug)]
pub enum RetryError {
    /// Non-retryable status, surfaced after the first occurrence.
    Permanent(Status),
    /// Transient statuses until the attempt or time budget ran out.
    Exhausted { last: Status, attempts: u32 },
    /// The deadline elapsed before a single attempt could be issued.
    NoAttempt,
}

impl RetryError {
    pub fn retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permanent(status) | Self::Exhausted { last: status, .. } => {
                f.write_str(&format_status(status))
            }
            Self::NoAttempt => f.write_str("deadline exceeded without any attempt"),
        }
    }
}

impl std::error::Error for RetryError {}

impl From<RetryError> for RpcFailure {
    fn from(err: RetryError) -> Self {
        Self {
            ok: false,
            error: err.to_string(),
            retryable: err.retryable(),
            attempts: err.attempts(),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
