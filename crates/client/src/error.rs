// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC fault taxonomy: transient vs permanent statuses, display helpers,
//! and server-side error-code description lookup.

use std::sync::Arc;

use serde::Serialize;
use tonic::{Code, Status};

use crate::transport::api::RobotApi;

/// Statuses that are safe to retry (transient network faults).
pub const RETRYABLE_CODES: [Code; 3] =
    [Code::Unavailable, Code::DeadlineExceeded, Code::ResourceExhausted];

/// Return true if a status code denotes a transient fault worth retrying.
pub fn is_retryable(code: Code) -> bool {
    RETRYABLE_CODES.contains(&code)
}

/// Wire name of a status code, e.g. `UNAVAILABLE`.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

/// Render a status as `CODE: details` for caller-facing error strings.
pub fn format_status(status: &Status) -> String {
    format!("{}: {}", code_name(status.code()), status.message())
}

/// Structured failure surfaced at every public entry point.
///
/// Serializes to the `{ok: false, error, retryable, attempts?}` shape the
/// façade forwards to callers.
#[derive(Debug, Clone, Serialize)]
pub struct RpcFailure {
    pub ok: bool,
    pub error: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl RpcFailure {
    /// Failure from a single (unretried) status.
    pub fn from_status(status: &Status) -> Self {
        Self {
            ok: false,
            error: format_status(status),
            retryable: is_retryable(status.code()),
            attempts: None,
        }
    }

    /// Client-side failure that never reached the wire.
    pub fn internal(error: impl Into<String>) -> Self {
        Self { ok: false, error: error.into(), retryable: false, attempts: None }
    }
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}

impl std::error::Error for RpcFailure {}

/// Compose `error_code=N: <title>` for a server-side command rejection.
///
/// Fetches the robot's error catalog and prefers the English title. Catalog
/// failures degrade to the bare `error_code=N` form.
pub(crate) async fn describe_error(api: &Arc<dyn RobotApi>, error_code: i32) -> String {
    match api.get_robot_error_codes().await {
        Ok(definitions) => {
            let title = definitions.iter().find(|d| d.code == error_code).map(|d| {
                if d.title_en.is_empty() { d.title.clone() } else { d.title_en.clone() }
            });
            match title {
                Some(title) if !title.is_empty() => format!("error_code={error_code}: {title}"),
                _ => format!("error_code={error_code}"),
            }
        }
        Err(e) => {
            tracing::debug!(error_code, err = %e, "error catalog fetch failed");
            format!("error_code={error_code}")
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
