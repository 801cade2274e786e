// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Robot RPC transport: generated protobuf types, the [`api::RobotApi`]
//! call surface, and the deadline-injecting gRPC implementation.

pub mod api;
pub mod grpc;

/// Generated protobuf types for the `kachaka.v1` package.
pub mod proto {
    tonic::include_proto!("kachaka.v1");
}
