// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object detection queries and the annotator contract.
//!
//! Wraps the robot's on-device detector. Annotation itself is an external
//! concern; this module only fixes the data contract the annotator
//! consumes: raw JPEG bytes plus [`DetectionRecord`]s in, annotated JPEG
//! bytes out.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::camera::{epoch_ms, Frame};
use crate::connection::Connection;
use crate::error::RpcFailure;
use crate::retry::RetryPolicy;
use crate::transport::api::CameraSide;
use crate::transport::proto;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Detection class reported by the on-device detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionLabel {
    Unknown,
    Person,
    Shelf,
    Charger,
    Door,
}

impl DetectionLabel {
    pub fn from_id(label_id: u32) -> Self {
        match label_id {
            1 => Self::Person,
            2 => Self::Shelf,
            3 => Self::Charger,
            4 => Self::Door,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Person => "person",
            Self::Shelf => "shelf",
            Self::Charger => "charger",
            Self::Door => "door",
        }
    }
}

/// Bounding box in image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One structured detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub label: DetectionLabel,
    pub label_id: u32,
    pub roi: Roi,
    /// Confidence in [0, 1], rounded to four digits.
    pub score: f64,
    /// Median distance in metres; absent when the sensor reports none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl DetectionRecord {
    pub(crate) fn from_proto(obj: &proto::ObjectDetection) -> Self {
        let roi = obj.roi.clone().unwrap_or_default();
        Self {
            label: DetectionLabel::from_id(obj.label),
            label_id: obj.label,
            roi: Roi {
                x: roi.x_offset,
                y: roi.y_offset,
                width: roi.width,
                height: roi.height,
            },
            score: round_to(f64::from(obj.score), 4),
            distance: (obj.distance_median > 0.0).then(|| round_to(obj.distance_median, 3)),
        }
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Bounding-box renderer supplied by the embedder.
pub trait FrameAnnotator: Send + Sync {
    /// Draw `objects` over raw JPEG bytes, returning annotated JPEG bytes.
    fn annotate(&self, image: &[u8], objects: &[DetectionRecord]) -> anyhow::Result<Bytes>;
}

/// Stateless detection queries for one robot.
pub struct ObjectDetector {
    conn: Arc<Connection>,
}

impl ObjectDetector {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    /// Current detection records.
    pub async fn get_detections(&self) -> Result<Vec<DetectionRecord>, RpcFailure> {
        let api = self.conn.api().await.map_err(|e| RpcFailure::internal(e.to_string()))?;
        let objects = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move { api.get_object_detection().await }
            })
            .await?;
        Ok(objects.iter().map(DetectionRecord::from_proto).collect())
    }

    /// One camera frame plus detections, fetched as a unit so the records
    /// describe the returned image.
    pub async fn capture_with_detections(
        &self,
        camera: CameraSide,
    ) -> Result<Frame, RpcFailure> {
        let api = self.conn.api().await.map_err(|e| RpcFailure::internal(e.to_string()))?;
        let (image, objects) = RetryPolicy::default()
            .run(|| {
                let api = Arc::clone(&api);
                async move {
                    let image = api.get_camera_image(camera).await?;
                    let objects = api.get_object_detection().await?;
                    Ok((image, objects))
                }
            })
            .await?;
        Ok(Frame {
            ok: true,
            image_base64: BASE64.encode(&image.data),
            format: if image.format.is_empty() { "jpeg".to_owned() } else { image.format },
            timestamp_ms: epoch_ms(),
            objects: Some(objects.iter().map(DetectionRecord::from_proto).collect()),
        })
    }
}

#[cfg(test)]
#[path = "detection_tests.rs"]
mod tests;
