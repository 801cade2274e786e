// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background camera sampler.
//!
//! One task per streamer grabs a JPEG frame every tick, base64-encodes it,
//! optionally attaches object detections and annotation, and publishes the
//! latest frame for lock-protected retrieval. Capture faults are counted
//! and swallowed; the task only exits on `stop()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::CameraConfig;
use crate::connection::{Connection, ConnectionState};
use crate::detection::{DetectionRecord, FrameAnnotator, ObjectDetector};

/// Current epoch millis.
pub(crate) fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One published camera frame.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub ok: bool,
    pub image_base64: String,
    pub format: String,
    pub timestamp_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<DetectionRecord>>,
}

/// Stream statistics, including reconnect recovery latency.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStats {
    pub total_frames: u64,
    pub dropped: u64,
    pub drop_rate_percent: f64,
    pub longest_gap_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_latency_ms: Option<f64>,
}

/// Callback fired with each published frame, on the sampler task.
pub type FrameListener = Arc<dyn Fn(&Frame) + Send + Sync>;

#[derive(Default)]
struct RecoveryTimes {
    last_success: Option<Instant>,
    longest_gap: Duration,
    reconnect_mark: Option<Instant>,
    recovery_latency: Option<Duration>,
}

struct CameraShared {
    latest_frame: parking_lot::Mutex<Option<Frame>>,
    latest_detections: parking_lot::Mutex<Option<Vec<DetectionRecord>>>,
    total_frames: AtomicU64,
    dropped: AtomicU64,
    recovery: parking_lot::Mutex<RecoveryTimes>,
}

impl CameraShared {
    fn record_success(&self, now: Instant) {
        let mut recovery = self.recovery.lock();
        if let Some(last) = recovery.last_success {
            let gap = now.saturating_duration_since(last);
            if gap > recovery.longest_gap {
                recovery.longest_gap = gap;
            }
        }
        if recovery.recovery_latency.is_none() {
            if let Some(mark) = recovery.reconnect_mark.take() {
                recovery.recovery_latency = Some(now.saturating_duration_since(mark));
            }
        }
        recovery.last_success = Some(now);
    }
}

struct CameraTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic camera capture bound to one connection.
pub struct CameraStreamer {
    conn: Arc<Connection>,
    config: CameraConfig,
    annotator: Option<Arc<dyn FrameAnnotator>>,
    on_frame: Option<FrameListener>,
    shared: Arc<CameraShared>,
    task: parking_lot::Mutex<Option<CameraTask>>,
}

impl CameraStreamer {
    pub fn new(
        conn: Arc<Connection>,
        mut config: CameraConfig,
        annotator: Option<Arc<dyn FrameAnnotator>>,
        on_frame: Option<FrameListener>,
    ) -> Self {
        // Annotation only makes sense over detections.
        if config.annotate {
            config.detect = true;
        }
        Self {
            conn,
            config,
            annotator,
            on_frame,
            shared: Arc::new(CameraShared {
                latest_frame: parking_lot::Mutex::new(None),
                latest_detections: parking_lot::Mutex::new(None),
                total_frames: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                recovery: parking_lot::Mutex::new(RecoveryTimes::default()),
            }),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Start the capture task. No-op if already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = spawn_capture_task(
            Arc::clone(&self.conn),
            self.config.clone(),
            self.annotator.clone(),
            self.on_frame.clone(),
            Arc::clone(&self.shared),
            cancel.clone(),
        );
        *task = Some(CameraTask { cancel, handle });
        tracing::info!(
            robot = %self.conn.target(),
            camera = %self.config.camera,
            interval_ms = self.config.interval_ms,
            "camera streamer started"
        );
    }

    /// Signal the capture task to stop and join it within a bounded
    /// timeout. Returns within roughly one tick.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else { return };
        task.cancel.cancel();
        let join_timeout = self.config.interval().saturating_mul(3).max(Duration::from_secs(1));
        if tokio::time::timeout(join_timeout, task.handle).await.is_err() {
            tracing::warn!(robot = %self.conn.target(), "camera streamer did not stop within timeout");
        } else {
            tracing::info!(robot = %self.conn.target(), "camera streamer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Most recently captured frame.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared.latest_frame.lock().clone()
    }

    /// Most recent detection records. Requires `detect`.
    pub fn latest_detections(&self) -> Option<Vec<DetectionRecord>> {
        self.shared.latest_detections.lock().clone()
    }

    /// Receive health transitions from the connection's monitoring.
    ///
    /// A CONNECTED transition marks the reconnect instant so the next
    /// successful capture can compute recovery latency. The streamer does
    /// not run its own monitoring; wire this to
    /// [`Connection::start_monitoring`].
    pub fn notify_state_change(&self, state: ConnectionState) {
        if state == ConnectionState::Connected {
            self.shared.recovery.lock().reconnect_mark = Some(Instant::now());
        }
    }

    /// Capture statistics.
    pub fn stats(&self) -> StreamStats {
        let total = self.shared.total_frames.load(Ordering::Relaxed);
        let dropped = self.shared.dropped.load(Ordering::Relaxed);
        let drop_rate = if total > 0 { dropped as f64 / total as f64 * 100.0 } else { 0.0 };
        let recovery = self.shared.recovery.lock();
        StreamStats {
            total_frames: total,
            dropped,
            drop_rate_percent: drop_rate,
            longest_gap_seconds: (recovery.longest_gap.as_secs_f64() * 1000.0).round() / 1000.0,
            recovery_latency_ms: recovery
                .recovery_latency
                .map(|d| (d.as_secs_f64() * 10_000.0).round() / 10.0),
        }
    }
}

fn spawn_capture_task(
    conn: Arc<Connection>,
    config: CameraConfig,
    annotator: Option<Arc<dyn FrameAnnotator>>,
    on_frame: Option<FrameListener>,
    shared: Arc<CameraShared>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let detector = config.detect.then(|| ObjectDetector::new(Arc::clone(&conn)));

        loop {
            shared.total_frames.fetch_add(1, Ordering::Relaxed);

            match capture_once(&conn, &config, detector.as_ref(), annotator.as_deref()).await {
                Ok(frame) => {
                    {
                        *shared.latest_frame.lock() = Some(frame.clone());
                        if let Some(objects) = &frame.objects {
                            *shared.latest_detections.lock() = Some(objects.clone());
                        }
                    }
                    if let Some(listener) = &on_frame {
                        let listener = Arc::clone(listener);
                        let published = frame.clone();
                        crate::listener::invoke("on_frame", move || listener(&published));
                    }
                    shared.record_success(Instant::now());
                }
                Err(e) => {
                    let dropped = shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::debug!(
                        robot = %conn.target(),
                        camera = %config.camera,
                        dropped,
                        err = %e,
                        "camera capture failed"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.interval()) => {}
            }
        }
    })
}

/// One capture tick. Detection and annotation faults are logged and never
/// suppress the frame itself.
async fn capture_once(
    conn: &Arc<Connection>,
    config: &CameraConfig,
    detector: Option<&ObjectDetector>,
    annotator: Option<&dyn FrameAnnotator>,
) -> anyhow::Result<Frame> {
    let api = conn.api().await?;
    let image = api.get_camera_image(config.camera).await?;

    let mut image_base64 = BASE64.encode(&image.data);

    let objects = match detector {
        Some(detector) => match detector.get_detections().await {
            Ok(objects) => Some(objects),
            Err(e) => {
                tracing::debug!(err = %e, "detection failed in streamer");
                None
            }
        },
        None => None,
    };

    if config.annotate {
        if let (Some(annotator), Some(objects)) = (annotator, objects.as_ref()) {
            if !objects.is_empty() {
                match annotator.annotate(&image.data, objects) {
                    Ok(annotated) => image_base64 = BASE64.encode(&annotated),
                    Err(e) => tracing::debug!(err = %e, "annotation failed in streamer"),
                }
            }
        }
    }

    Ok(Frame {
        ok: true,
        image_base64,
        format: if image.format.is_empty() { "jpeg".to_owned() } else { image.format },
        timestamp_ms: epoch_ms(),
        objects,
    })
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
