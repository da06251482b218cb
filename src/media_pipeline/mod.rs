//! MediaPipelineClient - Upload/Process Workflow
//!
//! ## Responsibilities
//!
//! - Stage 1: upload a video file to the analysis backend (multipart)
//! - Stage 2: request processing of the uploaded file by name
//! - On success, hand the resulting batch to the aggregator exactly
//!   once and apply the batch outcome to the target room
//! - Report failures as typed, stage-specific errors
//!
//! Stage 2 only runs after stage 1 fully succeeds, and the aggregator
//! is only touched after both stages succeed: a failure at either stage
//! leaves the displayed alert history and room status exactly as they
//! were. No automatic retries; the caller decides whether to resubmit.
//!
//! The workflow is an explicit state machine
//! (Idle -> Uploading -> Processing -> Succeeded | Failed). A second
//! `run` while one is in flight is rejected with `Busy` instead of
//! racing the first on shared state.

use crate::alert_aggregator::AlertAggregator;
use crate::error::Result;
use crate::models::{Alert, AlertSummary, Severity};
use crate::room_registry::{RoomId, RoomRegistry, RoomStatus};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default request timeout. Processing runs the full video analysis
/// synchronously on the server, so this is much longer than a typical
/// API timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Uploading,
    Processing,
    Succeeded,
    Failed,
}

impl PipelineState {
    fn is_in_flight(&self) -> bool {
        matches!(self, PipelineState::Uploading | PipelineState::Processing)
    }
}

/// Workflow failure, split by stage and by fault class: `*Failed` means
/// the request never reached a server decision (transport/infrastructure),
/// `*Rejected` means the server explicitly declined (content/validation).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Not a video file; rejected before any network call
    #[error("Not a video file: {0}")]
    NotVideo(String),

    /// Unknown target room; rejected before any network call
    #[error("Unknown room: {0}")]
    UnknownRoom(RoomId),

    /// Could not read the video from disk
    #[error("Failed to read video file: {0}")]
    Read(String),

    /// Another upload/process run is still in flight
    #[error("A video workflow is already in flight")]
    Busy,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Processing rejected: {0}")]
    ProcessingRejected(String),
}

/// Successful workflow outcome
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub total_alerts: usize,
    pub summary: AlertSummary,
    pub room_status: RoomStatus,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    success: bool,
    #[serde(default)]
    alerts: Vec<Alert>,
    #[serde(default)]
    summary: AlertSummary,
    #[serde(default)]
    error: Option<String>,
}

/// Video extensions accepted for upload
fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "mp4" | "avi" | "mov" | "mkv" | "webm" | "m4v"
            )
        })
        .unwrap_or(false)
}

fn video_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("m4v") => "video/x-m4v",
        _ => "application/octet-stream",
    }
}

/// Upload/process workflow client
pub struct MediaPipelineClient {
    client: reqwest::Client,
    base_url: String,
    aggregator: Arc<AlertAggregator>,
    registry: Arc<RoomRegistry>,
    state: Mutex<PipelineState>,
}

impl MediaPipelineClient {
    /// Create a new pipeline client
    pub fn new(
        base_url: String,
        aggregator: Arc<AlertAggregator>,
        registry: Arc<RoomRegistry>,
    ) -> Result<Self> {
        Self::with_timeout(base_url, aggregator, registry, DEFAULT_TIMEOUT)
    }

    /// Create a new pipeline client with a custom request timeout
    pub fn with_timeout(
        base_url: String,
        aggregator: Arc<AlertAggregator>,
        registry: Arc<RoomRegistry>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            aggregator,
            registry,
            state: Mutex::new(PipelineState::Idle),
        })
    }

    /// Current workflow state
    pub fn state(&self) -> PipelineState {
        *self.state.lock().expect("pipeline state lock poisoned")
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().expect("pipeline state lock poisoned") = state;
    }

    /// Claim the workflow for a new run, rejecting overlap
    fn claim(&self) -> std::result::Result<(), PipelineError> {
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        if state.is_in_flight() {
            return Err(PipelineError::Busy);
        }
        *state = PipelineState::Uploading;
        Ok(())
    }

    /// Check the analysis backend is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Run the two-stage workflow for a video file against a room.
    ///
    /// Validation (file type, room id) happens before any network call.
    /// On success the aggregator's log and counters are replaced with
    /// the batch and the room escalates to `Alert` if any batch alert
    /// is HIGH, else `Warning` (the live stream additionally escalates
    /// on CRITICAL; the batch rule keys on HIGH alone).
    pub async fn run(
        &self,
        path: &Path,
        target_room: RoomId,
    ) -> std::result::Result<BatchReport, PipelineError> {
        if !is_video_file(path) {
            return Err(PipelineError::NotVideo(path.display().to_string()));
        }
        self.registry
            .get(target_room)
            .map_err(|_| PipelineError::UnknownRoom(target_room))?;

        self.claim()?;

        let result = self.run_stages(path, target_room).await;
        match &result {
            Ok(report) => {
                self.set_state(PipelineState::Succeeded);
                tracing::info!(
                    room_id = target_room,
                    total_alerts = report.total_alerts,
                    room_status = %report.room_status,
                    "Video workflow succeeded"
                );
            }
            Err(e) => {
                self.set_state(PipelineState::Failed);
                tracing::warn!(
                    room_id = target_room,
                    error = %e,
                    "Video workflow failed"
                );
            }
        }
        result
    }

    async fn run_stages(
        &self,
        path: &Path,
        target_room: RoomId,
    ) -> std::result::Result<BatchReport, PipelineError> {
        let filename = self.upload(path).await?;

        self.set_state(PipelineState::Processing);
        let response = self.process(&filename).await?;

        // Both stages succeeded: the one and only mutation point
        let has_high = response.alerts.iter().any(|a| a.severity == Severity::High);
        let total_alerts = response.alerts.len();
        self.aggregator.replace_all(response.alerts, response.summary);
        let room_status = self
            .registry
            .apply_batch_outcome(target_room, has_high)
            .map_err(|_| PipelineError::UnknownRoom(target_room))?;

        Ok(BatchReport {
            total_alerts,
            summary: response.summary,
            room_status,
        })
    }

    /// Stage 1: multipart upload, returns the server-assigned filename
    async fn upload(&self, path: &Path) -> std::result::Result<String, PipelineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::Read(format!("{}: {}", path.display(), e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.mp4".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(video_mime(path))
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;
        let form = Form::new().part("file", part);

        let url = format!("{}/api/upload-video", self.base_url);
        tracing::info!(url = %url, video = %path.display(), "Uploading video");

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::UploadFailed(format!(
                "status {} - {}",
                status, body
            )));
        }

        let upload: UploadResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        if !upload.success {
            return Err(PipelineError::UploadRejected(
                upload
                    .error
                    .unwrap_or_else(|| "upload rejected by server".to_string()),
            ));
        }

        upload.filename.ok_or_else(|| {
            PipelineError::UploadRejected("response missing filename".to_string())
        })
    }

    /// Stage 2: request processing of the uploaded file
    async fn process(
        &self,
        filename: &str,
    ) -> std::result::Result<ProcessResponse, PipelineError> {
        let url = format!("{}/api/process-video/{}", self.base_url, filename);
        tracing::info!(url = %url, "Processing uploaded video");

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::ProcessingFailed(format!(
                "status {} - {}",
                status, body
            )));
        }

        let response: ProcessResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?;

        if !response.success {
            return Err(PipelineError::ProcessingRejected(
                response
                    .error
                    .unwrap_or_else(|| "processing rejected by server".to_string()),
            ));
        }

        Ok(response)
    }
}
