//! ComparisonClient - Ward Image Comparison Workflow
//!
//! ## Responsibilities
//!
//! - Submit a reference image and a current image in one multipart
//!   request
//! - Return the backend's missing-patient report
//!
//! This workflow is independent of the alert stream: it never touches
//! the aggregator or the room registry, and each result supersedes the
//! previous one wholesale.

use crate::error::Result;
use crate::models::ComparisonResult;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default request timeout; the comparison runs a remote AI model
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Workflow failure: `TransportFailed` means the request never reached
/// a server decision, `ComparisonRejected` means the server explicitly
/// declined. Both carry the most specific message available.
#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    /// Not an image file; rejected before any network call
    #[error("Not an image file: {0}")]
    NotImage(String),

    /// Could not read an image from disk
    #[error("Failed to read image file: {0}")]
    Read(String),

    #[error("Comparison request failed: {0}")]
    TransportFailed(String),

    #[error("Comparison rejected: {0}")]
    ComparisonRejected(String),
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    success: bool,
    #[serde(default)]
    comparison_result: Option<ComparisonResult>,
    #[serde(default)]
    error: Option<String>,
}

/// Image extensions accepted for comparison
fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "bmp" | "gif" | "webp"
            )
        })
        .unwrap_or(false)
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Ward comparison workflow client
pub struct ComparisonClient {
    client: reqwest::Client,
    base_url: String,
}

impl ComparisonClient {
    /// Create a new comparison client
    pub fn new(base_url: String) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a new comparison client with a custom request timeout
    pub fn with_timeout(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Submit both ward images and return the missing-patient report.
    ///
    /// Validation happens before any network call. Errors leave no
    /// state behind; the previous result (held by the caller) stays
    /// valid until a later invocation succeeds.
    pub async fn run(
        &self,
        reference: &Path,
        current: &Path,
    ) -> std::result::Result<ComparisonResult, ComparisonError> {
        for path in [reference, current] {
            if !is_image_file(path) {
                return Err(ComparisonError::NotImage(path.display().to_string()));
            }
        }

        let form = Form::new()
            .part("image1", Self::image_part(reference).await?)
            .part("image2", Self::image_part(current).await?);

        let url = format!("{}/api/compare-ward-images", self.base_url);
        tracing::info!(
            url = %url,
            reference = %reference.display(),
            current = %current.display(),
            "Comparing ward images"
        );

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ComparisonError::TransportFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ComparisonError::TransportFailed(format!(
                "status {} - {}",
                status, body
            )));
        }

        let response: CompareResponse = resp
            .json()
            .await
            .map_err(|e| ComparisonError::TransportFailed(e.to_string()))?;

        if !response.success {
            return Err(ComparisonError::ComparisonRejected(
                response
                    .error
                    .unwrap_or_else(|| "comparison rejected by server".to_string()),
            ));
        }

        let result = response.comparison_result.ok_or_else(|| {
            ComparisonError::ComparisonRejected("response missing comparison result".to_string())
        })?;

        tracing::info!(
            total_missing = result.total_missing,
            "Ward comparison completed"
        );

        Ok(result)
    }

    async fn image_part(path: &Path) -> std::result::Result<Part, ComparisonError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ComparisonError::Read(format!("{}: {}", path.display(), e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ward.jpg".to_string());

        Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(image_mime(path))
            .map_err(|e| ComparisonError::TransportFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_image_extension_check() {
        assert!(is_image_file(Path::new("before.jpg")));
        assert!(is_image_file(Path::new("after.PNG")));
        assert!(!is_image_file(Path::new("clip.mp4")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_image_mime_mapping() {
        assert_eq!(image_mime(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(image_mime(Path::new("a.png")), "image/png");
        assert_eq!(image_mime(Path::new("a.xyz")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_non_image_rejected_before_any_network_call() {
        let client = ComparisonClient::new("http://127.0.0.1:9".to_string()).unwrap();

        let result = client
            .run(&PathBuf::from("before.jpg"), &PathBuf::from("after.mp4"))
            .await;
        assert!(matches!(result, Err(ComparisonError::NotImage(_))));
    }
}
