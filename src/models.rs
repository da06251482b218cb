//! Shared data model for the monitoring console
//!
//! Alert payloads (the live stream and the processed-batch variants
//! carry the same shape), batch summaries, and the ward comparison
//! report returned by the analysis backend.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Detected activity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Fall,
    RapidMovement,
    Seizure,
    BedExit,
    AbnormalPosture,
    AbnormalBreathing,
}

impl AlertType {
    /// All categories, in summary-field order
    pub const ALL: [AlertType; 6] = [
        AlertType::Fall,
        AlertType::RapidMovement,
        AlertType::Seizure,
        AlertType::BedExit,
        AlertType::AbnormalPosture,
        AlertType::AbnormalBreathing,
    ];

    /// Wire/display name ("FALL", "RAPID_MOVEMENT", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Fall => "FALL",
            AlertType::RapidMovement => "RAPID_MOVEMENT",
            AlertType::Seizure => "SEIZURE",
            AlertType::BedExit => "BED_EXIT",
            AlertType::AbnormalPosture => "ABNORMAL_POSTURE",
            AlertType::AbnormalBreathing => "ABNORMAL_BREATHING",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and Critical drive the audible alert and live room escalation
    pub fn is_escalating(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Alert timestamp
///
/// Batch alerts carry an elapsed-seconds offset into the analyzed video;
/// live-stream alerts carry an absolute instant. The two are told apart
/// by JSON type (number vs. RFC 3339 string), not by value range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertTimestamp {
    /// Seconds from the start of the analyzed video
    Elapsed(f64),
    /// Absolute instant from the live stream
    Instant(DateTime<Utc>),
}

impl AlertTimestamp {
    /// Human-readable form: `m:ss` for video offsets, local wall-clock
    /// time for stream instants.
    pub fn display(&self) -> String {
        match self {
            AlertTimestamp::Elapsed(secs) => {
                let minutes = (secs / 60.0).floor() as u64;
                let seconds = (secs % 60.0).floor() as u64;
                format!("{}:{:02}", minutes, seconds)
            }
            AlertTimestamp::Instant(instant) => {
                instant.with_timezone(&Local).format("%H:%M:%S").to_string()
            }
        }
    }
}

/// One detected clinical event
///
/// Immutable once created. Optional fields depend on the alert type
/// (frame/confidence for falls, speed for rapid movement, posture and
/// breathing metadata for their respective detectors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub timestamp: AlertTimestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posture_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breathing_rate: Option<f64>,

    /// Qualifier for breathing alerts (e.g. "shallow", "irregular")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    pub message: String,

    /// Server-side broadcast timestamp, stamped on stream alerts only.
    /// Kept as the raw string; the server emits a naive local ISO form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_iso: Option<String>,
}

/// Per-type alert counts for a processed batch
///
/// Any field missing from the server response defaults to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    #[serde(default)]
    pub fall_count: u64,
    #[serde(default)]
    pub rapid_movement_count: u64,
    #[serde(default)]
    pub seizure_count: u64,
    #[serde(default)]
    pub bed_exit_count: u64,
    #[serde(default)]
    pub abnormal_posture_count: u64,
    #[serde(default)]
    pub abnormal_breathing_count: u64,
}

impl AlertSummary {
    /// Count for one category
    pub fn count_for(&self, alert_type: AlertType) -> u64 {
        match alert_type {
            AlertType::Fall => self.fall_count,
            AlertType::RapidMovement => self.rapid_movement_count,
            AlertType::Seizure => self.seizure_count,
            AlertType::BedExit => self.bed_exit_count,
            AlertType::AbnormalPosture => self.abnormal_posture_count,
            AlertType::AbnormalBreathing => self.abnormal_breathing_count,
        }
    }

    /// Bump the counter for one category
    pub fn record(&mut self, alert_type: AlertType) {
        match alert_type {
            AlertType::Fall => self.fall_count += 1,
            AlertType::RapidMovement => self.rapid_movement_count += 1,
            AlertType::Seizure => self.seizure_count += 1,
            AlertType::BedExit => self.bed_exit_count += 1,
            AlertType::AbnormalPosture => self.abnormal_posture_count += 1,
            AlertType::AbnormalBreathing => self.abnormal_breathing_count += 1,
        }
    }

    /// Sum across all categories
    pub fn total(&self) -> u64 {
        AlertType::ALL.iter().map(|t| self.count_for(*t)).sum()
    }
}

/// One missing patient in a ward comparison report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPatient {
    pub bed_number: String,
    pub description: String,
}

/// Result of the two-image ward comparison workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub summary: String,
    #[serde(default)]
    pub total_missing: u32,
    #[serde(default)]
    pub missing_patients: Vec<MissingPatient>,
}

impl ComparisonResult {
    /// Terminal "all present" state
    pub fn all_present(&self) -> bool {
        self.total_missing == 0 && self.missing_patients.is_empty()
    }
}
