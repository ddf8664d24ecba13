//! Result data structures for speed test output.
//!
//! The engine's terminal [`MeasurementState`] is an internal snapshot; this
//! module wraps it with a timestamp for JSON output and external storage.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::progress::{MeasurementState, Phase};

/// A timestamped measurement report, serializable for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct SpeedTestReport {
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    /// Download throughput in Mbps
    pub download_mbps: f64,
    /// Upload throughput in Mbps
    pub upload_mbps: f64,
    /// Round-trip latency in milliseconds
    pub latency_ms: f64,
    /// Latency jitter in milliseconds
    pub jitter_ms: f64,
    /// Error message, present only for a failed run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeedTestReport {
    /// Build a report from the engine's terminal state.
    pub fn from_state(state: &MeasurementState) -> Self {
        Self {
            timestamp: Utc::now(),
            download_mbps: state.download_mbps,
            upload_mbps: state.upload_mbps,
            latency_ms: state.latency_ms,
            jitter_ms: state.jitter_ms,
            error: state.error.clone(),
        }
    }

    /// Whether the run produced usable figures.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<&MeasurementState> for SpeedTestReport {
    fn from(state: &MeasurementState) -> Self {
        Self::from_state(state)
    }
}

/// True when the given terminal state marks a completed run.
pub fn is_complete(state: &MeasurementState) -> bool {
    state.phase == Phase::Complete && state.error.is_none()
}
