//! Measurement snapshots and the progress callback interface.
//!
//! The engine reports its state as a stream of full [`MeasurementState`]
//! snapshots (never deltas), one per completed probe or transfer, plus one
//! terminal snapshot when the run finishes or fails.

use serde::Serialize;

/// The sequential measurement stages, plus the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No test running (also the terminal state of a failed run)
    Idle,
    /// Round-trip latency probes
    Latency,
    /// Download throughput measurement
    Download,
    /// Upload throughput measurement
    Upload,
    /// All phases finished successfully
    Complete,
}

/// A full snapshot of the measurement state.
///
/// Emitted repeatedly during a run. `progress` is capped at 99 while a phase
/// is running and reaches exactly 100 only on the terminal `Complete`
/// emission. A populated `error` with `phase == Idle` marks a failed run;
/// numeric fields of a failed terminal state are zeroed (failure is
/// all-or-nothing).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementState {
    /// Current phase
    pub phase: Phase,
    /// Phase progress, 0-100
    pub progress: u8,
    /// Download throughput in Mbps
    pub download_mbps: f64,
    /// Upload throughput in Mbps
    pub upload_mbps: f64,
    /// Round-trip latency in milliseconds
    pub latency_ms: f64,
    /// Latency jitter in milliseconds
    pub jitter_ms: f64,
    /// Error message, present only on a failed run's terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MeasurementState {
    /// The zeroed starting state. Phase snapshots are built from this with
    /// struct update syntax, overriding only the fields a phase has measured.
    pub fn idle() -> Self {
        MeasurementState {
            phase: Phase::Idle,
            progress: 0,
            download_mbps: 0.0,
            upload_mbps: 0.0,
            latency_ms: 0.0,
            jitter_ms: 0.0,
            error: None,
        }
    }

    /// Terminal state for a failed run: everything zeroed except the error.
    pub fn failed(message: impl Into<String>) -> Self {
        MeasurementState { error: Some(message.into()), ..MeasurementState::idle() }
    }
}

impl Default for MeasurementState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Callback interface for progress snapshots.
///
/// Invoked many times per phase. Implementations must be non-blocking and
/// must not panic, or measurement accuracy suffers.
pub trait ProgressSink: Send + Sync {
    /// Called with every emitted snapshot.
    fn on_progress(&self, state: &MeasurementState);
}

impl<F> ProgressSink for F
where
    F: Fn(&MeasurementState) + Send + Sync,
{
    fn on_progress(&self, state: &MeasurementState) {
        self(state)
    }
}

/// A sink that drops every snapshot.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _state: &MeasurementState) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_state_is_zeroed() {
        let state = MeasurementState::idle();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.progress, 0);
        assert_eq!(state.download_mbps, 0.0);
        assert_eq!(state.upload_mbps, 0.0);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_failed_state_keeps_only_error() {
        let state = MeasurementState::failed("server unreachable");
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.progress, 0);
        assert_eq!(state.latency_ms, 0.0);
        assert_eq!(state.error.as_deref(), Some("server unreachable"));
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        let state = MeasurementState {
            phase: Phase::Download,
            progress: 42,
            ..MeasurementState::idle()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase"], "download");
        assert_eq!(json["progress"], 42);
        // Absent error must not appear in the serialized snapshot
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_closure_implements_sink() {
        let sink = |state: &MeasurementState| {
            assert_eq!(state.phase, Phase::Idle);
        };
        sink.on_progress(&MeasurementState::idle());
    }
}
