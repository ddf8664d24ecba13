//! Ramp-up filtering of throughput estimates.
//!
//! The first seconds of a transfer phase are dominated by connection setup
//! and TCP slow start, so a short test computed over the full window is
//! systematically biased low. The gate marks the cumulative byte count once
//! a fixed amount of time has elapsed; from then on throughput is computed
//! over bytes and time after that boundary only ("settled"), while the raw
//! whole-window figure ("live") serves until the boundary is crossed.

use std::time::Duration;

/// Tracks the ramp boundary for one phase.
#[derive(Debug, Clone)]
pub struct RampGate {
    threshold: Duration,
    boundary_bytes: Option<u64>,
}

impl RampGate {
    /// Create a gate with the given ramp-up threshold.
    pub fn new(threshold: Duration) -> Self {
        RampGate { threshold, boundary_bytes: None }
    }

    /// Record the byte count at the ramp boundary.
    ///
    /// Marks at most once: the first call with `elapsed >= threshold` stores
    /// `total_bytes`, and the boundary never moves afterwards.
    pub fn observe(&mut self, elapsed: Duration, total_bytes: u64) {
        if self.boundary_bytes.is_none() && elapsed >= self.threshold {
            self.boundary_bytes = Some(total_bytes);
        }
    }

    /// Whether the ramp boundary has been crossed.
    pub fn is_settled(&self) -> bool {
        self.boundary_bytes.is_some()
    }

    /// The byte count recorded at the boundary, if marked.
    pub fn boundary_bytes(&self) -> Option<u64> {
        self.boundary_bytes
    }

    /// The current throughput estimate in Mbps.
    ///
    /// Settled (post-boundary bytes over post-boundary time) once the
    /// boundary is marked, live (all bytes over all time) before. A
    /// non-positive time window yields 0.0.
    pub fn throughput_mbps(&self, elapsed: Duration, total_bytes: u64) -> f64 {
        match self.boundary_bytes {
            Some(boundary) => {
                let settled_bytes = total_bytes.saturating_sub(boundary);
                let settled_secs =
                    elapsed.saturating_sub(self.threshold).as_secs_f64();
                mbps(settled_bytes, settled_secs)
            }
            None => mbps(total_bytes, elapsed.as_secs_f64()),
        }
    }
}

fn mbps(bytes: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        (bytes as f64 * 8.0) / (1_000_000.0 * seconds)
    } else {
        0.0
    }
}
