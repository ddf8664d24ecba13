//! Deciding how many transfer operations to keep in flight.
//!
//! A single connection understates high-bandwidth links (slow start never
//! finishes ramping within the test window), while a dozen connections on a
//! slow link waste the window on connection setup. The policy is a monotonic
//! step function over the currently observed throughput.

/// Direction of the active transfer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Receiving payloads from the server
    Download,
    /// Sending payloads to the server
    Upload,
}

/// Fraction of the measured download throughput used to seed the upload
/// concurrency estimate before any upload signal exists. Upload capacity is
/// typically asymmetric and lower.
const UPLOAD_SEED_FRACTION: f64 = 0.3;

/// Target-concurrency policy for one phase.
#[derive(Debug, Clone)]
pub struct ConcurrencyPolicy {
    direction: Direction,
    download_seed_mbps: f64,
}

impl ConcurrencyPolicy {
    /// Policy for the download phase. No prior signal exists, so the ramp
    /// starts from the low end of the table.
    pub fn download() -> Self {
        ConcurrencyPolicy { direction: Direction::Download, download_seed_mbps: 0.0 }
    }

    /// Policy for the upload phase, seeded with the just-measured download
    /// throughput.
    pub fn upload(download_mbps: f64) -> Self {
        ConcurrencyPolicy {
            direction: Direction::Upload,
            download_seed_mbps: download_mbps,
        }
    }

    /// The phase direction this policy serves.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Target number of concurrent in-flight operations for the given
    /// observed throughput. Monotonic non-decreasing in `current_mbps`.
    pub fn target(&self, current_mbps: f64) -> usize {
        match self.direction {
            Direction::Download => {
                if current_mbps > 500.0 {
                    12
                } else if current_mbps > 200.0 {
                    8
                } else if current_mbps > 50.0 {
                    6
                } else if current_mbps > 10.0 {
                    3
                } else {
                    2
                }
            }
            Direction::Upload => {
                // Fall back to a fraction of the download figure until the
                // upload itself has produced a signal
                let hint = if current_mbps > 0.0 {
                    current_mbps
                } else {
                    self.download_seed_mbps * UPLOAD_SEED_FRACTION
                };

                if hint > 500.0 {
                    12
                } else if hint > 200.0 {
                    8
                } else if hint > 100.0 {
                    6
                } else if hint > 50.0 {
                    4
                } else {
                    3
                }
            }
        }
    }

    /// Number of operations to launch before any completion has been
    /// observed: downloads start small, uploads start from the seeded target
    /// with a floor of 3.
    pub fn initial(&self) -> usize {
        match self.direction {
            Direction::Download => 2,
            Direction::Upload => self.target(0.0).max(3),
        }
    }
}
