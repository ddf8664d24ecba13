//! Adaptive network-throughput measurement.
//!
//! speedprobe estimates latency, jitter, download throughput and upload
//! throughput against a speedprobe server by driving concurrent, ramping
//! HTTP transfers and reducing the noisy wall-clock samples into stable
//! figures. The engine exposes numeric state only; rendering, persistence
//! and authentication are the caller's business.
//!
//! The inbound contract is one call: feed a [`progress::ProgressSink`] to
//! [`engine::run_speed_test`] (or a configured [`engine::TestEngine`]) and
//! receive a terminal [`progress::MeasurementState`]. A populated `error`
//! field on the terminal state is the only failure channel.

pub mod engine;
pub mod errors;
pub mod http;
pub mod progress;
pub mod results;
pub mod stats;
pub mod transport;

pub use engine::{run_speed_test, TestConfig, TestEngine};
pub use errors::{ErrorKind, SpeedTestError};
pub use http::HttpTransport;
pub use progress::{MeasurementState, Phase, ProgressSink};
pub use results::SpeedTestReport;
pub use transport::Transport;
