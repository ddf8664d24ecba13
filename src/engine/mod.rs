//! The measurement engine: phase sequencing and configuration.
//!
//! A run walks idle -> latency -> download -> upload -> complete, threading
//! each phase's results into the next and emitting full state snapshots
//! throughout. Failure is all-or-nothing: any phase-level error aborts the
//! sequence and the terminal state is idle with the error set and every
//! figure zeroed.

pub mod concurrency;
pub mod driver;
pub mod ramp;

#[cfg(test)]
pub(crate) mod mock;

pub use concurrency::{ConcurrencyPolicy, Direction};
pub use driver::{DriverState, TransferDriver};
pub use ramp::RampGate;

use std::time::Duration;

use log::{info, warn};
use tokio::time::Instant;

use crate::errors::SpeedTestError;
use crate::progress::{MeasurementState, Phase, ProgressSink};
use crate::stats::{reduce_latency, LatencyStats};
use crate::transport::Transport;

/// Configuration for a measurement run.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Number of round-trip latency probes.
    /// Default: 10
    pub latency_rounds: usize,

    /// Minimum number of successful probes required to reduce a latency
    /// figure. The reducer trims two samples, so this can never go below 3.
    /// Default: 3
    pub min_latency_samples: usize,

    /// Wall-clock budget for the download phase.
    /// Default: 10s
    pub download_duration: Duration,

    /// Wall-clock budget for the upload phase.
    /// Default: 10s
    pub upload_duration: Duration,

    /// Elapsed time after which the ramp boundary is marked and throughput
    /// switches to the settled estimate. Tunable for link types far outside
    /// the usual range.
    /// Default: 2s
    pub ramp_threshold: Duration,

    /// Size of the pre-generated random upload payload.
    /// Default: 4 MiB
    pub upload_payload_bytes: usize,

    /// Number of parallel warm-up posts before the upload clock starts.
    /// Default: 3
    pub warmup_requests: usize,

    /// Size of each warm-up post.
    /// Default: 4 KiB
    pub warmup_payload_bytes: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            latency_rounds: 10,
            min_latency_samples: 3,
            download_duration: Duration::from_secs(10),
            upload_duration: Duration::from_secs(10),
            ramp_threshold: Duration::from_secs(2),
            upload_payload_bytes: 4 * 1024 * 1024,
            warmup_requests: 3,
            warmup_payload_bytes: 4096,
        }
    }
}

/// The engine orchestrating the full measurement sequence.
///
/// # Example
/// ```no_run
/// use speedprobe::engine::{TestConfig, TestEngine};
/// use speedprobe::http::HttpTransport;
/// use speedprobe::progress::NullSink;
///
/// #[tokio::main]
/// async fn main() {
///     let transport =
///         HttpTransport::new("http://localhost:3000".parse().unwrap())
///             .unwrap();
///     let engine = TestEngine::new(TestConfig::default());
///     let state = engine.run(&transport, &NullSink).await;
///     println!("Download: {:.2} Mbps", state.download_mbps);
/// }
/// ```
pub struct TestEngine {
    config: TestConfig,
}

impl TestEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: TestConfig) -> Self {
        Self { config }
    }

    /// Run latency, download and upload in order and return the terminal
    /// state.
    ///
    /// Never returns an error: a failed run's terminal state carries the
    /// error message with `phase == Idle` and zeroed figures, matching what
    /// the progress sink saw. Snapshots emitted before the failure remain
    /// visible to the caller.
    pub async fn run(
        &self,
        transport: &dyn Transport,
        sink: &dyn ProgressSink,
    ) -> MeasurementState {
        info!("starting measurement run");

        match self.run_phases(transport, sink).await {
            Ok(state) => state,
            Err(error) => {
                warn!("measurement run aborted: {}", error);
                let state = MeasurementState::failed(error.to_string());
                sink.on_progress(&state);
                state
            }
        }
    }

    async fn run_phases(
        &self,
        transport: &dyn Transport,
        sink: &dyn ProgressSink,
    ) -> Result<MeasurementState, SpeedTestError> {
        sink.on_progress(&MeasurementState {
            phase: Phase::Latency,
            ..MeasurementState::idle()
        });
        let latency = self.measure_latency(transport, sink).await?;
        info!(
            "latency {} ms, jitter {} ms",
            latency.latency_ms, latency.jitter_ms
        );

        let download_base = MeasurementState {
            phase: Phase::Download,
            latency_ms: latency.latency_ms,
            jitter_ms: latency.jitter_ms,
            ..MeasurementState::idle()
        };
        sink.on_progress(&download_base);

        let download = TransferDriver::new(
            transport,
            ConcurrencyPolicy::download(),
            &self.config,
        );
        let download_mbps = download.run_download(sink, &download_base).await;
        info!("download {:.2} Mbps", download_mbps);

        let upload_base = MeasurementState {
            phase: Phase::Upload,
            download_mbps,
            ..download_base
        };
        sink.on_progress(&upload_base);

        let upload = TransferDriver::new(
            transport,
            ConcurrencyPolicy::upload(download_mbps),
            &self.config,
        );
        let upload_mbps = upload.run_upload(sink, &upload_base).await;
        info!("upload {:.2} Mbps", upload_mbps);

        let terminal = MeasurementState {
            phase: Phase::Complete,
            progress: 100,
            download_mbps,
            upload_mbps,
            latency_ms: latency.latency_ms,
            jitter_ms: latency.jitter_ms,
            error: None,
        };
        sink.on_progress(&terminal);

        Ok(terminal)
    }

    /// Run the latency probes and reduce them.
    ///
    /// A failed probe is skipped, not retried: one bad round trip should not
    /// abort the run, and retrying it would bias the sample set towards the
    /// retry's fresher connection. The phase fails only when fewer than
    /// `min_latency_samples` probes succeed.
    async fn measure_latency(
        &self,
        transport: &dyn Transport,
        sink: &dyn ProgressSink,
    ) -> Result<LatencyStats, SpeedTestError> {
        let rounds = self.config.latency_rounds;
        let mut samples = Vec::with_capacity(rounds);

        for round in 0..rounds {
            let start = Instant::now();
            match transport.ping().await {
                Ok(()) => {
                    let sample_ms = start.elapsed().as_secs_f64() * 1000.0;
                    samples.push(sample_ms);

                    let progress = (((round + 1) as f64 / rounds as f64)
                        * 100.0)
                        .round()
                        .min(99.0) as u8;
                    sink.on_progress(&MeasurementState {
                        phase: Phase::Latency,
                        progress,
                        latency_ms: sample_ms.round(),
                        ..MeasurementState::idle()
                    });
                }
                Err(error) => {
                    warn!(
                        "latency probe {}/{} failed: {}",
                        round + 1,
                        rounds,
                        error
                    );
                }
            }
        }

        if samples.len() < self.config.min_latency_samples.max(3) {
            return Err(SpeedTestError::measurement(format!(
                "only {} of {} latency probes succeeded",
                samples.len(),
                rounds
            )));
        }

        reduce_latency(&samples).ok_or_else(|| {
            SpeedTestError::measurement("not enough latency samples to reduce")
        })
    }
}

/// Run a full measurement with the default configuration.
pub async fn run_speed_test(
    transport: &dyn Transport,
    sink: &dyn ProgressSink,
) -> MeasurementState {
    TestEngine::new(TestConfig::default()).run(transport, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockTransport, RecordingSink};

    const MB: u64 = 1_000_000;

    fn steady_transport() -> MockTransport {
        MockTransport::new(MB, Duration::from_millis(100))
            .with_slow_start(Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_reaches_complete() {
        let transport = steady_transport();
        let sink = RecordingSink::new();

        let terminal = run_speed_test(&transport, &sink).await;

        assert_eq!(terminal.phase, Phase::Complete);
        assert_eq!(terminal.progress, 100);
        assert!(terminal.error.is_none());
        assert!(terminal.download_mbps > 0.0);
        assert!(terminal.upload_mbps > 0.0);
        // 20ms mock pings with no spread
        assert_eq!(terminal.latency_ms, 20.0);
        assert_eq!(terminal.jitter_ms, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_100_only_on_terminal_snapshot() {
        let transport = steady_transport();
        let sink = RecordingSink::new();

        run_speed_test(&transport, &sink).await;

        let snapshots = sink.snapshots();
        let full: Vec<_> =
            snapshots.iter().filter(|s| s.progress == 100).collect();

        assert_eq!(full.len(), 1);
        assert_eq!(full[0].phase, Phase::Complete);
        assert!(std::ptr::eq(full[0], snapshots.last().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_run_in_order() {
        let transport = steady_transport();
        let sink = RecordingSink::new();

        run_speed_test(&transport, &sink).await;

        let phases: Vec<Phase> =
            sink.snapshots().iter().map(|s| s.phase).collect();

        let first_download =
            phases.iter().position(|p| *p == Phase::Download).unwrap();
        let first_upload =
            phases.iter().position(|p| *p == Phase::Upload).unwrap();
        let complete =
            phases.iter().position(|p| *p == Phase::Complete).unwrap();

        assert_eq!(phases[0], Phase::Latency);
        assert!(first_download < first_upload);
        assert!(first_upload < complete);
        assert_eq!(complete, phases.len() - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_thread_through_later_phases() {
        let transport = steady_transport();
        let sink = RecordingSink::new();

        run_speed_test(&transport, &sink).await;

        // Every upload snapshot still displays the finished download figure
        // and the latency phase's results
        for state in
            sink.snapshots().iter().filter(|s| s.phase == Phase::Upload)
        {
            assert!(state.download_mbps > 0.0);
            assert_eq!(state.latency_ms, 20.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probes_are_skipped_not_fatal() {
        let transport = steady_transport().with_ping_failures(2);
        let sink = RecordingSink::new();

        let terminal = run_speed_test(&transport, &sink).await;

        assert_eq!(terminal.phase, Phase::Complete);
        assert!(terminal.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_is_all_or_nothing() {
        // Every probe fails: the latency phase cannot produce a figure
        let transport = steady_transport().with_ping_failures(usize::MAX);
        let sink = RecordingSink::new();

        let terminal = run_speed_test(&transport, &sink).await;

        assert_eq!(terminal.phase, Phase::Idle);
        assert!(terminal.error.is_some());
        // Partial results are discarded from the terminal state
        assert_eq!(terminal.progress, 0);
        assert_eq!(terminal.download_mbps, 0.0);
        assert_eq!(terminal.upload_mbps, 0.0);
        assert_eq!(terminal.latency_ms, 0.0);

        // The terminal snapshot reached the sink too
        assert_eq!(sink.snapshots().last().unwrap(), &terminal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_progress_capped_at_99() {
        let transport = steady_transport();
        let sink = RecordingSink::new();

        run_speed_test(&transport, &sink).await;

        for state in
            sink.snapshots().iter().filter(|s| s.phase == Phase::Latency)
        {
            assert!(state.progress <= 99);
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = TestConfig::default();
        assert_eq!(config.latency_rounds, 10);
        assert_eq!(config.min_latency_samples, 3);
        assert_eq!(config.download_duration, Duration::from_secs(10));
        assert_eq!(config.upload_duration, Duration::from_secs(10));
        assert_eq!(config.ramp_threshold, Duration::from_secs(2));
        assert_eq!(config.upload_payload_bytes, 4 * 1024 * 1024);
        assert_eq!(config.warmup_requests, 3);
        assert_eq!(config.warmup_payload_bytes, 4096);
    }
}
