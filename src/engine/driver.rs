//! The transfer driver: one measurement phase, kept saturated.
//!
//! For a fixed wall-clock budget the driver keeps a variable number of
//! transfer operations in flight, replacing each completed one immediately
//! and topping up to whatever target the concurrency policy derives from the
//! throughput observed so far. Everything runs on one logical task: the
//! in-flight set is a `FuturesUnordered`, so completions are processed
//! strictly one at a time and the phase counters need no locking.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::time::{sleep_until, Instant};

use crate::engine::concurrency::{ConcurrencyPolicy, Direction};
use crate::engine::ramp::RampGate;
use crate::engine::TestConfig;
use crate::errors::SpeedTestError;
use crate::progress::{MeasurementState, Phase, ProgressSink};
use crate::transport::{PayloadTier, Transport};

/// Lifecycle of one transfer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed, nothing launched yet
    Idle,
    /// Within the time budget, launching replacements
    Running,
    /// Budget elapsed, waiting for in-flight operations to finish
    Draining,
    /// Phase finished
    Done,
}

/// Running aggregate for one phase.
///
/// All phase-local mutable state lives here rather than in shared counters,
/// which keeps the driver re-entrant and testable in isolation. Mutated only
/// from completion handling on the driver's single task.
#[derive(Debug)]
struct PhaseContext {
    started: Instant,
    budget: Duration,
    state: DriverState,
    total_bytes: u64,
    in_flight: usize,
    current_mbps: f64,
    ramp: RampGate,
}

impl PhaseContext {
    /// Starts the phase clock.
    fn new(budget: Duration, ramp_threshold: Duration) -> Self {
        PhaseContext {
            started: Instant::now(),
            budget,
            state: DriverState::Idle,
            total_bytes: 0,
            in_flight: 0,
            current_mbps: 0.0,
            ramp: RampGate::new(ramp_threshold),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn within_budget(&self) -> bool {
        self.elapsed() < self.budget
    }

    /// Account for a completed transfer and refresh the throughput estimate.
    fn record_completion(&mut self, bytes: u64) {
        self.in_flight -= 1;
        self.total_bytes += bytes;

        let elapsed = self.elapsed();
        self.ramp.observe(elapsed, self.total_bytes);
        self.current_mbps = self.ramp.throughput_mbps(elapsed, self.total_bytes);
    }

    /// A failed transfer frees its slot without contributing bytes.
    fn record_failure(&mut self) {
        self.in_flight -= 1;
    }

    /// Elapsed fraction of the budget as a percentage, capped at 99 while
    /// the phase is running. 100 is reserved for the terminal emission.
    fn progress(&self) -> u8 {
        let pct =
            (self.elapsed().as_secs_f64() / self.budget.as_secs_f64()) * 100.0;
        pct.round().min(99.0) as u8
    }

    /// Final figure for the phase: settled if the ramp boundary was crossed,
    /// otherwise live over the whole window.
    fn final_mbps(&self) -> f64 {
        self.ramp.throughput_mbps(self.elapsed(), self.total_bytes)
    }
}

/// Drives one direction (download or upload) for a fixed duration.
pub struct TransferDriver<'a> {
    transport: &'a dyn Transport,
    policy: ConcurrencyPolicy,
    config: &'a TestConfig,
}

impl<'a> TransferDriver<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        policy: ConcurrencyPolicy,
        config: &'a TestConfig,
    ) -> Self {
        TransferDriver { transport, policy, config }
    }

    /// Measure download throughput. The payload tier requested for each
    /// operation scales with the throughput observed so far.
    pub async fn run_download(
        &self,
        sink: &dyn ProgressSink,
        base: &MeasurementState,
    ) -> f64 {
        let transport = self.transport;
        self.run(
            self.config.download_duration,
            move |mbps| transport.download(PayloadTier::for_throughput(mbps)),
            sink,
            base,
        )
        .await
    }

    /// Measure upload throughput.
    ///
    /// The payload is generated and a few small parallel posts are exchanged
    /// before the phase clock starts, so neither payload generation nor
    /// connection setup pollutes the measured window.
    pub async fn run_upload(
        &self,
        sink: &dyn ProgressSink,
        base: &MeasurementState,
    ) -> f64 {
        let payload = random_payload(self.config.upload_payload_bytes);
        self.warm_up().await;

        let transport = self.transport;
        self.run(
            self.config.upload_duration,
            move |_mbps| transport.upload(payload.clone()),
            sink,
            base,
        )
        .await
    }

    /// Pre-establish connections with small parallel posts. Failures are
    /// logged and ignored; the phase itself will surface a dead server as a
    /// 0 Mbps result.
    async fn warm_up(&self) {
        let token = random_payload(self.config.warmup_payload_bytes);
        let posts = (0..self.config.warmup_requests)
            .map(|_| self.transport.upload(token.clone()));

        for result in futures::future::join_all(posts).await {
            if let Err(error) = result {
                warn!("upload warm-up request failed: {}", error);
            }
        }
    }

    async fn run<F>(
        &self,
        budget: Duration,
        launch: F,
        sink: &dyn ProgressSink,
        base: &MeasurementState,
    ) -> f64
    where
        F: Fn(f64) -> BoxFuture<'a, Result<u64, SpeedTestError>>,
    {
        let mut ctx = PhaseContext::new(budget, self.config.ramp_threshold);
        let mut in_flight: FuturesUnordered<
            BoxFuture<'a, Result<u64, SpeedTestError>>,
        > = FuturesUnordered::new();

        for _ in 0..self.policy.initial() {
            in_flight.push(launch(ctx.current_mbps));
            ctx.in_flight += 1;
        }
        ctx.state = DriverState::Running;
        debug!(
            "{:?} phase started with {} operations in flight",
            self.policy.direction(),
            ctx.in_flight
        );

        let deadline = ctx.started + budget;

        loop {
            if ctx.state == DriverState::Draining && in_flight.is_empty() {
                ctx.state = DriverState::Done;
                break;
            }

            tokio::select! {
                biased;

                _ = sleep_until(deadline), if ctx.state == DriverState::Running => {
                    ctx.state = DriverState::Draining;
                    debug!(
                        "budget elapsed, draining {} in-flight operations",
                        ctx.in_flight
                    );
                }

                Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                    match result {
                        Ok(bytes) => {
                            ctx.record_completion(bytes);
                            self.emit(sink, &ctx, base);

                            if ctx.state == DriverState::Running
                                && ctx.within_budget()
                            {
                                // Replace the finished slot immediately, then
                                // top up to the policy's current target
                                in_flight.push(launch(ctx.current_mbps));
                                ctx.in_flight += 1;

                                let target =
                                    self.policy.target(ctx.current_mbps);
                                while ctx.in_flight < target
                                    && ctx.within_budget()
                                {
                                    in_flight.push(launch(ctx.current_mbps));
                                    ctx.in_flight += 1;
                                }
                            }
                        }
                        Err(error) => {
                            // The slot is not replaced here; the next
                            // successful completion's top-up refills it
                            ctx.record_failure();
                            warn!("transfer operation failed: {}", error);
                        }
                    }
                }

                else => break,
            }
        }

        debug!(
            "{:?} phase done: {} bytes in {:?}",
            self.policy.direction(),
            ctx.total_bytes,
            ctx.elapsed()
        );

        round2(ctx.final_mbps())
    }

    fn emit(
        &self,
        sink: &dyn ProgressSink,
        ctx: &PhaseContext,
        base: &MeasurementState,
    ) {
        let mut snapshot =
            MeasurementState { progress: ctx.progress(), ..base.clone() };

        match self.policy.direction() {
            Direction::Download => {
                snapshot.phase = Phase::Download;
                snapshot.download_mbps = round2(ctx.current_mbps);
            }
            Direction::Upload => {
                snapshot.phase = Phase::Upload;
                snapshot.upload_mbps = round2(ctx.current_mbps);
            }
        }

        sink.on_progress(&snapshot);
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn random_payload(len: usize) -> Bytes {
    let mut rng = StdRng::from_entropy();
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    Bytes::from(buf)
}
