//! Deterministic in-memory transport for engine tests.
//!
//! All timing goes through `tokio::time`, so tests run under a paused clock
//! and the whole 10-second measurement window elapses instantly and
//! reproducibly. A single async mutex serializes transfers, which fixes the
//! aggregate completion rate no matter how many operations the driver keeps
//! in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::errors::SpeedTestError;
use crate::progress::{MeasurementState, ProgressSink};
use crate::transport::{PayloadTier, Transport};

pub(crate) struct MockTransport {
    gate: Mutex<()>,
    transfer_time: Duration,
    slow_start_extra: Duration,
    chunk_bytes: u64,
    fail_downloads: bool,
    ping_time: Duration,
    ping_failures: AtomicUsize,
    transfers_started: AtomicUsize,
    upload_sizes: StdMutex<Vec<usize>>,
}

impl MockTransport {
    /// A transport where every transfer carries `chunk_bytes` and the server
    /// completes one transfer per `transfer_time`, regardless of concurrency.
    pub fn new(chunk_bytes: u64, transfer_time: Duration) -> Self {
        MockTransport {
            gate: Mutex::new(()),
            transfer_time,
            slow_start_extra: Duration::ZERO,
            chunk_bytes,
            fail_downloads: false,
            ping_time: Duration::from_millis(20),
            ping_failures: AtomicUsize::new(0),
            transfers_started: AtomicUsize::new(0),
            upload_sizes: StdMutex::new(Vec::new()),
        }
    }

    /// Make the very first transfer take `extra` longer, modelling
    /// connection setup and slow start.
    pub fn with_slow_start(mut self, extra: Duration) -> Self {
        self.slow_start_extra = extra;
        self
    }

    /// Every download operation fails after a short delay.
    pub fn failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }

    /// The first `count` ping probes fail.
    pub fn with_ping_failures(self, count: usize) -> Self {
        self.ping_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Payload sizes of every upload the transport has seen, warm-up posts
    /// included, in arrival order.
    pub fn uploaded_sizes(&self) -> Vec<usize> {
        self.upload_sizes.lock().unwrap().clone()
    }

    async fn transfer(&self, bytes: u64) -> Result<u64, SpeedTestError> {
        let _slot = self.gate.lock().await;

        let sequence = self.transfers_started.fetch_add(1, Ordering::SeqCst);
        let extra =
            if sequence == 0 { self.slow_start_extra } else { Duration::ZERO };

        sleep(self.transfer_time + extra).await;
        Ok(bytes)
    }
}

impl Transport for MockTransport {
    fn ping(&self) -> BoxFuture<'_, Result<(), SpeedTestError>> {
        Box::pin(async move {
            sleep(self.ping_time).await;

            let remaining = self.ping_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.ping_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SpeedTestError::network("mock ping failure"));
            }

            Ok(())
        })
    }

    fn download(
        &self,
        _tier: PayloadTier,
    ) -> BoxFuture<'_, Result<u64, SpeedTestError>> {
        Box::pin(async move {
            if self.fail_downloads {
                sleep(Duration::from_millis(50)).await;
                return Err(SpeedTestError::network("mock transfer failure"));
            }

            self.transfer(self.chunk_bytes).await
        })
    }

    fn upload(
        &self,
        payload: Bytes,
    ) -> BoxFuture<'_, Result<u64, SpeedTestError>> {
        Box::pin(async move {
            self.upload_sizes.lock().unwrap().push(payload.len());
            // The mock server receives exactly what was posted
            self.transfer(payload.len() as u64).await
        })
    }
}

/// A sink collecting every emitted snapshot for later assertions.
pub(crate) struct RecordingSink {
    snapshots: StdMutex<Vec<MeasurementState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink { snapshots: StdMutex::new(Vec::new()) }
    }

    pub fn snapshots(&self) -> Vec<MeasurementState> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, state: &MeasurementState) {
        self.snapshots.lock().unwrap().push(state.clone());
    }
}
