//! The seam between the measurement engine and the network.
//!
//! The engine drives everything through [`Transport`], so the driver and
//! sequencer can be exercised against a deterministic in-memory transport in
//! tests while the binary plugs in the reqwest implementation from
//! [`crate::http`].

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::errors::SpeedTestError;

/// Download payload sizes offered by the server.
///
/// The transfer driver picks a tier from the currently observed throughput:
/// larger payloads once throughput is established (amortizing per-request
/// overhead), smaller payloads at low or unknown throughput so early
/// progress snapshots arrive promptly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadTier {
    /// 5 MB
    Small,
    /// 25 MB
    Medium,
    /// 100 MB
    Large,
}

impl PayloadTier {
    /// Nominal size of the payload in bytes. The byte counter measures what
    /// actually arrives; this is only the requested size.
    pub const fn bytes(self) -> u64 {
        match self {
            PayloadTier::Small => 5_000_000,
            PayloadTier::Medium => 25_000_000,
            PayloadTier::Large => 100_000_000,
        }
    }

    /// Server-side file name for this tier.
    pub const fn file_name(self) -> &'static str {
        match self {
            PayloadTier::Small => "5mb.bin",
            PayloadTier::Medium => "25mb.bin",
            PayloadTier::Large => "100mb.bin",
        }
    }

    /// Pick a tier for the currently observed throughput.
    pub fn for_throughput(mbps: f64) -> Self {
        if mbps > 100.0 {
            PayloadTier::Large
        } else if mbps > 20.0 {
            PayloadTier::Medium
        } else {
            PayloadTier::Small
        }
    }
}

/// One measurement server, seen as three operations.
///
/// All methods return boxed futures so the engine can hold the transport as
/// `&dyn Transport` and keep many operations of the same kind in flight
/// concurrently.
pub trait Transport: Send + Sync {
    /// One minimal round trip. The caller times the call; the response body
    /// is ignored.
    fn ping(&self) -> BoxFuture<'_, Result<(), SpeedTestError>>;

    /// Fetch one download payload of the given tier and return the number of
    /// bytes actually received over the wire.
    fn download(
        &self,
        tier: PayloadTier,
    ) -> BoxFuture<'_, Result<u64, SpeedTestError>>;

    /// Post one upload payload and return the number of bytes the server
    /// reports it received. The server-side count is authoritative over the
    /// local payload length.
    fn upload(
        &self,
        payload: Bytes,
    ) -> BoxFuture<'_, Result<u64, SpeedTestError>>;
}
