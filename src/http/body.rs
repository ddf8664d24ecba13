//! Counting bytes actually moved over the wire.
//!
//! Declared content-length headers can be absent, wrong, or altered by
//! transport-level compression, so Mbps math must be fed the number of bytes
//! that actually arrived. The counter drains the streaming body to
//! completion and sums chunk lengths; a partially read body is not a valid
//! measurement.

use futures::StreamExt;
use reqwest::Response;

/// Drain the response body and return the total number of bytes received.
pub async fn count_body_bytes(response: Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total: u64 = 0;

    while let Some(chunk) = stream.next().await {
        total += chunk?.len() as u64;
    }

    Ok(total)
}
