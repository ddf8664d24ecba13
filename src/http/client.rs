//! The reqwest transport talking to a speedprobe server.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use log::debug;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_TYPE,
    USER_AGENT,
};
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use url::Url;

use crate::errors::SpeedTestError;
use crate::http::body::count_body_bytes;
use crate::transport::{PayloadTier, Transport};

static PING_PATH: &str = "api/speedtest/ping";
static UPLOAD_PATH: &str = "api/speedtest/upload";
static FILES_PATH: &str = "test-files/";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
// The client-level timeout is sized for 100MB transfers; latency probes get
// their own short cap so a single stalled probe cannot consume the phase.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// What the upload endpoint reports back.
#[derive(Debug, Deserialize)]
struct UploadReceipt {
    received: Option<u64>,
}

/// The number of bytes the server acknowledged. The server-side count
/// survives any transport re-encoding, so it wins over our own body-length
/// bookkeeping; a missing or non-JSON receipt falls back to the local length.
fn server_received(body: &[u8], local_len: u64) -> u64 {
    match serde_json::from_slice::<UploadReceipt>(body) {
        Ok(receipt) => receipt.received.unwrap_or(local_len),
        Err(_) => local_len,
    }
}

/// A [`Transport`] over HTTP, sharing one connection pool across all
/// concurrent transfer operations.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    ping_url: Url,
    upload_url: Url,
    files_url: Url,
}

impl HttpTransport {
    /// Build a transport for the given server base URL.
    pub fn new(base_url: Url) -> Result<Self, SpeedTestError> {
        let client = ReqwestClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(HttpTransport {
            client,
            ping_url: base_url.join(PING_PATH)?,
            upload_url: base_url.join(UPLOAD_PATH)?,
            files_url: base_url.join(FILES_PATH)?,
        })
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            ),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

        headers
    }

    /// URL for one download payload, with a cache-busting query so no
    /// intermediary can serve the bytes from cache.
    fn download_url(&self, tier: PayloadTier) -> Result<Url, SpeedTestError> {
        let mut url = self.files_url.join(tier.file_name())?;
        url.set_query(Some(&format!(
            "t={}-{}",
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u32>()
        )));

        Ok(url)
    }
}

impl Transport for HttpTransport {
    fn ping(&self) -> BoxFuture<'_, Result<(), SpeedTestError>> {
        Box::pin(async move {
            self.client
                .get(self.ping_url.clone())
                .headers(Self::headers())
                .timeout(PING_TIMEOUT)
                .send()
                .await?
                .error_for_status()?;

            Ok(())
        })
    }

    fn download(
        &self,
        tier: PayloadTier,
    ) -> BoxFuture<'_, Result<u64, SpeedTestError>> {
        Box::pin(async move {
            let url = self.download_url(tier)?;
            debug!("download operation: {} ({} bytes)", tier.file_name(), tier.bytes());

            let response = self
                .client
                .get(url)
                .headers(Self::headers())
                // Compression would make wire bytes diverge from payload bytes
                .header(ACCEPT_ENCODING, HeaderValue::from_static("identity"))
                .send()
                .await?
                .error_for_status()?;

            let bytes = count_body_bytes(response).await?;
            debug!("download operation finished: {} bytes", bytes);

            Ok(bytes)
        })
    }

    fn upload(
        &self,
        payload: Bytes,
    ) -> BoxFuture<'_, Result<u64, SpeedTestError>> {
        Box::pin(async move {
            let local_len = payload.len() as u64;

            let response = self
                .client
                .post(self.upload_url.clone())
                .headers(Self::headers())
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                )
                .body(payload)
                .send()
                .await?
                .error_for_status()?;

            let body = response.bytes().await?;
            Ok(server_received(&body, local_len))
        })
    }
}
