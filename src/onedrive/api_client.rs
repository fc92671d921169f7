//! HTTP client for the Microsoft Graph API.
//!
//! Wraps `reqwest::Client` with automatic Bearer-token injection, bounded
//! retry with exponential back-off for 429 / 5xx / network failures, and
//! transparent JSON envelope parsing.  The retry budget comes from the one
//! `RetryPolicy` in the connector configuration.

use crate::onedrive::error::{SyncError, SyncResult};
use crate::onedrive::types::{Config, RetryPolicy};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

/// Low-level Graph API HTTP client.
#[derive(Debug, Clone)]
pub struct GraphApiClient {
    inner: reqwest::Client,
    base_url: String,
    access_token: String,
    retry: RetryPolicy,
}

impl GraphApiClient {
    /// Create a new Graph client.
    pub fn new(config: &Config, access_token: &str) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner,
            base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            retry: config.retry.clone(),
        })
    }

    /// Full URL for a Graph endpoint path.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// GET a JSON resource.
    pub async fn get(&self, path: &str) -> SyncResult<serde_json::Value> {
        let url = self.url(path);
        self.request_with_retry(|| self.inner.get(&url).bearer_auth(&self.access_token))
            .await
    }

    /// POST a JSON body.
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> SyncResult<serde_json::Value> {
        let url = self.url(path);
        self.request_with_retry(|| {
            self.inner
                .post(&url)
                .bearer_auth(&self.access_token)
                .json(body)
        })
        .await
    }

    /// GET raw content (for downloads).  Returns the response headers
    /// alongside the body so callers can read `Content-Disposition`.
    pub async fn get_content(&self, path: &str) -> SyncResult<(HeaderMap, Vec<u8>)> {
        let url = self.url(path);
        debug!("GET (content) {}", url);

        let resp = self
            .inner
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(SyncError::from)?;

        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::from_graph_response(status, &body));
        }

        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(SyncError::from)?;
        Ok((headers, bytes.to_vec()))
    }

    /// PUT one byte range of a resumable upload.  Returns the raw status
    /// and parsed body; the upload engine owns the protocol branching
    /// (interim accept, terminal success, transient retry).
    pub async fn put_upload_range(
        &self,
        upload_url: &str,
        data: Vec<u8>,
        range_start: u64,
        range_end: u64,
        total_size: u64,
    ) -> SyncResult<(u16, serde_json::Value)> {
        let content_range = format!("bytes {}-{}/{}", range_start, range_end, total_size);
        debug!("PUT upload range: {}", content_range);

        let resp = self
            .inner
            .put(upload_url)
            .header("Content-Length", data.len())
            .header("Content-Range", &content_range)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(SyncError::from)?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        Ok((status, value))
    }

    // ─── Internal ────────────────────────────────────────────────────

    async fn request_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> SyncResult<serde_json::Value> {
        let mut last_err = SyncError::internal("No attempts made");

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.backoff(attempt - 1);
                warn!(
                    "Retry {}/{} after {:?}",
                    attempt,
                    self.retry.max_attempts - 1,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match build().send().await {
                Ok(resp) => match Self::handle_response(resp).await {
                    Ok(v) => return Ok(v),
                    Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts => {
                        last_err = e;
                    }
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    last_err = SyncError::from(e);
                    if !last_err.is_transient() {
                        return Err(last_err);
                    }
                }
            }
        }

        Err(last_err)
    }

    async fn handle_response(resp: reqwest::Response) -> SyncResult<serde_json::Value> {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        debug!("Response status={} body_len={}", status, body.len());

        if status >= 400 {
            return Err(SyncError::from_graph_response(status, &body));
        }

        // 204 No Content — return null.
        if body.is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_str(&body).map_err(SyncError::from)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
