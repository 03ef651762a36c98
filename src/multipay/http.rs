use crate::multipay::error::{MultipayError, MultipayResult};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

pub const OVERRIDE_KEY_HEADER: &str = "Override-Key";
const JSON_CONTENT_TYPE: &str = "application/json";

/// A response that reached us, whatever its status.
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: StatusCode,
    /// Parsed JSON body; `None` when the body was empty or not JSON.
    pub body: Option<JsonValue>,
}

impl ApiReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// JSON client for the multipay API. One attempt per call, no retries.
#[derive(Clone)]
pub struct MultipayHttpClient {
    client: Client,
    base_url: Url,
    override_key: String,
}

impl MultipayHttpClient {
    pub fn new(
        base_url: &str,
        override_key: &str,
        timeout: Option<Duration>,
    ) -> MultipayResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| MultipayError::NetworkError {
            message: format!("failed to initialize HTTP client: {}", e),
        })?;

        Self::with_client(client, base_url, override_key)
    }

    pub fn with_client(client: Client, base_url: &str, override_key: &str) -> MultipayResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| MultipayError::NetworkError {
            message: format!("invalid API base URL {:?}: {}", base_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(MultipayError::NetworkError {
                message: format!("API base URL {} cannot carry a path", base_url),
            });
        }

        Ok(Self {
            client,
            base_url,
            override_key: override_key.to_string(),
        })
    }

    /// Appends `segments` to the base path. Each segment is percent-encoded,
    /// so a `/` inside a reference stays inside that segment.
    pub fn endpoint(&self, segments: &[&str]) -> MultipayResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MultipayError::NetworkError {
                message: format!("API base URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends one request. Only transport failures are errors; any HTTP status
    /// comes back as an [`ApiReply`] for the caller to interpret.
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> MultipayResult<ApiReply> {
        let url = self.endpoint(segments)?;
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(reqwest::header::ACCEPT, JSON_CONTENT_TYPE)
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(OVERRIDE_KEY_HEADER, self.override_key.as_str());
        if let Some(payload) = body {
            request = request.json(payload);
        }

        debug!(method = %method, url = %url, "sending multipay request");

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "multipay request failed");
            MultipayError::NetworkError {
                message: format!("request failed: {}", e),
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            warn!(status = %status, url = %url, error = %e, "failed to read multipay response body");
            MultipayError::NetworkError {
                message: format!("failed to read response: {}", e),
            }
        })?;
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<JsonValue>(&text).ok()
        };

        if !status.is_success() {
            warn!(status = %status, url = %url, "multipay API returned an error status");
        }

        Ok(ApiReply { status, body })
    }
}
