//! HTTP delivery.
//!
//! One POST per payload fragment. The sender classifies the settlement into
//! an outcome for the backoff governor and never surfaces an error itself.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;

use telewire_config::TransportConfig;

/// Bodies up to this size keep the small-payload delivery hint enabled;
/// larger bodies give up connection reuse instead of pinning a pooled
/// connection for one oversized upload.
pub const SMALL_PAYLOAD_LIMIT: usize = 60_000;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const SESSION_ID_HEADER: &str = "x-telewire-session-id";
pub const SESSION_STATUS_HEADER: &str = "x-telewire-session-status";

/// Outcome of one settled send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Any 2xx. `session_invalid` carries the collector's session signal.
    Success { status: u16, session_invalid: bool },
    /// HTTP 429 with the raw retry hint, if any.
    RateLimited { retry_after: Option<String> },
    /// Any other HTTP status.
    ServerError { status: u16 },
    /// The request never settled into a response.
    TransportFailure { message: String },
}

/// Delivery seam; lets the pipeline run hermetically in tests.
#[async_trait]
pub trait TelemetrySender: Send + Sync {
    async fn send(&self, url: &str, body: String, session_id: Option<&str>) -> SendOutcome;
}

/// reqwest-backed sender with pre-parsed custom headers.
pub struct HttpSender {
    client: reqwest::Client,
    headers: HeaderMap,
    api_key: Option<String>,
}

impl HttpSender {
    pub fn new(config: &TransportConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().build()?;
        let headers = parse_headers(&config.headers)?;

        Ok(Self {
            client,
            headers,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl TelemetrySender for HttpSender {
    async fn send(&self, url: &str, body: String, session_id: Option<&str>) -> SendOutcome {
        let mut request = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json");

        if let Some(api_key) = self.api_key.as_deref() {
            request = request.header(API_KEY_HEADER, api_key);
        }
        if let Some(session_id) = session_id {
            request = request.header(SESSION_ID_HEADER, session_id);
        }
        if !small_payload(body.len()) {
            request = request.header(CONNECTION, "close");
        }

        match request.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .map(String::from);
                let session_invalid = status == StatusCode::ACCEPTED
                    && response
                        .headers()
                        .get(SESSION_STATUS_HEADER)
                        .and_then(|value| value.to_str().ok())
                        == Some("invalid");

                // Read the body so the connection can be closed.
                let _ = response.bytes().await;

                if status == StatusCode::TOO_MANY_REQUESTS {
                    SendOutcome::RateLimited { retry_after }
                } else if status.is_success() {
                    SendOutcome::Success {
                        status: status.as_u16(),
                        session_invalid,
                    }
                } else {
                    SendOutcome::ServerError {
                        status: status.as_u16(),
                    }
                }
            }
            Err(err) => SendOutcome::TransportFailure {
                message: err.to_string(),
            },
        }
    }
}

/// True while the body is small enough for best-effort background delivery.
pub fn small_payload(body_len: usize) -> bool {
    body_len <= SMALL_PAYLOAD_LIMIT
}

/// Parse a HashMap of string headers into a HeaderMap
fn parse_headers(
    headers: &std::collections::HashMap<String, String>,
) -> Result<HeaderMap, anyhow::Error> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::try_from(key.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid header name '{}': {}", key, e))?;
        let val = HeaderValue::from_str(value)
            .map_err(|e| anyhow::anyhow!("Invalid header value for '{}': {}", key, e))?;
        header_map.insert(name, val);
    }
    Ok(header_map)
}
