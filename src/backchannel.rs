//! Outbound HTTP used to reach the CAS validation endpoint.
use async_trait::async_trait;
use futures_lite::AsyncReadExt;
use isahc::config::Configurable;
use isahc::HttpClient;
use std::io;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("cas-auth/", env!("CARGO_PKG_VERSION"));
const MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Transport-level failures. Never retried here; the caller reports them.
#[derive(Debug, Error)]
pub enum BackchannelError {
    #[error("validation request timed out")]
    Timeout,
    #[error("validation request failed: {0}")]
    Request(String),
    #[error("validation response exceeds {0} bytes")]
    BodyTooLarge(u64),
    #[error("could not read validation response: {0}")]
    Body(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackchannelResponse {
    pub status: u16,
    pub body: String,
}

impl BackchannelResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP GET interface for ticket validation.
///
/// Implementations must be safe for concurrent use. Dropping the returned
/// future cancels the request.
#[async_trait]
pub trait Backchannel: Send + Sync {
    async fn get(&self, url: &str) -> Result<BackchannelResponse, BackchannelError>;
}

/// isahc-backed backchannel with an overall request timeout.
#[derive(Clone)]
pub struct IsahcBackchannel {
    client: HttpClient,
}

impl std::fmt::Debug for IsahcBackchannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsahcBackchannel").finish_non_exhaustive()
    }
}

impl IsahcBackchannel {
    pub fn new(timeout: Duration) -> Result<Self, BackchannelError> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .default_header("Accept", "*/*")
            .default_header("User-Agent", USER_AGENT)
            .build()
            .map_err(|e| BackchannelError::Request(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Backchannel for IsahcBackchannel {
    async fn get(&self, url: &str) -> Result<BackchannelResponse, BackchannelError> {
        let mut response = self.client.get_async(url).await.map_err(|e| {
            if e.is_timeout() {
                BackchannelError::Timeout
            } else {
                BackchannelError::Request(e.to_string())
            }
        })?;

        if let Some(len) = response.body().len() {
            if len > MAX_RESPONSE_BYTES {
                return Err(BackchannelError::BodyTooLarge(MAX_RESPONSE_BYTES));
            }
        }

        let status = response.status().as_u16();

        // Chunked bodies carry no length up front: stop reading one byte past the cap.
        let mut body = Vec::new();
        response
            .body_mut()
            .take(MAX_RESPONSE_BYTES + 1)
            .read_to_end(&mut body)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::TimedOut => BackchannelError::Timeout,
                _ => BackchannelError::Body(e.to_string()),
            })?;
        if body.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(BackchannelError::BodyTooLarge(MAX_RESPONSE_BYTES));
        }
        let body = String::from_utf8(body).map_err(|e| BackchannelError::Body(e.to_string()))?;

        Ok(BackchannelResponse { status, body })
    }
}
