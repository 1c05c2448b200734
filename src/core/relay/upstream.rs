//! Upstream realtime connection with rate-limit retry.

use std::time::Duration;

use http::{HeaderValue, StatusCode};
use rand::Rng;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::error::{RelayError, RelayResult};
use crate::core::credentials::Credential;

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_API_VERSION: &str = "2024-10-01-preview";
pub const REALTIME_PATH: &str = "/openai/realtime";
/// Correlation header copied from the client handshake
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Retry policy for handshakes rejected with 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total handshake attempts, including the first
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Upper bound (exclusive) of the uniform jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff_base: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th rejection (1-based): linear in the
    /// attempt number plus jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base.saturating_mul(attempt);
        if self.max_jitter.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..self.max_jitter);
        base.saturating_add(jitter)
    }
}

/// Where and how to reach the upstream realtime service.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// `https://`, `http://`, `wss://` or `ws://` base endpoint
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub credential: Credential,
    pub retry: RetryPolicy,
}

impl UpstreamConfig {
    pub fn new(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credential,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// WebSocket URL of the realtime endpoint.
    pub fn websocket_url(&self) -> RelayResult<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| RelayError::InvalidUrl(format!("{}: {e}", self.endpoint)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(RelayError::InvalidUrl(format!(
                    "unsupported scheme '{other}' in {}",
                    self.endpoint
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| RelayError::InvalidUrl(self.endpoint.clone()))?;

        url.set_path(REALTIME_PATH);
        url.query_pairs_mut()
            .clear()
            .append_pair("api-version", &self.api_version)
            .append_pair("deployment", &self.deployment);
        Ok(url)
    }
}

/// Opens upstream sessions on behalf of clients.
#[derive(Debug, Clone)]
pub struct UpstreamConnector {
    config: UpstreamConfig,
}

impl UpstreamConnector {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Connect to the upstream, retrying while the handshake is rejected
    /// with 429. Any other failure is returned immediately.
    pub async fn connect(&self, client_request_id: Option<&str>) -> RelayResult<UpstreamSocket> {
        let url = self.config.websocket_url()?;
        let retry = self.config.retry;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self.build_request(&url, client_request_id).await?;

            match tokio_tungstenite::connect_async(request).await {
                Ok((socket, _response)) => {
                    info!(attempt, "Connected to upstream realtime service");
                    return Ok(socket);
                }
                Err(tungstenite::Error::Http(response))
                    if response.status() == StatusCode::TOO_MANY_REQUESTS =>
                {
                    if attempt >= retry.max_attempts {
                        warn!(attempts = attempt, "Upstream rate limit retries exhausted");
                        return Err(RelayError::RateLimitExhausted { attempts: attempt });
                    }
                    let delay = retry.delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limit exceeded, retrying upstream handshake"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(tungstenite::Error::Http(response)) => {
                    return Err(RelayError::Handshake(format!(
                        "upstream responded with HTTP {}",
                        response.status()
                    )));
                }
                Err(e) => return Err(RelayError::Handshake(e.to_string())),
            }
        }
    }

    async fn build_request(
        &self,
        url: &Url,
        client_request_id: Option<&str>,
    ) -> RelayResult<tungstenite::handshake::client::Request> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::InvalidUrl(e.to_string()))?;

        let (name, value) = self.config.credential.auth_header().await?;
        let headers = request.headers_mut();
        headers.insert(name, value);

        if let Some(id) = client_request_id {
            match HeaderValue::from_str(id) {
                Ok(value) => {
                    headers.insert(CLIENT_REQUEST_ID_HEADER, value);
                }
                Err(_) => debug!("Ignoring client request id that is not a valid header value"),
            }
        }

        Ok(request)
    }
}
