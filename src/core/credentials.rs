//! Upstream authentication.
//!
//! The upstream accepts either a static `api-key` header or an Entra ID bearer
//! token. Bearer tokens are obtained from a [`TokenProvider`] on every
//! handshake attempt so that long-running servers never reuse an expired token.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, header::AUTHORIZATION};
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroizing;

/// Resource scope requested for Cognitive Services tokens.
pub const COGNITIVE_SERVICES_RESOURCE: &str = "https://cognitiveservices.azure.com/";

/// Instance metadata identity endpoint.
pub const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Token request failed: {0}")]
    Request(String),

    #[error("Token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Credential is not a valid header value")]
    InvalidHeader,
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, CredentialError>;
}

/// How the relay authenticates against the upstream.
#[derive(Clone)]
pub enum Credential {
    ApiKey(Zeroizing<String>),
    Bearer(Arc<dyn TokenProvider>),
}

impl Credential {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(Zeroizing::new(key.into()))
    }

    pub fn bearer<P: TokenProvider + 'static>(provider: P) -> Self {
        Self::Bearer(Arc::new(provider))
    }

    /// Resolve the header to attach to the next handshake.
    pub async fn auth_header(&self) -> Result<(HeaderName, HeaderValue), CredentialError> {
        match self {
            Self::ApiKey(key) => {
                let mut value =
                    HeaderValue::from_str(key).map_err(|_| CredentialError::InvalidHeader)?;
                value.set_sensitive(true);
                Ok((API_KEY_HEADER, value))
            }
            Self::Bearer(provider) => {
                let token = Zeroizing::new(provider.token().await?);
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                    .map_err(|_| CredentialError::InvalidHeader)?;
                value.set_sensitive(true);
                Ok((AUTHORIZATION, value))
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("Credential::ApiKey(<redacted>)"),
            Self::Bearer(_) => f.write_str("Credential::Bearer(<provider>)"),
        }
    }
}

/// Fixed bearer token.
pub struct StaticTokenProvider(Zeroizing<String>);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, CredentialError> {
        Ok(self.0.as_str().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds since the epoch. IMDS returns it as a string, App Service as a number.
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn lifetime(&self) -> Option<Duration> {
        fn as_u64(value: &serde_json::Value) -> Option<u64> {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        }

        if let Some(secs) = self.expires_in.as_ref().and_then(as_u64) {
            return Some(Duration::from_secs(secs));
        }
        let expires_on = self.expires_on.as_ref().and_then(as_u64)?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        Some(Duration::from_secs(expires_on.saturating_sub(now)))
    }
}

struct CachedToken {
    token: Zeroizing<String>,
    refresh_at: Instant,
}

/// Managed identity token source.
///
/// Uses the App Service identity endpoint when `IDENTITY_ENDPOINT` and
/// `IDENTITY_HEADER` are set, otherwise the instance metadata service.
pub struct ManagedIdentityTokenProvider {
    client: reqwest::Client,
    endpoint: String,
    identity_header: Option<String>,
    client_id: Option<String>,
    resource: String,
    cache: Mutex<Option<CachedToken>>,
}

impl ManagedIdentityTokenProvider {
    pub fn from_env(client_id: Option<String>) -> Self {
        match (
            std::env::var("IDENTITY_ENDPOINT").ok(),
            std::env::var("IDENTITY_HEADER").ok(),
        ) {
            (Some(endpoint), Some(header)) => {
                Self::with_endpoint(endpoint, Some(header), client_id)
            }
            _ => Self::with_endpoint(IMDS_TOKEN_URL.to_string(), None, client_id),
        }
    }

    pub fn with_endpoint(
        endpoint: String,
        identity_header: Option<String>,
        client_id: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            identity_header,
            client_id,
            resource: COGNITIVE_SERVICES_RESOURCE.to_string(),
            cache: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<String> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|cached| Instant::now() < cached.refresh_at)
            .map(|cached| cached.token.as_str().to_string())
    }

    async fn fetch(&self) -> Result<TokenResponse, CredentialError> {
        let api_version = if self.identity_header.is_some() {
            APP_SERVICE_API_VERSION
        } else {
            IMDS_API_VERSION
        };

        let mut query = vec![
            ("api-version", api_version.to_string()),
            ("resource", self.resource.clone()),
        ];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.clone()));
        }

        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .timeout(Duration::from_secs(10));
        request = match &self.identity_header {
            Some(header) => request.header("X-IDENTITY-HEADER", header),
            None => request.header("Metadata", "true"),
        };

        let response = request
            .send()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self) -> Result<String, CredentialError> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let response = self.fetch().await?;
        let lifetime = response.lifetime().unwrap_or(REFRESH_MARGIN);
        let refresh_at = Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN);

        tracing::debug!(
            lifetime_secs = lifetime.as_secs(),
            "Obtained managed identity token"
        );

        let token = response.access_token.clone();
        *self.cache.lock() = Some(CachedToken {
            token: Zeroizing::new(response.access_token),
            refresh_at,
        });
        Ok(token)
    }
}
