//! Configuration module for the realtime relay
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use realtime_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::credentials::{Credential, ManagedIdentityTokenProvider};
use crate::core::relay::{RetryPolicy, SessionOverrides, UpstreamConfig};
use crate::core::tools::HttpToolConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_MAX_RETRIES: u32 = 20;
pub const DEFAULT_BACKOFF_SECONDS: f64 = 1.0;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served at `/` next to the relay endpoint
    pub static_dir: Option<PathBuf>,

    // Upstream
    pub azure_openai_endpoint: String,
    pub azure_openai_deployment: String,
    /// Static key sent as `api-key`; managed identity is used when absent
    pub azure_openai_api_key: Option<String>,
    pub azure_openai_api_version: String,
    /// Client id of a user-assigned managed identity
    pub azure_client_id: Option<String>,
    /// Total handshake attempts while the upstream answers 429
    /// Default: 20
    pub upstream_max_retries: u32,
    /// Linear backoff step between rate-limited attempts
    /// Default: 1.0
    pub upstream_backoff_seconds: f64,

    // Session overrides
    pub system_message: Option<String>,
    pub temperature: Option<f64>,
    pub max_response_output_tokens: Option<u32>,
    pub disable_audio: Option<bool>,

    /// Webhook tools registered at startup (YAML only)
    pub tools: Vec<HttpToolConfig>,
}

/// Zeroize secrets when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.azure_openai_api_key {
            key.zeroize();
        }
        for tool in &mut self.tools {
            for value in tool.headers.values_mut() {
                value.zeroize();
            }
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    ///
    /// The .env file is loaded by the binary before this is called.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_endpoint(&self.azure_openai_endpoint)?;
        if self.azure_openai_deployment.trim().is_empty() {
            return Err("Upstream deployment cannot be empty".into());
        }
        validation::validate_temperature(self.temperature)?;
        validation::validate_retry(self.upstream_max_retries, self.upstream_backoff_seconds)?;
        validation::validate_tools(&self.tools)?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_managed_identity(&self) -> bool {
        self.azure_openai_api_key.is_none()
    }

    /// Credential for the upstream: the static key when configured,
    /// otherwise a managed identity token provider.
    pub fn credential(&self) -> Credential {
        match &self.azure_openai_api_key {
            Some(key) => Credential::api_key(key.clone()),
            None => Credential::bearer(ManagedIdentityTokenProvider::from_env(
                self.azure_client_id.clone(),
            )),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.upstream_max_retries,
            backoff_base: Duration::try_from_secs_f64(self.upstream_backoff_seconds)
                .unwrap_or(Duration::from_secs(1)),
            ..RetryPolicy::default()
        }
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        let mut upstream = UpstreamConfig::new(
            self.azure_openai_endpoint.clone(),
            self.azure_openai_deployment.clone(),
            self.credential(),
        )
        .with_retry(self.retry_policy());
        upstream.api_version = self.azure_openai_api_version.clone();
        upstream
    }

    pub fn session_overrides(&self) -> SessionOverrides {
        SessionOverrides {
            system_message: self.system_message.clone(),
            temperature: self.temperature,
            max_response_output_tokens: self.max_response_output_tokens,
            disable_audio: self.disable_audio,
        }
    }
}
