use serde::Deserialize;
use std::path::PathBuf;

use crate::core::tools::HttpToolConfig;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values found here
/// override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8765
///   static_dir: "./static"
///
/// upstream:
///   endpoint: "https://my-resource.openai.azure.com"
///   deployment: "gpt-4o-realtime-preview"
///   api_key: "your-api-key"
///   api_version: "2024-10-01-preview"
///   client_id: "user-assigned-identity-client-id"
///   max_retries: 20
///   backoff_seconds: 1.0
///
/// session:
///   system_message: "You are a helpful assistant."
///   temperature: 0.6
///   max_response_output_tokens: 800
///   disable_audio: false
///
/// tools:
///   - name: search
///     description: Search the knowledge base
///     url: "http://localhost:9000/search"
///     parameters:
///       type: object
///       properties:
///         query: { type: string }
///   - name: report_grounding
///     url: "http://localhost:9000/grounding"
///     destination: client
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub upstream: Option<UpstreamYaml>,
    pub session: Option<SessionYaml>,
    pub tools: Vec<HttpToolConfig>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<String>,
}

/// Upstream realtime service from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    /// When absent, a managed identity token is used instead
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    /// Client id of a user-assigned managed identity
    pub client_id: Option<String>,
    pub max_retries: Option<u32>,
    pub backoff_seconds: Option<f64>,
}

/// Session overrides injected into `session.update`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub system_message: Option<String>,
    pub temperature: Option<f64>,
    pub max_response_output_tokens: Option<u32>,
    pub disable_audio: Option<bool>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
