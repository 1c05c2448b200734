//! Merging YAML and environment configurations

use std::path::PathBuf;

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{
    DEFAULT_BACKOFF_SECONDS, DEFAULT_HOST, DEFAULT_MAX_RETRIES, DEFAULT_PORT, ServerConfig,
};
use crate::core::relay::upstream::DEFAULT_API_VERSION;

/// Build the final configuration: YAML values win over the environment,
/// which wins over defaults.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let upstream = yaml.upstream.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();

    let azure_openai_endpoint = upstream
        .endpoint
        .or(env.endpoint)
        .ok_or("AZURE_OPENAI_ENDPOINT is required (or upstream.endpoint in YAML)")?;
    let azure_openai_deployment = upstream
        .deployment
        .or(env.deployment)
        .ok_or("AZURE_OPENAI_DEPLOYMENT is required (or upstream.deployment in YAML)")?;

    Ok(ServerConfig {
        host: server
            .host
            .or(env.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: server.port.or(env.port).unwrap_or(DEFAULT_PORT),
        static_dir: server.static_dir.or(env.static_dir).map(PathBuf::from),

        azure_openai_endpoint,
        azure_openai_deployment,
        azure_openai_api_key: upstream.api_key.or(env.api_key),
        azure_openai_api_version: upstream
            .api_version
            .or(env.api_version)
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        azure_client_id: upstream.client_id.or(env.client_id),
        upstream_max_retries: upstream
            .max_retries
            .or(env.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES),
        upstream_backoff_seconds: upstream
            .backoff_seconds
            .or(env.backoff_seconds)
            .unwrap_or(DEFAULT_BACKOFF_SECONDS),

        system_message: session.system_message.or(env.system_message),
        temperature: session.temperature.or(env.temperature),
        max_response_output_tokens: session
            .max_response_output_tokens
            .or(env.max_response_output_tokens),
        disable_audio: session.disable_audio.or(env.disable_audio),

        tools: yaml.tools,
    })
}
