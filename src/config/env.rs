//! Environment variable loading

use std::env;
use std::str::FromStr;

/// Configuration values read from the environment.
///
/// Every field is optional here; defaults and required fields are resolved
/// when merging with YAML.
#[derive(Debug, Clone, Default)]
pub(super) struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<String>,

    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub client_id: Option<String>,
    pub max_retries: Option<u32>,
    pub backoff_seconds: Option<f64>,

    pub system_message: Option<String>,
    pub temperature: Option<f64>,
    pub max_response_output_tokens: Option<u32>,
    pub disable_audio: Option<bool>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: var("HOST"),
            port: parse("PORT")?,
            static_dir: var("STATIC_DIR"),

            endpoint: var("AZURE_OPENAI_ENDPOINT"),
            deployment: var("AZURE_OPENAI_DEPLOYMENT"),
            api_key: var("AZURE_OPENAI_API_KEY"),
            api_version: var("AZURE_OPENAI_API_VERSION"),
            client_id: var("AZURE_CLIENT_ID"),
            max_retries: parse("UPSTREAM_MAX_RETRIES")?,
            backoff_seconds: parse("UPSTREAM_BACKOFF_SECONDS")?,

            system_message: var("SYSTEM_MESSAGE"),
            temperature: parse("TEMPERATURE")?,
            max_response_output_tokens: parse("MAX_RESPONSE_OUTPUT_TOKENS")?,
            disable_audio: parse_bool("DISABLE_AUDIO")?,
        })
    }
}

/// Non-empty, trimmed value of `name`.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| format!("Invalid {name} value '{value}': {e}").into()),
        None => Ok(None),
    }
}

fn parse_bool(name: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match var(name).map(|value| value.to_ascii_lowercase()) {
        Some(value) => match value.as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid {name} value '{value}': expected a boolean").into()),
        },
        None => Ok(None),
    }
}
