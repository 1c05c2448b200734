//! Configuration validation logic

use std::collections::HashSet;

use url::Url;

use crate::core::tools::HttpToolConfig;

/// The endpoint must be an absolute `http(s)` or `ws(s)` URL.
pub(super) fn validate_endpoint(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url =
        Url::parse(endpoint).map_err(|e| format!("Invalid upstream endpoint '{endpoint}': {e}"))?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(()),
        scheme => Err(format!(
            "Invalid upstream endpoint '{endpoint}': unsupported scheme '{scheme}'"
        )
        .into()),
    }
}

pub(super) fn validate_temperature(
    temperature: Option<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    match temperature {
        Some(t) if !(0.0..=2.0).contains(&t) => {
            Err(format!("Temperature must be between 0.0 and 2.0, got {t}").into())
        }
        _ => Ok(()),
    }
}

pub(super) fn validate_retry(
    max_retries: u32,
    backoff_seconds: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    if max_retries == 0 {
        return Err("Upstream max retries must be at least 1".into());
    }
    if !backoff_seconds.is_finite() || backoff_seconds < 0.0 {
        return Err(format!(
            "Upstream backoff must be a non-negative number, got {backoff_seconds}"
        )
        .into());
    }
    Ok(())
}

/// Tool names must be non-empty and unique, and every tool needs a URL.
pub(super) fn validate_tools(tools: &[HttpToolConfig]) -> Result<(), Box<dyn std::error::Error>> {
    let mut seen = HashSet::new();
    for tool in tools {
        if tool.name.trim().is_empty() {
            return Err("Tool name cannot be empty".into());
        }
        if !seen.insert(tool.name.as_str()) {
            return Err(format!("Duplicate tool name: {}", tool.name).into());
        }
        Url::parse(&tool.url).map_err(|e| format!("Invalid URL for tool {}: {e}", tool.name))?;
    }
    Ok(())
}
