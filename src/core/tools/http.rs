//! Webhook-backed tool

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{Tool, ToolError, ToolResult, ToolResultDirection};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Declarative definition of an HTTP tool, as found in the YAML `tools` section.
///
/// ```yaml
/// tools:
///   - name: search
///     description: Search the knowledge base
///     url: "http://localhost:9000/search"
///     destination: server
///     parameters:
///       type: object
///       properties:
///         query: { type: string }
///       required: [query]
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HttpToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_parameters")]
    pub parameters: Value,
    pub url: String,
    #[serde(default)]
    pub destination: ToolResultDirection,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Tool that POSTs its arguments as JSON to a webhook.
///
/// A JSON string response is used verbatim; any other JSON body is passed
/// through as the payload. Non-JSON bodies are used as plain text.
pub struct HttpTool {
    schema: Value,
    url: String,
    destination: ToolResultDirection,
    headers: HashMap<String, String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpTool {
    pub fn new(config: HttpToolConfig) -> Self {
        let mut schema = json!({
            "type": "function",
            "name": config.name,
            "parameters": config.parameters,
        });
        if let Some(description) = config.description {
            schema["description"] = Value::String(description);
        }

        Self {
            schema,
            url: config.url,
            destination: config.destination,
            headers: config.headers,
            timeout: Duration::from_secs(config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            client: reqwest::Client::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn schema(&self) -> &Value {
        &self.schema
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        debug!(tool = ?self.name(), url = %self.url, "HTTP tool request");

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&arguments);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Transport(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Invocation(format!("HTTP {status} - {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(format!("Failed to read response: {e}")))?;

        let payload = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
        Ok(ToolResult::new(payload, self.destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String) -> HttpToolConfig {
        HttpToolConfig {
            name: "search".to_string(),
            description: Some("Search the knowledge base".to_string()),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
            url,
            destination: ToolResultDirection::Server,
            timeout_seconds: None,
            headers: HashMap::new(),
        }
    }

    #[test]
    fn test_schema_built_from_config() {
        let tool = HttpTool::new(config("http://localhost/search".to_string()));
        let schema = tool.schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["name"], "search");
        assert_eq!(schema["description"], "Search the knowledge base");
        assert_eq!(schema["parameters"]["required"][0], "query");
        assert_eq!(tool.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_config_from_yaml_defaults() {
        let yaml = r#"
name: report_grounding
url: "http://localhost/grounding"
destination: client
"#;
        let config: HttpToolConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.destination, ToolResultDirection::Client);
        assert_eq!(config.parameters["type"], "object");
        assert!(config.description.is_none());
    }

    #[tokio::test]
    async fn test_call_posts_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("x-tenant", "kb"))
            .and(body_json(json!({"query": "x"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("hit")))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(format!("{}/search", server.uri()));
        cfg.headers.insert("x-tenant".to_string(), "kb".to_string());
        let tool = HttpTool::new(cfg);

        let result = tool.call(json!({"query": "x"})).await.unwrap();
        assert_eq!(result.to_text(), "hit");
        assert_eq!(result.destination, ToolResultDirection::Server);
    }

    #[tokio::test]
    async fn test_call_keeps_structured_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"sources": ["a.pdf"]})),
            )
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.destination = ToolResultDirection::Client;
        let tool = HttpTool::new(cfg);

        let result = tool.call(json!({})).await.unwrap();
        assert_eq!(result.destination, ToolResultDirection::Client);
        assert_eq!(result.to_text(), r#"{"sources":["a.pdf"]}"#);
    }

    #[tokio::test]
    async fn test_plain_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain answer"))
            .mount(&server)
            .await;

        let tool = HttpTool::new(config(server.uri()));
        let result = tool.call(json!({})).await.unwrap();
        assert_eq!(result.to_text(), "plain answer");
    }

    #[tokio::test]
    async fn test_error_status_is_invocation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let tool = HttpTool::new(config(server.uri()));
        let err = tool.call(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Invocation(msg) if msg.contains("500")));
    }
}
