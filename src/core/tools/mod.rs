//! Tool capability consumed by the relay.
//!
//! Tools are external collaborators: the relay only knows their JSON schema
//! and how to call them. A [`ToolRegistry`] is filled before the server starts
//! accepting connections and is shared read-only afterwards.
//!
//! # Example
//!
//! ```rust
//! use realtime_relay::core::tools::{FnTool, ToolRegistry, ToolResult};
//! use serde_json::json;
//!
//! let mut registry = ToolRegistry::new();
//! registry
//!     .register(FnTool::new(
//!         json!({
//!             "type": "function",
//!             "name": "echo",
//!             "parameters": {"type": "object", "properties": {}}
//!         }),
//!         |args| async move { Ok(ToolResult::to_server(args)) },
//!     ))
//!     .unwrap();
//!
//! assert_eq!(registry.len(), 1);
//! ```

mod http;

pub use http::{HttpTool, HttpToolConfig};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors raised by tools or by registry bookkeeping.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool ran but could not produce a result
    #[error("Tool invocation failed: {0}")]
    Invocation(String),

    /// The tool's backing service could not be reached
    #[error("Tool transport error: {0}")]
    Transport(String),

    /// The schema has no usable `name` field
    #[error("Tool schema is missing a name")]
    MissingName,

    /// A tool with the same name is already registered
    #[error("Tool already registered: {0}")]
    Duplicate(String),
}

/// Where a tool result is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultDirection {
    /// The result is the function's return value, consumed by the model
    #[default]
    #[serde(alias = "to_server")]
    Server,
    /// The result is surfaced to the client through the extension message
    #[serde(alias = "to_client")]
    Client,
}

/// Output of a tool invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolResult {
    pub payload: Option<Value>,
    pub destination: ToolResultDirection,
}

impl ToolResult {
    pub fn new(payload: impl Into<Value>, destination: ToolResultDirection) -> Self {
        Self {
            payload: Some(payload.into()),
            destination,
        }
    }

    /// Result consumed by the model only.
    pub fn to_server(payload: impl Into<Value>) -> Self {
        Self::new(payload, ToolResultDirection::Server)
    }

    /// Result additionally surfaced to the client.
    pub fn to_client(payload: impl Into<Value>) -> Self {
        Self::new(payload, ToolResultDirection::Client)
    }

    /// Empty result for the model, used when a call cannot be completed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalize the payload to text.
    ///
    /// Absent or `null` payloads become the empty string, strings are used
    /// verbatim and any other JSON value is serialized compactly.
    pub fn to_text(&self) -> String {
        match &self.payload {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// A callable tool advertised to the upstream model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// JSON schema sent in `session.update` (`type`, `name`, `description`, `parameters`).
    fn schema(&self) -> &Value;

    /// Invoke the tool with already-parsed arguments.
    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError>;

    fn name(&self) -> Option<&str> {
        self.schema().get("name").and_then(Value::as_str)
    }
}

type BoxedToolFuture = Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send>>;

/// Tool backed by an async closure.
pub struct FnTool {
    schema: Value,
    handler: Box<dyn Fn(Value) -> BoxedToolFuture + Send + Sync>,
}

impl FnTool {
    pub fn new<F, Fut>(schema: Value, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        Self {
            schema,
            handler: Box::new(move |args| -> BoxedToolFuture { Box::pin(handler(args)) }),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn schema(&self) -> &Value {
        &self.schema
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        (self.handler)(arguments).await
    }
}

/// Name-keyed set of tools, kept in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under the name found in its schema.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<(), ToolError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool
            .name()
            .filter(|name| !name.is_empty())
            .ok_or(ToolError::MissingName)?
            .to_string();

        if self.by_name.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }

        debug!(tool = %name, "Registered tool");
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&idx| self.tools[idx].clone())
    }

    /// Schemas of all registered tools, in registration order.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.iter().map(|tool| tool.schema().clone()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().filter_map(|tool| tool.name())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(name: &str) -> Value {
        json!({
            "type": "function",
            "name": name,
            "description": format!("{name} tool"),
            "parameters": {"type": "object", "properties": {}}
        })
    }

    fn noop(name: &str) -> FnTool {
        FnTool::new(schema(name), |_| async { Ok(ToolResult::empty()) })
    }

    #[test]
    fn test_to_text_normalizes_payloads() {
        assert_eq!(ToolResult::empty().to_text(), "");
        assert_eq!(ToolResult::to_server(Value::Null).to_text(), "");
        assert_eq!(ToolResult::to_server("hit").to_text(), "hit");
        assert_eq!(
            ToolResult::to_client(json!({"sources": ["a.pdf"]})).to_text(),
            r#"{"sources":["a.pdf"]}"#
        );
        assert_eq!(ToolResult::to_server(json!(42)).to_text(), "42");
    }

    #[test]
    fn test_empty_result_goes_to_server() {
        assert_eq!(ToolResult::empty().destination, ToolResultDirection::Server);
    }

    #[test]
    fn test_registry_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(noop("search")).unwrap();
        registry.register(noop("report_grounding")).unwrap();
        registry.register(noop("alpha")).unwrap();

        let names: Vec<_> = registry
            .schemas()
            .iter()
            .map(|s| s["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["search", "report_grounding", "alpha"]);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(noop("search")).unwrap();
        let err = registry.register(noop("search")).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(name) if name == "search"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_rejects_missing_name() {
        let mut registry = ToolRegistry::new();
        let tool = FnTool::new(json!({"type": "function"}), |_| async {
            Ok(ToolResult::empty())
        });
        assert!(matches!(
            registry.register(tool),
            Err(ToolError::MissingName)
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_fn_tool_receives_arguments() {
        let tool = FnTool::new(schema("search"), |args| async move {
            let query = args["query"].as_str().unwrap_or_default().to_string();
            Ok(ToolResult::to_server(format!("results for {query}")))
        });

        let result = tool.call(json!({"query": "x"})).await.unwrap();
        assert_eq!(result.to_text(), "results for x");
        assert_eq!(tool.name(), Some("search"));
    }

    #[test]
    fn test_direction_deserialization() {
        let server: ToolResultDirection = serde_json::from_str(r#""server""#).unwrap();
        let client: ToolResultDirection = serde_json::from_str(r#""to_client""#).unwrap();
        assert_eq!(server, ToolResultDirection::Server);
        assert_eq!(client, ToolResultDirection::Client);
    }
}
