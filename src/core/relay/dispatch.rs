//! Tool invocation for completed function calls.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::error::RelayResult;
use super::events::{ClientNotice, FunctionCallOutput, UpstreamCommand};
use super::outbox::Outbox;
use crate::core::tools::{Tool, ToolResult, ToolResultDirection};

/// A function call ready to be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    /// JSON-encoded arguments exactly as streamed by the model
    pub arguments: String,
    pub previous_item_id: String,
}

/// Runs tools and routes their results.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    upstream: Outbox,
    client: Outbox,
}

impl ToolDispatcher {
    pub fn new(upstream: Outbox, client: Outbox) -> Self {
        Self { upstream, client }
    }

    /// Invoke `tool` for `call` and deliver the result.
    ///
    /// The upstream always receives a `function_call_output` for the call.
    /// Its `output` is empty when the result is destined for the client,
    /// which instead gets an `extension.middle_tier_tool_response`.
    pub async fn dispatch(&self, tool: Arc<dyn Tool>, call: FunctionCall) -> RelayResult<()> {
        let result = invoke(tool.as_ref(), &call).await;
        let text = result.to_text();

        debug!(
            call_id = %call.call_id,
            tool = %call.name,
            destination = ?result.destination,
            bytes = text.len(),
            "Tool call completed"
        );

        let output = match result.destination {
            ToolResultDirection::Server => text.clone(),
            ToolResultDirection::Client => String::new(),
        };
        self.upstream
            .send_json(&UpstreamCommand::ConversationItemCreate {
                item: FunctionCallOutput::new(call.call_id.as_str(), output),
            })
            .await?;

        if result.destination == ToolResultDirection::Client {
            self.client
                .send_json(&ClientNotice::ToolResponse {
                    previous_item_id: call.previous_item_id,
                    tool_name: call.name,
                    tool_result: text,
                })
                .await?;
        }

        Ok(())
    }
}

/// Parse the arguments and call the tool.
///
/// Never fails: malformed arguments skip the tool entirely and a failing
/// tool degrades to an empty result, so the model always gets an output.
pub async fn invoke(tool: &dyn Tool, call: &FunctionCall) -> ToolResult {
    let arguments: Value = match serde_json::from_str(&call.arguments) {
        Ok(arguments) => arguments,
        Err(e) => {
            warn!(
                call_id = %call.call_id,
                tool = %call.name,
                "Malformed tool arguments, returning empty output: {}",
                e
            );
            return ToolResult::empty();
        }
    };

    match tool.call(arguments).await {
        Ok(result) => result,
        Err(e) => {
            warn!(
                call_id = %call.call_id,
                tool = %call.name,
                "Tool failed, returning empty output: {}",
                e
            );
            ToolResult::empty()
        }
    }
}
