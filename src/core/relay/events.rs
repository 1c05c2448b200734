//! Realtime API wire messages handled by the relay.
//!
//! Only the message types the relay rewrites are modelled. Every struct keeps
//! the fields it does not know about in a flattened `extra` map, so a rewritten
//! message carries the rest of the payload through untouched. Messages of any
//! other type are represented by their `type` tag alone and forwarded as the
//! original text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `type` tags recognised by the relay.
pub mod event_types {
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_UPDATE: &str = "session.update";
    pub const RESPONSE_OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
    pub const RESPONSE_OUTPUT_ITEM_DONE: &str = "response.output_item.done";
    pub const CONVERSATION_ITEM_CREATED: &str = "conversation.item.created";
    pub const FUNCTION_CALL_ARGUMENTS_DELTA: &str = "response.function_call_arguments.delta";
    pub const FUNCTION_CALL_ARGUMENTS_DONE: &str = "response.function_call_arguments.done";
    pub const RESPONSE_DONE: &str = "response.done";

    pub const CONVERSATION_ITEM_CREATE: &str = "conversation.item.create";
    pub const RESPONSE_CREATE: &str = "response.create";
    pub const TOOL_RESPONSE_EXTENSION: &str = "extension.middle_tier_tool_response";
}

/// Item type of a function call.
pub const FUNCTION_CALL: &str = "function_call";
/// Item type of a function call result.
pub const FUNCTION_CALL_OUTPUT: &str = "function_call_output";

pub const TOOL_CHOICE_AUTO: &str = "auto";
pub const TOOL_CHOICE_NONE: &str = "none";

#[derive(Deserialize)]
struct Tag {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Parse only the `type` tag, validating that the frame is JSON.
fn parse_tag(text: &str) -> Result<String, serde_json::Error> {
    let tag: Tag = serde_json::from_str(text)?;
    Ok(tag.kind.unwrap_or_default())
}

// =============================================================================
// Session
// =============================================================================

/// `session` object of `session.created` and `session.update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,

    /// `"auto"`, `"none"`, `"required"` or a function selector object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Number, `"inf"`, or an explicit `null`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_audio: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub session: SessionConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Items
// =============================================================================

/// Conversation item as carried by item and output-item events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type", default)]
    pub item_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// JSON-encoded arguments of a function call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn is_function_call(&self) -> bool {
        self.item_type == FUNCTION_CALL
    }

    pub fn is_function_call_output(&self) -> bool {
        self.item_type == FUNCTION_CALL_OUTPUT
    }
}

/// Envelope of `response.output_item.*` and `conversation.item.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_item_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemEnvelope {
    pub fn function_call(&self) -> Option<&Item> {
        self.item.as_ref().filter(|item| item.is_function_call())
    }

    pub fn has_function_call_output(&self) -> bool {
        self.item
            .as_ref()
            .is_some_and(Item::is_function_call_output)
    }
}

// =============================================================================
// Response
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<Value>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseBody {
    /// Drop every `function_call` entry from `output`, keeping the order of
    /// the rest. Returns how many entries were removed.
    pub fn remove_function_calls(&mut self) -> usize {
        let Some(output) = self.output.as_mut() else {
            return 0;
        };
        let before = output.len();
        output.retain(|entry| entry.get("type").and_then(Value::as_str) != Some(FUNCTION_CALL));
        before - output.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDoneEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseBody>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Inbound events
// =============================================================================

/// Upstream-to-client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientBoundEvent {
    SessionCreated(SessionEnvelope),
    OutputItemAdded(ItemEnvelope),
    OutputItemDone(ItemEnvelope),
    ConversationItemCreated(ItemEnvelope),
    FunctionCallArgumentsDelta,
    FunctionCallArgumentsDone,
    /// `None` when the body has an unexpected shape; the tag alone still
    /// drives the tool-call cycle
    ResponseDone(Option<ResponseDoneEnvelope>),
    /// Any other message; forwarded as received
    Other { kind: String },
}

impl ClientBoundEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        use event_types::*;

        let kind = parse_tag(text)?;
        Ok(match kind.as_str() {
            SESSION_CREATED => Self::SessionCreated(serde_json::from_str(text)?),
            RESPONSE_OUTPUT_ITEM_ADDED => Self::OutputItemAdded(serde_json::from_str(text)?),
            RESPONSE_OUTPUT_ITEM_DONE => Self::OutputItemDone(serde_json::from_str(text)?),
            CONVERSATION_ITEM_CREATED => {
                Self::ConversationItemCreated(serde_json::from_str(text)?)
            }
            FUNCTION_CALL_ARGUMENTS_DELTA => Self::FunctionCallArgumentsDelta,
            FUNCTION_CALL_ARGUMENTS_DONE => Self::FunctionCallArgumentsDone,
            RESPONSE_DONE => Self::ResponseDone(serde_json::from_str(text).ok()),
            _ => Self::Other { kind },
        })
    }
}

/// Client-to-upstream message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerBoundEvent {
    SessionUpdate(SessionEnvelope),
    Other { kind: String },
}

impl ServerBoundEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let kind = parse_tag(text)?;
        Ok(match kind.as_str() {
            event_types::SESSION_UPDATE => Self::SessionUpdate(serde_json::from_str(text)?),
            _ => Self::Other { kind },
        })
    }
}

// =============================================================================
// Messages produced by the relay
// =============================================================================

/// `function_call_output` conversation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutput {
    #[serde(rename = "type")]
    pub item_type: String,
    pub call_id: String,
    pub output: String,
}

impl FunctionCallOutput {
    pub fn new(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            item_type: FUNCTION_CALL_OUTPUT.to_string(),
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

/// Messages the relay originates towards the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamCommand {
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: FunctionCallOutput },

    #[serde(rename = "response.create")]
    ResponseCreate,
}

/// Side-channel messages the relay originates towards the client.
///
/// These are a protocol extension; clients that do not recognise the `type`
/// are expected to ignore them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientNotice {
    #[serde(rename = "extension.middle_tier_tool_response")]
    ToolResponse {
        previous_item_id: String,
        tool_name: String,
        tool_result: String,
    },
}
