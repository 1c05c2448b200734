//! Per-direction message rewriting.
//!
//! The client must see a session that looks as if the server had no
//! configuration and the model never called a tool. Server-side configuration
//! is injected on the way up, and function-call traffic is stripped on the way
//! down while the relay executes the calls itself.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, info, warn};

use super::dispatch::{FunctionCall, ToolDispatcher};
use super::error::{RelayError, RelayResult};
use super::events::{
    ClientBoundEvent, ResponseBody, ServerBoundEvent, TOOL_CHOICE_AUTO, TOOL_CHOICE_NONE,
    UpstreamCommand, event_types,
};
use super::outbox::Outbox;
use super::pending::PendingToolCalls;
use crate::core::tools::{Tool, ToolRegistry};

/// Outcome of rewriting one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Forward this text to the other side
    Forward(String),
    /// Drop the frame
    Suppress,
}

/// Server-side session settings injected into every `session.update`.
///
/// Fields left as `None` keep whatever the client sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOverrides {
    pub system_message: Option<String>,
    pub temperature: Option<f64>,
    pub max_response_output_tokens: Option<u32>,
    pub disable_audio: Option<bool>,
}

// =============================================================================
// Client -> upstream
// =============================================================================

/// Rewrites client-to-upstream frames.
#[derive(Debug, Clone)]
pub struct ServerBoundRewriter {
    overrides: Arc<SessionOverrides>,
    registry: Arc<ToolRegistry>,
}

impl ServerBoundRewriter {
    pub fn new(overrides: Arc<SessionOverrides>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            overrides,
            registry,
        }
    }

    pub fn rewrite(&self, text: &str) -> RelayResult<Disposition> {
        match ServerBoundEvent::parse(text)? {
            ServerBoundEvent::SessionUpdate(mut envelope) => {
                let session = &mut envelope.session;
                if let Some(system_message) = &self.overrides.system_message {
                    session.instructions = Some(system_message.clone());
                }
                if let Some(temperature) = self.overrides.temperature {
                    session.temperature = Some(temperature);
                }
                if let Some(max_tokens) = self.overrides.max_response_output_tokens {
                    session.max_response_output_tokens = Some(Value::from(max_tokens));
                }
                if let Some(disable_audio) = self.overrides.disable_audio {
                    session.disable_audio = Some(disable_audio);
                }

                let tool_choice = if self.registry.is_empty() {
                    TOOL_CHOICE_NONE
                } else {
                    TOOL_CHOICE_AUTO
                };
                session.tool_choice = Some(Value::from(tool_choice));
                session.tools = Some(self.registry.schemas());

                debug!(tools = self.registry.len(), "Injected session configuration");
                Ok(Disposition::Forward(serde_json::to_string(&envelope)?))
            }
            ServerBoundEvent::Other { .. } => Ok(Disposition::Forward(text.to_string())),
        }
    }
}

// =============================================================================
// Upstream -> client
// =============================================================================

/// Rewrites upstream-to-client frames and drives tool calls.
///
/// Owns the pair's pending-call set. Tool dispatches run as separate tasks so
/// a slow tool never holds up reading the next upstream frame; they are
/// aborted when the rewriter is dropped at session teardown.
pub struct ClientBoundRewriter {
    registry: Arc<ToolRegistry>,
    pending: PendingToolCalls,
    upstream: Outbox,
    dispatcher: ToolDispatcher,
    /// Dispatches of the current response cycle
    in_flight: JoinSet<()>,
    /// Tasks waiting on a cycle's dispatches before sending `response.create`
    continuations: JoinSet<()>,
}

impl ClientBoundRewriter {
    pub fn new(registry: Arc<ToolRegistry>, upstream: Outbox, client: Outbox) -> Self {
        Self {
            registry,
            pending: PendingToolCalls::new(),
            dispatcher: ToolDispatcher::new(upstream.clone(), client),
            upstream,
            in_flight: JoinSet::new(),
            continuations: JoinSet::new(),
        }
    }

    pub fn pending(&self) -> &PendingToolCalls {
        &self.pending
    }

    pub fn rewrite(&mut self, text: &str) -> RelayResult<Disposition> {
        match ClientBoundEvent::parse(text)? {
            ClientBoundEvent::SessionCreated(mut envelope) => {
                let session = &mut envelope.session;
                session.instructions = Some(String::new());
                session.tools = Some(Vec::new());
                session.tool_choice = Some(Value::from(TOOL_CHOICE_NONE));
                session.max_response_output_tokens = Some(Value::Null);
                Ok(Disposition::Forward(serde_json::to_string(&envelope)?))
            }

            ClientBoundEvent::OutputItemAdded(envelope) => {
                if envelope.function_call().is_some() {
                    Ok(Disposition::Suppress)
                } else {
                    Ok(Disposition::Forward(text.to_string()))
                }
            }

            ClientBoundEvent::ConversationItemCreated(envelope) => {
                if let Some(item) = envelope.function_call() {
                    let call_id = item.call_id.as_deref().ok_or(RelayError::MissingField {
                        event: event_types::CONVERSATION_ITEM_CREATED,
                        field: "item.call_id",
                    })?;
                    let previous_item_id = envelope.previous_item_id.as_deref().unwrap_or_default();
                    if self.pending.insert(call_id, previous_item_id) {
                        debug!(call_id, previous_item_id, "Tracking tool call");
                    }
                    Ok(Disposition::Suppress)
                } else if envelope.has_function_call_output() {
                    Ok(Disposition::Suppress)
                } else {
                    Ok(Disposition::Forward(text.to_string()))
                }
            }

            ClientBoundEvent::FunctionCallArgumentsDelta
            | ClientBoundEvent::FunctionCallArgumentsDone => Ok(Disposition::Suppress),

            ClientBoundEvent::OutputItemDone(envelope) => {
                let Some(item) = envelope.function_call() else {
                    return Ok(Disposition::Forward(text.to_string()));
                };
                let missing = |field| RelayError::MissingField {
                    event: event_types::RESPONSE_OUTPUT_ITEM_DONE,
                    field,
                };
                let call_id = item.call_id.clone().ok_or_else(|| missing("item.call_id"))?;
                let name = item.name.clone().ok_or_else(|| missing("item.name"))?;

                let pending = self
                    .pending
                    .get(&call_id)
                    .ok_or_else(|| RelayError::UnknownCall(call_id.clone()))?;
                let tool = self
                    .registry
                    .get(&name)
                    .ok_or_else(|| RelayError::UnregisteredTool(name.clone()))?;

                let call = FunctionCall {
                    previous_item_id: pending.previous_item_id.clone(),
                    arguments: item.arguments.clone().unwrap_or_default(),
                    call_id,
                    name,
                };
                self.spawn_dispatch(tool, call);
                Ok(Disposition::Suppress)
            }

            ClientBoundEvent::ResponseDone(envelope) => {
                if !self.pending.is_empty() {
                    let cleared = self.pending.clear();
                    info!(cleared, "Tool calls completed, requesting continuation");
                    self.spawn_continuation();
                }

                let Some(mut envelope) = envelope else {
                    warn!("Unrecognised response.done body, forwarding as received");
                    return Ok(Disposition::Forward(text.to_string()));
                };
                let removed = envelope
                    .response
                    .as_mut()
                    .map(ResponseBody::remove_function_calls)
                    .unwrap_or(0);
                if removed > 0 {
                    Ok(Disposition::Forward(serde_json::to_string(&envelope)?))
                } else {
                    Ok(Disposition::Forward(text.to_string()))
                }
            }

            ClientBoundEvent::Other { .. } => Ok(Disposition::Forward(text.to_string())),
        }
    }

    fn spawn_dispatch(&mut self, tool: Arc<dyn Tool>, call: FunctionCall) {
        while self.in_flight.try_join_next().is_some() {}

        let dispatcher = self.dispatcher.clone();
        self.in_flight.spawn(
            async move {
                let call_id = call.call_id.clone();
                if let Err(e) = dispatcher.dispatch(tool, call).await {
                    warn!(call_id = %call_id, "Failed to deliver tool result: {}", e);
                }
            }
            .instrument(Span::current()),
        );
    }

    /// Send `response.create` once every dispatch of this cycle has delivered
    /// its output, so the model continues with all results in place.
    fn spawn_continuation(&mut self) {
        while self.continuations.try_join_next().is_some() {}

        let mut dispatches = std::mem::take(&mut self.in_flight);
        let upstream = self.upstream.clone();
        self.continuations.spawn(
            async move {
                while dispatches.join_next().await.is_some() {}
                if let Err(e) = upstream.send_json(&UpstreamCommand::ResponseCreate).await {
                    debug!("Could not request continuation: {}", e);
                }
            }
            .instrument(Span::current()),
        );
    }
}
