//! Realtime relay WebSocket handler
//!
//! Clients speak the upstream realtime protocol unchanged. The relay hides its
//! own session configuration and tool calls, and may additionally send
//! `extension.middle_tier_tool_response` messages carrying tool results meant
//! for display.

mod handler;

pub use handler::realtime_handler;
