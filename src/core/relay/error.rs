use thiserror::Error;

use crate::core::credentials::CredentialError;

/// Errors that can occur while relaying a session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The upstream kept rejecting the handshake with 429
    #[error("Rate limit exceeded: upstream rejected {attempts} handshake attempts")]
    RateLimitExhausted { attempts: u32 },

    /// The upstream rejected the handshake for a reason other than rate limiting
    #[error("Upstream handshake failed: {0}")]
    Handshake(String),

    /// The configured endpoint cannot be turned into a WebSocket URL
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The upstream requested a tool that was never registered
    #[error("Upstream requested unregistered tool: {0}")]
    UnregisteredTool(String),

    /// A function call completed without a matching `conversation.item.created`
    #[error("No pending tool call for call_id {0}")]
    UnknownCall(String),

    /// A protocol message lacked a field the relay depends on
    #[error("Malformed {event}: missing {field}")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    /// The socket writer for one side of the pair has stopped
    #[error("Outbox closed")]
    OutboxClosed,
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Errors that mean the upstream broke the tool-call contract.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::UnregisteredTool(_) | Self::UnknownCall(_))
    }
}
