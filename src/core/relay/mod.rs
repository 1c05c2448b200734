//! Realtime middle tier.
//!
//! [`RtMiddleTier`] accepts client WebSocket sessions, opens a matching
//! upstream session for each, and relays frames between them. Server-side
//! configuration (system message, tools, sampling overrides) is injected into
//! the upstream session and hidden from the client, and function calls made
//! by the model are executed by the relay against a [`ToolRegistry`].
//!
//! # Architecture
//!
//! ```text
//!  client ──► ServerBoundRewriter ──► upstream outbox ──► upstream
//!  client ◄── client outbox ◄── ClientBoundRewriter ◄── upstream
//!                                       │
//!                                       └─► ToolDispatcher (spawned per call)
//! ```

pub mod dispatch;
pub mod error;
pub mod events;
pub mod outbox;
pub mod pending;
pub mod rewrite;
pub mod session;
pub mod upstream;

pub use dispatch::{FunctionCall, ToolDispatcher};
pub use error::{RelayError, RelayResult};
pub use outbox::Outbox;
pub use pending::{PendingToolCall, PendingToolCalls};
pub use rewrite::{ClientBoundRewriter, Disposition, ServerBoundRewriter, SessionOverrides};
pub use upstream::{RetryPolicy, UpstreamConfig, UpstreamConnector};

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::core::tools::ToolRegistry;

/// Relay shared by every client session.
///
/// The tool registry and session overrides are fixed at construction and
/// shared read-only; all per-session state lives in the session's own tasks.
#[derive(Debug, Clone)]
pub struct RtMiddleTier {
    connector: UpstreamConnector,
    overrides: Arc<SessionOverrides>,
    registry: Arc<ToolRegistry>,
}

impl RtMiddleTier {
    pub fn new(
        upstream: UpstreamConfig,
        overrides: SessionOverrides,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            connector: UpstreamConnector::new(upstream),
            overrides: Arc::new(overrides),
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve one client session to completion.
    ///
    /// If the upstream cannot be reached the client socket is closed with an
    /// error close frame.
    pub async fn handle_client(&self, mut client: WebSocket, client_request_id: Option<String>) {
        let session_id = Uuid::new_v4();
        let span = info_span!(
            "relay_session",
            %session_id,
            client_request_id = client_request_id.as_deref().unwrap_or_default()
        );

        async move {
            info!("Client connected, opening upstream session");

            let upstream = match self.connector.connect(client_request_id.as_deref()).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    error!("Failed to connect to upstream: {}", e);
                    let frame = CloseFrame {
                        code: close_code::ERROR,
                        reason: "upstream unavailable".into(),
                    };
                    let _ = client.send(Message::Close(Some(frame))).await;
                    return;
                }
            };

            let server_bound =
                ServerBoundRewriter::new(self.overrides.clone(), self.registry.clone());
            session::run_pair(client, upstream, server_bound, self.registry.clone()).await;
        }
        .instrument(span)
        .await
    }
}
