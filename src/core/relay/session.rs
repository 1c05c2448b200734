//! Forwarding loop of one connection pair.
//!
//! Each pair runs four tasks: a writer per socket draining that socket's
//! [`Outbox`], and a reader per direction that rewrites frames into the
//! opposite outbox. Whichever reader stops first cancels the pair; the writers
//! then flush what is already queued and close both sockets.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as ClientMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, warn};

use super::error::RelayError;
use super::outbox::{OUTBOX_CAPACITY, Outbox};
use super::rewrite::{ClientBoundRewriter, Disposition, ServerBoundRewriter};
use super::upstream::UpstreamSocket;
use crate::core::tools::ToolRegistry;

/// How long a writer waits for another queued frame once the pair is torn down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Relay frames between `client` and `upstream` until either side closes.
pub async fn run_pair(
    client: WebSocket,
    upstream: UpstreamSocket,
    server_bound: ServerBoundRewriter,
    registry: Arc<ToolRegistry>,
) {
    let (client_sink, client_stream) = client.split();
    let (upstream_sink, upstream_stream) = upstream.split();

    let (client_outbox, client_rx) = Outbox::channel(OUTBOX_CAPACITY);
    let (upstream_outbox, upstream_rx) = Outbox::channel(OUTBOX_CAPACITY);
    let cancel = CancellationToken::new();

    let client_writer = tokio::spawn(
        write_client(client_sink, client_rx, cancel.clone()).instrument(Span::current()),
    );
    let upstream_writer = tokio::spawn(
        write_upstream(upstream_sink, upstream_rx, cancel.clone()).instrument(Span::current()),
    );

    let client_bound =
        ClientBoundRewriter::new(registry, upstream_outbox.clone(), client_outbox.clone());

    tokio::join!(
        forward_client_to_upstream(client_stream, server_bound, upstream_outbox, cancel.clone()),
        forward_upstream_to_client(upstream_stream, client_bound, client_outbox, cancel.clone()),
    );

    for (side, writer) in [("client", client_writer), ("upstream", upstream_writer)] {
        if let Err(e) = writer.await {
            debug!(side, "Writer task ended abnormally: {}", e);
        }
    }
    info!("Relay session closed");
}

async fn forward_client_to_upstream(
    mut stream: SplitStream<WebSocket>,
    rewriter: ServerBoundRewriter,
    upstream: Outbox,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(ClientMessage::Text(text))) => match rewriter.rewrite(text.as_str()) {
                Ok(Disposition::Forward(out)) => {
                    if upstream.send_text(out).await.is_err() {
                        break;
                    }
                }
                Ok(Disposition::Suppress) => {}
                Err(e) => log_frame_error("client", &e),
            },
            Some(Ok(ClientMessage::Binary(data))) => {
                debug!(bytes = data.len(), "Ignoring binary frame from client");
            }
            Some(Ok(ClientMessage::Close(frame))) => {
                debug!(?frame, "Client closed the connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("Client socket error: {}", e);
                break;
            }
            None => break,
        }
    }
    cancel.cancel();
}

async fn forward_upstream_to_client(
    mut stream: SplitStream<UpstreamSocket>,
    mut rewriter: ClientBoundRewriter,
    client: Outbox,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(UpstreamMessage::Text(text))) => match rewriter.rewrite(text.as_str()) {
                Ok(Disposition::Forward(out)) => {
                    if client.send_text(out).await.is_err() {
                        break;
                    }
                }
                Ok(Disposition::Suppress) => {}
                Err(e) => log_frame_error("upstream", &e),
            },
            Some(Ok(UpstreamMessage::Binary(data))) => {
                debug!(bytes = data.len(), "Ignoring binary frame from upstream");
            }
            Some(Ok(UpstreamMessage::Close(frame))) => {
                debug!(?frame, "Upstream closed the connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("Upstream socket error: {}", e);
                break;
            }
            None => break,
        }
    }
    cancel.cancel();
    // Dropping the rewriter aborts tool dispatches still in flight.
    drop(rewriter);
}

async fn write_client(
    mut sink: SplitSink<WebSocket, ClientMessage>,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    while let Some(text) = next_outbound(&mut rx, &cancel).await {
        if let Err(e) = sink.send(ClientMessage::Text(text.into())).await {
            debug!("Failed to write to client: {}", e);
            break;
        }
    }
    cancel.cancel();
    let _ = sink.send(ClientMessage::Close(None)).await;
    let _ = sink.close().await;
}

async fn write_upstream(
    mut sink: SplitSink<UpstreamSocket, UpstreamMessage>,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    while let Some(text) = next_outbound(&mut rx, &cancel).await {
        if let Err(e) = sink.send(UpstreamMessage::Text(text.into())).await {
            debug!("Failed to write to upstream: {}", e);
            break;
        }
    }
    cancel.cancel();
    let _ = sink.send(UpstreamMessage::Close(None)).await;
    let _ = sink.close().await;
}

/// Next frame for a writer.
///
/// Frames queued before cancellation are still delivered. Once the pair is
/// cancelled the writer keeps draining until every sender is gone, giving up
/// after [`DRAIN_TIMEOUT`] without a frame.
async fn next_outbound(
    rx: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> Option<String> {
    if !cancel.is_cancelled() {
        tokio::select! {
            biased;
            text = rx.recv() => return text,
            _ = cancel.cancelled() => {}
        }
    }
    tokio::time::timeout(DRAIN_TIMEOUT, rx.recv())
        .await
        .ok()
        .flatten()
}

fn log_frame_error(source: &'static str, e: &RelayError) {
    if e.is_protocol_violation() {
        error!(source, "Upstream violated the tool-call contract: {}", e);
    } else {
        warn!(source, "Dropping frame that could not be processed: {}", e);
    }
}
