//! Bounded frame queues between the relay tasks and the socket writers.

use serde::Serialize;
use tokio::sync::mpsc;

use super::error::{RelayError, RelayResult};

/// Channel buffer for frames queued towards one socket.
pub const OUTBOX_CAPACITY: usize = 256;

/// Queue of text frames drained by a socket writer task.
///
/// Cloned freely: the forwarding tasks and every tool dispatch of a pair
/// write through clones of the same two outboxes.
#[derive(Debug, Clone)]
pub struct Outbox(mpsc::Sender<String>);

impl Outbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self(tx), rx)
    }

    pub async fn send_text(&self, text: String) -> RelayResult<()> {
        self.0.send(text).await.map_err(|_| RelayError::OutboxClosed)
    }

    pub async fn send_json<T: Serialize>(&self, message: &T) -> RelayResult<()> {
        let text = serde_json::to_string(message)?;
        self.send_text(text).await
    }
}
