//! Mock upstream realtime service
//!
//! Accepts WebSocket handshakes on an ephemeral port. The first `reject_first`
//! handshakes are answered with HTTP 429. The first accepted connection is the
//! primary session driven through [`MockUpstream`] itself; later connections
//! are handed out by [`MockUpstream::next_session`].

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// What the relay sent in a successful handshake
#[derive(Debug, Clone)]
pub struct Handshake {
    pub uri: String,
    pub headers: http::HeaderMap,
}

enum Outbound {
    Frame(String),
    Close,
}

/// Mock side of one accepted upstream connection
pub struct MockSession {
    from_relay: mpsc::UnboundedReceiver<Value>,
    to_relay: mpsc::UnboundedSender<Outbound>,
}

/// Socket-task side of a [`MockSession`]
struct SessionEnds {
    from_relay: mpsc::UnboundedSender<Value>,
    to_relay: mpsc::UnboundedReceiver<Outbound>,
}

impl MockSession {
    fn pair() -> (Self, SessionEnds) {
        let (from_relay_tx, from_relay) = mpsc::unbounded_channel();
        let (to_relay, to_relay_rx) = mpsc::unbounded_channel();
        (
            Self {
                from_relay,
                to_relay,
            },
            SessionEnds {
                from_relay: from_relay_tx,
                to_relay: to_relay_rx,
            },
        )
    }

    pub fn send(&self, frame: Value) {
        let _ = self.to_relay.send(Outbound::Frame(frame.to_string()));
    }

    pub fn close(&self) {
        let _ = self.to_relay.send(Outbound::Close);
    }

    /// Next frame the relay sent upstream
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(RECV_TIMEOUT, self.from_relay.recv())
            .await
            .expect("timed out waiting for a frame from the relay")
            .expect("mock upstream stopped")
    }

    /// Assert the relay sends nothing further within `wait`
    pub async fn assert_silent(&mut self, wait: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(wait, self.from_relay.recv()).await {
            panic!("unexpected frame from relay: {frame}");
        }
    }

    /// Wait until the relay has closed this upstream socket
    pub async fn wait_closed(&mut self) {
        tokio::time::timeout(RECV_TIMEOUT, async {
            while self.from_relay.recv().await.is_some() {}
        })
        .await
        .expect("relay did not close the upstream socket");
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    attempts: Arc<AtomicU32>,
    handshake: Arc<Mutex<Option<Handshake>>>,
    primary: MockSession,
    sessions: mpsc::UnboundedReceiver<MockSession>,
}

impl MockUpstream {
    pub async fn start(reject_first: u32) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let attempts = Arc::new(AtomicU32::new(0));
        let handshake = Arc::new(Mutex::new(None));
        let (primary, primary_ends) = MockSession::pair();
        let primary_ends = Arc::new(Mutex::new(Some(primary_ends)));
        let (sessions_tx, sessions) = mpsc::unbounded_channel();

        let accept_attempts = attempts.clone();
        let accept_handshake = handshake.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let attempts = accept_attempts.clone();
                let handshake = accept_handshake.clone();
                let primary_ends = primary_ends.clone();
                let sessions_tx = sessions_tx.clone();

                tokio::spawn(async move {
                    let callback = move |request: &Request, response: Response| {
                        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        if attempt <= reject_first {
                            let rejection: ErrorResponse = http::Response::builder()
                                .status(http::StatusCode::TOO_MANY_REQUESTS)
                                .body(Some("rate limited".to_string()))
                                .unwrap();
                            return Err(rejection);
                        }
                        *handshake.lock() = Some(Handshake {
                            uri: request.uri().to_string(),
                            headers: request.headers().clone(),
                        });
                        Ok(response)
                    };

                    let Ok(socket) = accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    let taken = primary_ends.lock().take();
                    let ends = match taken {
                        Some(ends) => ends,
                        None => {
                            let (session, ends) = MockSession::pair();
                            let _ = sessions_tx.send(session);
                            ends
                        }
                    };
                    serve(socket, ends).await;
                });
            }
        });

        Self {
            addr,
            attempts,
            handshake,
            primary,
            sessions,
        }
    }

    /// Base endpoint to configure the relay with
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn handshake(&self) -> Option<Handshake> {
        self.handshake.lock().clone()
    }

    /// Next accepted connection after the primary one
    pub async fn next_session(&mut self) -> MockSession {
        tokio::time::timeout(RECV_TIMEOUT, self.sessions.recv())
            .await
            .expect("timed out waiting for another upstream connection")
            .expect("mock upstream stopped")
    }

    pub fn send(&self, frame: Value) {
        self.primary.send(frame);
    }

    pub fn close(&self) {
        self.primary.close();
    }

    pub async fn recv(&mut self) -> Value {
        self.primary.recv().await
    }

    pub async fn assert_silent(&mut self, wait: Duration) {
        self.primary.assert_silent(wait).await;
    }

    pub async fn wait_closed(&mut self) {
        self.primary.wait_closed().await;
    }
}

async fn serve(socket: WebSocketStream<TcpStream>, ends: SessionEnds) {
    let SessionEnds {
        from_relay,
        mut to_relay,
    } = ends;
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str(text.as_str()) {
                        let _ = from_relay.send(value);
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            frame = to_relay.recv() => match frame {
                Some(Outbound::Frame(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}
