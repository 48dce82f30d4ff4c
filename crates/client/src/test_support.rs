// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process scripted WARP server for tests.
//!
//! The server accepts real WebSocket connections, records every inbound
//! frame, and answers `@link`/`@sync` requests with a per-route script of
//! canned frames. [`StubWarpServer`] wraps it with its own background
//! runtime so plain `#[test]` functions can exercise the client's blocking
//! façade; async tests use [`start_server`] on their ambient runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::envelope::{Envelope, EnvelopeTag};
use crate::error::ClientError;

type Route = (String, String);

/// Frames to send back when a `@link`/`@sync` arrives for a route.
#[derive(Debug, Clone, Default)]
pub struct ServerScript {
    on_open: HashMap<Route, Vec<String>>,
}

impl ServerScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `frames`, in order, when the given route is linked or
    /// synced.
    pub fn on_open(mut self, node: &str, lane: &str, frames: &[&str]) -> Self {
        self.on_open
            .insert((node.to_owned(), lane.to_owned()), frames.iter().map(|f| (*f).to_owned()).collect());
        self
    }
}

struct ServerState {
    script: ServerScript,
    received: Mutex<Vec<String>>,
    accepted: AtomicUsize,
    closed: AtomicUsize,
    pushers: Mutex<Vec<mpsc::Sender<String>>>,
}

/// Handle on a running scripted server; requires an ambient tokio runtime.
pub struct ScriptedServer {
    host_uri: String,
    state: Arc<ServerState>,
}

/// Bind on an ephemeral port and start accepting connections.
pub async fn start_server(script: ServerScript) -> Result<ScriptedServer, ClientError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| ClientError::Runtime(e.to_string()))?;
    let addr = listener.local_addr().map_err(|e| ClientError::Runtime(e.to_string()))?;
    let state = Arc::new(ServerState {
        script,
        received: Mutex::new(Vec::new()),
        accepted: AtomicUsize::new(0),
        closed: AtomicUsize::new(0),
        pushers: Mutex::new(Vec::new()),
    });

    let accept_state = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            accept_state.accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handle_socket(Arc::clone(&accept_state), stream));
        }
    });

    Ok(ScriptedServer { host_uri: format!("ws://{addr}"), state })
}

async fn handle_socket(state: Arc<ServerState>, stream: TcpStream) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else { return };
    let (mut sink, mut source) = ws.split();
    let (push_tx, mut push_rx) = mpsc::channel::<String>(32);
    if let Ok(mut pushers) = state.pushers.lock() {
        pushers.push(push_tx);
    }

    loop {
        tokio::select! {
            frame = push_rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    debug!(frame = %text, "stub server received");
                    if let Ok(mut received) = state.received.lock() {
                        received.push(text.to_string());
                    }
                    let Ok(Some(envelope)) = Envelope::parse(&text) else { continue };
                    if !matches!(envelope.tag, EnvelopeTag::Link | EnvelopeTag::Sync) {
                        continue;
                    }
                    let replies = state
                        .script
                        .on_open
                        .get(&envelope.route())
                        .cloned()
                        .unwrap_or_default();
                    for reply in replies {
                        if sink.send(Message::Text(reply.into())).await.is_err() {
                            state.closed.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            }
        }
    }
    state.closed.fetch_add(1, Ordering::SeqCst);
}

impl ScriptedServer {
    pub fn host_uri(&self) -> &str {
        &self.host_uri
    }

    /// Every text frame received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().map(|received| received.clone()).unwrap_or_default()
    }

    pub fn connections_accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Push a frame to every live connection.
    pub async fn push_frame(&self, frame: &str) {
        let pushers = match self.state.pushers.lock() {
            Ok(pushers) => pushers.clone(),
            Err(_) => return,
        };
        for pusher in pushers {
            let _ = pusher.send(frame.to_owned()).await;
        }
    }
}

/// Scripted server with its own background runtime, for synchronous tests.
pub struct StubWarpServer {
    server: ScriptedServer,
    runtime: tokio::runtime::Runtime,
}

impl StubWarpServer {
    pub fn spawn(script: ServerScript) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| ClientError::Runtime(e.to_string()))?;
        let server = runtime.block_on(start_server(script))?;
        Ok(Self { server, runtime })
    }

    pub fn host_uri(&self) -> &str {
        self.server.host_uri()
    }

    pub fn received(&self) -> Vec<String> {
        self.server.received()
    }

    pub fn connections_accepted(&self) -> usize {
        self.server.connections_accepted()
    }

    pub fn connections_closed(&self) -> usize {
        self.server.connections_closed()
    }

    pub fn push_frame(&self, frame: &str) {
        self.runtime.block_on(self.server.push_frame(frame));
    }

    /// Poll until a received frame matches, or the timeout lapses.
    pub fn wait_for_frame(
        &self,
        timeout: Duration,
        matches: impl Fn(&str) -> bool,
    ) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.received().into_iter().find(|frame| matches(frame)) {
                return Some(frame);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Poll an arbitrary condition against the server.
    pub fn wait_until(&self, timeout: Duration, condition: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
