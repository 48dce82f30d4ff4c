// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One WebSocket transport per remote host.
//!
//! An open connection runs exactly two tasks: a writer draining a bounded
//! queue of outbound text frames, and a reader that parses each inbound
//! frame into an envelope and demultiplexes it onto the `(node, lane)` →
//! manager registry. The reader dispatches sequentially, which preserves
//! per-route frame order; across routes there is no ordering guarantee.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::downlink::manager::DownlinkManager;
use crate::downlink::model::ReceiveOutcome;
use crate::envelope::Envelope;
use crate::error::ClientError;
use crate::pool::ConnectionPool;
use crate::runtime::RuntimeHandle;

/// Outbound frames queued per connection before writers push back.
const OUTBOUND_QUEUE: usize = 32;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

pub(crate) type Route = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

pub(crate) struct Connection {
    host_uri: String,
    status: RwLock<ConnectionStatus>,
    managers: RwLock<HashMap<Route, Arc<DownlinkManager>>>,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl Connection {
    /// Dial the host and spawn the reader and writer tasks.
    pub async fn dial(
        host_uri: &str,
        runtime: &RuntimeHandle,
        pool: Weak<ConnectionPool>,
    ) -> Result<Arc<Connection>, ClientError> {
        let (stream, _response) = tokio_tungstenite::connect_async(host_uri)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (sink, source) = stream.split();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        let connection = Arc::new(Connection {
            host_uri: host_uri.to_owned(),
            status: RwLock::new(ConnectionStatus::Open),
            managers: RwLock::new(HashMap::new()),
            outbound,
            cancel: CancellationToken::new(),
        });

        let writer = Arc::clone(&connection);
        runtime.spawn(async move {
            writer.write_loop(sink, outbound_rx).await;
            Ok(())
        });
        let reader = Arc::clone(&connection);
        runtime.spawn(async move {
            reader.read_loop(source, pool).await;
            Ok(())
        });

        Ok(connection)
    }

    pub fn host_uri(&self) -> &str {
        &self.host_uri
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Sender feeding the writer task.
    pub fn outbound(&self) -> mpsc::Sender<String> {
        self.outbound.clone()
    }

    /// Queue one outbound frame.
    pub async fn send(&self, frame: String) -> Result<(), ClientError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::Transport("connection closed".to_owned()))
    }

    pub fn register_manager(&self, route: Route, manager: Arc<DownlinkManager>) {
        self.managers.write().insert(route, manager);
    }

    pub fn unregister_manager(&self, route: &Route) {
        self.managers.write().remove(route);
    }

    pub fn manager(&self, route: &Route) -> Option<Arc<DownlinkManager>> {
        self.managers.read().get(route).cloned()
    }

    /// Orderly close initiated by the pool when the downlink count reaches
    /// zero, or by client shutdown.
    pub fn close(&self) {
        *self.status.write() = ConnectionStatus::Closing;
        self.cancel.cancel();
        *self.status.write() = ConnectionStatus::Closed;
    }

    async fn write_loop(&self, mut sink: WsSink, mut outbound_rx: mpsc::Receiver<String>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.close().await;
                    break;
                }
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        debug!(host = %self.host_uri, err = %e, "write failed");
                        self.cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    async fn read_loop(self: Arc<Self>, mut source: WsSource, pool: Weak<ConnectionPool>) {
        let failed = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break false,
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text, &pool).await,
                    Some(Ok(Message::Close(_))) | None => break true,
                    Some(Ok(_)) => {} // binary, ping, pong
                    Some(Err(e)) => {
                        debug!(host = %self.host_uri, err = %e, "read failed");
                        break true;
                    }
                }
            }
        };
        if failed {
            self.fail(&pool).await;
        }
    }

    /// Route one inbound frame to its manager.
    async fn dispatch(&self, text: &str, pool: &Weak<ConnectionPool>) {
        let envelope = match Envelope::parse(text) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!(host = %self.host_uri, frame = text, "ignoring unrecognised frame");
                return;
            }
            Err(err) => {
                warn!(host = %self.host_uri, err = %err, "dropping malformed frame");
                return;
            }
        };
        let route = envelope.route();
        let Some(manager) = self.manager(&route) else {
            debug!(node = %route.0, lane = %route.1, "no downlink for route, dropping");
            return;
        };
        if manager.receive_message(envelope).await == ReceiveOutcome::Terminated {
            // The downlink is done; drop the route and give its connection
            // reference back to the pool.
            self.unregister_manager(&route);
            if let Some(pool) = pool.upgrade() {
                pool.close_downlink(&self.host_uri).await;
            }
        }
    }

    /// Transport failure: tear down both tasks, remove the pool entry, and
    /// deliver a synthetic unlink to every manager multiplexed here.
    async fn fail(&self, pool: &Weak<ConnectionPool>) {
        *self.status.write() = ConnectionStatus::Closed;
        self.cancel.cancel();
        if let Some(pool) = pool.upgrade() {
            pool.remove_connection(&self.host_uri).await;
        }
        let managers: Vec<(Route, Arc<DownlinkManager>)> =
            self.managers.write().drain().collect();
        for ((node, lane), manager) in managers {
            debug!(host = %self.host_uri, node = %node, lane = %lane, "unlinking after transport loss");
            let synthetic = Envelope::unlinked(node, lane, warp_recon::Value::Absent);
            let _ = manager.receive_message(synthetic).await;
        }
    }
}
