// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference-counted connection pool.
//!
//! One transport per normalised host URI, shared by every downlink manager
//! on that host. A single mutex guards the `host → (count, connection)`
//! map; the count tracks distinct managers, and the transport closes when
//! it reaches zero.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::connection::Connection;
use crate::error::ClientError;
use crate::runtime::RuntimeHandle;

pub(crate) struct ConnectionPool {
    runtime: RuntimeHandle,
    connections: Mutex<HashMap<String, PoolEntry>>,
}

struct PoolEntry {
    connection: Arc<Connection>,
    downlink_count: usize,
}

impl ConnectionPool {
    pub fn new(runtime: RuntimeHandle) -> Arc<Self> {
        Arc::new(Self { runtime, connections: Mutex::new(HashMap::new()) })
    }

    /// Take a downlink reference on the host's connection, dialing the
    /// transport when this is the first. Called once per manager.
    pub async fn open_downlink(self: &Arc<Self>, host_uri: &str) -> Result<Arc<Connection>, ClientError> {
        let mut connections = self.connections.lock().await;
        if let Some(entry) = connections.get_mut(host_uri) {
            if entry.connection.is_open() {
                entry.downlink_count += 1;
                return Ok(Arc::clone(&entry.connection));
            }
            connections.remove(host_uri);
        }
        let connection = Connection::dial(host_uri, &self.runtime, Arc::downgrade(self)).await?;
        debug!(host = %host_uri, "opened transport");
        connections.insert(
            host_uri.to_owned(),
            PoolEntry { connection: Arc::clone(&connection), downlink_count: 1 },
        );
        Ok(connection)
    }

    /// Release a downlink reference; the transport closes at zero.
    pub async fn close_downlink(&self, host_uri: &str) {
        let mut connections = self.connections.lock().await;
        let Some(entry) = connections.get_mut(host_uri) else { return };
        entry.downlink_count = entry.downlink_count.saturating_sub(1);
        if entry.downlink_count == 0 {
            if let Some(entry) = connections.remove(host_uri) {
                entry.connection.close();
            }
            debug!(host = %host_uri, "closed transport");
        }
    }

    pub async fn get_connection(&self, host_uri: &str) -> Option<Arc<Connection>> {
        self.connections.lock().await.get(host_uri).map(|entry| Arc::clone(&entry.connection))
    }

    /// Downlink references currently held on a host.
    pub async fn downlink_count(&self, host_uri: &str) -> usize {
        self.connections.lock().await.get(host_uri).map(|entry| entry.downlink_count).unwrap_or(0)
    }

    /// Drop a failed connection's entry; its managers are notified by the
    /// reader that observed the failure.
    pub async fn remove_connection(&self, host_uri: &str) {
        self.connections.lock().await.remove(host_uri);
    }

    /// Fire one `@command` frame. Reuses the pooled connection when the host
    /// already has one, otherwise writes through an ephemeral socket that is
    /// closed immediately; no response is awaited either way.
    pub async fn send_command(&self, host_uri: &str, frame: String) -> Result<(), ClientError> {
        if let Some(connection) = self.get_connection(host_uri).await {
            if connection.is_open() {
                return connection.send(frame).await;
            }
        }
        let (stream, _response) = tokio_tungstenite::connect_async(host_uri)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut sink, _source) = stream.split();
        sink.send(Message::Text(frame.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let _ = sink.close().await;
        Ok(())
    }

    /// Close every pooled transport. Used on client shutdown.
    pub async fn close_all(&self) {
        let mut connections = self.connections.lock().await;
        for (host, entry) in connections.drain() {
            debug!(host = %host, "closing transport on shutdown");
            entry.connection.close();
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
