// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The client façade used from caller threads.
//!
//! `WarpClient` is a cheap handle over shared state; clones address the same
//! runtime and pool. Dropping the last handle stops the runtime, so a client
//! held in a scope is torn down on exit.

use std::sync::Arc;

use parking_lot::Mutex;
use warp_recon::IntoValue;

use crate::downlink::view::{EventDownlinkView, MapDownlinkView, ValueDownlinkView};
use crate::envelope::Envelope;
use crate::error::ClientError;
use crate::pool::ConnectionPool;
use crate::runtime::{ErrorPolicy, Runtime, RuntimeHandle};
use crate::uri::normalize_warp_scheme;

/// Handle on a WARP client.
#[derive(Clone)]
pub struct WarpClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    policy: ErrorPolicy,
    core: Mutex<Option<StartedCore>>,
}

struct StartedCore {
    runtime: Arc<Runtime>,
    shared: ClientCore,
}

/// The started runtime handle and pool, cloned out to views.
#[derive(Clone)]
pub(crate) struct ClientCore {
    pub runtime: RuntimeHandle,
    pub pool: Arc<ConnectionPool>,
}

impl ClientInner {
    pub(crate) fn core(&self) -> Result<ClientCore, ClientError> {
        self.core.lock().as_ref().map(|started| started.shared.clone()).ok_or(ClientError::NotRunning)
    }

    fn stop(&self) {
        let Some(started) = self.core.lock().take() else { return };
        // Drain the pool before cancelling the loop so transports close in
        // an orderly way; ignore failures, the runtime teardown is the
        // backstop.
        let pool = Arc::clone(&started.shared.pool);
        let _ = started
            .shared
            .runtime
            .schedule(async move {
                pool.close_all().await;
                Ok(())
            })
            .wait();
        started.runtime.stop();
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Default for WarpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WarpClient {
    /// A client with the default error policy, not yet started.
    pub fn new() -> Self {
        Self::with_policy(ErrorPolicy::default())
    }

    pub fn builder() -> WarpClientBuilder {
        WarpClientBuilder::default()
    }

    fn with_policy(policy: ErrorPolicy) -> Self {
        Self { inner: Arc::new(ClientInner { policy, core: Mutex::new(None) }) }
    }

    /// Spawn the loop thread. Idempotent.
    pub fn start(&self) -> Result<(), ClientError> {
        let mut core = self.inner.core.lock();
        if core.is_some() {
            return Ok(());
        }
        let runtime = Arc::new(Runtime::start(self.inner.policy.clone())?);
        let handle = runtime.handle().clone();
        let pool = ConnectionPool::new(handle.clone());
        *core = Some(StartedCore { runtime, shared: ClientCore { runtime: handle, pool } });
        Ok(())
    }

    /// Close all transports, cancel outstanding tasks, and join the loop
    /// thread. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_running(&self) -> bool {
        self.inner.core.lock().is_some()
    }

    /// Fire one `@command` at a lane without waiting for any response. An
    /// ephemeral connection is opened when the host has no pooled one.
    pub fn command(
        &self,
        host_uri: &str,
        node_uri: &str,
        lane_uri: &str,
        body: impl IntoValue,
    ) -> Result<(), ClientError> {
        let core = self.inner.core()?;
        let host = normalize_warp_scheme(host_uri)?;
        let frame = Envelope::command(node_uri, lane_uri, body.into_value()).to_recon();
        let pool = Arc::clone(&core.pool);
        core.runtime.spawn(async move { pool.send_command(&host, frame).await });
        Ok(())
    }

    /// An unopened value downlink view.
    pub fn downlink_value(&self) -> ValueDownlinkView {
        ValueDownlinkView::new(Arc::downgrade(&self.inner))
    }

    /// An unopened map downlink view.
    pub fn downlink_map(&self) -> MapDownlinkView {
        MapDownlinkView::new(Arc::downgrade(&self.inner))
    }

    /// An unopened event downlink view.
    pub fn downlink_event(&self) -> EventDownlinkView {
        EventDownlinkView::new(Arc::downgrade(&self.inner))
    }
}

/// Configures the error policy before the client starts.
#[derive(Default)]
pub struct WarpClientBuilder {
    policy: ErrorPolicy,
}

impl WarpClientBuilder {
    /// Terminate the process with exit code 1 when a scheduled task fails.
    pub fn terminate_on_error(mut self, terminate: bool) -> Self {
        self.policy.terminate_on_error = terminate;
        self
    }

    /// Schedule a callback with any error escaping a scheduled task.
    pub fn on_error(mut self, callback: impl Fn(ClientError) + Send + Sync + 'static) -> Self {
        self.policy.on_error = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> WarpClient {
        WarpClient::with_policy(self.policy)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
