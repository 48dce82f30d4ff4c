// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing downlink handles.
//!
//! A view is configured while unopened (`set_host_uri` and friends), then
//! `open`ed, which schedules attachment onto the client loop. Class
//! registration and the strict flag write through to the route's manager
//! once attached and live privately on the view before that. Reads and
//! writes go through the blocking bridge; none of them may be issued from
//! the loop thread.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::watch;
use warp_recon::{ClassRegistry, DecodedValue, IntoValue, Record, ReconError, Value};

use crate::client::{ClientCore, ClientInner};
use crate::downlink::manager::DownlinkManager;
use crate::downlink::model::DownlinkModel;
use crate::downlink::{BoxFuture, Callback, DownlinkAddress, DownlinkKind};
use crate::error::ClientError;
use crate::pool::ConnectionPool;
use crate::runtime::RuntimeHandle;

#[derive(Default)]
struct AddressConfig {
    host: Option<String>,
    node: Option<String>,
    lane: Option<String>,
}

#[derive(Clone, Default)]
enum AttachState {
    #[default]
    Pending,
    Attached,
    Failed(ClientError),
}

#[derive(Default)]
struct Callbacks {
    on_event: RwLock<Option<Callback<DecodedValue>>>,
    did_set: RwLock<Option<Callback<(DecodedValue, DecodedValue)>>>,
    did_update: RwLock<Option<Callback<(DecodedValue, DecodedValue, DecodedValue)>>>,
    did_remove: RwLock<Option<Callback<(DecodedValue, DecodedValue)>>>,
}

/// State shared between a public view handle and its manager.
pub(crate) struct ViewCore {
    kind: DownlinkKind,
    client: Weak<ClientInner>,
    config: RwLock<AddressConfig>,
    open: AtomicBool,
    manager: RwLock<Weak<DownlinkManager>>,
    attach_state: watch::Sender<AttachState>,
    registry: RwLock<ClassRegistry>,
    strict: AtomicBool,
    callbacks: Callbacks,
}

impl ViewCore {
    pub fn new(kind: DownlinkKind, client: Weak<ClientInner>) -> Arc<Self> {
        let (attach_state, _) = watch::channel(AttachState::Pending);
        Arc::new(Self {
            kind,
            client,
            config: RwLock::new(AddressConfig::default()),
            open: AtomicBool::new(false),
            manager: RwLock::new(Weak::new()),
            attach_state,
            registry: RwLock::new(ClassRegistry::new()),
            strict: AtomicBool::new(false),
            callbacks: Callbacks::default(),
        })
    }

    pub fn kind(&self) -> DownlinkKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn set_host_uri(&self, host_uri: &str) -> Result<(), ClientError> {
        self.mutate_address(|config| {
            config.host = Some(crate::uri::normalize_warp_scheme(host_uri)?);
            Ok(())
        })
    }

    pub fn set_node_uri(&self, node_uri: &str) -> Result<(), ClientError> {
        self.mutate_address(|config| {
            config.node = Some(node_uri.to_owned());
            Ok(())
        })
    }

    pub fn set_lane_uri(&self, lane_uri: &str) -> Result<(), ClientError> {
        self.mutate_address(|config| {
            config.lane = Some(lane_uri.to_owned());
            Ok(())
        })
    }

    fn mutate_address(
        &self,
        mutate: impl FnOnce(&mut AddressConfig) -> Result<(), ClientError>,
    ) -> Result<(), ClientError> {
        if self.is_open() {
            return Err(ClientError::AlreadyOpen);
        }
        mutate(&mut self.config.write())
    }

    pub fn address(&self) -> Result<DownlinkAddress, ClientError> {
        let config = self.config.read();
        Ok(DownlinkAddress {
            host: config.host.clone().ok_or(ClientError::MissingUri("host uri"))?,
            node: config.node.clone().ok_or(ClientError::MissingUri("node uri"))?,
            lane: config.lane.clone().ok_or(ClientError::MissingUri("lane uri"))?,
        })
    }

    /// The manager's strict flag while attached, the private one otherwise.
    pub fn strict(&self) -> bool {
        match self.manager() {
            Some(manager) => manager.strict(),
            None => self.strict.load(Ordering::Acquire),
        }
    }

    pub fn set_strict(&self, strict: bool) {
        match self.manager() {
            Some(manager) => manager.set_strict(strict),
            None => self.strict.store(strict, Ordering::Release),
        }
    }

    pub fn register_class<T, F>(&self, name: impl Into<String>, deserialize: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Record) -> Result<T, ReconError> + Send + Sync + 'static,
    {
        let name = name.into();
        match self.manager() {
            Some(manager) => manager.update_registry(|registry| registry.register(name, deserialize)),
            None => self.registry.write().register(name, deserialize),
        }
    }

    pub fn register_classes(&self, classes: &ClassRegistry) {
        match self.manager() {
            Some(manager) => manager.update_registry(|registry| registry.merge(classes)),
            None => self.registry.write().merge(classes),
        }
    }

    pub fn deregister_class(&self, name: &str) {
        match self.manager() {
            Some(manager) => manager.update_registry(|registry| {
                registry.deregister(name);
            }),
            None => {
                self.registry.write().deregister(name);
            }
        }
    }

    pub fn deregister_all_classes(&self) {
        match self.manager() {
            Some(manager) => manager.update_registry(ClassRegistry::clear),
            None => self.registry.write().clear(),
        }
    }

    pub fn private_registry(&self) -> ClassRegistry {
        self.registry.read().clone()
    }

    pub fn private_strict(&self) -> bool {
        self.strict.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Schedule attachment onto the loop. Idempotent.
    pub fn open(self: &Arc<Self>) -> Result<(), ClientError> {
        let address = self.address()?;
        let client = self.client_core()?;
        if self.open.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let view = Arc::clone(self);
        let runtime = client.runtime.clone();
        let pool = Arc::clone(&client.pool);
        client.runtime.spawn(async move {
            if let Err(err) = attach_view(&pool, &runtime, &view, address).await {
                view.fail_attach(err.clone());
                return Err(err);
            }
            Ok(())
        });
        Ok(())
    }

    /// Schedule detachment onto the loop. Idempotent.
    pub fn close(self: &Arc<Self>) -> Result<(), ClientError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let Ok(client) = self.client_core() else { return Ok(()) };
        let view = Arc::clone(self);
        let pool = Arc::clone(&client.pool);
        client.runtime.spawn(async move { detach_view(&pool, &view).await });
        Ok(())
    }

    pub(crate) fn client_core(&self) -> Result<ClientCore, ClientError> {
        let inner = self.client.upgrade().ok_or(ClientError::NotRunning)?;
        inner.core()
    }

    pub fn manager(&self) -> Option<Arc<DownlinkManager>> {
        self.manager.read().upgrade()
    }

    fn attach(&self, manager: &Arc<DownlinkManager>) {
        *self.manager.write() = Arc::downgrade(manager);
        let _ = self.attach_state.send_replace(AttachState::Attached);
    }

    fn fail_attach(&self, err: ClientError) {
        self.open.store(false, Ordering::Release);
        let _ = self.attach_state.send_replace(AttachState::Failed(err));
    }

    fn detach(&self) {
        *self.manager.write() = Weak::new();
        let _ = self.attach_state.send_replace(AttachState::Pending);
    }

    /// Wait until the open scheduled for this view has attached it.
    pub async fn wait_attached(&self) -> Result<Arc<DownlinkManager>, ClientError> {
        let mut rx = self.attach_state.subscribe();
        loop {
            let state = rx.borrow().clone();
            match state {
                AttachState::Attached => {
                    return self.manager().ok_or(ClientError::Cancelled);
                }
                AttachState::Failed(err) => return Err(err),
                AttachState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(ClientError::Cancelled);
            }
        }
    }

    fn model(&self) -> Option<Arc<DownlinkModel>> {
        self.manager().map(|manager| Arc::clone(manager.model()))
    }

    // -----------------------------------------------------------------------
    // Callback storage and dispatch
    // -----------------------------------------------------------------------

    pub fn set_on_event(&self, callback: Callback<DecodedValue>) {
        *self.callbacks.on_event.write() = Some(callback);
    }

    pub fn set_did_set(&self, callback: Callback<(DecodedValue, DecodedValue)>) {
        *self.callbacks.did_set.write() = Some(callback);
    }

    pub fn set_did_update(&self, callback: Callback<(DecodedValue, DecodedValue, DecodedValue)>) {
        *self.callbacks.did_update.write() = Some(callback);
    }

    pub fn set_did_remove(&self, callback: Callback<(DecodedValue, DecodedValue)>) {
        *self.callbacks.did_remove.write() = Some(callback);
    }

    pub fn dispatch_on_event(&self, runtime: &RuntimeHandle, event: DecodedValue) {
        if let Some(callback) = self.callbacks.on_event.read().clone() {
            callback.dispatch(runtime, event);
        }
    }

    pub fn dispatch_did_set(&self, runtime: &RuntimeHandle, new: DecodedValue, old: DecodedValue) {
        if let Some(callback) = self.callbacks.did_set.read().clone() {
            callback.dispatch(runtime, (new, old));
        }
    }

    pub fn dispatch_did_update(
        &self,
        runtime: &RuntimeHandle,
        key: DecodedValue,
        new: DecodedValue,
        old: DecodedValue,
    ) {
        if let Some(callback) = self.callbacks.did_update.read().clone() {
            callback.dispatch(runtime, (key, new, old));
        }
    }

    pub fn dispatch_did_remove(&self, runtime: &RuntimeHandle, key: DecodedValue, old: DecodedValue) {
        if let Some(callback) = self.callbacks.did_remove.read().clone() {
            callback.dispatch(runtime, (key, old));
        }
    }
}

/// Attach a freshly-opened view: reuse the route's manager when one exists,
/// otherwise take a connection reference, create the manager, and send the
/// opening `@link`/`@sync`.
async fn attach_view(
    pool: &Arc<ConnectionPool>,
    runtime: &RuntimeHandle,
    view: &Arc<ViewCore>,
    address: DownlinkAddress,
) -> Result<(), ClientError> {
    let route = address.route();
    if let Some(connection) = pool.get_connection(&address.host).await {
        if let Some(manager) = connection.manager(&route) {
            return join_existing(view, &manager);
        }
    }

    let connection = pool.open_downlink(&address.host).await?;
    if let Some(manager) = connection.manager(&route) {
        // Another view created the manager while we were dialing; hand the
        // extra reference back.
        pool.close_downlink(&address.host).await;
        return join_existing(view, &manager);
    }

    let manager =
        DownlinkManager::new(view.kind(), address.clone(), connection.outbound(), runtime.clone());
    manager.add_view(Arc::clone(view));
    view.attach(&manager);
    connection.register_manager(route.clone(), Arc::clone(&manager));
    if let Err(err) = manager.model().establish().await {
        connection.unregister_manager(&route);
        pool.close_downlink(&address.host).await;
        return Err(err);
    }
    Ok(())
}

fn join_existing(view: &Arc<ViewCore>, manager: &Arc<DownlinkManager>) -> Result<(), ClientError> {
    if manager.kind() != view.kind() {
        return Err(ClientError::KindConflict);
    }
    manager.add_view(Arc::clone(view));
    view.attach(manager);
    Ok(())
}

/// Detach a closed view, waiting out an in-flight attach so the two pair
/// up. The last view closing a route closes its model and releases the
/// connection reference.
async fn detach_view(pool: &Arc<ConnectionPool>, view: &Arc<ViewCore>) -> Result<(), ClientError> {
    let manager = match view.wait_attached().await {
        Ok(manager) => manager,
        Err(_) => {
            view.detach();
            return Ok(());
        }
    };
    if manager.remove_view(view) {
        let address = manager.model().address().clone();
        if let Some(connection) = pool.get_connection(&address.host).await {
            connection.unregister_manager(&address.route());
        }
        manager.model().close();
        pool.close_downlink(&address.host).await;
    }
    view.detach();
    Ok(())
}

// ---------------------------------------------------------------------------
// Public views
// ---------------------------------------------------------------------------

macro_rules! impl_view_common {
    ($view:ident) => {
        impl $view {
            /// Set the host URI, normalised onto the WARP scheme.
            pub fn set_host_uri(&self, host_uri: &str) -> Result<&Self, ClientError> {
                self.core.set_host_uri(host_uri)?;
                Ok(self)
            }

            pub fn set_node_uri(&self, node_uri: &str) -> Result<&Self, ClientError> {
                self.core.set_node_uri(node_uri)?;
                Ok(self)
            }

            pub fn set_lane_uri(&self, lane_uri: &str) -> Result<&Self, ClientError> {
                self.core.set_lane_uri(lane_uri)?;
                Ok(self)
            }

            pub fn is_open(&self) -> bool {
                self.core.is_open()
            }

            pub fn strict(&self) -> bool {
                self.core.strict()
            }

            pub fn set_strict(&self, strict: bool) -> &Self {
                self.core.set_strict(strict);
                self
            }

            /// Register a deserializer for records tagged `@name`.
            pub fn register_class<T, F>(&self, name: impl Into<String>, deserialize: F) -> &Self
            where
                T: std::any::Any + Send + Sync,
                F: Fn(&Record) -> Result<T, ReconError> + Send + Sync + 'static,
            {
                self.core.register_class(name.into(), deserialize);
                self
            }

            /// Merge a whole registry of classes.
            pub fn register_classes(&self, classes: &ClassRegistry) -> &Self {
                self.core.register_classes(classes);
                self
            }

            pub fn deregister_class(&self, name: &str) -> &Self {
                self.core.deregister_class(name);
                self
            }

            pub fn deregister_classes(&self, names: &[&str]) -> &Self {
                for name in names {
                    self.core.deregister_class(name);
                }
                self
            }

            pub fn deregister_all_classes(&self) -> &Self {
                self.core.deregister_all_classes();
                self
            }

            /// Open the downlink. Idempotent; attachment happens on the loop.
            pub fn open(&self) -> Result<&Self, ClientError> {
                self.core.open()?;
                Ok(self)
            }

            /// Close the downlink. Idempotent.
            pub fn close(&self) -> Result<(), ClientError> {
                self.core.close()
            }
        }
    };
}

/// A downlink that streams events without holding a replica.
pub struct EventDownlinkView {
    core: Arc<ViewCore>,
}

impl_view_common!(EventDownlinkView);

impl EventDownlinkView {
    pub(crate) fn new(client: Weak<ClientInner>) -> Self {
        Self { core: ViewCore::new(DownlinkKind::Event, client) }
    }

    /// Synchronous event callback, executed on the worker pool.
    pub fn on_event(&self, callback: impl Fn(&DecodedValue) + Send + Sync + 'static) -> &Self {
        self.core.set_on_event(Callback::Sync(Arc::new(move |event| callback(&event))));
        self
    }

    /// Asynchronous event callback, spawned on the loop.
    pub fn on_event_async<F, Fut>(&self, callback: F) -> &Self
    where
        F: Fn(DecodedValue) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.core
            .set_on_event(Callback::Async(Arc::new(move |event| -> BoxFuture {
                Box::pin(callback(event))
            })));
        self
    }
}

/// A downlink maintaining a synchronised single-value replica.
pub struct ValueDownlinkView {
    core: Arc<ViewCore>,
}

impl_view_common!(ValueDownlinkView);

impl ValueDownlinkView {
    pub(crate) fn new(client: Weak<ClientInner>) -> Self {
        Self { core: ViewCore::new(DownlinkKind::Value, client) }
    }

    /// Synchronous `did_set(new, old)` callback, executed on the worker pool.
    pub fn did_set(
        &self,
        callback: impl Fn(&DecodedValue, &DecodedValue) + Send + Sync + 'static,
    ) -> &Self {
        self.core.set_did_set(Callback::Sync(Arc::new(move |(new, old)| callback(&new, &old))));
        self
    }

    /// Asynchronous `did_set` callback, spawned on the loop.
    pub fn did_set_async<F, Fut>(&self, callback: F) -> &Self
    where
        F: Fn(DecodedValue, DecodedValue) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.core.set_did_set(Callback::Async(Arc::new(move |(new, old)| -> BoxFuture {
            Box::pin(callback(new, old))
        })));
        self
    }

    /// Read the replica. Without `wait_sync` this returns the last observed
    /// snapshot immediately; with it, the calling thread blocks until the
    /// first `synced` (or the downlink's terminal error).
    pub fn get(&self, wait_sync: bool) -> Result<DecodedValue, ClientError> {
        if !self.core.is_open() {
            return Err(ClientError::NotOpen);
        }
        if !wait_sync {
            return Ok(self
                .core
                .model()
                .map(|model| model.value_snapshot())
                .unwrap_or_else(DecodedValue::absent));
        }
        let client = self.core.client_core()?;
        let view = Arc::clone(&self.core);
        client
            .runtime
            .schedule(async move {
                let manager = view.wait_attached().await?;
                manager.model().wait_synced().await?;
                Ok(manager.model().value_snapshot())
            })
            .wait()
    }

    /// Command the lane to a new value. With `blocking` the caller waits
    /// until the frame has been handed to the transport write path.
    pub fn set(&self, value: impl IntoValue, blocking: bool) -> Result<(), ClientError> {
        if !self.core.is_open() {
            return Err(ClientError::NotOpen);
        }
        let body = value.into_value();
        let client = self.core.client_core()?;
        let view = Arc::clone(&self.core);
        let task = async move {
            let manager = view.wait_attached().await?;
            manager.model().send_command(body).await
        };
        if blocking {
            client.runtime.schedule(task).wait()
        } else {
            client.runtime.spawn(task);
            Ok(())
        }
    }
}

/// A downlink maintaining a synchronised keyed-map replica.
pub struct MapDownlinkView {
    core: Arc<ViewCore>,
}

impl_view_common!(MapDownlinkView);

impl MapDownlinkView {
    pub(crate) fn new(client: Weak<ClientInner>) -> Self {
        Self { core: ViewCore::new(DownlinkKind::Map, client) }
    }

    /// Synchronous `did_update(key, new, old)` callback.
    pub fn did_update(
        &self,
        callback: impl Fn(&DecodedValue, &DecodedValue, &DecodedValue) + Send + Sync + 'static,
    ) -> &Self {
        self.core.set_did_update(Callback::Sync(Arc::new(move |(key, new, old)| {
            callback(&key, &new, &old)
        })));
        self
    }

    /// Asynchronous `did_update` callback.
    pub fn did_update_async<F, Fut>(&self, callback: F) -> &Self
    where
        F: Fn(DecodedValue, DecodedValue, DecodedValue) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.core.set_did_update(Callback::Async(Arc::new(
            move |(key, new, old)| -> BoxFuture { Box::pin(callback(key, new, old)) },
        )));
        self
    }

    /// Synchronous `did_remove(key, old)` callback.
    pub fn did_remove(
        &self,
        callback: impl Fn(&DecodedValue, &DecodedValue) + Send + Sync + 'static,
    ) -> &Self {
        self.core
            .set_did_remove(Callback::Sync(Arc::new(move |(key, old)| callback(&key, &old))));
        self
    }

    /// Asynchronous `did_remove` callback.
    pub fn did_remove_async<F, Fut>(&self, callback: F) -> &Self
    where
        F: Fn(DecodedValue, DecodedValue) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.core.set_did_remove(Callback::Async(Arc::new(move |(key, old)| -> BoxFuture {
            Box::pin(callback(key, old))
        })));
        self
    }

    /// Read one entry by key.
    pub fn get(&self, key: impl IntoValue, wait_sync: bool) -> Result<DecodedValue, ClientError> {
        if !self.core.is_open() {
            return Err(ClientError::NotOpen);
        }
        let key = key.into_value();
        if !wait_sync {
            return Ok(self
                .core
                .model()
                .map(|model| model.map_get(&key))
                .unwrap_or_else(DecodedValue::absent));
        }
        let client = self.core.client_core()?;
        let view = Arc::clone(&self.core);
        client
            .runtime
            .schedule(async move {
                let manager = view.wait_attached().await?;
                manager.model().wait_synced().await?;
                Ok(manager.model().map_get(&key))
            })
            .wait()
    }

    /// Read all entries as `(key, value)` pairs in insertion order.
    pub fn get_all(&self, wait_sync: bool) -> Result<Vec<(DecodedValue, DecodedValue)>, ClientError> {
        if !self.core.is_open() {
            return Err(ClientError::NotOpen);
        }
        if !wait_sync {
            return Ok(self.core.model().map(|model| model.map_entries()).unwrap_or_default());
        }
        let client = self.core.client_core()?;
        let view = Arc::clone(&self.core);
        client
            .runtime
            .schedule(async move {
                let manager = view.wait_attached().await?;
                manager.model().wait_synced().await?;
                Ok(manager.model().map_entries())
            })
            .wait()
    }

    /// Command an entry update on the remote lane.
    pub fn put(
        &self,
        key: impl IntoValue,
        value: impl IntoValue,
        blocking: bool,
    ) -> Result<(), ClientError> {
        let body = DownlinkModel::update_body(key.into_value(), value.into_value());
        self.send(body, blocking)
    }

    /// Command an entry removal on the remote lane.
    pub fn remove(&self, key: impl IntoValue, blocking: bool) -> Result<(), ClientError> {
        let body = DownlinkModel::remove_body(key.into_value());
        self.send(body, blocking)
    }

    fn send(&self, body: Value, blocking: bool) -> Result<(), ClientError> {
        if !self.core.is_open() {
            return Err(ClientError::NotOpen);
        }
        let client = self.core.client_core()?;
        let view = Arc::clone(&self.core);
        let task = async move {
            let manager = view.wait_attached().await?;
            manager.model().send_command(body).await
        };
        if blocking {
            client.runtime.schedule(task).wait()
        } else {
            client.runtime.spawn(task);
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "view_tests.rs"]
mod tests;
