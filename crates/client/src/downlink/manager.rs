// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-route downlink manager.
//!
//! Owns the single model for its route, tracks the attached subscriber
//! views, and fans inbound callbacks out to them. The class registry and
//! strict flag live here once any view is attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use warp_recon::{decode_value, ClassRegistry, DecodedValue, Value};

use crate::downlink::model::{DownlinkModel, ReceiveOutcome};
use crate::downlink::view::ViewCore;
use crate::downlink::{DownlinkAddress, DownlinkKind};
use crate::envelope::Envelope;
use crate::error::ClientError;
use crate::runtime::RuntimeHandle;

pub(crate) struct DownlinkManager {
    model: Arc<DownlinkModel>,
    views: RwLock<Vec<Arc<ViewCore>>>,
    registry: RwLock<ClassRegistry>,
    strict: AtomicBool,
    runtime: RuntimeHandle,
}

impl DownlinkManager {
    pub fn new(
        kind: DownlinkKind,
        address: DownlinkAddress,
        outbound: mpsc::Sender<String>,
        runtime: RuntimeHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            model: Arc::new(DownlinkModel::new(kind, address, outbound)),
            views: RwLock::new(Vec::new()),
            registry: RwLock::new(ClassRegistry::new()),
            strict: AtomicBool::new(false),
            runtime: runtime.clone(),
        })
    }

    pub fn model(&self) -> &Arc<DownlinkModel> {
        &self.model
    }

    pub fn kind(&self) -> DownlinkKind {
        self.model.kind()
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    /// True once the model has received `linked`.
    pub fn is_open(&self) -> bool {
        self.model.is_linked()
    }

    pub fn strict(&self) -> bool {
        self.strict.load(Ordering::Acquire)
    }

    pub fn set_strict(&self, strict: bool) {
        self.strict.store(strict, Ordering::Release);
    }

    pub fn update_registry(&self, update: impl FnOnce(&mut ClassRegistry)) {
        update(&mut self.registry.write());
    }

    /// Attach a subscriber. The view's private registrations merge into the
    /// manager and its strict flag is adopted; a view joining after the
    /// first sync completed gets the current replica replayed to it alone.
    pub fn add_view(&self, view: Arc<ViewCore>) {
        self.registry.write().merge(&view.private_registry());
        self.set_strict(view.private_strict());

        if self.model.is_synced() {
            match self.kind() {
                DownlinkKind::Value => {
                    view.dispatch_did_set(
                        &self.runtime,
                        self.model.value_snapshot(),
                        DecodedValue::absent(),
                    );
                }
                DownlinkKind::Map => {
                    for (key, value) in self.model.map_entries() {
                        view.dispatch_did_update(&self.runtime, key, value, DecodedValue::absent());
                    }
                }
                DownlinkKind::Event => {}
            }
        }

        self.views.write().push(view);
    }

    /// Detach a subscriber; returns true when no views remain and the model
    /// should be closed.
    pub fn remove_view(&self, view: &Arc<ViewCore>) -> bool {
        let mut views = self.views.write();
        views.retain(|attached| !Arc::ptr_eq(attached, view));
        views.is_empty()
    }

    pub fn view_count(&self) -> usize {
        self.views.read().len()
    }

    pub async fn receive_message(&self, envelope: Envelope) -> ReceiveOutcome {
        self.model.receive(self, envelope).await
    }

    /// Decode an event payload with the merged registry and strict flag.
    pub fn decode(&self, value: &Value) -> Result<DecodedValue, ClientError> {
        decode_value(value, &self.registry.read(), self.strict()).map_err(ClientError::from)
    }

    // -----------------------------------------------------------------------
    // Fan-out: every callback invocation is its own task on the runtime.
    // -----------------------------------------------------------------------

    pub fn subscribers_on_event(&self, event: DecodedValue) {
        for view in self.views.read().iter() {
            view.dispatch_on_event(&self.runtime, event.clone());
        }
    }

    pub fn subscribers_did_set(&self, new: DecodedValue, old: DecodedValue) {
        for view in self.views.read().iter() {
            view.dispatch_did_set(&self.runtime, new.clone(), old.clone());
        }
    }

    pub fn subscribers_did_update(&self, key: DecodedValue, new: DecodedValue, old: DecodedValue) {
        for view in self.views.read().iter() {
            view.dispatch_did_update(&self.runtime, key.clone(), new.clone(), old.clone());
        }
    }

    pub fn subscribers_did_remove(&self, key: DecodedValue, old: DecodedValue) {
        for view in self.views.read().iter() {
            view.dispatch_did_remove(&self.runtime, key.clone(), old.clone());
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
