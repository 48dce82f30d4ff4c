// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downlink protocol state machine and replicated state.
//!
//! One model exists per route. All transitions happen on the loop thread;
//! replica locks are held only for non-awaiting critical sections, so
//! off-loop snapshot reads are never torn.

use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use warp_recon::{DecodedValue, Item, Value};

use crate::downlink::manager::DownlinkManager;
use crate::downlink::{DownlinkAddress, DownlinkKind};
use crate::envelope::{Envelope, EnvelopeTag, LANE_NOT_FOUND_TAG};
use crate::error::ClientError;

/// Lifecycle of a downlink model. Event downlinks treat `Linked` as their
/// steady state; value and map downlinks continue through the sync branch
/// and settle in `Synced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkState {
    Unopened,
    Linking,
    Linked,
    Syncing,
    Synced,
    Closed,
}

/// Whether the downlink survives an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Continue,
    /// The downlink is finished; the caller unregisters the route and
    /// releases the connection reference.
    Terminated,
}

/// One map replica entry, keyed externally by the canonical Recon string of
/// its key.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: DecodedValue,
    pub value: DecodedValue,
}

pub(crate) struct DownlinkModel {
    kind: DownlinkKind,
    address: DownlinkAddress,
    outbound: mpsc::Sender<String>,
    state: RwLock<DownlinkState>,
    linked: AtomicBool,
    synced: AtomicBool,
    terminal: RwLock<Option<ClientError>>,
    value: RwLock<DecodedValue>,
    map: RwLock<IndexMap<String, MapEntry>>,
    changes: watch::Sender<u64>,
}

impl DownlinkModel {
    pub fn new(kind: DownlinkKind, address: DownlinkAddress, outbound: mpsc::Sender<String>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            kind,
            address,
            outbound,
            state: RwLock::new(DownlinkState::Unopened),
            linked: AtomicBool::new(false),
            synced: AtomicBool::new(false),
            terminal: RwLock::new(None),
            value: RwLock::new(DecodedValue::absent()),
            map: RwLock::new(IndexMap::new()),
            changes,
        }
    }

    pub fn kind(&self) -> DownlinkKind {
        self.kind
    }

    pub fn address(&self) -> &DownlinkAddress {
        &self.address
    }

    pub fn state(&self) -> DownlinkState {
        *self.state.read()
    }

    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Open the downlink: event downlinks link, value and map downlinks sync.
    pub async fn establish(&self) -> Result<(), ClientError> {
        let envelope = match self.kind {
            DownlinkKind::Event => Envelope::link(&self.address.node, &self.address.lane),
            DownlinkKind::Value | DownlinkKind::Map => {
                Envelope::sync(&self.address.node, &self.address.lane)
            }
        };
        *self.state.write() = DownlinkState::Linking;
        self.bump();
        self.send_frame(envelope.to_recon()).await
    }

    /// Local close: wakes waiters, no further transitions.
    pub fn close(&self) {
        *self.state.write() = DownlinkState::Closed;
        self.bump();
    }

    /// Apply one inbound envelope. Called sequentially from the connection
    /// reader, preserving per-route frame order.
    pub async fn receive(&self, manager: &DownlinkManager, envelope: Envelope) -> ReceiveOutcome {
        match envelope.tag {
            EnvelopeTag::Linked => {
                self.on_linked();
                ReceiveOutcome::Continue
            }
            EnvelopeTag::Synced => {
                self.on_synced();
                ReceiveOutcome::Continue
            }
            EnvelopeTag::Event => {
                self.on_event(manager, envelope.body);
                ReceiveOutcome::Continue
            }
            EnvelopeTag::Unlinked => {
                self.on_unlinked(manager, &envelope.body);
                ReceiveOutcome::Terminated
            }
            tag => {
                debug!(tag = tag.as_str(), "ignoring client-to-server tag from peer");
                ReceiveOutcome::Continue
            }
        }
    }

    fn on_linked(&self) {
        self.linked.store(true, Ordering::Release);
        *self.state.write() = match self.kind {
            DownlinkKind::Event => DownlinkState::Linked,
            DownlinkKind::Value | DownlinkKind::Map => DownlinkState::Syncing,
        };
        self.bump();
    }

    fn on_synced(&self) {
        if self.kind == DownlinkKind::Event {
            warn!(lane = %self.address.lane, "event downlink received synced, ignoring");
            return;
        }
        self.synced.store(true, Ordering::Release);
        *self.state.write() = DownlinkState::Synced;
        self.bump();
    }

    fn on_event(&self, manager: &DownlinkManager, body: Value) {
        match self.kind {
            DownlinkKind::Event => match manager.decode(&body) {
                Ok(event) => manager.subscribers_on_event(event),
                Err(err) => manager.runtime().handle_error(err),
            },
            DownlinkKind::Value => match manager.decode(&body) {
                Ok(new) => {
                    let old = {
                        let mut value = self.value.write();
                        std::mem::replace(&mut *value, new.clone())
                    };
                    manager.subscribers_did_set(new, old);
                }
                Err(err) => manager.runtime().handle_error(err),
            },
            DownlinkKind::Map => self.on_map_event(manager, &body),
        }
    }

    fn on_map_event(&self, manager: &DownlinkManager, body: &Value) {
        let Some(record) = body.as_record() else {
            debug!(lane = %self.address.lane, "map event without record body, ignoring");
            return;
        };
        let Some((tag, header)) = record.head_attr() else {
            debug!(lane = %self.address.lane, "map event without head attribute, ignoring");
            return;
        };
        // `@update(key: K)` / `@remove(key: K)`: the key is the first slot
        // of the attribute arguments; its canonical Recon string is the map
        // identity across encodings.
        let Some(raw_key) = header.as_record().and_then(|h| h.first_slot_value()) else {
            debug!(lane = %self.address.lane, tag, "map event without key, ignoring");
            return;
        };
        let canonical = warp_recon::write(raw_key);
        let key = match manager.decode(raw_key) {
            Ok(key) => key,
            Err(err) => return manager.runtime().handle_error(err),
        };
        match tag {
            "update" => {
                let new = match manager.decode(&record.body()) {
                    Ok(new) => new,
                    Err(err) => return manager.runtime().handle_error(err),
                };
                let old = {
                    let mut map = self.map.write();
                    map.insert(canonical, MapEntry { key: key.clone(), value: new.clone() })
                        .map(|entry| entry.value)
                        .unwrap_or_else(DecodedValue::absent)
                };
                manager.subscribers_did_update(key, new, old);
            }
            "remove" => {
                let old = {
                    let mut map = self.map.write();
                    map.shift_remove(&canonical)
                        .map(|entry| entry.value)
                        .unwrap_or_else(DecodedValue::absent)
                };
                manager.subscribers_did_remove(key, old);
            }
            other => {
                debug!(lane = %self.address.lane, tag = other, "unknown map event tag, ignoring");
            }
        }
    }

    fn on_unlinked(&self, manager: &DownlinkManager, body: &Value) {
        let err = if body.tag() == Some(LANE_NOT_FOUND_TAG) {
            ClientError::LaneNotFound(self.address.lane.clone())
        } else {
            ClientError::Unlinked
        };
        {
            let mut terminal = self.terminal.write();
            if terminal.is_none() {
                *terminal = Some(err.clone());
            }
        }
        *self.state.write() = DownlinkState::Closed;
        self.bump();
        if matches!(err, ClientError::LaneNotFound(_)) {
            manager.runtime().handle_error(err);
        }
    }

    /// The terminal error recorded when the downlink closed abnormally.
    pub fn terminal_error(&self) -> Option<ClientError> {
        self.terminal.read().clone()
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Wait for the link acknowledgement, then hand the command frame to the
    /// connection writer.
    pub async fn send_command(&self, body: Value) -> Result<(), ClientError> {
        self.wait_linked().await?;
        let envelope = Envelope::command(&self.address.node, &self.address.lane, body);
        self.send_frame(envelope.to_recon()).await
    }

    /// `@update(key: K) V` for map puts.
    pub fn update_body(key: Value, value: Value) -> Value {
        let mut items = vec![Item::attr(
            "update",
            Value::record(vec![Item::slot(Value::text("key"), key)]),
        )];
        match value {
            Value::Absent => {}
            value => items.push(Item::Value(value)),
        }
        Value::record(items)
    }

    /// `@remove(key: K)` for map removals.
    pub fn remove_body(key: Value) -> Value {
        Value::record(vec![Item::attr(
            "remove",
            Value::record(vec![Item::slot(Value::text("key"), key)]),
        )])
    }

    async fn send_frame(&self, frame: String) -> Result<(), ClientError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::Transport("connection closed".to_owned()))
    }

    // -----------------------------------------------------------------------
    // Waiters and snapshots
    // -----------------------------------------------------------------------

    pub async fn wait_linked(&self) -> Result<(), ClientError> {
        self.wait_for(|model| model.is_linked()).await
    }

    pub async fn wait_synced(&self) -> Result<(), ClientError> {
        self.wait_for(|model| model.is_synced()).await
    }

    async fn wait_for(&self, reached: impl Fn(&Self) -> bool) -> Result<(), ClientError> {
        let mut rx = self.changes.subscribe();
        loop {
            if reached(self) {
                return Ok(());
            }
            if self.state() == DownlinkState::Closed {
                return Err(self.terminal_error().unwrap_or(ClientError::Cancelled));
            }
            if rx.changed().await.is_err() {
                return Err(ClientError::Cancelled);
            }
        }
    }

    pub fn value_snapshot(&self) -> DecodedValue {
        self.value.read().clone()
    }

    pub fn map_get(&self, key: &Value) -> DecodedValue {
        let canonical = warp_recon::write(key);
        self.map
            .read()
            .get(&canonical)
            .map(|entry| entry.value.clone())
            .unwrap_or_else(DecodedValue::absent)
    }

    /// All entries as `(key, value)` pairs in insertion order.
    pub fn map_entries(&self) -> Vec<(DecodedValue, DecodedValue)> {
        self.map.read().values().map(|entry| (entry.key.clone(), entry.value.clone())).collect()
    }

    fn bump(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
