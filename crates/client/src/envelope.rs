// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WARP envelopes: one tagged frame per WebSocket text message.
//!
//! Every envelope has the canonical Recon form `@tag(node:…,lane:…)body`.
//! Decoding recognises the head attribute and binds the remaining items as
//! the body; frames with an unrecognised head are not envelopes and are
//! dropped by the reader.

use warp_recon::{bind_items, Item, ReconError, Value};

/// The seven WARP frame tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeTag {
    Link,
    Sync,
    Synced,
    Linked,
    Unlinked,
    Event,
    Command,
}

impl EnvelopeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Sync => "sync",
            Self::Synced => "synced",
            Self::Linked => "linked",
            Self::Unlinked => "unlinked",
            Self::Event => "event",
            Self::Command => "command",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "link" => Self::Link,
            "sync" => Self::Sync,
            "synced" => Self::Synced,
            "linked" => Self::Linked,
            "unlinked" => Self::Unlinked,
            "event" => Self::Event,
            "command" => Self::Command,
            _ => return None,
        })
    }
}

/// One WARP message: tag, route, body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub tag: EnvelopeTag,
    pub node: String,
    pub lane: String,
    pub body: Value,
}

impl Envelope {
    pub fn new(
        tag: EnvelopeTag,
        node: impl Into<String>,
        lane: impl Into<String>,
        body: Value,
    ) -> Self {
        Self { tag, node: node.into(), lane: lane.into(), body }
    }

    pub fn link(node: impl Into<String>, lane: impl Into<String>) -> Self {
        Self::new(EnvelopeTag::Link, node, lane, Value::Absent)
    }

    pub fn sync(node: impl Into<String>, lane: impl Into<String>) -> Self {
        Self::new(EnvelopeTag::Sync, node, lane, Value::Absent)
    }

    pub fn linked(node: impl Into<String>, lane: impl Into<String>, body: Value) -> Self {
        Self::new(EnvelopeTag::Linked, node, lane, body)
    }

    pub fn synced(node: impl Into<String>, lane: impl Into<String>) -> Self {
        Self::new(EnvelopeTag::Synced, node, lane, Value::Absent)
    }

    pub fn unlinked(node: impl Into<String>, lane: impl Into<String>, body: Value) -> Self {
        Self::new(EnvelopeTag::Unlinked, node, lane, body)
    }

    pub fn event(node: impl Into<String>, lane: impl Into<String>, body: Value) -> Self {
        Self::new(EnvelopeTag::Event, node, lane, body)
    }

    pub fn command(node: impl Into<String>, lane: impl Into<String>, body: Value) -> Self {
        Self::new(EnvelopeTag::Command, node, lane, body)
    }

    pub fn route(&self) -> (String, String) {
        (self.node.clone(), self.lane.clone())
    }

    /// Serialise to the canonical wire form.
    pub fn to_recon(&self) -> String {
        let header = Value::record(vec![
            Item::slot(Value::text("node"), Value::text(&self.node)),
            Item::slot(Value::text("lane"), Value::text(&self.lane)),
        ]);
        let mut items = vec![Item::attr(self.tag.as_str(), header)];
        match &self.body {
            Value::Absent => {}
            Value::Record(record) => items.extend(record.items.iter().cloned()),
            value => items.push(Item::Value(value.clone())),
        }
        warp_recon::write(&Value::record(items))
    }

    /// Parse one wire frame. `Ok(None)` means well-formed Recon that is not
    /// a WARP envelope (unknown or missing head tag, missing route).
    pub fn parse(text: &str) -> Result<Option<Envelope>, ReconError> {
        let value = warp_recon::parse(text)?;
        Ok(Self::from_value(&value))
    }

    fn from_value(value: &Value) -> Option<Envelope> {
        let record = value.as_record()?;
        let (name, header) = record.head_attr()?;
        let tag = EnvelopeTag::from_name(name)?;
        let header = header.as_record()?;
        let node = uri_text(header.slot("node")?);
        let lane = uri_text(header.slot("lane")?);
        let body = bind_items(record.items[1..].to_vec());
        Some(Envelope { tag, node, lane, body })
    }
}

/// Route components are usually text but any primitive is accepted and
/// canonicalised through the writer.
fn uri_text(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        other => warp_recon::write(other),
    }
}

/// Body tag carried by `@unlinked` when the lane does not exist.
pub const LANE_NOT_FOUND_TAG: &str = "laneNotFound";

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
