// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WARP client: multiplexed streaming downlinks over WebSocket.
//!
//! A [`WarpClient`] owns a background loop on which all network I/O and
//! protocol state transitions run. User code opens downlink views to
//! `(host, node, lane)` addresses, receives events through callbacks, and
//! pushes commands back through the shared per-host transport.

pub mod client;
pub mod connection;
pub mod downlink;
pub mod envelope;
pub mod error;
pub mod pool;
pub mod runtime;
pub mod test_support;
pub mod uri;

pub use client::{WarpClient, WarpClientBuilder};
pub use downlink::view::{EventDownlinkView, MapDownlinkView, ValueDownlinkView};
pub use envelope::{Envelope, EnvelopeTag};
pub use error::ClientError;
pub use runtime::ErrorPolicy;
pub use warp_recon::{ClassRegistry, DecodedValue, IntoValue, Item, Record, Value};
