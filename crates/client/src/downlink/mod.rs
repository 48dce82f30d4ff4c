// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downlinks: the protocol state machine ([`model`]), the per-route owner
//! and fan-out hub ([`manager`]), and the user-facing handles ([`view`]).

pub mod manager;
pub mod model;
pub mod view;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::runtime::RuntimeHandle;

/// The three downlink kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkKind {
    Event,
    Value,
    Map,
}

/// A fully-resolved downlink address. The host URI is always in normalised
/// WARP form; `(node, lane)` is the route within a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownlinkAddress {
    pub host: String,
    pub node: String,
    pub lane: String,
}

impl DownlinkAddress {
    pub fn route(&self) -> (String, String) {
        (self.node.clone(), self.lane.clone())
    }
}

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A user callback. Synchronous closures execute on the blocking worker
/// pool; asynchronous closures are spawned on the loop. Either way each
/// invocation is its own task, so one slow subscriber cannot starve another
/// downlink.
pub(crate) enum Callback<A> {
    Sync(Arc<dyn Fn(A) + Send + Sync>),
    Async(Arc<dyn Fn(A) -> BoxFuture + Send + Sync>),
}

impl<A> Clone for Callback<A> {
    fn clone(&self) -> Self {
        match self {
            Callback::Sync(f) => Callback::Sync(Arc::clone(f)),
            Callback::Async(f) => Callback::Async(Arc::clone(f)),
        }
    }
}

impl<A: Send + 'static> Callback<A> {
    pub fn dispatch(&self, runtime: &RuntimeHandle, args: A) {
        match self {
            Callback::Sync(f) => {
                let f = Arc::clone(f);
                runtime.spawn_blocking(move || f(args));
            }
            Callback::Async(f) => {
                let future = f(args);
                runtime.spawn(async move {
                    future.await;
                    Ok(())
                });
            }
        }
    }
}
