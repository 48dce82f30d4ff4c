// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;
use warp_recon::ReconError;

/// Errors surfaced by the WARP client.
///
/// Protocol errors close the affected downlink but leave the connection
/// serving its other routes; transport errors close the connection and every
/// downlink multiplexed over it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Recon(#[from] ReconError),

    /// The remote agent has no such lane; terminal for the downlink.
    #[error("lane {0:?} was not found on the remote agent")]
    LaneNotFound(String),

    /// The downlink was unlinked by the peer.
    #[error("downlink was unlinked")]
    Unlinked,

    /// Read or write on an unopened downlink.
    #[error("downlink is not open")]
    NotOpen,

    /// Address mutation on an opened view.
    #[error("downlink is already open")]
    AlreadyOpen,

    /// A downlink of another kind already serves this route.
    #[error("a downlink of a different kind is already open for this lane")]
    KindConflict,

    /// Operation on a client whose runtime is not started.
    #[error("client is not running")]
    NotRunning,

    #[error("invalid host uri: {0}")]
    InvalidUri(String),

    #[error("downlink address is incomplete: missing {0}")]
    MissingUri(&'static str),

    /// Underlying WebSocket failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The task was cancelled during close.
    #[error("task was cancelled")]
    Cancelled,

    /// A blocking façade call from the loop thread or an async context.
    #[error("blocking call made from an asynchronous context")]
    BlockingOnLoop,

    #[error("runtime error: {0}")]
    Runtime(String),
}
