// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::ClientError;

/// Rewrite a host URI onto the WARP scheme.
///
/// `ws`/`wss` pass through, `http` becomes `ws`, `https` becomes `wss`;
/// anything else is rejected. Normalised URIs are the pool's host identity.
pub fn normalize_warp_scheme(host_uri: &str) -> Result<String, ClientError> {
    if host_uri.starts_with("ws://") || host_uri.starts_with("wss://") {
        return Ok(host_uri.to_owned());
    }
    if let Some(rest) = host_uri.strip_prefix("http://") {
        return Ok(format!("ws://{rest}"));
    }
    if let Some(rest) = host_uri.strip_prefix("https://") {
        return Ok(format!("wss://{rest}"));
    }
    Err(ClientError::InvalidUri(format!("unsupported scheme in {host_uri:?}")))
}

#[cfg(test)]
#[path = "uri_tests.rs"]
mod tests;
