// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors produced by the Recon codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconError {
    /// Malformed input at a byte position.
    #[error("parse error at byte {position}: {reason}")]
    Parse { position: usize, reason: String },

    /// Strict decoding encountered a record tagged with an unregistered type.
    #[error("unknown type {0:?}")]
    UnknownType(String),
}

impl ReconError {
    pub fn parse(position: usize, reason: impl Into<String>) -> Self {
        Self::Parse { position, reason: reason.into() }
    }
}
