// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the visibility engine.
///
/// Denial decisions (blocked, age-gated, group-denied) are never errors:
/// denied content is simply absent from results, so a caller cannot tell a
/// hidden post from a nonexistent one.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The entity a scope refers to does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A dependency missed its deadline; the request fails closed
    #[error("dependency `{dependency}` timed out after {timeout:?}")]
    DependencyTimeout {
        dependency: &'static str,
        timeout: Duration,
    },

    /// Conflicting or malformed scope parameters
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// Relation store failure
    #[error("relation store error: {0}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Store(e)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
