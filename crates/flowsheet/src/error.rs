//! Error types for flowsheet operations.
//!
//! This module provides the main error type [`FlowsheetError`] which wraps
//! the error conditions that can occur while loading and resolving a model.

use std::io;

use thiserror::Error;

use flowsheet_resolve::error::ResolveError;

/// The main error type for flowsheet operations.
///
/// # Diagnostic Variants
///
/// The `Resolve` variant carries one or more structured diagnostics labelled
/// with the identity keys involved, suitable for rich error reporting.
#[derive(Debug, Error)]
pub enum FlowsheetError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid fragment `{path}`: {err}")]
    Decode {
        path: String,
        #[source]
        err: serde_json::Error,
    },

    #[error("Cannot encode fragment `{path}`: {err}")]
    Encode {
        path: String,
        #[source]
        err: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Resolve(#[from] ResolveError),
}

impl FlowsheetError {
    /// Create a new `Decode` error for the fragment at `path`.
    pub fn new_decode_error(err: serde_json::Error, path: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            err,
        }
    }

    /// Create a new `Encode` error for the fragment written to `path`.
    pub fn new_encode_error(err: serde_json::Error, path: impl Into<String>) -> Self {
        Self::Encode {
            path: path.into(),
            err,
        }
    }
}
