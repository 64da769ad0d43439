//! Error types for model construction.

use thiserror::Error;

/// Errors that can occur while deriving a descriptor from a spec.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// The namespace is empty; every type would start with the divider.
    #[error("Model namespace must not be empty")]
    EmptyNamespace,

    /// The namespace contains the divider and would be unreachable as a prefix.
    #[error("Model namespace {0:?} contains the divider")]
    InvalidNamespace(String),
}
