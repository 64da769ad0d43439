//! The store engine underneath every model.
//!
//! This module provides the building blocks the composer wires together: a
//! single-owner store actor, its client, reducers and middleware.
//!
//! # Main Components
//!
//! - [`StoreActor`] - Owns the whole-state tree and runs the root reducer
//! - [`StoreClient`] - Cloneable handle for dispatching and reading state
//! - [`combine_reducers`] - Folds namespaced slices into one root reducer
//! - [`StoreError`] / [`ReduceError`] - Common error types
//!
//! # Testing
//!
//! See [`mock`] module for utilities to test effect handlers without a running store.

pub mod core;
pub mod error;
pub mod mock;

// Re-export core types for convenience
pub use self::core::*;
pub use self::error::{ReduceError, StoreError};
