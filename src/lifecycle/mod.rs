//! Store composition and lifecycle management.
//!
//! This module turns descriptors into a running store and manages it afterwards:
//!
//! - **Composition**: merging model slices with hand-written reducers
//! - **Runtime registration**: adding models to a live store
//! - **Shutdown**: halting effect processes and stopping the store
//! - **Observability setup**: initializing tracing and logging
//!
//! # Main Components
//!
//! - [`init`] / [`StoreHandle`] - Builds a store from a [`StoreConfig`] and drives it
//! - [`setup_tracing`] - Initializes the tracing/logging infrastructure

pub mod store;
pub mod tracing;

pub use store::*;
pub use self::tracing::*;
