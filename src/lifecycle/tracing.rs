//! # Observability & Tracing
//!
//! This module provides the tracing setup for stores and their effect processes.
//!
//! ## Configuration
//!
//! The subscriber uses a compact format that hides the crate/module prefix
//! (`with_target(false)`), with verbosity controlled by `RUST_LOG`.
//!
//! ## What Gets Traced
//!
//! - **Store Lifecycle**: initialization, reducer swaps, shutdown
//! - **Models**: descriptor derivation and runtime registration
//! - **Effects**: installed `take_every` rules and one span per handler run
//! - **Errors**: failed dispatches and failed effect handlers, with the action type
//!
//! ## Usage Examples
//!
//! ```bash
//! # Lifecycle only
//! RUST_LOG=info cargo run
//!
//! # Every dispatch, put and handler run
//! RUST_LOG=debug cargo run
//!
//! # Only the effect runtime
//! RUST_LOG=saga_model::effects=debug cargo run
//! ```
//!
//! With `RUST_LOG=debug` every `put` carries its handler run's span:
//!
//! ```text
//! INFO Store initialized slices=2 models=2
//! DEBUG effect: put action_type="counter/increment" action_type="counter/incrementAsync"
//! INFO Models registered version=1 added=["todo"]
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
