//! # Store Errors
//!
//! Errors raised by the store engine itself and by the transition handlers it runs.
//! Reducer failures travel back to whoever called `dispatch`; they never reach
//! the effect scheduler.

/// Error returned by a transition handler.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    /// The handler refused the action.
    #[error("Transition rejected: {0}")]
    Rejected(String),
    /// The action payload could not be decoded into the shape the handler expects.
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Errors that can occur while talking to the store actor.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store closed")]
    ActorClosed,
    #[error("Store dropped response channel")]
    ActorDropped,
    #[error("Reducer failed for {action_type}: {source}")]
    Reducer {
        action_type: String,
        #[source]
        source: ReduceError,
    },
}
