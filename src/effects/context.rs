//! # Effect Context
//!
//! The capabilities an effect handler gets while it runs against a live store.
//!
//! - [`EffectContext::put`] dispatches an action and waits for the reducer.
//! - [`EffectContext::select`] reads the whole state.
//! - [`EffectContext::take`] waits for the next action of a given type.
//! - [`EffectContext::take_every`] installs a standing rule: every matching
//!   action spawns a fresh, independent run of a handler.
//! - [`EffectContext::fork`] spawns arbitrary work inside the store's task group.
//!
//! No matching action is ever skipped: rules and takes are fed directly by the
//! scheduler. Everything spawned here is cancelled cooperatively by the halt signal.

use crate::effects::bus::ActionBus;
use crate::effects::tasks::{Counters, TaskGroup};
use crate::framework::{Action, StoreClient, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Waker};
use tracing::{debug, warn, Instrument};

/// Errors raised by effect handlers and by the scheduler that runs them.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Effect scheduler is not attached to a running store")]
    NotAttached,
    #[error("Effect scheduler has been halted")]
    Halted,
    #[error("Effect failed: {0}")]
    Failed(String),
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A long-running handler invoked once per matching action.
///
/// Implemented for every `Fn(Action, EffectContext) -> impl Future<Output = Result<(), EffectError>>`,
/// so plain async closures can be registered directly.
#[async_trait]
pub trait EffectHandler: Send + Sync {
    async fn handle(&self, action: Action, ctx: EffectContext) -> Result<(), EffectError>;
}

#[async_trait]
impl<F, Fut> EffectHandler for F
where
    F: Fn(Action, EffectContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
{
    async fn handle(&self, action: Action, ctx: EffectContext) -> Result<(), EffectError> {
        (self)(action, ctx).await
    }
}

/// A root coordination routine started against a live store.
///
/// `start` runs synchronously: any `take_every` rule it installs is listening
/// before the scheduler hands control back. Long-running work belongs in
/// [`EffectContext::fork`] or in the handlers the rules spawn.
pub trait Saga: Send + Sync {
    fn start(&self, ctx: &EffectContext) -> Result<(), EffectError>;
}

impl<F> Saga for F
where
    F: Fn(&EffectContext) -> Result<(), EffectError> + Send + Sync,
{
    fn start(&self, ctx: &EffectContext) -> Result<(), EffectError> {
        (self)(ctx)
    }
}

#[derive(Clone)]
pub struct EffectContext {
    store: StoreClient,
    bus: Arc<ActionBus>,
    tasks: Arc<TaskGroup>,
}

impl EffectContext {
    pub(crate) fn new(store: StoreClient, bus: Arc<ActionBus>, tasks: Arc<TaskGroup>) -> Self {
        Self { store, bus, tasks }
    }

    /// Dispatches an action against the store.
    pub async fn put(&self, action: Action) -> Result<(), EffectError> {
        debug!(action_type = %action.action_type, "put");
        self.store.dispatch(action).await.map_err(EffectError::from)
    }

    /// Reads the current whole state.
    pub async fn select(&self) -> Result<Value, EffectError> {
        self.store.get_state().await.map_err(EffectError::from)
    }

    /// Waits for the next dispatched action whose type is exactly `action_type`.
    ///
    /// The wait is registered when `take` is called, not when the returned
    /// future is first polled. Resolves to `None` once the store halts.
    pub fn take(&self, action_type: &str) -> impl Future<Output = Option<Action>> + Send + 'static {
        let waiter = self.bus.wait_for(action_type);
        let mut halt = self.tasks.halt_signal();
        async move {
            let waiter = waiter?;
            tokio::select! {
                biased;
                _ = halt.wait_for(|halted| *halted) => None,
                taken = waiter => taken.ok(),
            }
        }
    }

    /// Spawns a fresh run of `handler` for every dispatched action of type `action_type`.
    ///
    /// Runs are never queued behind one another and a new match never cancels
    /// an in-flight run. Handler errors are logged and counted, then dropped.
    pub fn take_every(&self, action_type: impl Into<String>, handler: Arc<dyn EffectHandler>) {
        let action_type = action_type.into();
        if self.bus.add_rule(action_type.clone(), handler) {
            Counters::bump(&self.tasks.counters.watchers);
            debug!(action_type = %action_type, "Rule installed");
        } else {
            debug!(action_type = %action_type, "Store halted, rule not installed");
        }
    }

    pub(crate) fn spawn_run(&self, action: Action, handler: Arc<dyn EffectHandler>) {
        let ctx = self.clone();
        let tasks = self.tasks.clone();
        let span = tracing::debug_span!("effect", action_type = %action.action_type);
        // Count before spawning so `completed` can never overtake `spawned`.
        Counters::bump(&self.tasks.counters.spawned);
        let spawned = self.tasks.spawn_cancellable(
            async move {
                match handler.handle(action, ctx).await {
                    Ok(()) => Counters::bump(&tasks.counters.completed),
                    Err(e) => {
                        Counters::bump(&tasks.counters.failed);
                        warn!(error = %e, "Effect handler failed");
                    }
                }
            }
            .instrument(span),
        );
        if !spawned {
            self.tasks.counters.spawned.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Spawns `fut` inside the store's task group.
    ///
    /// `fut` runs up to its first suspension point before `fork` returns, so a
    /// `take` at its head is already waiting when the caller dispatches next.
    /// Returns `false` if the store has halted.
    pub fn fork<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tasks.is_halted() {
            return false;
        }
        let mut fut = Box::pin(fut);
        let mut cx = Context::from_waker(Waker::noop());
        if fut.as_mut().poll(&mut cx).is_ready() {
            return true;
        }
        self.tasks.spawn_cancellable(fut)
    }

    pub fn is_halted(&self) -> bool {
        self.tasks.is_halted()
    }

    /// Resolves once the store halts.
    pub async fn halted(&self) {
        let mut halt = self.tasks.halt_signal();
        let _ = halt.wait_for(|halted| *halted).await;
    }

    /// The store client this context dispatches through.
    pub fn store(&self) -> &StoreClient {
        &self.store
    }
}
