//! # Core Store Engine
//!
//! This module defines the store that every model is eventually wired into.
//!
//! ## Key Types
//!
//! - [`Action`]: The `{type, payload}` message that drives every state change.
//! - [`Reducer`]: A function computing the next state from the current one.
//! - [`Middleware`]: Hooks that observe (or swallow) actions around the reducer.
//! - [`StoreActor`]: The single owner of the whole-state tree.
//! - [`StoreClient`]: The cloneable handle used to dispatch and read state.

use crate::framework::error::{ReduceError, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Separator between a namespace and a bare key in a qualified action type.
pub const DIVIDER: char = '/';

/// Applied once when a store is created so every slice can install its default state.
pub const INIT_ACTION_TYPE: &str = "@@store/INIT";

/// Applied after every reducer swap so newly added slices appear immediately.
pub const REPLACE_ACTION_TYPE: &str = "@@store/REPLACE";

/// The halt signal understood by the effect scheduler.
pub const HALT_ACTION_TYPE: &str = "@@store/HALT";

// =============================================================================
// 1. ACTIONS & REDUCERS
// =============================================================================

/// A dispatched message: a type string plus an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    pub fn new(action_type: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: payload.into(),
        }
    }

    /// An action with a `null` payload.
    pub fn bare(action_type: impl Into<String>) -> Self {
        Self::new(action_type, Value::Null)
    }

    /// The reserved halt action.
    pub fn halt() -> Self {
        Self::bare(HALT_ACTION_TYPE)
    }

    pub fn is_halt(&self) -> bool {
        self.action_type == HALT_ACTION_TYPE
    }
}

/// A reducer for either one namespaced slice or the whole state.
///
/// `None` stands for "no state yet": slice reducers substitute their default state.
pub type Reducer = Arc<dyn Fn(Option<Value>, &Action) -> Result<Value, ReduceError> + Send + Sync>;

/// Builds the identity reducer used when no slice is registered.
pub fn identity_reducer() -> Reducer {
    Arc::new(|state, _action| Ok(state.unwrap_or(Value::Null)))
}

/// Combines namespaced slice reducers into one reducer over a whole-state object.
///
/// Each slice reducer only ever sees its own key. The resulting object contains
/// exactly the registered namespaces; unknown keys of the previous state are dropped.
pub fn combine_reducers(slices: &BTreeMap<String, Reducer>) -> Reducer {
    if slices.is_empty() {
        return identity_reducer();
    }
    let slices = slices.clone();
    Arc::new(move |state, action| {
        let mut previous = match state {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let mut next = Map::with_capacity(slices.len());
        for (namespace, reducer) in &slices {
            let slice = previous.remove(namespace);
            next.insert(namespace.clone(), reducer(slice, action)?);
        }
        Ok(Value::Object(next))
    })
}

// =============================================================================
// 2. MIDDLEWARE
// =============================================================================

/// Hooks wrapped around every dispatch.
///
/// `before` hooks run in registration order and may swallow an action by
/// returning `false`. `after` hooks run in reverse order once the reducer has
/// produced the new state, so the first middleware observes last.
pub trait Middleware: Send + Sync {
    fn before(&self, _action: &Action, _state: &Value) -> bool {
        true
    }

    fn after(&self, _action: &Action, _state: &Value) {}
}

/// Logs every action and the resulting state at `debug` level.
#[derive(Debug, Default, Clone)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, action: &Action, _state: &Value) -> bool {
        debug!(action_type = %action.action_type, payload = %action.payload, "Dispatching");
        true
    }

    fn after(&self, action: &Action, state: &Value) {
        debug!(action_type = %action.action_type, %state, "Reduced");
    }
}

// =============================================================================
// 3. MESSAGES
// =============================================================================

/// Type alias for the one-shot response channel used by the store.
pub type Response<T> = oneshot::Sender<Result<T, StoreError>>;

/// Requests processed by the [`StoreActor`].
pub enum StoreRequest {
    Dispatch {
        action: Action,
        respond_to: Response<()>,
    },
    GetState {
        respond_to: Response<Value>,
    },
    ReplaceReducer {
        reducer: Reducer,
        respond_to: Response<()>,
    },
}

impl std::fmt::Debug for StoreRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreRequest::Dispatch { action, .. } => f.debug_struct("Dispatch").field("action", action).finish(),
            StoreRequest::GetState { .. } => f.write_str("GetState"),
            StoreRequest::ReplaceReducer { .. } => f.write_str("ReplaceReducer"),
        }
    }
}

// =============================================================================
// 4. THE STORE ACTOR
// =============================================================================

/// The single owner of the whole-state tree.
///
/// Requests are handled one at a time, so a dispatch always runs the root
/// reducer to completion before the next request is looked at. No lock guards
/// the state: exclusive ownership inside the task is the synchronization.
pub struct StoreActor {
    receiver: mpsc::Receiver<StoreRequest>,
    state: Value,
    reducer: Reducer,
    middlewares: Vec<Arc<dyn Middleware>>,
    published: watch::Sender<Value>,
}

impl StoreActor {
    /// Creates the store, reducing the preloaded state with [`INIT_ACTION_TYPE`].
    ///
    /// Returns the actor (which must be driven by [`StoreActor::run`]) and a client.
    pub fn new(
        reducer: Reducer,
        preloaded_state: Option<Value>,
        middlewares: Vec<Arc<dyn Middleware>>,
        buffer_size: usize,
    ) -> Result<(Self, StoreClient), StoreError> {
        let init = Action::bare(INIT_ACTION_TYPE);
        let state = reducer(preloaded_state, &init).map_err(|source| StoreError::Reducer {
            action_type: init.action_type.clone(),
            source,
        })?;

        let (sender, receiver) = mpsc::channel(buffer_size);
        let (published, state_rx) = watch::channel(state.clone());
        let actor = Self {
            receiver,
            state,
            reducer,
            middlewares,
            published,
        };
        Ok((actor, StoreClient::new(sender, state_rx)))
    }

    /// Processes requests until every client has been dropped.
    pub async fn run(mut self) {
        info!(middlewares = self.middlewares.len(), "Store started");

        while let Some(request) = self.receiver.recv().await {
            match request {
                StoreRequest::Dispatch { action, respond_to } => {
                    let result = self.dispatch(action);
                    let _ = respond_to.send(result);
                }
                StoreRequest::GetState { respond_to } => {
                    let _ = respond_to.send(Ok(self.state.clone()));
                }
                StoreRequest::ReplaceReducer { reducer, respond_to } => {
                    self.reducer = reducer;
                    let replace = Action::bare(REPLACE_ACTION_TYPE);
                    let result = self.apply(&replace);
                    match &result {
                        Ok(()) => info!("Reducer replaced"),
                        Err(e) => warn!(error = %e, "Reducer replaced but initial reduce failed"),
                    }
                    let _ = respond_to.send(result);
                }
            }
        }

        info!("Store shutdown");
    }

    fn dispatch(&mut self, action: Action) -> Result<(), StoreError> {
        for middleware in &self.middlewares {
            if !middleware.before(&action, &self.state) {
                debug!(action_type = %action.action_type, "Swallowed by middleware");
                return Ok(());
            }
        }

        if let Err(e) = self.apply(&action) {
            warn!(action_type = %action.action_type, error = %e, "Dispatch failed");
            return Err(e);
        }

        for middleware in self.middlewares.iter().rev() {
            middleware.after(&action, &self.state);
        }
        Ok(())
    }

    /// Runs the root reducer. On failure the previous state is kept.
    fn apply(&mut self, action: &Action) -> Result<(), StoreError> {
        let next = (self.reducer)(Some(self.state.clone()), action).map_err(|source| {
            StoreError::Reducer {
                action_type: action.action_type.clone(),
                source,
            }
        })?;
        self.state = next;
        self.published.send_replace(self.state.clone());
        Ok(())
    }
}

// =============================================================================
// 5. THE CLIENT
// =============================================================================

/// A cloneable handle for dispatching actions and reading state.
#[derive(Clone)]
pub struct StoreClient {
    sender: mpsc::Sender<StoreRequest>,
    state: watch::Receiver<Value>,
}

impl StoreClient {
    pub fn new(sender: mpsc::Sender<StoreRequest>, state: watch::Receiver<Value>) -> Self {
        Self { sender, state }
    }

    /// Dispatches an action and waits until the reducer has run.
    pub async fn dispatch(&self, action: Action) -> Result<(), StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::Dispatch { action, respond_to })
            .await
            .map_err(|_| StoreError::ActorClosed)?;
        response.await.map_err(|_| StoreError::ActorDropped)?
    }

    pub async fn get_state(&self) -> Result<Value, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::GetState { respond_to })
            .await
            .map_err(|_| StoreError::ActorClosed)?;
        response.await.map_err(|_| StoreError::ActorDropped)?
    }

    /// Swaps the root reducer of a running store.
    pub async fn replace_reducer(&self, reducer: Reducer) -> Result<(), StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::ReplaceReducer { reducer, respond_to })
            .await
            .map_err(|_| StoreError::ActorClosed)?;
        response.await.map_err(|_| StoreError::ActorDropped)?
    }

    /// Returns a receiver that is notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<Value> {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_reducer() -> Reducer {
        Arc::new(|state, action| {
            let count = state.as_ref().and_then(Value::as_i64).unwrap_or(0);
            match action.action_type.as_str() {
                "counter/add" => Ok(json!(count + action.payload.as_i64().unwrap_or(0))),
                "counter/fail" => Err(ReduceError::Rejected("boom".into())),
                _ => Ok(json!(count)),
            }
        })
    }

    #[test]
    fn test_action_serializes_type_field() {
        let action = Action::new("counter/add", 2);
        let encoded = serde_json::to_value(&action).unwrap();
        assert_eq!(encoded, json!({"type": "counter/add", "payload": 2}));

        let decoded: Action = serde_json::from_value(json!({"type": "x/y"})).unwrap();
        assert_eq!(decoded, Action::bare("x/y"));
    }

    #[test]
    fn test_combine_reducers_keys_by_namespace() {
        let mut slices = BTreeMap::new();
        slices.insert("counter".to_string(), counter_reducer());
        let root = combine_reducers(&slices);

        let state = root(Some(json!({"stale": true})), &Action::new("counter/add", 3)).unwrap();
        assert_eq!(state, json!({"counter": 3}));
    }

    #[test]
    fn test_empty_combination_is_identity() {
        let root = combine_reducers(&BTreeMap::new());
        let state = json!({"anything": [1, 2]});
        assert_eq!(root(Some(state.clone()), &Action::bare("a/b")).unwrap(), state);
        assert_eq!(root(None, &Action::bare("a/b")).unwrap(), Value::Null);
    }

    struct Counting {
        after: Arc<AtomicUsize>,
        swallow: &'static str,
    }

    impl Middleware for Counting {
        fn before(&self, action: &Action, _state: &Value) -> bool {
            action.action_type != self.swallow
        }

        fn after(&self, _action: &Action, _state: &Value) {
            self.after.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_store_actor_dispatch_and_failures() {
        let after = Arc::new(AtomicUsize::new(0));
        let middleware: Arc<dyn Middleware> = Arc::new(Counting {
            after: after.clone(),
            swallow: "counter/ignored",
        });
        let (actor, client) = StoreActor::new(counter_reducer(), None, vec![middleware], 8).unwrap();
        let handle = tokio::spawn(actor.run());

        client.dispatch(Action::new("counter/add", 5)).await.unwrap();
        client.dispatch(Action::new("counter/add", 5)).await.unwrap();
        assert_eq!(client.get_state().await.unwrap(), json!(10));
        assert_eq!(*client.subscribe().borrow(), json!(10));

        // A failing transition leaves state untouched and skips `after` hooks.
        let err = client.dispatch(Action::bare("counter/fail")).await.unwrap_err();
        assert!(matches!(err, StoreError::Reducer { ref action_type, .. } if action_type == "counter/fail"));
        assert_eq!(client.get_state().await.unwrap(), json!(10));

        client.dispatch(Action::new("counter/ignored", 1)).await.unwrap();
        assert_eq!(after.load(Ordering::SeqCst), 2);

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_reducer_applies_replace_action() {
        let (actor, client) = StoreActor::new(identity_reducer(), Some(json!({})), vec![], 8).unwrap();
        tokio::spawn(actor.run());

        let mut slices = BTreeMap::new();
        slices.insert("counter".to_string(), counter_reducer());
        client.replace_reducer(combine_reducers(&slices)).await.unwrap();

        assert_eq!(client.get_state().await.unwrap(), json!({"counter": 0}));
    }
}
