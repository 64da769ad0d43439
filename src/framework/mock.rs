//! # Mock Store
//!
//! Utilities for testing effect handlers in isolation.
//!
//! Use [`MockStore`] for a fluent, expectation-driven fake, or [`create_mock_store`]
//! to get a client plus the raw request receiver and drive it with [`expect_dispatch`]
//! and [`expect_get_state`].

use crate::framework::{Action, StoreClient, StoreError, StoreRequest};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

/// An expected request to the mock store and the response to give.
enum Expectation {
    Dispatch {
        action_type: String,
        response: Result<(), StoreError>,
    },
    GetState {
        response: Result<Value, StoreError>,
    },
}

/// A fake store with expectation tracking.
///
/// Every dispatched action is recorded, whether or not it matched.
///
/// # Example
/// ```ignore
/// let mut mock = MockStore::new();
/// mock.expect_get_state().return_ok(json!({"counter": {"count": 1}}));
/// mock.expect_dispatch("counter/increment").return_ok();
///
/// let client = mock.client();
/// // Run an effect handler against the client...
/// mock.verify(); // Ensures all expectations were met
/// ```
pub struct MockStore {
    client: StoreClient,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    dispatched: Arc<Mutex<Vec<Action>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockStore {
    /// Creates a new mock store with no expectations.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<StoreRequest>(100);
        let (_state_tx, state_rx) = watch::channel(Value::Null);
        let expectations = Arc::new(Mutex::new(VecDeque::new()));
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let expectations_clone = expectations.clone();
        let dispatched_clone = dispatched.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let expectation = expectations_clone.lock().unwrap().pop_front();

                match (request, expectation) {
                    (
                        StoreRequest::Dispatch { action, respond_to },
                        Some(Expectation::Dispatch { action_type, response }),
                    ) => {
                        assert_eq!(action.action_type, action_type, "Unexpected action dispatched");
                        dispatched_clone.lock().unwrap().push(action);
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::GetState { respond_to }, Some(Expectation::GetState { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (request, _) => {
                        panic!("Unexpected request or expectation mismatch: {:?}", request);
                    }
                }
            }
        });

        Self {
            client: StoreClient::new(sender, state_rx),
            expectations,
            dispatched,
            _handle: handle,
        }
    }

    /// Returns the client for use in tests.
    pub fn client(&self) -> StoreClient {
        self.client.clone()
    }

    /// Expects a `dispatch` of the given action type.
    pub fn expect_dispatch(&mut self, action_type: impl Into<String>) -> DispatchExpectationBuilder {
        DispatchExpectationBuilder {
            action_type: action_type.into(),
            expectations: self.expectations.clone(),
        }
    }

    /// Expects a `get_state` call.
    pub fn expect_get_state(&mut self) -> GetStateExpectationBuilder {
        GetStateExpectationBuilder {
            expectations: self.expectations.clone(),
        }
    }

    /// Actions dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<Action> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!("Not all expectations were met. {} remaining", exps.len());
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `dispatch` expectations.
pub struct DispatchExpectationBuilder {
    action_type: String,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl DispatchExpectationBuilder {
    pub fn return_ok(self) {
        self.expectations.lock().unwrap().push_back(Expectation::Dispatch {
            action_type: self.action_type,
            response: Ok(()),
        });
    }

    pub fn return_err(self, error: StoreError) {
        self.expectations.lock().unwrap().push_back(Expectation::Dispatch {
            action_type: self.action_type,
            response: Err(error),
        });
    }
}

/// Builder for `get_state` expectations.
pub struct GetStateExpectationBuilder {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl GetStateExpectationBuilder {
    pub fn return_ok(self, state: Value) {
        self.expectations
            .lock()
            .unwrap()
            .push_back(Expectation::GetState { response: Ok(state) });
    }

    pub fn return_err(self, error: StoreError) {
        self.expectations
            .lock()
            .unwrap()
            .push_back(Expectation::GetState { response: Err(error) });
    }
}

// =============================================================================
// CHANNEL HELPERS
// =============================================================================

/// Creates a store client and the receiver its requests arrive on.
///
/// Nothing answers the requests: the test plays the store by reading the
/// receiver and replying on the enclosed one-shot channels.
pub fn create_mock_store(buffer_size: usize) -> (StoreClient, mpsc::Receiver<StoreRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    let (_state_tx, state_rx) = watch::channel(Value::Null);
    (StoreClient::new(sender, state_rx), receiver)
}

/// Helper to verify that the next request is a Dispatch.
pub async fn expect_dispatch(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(Action, oneshot::Sender<Result<(), StoreError>>)> {
    match receiver.recv().await {
        Some(StoreRequest::Dispatch { action, respond_to }) => Some((action, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next request is a GetState.
pub async fn expect_get_state(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<oneshot::Sender<Result<Value, StoreError>>> {
    match receiver.recv().await {
        Some(StoreRequest::GetState { respond_to }) => Some(respond_to),
        _ => None,
    }
}
