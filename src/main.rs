//! # Saga Model Demo
//!
//! Builds a store with a counter model, injects a todo model while the store is
//! running, drives both through their action creators and effects, then shuts down.

use saga_model::effects::{EffectContext, EffectError};
use saga_model::framework::{Action, LoggingMiddleware};
use saga_model::lifecycle::{init, setup_tracing, StoreConfig};
use saga_model::model::{Descriptor, ModelError, ModelSpec};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Instrument};

fn counter() -> Result<Descriptor, ModelError> {
    ModelSpec::new()
        .default_state(json!({"count": 0}))
        .reducer("increment", |mut state: Value, action: &Action| {
            let count = state["count"].as_i64().unwrap_or(0) + action.payload.as_i64().unwrap_or(1);
            state["count"] = json!(count);
            state
        })
        .effect("incrementAsync", |action: Action, ctx: EffectContext| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ctx.put(Action::new("counter/increment", action.payload)).await
        })
        .build("counter")
}

fn todo() -> Result<Descriptor, ModelError> {
    ModelSpec::new()
        .default_state(json!({"items": []}))
        .reducer("add", |mut state: Value, action: &Action| {
            if let Some(items) = state["items"].as_array_mut() {
                items.push(action.payload.clone());
            }
            state
        })
        // React to the counter: every increment leaves a note.
        .effect("counter/increment", |action: Action, ctx: EffectContext| async move {
            ctx.put(Action::new("todo/add", format!("counted {}", action.payload))).await
        })
        .build("todo")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    info!("Starting demo store");

    let counter = counter()?;
    let store = init(
        StoreConfig::new()
            .with_model(counter.clone())
            .with_middleware(Arc::new(LoggingMiddleware))
            .with_effect(Arc::new(|_ctx: &EffectContext| -> Result<(), EffectError> {
                info!("Root effect started");
                Ok(())
            })),
    )?;

    let span = tracing::info_span!("counter");
    async {
        let increment = counter.action("increment").ok_or("missing increment")?;
        store.dispatch(increment.create(5)).await?;
        store.dispatch(increment.create(5)).await?;
        info!(state = %store.get_state().await?, "Counter incremented");
        Ok::<_, Box<dyn std::error::Error>>(())
    }
    .instrument(span)
    .await?;

    // Inject a second model into the live store.
    store.model(todo()?).await?;

    let increment_async = counter.action("incrementAsync").ok_or("missing incrementAsync")?;
    store.dispatch(increment_async.create(2)).await?;

    let mut changes = store.subscribe();
    tokio::time::timeout(Duration::from_secs(1), async {
        while changes.changed().await.is_ok() {
            let state = changes.borrow_and_update().clone();
            if counter.get_state(&state) == Some(&json!({"count": 12})) && state["todo"]["items"].as_array().map_or(0, Vec::len) == 1 {
                break;
            }
        }
    })
    .await?;

    info!(state = %store.get_state().await?, stats = ?store.effect_stats(), "Demo finished");

    store.shutdown().await?;
    info!("Application completed successfully");
    Ok(())
}
