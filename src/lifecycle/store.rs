use crate::effects::{EffectError, EffectScheduler, EffectStats, Saga};
use crate::framework::{combine_reducers, Action, Middleware, Reducer, StoreActor, StoreClient, StoreError};
use crate::model::Descriptor;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Wraps every root reducer the composer builds.
pub type Enhancer = Arc<dyn Fn(Reducer) -> Reducer + Send + Sync>;

/// Errors raised while composing or reconfiguring a store.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Namespace registered twice: {0}")]
    DuplicateNamespace(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),
}

/// Tunables for the store's channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Capacity of the request channel into the store actor.
    pub request_buffer: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { request_buffer: 32 }
    }
}

/// Everything [`init`] needs to assemble a store.
#[derive(Default)]
pub struct StoreConfig {
    /// Hand-written slices, keyed by namespace.
    pub reducers: BTreeMap<String, Reducer>,
    pub preloaded_state: Option<Value>,
    /// Run after the effect scheduler, in order.
    pub middlewares: Vec<Arc<dyn Middleware>>,
    pub enhancers: Vec<Enhancer>,
    /// A root effect process not tied to any model.
    pub effect: Option<Arc<dyn Saga>>,
    pub models: Vec<Descriptor>,
    pub options: StoreOptions,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reducer(mut self, namespace: impl Into<String>, reducer: Reducer) -> Self {
        self.reducers.insert(namespace.into(), reducer);
        self
    }

    pub fn with_preloaded_state(mut self, state: Value) -> Self {
        self.preloaded_state = Some(state);
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_enhancer(mut self, enhancer: Enhancer) -> Self {
        self.enhancers.push(enhancer);
        self
    }

    pub fn with_effect(mut self, effect: Arc<dyn Saga>) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn with_model(mut self, model: Descriptor) -> Self {
        self.models.push(model);
        self
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }
}

/// Anything [`StoreHandle::model`] accepts: one descriptor or many.
pub trait IntoModels {
    fn into_models(self) -> Vec<Descriptor>;
}

impl IntoModels for Descriptor {
    fn into_models(self) -> Vec<Descriptor> {
        vec![self]
    }
}

impl IntoModels for Vec<Descriptor> {
    fn into_models(self) -> Vec<Descriptor> {
        self
    }
}

impl<const N: usize> IntoModels for [Descriptor; N] {
    fn into_models(self) -> Vec<Descriptor> {
        self.into()
    }
}

/// The namespace → reducer map a store currently routes through.
struct RoutingTable {
    version: u64,
    slices: BTreeMap<String, Reducer>,
}

/// Builds the root reducer for `slices`, wrapped by every enhancer (first outermost).
fn root_reducer(slices: &BTreeMap<String, Reducer>, enhancers: &[Enhancer]) -> Reducer {
    enhancers
        .iter()
        .rev()
        .fold(combine_reducers(slices), |reducer, enhance| enhance(reducer))
}

fn start_effects(
    scheduler: &EffectScheduler,
    root: Option<&dyn Saga>,
    models: &[Descriptor],
) -> Result<(), EffectError> {
    if let Some(root) = root {
        scheduler.run(root)?;
    }
    for model in models {
        scheduler.run(&model.effect())?;
    }
    Ok(())
}

/// A running store built from models.
///
/// Owns the routing table: reducer slices are only ever added through
/// [`StoreHandle::model`], one batch at a time.
pub struct StoreHandle {
    client: StoreClient,
    scheduler: Arc<EffectScheduler>,
    routing: Mutex<RoutingTable>,
    enhancers: Vec<Enhancer>,
    actor: tokio::task::JoinHandle<()>,
}

/// Assembles and starts a store.
///
/// 1. Hand-written reducers are merged with one slice per model (models win).
/// 2. The slices are combined into the root reducer.
/// 3. The store starts with the effect scheduler ahead of the user middlewares.
/// 4. The root effect, then each model's effect process, is started.
///
/// Must be called from within a Tokio runtime.
pub fn init(config: StoreConfig) -> Result<StoreHandle, ComposeError> {
    let StoreConfig {
        mut reducers,
        preloaded_state,
        middlewares,
        enhancers,
        effect,
        models,
        options,
    } = config;

    let mut seen = HashSet::new();
    for model in &models {
        if !seen.insert(model.namespace()) {
            return Err(ComposeError::DuplicateNamespace(model.namespace().to_string()));
        }
        if reducers.insert(model.namespace().to_string(), model.reducer()).is_some() {
            warn!(namespace = model.namespace(), "Model replaces hand-written reducer");
        }
    }

    let scheduler = Arc::new(EffectScheduler::new());
    let mut chain: Vec<Arc<dyn Middleware>> = Vec::with_capacity(middlewares.len() + 1);
    chain.push(scheduler.clone());
    chain.extend(middlewares);

    let (actor, client) = StoreActor::new(
        root_reducer(&reducers, &enhancers),
        preloaded_state,
        chain,
        options.request_buffer,
    )?;
    let actor = tokio::spawn(actor.run());
    scheduler.attach(client.clone());

    if let Err(e) = start_effects(&scheduler, effect.as_deref(), &models) {
        scheduler.halt();
        return Err(e.into());
    }

    info!(slices = reducers.len(), models = models.len(), "Store initialized");

    Ok(StoreHandle {
        client,
        scheduler,
        routing: Mutex::new(RoutingTable {
            version: 0,
            slices: reducers,
        }),
        enhancers,
        actor,
    })
}

impl StoreHandle {
    /// Registers models on the running store.
    ///
    /// A descriptor whose namespace is already routed is skipped entirely: its
    /// slice is not replaced and its effect process is not started again. New
    /// effect processes start before the reducer is swapped, and the swap
    /// happens once per call.
    ///
    /// Slices are always installed. After [`StoreHandle::destroy`] effect
    /// processes are no longer started; if one fails to start otherwise, the
    /// whole batch is still swapped in and the first failure is returned.
    pub async fn model(&self, models: impl IntoModels) -> Result<(), ComposeError> {
        let mut routing = self.routing.lock().await;
        let mut added = Vec::new();
        let mut failure = None;

        for model in models.into_models() {
            if routing.slices.contains_key(model.namespace()) {
                debug!(namespace = model.namespace(), "Namespace already registered, skipping");
                continue;
            }
            match self.scheduler.run(&model.effect()) {
                Ok(()) => {}
                Err(EffectError::Halted) => {
                    debug!(namespace = model.namespace(), "Effects halted, installing reducer only");
                }
                Err(e) => {
                    warn!(namespace = model.namespace(), error = %e, "Effect process failed to start");
                    failure.get_or_insert(e);
                }
            }
            routing.slices.insert(model.namespace().to_string(), model.reducer());
            added.push(model.namespace().to_string());
        }

        self.client
            .replace_reducer(root_reducer(&routing.slices, &self.enhancers))
            .await?;
        routing.version += 1;
        info!(version = routing.version, ?added, "Models registered");

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Stops every effect process by dispatching the halt action. State is kept.
    pub async fn destroy(&self) -> Result<(), ComposeError> {
        self.client.dispatch(Action::halt()).await?;
        Ok(())
    }

    /// Halts effects, waits for their tasks, then stops the store actor.
    pub async fn shutdown(self) -> Result<(), ComposeError> {
        info!("Shutting down store...");
        self.destroy().await?;
        self.scheduler.join().await;

        // The actor exits once its last client is gone.
        drop(self.client);
        if let Err(e) = self.actor.await {
            error!("Store task failed: {:?}", e);
        }
        info!("Store shutdown complete.");
        Ok(())
    }

    pub async fn dispatch(&self, action: Action) -> Result<(), StoreError> {
        self.client.dispatch(action).await
    }

    pub async fn get_state(&self) -> Result<Value, StoreError> {
        self.client.get_state().await
    }

    pub fn subscribe(&self) -> watch::Receiver<Value> {
        self.client.subscribe()
    }

    pub fn effect_stats(&self) -> EffectStats {
        self.scheduler.stats()
    }

    /// Number of reducer swaps performed through [`StoreHandle::model`].
    pub async fn routing_version(&self) -> u64 {
        self.routing.lock().await.version
    }

    /// Namespaces currently routed, hand-written slices included.
    pub async fn namespaces(&self) -> Vec<String> {
        self.routing.lock().await.slices.keys().cloned().collect()
    }
}
