//! Declarative model specifications.
//!
//! A [`ModelSpec`] is an ordered list of [`ModelLayer`]s, nearest first. Each
//! layer may contribute a default-state fragment and any number of handlers,
//! each tagged [`Handler::Sync`] (a transition handler) or [`Handler::Effect`]
//! (a long-running effect handler). Deriving a model from another is a matter
//! of putting new layers in front: see [`ModelSpec::extend`].

use crate::effects::{EffectContext, EffectError, EffectHandler};
use crate::framework::{Action, ReduceError};
use crate::model::descriptor::Descriptor;
use crate::model::error::ModelError;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A pure transition: next state from the current state and an action.
pub type TransitionFn = Arc<dyn Fn(Value, &Action) -> Result<Value, ReduceError> + Send + Sync>;

/// A handler declaration, tagged with its kind.
#[derive(Clone)]
pub enum Handler {
    Sync(TransitionFn),
    Effect(Arc<dyn EffectHandler>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Effect(_) => f.write_str("Handler::Effect"),
        }
    }
}

/// What one level of a model hierarchy contributes.
#[derive(Clone, Debug, Default)]
pub struct ModelLayer {
    pub(crate) default_state: Option<Value>,
    pub(crate) handlers: Vec<(String, Handler)>,
}

impl ModelLayer {
    pub fn default_state(&self) -> Option<&Value> {
        self.default_state.as_ref()
    }

    pub fn handlers(&self) -> impl Iterator<Item = (&str, &Handler)> {
        self.handlers.iter().map(|(key, handler)| (key.as_str(), handler))
    }
}

/// An immutable model declaration.
///
/// # Example
///
/// ```ignore
/// let counter = ModelSpec::new()
///     .default_state(json!({"count": 0}))
///     .reducer("increment", |state, action| {
///         let count = state["count"].as_i64().unwrap_or(0) + action.payload.as_i64().unwrap_or(0);
///         json!({"count": count})
///     });
/// let descriptor = counter.build("counter")?;
/// ```
#[derive(Clone, Debug)]
pub struct ModelSpec {
    layers: Vec<ModelLayer>,
}

impl ModelSpec {
    /// A spec with a single, empty layer.
    pub fn new() -> Self {
        Self {
            layers: vec![ModelLayer::default()],
        }
    }

    /// Layers `overrides` on top of `base`.
    ///
    /// Default state and transition handlers of `base` remain visible unless
    /// `overrides` redeclares them. Effect handlers are only ever taken from
    /// the nearest layer, so those of `base` are not inherited.
    pub fn extend(base: &ModelSpec, overrides: ModelSpec) -> ModelSpec {
        let mut layers = overrides.layers;
        layers.extend(base.layers.iter().cloned());
        ModelSpec { layers }
    }

    /// Layers, nearest first.
    pub fn layers(&self) -> &[ModelLayer] {
        &self.layers
    }

    fn nearest(&mut self) -> &mut ModelLayer {
        if self.layers.is_empty() {
            self.layers.push(ModelLayer::default());
        }
        &mut self.layers[0]
    }

    /// Sets the nearest layer's default-state fragment.
    pub fn default_state(mut self, fragment: impl Into<Value>) -> Self {
        self.nearest().default_state = Some(fragment.into());
        self
    }

    /// Declares a tagged handler on the nearest layer.
    pub fn handler(mut self, key: impl Into<String>, handler: Handler) -> Self {
        self.nearest().handlers.push((key.into(), handler));
        self
    }

    /// Declares an infallible transition handler.
    pub fn reducer<F>(self, key: impl Into<String>, transition: F) -> Self
    where
        F: Fn(Value, &Action) -> Value + Send + Sync + 'static,
    {
        self.handler(
            key,
            Handler::Sync(Arc::new(move |state: Value, action: &Action| Ok(transition(state, action)))),
        )
    }

    /// Declares a transition handler that may reject the action.
    pub fn try_reducer<F>(self, key: impl Into<String>, transition: F) -> Self
    where
        F: Fn(Value, &Action) -> Result<Value, ReduceError> + Send + Sync + 'static,
    {
        self.handler(key, Handler::Sync(Arc::new(transition)))
    }

    /// Declares an effect handler, run once per matching dispatch.
    pub fn effect<F, Fut>(self, key: impl Into<String>, effect: F) -> Self
    where
        F: Fn(Action, EffectContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        self.handler(key, Handler::Effect(Arc::new(effect)))
    }

    /// Derives the descriptor for this spec under `namespace`.
    pub fn build(&self, namespace: impl Into<String>) -> Result<Descriptor, ModelError> {
        Descriptor::build(namespace.into(), self)
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extend_puts_overrides_first() {
        let base = ModelSpec::new()
            .default_state(json!({"count": 0}))
            .reducer("reset", |_, _| json!({"count": 0}));
        let child = ModelSpec::extend(&base, ModelSpec::new().default_state(json!({"step": 2})));

        assert_eq!(child.layers().len(), 2);
        assert_eq!(child.layers()[0].default_state(), Some(&json!({"step": 2})));
        assert_eq!(child.layers()[1].handlers().count(), 1);
        // `base` itself is untouched.
        assert_eq!(base.layers().len(), 1);
    }
}
