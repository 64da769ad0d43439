//! # Model Descriptor Builder
//!
//! Turns a [`ModelSpec`] into the runtime artifacts a store needs:
//! qualified action types, action creators, a slice reducer and an effect process.
//!
//! ## Derivation
//!
//! 1. **Layer walk**: default-state fragments and transition handlers are
//!    folded over every layer, nearest first. Fragments deep-merge (a value
//!    already seen wins a leaf conflict) and a handler key keeps the nearest
//!    layer's entry.
//! 2. **Effect discovery**: effect handlers come from the nearest layer only.
//! 3. **Type synthesis**: for every effect key, then every transition key:
//!    - a key containing [`DIVIDER`] is a foreign type. Its transition handler
//!      stays keyed by the literal string and no type or creator is made.
//!    - any other key becomes `namespace/key`, gets an [`ActionCreator`], and
//!      its transition handler is re-keyed under the qualified type.

use crate::effects::{EffectContext, EffectError, EffectHandler, Saga};
use crate::framework::{Action, ReduceError, Reducer, DIVIDER};
use crate::model::error::ModelError;
use crate::model::merge::merge_keep_first;
use crate::model::spec::{Handler, ModelSpec, TransitionFn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Builds `namespace/key`.
pub fn make_type(namespace: &str, key: &str) -> String {
    format!("{namespace}{DIVIDER}{key}")
}

/// The type an effect key listens on: foreign keys are used verbatim.
fn listen_type(namespace: &str, key: &str) -> String {
    if key.contains(DIVIDER) {
        key.to_string()
    } else {
        make_type(namespace, key)
    }
}

/// Creates actions of one fixed type. Cheap to clone and usable on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionCreator {
    action_type: Arc<str>,
}

impl ActionCreator {
    pub fn new(action_type: impl Into<Arc<str>>) -> Self {
        Self {
            action_type: action_type.into(),
        }
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    pub fn create(&self, payload: impl Into<Value>) -> Action {
        Action::new(self.action_type.as_ref(), payload)
    }
}

/// Reads one model's slice out of the whole state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selectors {
    namespace: Arc<str>,
}

impl Selectors {
    pub fn get_state<'a>(&self, whole: &'a Value) -> Option<&'a Value> {
        whole.get(self.namespace.as_ref())
    }
}

/// The effect process of one model: one `take_every` rule per effect key.
#[derive(Clone)]
pub struct ModelEffect {
    namespace: Arc<str>,
    rules: Vec<(String, Arc<dyn EffectHandler>)>,
}

impl ModelEffect {
    /// Action types this process listens on.
    pub fn action_types(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(action_type, _)| action_type.as_str())
    }
}

impl Saga for ModelEffect {
    fn start(&self, ctx: &EffectContext) -> Result<(), EffectError> {
        for (action_type, handler) in &self.rules {
            ctx.take_every(action_type.clone(), handler.clone());
        }
        debug!(namespace = %self.namespace, rules = self.rules.len(), "Model effect started");
        Ok(())
    }
}

/// Everything derived from one model. Immutable once built.
#[derive(Clone)]
pub struct Descriptor {
    namespace: Arc<str>,
    types: BTreeMap<String, String>,
    actions: BTreeMap<String, ActionCreator>,
    default_state: Arc<Value>,
    reducers: Arc<BTreeMap<String, TransitionFn>>,
    effects: BTreeMap<String, Arc<dyn EffectHandler>>,
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("namespace", &self.namespace)
            .field("types", &self.types)
            .field("default_state", &self.default_state)
            .field("reducers", &self.reducers.keys().collect::<Vec<_>>())
            .field("effects", &self.effects.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Descriptor {
    pub(crate) fn build(namespace: String, spec: &ModelSpec) -> Result<Self, ModelError> {
        if namespace.is_empty() {
            return Err(ModelError::EmptyNamespace);
        }
        if namespace.contains(DIVIDER) {
            return Err(ModelError::InvalidNamespace(namespace));
        }

        // 1. Layer walk.
        let mut default_state = Value::Null;
        let mut reducers: BTreeMap<String, TransitionFn> = BTreeMap::new();
        for layer in spec.layers() {
            if let Some(fragment) = &layer.default_state {
                merge_keep_first(&mut default_state, fragment);
            }
            let mut own = BTreeMap::new();
            for (key, handler) in &layer.handlers {
                if let Handler::Sync(transition) = handler {
                    own.insert(key.clone(), transition.clone());
                }
            }
            for (key, transition) in own {
                reducers.entry(key).or_insert(transition);
            }
        }
        if default_state.is_null() {
            default_state = Value::Object(Map::new());
        }

        // 2. Effect discovery.
        let mut effects = BTreeMap::new();
        if let Some(nearest) = spec.layers().first() {
            for (key, handler) in &nearest.handlers {
                if let Handler::Effect(effect) = handler {
                    effects.insert(key.clone(), effect.clone());
                }
            }
        }

        // 3. Type synthesis.
        let mut types = BTreeMap::new();
        let mut actions = BTreeMap::new();
        let keys: Vec<String> = effects.keys().chain(reducers.keys()).cloned().collect();
        for key in keys {
            if key.contains(DIVIDER) {
                // Foreign type: the transition handler already sits under the literal key.
                continue;
            }
            let action_type = make_type(&namespace, &key);
            actions
                .entry(key.clone())
                .or_insert_with(|| ActionCreator::new(action_type.as_str()));
            if let Some(transition) = reducers.remove(&key) {
                reducers.insert(action_type.clone(), transition);
            }
            types.insert(key, action_type);
        }

        debug!(
            namespace = %namespace,
            types = types.len(),
            reducers = reducers.len(),
            effects = effects.len(),
            "Model descriptor built"
        );

        Ok(Self {
            namespace: namespace.into(),
            types,
            actions,
            default_state: Arc::new(default_state),
            reducers: Arc::new(reducers),
            effects,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Bare key → qualified action type.
    pub fn types(&self) -> &BTreeMap<String, String> {
        &self.types
    }

    /// Bare key → action creator.
    pub fn actions(&self) -> &BTreeMap<String, ActionCreator> {
        &self.actions
    }

    pub fn action(&self, key: &str) -> Option<&ActionCreator> {
        self.actions.get(key)
    }

    pub fn default_state(&self) -> &Value {
        &self.default_state
    }

    pub fn selectors(&self) -> Selectors {
        Selectors {
            namespace: self.namespace.clone(),
        }
    }

    /// This model's slice of the whole state.
    pub fn get_state<'a>(&self, whole: &'a Value) -> Option<&'a Value> {
        whole.get(self.namespace())
    }

    /// Action types with a transition handler, qualified or foreign.
    pub fn handled_types(&self) -> impl Iterator<Item = &str> {
        self.reducers.keys().map(String::as_str)
    }

    /// Applies this model's transition for `action`, or returns `state` untouched.
    ///
    /// A missing state is replaced by the merged default state.
    pub fn reduce(&self, state: Option<Value>, action: &Action) -> Result<Value, ReduceError> {
        reduce_with(&self.reducers, &self.default_state, state, action)
    }

    /// The slice reducer to install under [`Descriptor::namespace`].
    pub fn reducer(&self) -> Reducer {
        let reducers = self.reducers.clone();
        let default_state = self.default_state.clone();
        Arc::new(move |state, action| reduce_with(&reducers, &default_state, state, action))
    }

    /// The effect process: a standing rule for every effect key.
    pub fn effect(&self) -> ModelEffect {
        ModelEffect {
            namespace: self.namespace.clone(),
            rules: self
                .effects
                .iter()
                .map(|(key, handler)| (listen_type(&self.namespace, key), handler.clone()))
                .collect(),
        }
    }
}

fn reduce_with(
    reducers: &BTreeMap<String, TransitionFn>,
    default_state: &Value,
    state: Option<Value>,
    action: &Action,
) -> Result<Value, ReduceError> {
    let state = state.unwrap_or_else(|| default_state.clone());
    match reducers.get(&action.action_type) {
        Some(transition) => transition(state, action),
        None => Ok(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add(state: Value, action: &Action) -> Value {
        let count = state["count"].as_i64().unwrap_or(0) + action.payload.as_i64().unwrap_or(0);
        let mut next = state;
        next["count"] = json!(count);
        next
    }

    fn base() -> ModelSpec {
        ModelSpec::new()
            .default_state(json!({"count": 0, "meta": {"label": "base", "step": 1}}))
            .reducer("increment", add)
            .reducer("reset", |mut state, _| {
                state["count"] = json!(0);
                state
            })
    }

    #[test]
    fn test_types_and_creators_are_namespaced() {
        let model = base().build("counter").unwrap();
        assert_eq!(model.types()["increment"], "counter/increment");
        assert_eq!(model.types()["reset"], "counter/reset");

        let creator = model.action("increment").unwrap().clone();
        drop(model);
        assert_eq!(creator.create(5), Action::new("counter/increment", 5));
    }

    #[test]
    fn test_default_state_merges_nearest_first() {
        let child = ModelSpec::extend(
            &base(),
            ModelSpec::new().default_state(json!({"count": 10, "meta": {"label": "child"}, "extra": true})),
        );
        let model = child.build("counter").unwrap();
        assert_eq!(
            model.default_state(),
            &json!({"count": 10, "meta": {"label": "child", "step": 1}, "extra": true})
        );
    }

    #[test]
    fn test_nearest_transition_wins() {
        let child = ModelSpec::extend(
            &base(),
            ModelSpec::new().reducer("increment", |mut state, action| {
                let doubled = state["count"].as_i64().unwrap_or(0) + 2 * action.payload.as_i64().unwrap_or(0);
                state["count"] = json!(doubled);
                state
            }),
        );
        let model = child.build("counter").unwrap();

        let state = model.reduce(None, &model.action("increment").unwrap().create(3)).unwrap();
        assert_eq!(state["count"], json!(6));
        // Inherited sibling still present.
        let state = model.reduce(Some(state), &Action::bare("counter/reset")).unwrap();
        assert_eq!(state["count"], json!(0));
    }

    #[test]
    fn test_non_object_default_state_is_kept() {
        let list = ModelSpec::new().default_state(json!([])).build("todos").unwrap();
        assert_eq!(list.default_state(), &json!([]));

        let derived = ModelSpec::extend(
            &ModelSpec::new().default_state(json!(["base"])),
            ModelSpec::new().default_state(json!(["child"])),
        )
        .build("todos")
        .unwrap();
        assert_eq!(derived.default_state(), &json!(["child"]));

        let empty = ModelSpec::new().build("empty").unwrap();
        assert_eq!(empty.default_state(), &json!({}));
    }

    #[test]
    fn test_foreign_keys_stay_literal() {
        let model = base()
            .reducer("session/logout", |mut state, _| {
                state["count"] = json!(-1);
                state
            })
            .build("counter")
            .unwrap();

        assert!(!model.types().contains_key("session/logout"));
        assert!(model.action("session/logout").is_none());
        assert!(model.handled_types().any(|t| t == "session/logout"));
        assert!(!model.handled_types().any(|t| t == "increment"));

        let state = model.reduce(None, &Action::bare("session/logout")).unwrap();
        assert_eq!(state["count"], json!(-1));
    }

    #[test]
    fn test_unknown_action_returns_state_unchanged() {
        let model = base().build("counter").unwrap();
        let state = json!({"count": 42, "anything": [1, 2, 3]});
        assert_eq!(model.reduce(Some(state.clone()), &Action::bare("unknown")).unwrap(), state);
        assert_eq!(model.reduce(None, &Action::bare("unknown")).unwrap(), *model.default_state());
    }

    #[test]
    fn test_effects_only_from_nearest_layer() {
        let with_effect = base().effect("load", |_action, _ctx| async { Ok::<_, EffectError>(()) });
        let child = ModelSpec::extend(
            &with_effect,
            ModelSpec::new().effect("save", |_action, _ctx| async { Ok::<_, EffectError>(()) }),
        );
        let model = child.build("counter").unwrap();

        let listening: Vec<_> = model.effect().action_types().map(str::to_string).collect();
        assert_eq!(listening, vec!["counter/save".to_string()]);
        assert_eq!(model.types()["save"], "counter/save");
        assert!(!model.types().contains_key("load"));
    }

    #[test]
    fn test_effect_and_transition_share_a_key() {
        let model = base()
            .effect("increment", |_action, _ctx| async { Ok::<_, EffectError>(()) })
            .effect("auth/login", |_action, _ctx| async { Ok::<_, EffectError>(()) })
            .build("counter")
            .unwrap();

        let mut listening: Vec<_> = model.effect().action_types().map(str::to_string).collect();
        listening.sort();
        assert_eq!(listening, vec!["auth/login".to_string(), "counter/increment".to_string()]);
        assert_eq!(model.actions().len(), 2);
        let state = model.reduce(None, &Action::new("counter/increment", 1)).unwrap();
        assert_eq!(state["count"], json!(1));
    }

    #[test]
    fn test_invalid_namespaces_fail_fast() {
        assert_eq!(base().build("").unwrap_err(), ModelError::EmptyNamespace);
        assert_eq!(
            base().build("a/b").unwrap_err(),
            ModelError::InvalidNamespace("a/b".into())
        );
    }

    #[test]
    fn test_selectors_read_own_slice() {
        let model = base().build("counter").unwrap();
        let whole = json!({"counter": {"count": 3}, "todo": []});
        assert_eq!(model.get_state(&whole), Some(&json!({"count": 3})));
        assert_eq!(model.selectors().get_state(&whole), model.get_state(&whole));
    }

    #[test]
    fn test_try_reducer_errors_propagate() {
        let model = ModelSpec::new()
            .try_reducer("set", |_, action| {
                let count: i64 = serde_json::from_value(action.payload.clone())?;
                Ok(json!({ "count": count }))
            })
            .build("counter")
            .unwrap();

        assert!(matches!(
            model.reduce(None, &Action::new("counter/set", "nope")),
            Err(ReduceError::Payload(_))
        ));
        assert_eq!(model.reduce(None, &Action::new("counter/set", 7)).unwrap(), json!({"count": 7}));
    }
}
