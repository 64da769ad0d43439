#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Saga Model
//!
//! > **Declare a model once; get its types, actions, reducer and effects for free.**
//!
//! This crate is a convenience layer over a unidirectional-data-flow store. A model
//! is declared as a [`ModelSpec`](model::ModelSpec): default state, pure transition
//! handlers and long-running effect handlers. From that single declaration the crate
//! derives namespaced action types, action creators, a slice reducer and an effect
//! process, and wires any number of models into one running store, including models
//! added after the store is live.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Explicit layers instead of class hierarchies
//! A derived model is its base's layers with new layers in front
//! ([`ModelSpec::extend`](model::ModelSpec::extend)). Default state deep-merges and
//! transition handlers are looked up nearest layer first, so overriding one key never
//! means redeclaring its siblings.
//!
//! ### Tagged handlers
//! Every handler is declared as either [`Handler::Sync`](model::Handler::Sync)
//! (a transition) or [`Handler::Effect`](model::Handler::Effect). Nothing is
//! discovered by probing at runtime.
//!
//! ### One owner for state
//! The whole-state tree lives inside a single [`StoreActor`](framework::StoreActor)
//! task. Dispatches are processed one at a time and each runs the root reducer to
//! completion, so reducers need no locks.
//!
//! ### Effects as structured tasks
//! Each `take_every` rule spawns an independent task per matching action. All tasks
//! belong to one task group scoped to the store, and the reserved halt action cancels
//! them cooperatively.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Engine ([`framework`])
//! The store itself: actions, reducers, middleware, the store actor and its client.
//! - **Key items**: [`Action`](framework::Action), [`StoreActor`](framework::StoreActor),
//!   [`combine_reducers`](framework::combine_reducers).
//!
//! ### 2. The Declarations ([`model`])
//! Model specs and the descriptor builder.
//! - **Key items**: [`ModelSpec`](model::ModelSpec), [`Descriptor`](model::Descriptor),
//!   [`ActionCreator`](model::ActionCreator).
//!
//! ### 3. The Effect Runtime ([`effects`])
//! The scheduler middleware and what effect handlers can do.
//! - **Key items**: [`EffectScheduler`](effects::EffectScheduler),
//!   [`EffectContext`](effects::EffectContext).
//!
//! ### 4. The Orchestrator ([`lifecycle`])
//! Store composition, runtime model registration and shutdown.
//! - **Key items**: [`init`](lifecycle::init), [`StoreHandle`](lifecycle::StoreHandle).
//!
//! ## 🚀 Quick Start
//!
//! ```rust,ignore
//! let counter = ModelSpec::new()
//!     .default_state(json!({"count": 0}))
//!     .reducer("increment", |mut state, action| {
//!         state["count"] = json!(state["count"].as_i64().unwrap_or(0) + action.payload.as_i64().unwrap_or(0));
//!         state
//!     })
//!     .build("counter")?;
//!
//! let store = init(StoreConfig::new().with_model(counter.clone()))?;
//! store.dispatch(counter.action("increment").unwrap().create(5)).await?;
//! assert_eq!(store.get_state().await?["counter"]["count"], 5);
//! ```
//!
//! ### Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

pub mod effects;
pub mod framework;
pub mod lifecycle;
pub mod model;
