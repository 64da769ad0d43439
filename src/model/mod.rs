//! Declarative models and the descriptors derived from them.
//!
//! Write a [`ModelSpec`] once; [`ModelSpec::build`] derives the namespaced
//! types, action creators, reducer and effect process as a [`Descriptor`].

pub mod descriptor;
pub mod error;
pub mod merge;
pub mod spec;

pub use descriptor::{make_type, ActionCreator, Descriptor, ModelEffect, Selectors};
pub use error::ModelError;
pub use spec::{Handler, ModelLayer, ModelSpec, TransitionFn};
