//! Effect processes: long-running handlers that react to dispatched actions.
//!
//! # Main Components
//!
//! - [`EffectScheduler`] - The store middleware that runs effect processes
//! - [`EffectContext`] - What a handler can do: put, select, take, fork
//! - [`EffectHandler`] / [`Saga`] - Per-action handlers and root routines
//! - [`EffectStats`] - Counters for started processes and spawned tasks

mod bus;
pub mod context;
pub mod scheduler;
pub mod tasks;

pub use context::{EffectContext, EffectError, EffectHandler, Saga};
pub use scheduler::EffectScheduler;
pub use tasks::{EffectStats, TaskGroup};
