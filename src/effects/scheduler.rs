//! # Effect Scheduler
//!
//! The middleware that lets effect processes observe dispatches.
//!
//! The scheduler is installed as the first store middleware. Its `after` hook
//! runs on the store task once the reducer has produced the new state: it
//! resolves pending takes and spawns one handler run per matching rule before
//! the next dispatch is looked at. Processes are started with
//! [`EffectScheduler::run`] once the store is live; the reserved halt action
//! stops all of them.

use crate::effects::bus::ActionBus;
use crate::effects::context::{EffectContext, EffectError, Saga};
use crate::effects::tasks::{Counters, EffectStats, TaskGroup};
use crate::framework::{Action, Middleware, StoreClient};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub struct EffectScheduler {
    bus: Arc<ActionBus>,
    tasks: Arc<TaskGroup>,
    store: Mutex<Option<StoreClient>>,
}

impl EffectScheduler {
    /// Creates a detached scheduler.
    pub fn new() -> Self {
        Self {
            bus: Arc::new(ActionBus::default()),
            tasks: Arc::new(TaskGroup::new()),
            store: Mutex::new(None),
        }
    }

    /// Mounts the scheduler on a running store. Processes can only be started afterwards.
    pub fn attach(&self, store: StoreClient) {
        *self.store.lock().unwrap_or_else(|e| e.into_inner()) = Some(store);
    }

    /// Builds a context bound to the attached store.
    pub fn context(&self) -> Result<EffectContext, EffectError> {
        if self.tasks.is_halted() {
            return Err(EffectError::Halted);
        }
        let store = self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(EffectError::NotAttached)?;
        Ok(EffectContext::new(store, self.bus.clone(), self.tasks.clone()))
    }

    /// Starts an effect process against the live store.
    pub fn run(&self, saga: &dyn Saga) -> Result<(), EffectError> {
        let ctx = self.context()?;
        saga.start(&ctx)?;
        Counters::bump(&self.tasks.counters.processes);
        Ok(())
    }

    /// Stops every effect process and detaches from the store.
    pub fn halt(&self) {
        info!(stats = ?self.tasks.stats(), "Halting effect processes");
        self.tasks.halt();
        self.bus.close();
        // Detach so the store can shut down once its last client goes away.
        self.store.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn stats(&self) -> EffectStats {
        self.tasks.stats()
    }

    pub fn is_halted(&self) -> bool {
        self.tasks.is_halted()
    }

    /// Waits for every effect task spawned so far.
    pub async fn join(&self) {
        self.tasks.join().await;
    }
}

impl Default for EffectScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for EffectScheduler {
    fn after(&self, action: &Action, _state: &Value) {
        let handlers = self.bus.publish(action);
        let runs = handlers.len();
        if runs > 0 {
            match self.context() {
                Ok(ctx) => {
                    for handler in handlers {
                        ctx.spawn_run(action.clone(), handler);
                    }
                }
                Err(e) => warn!(action_type = %action.action_type, error = %e, "Matching rules skipped"),
            }
        }
        debug!(action_type = %action.action_type, runs, "Action observed");

        if action.is_halt() {
            self.halt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::MockStore;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_requires_attached_store() {
        let scheduler = EffectScheduler::new();
        let saga = |_ctx: &EffectContext| -> Result<(), EffectError> { Ok(()) };
        assert!(matches!(scheduler.run(&saga), Err(EffectError::NotAttached)));
    }

    #[tokio::test]
    async fn test_take_every_dispatches_through_store() {
        let mut mock = MockStore::new();
        mock.expect_dispatch("todo/added").return_ok();

        let scheduler = EffectScheduler::new();
        scheduler.attach(mock.client());

        let saga = |ctx: &EffectContext| -> Result<(), EffectError> {
            ctx.take_every(
                "todo/add",
                Arc::new(|action: Action, ctx: EffectContext| async move {
                    ctx.put(Action::new("todo/added", action.payload)).await
                }),
            );
            Ok(())
        };
        scheduler.run(&saga).unwrap();

        scheduler.after(&Action::new("todo/add", "milk"), &Value::Null);
        scheduler.after(&Action::new("todo/other", "ignored"), &Value::Null);

        tokio::time::timeout(Duration::from_secs(1), async {
            while scheduler.stats().completed < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("handler should complete");

        assert_eq!(mock.dispatched(), vec![Action::new("todo/added", json!("milk"))]);
        mock.verify();

        let stats = scheduler.stats();
        assert_eq!((stats.processes, stats.watchers, stats.spawned), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_every_match_spawns_a_run() {
        let mock = MockStore::new();
        let scheduler = EffectScheduler::new();
        scheduler.attach(mock.client());

        let saga = |ctx: &EffectContext| -> Result<(), EffectError> {
            ctx.take_every(
                "todo/add",
                Arc::new(|_action: Action, _ctx: EffectContext| async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<(), EffectError>(())
                }),
            );
            Ok(())
        };
        scheduler.run(&saga).unwrap();

        for _ in 0..1000 {
            scheduler.after(&Action::bare("todo/add"), &Value::Null);
        }
        assert_eq!(scheduler.stats().spawned, 1000);

        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.stats().completed < 1000 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("every run should complete");

        scheduler.after(&Action::halt(), &Value::Null);
        scheduler.after(&Action::bare("todo/add"), &Value::Null);
        assert_eq!(scheduler.stats().spawned, 1000);
    }

    #[tokio::test]
    async fn test_halt_action_stops_processes() {
        let mock = MockStore::new();
        let scheduler = EffectScheduler::new();
        scheduler.attach(mock.client());

        let saga = |ctx: &EffectContext| -> Result<(), EffectError> {
            ctx.take_every(
                "todo/add",
                Arc::new(|_action: Action, _ctx: EffectContext| async move { Ok::<(), EffectError>(()) }),
            );
            Ok(())
        };
        scheduler.run(&saga).unwrap();

        scheduler.after(&Action::halt(), &Value::Null);
        assert!(scheduler.is_halted());
        tokio::time::timeout(Duration::from_secs(1), scheduler.join())
            .await
            .expect("effect tasks stop on halt");
        assert!(matches!(scheduler.run(&saga), Err(EffectError::Halted)));
    }
}
