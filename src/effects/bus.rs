//! Routing of reduced actions to effect rules and pending takes.
//!
//! The scheduler publishes every reduced action here from the store task, in
//! dispatch order. Standing rules are matched on the spot, so each matching
//! action yields exactly one handler run however slow the handlers are. A
//! pending `take` is a one-shot waiter, consumed by the first match.

use crate::effects::context::EffectHandler;
use crate::framework::Action;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

struct Rule {
    action_type: String,
    handler: Arc<dyn EffectHandler>,
}

struct Waiter {
    action_type: String,
    respond_to: oneshot::Sender<Action>,
}

#[derive(Default)]
struct Routes {
    rules: Vec<Rule>,
    waiters: Vec<Waiter>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct ActionBus {
    routes: Mutex<Routes>,
}

impl ActionBus {
    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Installs a standing rule. Returns `false` once the bus is closed.
    pub fn add_rule(&self, action_type: String, handler: Arc<dyn EffectHandler>) -> bool {
        let mut routes = self.routes();
        if routes.closed {
            return false;
        }
        routes.rules.push(Rule { action_type, handler });
        true
    }

    /// Registers a waiter for the next action of `action_type`.
    ///
    /// Returns `None` once the bus is closed.
    pub fn wait_for(&self, action_type: &str) -> Option<oneshot::Receiver<Action>> {
        let mut routes = self.routes();
        if routes.closed {
            return None;
        }
        // Abandoned takes.
        routes.waiters.retain(|waiter| !waiter.respond_to.is_closed());
        let (respond_to, response) = oneshot::channel();
        routes.waiters.push(Waiter {
            action_type: action_type.to_string(),
            respond_to,
        });
        Some(response)
    }

    /// Hands `action` to every waiter of its type and returns the handlers of
    /// every matching rule.
    pub fn publish(&self, action: &Action) -> Vec<Arc<dyn EffectHandler>> {
        let mut routes = self.routes();
        if routes.closed {
            return Vec::new();
        }
        let (matched, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut routes.waiters)
            .into_iter()
            .partition(|waiter| waiter.action_type == action.action_type);
        routes.waiters = pending;
        for waiter in matched {
            let _ = waiter.respond_to.send(action.clone());
        }

        routes
            .rules
            .iter()
            .filter(|rule| rule.action_type == action.action_type)
            .map(|rule| rule.handler.clone())
            .collect()
    }

    /// Drops every rule and waiter. Pending takes resolve empty.
    pub fn close(&self) {
        let mut routes = self.routes();
        routes.closed = true;
        routes.rules.clear();
        routes.waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectContext, EffectError};

    fn noop() -> Arc<dyn EffectHandler> {
        Arc::new(|_action: Action, _ctx: EffectContext| async { Ok::<_, EffectError>(()) })
    }

    #[test]
    fn test_rules_match_every_publish() {
        let bus = ActionBus::default();
        assert!(bus.add_rule("todo/add".into(), noop()));
        assert!(bus.add_rule("todo/add".into(), noop()));

        for _ in 0..1000 {
            assert_eq!(bus.publish(&Action::bare("todo/add")).len(), 2);
        }
        assert!(bus.publish(&Action::bare("todo/remove")).is_empty());
    }

    #[tokio::test]
    async fn test_waiter_takes_first_match_only() {
        let bus = ActionBus::default();
        let first = bus.wait_for("todo/add").unwrap();

        bus.publish(&Action::bare("todo/other"));
        bus.publish(&Action::new("todo/add", 1));
        bus.publish(&Action::new("todo/add", 2));

        assert_eq!(first.await.unwrap(), Action::new("todo/add", 1));
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let bus = ActionBus::default();
        let pending = bus.wait_for("todo/add").unwrap();
        bus.close();

        assert!(pending.await.is_err());
        assert!(bus.wait_for("todo/add").is_none());
        assert!(!bus.add_rule("todo/add".into(), noop()));
        assert!(bus.publish(&Action::bare("todo/add")).is_empty());
    }
}
