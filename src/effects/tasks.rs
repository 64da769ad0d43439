//! Task group scoped to one store.
//!
//! Every effect task (per-action handler runs and forks) is
//! spawned through the group. The group owns the halt signal: once raised, each
//! task is dropped at its next suspension point and nothing new is spawned.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Counters describing the effect work a store has performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectStats {
    /// Effect processes started (root effect plus one per model).
    pub processes: usize,
    /// Standing `take_every` rules installed.
    pub watchers: usize,
    /// Handler runs spawned for matching actions.
    pub spawned: usize,
    /// Handler runs that returned `Ok`.
    pub completed: usize,
    /// Handler runs that returned an error.
    pub failed: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub processes: AtomicUsize,
    pub watchers: AtomicUsize,
    pub spawned: AtomicUsize,
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
}

impl Counters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> EffectStats {
        EffectStats {
            processes: self.processes.load(Ordering::SeqCst),
            watchers: self.watchers.load(Ordering::SeqCst),
            spawned: self.spawned.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug)]
pub struct TaskGroup {
    halt_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) counters: Counters,
}

impl TaskGroup {
    pub fn new() -> Self {
        let (halt_tx, _halt_rx) = watch::channel(false);
        Self {
            halt_tx,
            handles: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    /// Spawns `fut` so that it is dropped as soon as the group halts.
    ///
    /// Returns `false` (and spawns nothing) if the group has already halted.
    pub fn spawn_cancellable<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut halt_rx = self.halt_tx.subscribe();
        if *halt_rx.borrow() {
            return false;
        }
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = halt_rx.wait_for(|halted| *halted) => {}
                _ = fut => {}
            }
        });

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        true
    }

    /// Raises the halt signal.
    pub fn halt(&self) {
        self.halt_tx.send_replace(true);
    }

    pub fn is_halted(&self) -> bool {
        *self.halt_tx.borrow()
    }

    /// A receiver that flips to `true` when the group halts.
    pub fn halt_signal(&self) -> watch::Receiver<bool> {
        self.halt_tx.subscribe()
    }

    pub fn stats(&self) -> EffectStats {
        self.counters.snapshot()
    }

    /// Waits for every task spawned so far. Panicked tasks are logged.
    pub async fn join(&self) {
        let handles: Vec<_> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!(error = %e, "Effect task panicked");
                }
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.halt_tx.send_replace(true);
        let handles = self.handles.get_mut().unwrap_or_else(|e| e.into_inner());
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}
