//! A single slot of cancellable delayed work.
//!
//! Every schedule bumps the slot's generation. The spawned task captures
//! the generation it was scheduled under and, once its delay has expired,
//! re-checks it while holding the slot lock; the effect runs under that
//! same lock. A newer `schedule`, `cancel` or `shutdown` therefore either
//! happens before the check (and the stale effect is dropped) or waits
//! until the effect has finished. Aborting the old task handle only saves
//! the timer wakeup; correctness comes from the generation check.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub struct DeferredSlot<L> {
    name: &'static str,
    runtime: Handle,
    state: Arc<Mutex<SlotState<L>>>,
}

struct SlotState<L> {
    generation: u64,
    pending: Option<Pending<L>>,
    closed: bool,
}

struct Pending<L> {
    label: L,
    task: JoinHandle<()>,
}

impl<L: Copy + Send + 'static> DeferredSlot<L> {
    /// Creates a slot bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            runtime: Handle::current(),
            state: Arc::new(Mutex::new(SlotState {
                generation: 0,
                pending: None,
                closed: false,
            })),
        }
    }

    /// Replaces whatever is pending with `effect`, due after `delay`.
    ///
    /// Returns the label of the superseded work, if any. Once the slot is
    /// shut down this is a no-op.
    pub fn schedule<F>(&self, label: L, delay: Duration, effect: F) -> Option<L>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = lock(&self.state);
        if state.closed {
            debug!("{}: closed, ignoring schedule", self.name);
            return None;
        }

        let superseded = invalidate(&mut state);
        let token = state.generation;
        let deadline = Instant::now() + delay;
        let shared = Arc::clone(&self.state);
        let name = self.name;

        let task = self.runtime.spawn(async move {
            sleep_until(deadline).await;

            let mut state = lock(&shared);
            if state.closed || state.generation != token {
                debug!("{name}: generation {token} is stale, dropping effect");
                return;
            }
            state.pending = None;
            effect();
        });

        state.pending = Some(Pending { label, task });
        debug!("{}: scheduled generation {} in {:?}", self.name, token, delay);
        superseded
    }

    /// Invalidates pending work without scheduling anything new.
    pub fn cancel(&self) -> Option<L> {
        let mut state = lock(&self.state);
        invalidate(&mut state)
    }

    /// Invalidates pending work, then runs `f` while still holding the slot,
    /// so no scheduled effect can interleave with it.
    pub fn cancel_then<R>(&self, f: impl FnOnce() -> R) -> (Option<L>, R) {
        let mut state = lock(&self.state);
        let cancelled = invalidate(&mut state);
        (cancelled, f())
    }

    /// Cancels pending work and refuses all further scheduling.
    pub fn shutdown(&self) -> Option<L> {
        let mut state = lock(&self.state);
        state.closed = true;
        invalidate(&mut state)
    }

    pub fn pending(&self) -> Option<L> {
        lock(&self.state).pending.as_ref().map(|p| p.label)
    }

    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl<L> Drop for DeferredSlot<L> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.generation = state.generation.wrapping_add(1);
        if let Some(pending) = state.pending.take() {
            pending.task.abort();
        }
    }
}

fn invalidate<L>(state: &mut SlotState<L>) -> Option<L> {
    state.generation = state.generation.wrapping_add(1);
    state.pending.take().map(|pending| {
        pending.task.abort();
        pending.label
    })
}

fn lock<L>(state: &Mutex<SlotState<L>>) -> MutexGuard<'_, SlotState<L>> {
    state.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        error!("deferred slot lock poisoned; continuing with inner state");
        poisoned.into_inner()
    })
}
