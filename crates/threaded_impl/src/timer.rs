use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error};

type Effect = Box<dyn FnOnce() + Send>;

/// One slot of delayed work served by a dedicated timer thread.
///
/// The worker only runs an effect while holding the slot lock, after
/// confirming the entry's generation is still current, so `schedule`,
/// `cancel` and `shutdown` are totally ordered with every effect.
pub struct TimerSlot<L> {
    name: &'static str,
    shared: Arc<Shared<L>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<L> {
    state: Mutex<State<L>>,
    wake: Condvar,
}

struct State<L> {
    generation: u64,
    pending: Option<Pending<L>>,
    closed: bool,
}

struct Pending<L> {
    label: L,
    token: u64,
    deadline: Instant,
    effect: Effect,
}

impl<L: Copy + Send + 'static> TimerSlot<L> {
    pub fn new(name: &'static str) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                generation: 0,
                pending: None,
                closed: false,
            }),
            wake: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("{name}-timer"))
            .spawn(move || run_worker(name, &worker_shared))?;

        Ok(Self {
            name,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Replaces whatever is pending with `effect`, due after `delay`.
    /// Returns the label of the superseded work, if any.
    pub fn schedule<F>(&self, label: L, delay: Duration, effect: F) -> Option<L>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = lock(&self.shared.state);
        if state.closed {
            debug!("{}: closed, ignoring schedule", self.name);
            return None;
        }

        let superseded = invalidate(&mut state);
        let token = state.generation;
        state.pending = Some(Pending {
            label,
            token,
            deadline: Instant::now() + delay,
            effect: Box::new(effect),
        });
        self.shared.wake.notify_one();
        debug!("{}: scheduled generation {} in {:?}", self.name, token, delay);
        superseded
    }

    pub fn cancel(&self) -> Option<L> {
        let mut state = lock(&self.shared.state);
        let cancelled = invalidate(&mut state);
        self.shared.wake.notify_one();
        cancelled
    }

    /// Cancels pending work and runs `f` before any other effect can start.
    pub fn cancel_then<R>(&self, f: impl FnOnce() -> R) -> (Option<L>, R) {
        let mut state = lock(&self.shared.state);
        let cancelled = invalidate(&mut state);
        self.shared.wake.notify_one();
        (cancelled, f())
    }

    /// Cancels pending work, refuses further scheduling and joins the
    /// timer thread.
    pub fn shutdown(&self) -> Option<L> {
        let cancelled = {
            let mut state = lock(&self.shared.state);
            state.closed = true;
            let cancelled = invalidate(&mut state);
            self.shared.wake.notify_all();
            cancelled
        };

        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            // an effect may shut its own slot down; never join ourselves
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                error!("{}: timer thread panicked", self.name);
            }
        }
        cancelled
    }

    pub fn pending(&self) -> Option<L> {
        lock(&self.shared.state).pending.as_ref().map(|p| p.label)
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared.state).generation
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared.state).closed
    }
}

impl<L> Drop for TimerSlot<L> {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.shared.state);
            state.closed = true;
            state.pending = None;
            self.shared.wake.notify_all();
        }
        if let Some(worker) = lock(&self.worker).take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn run_worker<L>(name: &'static str, shared: &Shared<L>) {
    let mut state = lock(&shared.state);
    loop {
        if state.closed {
            break;
        }

        let now = Instant::now();
        let due = match state.pending.as_ref() {
            None => {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            Some(pending) if pending.deadline > now => {
                let timeout = pending.deadline - now;
                state = shared
                    .wake
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }
            Some(_) => state.pending.take(),
        };

        if let Some(pending) = due {
            if pending.token != state.generation {
                error!(
                    "{name}: pending generation {} behind slot generation {}",
                    pending.token, state.generation
                );
                continue;
            }
            (pending.effect)();
        }
    }
    debug!("{name}: timer thread exiting");
}

fn invalidate<L>(state: &mut State<L>) -> Option<L> {
    state.generation = state.generation.wrapping_add(1);
    state.pending.take().map(|p| p.label)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
