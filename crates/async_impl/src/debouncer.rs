use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;
use tokio::sync::watch;

use common::SharedDiagnostics;

use crate::slot::DeferredSlot;

/// Downstream consumer of the stable signal. There is at most one.
pub type StableSink = Box<dyn Fn(bool) + Send + Sync>;

/// Turns a noisy stream of raw detections into a stable signal.
///
/// Each [`observe`](Self::observe) restarts the quiet-period timer with the
/// new value as payload. A value is published only if no other observation
/// arrives within the debounce window, so a burst of flicker collapses into
/// one publish of its final value.
pub struct Debouncer {
    window: Duration,
    slot: DeferredSlot<bool>,
    last_raw: Mutex<bool>,
    stable_tx: Arc<watch::Sender<bool>>,
    sink: Arc<Mutex<Option<StableSink>>>,
    diagnostics: Arc<SharedDiagnostics>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self::with_diagnostics(window, Arc::new(SharedDiagnostics::default()))
    }

    pub fn with_diagnostics(window: Duration, diagnostics: Arc<SharedDiagnostics>) -> Self {
        let (stable_tx, _) = watch::channel(false);
        Self {
            window,
            slot: DeferredSlot::new("debouncer"),
            last_raw: Mutex::new(false),
            stable_tx: Arc::new(stable_tx),
            sink: Arc::new(Mutex::new(None)),
            diagnostics,
        }
    }

    /// Installs the downstream sink, replacing any previous one.
    pub fn set_sink<F>(&self, sink: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        *lock(&self.sink) = Some(Box::new(sink));
    }

    pub fn observe(&self, raw: bool) {
        self.diagnostics.record_raw_event();

        // held across the schedule so concurrent observers cannot reorder
        // last_raw relative to the pending payload
        let mut last_raw = lock(&self.last_raw);
        *last_raw = raw;

        let stable_tx = Arc::clone(&self.stable_tx);
        let sink = Arc::clone(&self.sink);
        let diagnostics = Arc::clone(&self.diagnostics);

        self.slot.schedule(raw, self.window, move || {
            stable_tx.send_replace(raw);
            diagnostics.record_stable_publish();
            debug!("stable signal -> {raw}");
            if let Some(sink) = lock(&sink).as_ref() {
                sink(raw);
            }
        });
    }

    /// Latest raw value, independent of debouncing.
    pub fn current_raw(&self) -> bool {
        *lock(&self.last_raw)
    }

    /// Latest published stable value.
    pub fn stable(&self) -> bool {
        *self.stable_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stable_tx.subscribe()
    }

    /// Payload of the quiet-period timer currently running, if any.
    pub fn pending(&self) -> Option<bool> {
        self.slot.pending()
    }

    pub fn cancel_pending(&self) -> bool {
        self.slot.cancel().is_some()
    }

    pub fn shutdown(&self) {
        self.slot.shutdown();
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
