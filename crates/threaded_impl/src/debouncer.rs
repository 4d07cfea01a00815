use std::io;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;

use common::{Observable, SharedDiagnostics};

use crate::timer::TimerSlot;

pub type StableSink = Box<dyn Fn(bool) + Send + Sync>;

/// Quiet-period debouncer; see the async crate for the contract. Publishes
/// run on the debouncer's own timer thread.
pub struct Debouncer {
    window: Duration,
    slot: TimerSlot<bool>,
    last_raw: Mutex<bool>,
    stable: Arc<Observable<bool>>,
    sink: Arc<Mutex<Option<StableSink>>>,
    diagnostics: Arc<SharedDiagnostics>,
}

impl Debouncer {
    pub fn new(window: Duration) -> io::Result<Self> {
        Self::with_diagnostics(window, Arc::new(SharedDiagnostics::default()))
    }

    pub fn with_diagnostics(
        window: Duration,
        diagnostics: Arc<SharedDiagnostics>,
    ) -> io::Result<Self> {
        Ok(Self {
            window,
            slot: TimerSlot::new("debouncer")?,
            last_raw: Mutex::new(false),
            stable: Arc::new(Observable::new(false)),
            sink: Arc::new(Mutex::new(None)),
            diagnostics,
        })
    }

    pub fn set_sink<F>(&self, sink: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        *lock(&self.sink) = Some(Box::new(sink));
    }

    pub fn observe(&self, raw: bool) {
        self.diagnostics.record_raw_event();

        let mut last_raw = lock(&self.last_raw);
        *last_raw = raw;

        let stable = Arc::clone(&self.stable);
        let sink = Arc::clone(&self.sink);
        let diagnostics = Arc::clone(&self.diagnostics);

        self.slot.schedule(raw, self.window, move || {
            stable.set(raw);
            diagnostics.record_stable_publish();
            debug!("stable signal -> {raw}");
            if let Some(sink) = lock(&sink).as_ref() {
                sink(raw);
            }
        });
    }

    pub fn current_raw(&self) -> bool {
        *lock(&self.last_raw)
    }

    pub fn stable(&self) -> bool {
        self.stable.get()
    }

    pub fn subscribe(&self) -> Receiver<bool> {
        self.stable.subscribe()
    }

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
