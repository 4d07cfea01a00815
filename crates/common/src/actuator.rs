use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::config::LightConfig;
use crate::error::Fault;
use crate::Transition;

/// Driver for the binary light. Calls are synchronous, idempotent and
/// expected to return in bounded time.
pub trait Actuator: Send + Sync {
    fn enable(&self) -> Result<(), Fault>;
    fn disable(&self) -> Result<(), Fault>;
}

/// Applies `transition` to `actuator`, turning a driver panic into
/// [`Fault::Panicked`] so the control loop survives it.
pub fn drive(actuator: &dyn Actuator, transition: Transition) -> Result<(), Fault> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| match transition {
        Transition::Activate => actuator.enable(),
        Transition::Deactivate => actuator.disable(),
    }));

    match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Fault::Panicked(msg))
        }
    }
}

/// In-memory light that counts driver calls. Used by the demos and as the
/// test double for both implementations.
#[derive(Debug, Default)]
pub struct SimulatedLight {
    lit: AtomicBool,
    unavailable: AtomicBool,
    fail_next: AtomicBool,
    fault_every: AtomicU32,
    calls: AtomicU32,
    enable_calls: AtomicU64,
    disable_calls: AtomicU64,
}

impl SimulatedLight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LightConfig) -> Self {
        let light = Self::new();
        light.unavailable.store(!config.available, Ordering::SeqCst);
        light.fault_every.store(config.fault_every, Ordering::SeqCst);
        light
    }

    /// Makes the next driver call fail with [`Fault::Driver`].
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn is_lit(&self) -> bool {
        self.lit.load(Ordering::SeqCst)
    }

    pub fn enable_calls(&self) -> u64 {
        self.enable_calls.load(Ordering::SeqCst)
    }

    pub fn disable_calls(&self) -> u64 {
        self.disable_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), Fault> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Fault::Unavailable);
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Fault::Driver("injected failure".to_string()));
        }
        let every = self.fault_every.load(Ordering::SeqCst);
        if every > 0 && n % every == 0 {
            return Err(Fault::Driver(format!("scheduled failure on call {n}")));
        }
        Ok(())
    }
}

impl Actuator for SimulatedLight {
    fn enable(&self) -> Result<(), Fault> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.lit.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) -> Result<(), Fault> {
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.lit.store(false, Ordering::SeqCst);
        Ok(())
    }
}
