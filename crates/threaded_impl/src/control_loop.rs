use std::io;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, trace, warn};

use common::{
    Actuator, ActuatorStatus, ControlLoopConfig, ControlLoopState, SharedDiagnostics,
    Transition, TransitionLog,
};

use crate::controller::ActuatorController;
use crate::debouncer::Debouncer;

/// Debouncer and controller wired together for one session. Lock order is
/// debouncer slot, then `enabled`, then controller slot.
pub struct ControlLoop {
    debouncer: Debouncer,
    controller: Arc<ActuatorController>,
    enabled: Arc<Mutex<bool>>,
    diagnostics: Arc<SharedDiagnostics>,
}

impl ControlLoop {
    pub fn new(config: &ControlLoopConfig, actuator: Arc<dyn Actuator>) -> io::Result<Self> {
        Self::build(config, actuator, None)
    }

    pub fn with_log(
        config: &ControlLoopConfig,
        actuator: Arc<dyn Actuator>,
        log: TransitionLog,
    ) -> io::Result<Self> {
        Self::build(config, actuator, Some(log))
    }

    fn build(
        config: &ControlLoopConfig,
        actuator: Arc<dyn Actuator>,
        log: Option<TransitionLog>,
    ) -> io::Result<Self> {
        let diagnostics = Arc::new(SharedDiagnostics::default());
        let debouncer =
            Debouncer::with_diagnostics(config.debounce_window(), Arc::clone(&diagnostics))?;
        let controller = Arc::new(ActuatorController::from_config(
            config,
            actuator,
            Arc::clone(&diagnostics),
            log,
        )?);
        let enabled = Arc::new(Mutex::new(false));

        {
            let controller = Arc::clone(&controller);
            let enabled = Arc::clone(&enabled);
            debouncer.set_sink(move |stable| {
                if *lock(&enabled) {
                    controller.request(Transition::from_signal(stable));
                } else {
                    trace!("loop disabled, ignoring stable signal {stable}");
                }
            });
        }

        Ok(Self {
            debouncer,
            controller,
            enabled,
            diagnostics,
        })
    }

    pub fn on_raw_detection(&self, detected: bool) {
        if !self.is_enabled() {
            trace!("loop disabled, dropping raw detection {detected}");
            return;
        }
        self.debouncer.observe(detected);
    }

    pub fn enable(&self) {
        let mut enabled = lock(&self.enabled);
        self.enable_locked(&mut enabled);
    }

    pub fn disable(&self) -> ActuatorStatus {
        let mut enabled = lock(&self.enabled);
        self.disable_locked(&mut enabled)
    }

    pub fn toggle(&self) -> bool {
        let mut enabled = lock(&self.enabled);
        if *enabled {
            self.disable_locked(&mut enabled);
        } else {
            self.enable_locked(&mut enabled);
        }
        *enabled
    }

    pub fn is_enabled(&self) -> bool {
        *lock(&self.enabled)
    }

    pub fn state(&self) -> ControlLoopState {
        ControlLoopState {
            enabled: self.is_enabled(),
            last_stable_signal: self.debouncer.stable(),
            actuator_status: self.controller.current_status(),
        }
    }

    pub fn status_text(&self) -> &'static str {
        self.state().status_text()
    }

    pub fn subscribe_status(&self) -> Receiver<ActuatorStatus> {
        self.controller.subscribe()
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub fn controller(&self) -> &ActuatorController {
        &self.controller
    }

    pub fn diagnostics(&self) -> &SharedDiagnostics {
        &self.diagnostics
    }

    /// Session teardown: joins both timer threads and leaves the light off.
    pub fn shutdown(&self) {
        self.debouncer.shutdown();
        let mut enabled = lock(&self.enabled);
        *enabled = false;
        let _ = self.controller.force_deactivate();
        self.controller.shutdown();
        info!("control loop shut down");
    }

    fn enable_locked(&self, enabled: &mut MutexGuard<'_, bool>) {
        if **enabled {
            return;
        }
        if self.controller.is_shut_down() {
            warn!("control loop already shut down, staying disabled");
            return;
        }
        **enabled = true;
        let stable = self.debouncer.stable();
        info!("control loop enabled (stable signal {stable})");
        self.controller.request(Transition::from_signal(stable));
    }

    fn disable_locked(&self, enabled: &mut MutexGuard<'_, bool>) -> ActuatorStatus {
        **enabled = false;
        let _ = self.controller.force_deactivate();
        let status = self.controller.current_status();
        info!("control loop disabled, light {status:?}");
        status
    }
}

fn lock(m: &Mutex<bool>) -> MutexGuard<'_, bool> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
