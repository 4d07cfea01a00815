//! Wires the debouncer to the actuator controller for one session.
//!
//! ```text
//! on_raw_detection -> Debouncer --stable--> [enabled?] -> ActuatorController -> Actuator
//!                         |                                     |
//!                      watch<bool>                      watch<ActuatorStatus>
//! ```
//!
//! The `enabled` flag is a mutex rather than an atomic: the debouncer sink
//! holds it while issuing a request, and `disable` holds it while cancelling
//! and forcing the light off, so a stable publish can never slip a request
//! in between the two.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, trace, warn};
use tokio::sync::watch;

use common::{
    Actuator, ActuatorStatus, ControlLoopConfig, ControlLoopState, SharedDiagnostics,
    Transition, TransitionLog,
};

use crate::controller::ActuatorController;
use crate::debouncer::Debouncer;

pub struct ControlLoop {
    debouncer: Debouncer,
    controller: Arc<ActuatorController>,
    enabled: Arc<Mutex<bool>>,
    diagnostics: Arc<SharedDiagnostics>,
}

impl ControlLoop {
    pub fn new(config: &ControlLoopConfig, actuator: Arc<dyn Actuator>) -> Self {
        Self::build(config, actuator, None)
    }

    pub fn with_log(
        config: &ControlLoopConfig,
        actuator: Arc<dyn Actuator>,
        log: TransitionLog,
    ) -> Self {
        Self::build(config, actuator, Some(log))
    }

    fn build(
        config: &ControlLoopConfig,
        actuator: Arc<dyn Actuator>,
        log: Option<TransitionLog>,
    ) -> Self {
        let diagnostics = Arc::new(SharedDiagnostics::default());
        let debouncer =
            Debouncer::with_diagnostics(config.debounce_window(), Arc::clone(&diagnostics));
        let controller = Arc::new(ActuatorController::from_config(
            config,
            actuator,
            Arc::clone(&diagnostics),
            log,
        ));
        let enabled = Arc::new(Mutex::new(false));

        {
            let controller = Arc::clone(&controller);
            let enabled = Arc::clone(&enabled);
            debouncer.set_sink(move |stable| {
                let enabled = lock(&enabled);
                if *enabled {
                    controller.request(Transition::from_signal(stable));
                } else {
                    trace!("loop disabled, ignoring stable signal {stable}");
                }
            });
        }

        Self {
            debouncer,
            controller,
            enabled,
            diagnostics,
        }
    }

    /// Detector entry point. Raw events are dropped while the loop is
    /// disabled.
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

    /// Suspends the loop: cancels the pending transition and switches the
    /// light off once, whatever its current status. Returns the resulting
    /// status.
    pub fn disable(&self) -> ActuatorStatus {
        let mut enabled = lock(&self.enabled);
        self.disable_locked(&mut enabled)
    }

    /// Flips the loop and returns whether it is now enabled.
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

    pub fn subscribe_stable(&self) -> watch::Receiver<bool> {
        self.debouncer.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ActuatorStatus> {
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

    /// Session teardown. Nothing scheduled before this call will reach the
    /// light afterwards, and the light is left off.
    pub fn shutdown(&self) {
        // before taking `enabled`: a firing debouncer effect holds its slot
        // and then waits for `enabled`
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
        // faults are already reflected in the status
        let _ = self.controller.force_deactivate();
        let status = self.controller.current_status();
        info!("control loop disabled, light {status:?}");
        status
    }
}

fn lock(m: &Mutex<bool>) -> MutexGuard<'_, bool> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SimulatedLight;
    use std::time::Duration;
    use tokio::time::sleep;

    fn config() -> ControlLoopConfig {
        ControlLoopConfig {
            debounce_window_ms: 500,
            activation_delay_ms: 200,
            deactivation_delay_ms: 1000,
            ..ControlLoopConfig::default()
        }
    }

    fn setup() -> (Arc<SimulatedLight>, ControlLoop) {
        let light = Arc::new(SimulatedLight::new());
        let control = ControlLoop::new(&config(), light.clone());
        (light, control)
    }

    #[tokio::test(start_paused = true)]
    async fn presence_turns_light_on_after_both_delays() {
        let (light, control) = setup();
        control.enable();
        control.on_raw_detection(true);

        // debounce 500 + activation 200
        sleep(Duration::from_millis(690)).await;
        assert_eq!(light.enable_calls(), 0);

        sleep(Duration::from_millis(20)).await;
        assert_eq!(light.enable_calls(), 1);
        assert_eq!(control.state().actuator_status, ActuatorStatus::On);
        assert_eq!(control.status_text(), "Human detected - Light ON");
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_loop_ignores_detections() {
        let (light, control) = setup();
        control.on_raw_detection(true);
        sleep(Duration::from_secs(3)).await;

        assert_eq!(light.enable_calls(), 0);
        assert!(!control.debouncer().current_raw());
        assert_eq!(control.state(), ControlLoopState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn disable_forces_off_and_cancels_pending() {
        let (light, control) = setup();
        control.enable();
        control.on_raw_detection(true);
        sleep(Duration::from_millis(600)).await; // activation pending

        assert_eq!(control.disable(), ActuatorStatus::Off);
        // the re-sync deactivation from enable() was superseded, never applied
        assert_eq!(light.disable_calls(), 1);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(light.enable_calls(), 0);
        assert!(!control.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn enable_resyncs_with_stable_signal() {
        let (light, control) = setup();
        control.enable();
        control.on_raw_detection(true);
        sleep(Duration::from_millis(800)).await;
        assert_eq!(light.enable_calls(), 1);

        assert!(!control.toggle());
        assert!(!light.is_lit());

        // stable signal is still true, so re-enabling lights up again
        assert!(control.toggle());
        sleep(Duration::from_millis(250)).await;
        assert_eq!(light.enable_calls(), 2);
        assert!(light.is_lit());
    }

    #[tokio::test(start_paused = true)]
    async fn stable_signal_published_while_disabled_does_not_drive() {
        let (light, control) = setup();
        control.enable();
        control.on_raw_detection(true);
        sleep(Duration::from_millis(100)).await;
        control.disable();

        // debouncer keeps running and publishes, the controller stays idle
        sleep(Duration::from_secs(2)).await;
        assert!(control.state().last_stable_signal);
        assert_eq!(light.enable_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_leaves_light_off_and_inert() {
        let (light, control) = setup();
        control.enable();
        control.on_raw_detection(true);
        sleep(Duration::from_millis(800)).await;
        assert!(light.is_lit());

        control.on_raw_detection(false);
        control.shutdown();
        assert!(!light.is_lit());

        control.enable();
        assert!(!control.toggle());
        assert!(!control.is_enabled());
        control.on_raw_detection(true);
        sleep(Duration::from_secs(3)).await;
        assert!(!light.is_lit());
        assert_eq!(light.enable_calls(), 1);
    }
}
