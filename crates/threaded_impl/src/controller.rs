use std::io;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use common::{
    drive, Actuator, ActuatorStatus, ControlLoopConfig, Fault, Observable, Outcome,
    SharedDiagnostics, Transition, TransitionLog,
};

use crate::timer::TimerSlot;

/// Asymmetric-delay light controller running its transitions on a timer
/// thread.
pub struct ActuatorController {
    activation_delay: Duration,
    deactivation_delay: Duration,
    slot: TimerSlot<Transition>,
    shared: Arc<Shared>,
}

struct Shared {
    actuator: Arc<dyn Actuator>,
    status: Observable<ActuatorStatus>,
    diagnostics: Arc<SharedDiagnostics>,
    log: Option<TransitionLog>,
}

impl Shared {
    fn apply(&self, transition: Transition) -> Result<(), Fault> {
        let result = drive(self.actuator.as_ref(), transition);
        match &result {
            Ok(()) => {
                info!("{transition:?} applied");
                self.diagnostics.record_applied();
                self.record(transition, Outcome::Applied);
                self.status.set(transition.settled_status());
            }
            Err(fault) => {
                warn!("{transition:?} failed: {fault}");
                self.diagnostics.record_fault();
                self.record(transition, Outcome::Faulted);
                self.status.set(ActuatorStatus::Error);
            }
        }
        result
    }

    fn dropped(&self, transition: Transition, outcome: Outcome) {
        debug!("pending {transition:?} {outcome:?}");
        match outcome {
            Outcome::Cancelled => self.diagnostics.record_cancelled(),
            _ => self.diagnostics.record_superseded(),
        }
        self.record(transition, outcome);
    }

    fn record(&self, transition: Transition, outcome: Outcome) {
        if let Some(log) = &self.log {
            log.record(transition, outcome);
        }
    }
}

impl ActuatorController {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        activation_delay: Duration,
        deactivation_delay: Duration,
    ) -> io::Result<Self> {
        Self::build(
            actuator,
            activation_delay,
            deactivation_delay,
            Arc::new(SharedDiagnostics::default()),
            None,
        )
    }

    pub fn from_config(
        config: &ControlLoopConfig,
        actuator: Arc<dyn Actuator>,
        diagnostics: Arc<SharedDiagnostics>,
        log: Option<TransitionLog>,
    ) -> io::Result<Self> {
        Self::build(
            actuator,
            config.activation_delay(),
            config.deactivation_delay(),
            diagnostics,
            log,
        )
    }

    fn build(
        actuator: Arc<dyn Actuator>,
        activation_delay: Duration,
        deactivation_delay: Duration,
        diagnostics: Arc<SharedDiagnostics>,
        log: Option<TransitionLog>,
    ) -> io::Result<Self> {
        Ok(Self {
            activation_delay,
            deactivation_delay,
            slot: TimerSlot::new("actuator")?,
            shared: Arc::new(Shared {
                actuator,
                status: Observable::new(ActuatorStatus::Off),
                diagnostics,
                log,
            }),
        })
    }

    pub fn request_activation(&self) {
        self.request(Transition::Activate);
    }

    pub fn request_deactivation(&self) {
        self.request(Transition::Deactivate);
    }

    pub fn request(&self, transition: Transition) {
        let delay = match transition {
            Transition::Activate => self.activation_delay,
            Transition::Deactivate => self.deactivation_delay,
        };
        let shared = Arc::clone(&self.shared);
        let superseded = self.slot.schedule(transition, delay, move || {
            let _ = shared.apply(transition);
        });
        if let Some(previous) = superseded {
            self.shared.dropped(previous, Outcome::Superseded);
        }
        debug!("{transition:?} requested, due in {delay:?}");
    }

    pub fn force_deactivate(&self) -> Result<(), Fault> {
        let (cancelled, result) = self
            .slot
            .cancel_then(|| self.shared.apply(Transition::Deactivate));
        if let Some(previous) = cancelled {
            self.shared.dropped(previous, Outcome::Cancelled);
        }
        result
    }

    pub fn cancel_pending(&self) -> bool {
        match self.slot.cancel() {
            Some(previous) => {
                self.shared.dropped(previous, Outcome::Cancelled);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> Option<Transition> {
        self.slot.pending()
    }

    pub fn current_status(&self) -> ActuatorStatus {
        self.shared.status.get()
    }

    pub fn subscribe(&self) -> Receiver<ActuatorStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.slot.is_closed()
    }

    /// Cancels pending work and joins the timer thread. The light is left
    /// as it is.
    pub fn shutdown(&self) {
        if let Some(previous) = self.slot.shutdown() {
            self.shared.dropped(previous, Outcome::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SimulatedLight;
    use std::thread;

    const ON: Duration = Duration::from_millis(30);
    const OFF: Duration = Duration::from_millis(120);

    fn setup() -> (Arc<SimulatedLight>, ActuatorController) {
        let light = Arc::new(SimulatedLight::new());
        let controller = ActuatorController::new(light.clone(), ON, OFF).unwrap();
        (light, controller)
    }

    #[test]
    fn activation_wins_over_late_deactivation() {
        let (light, controller) = setup();
        controller.request_deactivation();
        thread::sleep(OFF / 4);
        controller.request_activation();
        thread::sleep((ON + OFF) * 2);

        assert_eq!(light.disable_calls(), 0);
        assert_eq!(light.enable_calls(), 1);
        assert_eq!(controller.current_status(), ActuatorStatus::On);
    }

    #[test]
    fn double_activation_enables_once() {
        let (light, controller) = setup();
        controller.request_activation();
        controller.request_activation();
        thread::sleep(ON * 5);
        assert_eq!(light.enable_calls(), 1);
    }

    #[test]
    fn fault_then_recovery() {
        let (light, controller) = setup();
        light.fail_next();
        controller.request_activation();
        thread::sleep(ON * 4);
        assert_eq!(controller.current_status(), ActuatorStatus::Error);

        controller.request_deactivation();
        thread::sleep(OFF * 2);
        assert_eq!(light.disable_calls(), 1);
        assert_eq!(controller.current_status(), ActuatorStatus::Off);
    }

    #[test]
    fn shutdown_cancels_pending_transition() {
        let (light, controller) = setup();
        controller.request_activation();
        controller.shutdown();
        thread::sleep(ON * 4);
        assert_eq!(light.enable_calls(), 0);
    }

    #[test]
    fn status_subscribers_see_every_change() {
        let (_, controller) = setup();
        let rx = controller.subscribe();
        controller.request_activation();
        thread::sleep(ON * 4);
        assert!(controller.force_deactivate().is_ok());

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![ActuatorStatus::Off, ActuatorStatus::On, ActuatorStatus::Off]
        );
    }

    #[test]
    fn cancellations_are_counted_apart_from_supersessions() {
        let diagnostics = Arc::new(SharedDiagnostics::default());
        let controller = ActuatorController::build(
            Arc::new(SimulatedLight::new()),
            ON,
            OFF,
            Arc::clone(&diagnostics),
            None,
        )
        .unwrap();

        controller.request_activation();
        controller.request_deactivation();
        assert!(controller.force_deactivate().is_ok());
        controller.request_activation();
        controller.shutdown();
        assert!(controller.is_shut_down());

        let snap = diagnostics.snapshot();
        assert_eq!(snap.transitions_superseded, 1);
        assert_eq!(snap.transitions_cancelled, 2);
        assert_eq!(snap.transitions_applied, 1);
    }
}
