use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;

use common::{
    drive, Actuator, ActuatorStatus, ControlLoopConfig, Fault, Outcome, SharedDiagnostics,
    Transition, TransitionLog,
};

use crate::slot::DeferredSlot;

/// Drives the light with asymmetric delays: quick to switch on, slow to
/// switch off. At most one transition is pending; any new request
/// supersedes it and restarts the delay from zero.
pub struct ActuatorController {
    activation_delay: Duration,
    deactivation_delay: Duration,
    slot: DeferredSlot<Transition>,
    shared: Arc<Shared>,
}

struct Shared {
    actuator: Arc<dyn Actuator>,
    status_tx: watch::Sender<ActuatorStatus>,
    diagnostics: Arc<SharedDiagnostics>,
    log: Option<TransitionLog>,
}

impl Shared {
    fn apply(&self, transition: Transition) -> Result<(), Fault> {
        let result = drive(self.actuator.as_ref(), transition);
        let status = match &result {
            Ok(()) => {
                info!("{transition:?} applied");
                self.diagnostics.record_applied();
                self.record(transition, Outcome::Applied);
                transition.settled_status()
            }
            Err(fault) => {
                warn!("{transition:?} failed: {fault}");
                self.diagnostics.record_fault();
                self.record(transition, Outcome::Faulted);
                ActuatorStatus::Error
            }
        };
        self.status_tx.send_replace(status);
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
    ) -> Self {
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
    ) -> Self {
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
    ) -> Self {
        let (status_tx, _) = watch::channel(ActuatorStatus::Off);
        Self {
            activation_delay,
            deactivation_delay,
            slot: DeferredSlot::new("actuator"),
            shared: Arc::new(Shared {
                actuator,
                status_tx,
                diagnostics,
                log,
            }),
        }
    }

    pub fn request_activation(&self) {
        self.request(Transition::Activate);
    }

    pub fn request_deactivation(&self) {
        self.request(Transition::Deactivate);
    }

    pub fn request(&self, transition: Transition) {
        let delay = self.delay_for(transition);
        let shared = Arc::clone(&self.shared);
        let superseded = self.slot.schedule(transition, delay, move || {
            // faults are already reflected in the status
            let _ = shared.apply(transition);
        });

        if let Some(previous) = superseded {
            self.shared.dropped(previous, Outcome::Superseded);
        }
        debug!("{transition:?} requested, due in {delay:?}");
    }

    /// Cancels any pending transition and disables the light right away,
    /// serialized with transitions that may be firing concurrently.
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
        *self.shared.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActuatorStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.slot.is_closed()
    }

    /// Cancels pending work and stops accepting requests. The light is left
    /// as it is.
    pub fn shutdown(&self) {
        if let Some(previous) = self.slot.shutdown() {
            self.shared.dropped(previous, Outcome::Cancelled);
        }
    }

    fn delay_for(&self, transition: Transition) -> Duration {
        match transition {
            Transition::Activate => self.activation_delay,
            Transition::Deactivate => self.deactivation_delay,
        }
    }
}
