use serde::{Deserialize, Serialize};

pub mod actuator;
pub mod config;
pub mod detector;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod observable;

pub use actuator::{drive, Actuator, SimulatedLight};
pub use config::{ControlLoopConfig, LightConfig};
pub use detector::DetectionEvent;
pub use diagnostics::{DiagnosticsSnapshot, SharedDiagnostics};
pub use error::{ConfigError, Fault};
pub use metrics::{Outcome, SessionReport, TransitionLog, TransitionRecord};
pub use observable::Observable;

/// Externally visible state of the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActuatorStatus {
    On,
    #[default]
    Off,
    Error,
}

/// Direction of a deferred actuator change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    Activate,
    Deactivate,
}

impl Transition {
    pub fn from_signal(present: bool) -> Self {
        if present {
            Transition::Activate
        } else {
            Transition::Deactivate
        }
    }

    /// Status published once the actuator accepted this transition.
    pub fn settled_status(self) -> ActuatorStatus {
        match self {
            Transition::Activate => ActuatorStatus::On,
            Transition::Deactivate => ActuatorStatus::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlLoopState {
    pub enabled: bool,
    pub last_stable_signal: bool,
    pub actuator_status: ActuatorStatus,
}

impl ControlLoopState {
    pub fn status_text(&self) -> &'static str {
        status_text(self.last_stable_signal, self.actuator_status)
    }
}

/// One-line summary shown next to the toggle.
pub fn status_text(detected: bool, status: ActuatorStatus) -> &'static str {
    let light_on = status == ActuatorStatus::On;
    match (detected, light_on) {
        (true, true) => "Human detected - Light ON",
        (true, false) => "Human detected - Light turning on...",
        (false, true) => "No human - Light turning off...",
        (false, false) => "Searching for humans...",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_status_is_off() {
        assert_eq!(ActuatorStatus::default(), ActuatorStatus::Off);
        assert_eq!(ControlLoopState::default().actuator_status, ActuatorStatus::Off);
        assert!(!ControlLoopState::default().enabled);
    }

    #[test]
    fn transition_mirrors_signal() {
        assert_eq!(Transition::from_signal(true), Transition::Activate);
        assert_eq!(Transition::from_signal(false), Transition::Deactivate);
        assert_eq!(Transition::Activate.settled_status(), ActuatorStatus::On);
        assert_eq!(Transition::Deactivate.settled_status(), ActuatorStatus::Off);
    }

    #[test]
    fn status_text_covers_every_combination() {
        assert_eq!(status_text(true, ActuatorStatus::On), "Human detected - Light ON");
        assert_eq!(
            status_text(true, ActuatorStatus::Off),
            "Human detected - Light turning on..."
        );
        assert_eq!(
            status_text(false, ActuatorStatus::On),
            "No human - Light turning off..."
        );
        assert_eq!(status_text(false, ActuatorStatus::Off), "Searching for humans...");
        // a faulted light is reported like an unlit one
        assert_eq!(
            status_text(true, ActuatorStatus::Error),
            "Human detected - Light turning on..."
        );
    }
}
