use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::info;

use common::{Actuator, ControlLoopConfig, SessionReport, TransitionLog};

use crate::control_loop::ControlLoop;

/// Replays `config.trace` on the calling thread, sleeping between events,
/// then tears the loop down after `config.settle_ms`.
pub fn run_session(
    config: ControlLoopConfig,
    actuator: Arc<dyn Actuator>,
) -> io::Result<SessionReport> {
    let start_time = Instant::now();
    let log = TransitionLog::new();
    let control = ControlLoop::with_log(&config, actuator, log.clone())?;

    info!(
        "session {:?} starting: {} raw events, debounce {:?}, on {:?}, off {:?}",
        config.session_name,
        config.trace.len(),
        config.debounce_window(),
        config.activation_delay(),
        config.deactivation_delay()
    );

    control.enable();
    for event in &config.trace {
        thread::sleep(event.gap());
        control.on_raw_detection(event.detected);
    }
    thread::sleep(config.settle());

    let final_state = control.state();
    control.shutdown();

    let report = SessionReport {
        session_name: config.session_name.clone(),
        mode: "threaded".to_string(),
        elapsed: start_time.elapsed(),
        log,
        diagnostics: control.diagnostics().snapshot(),
        final_state,
    };
    info!("{}", report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ActuatorStatus, DetectionEvent, SimulatedLight};

    #[test]
    fn short_trace_lights_then_releases() {
        let config = ControlLoopConfig {
            debounce_window_ms: 40,
            activation_delay_ms: 10,
            deactivation_delay_ms: 60,
            settle_ms: 300,
            trace: vec![
                DetectionEvent { after_ms: 0, detected: true },
                DetectionEvent { after_ms: 5, detected: false },
                DetectionEvent { after_ms: 5, detected: true },
                DetectionEvent { after_ms: 250, detected: false },
            ],
            ..ControlLoopConfig::default()
        };
        let light = Arc::new(SimulatedLight::new());

        let report = run_session(config, light.clone()).unwrap();

        assert_eq!(report.mode, "threaded");
        assert_eq!(light.enable_calls(), 1);
        assert_eq!(report.final_state.actuator_status, ActuatorStatus::Off);
        assert!(!report.final_state.last_stable_signal);
        assert_eq!(report.diagnostics.raw_events, 4);
        assert_eq!(report.diagnostics.stable_publishes, 2);
        assert!(!light.is_lit());
    }
}
