use std::sync::Arc;

use log::info;
use tokio::time::{sleep, Instant};

use common::{Actuator, ControlLoopConfig, SessionReport, TransitionLog};

use crate::control_loop::ControlLoop;

/// Replays `config.trace` through a fresh control loop and tears it down
/// after `config.settle_ms` of silence.
pub async fn run_session(config: ControlLoopConfig, actuator: Arc<dyn Actuator>) -> SessionReport {
    let start_time = Instant::now();
    let log = TransitionLog::new();
    let control = ControlLoop::with_log(&config, actuator, log.clone());

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
        sleep(event.gap()).await;
        control.on_raw_detection(event.detected);
    }
    sleep(config.settle()).await;

    let final_state = control.state();
    control.shutdown();

    let report = SessionReport {
        session_name: config.session_name.clone(),
        mode: "async".to_string(),
        elapsed: start_time.elapsed(),
        log,
        diagnostics: control.diagnostics().snapshot(),
        final_state,
    };
    info!("{}", report.summary());
    report
}
