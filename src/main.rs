mod menu;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::warn;

use common::config::{load_config, ControlLoopConfig};
use common::detector::trace_duration;
use common::{Outcome, SessionReport, SimulatedLight, Transition};

const DEFAULT_CONFIG: &str = "configs/session_baseline.toml";

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config = resolve_config(config_path.as_deref())?;
    common::logging::init(config.enable_logging).context("failed to install logger")?;

    println!("===========================================");
    println!("Welcome to the Presence Light Control Loop");
    println!("===========================================");

    loop {
        menu::show_menu()?;

        match menu::get_user_choice()? {
            Some(1) => run_threaded_demo(&config)?,
            Some(2) => run_async_demo(&config)?,
            Some(3) => run_comparison(&config)?,
            Some(4) => run_manual_control(&config)?,
            Some(5) => {
                println!("Goodbye!");
                break;
            }
            _ => println!("Invalid choice. Please select 1-5."),
        }
    }
    Ok(())
}

fn resolve_config(path: Option<&str>) -> Result<ControlLoopConfig> {
    match path {
        Some(path) => load_config(path).with_context(|| format!("loading {path}")),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            load_config(DEFAULT_CONFIG).with_context(|| format!("loading {DEFAULT_CONFIG}"))
        }
        None => {
            warn!("{DEFAULT_CONFIG} not found, using built-in defaults");
            Ok(ControlLoopConfig::default())
        }
    }
}

fn print_config(config: &ControlLoopConfig) {
    println!(
        "Configuration: session {:?} (configured mode: {})",
        config.session_name, config.mode
    );
    println!(
        "Debounce {}ms, on-delay {}ms, off-delay {}ms, {} raw events over {:?}",
        config.debounce_window_ms,
        config.activation_delay_ms,
        config.deactivation_delay_ms,
        config.trace.len(),
        trace_duration(&config.trace)
    );
}

fn run_threaded_demo(config: &ControlLoopConfig) -> Result<()> {
    println!("\n=== Running Threaded Implementation Demo ===");
    print_config(config);

    let light = Arc::new(SimulatedLight::from_config(&config.light));
    let report = threaded_impl::run_session(config.clone(), light)
        .context("failed to start timer threads")?;
    display_report(&report);

    menu::wait_for_enter()?;
    Ok(())
}

fn run_async_demo(config: &ControlLoopConfig) -> Result<()> {
    println!("\n=== Running Async Implementation Demo ===");
    print_config(config);

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let light = Arc::new(SimulatedLight::from_config(&config.light));
    let report = rt.block_on(async_impl::run_session(config.clone(), light));
    display_report(&report);

    menu::wait_for_enter()?;
    Ok(())
}

fn run_comparison(config: &ControlLoopConfig) -> Result<()> {
    println!("\n=== Comparing Implementations (Threaded vs Async) ===");
    print_config(config);

    let threaded_start = Instant::now();
    let threaded = threaded_impl::run_session(
        config.clone(),
        Arc::new(SimulatedLight::from_config(&config.light)),
    )
    .context("failed to start timer threads")?;
    let threaded_elapsed = threaded_start.elapsed();

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let async_start = Instant::now();
    let asynchronous = rt.block_on(async_impl::run_session(
        config.clone(),
        Arc::new(SimulatedLight::from_config(&config.light)),
    ));
    let async_elapsed = async_start.elapsed();

    println!("\n--- Threaded ({:.2}s) ---", threaded_elapsed.as_secs_f64());
    display_report(&threaded);
    println!("\n--- Async ({:.2}s) ---", async_elapsed.as_secs_f64());
    display_report(&asynchronous);

    let same = threaded.log.count_outcome(Outcome::Applied)
        == asynchronous.log.count_outcome(Outcome::Applied)
        && threaded.final_state == asynchronous.final_state;
    println!(
        "\nBehaviour {}",
        if same { "matches ✓" } else { "differs ✗ (timing-sensitive trace?)" }
    );

    menu::wait_for_enter()?;
    Ok(())
}

/// Stands in for the UI: raw detections and the toggle come from the
/// keyboard, status changes are printed as they are published.
fn run_manual_control(config: &ControlLoopConfig) -> Result<()> {
    println!("\n=== Manual Control (async) ===");
    print_config(config);
    menu::show_manual_help();

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let light = Arc::new(SimulatedLight::from_config(&config.light));
    let control = {
        let _guard = rt.enter();
        async_impl::ControlLoop::new(config, light)
    };

    let mut status_rx = control.subscribe_status();
    let status_watcher = rt.spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            println!("\n[light] {status:?}");
        }
    });
    let mut stable_rx = control.subscribe_stable();
    let stable_watcher = rt.spawn(async move {
        while stable_rx.changed().await.is_ok() {
            let present = *stable_rx.borrow_and_update();
            println!("\n[stable] {}", if present { "present" } else { "absent" });
        }
    });

    loop {
        let line = menu::prompt(if control.is_enabled() { "on" } else { "off" })?;
        match line.trim() {
            "p" => control.on_raw_detection(true),
            "a" => control.on_raw_detection(false),
            "f" => {
                for detected in [true, false, true, false, true] {
                    control.on_raw_detection(detected);
                }
            }
            "t" => {
                let enabled = control.toggle();
                println!("control loop {}", if enabled { "enabled" } else { "disabled" });
            }
            "s" => {
                let state = control.state();
                println!(
                    "enabled={} stable={} raw={} light={:?} :: {}",
                    state.enabled,
                    state.last_stable_signal,
                    control.debouncer().current_raw(),
                    state.actuator_status,
                    state.status_text()
                );
            }
            "q" | "" => break,
            other => println!("unknown command {other:?}"),
        }
    }

    control.shutdown();
    status_watcher.abort();
    stable_watcher.abort();
    Ok(())
}

fn display_report(report: &SessionReport) {
    let log = &report.log;
    let records = log.get_results();
    if records.is_empty() {
        println!("No transitions were requested.");
        return;
    }

    println!("\n=== Session Results ===");
    println!("{}", report.summary());
    println!(
        "Final state: enabled={}, stable signal={}, light={:?}",
        report.final_state.enabled,
        report.final_state.last_stable_signal,
        report.final_state.actuator_status
    );

    println!("Transition breakdown:");
    for transition in [Transition::Activate, Transition::Deactivate] {
        println!(
            "- {:?}: {} applied, {} faulted, {} superseded, {} cancelled",
            transition,
            log.count(transition, Outcome::Applied),
            log.count(transition, Outcome::Faulted),
            log.count(transition, Outcome::Superseded),
            log.count(transition, Outcome::Cancelled),
        );
    }

    println!("Timeline:");
    for record in &records {
        println!(
            "  [{:>8}] #{:<3} {:?} {:?}",
            format!("{:.3}s", record.elapsed_ms as f64 / 1000.0),
            record.seq,
            record.transition,
            record.outcome
        );
    }
}
