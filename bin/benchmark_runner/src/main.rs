use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use criterion::{black_box, Criterion};
use log::info;

use common::config::{load_config, ControlLoopConfig};
use common::detector::trace_duration;
use common::{Outcome, SessionReport, SimulatedLight, Transition, TransitionRecord};

fn analyze_results_detailed(report: &SessionReport, name: &str) {
    let records = report.log.get_results();
    if records.is_empty() {
        println!("{}: No transitions to analyze", name);
        return;
    }

    let total = records.len();
    let applied = report.log.count_outcome(Outcome::Applied);
    let faulted = report.log.count_outcome(Outcome::Faulted);
    let dropped = report.log.count_outcome(Outcome::Superseded)
        + report.log.count_outcome(Outcome::Cancelled);

    println!("\n=== {} Detailed Analysis ===", name);
    println!("{}", report.summary());
    println!("Transitions requested: {}", total);
    println!(
        "Applied: {} ({:.2}%), faulted: {}, superseded/cancelled: {}",
        applied,
        applied as f64 / total as f64 * 100.0,
        faulted,
        dropped
    );

    let d = &report.diagnostics;
    let collapse = if d.stable_publishes > 0 {
        d.raw_events as f64 / d.stable_publishes as f64
    } else {
        0.0
    };
    println!(
        "Raw events: {}, stable publishes: {} ({:.1} raw per publish)",
        d.raw_events, d.stable_publishes, collapse
    );

    println!("\nPer transition:");
    for transition in [Transition::Activate, Transition::Deactivate] {
        let of_kind: Vec<&TransitionRecord> = records
            .iter()
            .filter(|r| r.transition == transition)
            .collect();
        if of_kind.is_empty() {
            continue;
        }
        let applied = report.log.count(transition, Outcome::Applied);
        println!(
            "  {:?}: {} requested, {:.2}% applied",
            transition,
            of_kind.len(),
            applied as f64 / of_kind.len() as f64 * 100.0
        );
    }

    // time the light spent on, from consecutive applied transitions
    let mut lit_since: Option<u64> = None;
    let mut lit_ms = 0;
    for record in records.iter().filter(|r| r.outcome == Outcome::Applied) {
        match (record.transition, lit_since) {
            (Transition::Activate, None) => lit_since = Some(record.elapsed_ms),
            (Transition::Deactivate, Some(since)) => {
                lit_ms += record.elapsed_ms.saturating_sub(since);
                lit_since = None;
            }
            _ => {}
        }
    }
    println!("Light on for {} ms of {:?}", lit_ms, report.elapsed);
}

fn benchmark_threaded(c: &mut Criterion, config: &ControlLoopConfig) -> Result<()> {
    // long enough that nothing fires while sampling
    let debouncer = threaded_impl::Debouncer::new(Duration::from_secs(3600))
        .context("failed to start debouncer timer thread")?;
    let controller = threaded_impl::ActuatorController::new(
        Arc::new(SimulatedLight::from_config(&config.light)),
        Duration::from_secs(3600),
        Duration::from_secs(3600),
    )
    .context("failed to start actuator timer thread")?;

    let mut raw = false;
    c.bench_function("threaded_observe", |b| {
        b.iter(|| {
            raw = !raw;
            debouncer.observe(black_box(raw));
        });
    });
    c.bench_function("threaded_request", |b| {
        b.iter(|| controller.request(black_box(Transition::Activate)));
    });

    debouncer.shutdown();
    controller.shutdown();
    Ok(())
}

fn benchmark_async(c: &mut Criterion, config: &ControlLoopConfig) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let _guard = rt.enter();
    let debouncer = async_impl::Debouncer::new(Duration::from_secs(3600));
    let controller = async_impl::ActuatorController::new(
        Arc::new(SimulatedLight::from_config(&config.light)),
        Duration::from_secs(3600),
        Duration::from_secs(3600),
    );

    let mut raw = false;
    c.bench_function("async_observe", |b| {
        b.iter(|| {
            raw = !raw;
            debouncer.observe(black_box(raw));
        });
    });
    c.bench_function("async_request", |b| {
        b.iter(|| controller.request(black_box(Transition::Activate)));
    });

    debouncer.shutdown();
    controller.shutdown();
    Ok(())
}

fn run_threaded(config: &ControlLoopConfig) -> Result<()> {
    println!("Running THREADED session...");
    let start = Instant::now();
    let report = threaded_impl::run_session(
        config.clone(),
        Arc::new(SimulatedLight::from_config(&config.light)),
    )
    .context("failed to start timer threads")?;
    println!(
        "Threaded session completed in {:.2} seconds",
        start.elapsed().as_secs_f64()
    );

    analyze_results_detailed(&report, "THREADED");
    report
        .log
        .save_to_csv("threaded_results.csv")
        .context("failed to save threaded CSV")?;
    println!("Results saved to threaded_results.csv");
    Ok(())
}

fn run_async(config: &ControlLoopConfig) -> Result<()> {
    println!("\nRunning ASYNC session...");
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let start = Instant::now();
    let report = rt.block_on(async_impl::run_session(
        config.clone(),
        Arc::new(SimulatedLight::from_config(&config.light)),
    ));
    println!(
        "Async session completed in {:.2} seconds",
        start.elapsed().as_secs_f64()
    );

    analyze_results_detailed(&report, "ASYNC");
    report
        .log
        .save_to_csv("async_results.csv")
        .context("failed to save async CSV")?;
    println!("Results saved to async_results.csv");
    Ok(())
}

/// Picks the implementations to run: an explicit mode argument wins,
/// otherwise the config's `mode`. Returns the mode name and whether the
/// threaded and async paths run.
fn select_modes<'a>(
    arg: Option<&'a str>,
    config: &'a ControlLoopConfig,
) -> Result<(&'a str, bool, bool)> {
    let mode = match arg {
        Some(arg) if !arg.starts_with("--") => arg,
        _ => config.mode.as_str(),
    };
    match mode {
        "threaded" => Ok((mode, true, false)),
        "async" => Ok((mode, false, true)),
        "both" => Ok((mode, true, true)),
        other => bail!("unknown mode {other:?}, expected threaded, async or both"),
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: benchmark_runner <config_file> [threaded|async|both] [--criterion]");
        eprintln!("Without a mode argument the config's `mode` is used.");
        eprintln!("Example: benchmark_runner configs/session_baseline.toml both");
        eprintln!("Example: benchmark_runner configs/session_baseline.toml both --criterion");
        std::process::exit(1);
    }

    let config_path = &args[1];
    let use_criterion = args.iter().any(|a| a == "--criterion");

    let mut config =
        load_config(config_path).with_context(|| format!("failed to load {config_path}"))?;

    // keep the hot path free of log formatting while sampling
    if use_criterion {
        config.enable_logging = false;
    }
    common::logging::init(config.enable_logging).context("failed to install logger")?;
    let (mode, threaded, asynchronous) = select_modes(args.get(2).map(String::as_str), &config)?;

    println!("========================================");
    println!("Presence Light Benchmark");
    println!("========================================");
    println!("Config: {}", config_path);
    println!("Session: {}", config.session_name);
    println!("Debounce window: {} ms", config.debounce_window_ms);
    println!(
        "Delays: on {} ms, off {} ms",
        config.activation_delay_ms, config.deactivation_delay_ms
    );
    println!(
        "Raw events: {} over {:?}",
        config.trace.len(),
        trace_duration(&config.trace)
    );
    println!("Mode: {}", mode);
    if use_criterion {
        println!("Using Criterion for statistical analysis");
        println!("Logging disabled for benchmark validity");
    }
    println!("========================================\n");

    if use_criterion {
        let mut criterion = Criterion::default()
            .sample_size(50)
            .measurement_time(Duration::from_secs(5));

        if threaded {
            println!("Running THREADED statistical benchmarks...");
            benchmark_threaded(&mut criterion, &config)?;
        }
        if asynchronous {
            println!("\nRunning ASYNC statistical benchmarks...");
            benchmark_async(&mut criterion, &config)?;
        }

        println!("\n========================================");
        println!("Criterion statistical analysis complete!");
        println!("Check the target/criterion directory for detailed HTML reports.");
        println!("========================================");
    } else {
        if threaded {
            run_threaded(&config)?;
        }
        if asynchronous {
            run_async(&config)?;
        }

        println!("\n========================================");
        println!("Benchmark complete!");
        println!("========================================");
    }
    info!("benchmark runner finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_file(name: &str) -> ControlLoopConfig {
        let path = format!("{}/../../configs/{name}", env!("CARGO_MANIFEST_DIR"));
        load_config(&path).unwrap()
    }

    #[test]
    fn configured_mode_selects_implementation() {
        let faulty = config_file("faulty_light.toml");
        assert_eq!(select_modes(None, &faulty).unwrap(), ("threaded", true, false));
        assert_eq!(
            select_modes(Some("--criterion"), &faulty).unwrap(),
            ("threaded", true, false)
        );

        let baseline = config_file("session_baseline.toml");
        assert_eq!(select_modes(None, &baseline).unwrap(), ("async", false, true));
    }

    #[test]
    fn explicit_mode_overrides_config() {
        let faulty = config_file("faulty_light.toml");
        assert_eq!(select_modes(Some("both"), &faulty).unwrap(), ("both", true, true));
        assert_eq!(select_modes(Some("async"), &faulty).unwrap(), ("async", false, true));
        assert!(select_modes(Some("fibers"), &faulty).is_err());
    }
}
