//! Console logger for the binaries.
//!
//! Lines carry the elapsed time since start in a fixed-width column,
//! the same layout the session reports use.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct ConsoleLogger {
    start_time: Instant,
}

static LOGGER: OnceLock<ConsoleLogger> = OnceLock::new();

impl ConsoleLogger {
    pub fn format_line(&self, record: &Record<'_>) -> String {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        format!(
            "[{:>8}] [{}] {}: {}",
            format!("{:.3}s", elapsed),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.format_line(record);
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Installs the console logger. Verbose output (`Debug`) when
/// `enable_logging` is set, warnings only otherwise. Calling it again
/// just adjusts the level.
pub fn init(enable_logging: bool) -> Result<(), SetLoggerError> {
    let level = if enable_logging {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    log::set_max_level(level);

    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| ConsoleLogger {
        start_time: Instant::now(),
    });
    log::set_logger(logger)
}
