use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::diagnostics::DiagnosticsSnapshot;
use crate::{ControlLoopState, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Applied,
    Faulted,
    /// Replaced by a newer request before its delay expired.
    Superseded,
    /// Dropped by an explicit cancel, disable or shutdown.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub seq: u64,
    pub elapsed_ms: u64,
    pub transition: Transition,
    pub outcome: Outcome,
}

/// Thread-safe log of what happened to each requested transition.
/// Clones share the same records.
#[derive(Clone)]
pub struct TransitionLog {
    records: Arc<Mutex<Vec<TransitionRecord>>>,
    next_seq: Arc<AtomicU64>,
    start_time: Instant,
}

impl Default for TransitionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::with_capacity(256))),
            next_seq: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, transition: Transition, outcome: Outcome) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let elapsed_ms = self.start_time.elapsed().as_millis() as u64;
        self.lock().push(TransitionRecord {
            seq,
            elapsed_ms,
            transition,
            outcome,
        });
    }

    pub fn get_results(&self) -> Vec<TransitionRecord> {
        self.lock().clone()
    }

    pub fn count(&self, transition: Transition, outcome: Outcome) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.transition == transition && r.outcome == outcome)
            .count()
    }

    pub fn count_outcome(&self, outcome: Outcome) -> usize {
        self.lock().iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn save_to_csv(&self, filename: &str) -> Result<(), csv::Error> {
        let data = self.lock();
        let mut wtr = csv::Writer::from_path(filename)?;
        for record in data.iter() {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        log::info!("saved {} transition records to {}", data.len(), filename);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TransitionRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of replaying one detection trace through a control loop.
#[derive(Clone)]
pub struct SessionReport {
    pub session_name: String,
    pub mode: String,
    pub elapsed: Duration,
    pub log: TransitionLog,
    pub diagnostics: DiagnosticsSnapshot,
    pub final_state: ControlLoopState,
}

impl SessionReport {
    pub fn summary(&self) -> String {
        let applied = self.log.count_outcome(Outcome::Applied);
        let faulted = self.log.count_outcome(Outcome::Faulted);
        let dropped = self.log.count_outcome(Outcome::Superseded)
            + self.log.count_outcome(Outcome::Cancelled);
        format!(
            "{} [{}]: {} raw events -> {} stable publishes -> {} applied, {} faulted, {} dropped transitions in {:.2}s",
            self.session_name,
            self.mode,
            self.diagnostics.raw_events,
            self.diagnostics.stable_publishes,
            applied,
            faulted,
            dropped,
            self.elapsed.as_secs_f64()
        )
    }
}
