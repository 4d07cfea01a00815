use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default, Debug)]
pub struct SharedDiagnostics {
    pub raw_events: AtomicU64,
    pub stable_publishes: AtomicU64,
    pub transitions_applied: AtomicU64,
    pub transitions_superseded: AtomicU64,
    pub transitions_cancelled: AtomicU64,
    pub actuator_faults: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DiagnosticsSnapshot {
    pub raw_events: u64,
    pub stable_publishes: u64,
    pub transitions_applied: u64,
    pub transitions_superseded: u64,
    pub transitions_cancelled: u64,
    pub actuator_faults: u64,
}

impl SharedDiagnostics {
    pub fn record_raw_event(&self) {
        self.raw_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stable_publish(&self) {
        self.stable_publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_applied(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_superseded(&self) {
        self.transitions_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.transitions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.actuator_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            raw_events: self.raw_events.load(Ordering::Relaxed),
            stable_publishes: self.stable_publishes.load(Ordering::Relaxed),
            transitions_applied: self.transitions_applied.load(Ordering::Relaxed),
            transitions_superseded: self.transitions_superseded.load(Ordering::Relaxed),
            transitions_cancelled: self.transitions_cancelled.load(Ordering::Relaxed),
            actuator_faults: self.actuator_faults.load(Ordering::Relaxed),
        }
    }
}
