//! Scripted stand-in for the presence detector.
//!
//! A trace is a list of raw detection events, each delivered `after_ms`
//! after the previous one. Gaps of zero model back-to-back bursts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub after_ms: u64,
    pub detected: bool,
}

impl DetectionEvent {
    pub fn gap(&self) -> Duration {
        Duration::from_millis(self.after_ms)
    }
}

/// Someone walks in past a flickering detector, briefly drops out of
/// frame, then leaves with one stray positive on the way out. The
/// detector reports changes, not every frame.
pub fn flicker_scenario() -> Vec<DetectionEvent> {
    let steps: [(u64, bool); 10] = [
        // arrival: flicker before locking on
        (300, true),
        (40, false),
        (40, true),
        (40, false),
        (40, true),
        // dropout shorter than the debounce window
        (1500, false),
        (200, true),
        // departure
        (1500, false),
        (120, true),
        (0, false),
    ];
    steps
        .into_iter()
        .map(|(after_ms, detected)| DetectionEvent { after_ms, detected })
        .collect()
}

/// Sum of all gaps in a trace.
pub fn trace_duration(trace: &[DetectionEvent]) -> Duration {
    trace.iter().map(DetectionEvent::gap).sum()
}
