//! Scheduler lifecycle state and cycle counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Created, not started.
    Idle,
    /// Preparing per-source locks before the first cycle.
    Initializing,
    /// Reading sources.
    CycleRunning,
    /// Waiting for the next cycle.
    Pacing,
    /// Stopped; no further results are produced.
    Stopped,
}

impl SchedulerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulerState::Stopped)
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "Idle"),
            SchedulerState::Initializing => write!(f, "Initializing"),
            SchedulerState::CycleRunning => write!(f, "CycleRunning"),
            SchedulerState::Pacing => write!(f, "Pacing"),
            SchedulerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Cycle counters shared between the run loop and its handle.
#[derive(Debug, Default)]
pub(crate) struct CycleCounters {
    emitted: AtomicU64,
    timed_out: AtomicU64,
}

impl CycleCounters {
    pub(crate) fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_emitted: self.emitted.load(Ordering::Relaxed),
            cycles_timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Statistics of a running or stopped schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Cycles that completed within the deadline and produced a result.
    pub cycles_emitted: u64,
    /// Cycles that missed the deadline and produced nothing.
    pub cycles_timed_out: u64,
}
