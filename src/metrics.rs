//! Process-wide compilation metrics.
//!
//! Lowering durations are recorded from any thread into a single set of
//! atomic counters. Only successful emissions are recorded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static LOWERING_COUNT: AtomicU64 = AtomicU64::new(0);
static LOWERING_TOTAL_US: AtomicU64 = AtomicU64::new(0);
static LOWERING_MAX_US: AtomicU64 = AtomicU64::new(0);

/// Snapshot of the lowering-duration metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoweringDurations {
    pub count: u64,
    pub total_us: u64,
    pub max_us: u64,
}

impl LoweringDurations {
    pub fn mean_us(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_us / self.count
        }
    }
}

pub fn record_lowering_duration(elapsed: Duration) {
    let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    LOWERING_COUNT.fetch_add(1, Ordering::Relaxed);
    LOWERING_TOTAL_US.fetch_add(us, Ordering::Relaxed);
    LOWERING_MAX_US.fetch_max(us, Ordering::Relaxed);
}

pub fn lowering_durations() -> LoweringDurations {
    LoweringDurations {
        count: LOWERING_COUNT.load(Ordering::Relaxed),
        total_us: LOWERING_TOTAL_US.load(Ordering::Relaxed),
        max_us: LOWERING_MAX_US.load(Ordering::Relaxed),
    }
}
