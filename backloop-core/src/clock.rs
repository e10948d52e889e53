//! Clock — the only port through which wall-clock time may enter the core.
//!
//! The engine never reads wall-clock time to drive the simulation; bar
//! timestamps come entirely from the `CandleSeries`. `Clock` exists solely
//! to stamp result metadata (`run_at`) so that reruns are still inspectable.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests and reproducible runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
