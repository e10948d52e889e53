//! Error taxonomy (§7): input errors, integrity failures, and the top-level
//! union the engine's `run()` returns. Data-quality warnings and policy
//! outcomes are not errors — they accumulate on `BacktestState`/`ExecutionStats`
//! (see `engine::state` and `engine::result`) instead of propagating here.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Caller-addressable errors: bad input, malformed signals, invalid request
/// parameters. Returned structurally; never a process abort.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("candle series has no timestamp column")]
    MissingTimestampColumn,

    #[error("no data in requested range")]
    NoDataInRange,

    #[error("invalid signal: {reason}")]
    InvalidSignal { reason: String },

    #[error("stop {stop} is not below entry {entry} for a long position")]
    StopBelowEntryForLong { entry: f64, stop: f64 },

    #[error("stop {stop} is not above entry {entry} for a short position")]
    StopAboveEntryForShort { entry: f64, stop: f64 },
}

/// A logic bug in data or code. Chronological violations and invariant
/// breaches abort the run — these are never recoverable mid-run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrityError {
    #[error("bar at {ts} is not strictly after the previous bar at {previous_ts}")]
    NonChronological {
        ts: DateTime<Utc>,
        previous_ts: DateTime<Utc>,
    },

    #[error("invariant {name} violated: {detail}")]
    InvariantViolated { name: &'static str, detail: String },
}

/// Top-level error union returned by `engine::run`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BacktestError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

pub type Result<T> = std::result::Result<T, BacktestError>;
