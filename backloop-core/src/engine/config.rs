//! Run request and engine-wide configuration (§6).
//!
//! All knobs — sizing caps, gap thresholds, tolerances, fallback
//! thresholds — are fields of a per-run immutable config rather than
//! reloadable global state (§9's "global mutable configuration" redesign).

use crate::execution::ExecutionSimulatorConfig;
use crate::orderbook::fill_model::FillModelConfig;
use crate::risk::{AutoShutdownConfig, FixedRiskSizer, PortfolioLimits, RiskSizer};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    pub fn duration(self) -> Duration {
        match self {
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlippageModel {
    None,
    Fixed,
    Dynamic,
}

/// Temporal-validation thresholds (§4.9 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalValidationConfig {
    /// Multiple of the timeframe above which a gap counts as significant.
    pub significant_gap_multiple: f64,
    /// Fraction of total elapsed time covered by significant gaps above
    /// which the result is tagged `FAILED_TEMPORAL_VALIDATION`.
    pub max_gap_ratio: f64,
    /// When true, a failed temporal validation aborts the run instead of
    /// merely tagging the result.
    pub abort_on_failure: bool,
}

impl Default for TemporalValidationConfig {
    fn default() -> Self {
        Self {
            significant_gap_multiple: 2.0,
            max_gap_ratio: 0.10,
            abort_on_failure: false,
        }
    }
}

/// Per-run immutable engine configuration, separate from the request so a
/// campaign layer may vary simulation knobs without varying the strategy
/// inputs that determinism hashing covers.
pub struct EngineConfig {
    pub temporal: TemporalValidationConfig,
    pub execution: ExecutionSimulatorConfig,
    pub fill_model: FillModelConfig,
    pub shutdown: AutoShutdownConfig,
    pub portfolio_limits: PortfolioLimits,
    pub sizer: Box<dyn RiskSizer>,
    pub max_wait_bars: u32,
    pub bars_per_year: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temporal: TemporalValidationConfig::default(),
            execution: ExecutionSimulatorConfig::default(),
            fill_model: FillModelConfig::default(),
            shutdown: AutoShutdownConfig::default(),
            portfolio_limits: PortfolioLimits { exposure_cap: 1.0, concentration_pct: 1.0, correlation_max: 1.0 },
            sizer: Box::new(FixedRiskSizer { risk_pct: 0.01, min_size: 0.0, max_size: None }),
            max_wait_bars: 20,
            bars_per_year: 252.0,
        }
    }
}

/// One request's worth of run parameters (§6). `strategy` is boxed so the
/// request can be constructed and passed around before the engine takes
/// ownership of it for the run.
pub struct BacktestRunRequest {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub slippage_model: SlippageModel,
    pub fixed_slippage_bps: Option<f64>,
    pub use_orderbook: bool,
    pub seed: Option<u64>,
    pub strategy: Box<dyn Strategy>,
}

impl BacktestRunRequest {
    pub fn commission(&self, notional: f64) -> f64 {
        notional.abs() * self.commission_rate
    }

    pub fn fixed_slippage_fraction(&self) -> f64 {
        match self.slippage_model {
            SlippageModel::Fixed => self.fixed_slippage_bps.unwrap_or(0.0) / 10_000.0,
            SlippageModel::None | SlippageModel::Dynamic => 0.0,
        }
    }
}
