//! Risk sizers, drawdown control, auto-shutdown, and the unified manager
//! that composes them (C6, C7).

pub mod drawdown;
pub mod manager;
pub mod sizers;

pub use drawdown::{AutoShutdownConfig, AutoShutdownPolicy, DrawdownController, ShutdownDecision, StrategyMetrics};
pub use manager::{ExistingPosition, LimitsOutcome, PortfolioLimits, UnifiedRiskManager};
pub use sizers::{
    kelly_diagnostics, AdaptiveRegimeSizer, CombinedSizer, FixedRiskSizer, KellyDiagnostics, KellyTruncatedSizer, RegimeProbabilities, RiskSizer,
    SizingContext, VolatilityTargetingSizer,
};
