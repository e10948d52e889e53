//! Drawdown Controller & Auto-Shutdown Policy (C7, §4.7).

use serde::{Deserialize, Serialize};

/// Pure function `multiplier(dd_pct) = clamp(1 - dd_pct/max_dd, 0, 1)`.
#[derive(Debug, Clone, Copy)]
pub struct DrawdownController {
    pub max_dd: f64,
}

impl DrawdownController {
    pub fn multiplier(&self, dd_pct: f64) -> f64 {
        if self.max_dd <= 0.0 {
            return 0.0;
        }
        (1.0 - dd_pct / self.max_dd).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub drawdown_pct: f64,
    pub rolling_sharpe: Option<f64>,
    pub rolling_hit_rate: Option<f64>,
    pub closed_trade_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoShutdownConfig {
    pub max_dd: f64,
    pub sharpe_floor: f64,
    pub hit_rate_floor: f64,
    pub reduction_factor: f64,
    /// Bypasses the Sharpe/hit-rate checks when too few trades exist to
    /// compute them reliably. Default `false` (block); development
    /// environments opt in.
    pub allow_missing_data: bool,
    /// Fraction of `max_dd` above which the softer warning tier engages.
    pub warning_dd_fraction: f64,
    /// Multiplier on the hard floors defining the warning band's ceiling.
    pub warning_band_multiplier: f64,
    pub min_trades_for_metrics: usize,
}

impl Default for AutoShutdownConfig {
    fn default() -> Self {
        Self {
            max_dd: 0.5,
            sharpe_floor: 0.0,
            hit_rate_floor: 0.3,
            reduction_factor: 0.5,
            allow_missing_data: false,
            warning_dd_fraction: 0.8,
            warning_band_multiplier: 1.2,
            min_trades_for_metrics: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ShutdownDecision {
    Normal,
    /// Softer tier: multiplies sizing by `reduction_factor` without hard-stopping.
    Warning { reduction_factor: f64 },
    HardStop,
}

#[derive(Debug, Clone, Copy)]
pub struct AutoShutdownPolicy {
    pub config: AutoShutdownConfig,
}

impl AutoShutdownPolicy {
    fn has_enough_data(&self, metrics: &StrategyMetrics) -> bool {
        metrics.closed_trade_count >= self.config.min_trades_for_metrics
    }

    /// Missing data is a hard stop, not a sizing reduction — mirroring
    /// `original_source/app/backtesting/auto_shutdown.py::should_shutdown`,
    /// which returns `True` outright when `rolling_sharpe is None` and
    /// `allow_missing_data=False`. `should_reduce_size` never examines
    /// missing data at all; its warning bands only apply once this check
    /// has already passed.
    pub fn decide(&self, metrics: &StrategyMetrics) -> ShutdownDecision {
        if !self.has_enough_data(metrics) && !self.config.allow_missing_data {
            return ShutdownDecision::HardStop;
        }

        let warning_dd = self.config.max_dd * self.config.warning_dd_fraction;
        let sharpe_warning_band = self.config.sharpe_floor * self.config.warning_band_multiplier;
        let hit_rate_warning_band = self.config.hit_rate_floor * self.config.warning_band_multiplier;

        let sharpe_in_warning = metrics
            .rolling_sharpe
            .map(|s| s < sharpe_warning_band && s >= self.config.sharpe_floor)
            .unwrap_or(false);
        let hit_rate_in_warning = metrics
            .rolling_hit_rate
            .map(|h| h < hit_rate_warning_band && h >= self.config.hit_rate_floor)
            .unwrap_or(false);
        let dd_in_warning = metrics.drawdown_pct >= warning_dd && metrics.drawdown_pct < self.config.max_dd;

        if dd_in_warning || sharpe_in_warning || hit_rate_in_warning {
            return ShutdownDecision::Warning { reduction_factor: self.config.reduction_factor };
        }

        if metrics.drawdown_pct >= self.config.max_dd {
            return ShutdownDecision::HardStop;
        }
        let sharpe_breached = metrics.rolling_sharpe.map(|s| s < self.config.sharpe_floor).unwrap_or(false);
        let hit_rate_breached = metrics.rolling_hit_rate.map(|h| h < self.config.hit_rate_floor).unwrap_or(false);
        if sharpe_breached || hit_rate_breached {
            return ShutdownDecision::HardStop;
        }

        ShutdownDecision::Normal
    }
}
