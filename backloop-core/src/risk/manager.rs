//! Unified Risk Manager (C7, §4.7) — composes a sizer, a drawdown
//! controller, and a shutdown policy, and enforces portfolio-level limits.

use super::drawdown::{AutoShutdownPolicy, DrawdownController, ShutdownDecision, StrategyMetrics};
use super::sizers::{RiskSizer, SizingContext};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExistingPosition {
    pub symbol_index: usize,
    pub notional: f64,
    pub is_long: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioLimits {
    pub exposure_cap: f64,
    pub concentration_pct: f64,
    pub correlation_max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitsOutcome {
    pub allowed: bool,
    pub violations: Vec<String>,
}

pub struct UnifiedRiskManager {
    sizer: Box<dyn RiskSizer>,
    drawdown_controller: DrawdownController,
    shutdown_policy: AutoShutdownPolicy,
    peak_equity: f64,
    current_drawdown_pct: f64,
}

impl UnifiedRiskManager {
    pub fn new(sizer: Box<dyn RiskSizer>, drawdown_controller: DrawdownController, shutdown_policy: AutoShutdownPolicy, initial_equity: f64) -> Self {
        Self { sizer, drawdown_controller, shutdown_policy, peak_equity: initial_equity, current_drawdown_pct: 0.0 }
    }

    /// Refreshes peak equity and cached drawdown from the latest equity
    /// mark; `trades` informs the shutdown policy's rolling metrics.
    pub fn update_drawdown(&mut self, equity: f64, _metrics: &StrategyMetrics) -> f64 {
        self.peak_equity = self.peak_equity.max(equity);
        self.current_drawdown_pct = if self.peak_equity > 0.0 { ((self.peak_equity - equity) / self.peak_equity).max(0.0) } else { 0.0 };
        self.current_drawdown_pct
    }

    /// Full sizing pipeline with a shutdown override to zero.
    pub fn size_trade(&self, equity: f64, entry: f64, stop: f64, ctx: &SizingContext, metrics: &StrategyMetrics) -> f64 {
        match self.shutdown_policy.decide(metrics) {
            ShutdownDecision::HardStop => 0.0,
            ShutdownDecision::Warning { reduction_factor } => {
                let dd_mult = self.drawdown_controller.multiplier(self.current_drawdown_pct);
                self.sizer.size(equity, entry, stop, ctx) * dd_mult * reduction_factor
            }
            ShutdownDecision::Normal => {
                let dd_mult = self.drawdown_controller.multiplier(self.current_drawdown_pct);
                self.sizer.size(equity, entry, stop, ctx) * dd_mult
            }
        }
    }

    /// Enforces gross exposure, per-symbol concentration, and correlation
    /// limits against a candidate trade's notional.
    pub fn apply_limits(
        &self,
        candidate_symbol_index: usize,
        candidate_notional: f64,
        candidate_is_long: bool,
        equity: f64,
        existing: &[ExistingPosition],
        corr_matrix: &HashMap<(usize, usize), f64>,
        limits: &PortfolioLimits,
    ) -> LimitsOutcome {
        let mut violations = Vec::new();

        let gross: f64 = existing.iter().map(|p| p.notional).sum::<f64>() + candidate_notional;
        if equity > 0.0 && gross > equity * limits.exposure_cap {
            violations.push(format!("gross exposure {gross:.2} exceeds cap {:.2}", equity * limits.exposure_cap));
        }

        let symbol_notional: f64 = existing.iter().filter(|p| p.symbol_index == candidate_symbol_index).map(|p| p.notional).sum::<f64>() + candidate_notional;
        if equity > 0.0 && symbol_notional > equity * limits.concentration_pct {
            violations.push(format!("symbol concentration {symbol_notional:.2} exceeds cap {:.2}", equity * limits.concentration_pct));
        }

        for position in existing {
            if position.is_long != candidate_is_long {
                continue;
            }
            let key = if position.symbol_index <= candidate_symbol_index {
                (position.symbol_index, candidate_symbol_index)
            } else {
                (candidate_symbol_index, position.symbol_index)
            };
            if let Some(rho) = corr_matrix.get(&key) {
                if rho.abs() > limits.correlation_max {
                    violations.push(format!("correlation {rho:.2} with symbol {} exceeds cap {:.2}", position.symbol_index, limits.correlation_max));
                }
            }
        }

        LimitsOutcome { allowed: violations.is_empty(), violations }
    }
}
