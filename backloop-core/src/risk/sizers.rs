//! Risk sizers (C6, §4.6). All share the contract
//! `size(equity, entry, stop, ctx) -> units >= 0`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeProbabilities {
    pub calm: f64,
    pub balanced: f64,
    pub stress: f64,
}

/// Shared inputs the richer sizers (adaptive-regime, Kelly, volatility
/// targeting) pull from; a plain fixed-risk sizer ignores all of it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SizingContext {
    pub regime: Option<RegimeProbabilities>,
    pub win_rate: Option<f64>,
    pub payoff_ratio: Option<f64>,
    pub realized_vol: Option<f64>,
    pub current_drawdown_pct: Option<f64>,
}

pub trait RiskSizer: Send + Sync {
    fn size(&self, equity: f64, entry: f64, stop: f64, ctx: &SizingContext) -> f64;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedRiskSizer {
    pub risk_pct: f64,
    pub min_size: f64,
    pub max_size: Option<f64>,
}

impl FixedRiskSizer {
    fn raw_units(&self, equity: f64, entry: f64, stop: f64) -> f64 {
        let risk_distance = (entry - stop).abs();
        if risk_distance <= 0.0 {
            return 0.0;
        }
        let units = (equity * self.risk_pct) / risk_distance;
        units.clamp(self.min_size, self.max_size.unwrap_or(f64::INFINITY))
    }
}

impl RiskSizer for FixedRiskSizer {
    fn size(&self, equity: f64, entry: f64, stop: f64, _ctx: &SizingContext) -> f64 {
        self.raw_units(equity, entry, stop)
    }

    fn name(&self) -> &str {
        "fixed_risk"
    }
}

/// Blends `risk_pct` by a convex combination of regime probabilities before
/// delegating to the fixed-risk formula.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveRegimeSizer {
    pub base_risk_pct: f64,
    pub calm_multiplier: f64,
    pub balanced_multiplier: f64,
    pub stress_multiplier: f64,
    pub min_size: f64,
    pub max_size: Option<f64>,
}

impl RiskSizer for AdaptiveRegimeSizer {
    fn size(&self, equity: f64, entry: f64, stop: f64, ctx: &SizingContext) -> f64 {
        let regime = ctx.regime.unwrap_or(RegimeProbabilities { calm: 1.0, balanced: 0.0, stress: 0.0 });
        let blended_multiplier =
            regime.calm * self.calm_multiplier + regime.balanced * self.balanced_multiplier + regime.stress * self.stress_multiplier;
        let effective = FixedRiskSizer {
            risk_pct: self.base_risk_pct * blended_multiplier,
            min_size: self.min_size,
            max_size: self.max_size,
        };
        effective.raw_units(equity, entry, stop)
    }

    fn name(&self) -> &str {
        "adaptive_regime"
    }
}

/// `kelly = p - (1-p)/b`, per the glossary's Kelly-truncated fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyDiagnostics {
    /// Untruncated Kelly fraction; negative means no edge.
    pub full_fraction: f64,
    /// `full_fraction * cap`, clamped to `[0, max_fraction]`.
    pub applied_fraction: f64,
}

pub fn kelly_diagnostics(win_rate: f64, payoff_ratio: f64, cap: f64, max_fraction: f64) -> KellyDiagnostics {
    if payoff_ratio <= 0.0 {
        return KellyDiagnostics { full_fraction: 0.0, applied_fraction: 0.0 };
    }
    let full_fraction = win_rate - (1.0 - win_rate) / payoff_ratio;
    let applied_fraction = (full_fraction * cap).clamp(0.0, max_fraction);
    KellyDiagnostics { full_fraction, applied_fraction }
}

#[derive(Debug, Clone, Copy)]
pub struct KellyTruncatedSizer {
    pub cap: f64,
    pub max_fraction: f64,
    pub min_size: f64,
    pub max_size: Option<f64>,
}

impl KellyTruncatedSizer {
    pub fn diagnostics(&self, ctx: &SizingContext) -> KellyDiagnostics {
        let p = ctx.win_rate.unwrap_or(0.0);
        let b = ctx.payoff_ratio.unwrap_or(1.0);
        kelly_diagnostics(p, b, self.cap, self.max_fraction)
    }
}

impl RiskSizer for KellyTruncatedSizer {
    fn size(&self, equity: f64, entry: f64, _stop: f64, ctx: &SizingContext) -> f64 {
        if entry <= 0.0 {
            return 0.0;
        }
        let applied = self.diagnostics(ctx).applied_fraction;
        if applied <= 0.0 {
            return 0.0;
        }
        let units = (equity * applied) / entry;
        units.clamp(self.min_size, self.max_size.unwrap_or(f64::INFINITY))
    }

    fn name(&self) -> &str {
        "kelly_truncated"
    }
}

/// Scales a wrapped sizer's output by `target_vol / realised_vol`, clamped
/// to `[min_scale, max_scale]`.
pub struct VolatilityTargetingSizer {
    pub base: Box<dyn RiskSizer>,
    pub target_vol: f64,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl RiskSizer for VolatilityTargetingSizer {
    fn size(&self, equity: f64, entry: f64, stop: f64, ctx: &SizingContext) -> f64 {
        let base_size = self.base.size(equity, entry, stop, ctx);
        let realized_vol = match ctx.realized_vol {
            Some(v) if v > 0.0 => v,
            _ => return base_size,
        };
        let scale = (self.target_vol / realized_vol).clamp(self.min_scale, self.max_scale);
        base_size * scale
    }

    fn name(&self) -> &str {
        "volatility_targeting"
    }
}

/// Fixed-risk base, optionally floored by Kelly (element-wise min), then
/// volatility-scaled, then drawdown-attenuated (§4.6, §4.7).
pub struct CombinedSizer {
    pub fixed: FixedRiskSizer,
    pub kelly_floor: Option<KellyTruncatedSizer>,
    pub vol_target: Option<(f64, f64, f64)>,
    pub drawdown_multiplier: f64,
}

impl RiskSizer for CombinedSizer {
    fn size(&self, equity: f64, entry: f64, stop: f64, ctx: &SizingContext) -> f64 {
        let mut size = self.fixed.size(equity, entry, stop, ctx);
        if let Some(kelly) = &self.kelly_floor {
            size = size.min(kelly.size(equity, entry, stop, ctx));
        }
        if let Some((target_vol, min_scale, max_scale)) = self.vol_target {
            if let Some(realized) = ctx.realized_vol.filter(|v| *v > 0.0) {
                size *= (target_vol / realized).clamp(min_scale, max_scale);
            }
        }
        (size * self.drawdown_multiplier).max(0.0)
    }

    fn name(&self) -> &str {
        "combined"
    }
}
