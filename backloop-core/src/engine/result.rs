//! `BacktestResult` assembly (§6) — the single value `Engine::run` returns
//! on success.

use crate::analytics::{TrackingError, TrackingErrorPoint};
use crate::domain::ids::DatasetHash;
use crate::domain::trade_fill::TradeFill;
use crate::execution::FallbackWarning;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::state::{EquityPoint, InvalidSignalWarning, PeriodicReturns, RejectedOrder};
use super::temporal::TemporalValidation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionReliability {
    Ok,
    Degraded,
    Unreliable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityDivergenceMetrics {
    pub max_pct: f64,
    pub min_pct: f64,
    pub avg_pct: f64,
}

impl EquityDivergenceMetrics {
    pub fn from_curve(curve: &[EquityPoint]) -> Self {
        if curve.is_empty() {
            return Self { max_pct: f64::NAN, min_pct: f64::NAN, avg_pct: f64::NAN };
        }
        let mut max_pct = f64::NEG_INFINITY;
        let mut min_pct = f64::INFINITY;
        let mut sum = 0.0;
        for point in curve {
            max_pct = max_pct.max(point.divergence_pct);
            min_pct = min_pct.min(point.divergence_pct);
            sum += point.divergence_pct;
        }
        Self { max_pct, min_pct, avg_pct: sum / curve.len() as f64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultExecutionStats {
    pub partial_fills: u64,
    pub rejected_orders: Vec<RejectedOrder>,
    pub orderbook_fallback_count: u64,
    pub orderbook_fallback_pct: f64,
    pub warnings: Vec<FallbackWarning>,
    pub alerts: Vec<InvalidSignalWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub symbol: String,
    pub interval: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub trades: Vec<TradeFill>,
    pub equity_curve: Vec<EquityPoint>,
    pub equity_divergence_metrics: EquityDivergenceMetrics,
    pub returns_per_period: PeriodicReturns,
    pub data_hash: DatasetHash,
    pub seed: Option<u64>,
    pub temporal_validation: TemporalValidation,
    pub execution_stats: ResultExecutionStats,
    pub execution_reliability: ExecutionReliability,
    pub tracking_error: TrackingError,
    pub tracking_error_series: Vec<TrackingErrorPoint>,
    pub tracking_error_cumulative: Vec<f64>,
    pub metadata: HashMap<String, Value>,
}
