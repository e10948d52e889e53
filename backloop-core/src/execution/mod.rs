//! Execution Simulator (C4, §4.4) — routes an order to book-matched or
//! bar-approximated fills and tracks the fallback rate that downstream
//! result assembly tags as `degraded_execution`/`execution_unreliable`.

use crate::domain::candle::Candle;
use crate::domain::order::{FillResult, Order, OrderSide};
use crate::domain::orderbook_snapshot::{BookSide, OrderBookSnapshot};
use crate::orderbook::fill_model::FillModel;
use crate::orderbook::repository::OrderBookRepository;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    Missing,
    EmptySide,
    Stale,
    WideSpread,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackWarning {
    pub ts: DateTime<Utc>,
    pub reason: FallbackReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSimulatorConfig {
    pub snapshot_tolerance: Duration,
    /// Fraction of routed bars falling back to bar approximation above which
    /// a run is tagged `degraded_execution`.
    pub degraded_threshold: f64,
    /// Second, higher threshold escalating to `execution_unreliable`.
    pub unreliable_threshold: f64,
    /// Spread-to-mid ratio above which a present book is still treated as a
    /// `WideSpread` fallback rather than matched against.
    pub max_spread_pct: f64,
}

impl Default for ExecutionSimulatorConfig {
    fn default() -> Self {
        Self {
            snapshot_tolerance: Duration::seconds(30),
            degraded_threshold: 0.20,
            unreliable_threshold: 0.50,
            max_spread_pct: 0.05,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub routed_bars: u64,
    pub orderbook_fallback_count: u64,
    pub warnings: Vec<FallbackWarning>,
}

impl ExecutionStats {
    pub fn fallback_rate(&self) -> f64 {
        if self.routed_bars == 0 {
            0.0
        } else {
            self.orderbook_fallback_count as f64 / self.routed_bars as f64
        }
    }

    pub fn is_degraded(&self, config: &ExecutionSimulatorConfig) -> bool {
        self.fallback_rate() > config.degraded_threshold
    }

    pub fn is_unreliable(&self, config: &ExecutionSimulatorConfig) -> bool {
        self.fallback_rate() > config.unreliable_threshold
    }
}

pub struct ExecutionSimulator {
    config: ExecutionSimulatorConfig,
    fill_model: FillModel,
    stats: ExecutionStats,
}

impl ExecutionSimulator {
    pub fn new(config: ExecutionSimulatorConfig, fill_model: FillModel) -> Self {
        Self { config, fill_model, stats: ExecutionStats::default() }
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    fn relevant_side_empty(book: &OrderBookSnapshot, side: OrderSide) -> bool {
        let book_side = match side {
            OrderSide::Buy => BookSide::Ask,
            OrderSide::Sell => BookSide::Bid,
        };
        book.side(book_side).is_empty()
    }

    fn wide_spread(&self, book: &OrderBookSnapshot) -> bool {
        book.spread_pct().is_some_and(|pct| pct > self.config.max_spread_pct)
    }

    /// Routing rule (§4.4): try a snapshot within tolerance; on any
    /// disqualifying condition, fall back to the bar approximation and
    /// record a structured warning. A snapshot that exists but lies outside
    /// `snapshot_tolerance` is tagged `Stale` rather than `Missing` — the
    /// repository did have book data near `ts`, it was just too old to
    /// trust.
    pub fn route(
        &mut self,
        order: &mut Order,
        bar: &Candle,
        ts: DateTime<Utc>,
        repo: &dyn OrderBookRepository,
    ) -> FillResult {
        self.stats.routed_bars += 1;
        let nearest = repo.nearest(&order.symbol, ts);
        let in_tolerance = nearest.filter(|(_, distance)| *distance <= self.config.snapshot_tolerance).map(|(s, _)| s);
        let reason = match (nearest, in_tolerance) {
            (None, _) => Some(FallbackReason::Missing),
            (Some(_), None) => Some(FallbackReason::Stale),
            (Some(_), Some(book)) if Self::relevant_side_empty(book, order.side) => Some(FallbackReason::EmptySide),
            (Some(_), Some(book)) if self.wide_spread(book) => Some(FallbackReason::WideSpread),
            (Some(_), Some(_)) => None,
        };
        match reason {
            None => order.try_fill(bar, in_tolerance, &self.fill_model),
            Some(reason) => {
                self.stats.orderbook_fallback_count += 1;
                self.stats.warnings.push(FallbackWarning { ts, reason });
                order.try_fill(bar, None, &self.fill_model)
            }
        }
    }
}
