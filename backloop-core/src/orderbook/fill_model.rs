//! Fill model (C2, §4.2) — additive slippage, fill-probability scoring, and
//! an "optimal split" suggestion for clips that would exhaust too much depth.

use crate::domain::candle::Candle;
use crate::domain::order::OrderSide;
use crate::domain::orderbook_snapshot::{BookSide, OrderBookSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ImpactFunction {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DepthMethod {
    NotionalAtSpread,
    CumulativeQtyAtSpread,
    DistanceWeighted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FillModelConfig {
    pub alpha: f64,
    pub beta: f64,
    pub impact_fn: ImpactFunction,
    pub depth_method: DepthMethod,
    /// Half-spread fallback (as a fraction of mid) used when no book is
    /// available; default 0.1% per §4.2's edge-case table.
    pub default_half_spread: f64,
    /// Fraction of available depth a single clip may consume before
    /// `optimal_split` suggests breaking the order up.
    pub max_depth_fraction: f64,
}

impl Default for FillModelConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.5,
            impact_fn: ImpactFunction::Linear,
            depth_method: DepthMethod::NotionalAtSpread,
            default_half_spread: 0.001,
            max_depth_fraction: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlippageEstimate {
    pub half_spread: f64,
    pub impact: f64,
    pub vol_component: f64,
    /// Sum of the three terms, expressed as a fraction of mid price.
    pub total: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct FillModel {
    config: FillModelConfig,
}

impl FillModel {
    pub fn new(config: FillModelConfig) -> Self {
        Self { config }
    }

    fn book_side_for(side: OrderSide) -> BookSide {
        match side {
            OrderSide::Buy => BookSide::Ask,
            OrderSide::Sell => BookSide::Bid,
        }
    }

    fn vol_estimate(bar: &Candle) -> f64 {
        bar.atr
            .map(|atr| atr / bar.close.max(1e-9))
            .unwrap_or_else(|| (bar.high - bar.low) / bar.close.max(1e-9))
    }

    fn depth_estimate(&self, bar: &Candle, book: Option<&OrderBookSnapshot>, side: OrderSide) -> f64 {
        let book_side = Self::book_side_for(side);
        match book {
            Some(book) => match self.config.depth_method {
                DepthMethod::NotionalAtSpread => book.side(book_side).first().map(|l| l.price * l.qty).unwrap_or(0.0),
                DepthMethod::CumulativeQtyAtSpread => match book.mid() {
                    Some(mid) => book.depth_at_price(mid, book_side) * mid,
                    None => 0.0,
                },
                DepthMethod::DistanceWeighted => book
                    .side(book_side)
                    .iter()
                    .enumerate()
                    .map(|(i, l)| l.price * l.qty / (1.0 + i as f64))
                    .sum(),
            },
            // No book: use bar dollar volume as a liquidity proxy.
            None => bar.volume * bar.close,
        }
    }

    /// `slippage = half_spread + alpha*impact(notional,depth) + beta*vol_est` (§4.2).
    pub fn estimate_slippage(&self, bar: &Candle, book: Option<&OrderBookSnapshot>, qty: f64, side: OrderSide) -> SlippageEstimate {
        let mid = book.and_then(|b| b.mid()).unwrap_or(bar.close);
        if mid <= 0.0 {
            return SlippageEstimate { half_spread: 0.0, impact: 0.0, vol_component: 0.0, total: 0.0 };
        }
        let half_spread = match book.and_then(|b| b.spread()) {
            Some(spread) => spread / (2.0 * mid),
            None => self.config.default_half_spread,
        };
        let notional = qty * mid;
        let depth = self.depth_estimate(bar, book, side);
        let impact = if depth <= 0.0 {
            1.0
        } else {
            match self.config.impact_fn {
                ImpactFunction::Linear => (notional / depth).min(1.0),
                ImpactFunction::Exponential => 1.0 - (-notional / depth).exp(),
            }
        };
        let vol_component = self.config.beta * Self::vol_estimate(bar);
        let total = half_spread + self.config.alpha * impact + vol_component;
        SlippageEstimate { half_spread, impact, vol_component, total }
    }

    /// Exponential decay of book-depth utilisation combined with a
    /// volatility penalty (§4.2).
    pub fn fill_probability(&self, requested_qty: f64, book: Option<&OrderBookSnapshot>, bar: &Candle, side: OrderSide) -> f64 {
        let book_side = Self::book_side_for(side);
        let available = book.map(|b| b.side(book_side).iter().map(|l| l.qty).sum::<f64>()).unwrap_or(bar.volume);
        let util = if available <= 0.0 { 1.0 } else { (requested_qty / available).min(1.0) };
        let depth_term = (-2.0 * util).exp();
        let vol_term = (1.0 - self.config.beta * Self::vol_estimate(bar)).max(0.0);
        depth_term * vol_term
    }

    /// Suggests clip sizes when a single fill would consume more than
    /// `max_depth_fraction` of available depth. `None` means no split needed.
    pub fn optimal_split(&self, requested_qty: f64, book: &OrderBookSnapshot, side: OrderSide) -> Option<Vec<f64>> {
        let book_side = Self::book_side_for(side);
        let available: f64 = book.side(book_side).iter().map(|l| l.qty).sum();
        if available <= 0.0 {
            return None;
        }
        let threshold = available * self.config.max_depth_fraction;
        if requested_qty <= threshold {
            return None;
        }
        let clip_size = threshold.max(1e-9);
        let mut remaining = requested_qty;
        let mut clips = Vec::new();
        while remaining > 1e-9 {
            let clip = clip_size.min(remaining);
            clips.push(clip);
            remaining -= clip;
        }
        Some(clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orderbook_snapshot::BookLevel;
    use chrono::{TimeZone, Utc};

    fn bar() -> Candle {
        Candle::new(Utc.timestamp_opt(0, 0).unwrap(), 100.0, 101.0, 99.0, 100.5, 10_000.0)
    }

    fn book() -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            Utc.timestamp_opt(0, 0).unwrap(),
            "SPY",
            "SIM",
            vec![BookLevel { price: 99.9, qty: 100.0 }],
            vec![BookLevel { price: 100.1, qty: 100.0 }],
        )
        .unwrap()
    }

    #[test]
    fn missing_book_falls_back_to_default_half_spread() {
        let model = FillModel::new(FillModelConfig::default());
        let estimate = model.estimate_slippage(&bar(), None, 10.0, OrderSide::Buy);
        assert!((estimate.half_spread - 0.001).abs() < 1e-12);
    }

    #[test]
    fn zero_depth_clamps_impact_to_one() {
        let mut config = FillModelConfig::default();
        config.depth_method = DepthMethod::NotionalAtSpread;
        let model = FillModel::new(config);
        let empty_book = OrderBookSnapshot::new(Utc.timestamp_opt(0, 0).unwrap(), "SPY", "SIM", vec![], vec![]).unwrap();
        let estimate = model.estimate_slippage(&bar(), Some(&empty_book), 10.0, OrderSide::Buy);
        assert_eq!(estimate.impact, 1.0);
    }

    #[test]
    fn non_positive_mid_returns_neutral_result() {
        let model = FillModel::new(FillModelConfig::default());
        let mut void_bar = bar();
        void_bar.close = 0.0;
        let estimate = model.estimate_slippage(&void_bar, None, 10.0, OrderSide::Buy);
        assert_eq!(estimate.total, 0.0);
    }

    #[test]
    fn optimal_split_suggests_clips_for_large_orders() {
        let model = FillModel::new(FillModelConfig::default());
        let clips = model.optimal_split(80.0, &book(), OrderSide::Buy).unwrap();
        assert!(clips.iter().sum::<f64>() - 80.0 < 1e-9);
        assert!(clips.iter().all(|c| *c <= 25.0 + 1e-9));
    }

    #[test]
    fn optimal_split_is_none_for_small_orders() {
        let model = FillModel::new(FillModelConfig::default());
        assert!(model.optimal_split(5.0, &book(), OrderSide::Buy).is_none());
    }
}
