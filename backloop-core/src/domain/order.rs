//! Order — the Market/Limit/Stop tagged sum with a uniform `try_fill`
//! contract (C3, §4.3). Subclass-style order polymorphism in the source is
//! replaced by an exhaustive `match` over `OrderType`; a triggered stop
//! delegates to an embedded market or limit leg rather than mutating into a
//! different class.

use super::candle::Candle;
use super::ids::OrderId;
use super::orderbook_snapshot::{BookLevel, BookSide, OrderBookSnapshot};
use crate::orderbook::fill_model::FillModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { limit_price: f64 },
    Stop { stop_price: f64, limit_price: Option<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Triggered,
    PartiallyFilled,
    Filled,
    Cancelled { reason: String },
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialFill {
    pub price: f64,
    pub qty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillResult {
    pub filled_qty: f64,
    pub avg_price: f64,
    pub slippage_pct: f64,
    pub status: OrderStatus,
    pub partial_fills: Vec<PartialFill>,
}

impl FillResult {
    fn no_fill(status: OrderStatus) -> Self {
        Self {
            filled_qty: 0.0,
            avg_price: 0.0,
            slippage_pct: 0.0,
            status,
            partial_fills: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub requested_qty: f64,
    pub filled_qty: f64,
    pub avg_fill_price: f64,
    pub status: OrderStatus,
    pub age_bars: u32,
    pub max_wait_bars: u32,
    pub created_at: DateTime<Utc>,
    pub history: Vec<PartialFill>,
    /// Whether a `Limit` order may fill its remainder at the limit price
    /// when no book is available (§4.3's "otherwise fill at limit").
    pub fill_partial_without_book: bool,
}

impl Order {
    pub fn new(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        requested_qty: f64,
        created_at: DateTime<Utc>,
        max_wait_bars: u32,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            order_type,
            requested_qty,
            filled_qty: 0.0,
            avg_fill_price: 0.0,
            status: OrderStatus::Pending,
            age_bars: 0,
            max_wait_bars,
            created_at,
            history: Vec::new(),
            fill_partial_without_book: true,
        }
    }

    pub fn remaining_qty(&self) -> f64 {
        (self.requested_qty - self.filled_qty).max(0.0)
    }

    pub fn fill_ratio(&self) -> f64 {
        if self.requested_qty <= 0.0 {
            0.0
        } else {
            self.filled_qty / self.requested_qty
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Triggered | OrderStatus::PartiallyFilled)
    }

    fn book_side_for(&self) -> BookSide {
        match self.side {
            OrderSide::Buy => BookSide::Ask,
            OrderSide::Sell => BookSide::Bid,
        }
    }

    fn record_fill(&mut self, price: f64, qty: f64) {
        let new_filled = self.filled_qty + qty;
        if new_filled > 0.0 {
            self.avg_fill_price = (self.avg_fill_price * self.filled_qty + price * qty) / new_filled;
        }
        self.filled_qty = new_filled;
        self.history.push(PartialFill { price, qty });
    }

    /// Uniform fill contract (§4.3): walks the book when present, otherwise
    /// approximates against the bar via the fill model. Ages the order by
    /// one bar on every call and cancels it once `age_bars >= max_wait_bars`
    /// with an unfilled remainder.
    pub fn try_fill(&mut self, bar: &Candle, book: Option<&OrderBookSnapshot>, fill_model: &FillModel) -> FillResult {
        let result = match self.order_type {
            OrderType::Market => self.fill_market(bar, book, fill_model),
            OrderType::Limit { limit_price } => self.fill_limit(bar, book, limit_price),
            OrderType::Stop { stop_price, limit_price } => self.fill_stop(bar, book, fill_model, stop_price, limit_price),
        };
        if result.filled_qty > 0.0 {
            self.record_fill(result.avg_price, result.filled_qty);
        }
        if self.remaining_qty() <= 1e-9 && self.filled_qty > 0.0 {
            self.status = OrderStatus::Filled;
        } else if self.filled_qty > 0.0 {
            self.status = OrderStatus::PartiallyFilled;
        } else if matches!(result.status, OrderStatus::Triggered) {
            self.status = OrderStatus::Triggered;
        }
        if self.is_active() {
            self.age_bars += 1;
            if self.age_bars >= self.max_wait_bars && self.remaining_qty() > 0.0 {
                self.status = OrderStatus::Cancelled {
                    reason: "max_wait_bars exceeded".into(),
                };
            }
        }
        FillResult {
            status: self.status.clone(),
            ..result
        }
    }

    fn fill_market(&self, bar: &Candle, book: Option<&OrderBookSnapshot>, fill_model: &FillModel) -> FillResult {
        let remaining = self.remaining_qty();
        if remaining <= 0.0 {
            return FillResult::no_fill(self.status.clone());
        }
        if let Some(book) = book {
            let levels = book.side(self.book_side_for());
            if !levels.is_empty() {
                return walk_levels(levels, remaining);
            }
        }
        let bar_price = match self.side {
            OrderSide::Buy => bar.high,
            OrderSide::Sell => bar.low,
        };
        let slippage = fill_model.estimate_slippage(bar, book, remaining, self.side);
        let sign = match self.side {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        };
        let fill_price = bar_price * (1.0 + sign * slippage.total);
        FillResult {
            filled_qty: remaining,
            avg_price: fill_price,
            slippage_pct: slippage.total,
            status: OrderStatus::Filled,
            partial_fills: vec![PartialFill { price: fill_price, qty: remaining }],
        }
    }

    fn fill_limit(&self, bar: &Candle, book: Option<&OrderBookSnapshot>, limit_price: f64) -> FillResult {
        let remaining = self.remaining_qty();
        if remaining <= 0.0 {
            return FillResult::no_fill(self.status.clone());
        }
        const TOL: f64 = 1e-6;
        let fillable = match self.side {
            OrderSide::Buy => {
                let reference = book.and_then(|b| b.best_ask()).unwrap_or(bar.low);
                reference <= limit_price * (1.0 + TOL)
            }
            OrderSide::Sell => {
                let reference = book.and_then(|b| b.best_bid()).unwrap_or(bar.high);
                reference >= limit_price * (1.0 - TOL)
            }
        };
        if !fillable {
            return FillResult::no_fill(self.status.clone());
        }
        if let Some(book) = book {
            let within_limit: Vec<BookLevel> = book
                .side(self.book_side_for())
                .iter()
                .copied()
                .take_while(|l| match self.side {
                    OrderSide::Buy => l.price <= limit_price,
                    OrderSide::Sell => l.price >= limit_price,
                })
                .collect();
            if within_limit.is_empty() {
                return FillResult::no_fill(self.status.clone());
            }
            return walk_levels(&within_limit, remaining);
        }
        if !self.fill_partial_without_book {
            return FillResult::no_fill(self.status.clone());
        }
        FillResult {
            filled_qty: remaining,
            avg_price: limit_price,
            slippage_pct: 0.0,
            status: OrderStatus::Filled,
            partial_fills: vec![PartialFill { price: limit_price, qty: remaining }],
        }
    }

    fn fill_stop(
        &mut self,
        bar: &Candle,
        book: Option<&OrderBookSnapshot>,
        fill_model: &FillModel,
        stop_price: f64,
        limit_price: Option<f64>,
    ) -> FillResult {
        if matches!(self.status, OrderStatus::Pending) {
            let touched = match self.side {
                OrderSide::Buy => bar.high >= stop_price,
                OrderSide::Sell => bar.low <= stop_price,
            };
            if !touched {
                return FillResult::no_fill(OrderStatus::Pending);
            }
            self.status = OrderStatus::Triggered;
        }
        match limit_price {
            None => self.fill_market(bar, book, fill_model),
            Some(lp) => self.fill_limit(bar, book, lp),
        }
    }
}

fn walk_levels(levels: &[BookLevel], requested: f64) -> FillResult {
    let mut remaining = requested;
    let mut notional = 0.0;
    let mut filled = 0.0;
    let mut partials = Vec::new();
    for level in levels {
        if remaining <= 0.0 {
            break;
        }
        let take = level.qty.min(remaining);
        if take <= 0.0 {
            continue;
        }
        notional += level.price * take;
        filled += take;
        remaining -= take;
        partials.push(PartialFill { price: level.price, qty: take });
    }
    let avg_price = if filled > 0.0 { notional / filled } else { 0.0 };
    let status = if remaining <= 1e-9 && filled > 0.0 {
        OrderStatus::Filled
    } else if filled > 0.0 {
        OrderStatus::PartiallyFilled
    } else {
        OrderStatus::Pending
    };
    FillResult {
        filled_qty: filled,
        avg_price,
        slippage_pct: 0.0,
        status,
        partial_fills: partials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::fill_model::{FillModel, FillModelConfig};
    use chrono::TimeZone;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(Utc.timestamp_opt(0, 0).unwrap(), open, high, low, close, 10_000.0)
    }

    fn model() -> FillModel {
        FillModel::new(FillModelConfig::default())
    }

    #[test]
    fn market_order_always_fills_against_bar_when_no_book() {
        let mut order = Order::new(OrderId(1), "SPY", OrderSide::Buy, OrderType::Market, 10.0, Utc.timestamp_opt(0, 0).unwrap(), 5);
        let result = order.try_fill(&bar(100.0, 101.0, 99.0, 100.5), None, &model());
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.filled_qty, 10.0);
    }

    #[test]
    fn market_order_partially_fills_against_a_shallow_book() {
        let levels = vec![
            BookLevel { price: 100.0, qty: 3.0 },
            BookLevel { price: 101.0, qty: 4.0 },
            BookLevel { price: 102.0, qty: 2.0 },
        ];
        let book = OrderBookSnapshot::new(Utc.timestamp_opt(0, 0).unwrap(), "SPY", "SIM", vec![], levels).unwrap();
        let mut order = Order::new(OrderId(1), "SPY", OrderSide::Buy, OrderType::Market, 10.0, Utc.timestamp_opt(0, 0).unwrap(), 5);
        let result = order.try_fill(&bar(100.0, 103.0, 99.0, 101.0), Some(&book), &model());
        assert_eq!(result.status, OrderStatus::PartiallyFilled);
        assert_eq!(result.filled_qty, 9.0);
        let expected_avg = (3.0 * 100.0 + 4.0 * 101.0 + 2.0 * 102.0) / 9.0;
        assert!((result.avg_price - expected_avg).abs() < 1e-9);
    }

    #[test]
    fn limit_order_waits_until_price_crosses_then_cancels_on_timeout() {
        let mut order = Order::new(
            OrderId(1),
            "SPY",
            OrderSide::Buy,
            OrderType::Limit { limit_price: 90.0 },
            10.0,
            Utc.timestamp_opt(0, 0).unwrap(),
            2,
        );
        let r1 = order.try_fill(&bar(100.0, 101.0, 99.0, 100.0), None, &model());
        assert_eq!(r1.filled_qty, 0.0);
        let r2 = order.try_fill(&bar(100.0, 101.0, 99.0, 100.0), None, &model());
        assert_eq!(r2.filled_qty, 0.0);
        assert!(matches!(r2.status, OrderStatus::Cancelled { .. }));
    }

    #[test]
    fn stop_order_triggers_then_delegates_to_market() {
        let mut order = Order::new(
            OrderId(1),
            "SPY",
            OrderSide::Buy,
            OrderType::Stop { stop_price: 105.0, limit_price: None },
            10.0,
            Utc.timestamp_opt(0, 0).unwrap(),
            5,
        );
        let r1 = order.try_fill(&bar(100.0, 101.0, 99.0, 100.0), None, &model());
        assert_eq!(r1.filled_qty, 0.0);
        assert_eq!(order.status, OrderStatus::Triggered);
        let r2 = order.try_fill(&bar(104.0, 107.0, 103.0, 106.0), None, &model());
        assert_eq!(r2.filled_qty, 10.0);
        assert_eq!(r2.status, OrderStatus::Filled);
    }
}
