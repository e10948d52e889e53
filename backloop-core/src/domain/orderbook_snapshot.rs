//! OrderBookSnapshot — a typed L1–L10 view of one side's depth at an instant (C1, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub qty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookSide {
    Bid,
    Ask,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderBookError {
    #[error("best bid {bid} is not below best ask {ask}")]
    CrossedBook { bid: f64, ask: f64 },
    #[error("level at index {index} has negative quantity {qty}")]
    NegativeQuantity { index: usize, qty: f64 },
    #[error("bid levels are not sorted in descending price order")]
    BidsNotDescending,
    #[error("ask levels are not sorted in ascending price order")]
    AsksNotAscending,
}

/// `{ts, symbol, venue, bids[], asks[]}` with bids sorted descending and
/// asks ascending (§3). Construction validates the book invariants so every
/// consumer can assume a well-formed snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub venue: String,
    bids: Vec<BookLevel>,
    asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    pub fn new(
        ts: DateTime<Utc>,
        symbol: impl Into<String>,
        venue: impl Into<String>,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    ) -> Result<Self, OrderBookError> {
        for w in bids.windows(2) {
            if w[1].price > w[0].price {
                return Err(OrderBookError::BidsNotDescending);
            }
        }
        for w in asks.windows(2) {
            if w[1].price < w[0].price {
                return Err(OrderBookError::AsksNotAscending);
            }
        }
        for (index, level) in bids.iter().chain(asks.iter()).enumerate() {
            if level.qty < 0.0 {
                return Err(OrderBookError::NegativeQuantity { index, qty: level.qty });
            }
        }
        if let (Some(b), Some(a)) = (bids.first(), asks.first()) {
            if b.price >= a.price {
                return Err(OrderBookError::CrossedBook { bid: b.price, ask: a.price });
            }
        }
        Ok(Self {
            ts,
            symbol: symbol.into(),
            venue: venue.into(),
            bids,
            asks,
        })
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid(&self) -> Option<f64> {
        Some((self.best_bid()? + self.best_ask()?) / 2.0)
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    pub fn spread_pct(&self) -> Option<f64> {
        let mid = self.mid()?;
        if mid <= 0.0 {
            return None;
        }
        Some(self.spread()? / mid)
    }

    pub fn side(&self, side: BookSide) -> &[BookLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    pub fn levels(&self, n: usize, side: BookSide) -> &[BookLevel] {
        let levels = self.side(side);
        &levels[..levels.len().min(n)]
    }

    /// Cumulative quantity available at or better than `price` on `side`.
    pub fn depth_at_price(&self, price: f64, side: BookSide) -> f64 {
        self.side(side)
            .iter()
            .filter(|l| match side {
                BookSide::Bid => l.price >= price,
                BookSide::Ask => l.price <= price,
            })
            .map(|l| l.qty)
            .sum()
    }

    /// Walks levels until cumulative notional reaches `notional`, returning
    /// the worst reached level price and the cumulative quantity consumed.
    /// If the book is too thin, returns the last reachable level (§4.1).
    pub fn depth_for_notional(&self, notional: f64, side: BookSide) -> Option<(f64, f64)> {
        let levels = self.side(side);
        if levels.is_empty() {
            return None;
        }
        let mut cum_notional = 0.0;
        let mut cum_qty = 0.0;
        let mut worst_price = levels[0].price;
        for level in levels {
            cum_notional += level.price * level.qty;
            cum_qty += level.qty;
            worst_price = level.price;
            if cum_notional >= notional {
                break;
            }
        }
        Some((worst_price, cum_qty))
    }
}
