//! Candle — the fundamental market data unit the engine replays bar by bar
//! — and `CandleSeries`, the immutable, chronologically sorted sequence of
//! candles the engine owns for the lifetime of one run.

use super::ids::DatasetHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV record for a single symbol at a single instant, with the optional
/// quote-side fields a data provider may attach (used as a cheap stand-in
/// for a full order-book snapshot when none is available).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub atr: Option<f64>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub bid_qty: Option<f64>,
    pub ask_qty: Option<f64>,
}

impl Candle {
    pub fn new(ts: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
            atr: None,
            best_bid: None,
            best_ask: None,
            bid_qty: None,
            ask_qty: None,
        }
    }

    /// OHLC ordering sanity: `low <= min(open,close) <= max(open,close) <= high`.
    pub fn is_sane(&self) -> bool {
        if [self.open, self.high, self.low, self.close].iter().any(|v| v.is_nan()) {
            return false;
        }
        let lo = self.open.min(self.close);
        let hi = self.open.max(self.close);
        self.low <= lo && hi <= self.high && self.low <= self.high && self.open > 0.0 && self.close > 0.0
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CandleSeriesError {
    #[error("candle series has no bars")]
    Empty,
    #[error("bar at index {index} ({ts}) is not strictly after the previous bar")]
    NonChronological { index: usize, ts: DateTime<Utc> },
    #[error("bar at index {index} fails OHLC sanity (open={open} high={high} low={low} close={close})")]
    Insane {
        index: usize,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// Immutable, chronologically sorted candle sequence for one symbol (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub symbol: String,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Validates I1/I2 (strictly increasing timestamps, no duplicates) and
    /// the OHLC sanity invariant at construction time so every downstream
    /// consumer can assume a well-formed series.
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Result<Self, CandleSeriesError> {
        if candles.is_empty() {
            return Err(CandleSeriesError::Empty);
        }
        for (i, c) in candles.iter().enumerate() {
            if i > 0 && c.ts <= candles[i - 1].ts {
                return Err(CandleSeriesError::NonChronological { index: i, ts: c.ts });
            }
            if !c.is_sane() {
                return Err(CandleSeriesError::Insane {
                    index: i,
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                });
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            candles,
        })
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// `blake3` content digest over every bar's `(ts, open, high, low, close,
    /// volume)` tuple, used to populate `BacktestResult::data_hash` under the
    /// determinism contract (§6).
    pub fn content_hash(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.symbol.as_bytes());
        for c in &self.candles {
            hasher.update(&c.ts.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
            hasher.update(&c.open.to_le_bytes());
            hasher.update(&c.high.to_le_bytes());
            hasher.update(&c.low.to_le_bytes());
            hasher.update(&c.close.to_le_bytes());
            hasher.update(&c.volume.to_le_bytes());
        }
        DatasetHash(*hasher.finalize().as_bytes())
    }
}
