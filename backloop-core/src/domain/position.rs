//! Position — the single-owner holding in one symbol (C5, §4.5). The Engine
//! is the sole mutator; sizers, the risk manager and result assembly only
//! ever read an immutable snapshot.

use super::candle::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFill {
    pub ts: DateTime<Utc>,
    pub price: f64,
    pub qty: f64,
}

/// A `(price, fraction_of_size)` partial take-profit target, evaluated in
/// ascending distance-from-entry order and firable at most once
/// (supplemental, from `original_source/app/backtesting/position.py`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialTakeProfitLevel {
    pub price: f64,
    pub fraction: f64,
    pub fired: bool,
    config_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialTpFire {
    pub price: f64,
    pub fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Sl,
    SlGap,
    Tp,
    TpGap,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtectiveExit {
    pub price: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: f64,
    pub avg_entry: f64,
    pub current_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub trailing_distance: Option<f64>,
    pub trailing_stop_price: Option<f64>,
    pub breakeven_trigger: Option<f64>,
    pub breakeven_armed: bool,
    pub partial_tp_levels: Vec<PartialTakeProfitLevel>,
    partial_tp_config: Vec<(f64, f64)>,
    /// Best price observed since entry in the favourable direction — the
    /// anchor for trailing-stop recomputation (§4.5).
    extreme_favorable_price: f64,
    pub mae: f64,
    pub mfe: f64,
    pub fills: Vec<PositionFill>,
    pub realized_pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Position {
    pub fn open(symbol: impl Into<String>, side: PositionSide, size: f64, entry_price: f64, ts: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            avg_entry: entry_price,
            current_price: entry_price,
            stop_loss: None,
            take_profit: None,
            trailing_distance: None,
            trailing_stop_price: None,
            breakeven_trigger: None,
            breakeven_armed: false,
            partial_tp_levels: Vec::new(),
            partial_tp_config: Vec::new(),
            extreme_favorable_price: entry_price,
            mae: 0.0,
            mfe: 0.0,
            fills: vec![PositionFill { ts, price: entry_price, qty: size }],
            realized_pnl: 0.0,
            opened_at: ts,
            last_update: ts,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.side, PositionSide::Flat) || self.size <= 0.0
    }

    pub fn unrealized_pnl(&self) -> f64 {
        match self.side {
            PositionSide::Long => (self.current_price - self.avg_entry) * self.size,
            PositionSide::Short => (self.avg_entry - self.current_price) * self.size,
            PositionSide::Flat => 0.0,
        }
    }

    /// Configures partial take-profit targets as `(price_offset, size_fraction)`
    /// pairs anchored additively on the current entry (`avg_entry + offset`
    /// long, `avg_entry - offset` short, per `original_source`'s
    /// `_build_partial_take_profit_levels`); call again after any
    /// `apply_fill` that moves `avg_entry` so targets track the new
    /// weighted entry.
    pub fn set_partial_tp_config(&mut self, config: Vec<(f64, f64)>) {
        self.partial_tp_config = config;
        self.rebuild_partial_tp_levels();
    }

    fn rebuild_partial_tp_levels(&mut self) {
        let previous = std::mem::take(&mut self.partial_tp_levels);
        self.partial_tp_levels = self
            .partial_tp_config
            .iter()
            .enumerate()
            .map(|(config_index, (offset, fraction))| {
                let price = match self.side {
                    PositionSide::Long => self.avg_entry + offset,
                    PositionSide::Short => self.avg_entry - offset,
                    PositionSide::Flat => self.avg_entry,
                };
                let fired = previous.iter().any(|l| l.config_index == config_index && l.fired);
                PartialTakeProfitLevel { price, fraction: *fraction, fired, config_index }
            })
            .collect();
        self.partial_tp_levels
            .sort_by(|a, b| (a.price - self.avg_entry).abs().partial_cmp(&(b.price - self.avg_entry).abs()).unwrap());
    }

    /// Weighted-average entry recomputation on a new fill (entry add or
    /// scale-in); rebuilds partial-TP targets from configuration, if any.
    pub fn apply_fill(&mut self, price: f64, qty: f64, ts: DateTime<Utc>) {
        let new_size = self.size + qty;
        if new_size > 0.0 {
            self.avg_entry = (self.avg_entry * self.size + price * qty) / new_size;
        }
        self.size = new_size;
        self.fills.push(PositionFill { ts, price, qty });
        self.last_update = ts;
        if !self.partial_tp_config.is_empty() {
            self.rebuild_partial_tp_levels();
        }
    }

    /// Reduces size, realizes PnL on the closed slice at the current
    /// weighted entry, and does not alter `avg_entry` of the remainder.
    pub fn apply_partial_close(&mut self, price: f64, qty: f64, ts: DateTime<Utc>) -> f64 {
        let qty = qty.min(self.size).max(0.0);
        let pnl = match self.side {
            PositionSide::Long => (price - self.avg_entry) * qty,
            PositionSide::Short => (self.avg_entry - price) * qty,
            PositionSide::Flat => 0.0,
        };
        self.size -= qty;
        self.realized_pnl += pnl;
        self.last_update = ts;
        if self.size <= 1e-9 {
            self.size = 0.0;
            self.side = PositionSide::Flat;
        }
        pnl
    }

    /// Updates MAE/MFE, arms breakeven on first favourable crossing,
    /// advances the trailing stop under the ratchet invariant (stops only
    /// tighten), and returns any partial take-profit levels that fired.
    pub fn update_price(&mut self, price: f64, ts: DateTime<Utc>) -> Vec<PartialTpFire> {
        self.current_price = price;
        self.last_update = ts;

        let favorable_move = match self.side {
            PositionSide::Long => price - self.avg_entry,
            PositionSide::Short => self.avg_entry - price,
            PositionSide::Flat => 0.0,
        };
        self.mfe = self.mfe.max(favorable_move);
        self.mae = self.mae.min(favorable_move);

        match self.side {
            PositionSide::Long => self.extreme_favorable_price = self.extreme_favorable_price.max(price),
            PositionSide::Short => self.extreme_favorable_price = self.extreme_favorable_price.min(price),
            PositionSide::Flat => {}
        }

        if !self.breakeven_armed {
            if let Some(trigger) = self.breakeven_trigger {
                if favorable_move >= trigger {
                    self.stop_loss = Some(self.avg_entry);
                    self.breakeven_armed = true;
                }
            }
        }

        if let Some(distance) = self.trailing_distance {
            let candidate = match self.side {
                PositionSide::Long => self.extreme_favorable_price - distance,
                PositionSide::Short => self.extreme_favorable_price + distance,
                PositionSide::Flat => price,
            };
            let ratcheted = match (self.side, self.trailing_stop_price) {
                (PositionSide::Long, Some(cur)) => cur.max(candidate),
                (PositionSide::Short, Some(cur)) => cur.min(candidate),
                _ => candidate,
            };
            self.trailing_stop_price = Some(ratcheted);
            self.stop_loss = Some(match (self.side, self.stop_loss) {
                (PositionSide::Long, Some(sl)) => sl.max(ratcheted),
                (PositionSide::Short, Some(sl)) => sl.min(ratcheted),
                (_, None) => ratcheted,
                (PositionSide::Flat, Some(sl)) => sl,
            });
        }

        let mut fires = Vec::new();
        for level in self.partial_tp_levels.iter_mut() {
            if level.fired {
                continue;
            }
            let touched = match self.side {
                PositionSide::Long => price >= level.price,
                PositionSide::Short => price <= level.price,
                PositionSide::Flat => false,
            };
            if touched {
                level.fired = true;
                fires.push(PartialTpFire { price: level.price, fraction: level.fraction });
            }
        }
        fires
    }

    /// Implements §4.5's `check_exit` together with the §4.9.2 conservative
    /// intrabar tie-break: gaps take precedence over within-bar touches, and
    /// the adverse (SL) side wins whenever both are gapped through.
    pub fn check_exit(&self, bar: &Candle) -> Option<ProtectiveExit> {
        let sl = self.stop_loss;
        let tp = self.take_profit;
        match self.side {
            PositionSide::Long => {
                if sl.is_some_and(|s| bar.open <= s) {
                    return sl.map(|_| ProtectiveExit { price: bar.open, reason: ExitReason::SlGap });
                }
                if tp.is_some_and(|t| bar.open >= t) {
                    return tp.map(|_| ProtectiveExit { price: bar.open, reason: ExitReason::TpGap });
                }
                if sl.is_some_and(|s| bar.low <= s) {
                    return sl.map(|s| ProtectiveExit { price: s, reason: ExitReason::Sl });
                }
                if tp.is_some_and(|t| bar.high >= t) {
                    return tp.map(|t| ProtectiveExit { price: t, reason: ExitReason::Tp });
                }
                None
            }
            PositionSide::Short => {
                if sl.is_some_and(|s| bar.open >= s) {
                    return sl.map(|_| ProtectiveExit { price: bar.open, reason: ExitReason::SlGap });
                }
                if tp.is_some_and(|t| bar.open <= t) {
                    return tp.map(|_| ProtectiveExit { price: bar.open, reason: ExitReason::TpGap });
                }
                if sl.is_some_and(|s| bar.high >= s) {
                    return sl.map(|s| ProtectiveExit { price: s, reason: ExitReason::Sl });
                }
                if tp.is_some_and(|t| bar.low <= t) {
                    return tp.map(|t| ProtectiveExit { price: t, reason: ExitReason::Tp });
                }
                None
            }
            PositionSide::Flat => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(ts(0), open, high, low, close, 1_000.0)
    }

    #[test]
    fn apply_fill_recomputes_weighted_average_entry() {
        let mut pos = Position::open("SPY", PositionSide::Long, 10.0, 100.0, ts(0));
        pos.apply_fill(110.0, 10.0, ts(60));
        assert!((pos.avg_entry - 105.0).abs() < 1e-9);
        assert_eq!(pos.size, 20.0);
    }

    #[test]
    fn partial_close_does_not_alter_remaining_avg_entry() {
        let mut pos = Position::open("SPY", PositionSide::Long, 20.0, 100.0, ts(0));
        let pnl = pos.apply_partial_close(110.0, 10.0, ts(60));
        assert_eq!(pnl, 100.0);
        assert_eq!(pos.size, 10.0);
        assert_eq!(pos.avg_entry, 100.0);
    }

    #[test]
    fn trailing_stop_only_tightens() {
        let mut pos = Position::open("SPY", PositionSide::Long, 10.0, 100.0, ts(0));
        pos.trailing_distance = Some(5.0);
        pos.update_price(110.0, ts(60));
        let first_stop = pos.stop_loss.unwrap();
        assert!((first_stop - 105.0).abs() < 1e-9);
        pos.update_price(102.0, ts(120));
        assert_eq!(pos.stop_loss.unwrap(), first_stop);
        pos.update_price(120.0, ts(180));
        assert!(pos.stop_loss.unwrap() > first_stop);
    }

    #[test]
    fn breakeven_arms_once_and_does_not_refire() {
        let mut pos = Position::open("SPY", PositionSide::Long, 10.0, 100.0, ts(0));
        pos.breakeven_trigger = Some(5.0);
        pos.stop_loss = Some(95.0);
        pos.update_price(106.0, ts(60));
        assert_eq!(pos.stop_loss, Some(100.0));
        assert!(pos.breakeven_armed);
        pos.stop_loss = Some(99.0);
        pos.update_price(104.0, ts(120));
        assert_eq!(pos.stop_loss, Some(99.0));
    }

    #[test]
    fn partial_tp_fires_once_in_ascending_distance_order() {
        let mut pos = Position::open("SPY", PositionSide::Long, 10.0, 100.0, ts(0));
        pos.set_partial_tp_config(vec![(10.0, 0.5), (5.0, 0.3)]);
        assert_eq!(pos.partial_tp_levels[0].price, 105.0);
        let fires = pos.update_price(106.0, ts(60));
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].price, 105.0);
        let again = pos.update_price(120.0, ts(120));
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].price, 110.0);
    }

    #[test]
    fn scenario_sl_first_tie_break_same_bar() {
        let mut pos = Position::open("SPY", PositionSide::Long, 1.0, 100.0, ts(0));
        pos.stop_loss = Some(96.0);
        pos.take_profit = Some(106.0);
        let exit = pos.check_exit(&bar(100.0, 107.0, 95.0, 106.0)).unwrap();
        assert_eq!(exit.price, 96.0);
        assert_eq!(exit.reason, ExitReason::Sl);
    }

    #[test]
    fn scenario_sl_gap_over_tp() {
        let mut pos = Position::open("SPY", PositionSide::Long, 1.0, 100.0, ts(0));
        pos.stop_loss = Some(96.0);
        pos.take_profit = Some(106.0);
        let exit = pos.check_exit(&bar(95.0, 110.0, 94.0, 100.0)).unwrap();
        assert_eq!(exit.price, 95.0);
        assert_eq!(exit.reason, ExitReason::SlGap);
    }

    #[test]
    fn scenario_tp_gap_before_sl() {
        let mut pos = Position::open("SPY", PositionSide::Long, 1.0, 100.0, ts(0));
        pos.stop_loss = Some(96.0);
        pos.take_profit = Some(106.0);
        let exit = pos.check_exit(&bar(108.0, 110.0, 95.0, 109.0)).unwrap();
        assert_eq!(exit.price, 108.0);
        assert_eq!(exit.reason, ExitReason::TpGap);
    }
}
