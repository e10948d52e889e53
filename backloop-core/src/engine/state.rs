//! `BacktestState` (§3) — the Engine's sole mutable state for one run.
//! Positions and orders live in flat vectors owned here rather than a web
//! of back-references (§9's "cycles → arena + indices" redesign).

use crate::domain::candle::Candle;
use crate::domain::order::Order;
use crate::domain::position::Position;
use crate::domain::trade_fill::TradeFill;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub theoretical: f64,
    pub realistic: f64,
    pub divergence_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedOrder {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub requested_qty: f64,
    pub filled_qty: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidSignalWarning {
    pub ts: DateTime<Utc>,
    pub reason: String,
}

/// Anchors the periodic-returns bucketer uses to detect a day/week/month
/// boundary crossing (§4.9 step 8) without re-deriving it from scratch
/// every bar.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodAnchors {
    pub day: Option<i32>,
    pub iso_week: Option<(i32, u32)>,
    pub month: Option<(i32, u32)>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PeriodicReturns {
    pub daily: Vec<f64>,
    pub weekly: Vec<f64>,
    pub monthly: Vec<f64>,
}

pub struct BacktestState {
    pub equity_theoretical: f64,
    pub equity_realistic: f64,
    pub peak_equity: f64,
    pub current_drawdown: f64,

    pub position: Option<Position>,
    /// All trades ever opened, in entry order. `BacktestResult::trades` is
    /// this vector verbatim.
    pub trades: Vec<TradeFill>,
    pub open_trade_index: Option<usize>,

    pub active_orders: Vec<Order>,
    pub partial_fills: u64,
    pub rejected_orders: Vec<RejectedOrder>,
    pub invalid_signals: Vec<InvalidSignalWarning>,

    pub equity_curve: Vec<EquityPoint>,

    pub(crate) anchors: PeriodAnchors,
    pub(crate) period_start_equity: PeriodStartEquity,
    pub periodic_returns: PeriodicReturns,

    pub last_bar_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PeriodStartEquity {
    pub day: Option<f64>,
    pub week: Option<f64>,
    pub month: Option<f64>,
}

impl BacktestState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            equity_theoretical: initial_capital,
            equity_realistic: initial_capital,
            peak_equity: initial_capital,
            current_drawdown: 0.0,
            position: None,
            trades: Vec::new(),
            open_trade_index: None,
            active_orders: Vec::new(),
            partial_fills: 0,
            rejected_orders: Vec::new(),
            invalid_signals: Vec::new(),
            equity_curve: Vec::new(),
            anchors: PeriodAnchors::default(),
            period_start_equity: PeriodStartEquity::default(),
            periodic_returns: PeriodicReturns::default(),
            last_bar_ts: None,
        }
    }

    pub fn has_open_position(&self) -> bool {
        self.position.as_ref().is_some_and(|p| !p.is_flat())
    }

    pub fn open_trade_count(&self) -> usize {
        usize::from(self.open_trade_index.is_some())
    }

    /// Appends an equity sample and updates peak/drawdown; enforces I3/I4
    /// (realistic never exceeds theoretical by more than a rounding
    /// tolerance, peak never falls below the realistic mark).
    pub fn record_equity(&mut self, ts: DateTime<Utc>, theoretical: f64, realistic: f64) -> f64 {
        self.equity_theoretical = theoretical;
        self.equity_realistic = realistic;
        self.peak_equity = self.peak_equity.max(realistic);
        self.current_drawdown = if self.peak_equity > 0.0 { ((self.peak_equity - realistic) / self.peak_equity).max(0.0) } else { 0.0 };
        let divergence_pct = if theoretical != 0.0 { (realistic / theoretical - 1.0) * 100.0 } else { 0.0 };
        self.equity_curve.push(EquityPoint { ts, theoretical, realistic, divergence_pct });
        divergence_pct
    }

    /// Detects a day/week/month boundary crossing relative to `bar.ts` and
    /// emits the return realised over the period that just closed.
    pub fn roll_periodic_returns(&mut self, bar: &Candle) {
        use chrono::Datelike;
        let date = bar.ts.date_naive();
        let day_ordinal = date.num_days_from_ce();
        let iso = date.iso_week();
        let iso_week = (iso.year(), iso.week());
        let month = (date.year(), date.month());

        if let Some(prev_day) = self.anchors.day {
            if day_ordinal != prev_day {
                if let Some(start) = self.period_start_equity.day {
                    if start != 0.0 {
                        self.periodic_returns.daily.push(self.equity_realistic / start - 1.0);
                    }
                }
                self.period_start_equity.day = Some(self.equity_realistic);
            }
        } else {
            self.period_start_equity.day = Some(self.equity_realistic);
        }
        self.anchors.day = Some(day_ordinal);

        if let Some(prev_week) = self.anchors.iso_week {
            if iso_week != prev_week {
                if let Some(start) = self.period_start_equity.week {
                    if start != 0.0 {
                        self.periodic_returns.weekly.push(self.equity_realistic / start - 1.0);
                    }
                }
                self.period_start_equity.week = Some(self.equity_realistic);
            }
        } else {
            self.period_start_equity.week = Some(self.equity_realistic);
        }
        self.anchors.iso_week = Some(iso_week);

        if let Some(prev_month) = self.anchors.month {
            if month != prev_month {
                if let Some(start) = self.period_start_equity.month {
                    if start != 0.0 {
                        self.periodic_returns.monthly.push(self.equity_realistic / start - 1.0);
                    }
                }
                self.period_start_equity.month = Some(self.equity_realistic);
            }
        } else {
            self.period_start_equity.month = Some(self.equity_realistic);
        }
        self.anchors.month = Some(month);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle_at(secs: i64) -> Candle {
        Candle::new(Utc.timestamp_opt(secs, 0).unwrap(), 100.0, 101.0, 99.0, 100.0, 1.0)
    }

    #[test]
    fn record_equity_tracks_peak_and_drawdown() {
        let mut state = BacktestState::new(10_000.0);
        state.record_equity(Utc.timestamp_opt(0, 0).unwrap(), 11_000.0, 11_000.0);
        state.record_equity(Utc.timestamp_opt(60, 0).unwrap(), 9_900.0, 9_900.0);
        assert_eq!(state.peak_equity, 11_000.0);
        assert!((state.current_drawdown - (1.0 - 9_900.0 / 11_000.0)).abs() < 1e-9);
    }

    #[test]
    fn daily_return_emitted_on_day_boundary_crossing() {
        let mut state = BacktestState::new(10_000.0);
        state.equity_realistic = 10_000.0;
        state.roll_periodic_returns(&candle_at(0));
        state.equity_realistic = 10_500.0;
        state.roll_periodic_returns(&candle_at(86_400));
        assert_eq!(state.periodic_returns.daily.len(), 1);
        assert!((state.periodic_returns.daily[0] - 0.05).abs() < 1e-9);
    }
}
