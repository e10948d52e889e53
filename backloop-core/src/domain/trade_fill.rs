//! TradeFill — the canonical completed-or-open round-trip record the Engine
//! appends to on every entry/exit (§6). Replaces the teacher's separate
//! `Fill`/`TradeRecord` pair with the single record the result schema names.

use super::order::OrderSide;
use super::position::ExitReason as ProtectiveExitReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeExitReason {
    StopLoss,
    StopLossGap,
    TakeProfit,
    TakeProfitGap,
    Signal,
    Timeout,
    Manual,
}

impl From<ProtectiveExitReason> for TradeExitReason {
    fn from(reason: ProtectiveExitReason) -> Self {
        match reason {
            ProtectiveExitReason::Sl => TradeExitReason::StopLoss,
            ProtectiveExitReason::SlGap => TradeExitReason::StopLossGap,
            ProtectiveExitReason::Tp => TradeExitReason::TakeProfit,
            ProtectiveExitReason::TpGap => TradeExitReason::TakeProfitGap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    pub symbol: String,
    pub side: OrderSide,
    pub entry_ts: DateTime<Utc>,
    pub exit_ts: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub size: f64,
    pub fees_entry: f64,
    pub fees_exit: f64,
    pub slippage_entry: f64,
    pub slippage_exit: f64,
    pub status: TradeStatus,
    pub exit_reason: Option<TradeExitReason>,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub mae: f64,
    pub mfe: f64,
}

impl TradeFill {
    pub fn open(
        symbol: impl Into<String>,
        side: OrderSide,
        entry_ts: DateTime<Utc>,
        entry_price: f64,
        size: f64,
        fees_entry: f64,
        slippage_entry: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_ts,
            exit_ts: None,
            entry_price,
            exit_price: None,
            size,
            fees_entry,
            fees_exit: 0.0,
            slippage_entry,
            slippage_exit: 0.0,
            status: TradeStatus::Open,
            exit_reason: None,
            pnl: 0.0,
            pnl_pct: 0.0,
            mae: 0.0,
            mfe: 0.0,
        }
    }

    /// Realizes the trade at `exit_price`, computing `pnl`/`pnl_pct`/`return_pct`
    /// net of both legs' fees and slippage.
    pub fn close(
        &mut self,
        exit_ts: DateTime<Utc>,
        exit_price: f64,
        fees_exit: f64,
        slippage_exit: f64,
        reason: TradeExitReason,
        mae: f64,
        mfe: f64,
    ) {
        let gross = match self.side {
            OrderSide::Buy => (exit_price - self.entry_price) * self.size,
            OrderSide::Sell => (self.entry_price - exit_price) * self.size,
        };
        let total_fees = self.fees_entry + fees_exit;
        let total_slippage_cost = (self.slippage_entry + slippage_exit) * self.entry_price * self.size;
        self.exit_ts = Some(exit_ts);
        self.exit_price = Some(exit_price);
        self.fees_exit = fees_exit;
        self.slippage_exit = slippage_exit;
        self.status = TradeStatus::Closed;
        self.exit_reason = Some(reason);
        self.pnl = gross - total_fees - total_slippage_cost;
        self.pnl_pct = self.return_pct();
        self.mae = mae;
        self.mfe = mfe;
    }

    pub fn cancel(&mut self) {
        self.status = TradeStatus::Cancelled;
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, TradeStatus::Open)
    }

    pub fn return_pct(&self) -> f64 {
        let cost_basis = self.entry_price * self.size;
        if cost_basis == 0.0 {
            return 0.0;
        }
        self.pnl / cost_basis
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn close_computes_net_pnl_for_a_long() {
        let mut trade = TradeFill::open("SPY", OrderSide::Buy, ts(0), 100.0, 10.0, 1.0, 0.001);
        trade.close(ts(60), 110.0, 1.0, 0.001, TradeExitReason::TakeProfit, -20.0, 110.0);
        let expected_gross = 100.0;
        let expected_slip_cost = (0.001 + 0.001) * 100.0 * 10.0;
        let expected = expected_gross - 2.0 - expected_slip_cost;
        assert!((trade.pnl - expected).abs() < 1e-9);
        assert_eq!(trade.status, TradeStatus::Closed);
    }

    #[test]
    fn close_computes_net_pnl_for_a_short() {
        let mut trade = TradeFill::open("SPY", OrderSide::Sell, ts(0), 100.0, 10.0, 1.0, 0.0);
        trade.close(ts(60), 90.0, 1.0, 0.0, TradeExitReason::Signal, 0.0, 100.0);
        assert!((trade.pnl - 98.0).abs() < 1e-9);
    }

    #[test]
    fn zero_cost_basis_returns_zero_pct() {
        let mut trade = TradeFill::open("SPY", OrderSide::Buy, ts(0), 0.0, 10.0, 0.0, 0.0);
        trade.close(ts(60), 10.0, 0.0, 0.0, TradeExitReason::Manual, 0.0, 0.0);
        assert_eq!(trade.return_pct(), 0.0);
    }

    #[test]
    fn cancelled_trade_has_no_pnl() {
        let mut trade = TradeFill::open("SPY", OrderSide::Buy, ts(0), 100.0, 10.0, 0.0, 0.0);
        trade.cancel();
        assert_eq!(trade.status, TradeStatus::Cancelled);
        assert_eq!(trade.pnl, 0.0);
    }
}
