//! The `Strategy` port (§6) and the typed `Signal` the engine validates
//! against the per-action table in §4.9.1.

use crate::domain::candle::Candle;
use crate::domain::order::OrderSide;
use crate::domain::position::Position;

/// What the strategy sees at the close of bar `b` — no field here may leak
/// information from `b+1` (§4.9.3).
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub bar: Candle,
    pub equity_realistic: f64,
    pub drawdown: f64,
    pub position: Option<Position>,
    pub open_trade_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Enter { side: OrderSide, entry_price: f64 },
    Exit,
    StopLoss { stop_loss: f64 },
    TakeProfit { take_profit: f64 },
    TrailingStop { trailing_distance: Option<f64>, trailing_distance_pct: Option<f64> },
    Adjust { size: f64 },
    Hold,
}

/// Non-fatal structured rejection for a signal that fails §4.9.1's table;
/// the bar is skipped, the run continues.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalError {
    pub reason: String,
}

impl SignalError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Validates one signal against the current position state per §4.9.1.
pub fn validate_signal(signal: Signal, has_position: bool) -> Result<Signal, SignalError> {
    match signal {
        Signal::Enter { entry_price, .. } => {
            if has_position {
                return Err(SignalError::new("enter: a position is already open"));
            }
            if !entry_price.is_finite() || entry_price <= 0.0 {
                return Err(SignalError::new("enter: entry_price must be a positive finite number"));
            }
            Ok(signal)
        }
        Signal::Exit => {
            if !has_position {
                return Err(SignalError::new("exit: no open position"));
            }
            Ok(signal)
        }
        Signal::StopLoss { stop_loss } => {
            if !has_position {
                return Err(SignalError::new("stop_loss: no open position"));
            }
            if !stop_loss.is_finite() || stop_loss <= 0.0 {
                return Err(SignalError::new("stop_loss: stop_loss must be a positive finite number"));
            }
            Ok(signal)
        }
        Signal::TakeProfit { take_profit } => {
            if !has_position {
                return Err(SignalError::new("take_profit: no open position"));
            }
            if !take_profit.is_finite() || take_profit <= 0.0 {
                return Err(SignalError::new("take_profit: take_profit must be a positive finite number"));
            }
            Ok(signal)
        }
        Signal::TrailingStop { trailing_distance, trailing_distance_pct } => {
            if !has_position {
                return Err(SignalError::new("trailing_stop: no open position"));
            }
            match (trailing_distance, trailing_distance_pct) {
                (Some(_), None) | (None, Some(_)) => Ok(signal),
                _ => Err(SignalError::new("trailing_stop: exactly one of trailing_distance or trailing_distance_pct must be set")),
            }
        }
        Signal::Adjust { size } => {
            if !has_position {
                return Err(SignalError::new("adjust: no open position"));
            }
            if size == 0.0 {
                return Err(SignalError::new("adjust: size must be non-zero"));
            }
            Ok(signal)
        }
        Signal::Hold => Ok(signal),
    }
}

/// `on_bar` is a port: implementors decide entries, exits and protective
/// adjustments from the context alone, never from wall-clock time or data
/// outside the candle the context carries.
pub trait Strategy: Send {
    fn on_bar(&mut self, ctx: &StrategyContext) -> Signal;

    fn name(&self) -> &str {
        "strategy"
    }
}

/// Never trades; used to establish `TrackingError(run_A) ==
/// TrackingError(run_A ⊕ identity_strategy)` in integration tests (§8).
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityStrategy;

impl Strategy for IdentityStrategy {
    fn on_bar(&mut self, _ctx: &StrategyContext) -> Signal {
        Signal::Hold
    }

    fn name(&self) -> &str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_rejected_when_position_already_open() {
        let err = validate_signal(Signal::Enter { side: OrderSide::Buy, entry_price: 100.0 }, true).unwrap_err();
        assert!(err.reason.contains("already open"));
    }

    #[test]
    fn exit_rejected_without_position() {
        let err = validate_signal(Signal::Exit, false).unwrap_err();
        assert!(err.reason.contains("no open position"));
    }

    #[test]
    fn trailing_stop_rejects_both_fields_set() {
        let err = validate_signal(Signal::TrailingStop { trailing_distance: Some(1.0), trailing_distance_pct: Some(0.01) }, true).unwrap_err();
        assert!(err.reason.contains("exactly one"));
    }

    #[test]
    fn trailing_stop_rejects_neither_field_set() {
        let err = validate_signal(Signal::TrailingStop { trailing_distance: None, trailing_distance_pct: None }, true).unwrap_err();
        assert!(err.reason.contains("exactly one"));
    }

    #[test]
    fn adjust_rejects_zero_size() {
        let err = validate_signal(Signal::Adjust { size: 0.0 }, true).unwrap_err();
        assert!(err.reason.contains("non-zero"));
    }

    #[test]
    fn hold_always_valid() {
        assert!(validate_signal(Signal::Hold, false).is_ok());
        assert!(validate_signal(Signal::Hold, true).is_ok());
    }
}
