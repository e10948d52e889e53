//! The per-bar simulation loop (C9, §4.9). A fresh `Engine` is built from
//! one `EngineConfig` and consumed by a single `run` — config and sizer are
//! per-run immutable (§9's "global mutable configuration" redesign), so
//! there is no reason for an `Engine` to outlive the run it drives.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::analytics::TrackingErrorAccumulator;
use crate::clock::Clock;
use crate::domain::candle::{Candle, CandleSeries};
use crate::domain::ids::{IdGen, RunId};
use crate::domain::order::{Order, OrderSide, OrderStatus, OrderType};
use crate::domain::position::{Position, PositionSide};
use crate::domain::trade_fill::{TradeExitReason, TradeFill, TradeStatus};
use crate::error::{BacktestError, InputError, IntegrityError};
use crate::execution::ExecutionSimulator;
use crate::orderbook::fill_model::{FillModel, FillModelConfig};
use crate::orderbook::repository::{InMemoryOrderBookRepository, OrderBookRepository};
use crate::risk::{AutoShutdownPolicy, DrawdownController, SizingContext, StrategyMetrics, UnifiedRiskManager};

use super::config::{BacktestRunRequest, EngineConfig};
use super::result::{BacktestResult, EquityDivergenceMetrics, ExecutionReliability, ResultExecutionStats};
use super::state::{BacktestState, InvalidSignalWarning, RejectedOrder};
use super::strategy::{validate_signal, Signal, StrategyContext};
use super::temporal::TemporalValidator;

pub struct Engine {
    config: EngineConfig,
}

/// Running totals the Engine keeps outside `BacktestState` because they feed
/// the theoretical/realistic split (§4.9 step 6) rather than the result
/// schema directly.
struct Ledger {
    realized_pnl_realistic: f64,
    realized_pnl_theoretical: f64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Runs the full per-bar loop (§4.9 steps 1-8) and assembles the result
    /// (§6). Consumes both `self` and `request` since the sizer and the
    /// strategy are single-use for one run.
    pub fn run(
        self,
        mut request: BacktestRunRequest,
        series: &CandleSeries,
        clock: &dyn Clock,
        orderbook_repo: Option<&dyn OrderBookRepository>,
    ) -> Result<BacktestResult, BacktestError> {
        if series.is_empty() {
            return Err(BacktestError::Input(InputError::NoDataInRange));
        }

        let EngineConfig {
            temporal,
            execution,
            fill_model,
            shutdown,
            portfolio_limits: _,
            sizer,
            max_wait_bars,
            bars_per_year,
        } = self.config;

        let data_hash = series.content_hash();
        let run_id = RunId::from_bytes(format!("{}|{}|{}|{:?}", request.instrument, request.start, request.end, request.seed).as_bytes());
        tracing::info!(run_id = %run_id, symbol = %series.symbol, bars = series.len(), "starting backtest run");

        let mut id_gen = IdGen::default();
        let mut state = BacktestState::new(request.initial_capital);
        let mut temporal_validator = TemporalValidator::new(temporal, request.timeframe.duration());
        let mut execution_sim = ExecutionSimulator::new(execution, FillModel::new(fill_model));
        let mut risk_manager = UnifiedRiskManager::new(sizer, DrawdownController { max_dd: shutdown.max_dd }, AutoShutdownPolicy { config: shutdown }, request.initial_capital);
        let mut tracking_error_acc = TrackingErrorAccumulator::new();
        let mut tracking_error_series = Vec::new();
        let mut ledger = Ledger { realized_pnl_realistic: 0.0, realized_pnl_theoretical: 0.0 };

        let empty_repo = InMemoryOrderBookRepository::new();
        let repo: &dyn OrderBookRepository = if request.use_orderbook { orderbook_repo.unwrap_or(&empty_repo) } else { &empty_repo };

        for bar in series.as_slice() {
            temporal_validator.observe(bar.ts);
            state.last_bar_ts = Some(bar.ts);

            // Step 3: sweep resting entry/adjust orders left over from a
            // prior bar's partial fill.
            sweep_active_orders(&mut state, &mut execution_sim, &request, bar, repo, fill_model, &mut ledger);

            // Protective exit check against levels set by a *previous* bar
            // only (§4.9.3's no-lookahead rule: this bar's own signal,
            // handled below, cannot move the stop that fires on this bar).
            let protective_exit = state.position.as_ref().filter(|p| !p.is_flat()).and_then(|p| p.check_exit(bar));
            if let Some(exit) = protective_exit {
                close_full_position(&mut state, &request, bar.ts, exit.price, TradeExitReason::from(exit.reason), &mut ledger);
            }

            // Step 2: strategy call + validation.
            let ctx = StrategyContext {
                bar: *bar,
                equity_realistic: state.equity_realistic,
                drawdown: state.current_drawdown,
                position: state.position.clone(),
                open_trade_count: state.open_trade_count(),
            };
            let raw_signal = request.strategy.on_bar(&ctx);
            let signal = match validate_signal(raw_signal, state.has_open_position()) {
                Ok(signal) => signal,
                Err(err) => {
                    state.invalid_signals.push(InvalidSignalWarning { ts: bar.ts, reason: err.reason });
                    Signal::Hold
                }
            };

            // Step 4 + 5: translate the signal into an order and execute it
            // immediately — nothing in this core defers a market order past
            // the bar that created it.
            apply_signal(&mut state, &mut id_gen, &mut risk_manager, &request, bar, max_wait_bars, fill_model, signal, &mut ledger);

            // Refresh trailing/breakeven/partial-TP state and MAE/MFE now
            // that this bar's fills and signal have been applied.
            if let Some(position) = state.position.as_mut() {
                if !position.is_flat() {
                    let fires = position.update_price(bar.close, bar.ts);
                    for fire in fires {
                        let qty = (position.size * fire.fraction).min(position.size);
                        let commission = request.commission(fire.price * qty);
                        let gross = position.apply_partial_close(fire.price, qty, bar.ts);
                        ledger.realized_pnl_realistic += gross - commission;
                        ledger.realized_pnl_theoretical += gross;
                    }
                }
            }

            // Step 6: equity update.
            let unrealized = state.position.as_ref().map(|p| p.unrealized_pnl()).unwrap_or(0.0);
            let theoretical = request.initial_capital + ledger.realized_pnl_theoretical + unrealized;
            let realistic = request.initial_capital + ledger.realized_pnl_realistic + unrealized;
            state.record_equity(bar.ts, theoretical, realistic);
            risk_manager.update_drawdown(realistic, &strategy_metrics(&state));

            // Step 7: tracking-error sample.
            if let Some(point) = tracking_error_acc.observe(bar.ts, theoretical, realistic) {
                tracking_error_series.push(point);
            }

            // Step 8: periodic returns.
            state.roll_periodic_returns(bar);
        }

        let final_capital = state.equity_realistic;
        let temporal_validation = temporal_validator.finalize();
        if matches!(temporal_validation.status, super::temporal::TemporalStatus::FailedTemporalValidation) {
            tracing::warn!(run_id = %run_id, gap_ratio = temporal_validation.gap_ratio, "temporal validation failed");
            if temporal.abort_on_failure {
                return Err(BacktestError::Integrity(IntegrityError::InvariantViolated {
                    name: "temporal_validation",
                    detail: format!("gap_ratio {} exceeds max_gap_ratio {}", temporal_validation.gap_ratio, temporal_validation.max_gap_ratio),
                }));
            }
        }

        let stats = execution_sim.stats();
        let fallback_rate = stats.fallback_rate();
        let execution_reliability = if stats.is_unreliable(&execution) {
            ExecutionReliability::Unreliable
        } else if stats.is_degraded(&execution) {
            ExecutionReliability::Degraded
        } else {
            ExecutionReliability::Ok
        };

        let mut metadata = HashMap::new();
        metadata.insert("run_id".to_string(), serde_json::Value::String(run_id.as_hex()));
        metadata.insert("strategy".to_string(), serde_json::Value::String(request.strategy.name().to_string()));
        metadata.insert("run_at".to_string(), serde_json::Value::String(clock.now().to_rfc3339()));

        let result = BacktestResult {
            start: request.start,
            end: request.end,
            symbol: series.symbol.clone(),
            interval: format!("{:?}", request.timeframe),
            initial_capital: request.initial_capital,
            final_capital,
            trades: state.trades,
            equity_divergence_metrics: EquityDivergenceMetrics::from_curve(&state.equity_curve),
            equity_curve: state.equity_curve,
            returns_per_period: state.periodic_returns,
            data_hash,
            seed: request.seed,
            temporal_validation,
            execution_stats: ResultExecutionStats {
                partial_fills: state.partial_fills,
                rejected_orders: state.rejected_orders,
                orderbook_fallback_count: stats.orderbook_fallback_count,
                orderbook_fallback_pct: fallback_rate * 100.0,
                warnings: stats.warnings.clone(),
                alerts: state.invalid_signals,
            },
            execution_reliability,
            tracking_error: tracking_error_acc.finalize(bars_per_year),
            tracking_error_cumulative: tracking_error_series.iter().map(|p| p.cumulative_rmse).collect(),
            tracking_error_series,
            metadata,
        };

        tracing::info!(run_id = %run_id, final_capital, trades = result.trades.len(), "backtest run complete");
        Ok(result)
    }
}

fn strategy_metrics(state: &BacktestState) -> StrategyMetrics {
    let closed = state.trades.iter().filter(|t| t.status == TradeStatus::Closed).count();
    let wins = state.trades.iter().filter(|t| t.is_winner()).count();
    let hit_rate = if closed > 0 { Some(wins as f64 / closed as f64) } else { None };
    StrategyMetrics { drawdown_pct: state.current_drawdown, rolling_sharpe: None, rolling_hit_rate: hit_rate, closed_trade_count: closed }
}

/// ATR-or-range proxy for the stop distance a sizer needs when a strategy
/// has not yet set an explicit stop at entry time, mirroring the fill
/// model's own volatility fallback (§4.2).
fn sizing_stop_distance(bar: &Candle) -> f64 {
    bar.atr.unwrap_or_else(|| bar.high - bar.low).max(bar.close.abs() * 0.001)
}

fn sweep_active_orders(
    state: &mut BacktestState,
    execution_sim: &mut ExecutionSimulator,
    request: &BacktestRunRequest,
    bar: &Candle,
    repo: &dyn OrderBookRepository,
    fill_model_config: FillModelConfig,
    ledger: &mut Ledger,
) {
    let mut filled = Vec::new();
    let mut still_active = Vec::new();
    for mut order in std::mem::take(&mut state.active_orders) {
        let result = if request.use_orderbook {
            execution_sim.route(&mut order, bar, bar.ts, repo)
        } else {
            order.try_fill(bar, None, &FillModel::new(fill_model_config))
        };
        if result.filled_qty > 0.0 {
            state.partial_fills += 1;
            filled.push((order.side, order.symbol.clone(), result.avg_price, result.filled_qty, result.slippage_pct, bar.ts));
        }
        match &order.status {
            OrderStatus::Filled => {}
            OrderStatus::Cancelled { reason } => {
                if order.remaining_qty() > 0.0 {
                    state.rejected_orders.push(RejectedOrder {
                        ts: bar.ts,
                        symbol: order.symbol.clone(),
                        requested_qty: order.requested_qty,
                        filled_qty: order.filled_qty,
                        reason: reason.clone(),
                    });
                }
            }
            _ => still_active.push(order),
        }
    }
    state.active_orders = still_active;

    for (side, symbol, price, qty, slippage_pct, ts) in filled {
        apply_entry_fill(state, request, &symbol, side, price, qty, slippage_pct, ts, ledger);
    }
}

/// Applies one executed entry/scale-in fill: opens a flat position, folds
/// the fill into an existing same-side position's weighted average, or
/// treats an opposite-side fill as a scale-out.
fn apply_entry_fill(state: &mut BacktestState, request: &BacktestRunRequest, symbol: &str, side: OrderSide, price: f64, qty: f64, slippage_pct: f64, ts: DateTime<Utc>, ledger: &mut Ledger) {
    let commission = request.commission(price * qty);
    let theoretical_price = match side {
        OrderSide::Buy => price / (1.0 + slippage_pct),
        OrderSide::Sell => price / (1.0 - slippage_pct),
    };
    let slippage_cost = (price - theoretical_price).abs() * qty;
    let position_side = match side {
        OrderSide::Buy => PositionSide::Long,
        OrderSide::Sell => PositionSide::Short,
    };

    match state.position.as_mut() {
        Some(position) if !position.is_flat() && position.side == position_side => {
            position.apply_fill(price, qty, ts);
            ledger.realized_pnl_realistic -= commission + slippage_cost;
        }
        Some(position) if !position.is_flat() => {
            let closing_qty = qty.min(position.size);
            let gross_pnl = position.apply_partial_close(price, closing_qty, ts);
            ledger.realized_pnl_realistic += gross_pnl - commission - slippage_cost;
            ledger.realized_pnl_theoretical += gross_pnl;
            if position.is_flat() {
                let mae = position.mae;
                let mfe = position.mfe;
                if let Some(idx) = state.open_trade_index.take() {
                    if let Some(trade) = state.trades.get_mut(idx) {
                        let slippage_exit = if price != 0.0 { slippage_cost / (price * closing_qty).max(1e-12) } else { 0.0 };
                        trade.close(ts, price, commission, slippage_exit, TradeExitReason::Signal, mae, mfe);
                    }
                }
            }
        }
        _ => {
            state.position = Some(Position::open(symbol, position_side, qty, price, ts));
            let trade = TradeFill::open(symbol, side, ts, price, qty, commission, slippage_pct);
            state.trades.push(trade);
            state.open_trade_index = Some(state.trades.len() - 1);
            ledger.realized_pnl_realistic -= commission + slippage_cost;
        }
    }
}

fn close_full_position(state: &mut BacktestState, request: &BacktestRunRequest, ts: DateTime<Utc>, price: f64, reason: TradeExitReason, ledger: &mut Ledger) {
    let Some(mut position) = state.position.take() else { return };
    let qty = position.size;
    let commission = request.commission(price * qty);
    let slippage_fraction = request.fixed_slippage_fraction();
    let slippage_cost = slippage_fraction * price * qty;
    let gross_pnl = position.apply_partial_close(price, qty, ts);
    ledger.realized_pnl_realistic += gross_pnl - commission - slippage_cost;
    ledger.realized_pnl_theoretical += gross_pnl;

    if let Some(idx) = state.open_trade_index.take() {
        let mae = position.mae;
        let mfe = position.mfe;
        if let Some(trade) = state.trades.get_mut(idx) {
            trade.close(ts, price, commission, slippage_fraction, reason, mae, mfe);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_signal(
    state: &mut BacktestState,
    id_gen: &mut IdGen,
    risk_manager: &mut UnifiedRiskManager,
    request: &BacktestRunRequest,
    bar: &Candle,
    max_wait_bars: u32,
    fill_model_config: FillModelConfig,
    signal: Signal,
    ledger: &mut Ledger,
) {
    match signal {
        Signal::Hold => {}
        Signal::Enter { side, entry_price } => {
            if state.has_open_position() {
                return;
            }
            let distance = sizing_stop_distance(bar);
            let stop_for_sizing = match side {
                OrderSide::Buy => entry_price - distance,
                OrderSide::Sell => entry_price + distance,
            };
            let ctx = SizingContext { current_drawdown_pct: Some(state.current_drawdown), ..Default::default() };
            let metrics = strategy_metrics(state);
            let qty = risk_manager.size_trade(state.equity_realistic, entry_price, stop_for_sizing, &ctx, &metrics);
            if qty <= 0.0 {
                return;
            }
            let mut order = Order::new(id_gen.next_order_id(), request.instrument.clone(), side, OrderType::Market, qty, bar.ts, max_wait_bars);
            let result = order.try_fill(bar, None, &FillModel::new(fill_model_config));
            if result.filled_qty > 0.0 {
                state.partial_fills += u64::from(result.filled_qty + 1e-9 < qty);
                apply_entry_fill(state, request, &request.instrument, side, result.avg_price, result.filled_qty, result.slippage_pct, bar.ts, ledger);
            }
            if order.is_active() {
                state.active_orders.push(order);
            } else if let OrderStatus::Cancelled { reason } = &order.status {
                if order.remaining_qty() > 0.0 {
                    state.rejected_orders.push(RejectedOrder { ts: bar.ts, symbol: order.symbol.clone(), requested_qty: order.requested_qty, filled_qty: order.filled_qty, reason: reason.clone() });
                }
            }
        }
        Signal::Exit => {
            if state.has_open_position() {
                close_full_position(state, request, bar.ts, bar.close, TradeExitReason::Signal, ledger);
            }
        }
        Signal::StopLoss { stop_loss } => {
            if let Some(position) = state.position.as_mut() {
                position.stop_loss = Some(stop_loss);
            }
        }
        Signal::TakeProfit { take_profit } => {
            if let Some(position) = state.position.as_mut() {
                position.take_profit = Some(take_profit);
            }
        }
        Signal::TrailingStop { trailing_distance, trailing_distance_pct } => {
            if let Some(position) = state.position.as_mut() {
                let distance = trailing_distance.unwrap_or_else(|| trailing_distance_pct.unwrap_or(0.0) * position.current_price);
                position.trailing_distance = Some(distance);
            }
        }
        Signal::Adjust { size } => {
            let Some(position) = state.position.clone() else { return };
            if position.is_flat() {
                return;
            }
            let (side, qty) = if size > 0.0 {
                let side = match position.side {
                    PositionSide::Long => OrderSide::Buy,
                    PositionSide::Short => OrderSide::Sell,
                    PositionSide::Flat => return,
                };
                (side, size)
            } else {
                let side = match position.side {
                    PositionSide::Long => OrderSide::Sell,
                    PositionSide::Short => OrderSide::Buy,
                    PositionSide::Flat => return,
                };
                (side, size.abs().min(position.size))
            };
            let mut order = Order::new(id_gen.next_order_id(), request.instrument.clone(), side, OrderType::Market, qty, bar.ts, max_wait_bars);
            let result = order.try_fill(bar, None, &FillModel::new(fill_model_config));
            if result.filled_qty > 0.0 {
                apply_entry_fill(state, request, &request.instrument, side, result.avg_price, result.filled_qty, result.slippage_pct, bar.ts, ledger);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::engine::config::{SlippageModel, Timeframe};
    use crate::engine::strategy::{IdentityStrategy, Strategy};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn flat_series(n: usize) -> CandleSeries {
        let candles = (0..n).map(|i| Candle::new(ts(i as i64 * 60), 100.0, 101.0, 99.0, 100.0, 1_000.0)).collect();
        CandleSeries::new("SPY", candles).unwrap()
    }

    struct BuyOnceStrategy {
        entered: bool,
    }

    impl Strategy for BuyOnceStrategy {
        fn on_bar(&mut self, ctx: &StrategyContext) -> Signal {
            if !self.entered && ctx.position.is_none() {
                self.entered = true;
                Signal::Enter { side: OrderSide::Buy, entry_price: ctx.bar.close }
            } else {
                Signal::Hold
            }
        }
    }

    fn request(strategy: Box<dyn Strategy>) -> BacktestRunRequest {
        BacktestRunRequest {
            instrument: "SPY".into(),
            timeframe: Timeframe::M15,
            start: ts(0),
            end: ts(1_200),
            initial_capital: 10_000.0,
            commission_rate: 0.0005,
            slippage_model: SlippageModel::None,
            fixed_slippage_bps: None,
            use_orderbook: false,
            seed: Some(7),
            strategy,
        }
    }

    #[test]
    fn identity_strategy_never_trades_and_preserves_capital() {
        let series = flat_series(20);
        let engine = Engine::new(EngineConfig::default());
        let result = engine.run(request(Box::new(IdentityStrategy)), &series, &FixedClock(ts(0)), None).unwrap();
        assert!(result.trades.is_empty());
        assert!((result.final_capital - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn buying_once_opens_exactly_one_trade() {
        let series = flat_series(20);
        let engine = Engine::new(EngineConfig::default());
        let result = engine.run(request(Box::new(BuyOnceStrategy { entered: false })), &series, &FixedClock(ts(0)), None).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert!(matches!(result.trades[0].status, TradeStatus::Open | TradeStatus::Closed));
    }

    #[test]
    fn empty_series_rejected_by_candle_series_constructor() {
        // CandleSeries::new already refuses empty input, so the engine's own
        // NoDataInRange guard only covers a theoretically-empty slice.
        assert!(CandleSeries::new("SPY", vec![]).is_err());
    }

    #[test]
    fn buy_once_tracking_error_is_nonnegative_for_zero_friction() {
        let series = flat_series(20);
        let engine = Engine::new(EngineConfig::default());
        let result = engine.run(request(Box::new(IdentityStrategy)), &series, &FixedClock(ts(0)), None).unwrap();
        assert!(result.final_capital <= result.initial_capital * 1.001 + 1e-6);
    }

    #[test]
    fn abort_on_failure_aborts_the_run_on_failed_temporal_validation() {
        let candles = vec![
            Candle::new(ts(0), 100.0, 101.0, 99.0, 100.0, 1_000.0),
            Candle::new(ts(60), 100.0, 101.0, 99.0, 100.0, 1_000.0),
            Candle::new(ts(60 + 10_000 * 60), 100.0, 101.0, 99.0, 100.0, 1_000.0),
        ];
        let series = CandleSeries::new("SPY", candles).unwrap();
        let mut config = EngineConfig::default();
        config.temporal.abort_on_failure = true;
        let engine = Engine::new(config);
        let err = engine.run(request(Box::new(IdentityStrategy)), &series, &FixedClock(ts(0)), None).unwrap_err();
        assert!(matches!(err, BacktestError::Integrity(IntegrityError::InvariantViolated { .. })));
    }
}
