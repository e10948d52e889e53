//! Backtest engine: per-run config, the strategy port, the per-bar
//! simulation loop, and the result it produces (C9, §4.9, §6).

pub mod config;
pub mod loop_runner;
pub mod result;
pub mod state;
pub mod strategy;
pub mod temporal;

pub use config::{BacktestRunRequest, EngineConfig, SlippageModel, TemporalValidationConfig, Timeframe};
pub use loop_runner::Engine;
pub use result::{BacktestResult, EquityDivergenceMetrics, ExecutionReliability, ResultExecutionStats};
pub use state::{BacktestState, EquityPoint, InvalidSignalWarning, PeriodicReturns, RejectedOrder};
pub use strategy::{validate_signal, IdentityStrategy, Signal, SignalError, Strategy, StrategyContext};
pub use temporal::{TemporalStatus, TemporalValidation, TemporalValidator};
