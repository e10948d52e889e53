//! Backloop core — event-driven backtesting engine: domain types, the
//! per-bar simulation loop, order/execution/orderbook simulation, position
//! management, and risk sizing.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (candles, orders, fills, positions, trades, ids)
//! - The bar-by-bar engine loop (§4.9) and its strategy port
//! - Orderbook-aware fill simulation and execution routing
//! - Risk sizing, drawdown control and auto-shutdown policy
//! - Tracking-error accounting between the theoretical and realistic ledgers

pub mod analytics;
pub mod clock;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod orderbook;
pub mod risk;
pub mod rng;

pub use error::{BacktestError, InputError, IntegrityError, Result};
