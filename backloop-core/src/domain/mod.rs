//! Domain types for the backtesting core.

pub mod candle;
pub mod ids;
pub mod order;
pub mod orderbook_snapshot;
pub mod position;
pub mod trade_fill;

pub use candle::{Candle, CandleSeries, CandleSeriesError};
pub use ids::{DatasetHash, IdGen, OrderId, RunId, TradeId};
pub use order::{FillResult, Order, OrderSide, OrderStatus, OrderType, PartialFill};
pub use orderbook_snapshot::{BookLevel, BookSide, OrderBookError, OrderBookSnapshot};
pub use position::{ExitReason, PartialTakeProfitLevel, PartialTpFire, Position, PositionFill, PositionSide, ProtectiveExit};
pub use trade_fill::{TradeExitReason, TradeFill, TradeStatus};

/// Symbol type alias.
pub type Symbol = String;
