//! Order-book repository (C1) and slippage/fill-probability model (C2).

pub mod fill_model;
pub mod repository;

pub use fill_model::{DepthMethod, FillModel, FillModelConfig, ImpactFunction, SlippageEstimate};
pub use repository::{InMemoryOrderBookRepository, OrderBookRepository, SaveAudit, SpreadDepth};
