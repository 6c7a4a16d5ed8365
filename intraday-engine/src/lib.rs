pub mod allocator;
pub mod args;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod risk;
pub mod screener;
pub mod session;
pub mod signal;
pub mod volatility;

pub use engine::{Engine, RunReport, StockOutcome, StockReport};
pub use error::{EngineError, Result};
