pub mod error;
pub mod model;
pub mod traits;

pub use error::BrokerageError;
pub use model::allocation::{Allocation, Candidate};
pub use model::bar::Bar;
pub use model::execution::{CloseOutAck, OrderReceipt};
pub use model::instrument::{InstrumentInfo, InstrumentToken, InstrumentType};
pub use model::market_data::{BarInterval, HistoryWindow, Quote};
pub use model::order::{Direction, OrderRequest, OrderType, Product};
pub use model::trade::TradeOrder;
pub use traits::broker::{Brokerage, SharedBrokerage};
