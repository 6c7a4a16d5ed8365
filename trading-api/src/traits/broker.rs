//! Defines the `Brokerage` trait, the contract every brokerage adapter fulfils.
//!
//! The intraday engine never talks to a broker directly. It receives a
//! `SharedBrokerage` at construction time, which lets a live REST client, the
//! paper simulator or a test double stand behind the same pipeline.

use crate::error::BrokerageError;
use crate::model::{
    bar::Bar,
    execution::{CloseOutAck, OrderReceipt},
    instrument::{InstrumentInfo, InstrumentToken},
    market_data::{BarInterval, HistoryWindow, Quote},
    order::OrderRequest,
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Exchanges a one-time request token for a session access token.
    ///
    /// # Arguments
    ///
    /// * `request_token` - Token obtained from the broker's login redirect.
    /// * `secret` - The application's API secret.
    ///
    /// # Returns
    ///
    /// * `String` - The access token for subsequent calls.
    async fn authenticate(&self, request_token: &str, secret: &str) -> Result<String, BrokerageError>;

    /// Lists every instrument traded on `exchange`, in the broker's order.
    async fn list_instruments(&self, exchange: &str) -> Result<Vec<InstrumentInfo>, BrokerageError>;

    /// Returns the last traded price of `symbol`.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerageError>;

    /// Returns the time-ascending bars of an instrument within `window`.
    async fn get_history(
        &self,
        instrument_token: InstrumentToken,
        window: HistoryWindow,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, BrokerageError>;

    /// Submits one order.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderReceipt, BrokerageError>;

    /// Cancels pending orders and flattens every open intraday position.
    ///
    /// Calling it with nothing open is not an error; the acknowledgement is
    /// simply empty.
    async fn close_all_positions(&self) -> Result<CloseOutAck, BrokerageError>;
}

/// Brokerage handle shared by every pipeline component.
pub type SharedBrokerage = Arc<dyn Brokerage>;
