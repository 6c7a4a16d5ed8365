//! Bracket order placement.
//!
//! A bracket is three sequential orders: the market entry, then a limit order
//! at the target and a stop-market order at the stop, both on the opposite
//! side. Once the entry is live both protective legs are always attempted;
//! if either fails the caller gets a [`PartialProtection`] record instead of
//! a plain error, because a live position is now only partly covered.

use crate::error::{EngineError, Result};
use log::{error, info};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use trading::{
    BrokerageError, Direction, OrderReceipt, OrderRequest, OrderType, Product, SharedBrokerage,
    TradeOrder,
};

/// Serializes bracket placement against the session guard's close-out.
pub type DispatchLock = Arc<Mutex<()>>;

pub fn dispatch_lock() -> DispatchLock {
    Arc::new(Mutex::new(()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum LegStatus {
    Placed(OrderReceipt),
    Failed(BrokerageError),
}

impl LegStatus {
    pub fn is_placed(&self) -> bool {
        matches!(self, LegStatus::Placed(_))
    }
}

impl fmt::Display for LegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegStatus::Placed(receipt) => write!(f, "placed ({})", receipt.order_id),
            LegStatus::Failed(err) => write!(f, "failed ({})", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BracketReceipt {
    pub entry: OrderReceipt,
    pub target: OrderReceipt,
    pub stop: OrderReceipt,
}

/// A live entry whose protection is incomplete.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialProtection {
    pub symbol: String,
    pub direction: Direction,
    pub quantity: u64,
    pub entry: OrderReceipt,
    pub target: LegStatus,
    pub stop: LegStatus,
}

impl PartialProtection {
    pub fn missing_legs(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.target.is_placed() {
            missing.push("target");
        }
        if !self.stop.is_placed() {
            missing.push("stop");
        }
        missing
    }
}

impl fmt::Display for PartialProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partial protection on {} {} x{} (entry {}): target {}, stop {}",
            self.direction, self.symbol, self.quantity, self.entry.order_id, self.target, self.stop
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Zero quantity; nothing was sent.
    NoOp,
    Placed(BracketReceipt),
}

pub struct OrderDispatcher {
    broker: SharedBrokerage,
    lock: DispatchLock,
    exchange: String,
}

impl OrderDispatcher {
    pub fn new(broker: SharedBrokerage, lock: DispatchLock, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            lock,
            exchange: exchange.into(),
        }
    }

    pub async fn place_bracket(&self, order: &TradeOrder) -> Result<DispatchOutcome> {
        if order.quantity == 0 {
            return Ok(DispatchOutcome::NoOp);
        }
        if !order.levels_are_consistent() {
            return Err(EngineError::invalid(format!(
                "{} {}: stop {:.2} / target {:.2} do not straddle entry {:.2}",
                order.direction, order.symbol, order.stop_loss, order.target_price, order.entry_price
            )));
        }

        let _guard = self.lock.lock().await;

        let entry = self
            .broker
            .submit_order(&self.request(order, order.direction, OrderType::Market))
            .await?;
        info!(
            "Entry {} {} x{} placed ({})",
            order.direction, order.symbol, order.quantity, entry.order_id
        );

        let exit = order.direction.opposite();
        let target = self.leg(order, exit, OrderType::Limit(order.target_price)).await;
        let stop = self.leg(order, exit, OrderType::StopMarket(order.stop_loss)).await;

        match (target, stop) {
            (LegStatus::Placed(target), LegStatus::Placed(stop)) => {
                info!(
                    "Bracket complete for {}: target {:.2}, stop {:.2}",
                    order.symbol, order.target_price, order.stop_loss
                );
                Ok(DispatchOutcome::Placed(BracketReceipt {
                    entry,
                    target,
                    stop,
                }))
            }
            (target, stop) => {
                let partial = PartialProtection {
                    symbol: order.symbol.clone(),
                    direction: order.direction,
                    quantity: order.quantity,
                    entry,
                    target,
                    stop,
                };
                error!("{}; missing {:?}", partial, partial.missing_legs());
                Err(EngineError::PartialProtectionFailure(Box::new(partial)))
            }
        }
    }

    async fn leg(&self, order: &TradeOrder, direction: Direction, order_type: OrderType) -> LegStatus {
        match self.broker.submit_order(&self.request(order, direction, order_type)).await {
            Ok(receipt) => LegStatus::Placed(receipt),
            Err(err) => LegStatus::Failed(err),
        }
    }

    fn request(&self, order: &TradeOrder, direction: Direction, order_type: OrderType) -> OrderRequest {
        OrderRequest::new(
            order.symbol.clone(),
            self.exchange.clone(),
            direction,
            order.quantity,
            order_type,
            Product::Intraday,
        )
    }
}
