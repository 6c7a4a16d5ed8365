use crate::model::order::Direction;
use serde::{Deserialize, Serialize};

/// A fully specified bracket trade: entry plus protective stop and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub quantity: u64,
}

impl TradeOrder {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: f64,
        stop_loss: f64,
        target_price: f64,
        quantity: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            entry_price,
            stop_loss,
            target_price,
            quantity,
        }
    }

    /// Whether stop and target straddle the entry on the correct sides:
    /// below/above for a long, above/below for a short.
    pub fn levels_are_consistent(&self) -> bool {
        match self.direction {
            Direction::Buy => self.stop_loss < self.entry_price && self.entry_price < self.target_price,
            Direction::Sell => {
                self.stop_loss > self.entry_price && self.entry_price > self.target_price
            }
        }
    }
}
