use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// The direction that unwinds a position opened in `self`.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    /// Resting order at the given price.
    Limit(f64),
    /// Market order released once the trigger price trades.
    StopMarket(f64),
}

impl OrderType {
    /// Order type code on the brokerage wire.
    pub fn code(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit(_) => "LIMIT",
            OrderType::StopMarket(_) => "SL-M",
        }
    }
}

/// Margin product the order is booked under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    /// Intraday (MIS): the broker squares the position off at session end.
    #[default]
    Intraday,
}

impl Product {
    pub fn code(&self) -> &'static str {
        match self {
            Product::Intraday => "MIS",
        }
    }
}

/// An instruction to buy or sell an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    symbol: String,
    exchange: String,
    direction: Direction,
    quantity: u64,
    order_type: OrderType,
    product: Product,
}

impl OrderRequest {
    pub fn new(
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        direction: Direction,
        quantity: u64,
        order_type: OrderType,
        product: Product,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            direction,
            quantity,
            order_type,
            product,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn product(&self) -> Product {
        self.product
    }
}
