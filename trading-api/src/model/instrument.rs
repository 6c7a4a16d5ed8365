//! Defines the data models for tradable instruments.
//!
//! The brokerage publishes its universe as a flat list. Only the fields the
//! screener needs are kept: the trading symbol, the numeric token used for
//! history lookups, the instrument type and the listing exchange.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Brokerage-assigned numeric instrument identifier.
pub type InstrumentToken = u64;

/// Broad instrument category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    /// Cash equity (`EQ`).
    Equity,
    /// Anything else the exchange lists (futures, options, indices...).
    Other(String),
}

impl InstrumentType {
    /// Parses the brokerage's instrument type code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "EQ" => InstrumentType::Equity,
            other => InstrumentType::Other(other.to_string()),
        }
    }

    pub fn is_equity(&self) -> bool {
        matches!(self, InstrumentType::Equity)
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentType::Equity => write!(f, "EQ"),
            InstrumentType::Other(code) => write!(f, "{}", code),
        }
    }
}

/// One entry of the tradable universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// The exchange trading symbol (e.g., "INFY").
    symbol: String,

    /// Numeric id used for history lookups.
    instrument_token: InstrumentToken,

    instrument_type: InstrumentType,

    /// The exchange where this instrument trades (e.g., "NSE").
    exchange: String,
}

impl InstrumentInfo {
    /// Creates a new InstrumentInfo.
    ///
    /// # Arguments
    ///
    /// * `symbol` - The exchange trading symbol.
    /// * `instrument_token` - The brokerage's numeric instrument id.
    /// * `instrument_type` - The instrument category.
    /// * `exchange` - The listing exchange.
    pub fn new(
        symbol: impl Into<String>,
        instrument_token: InstrumentToken,
        instrument_type: InstrumentType,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            instrument_token,
            instrument_type,
            exchange: exchange.into(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn instrument_token(&self) -> InstrumentToken {
        self.instrument_token
    }

    pub fn instrument_type(&self) -> &InstrumentType {
        &self.instrument_type
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}
