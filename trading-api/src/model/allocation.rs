use crate::model::instrument::InstrumentToken;
use serde::{Deserialize, Serialize};

/// An instrument that passed the liquidity and volatility screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub instrument_token: InstrumentToken,
    pub last_price: f64,
    /// Mean bar range over the session (simplified ATR).
    pub volatility_score: f64,
}

impl Candidate {
    pub fn new(
        symbol: impl Into<String>,
        instrument_token: InstrumentToken,
        last_price: f64,
        volatility_score: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            instrument_token,
            last_price,
            volatility_score,
        }
    }
}

/// Share of trading capital assigned to one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub symbol: String,
    pub capital: f64,
}

impl Allocation {
    pub fn new(symbol: impl Into<String>, capital: f64) -> Self {
        Self {
            symbol: symbol.into(),
            capital,
        }
    }
}
