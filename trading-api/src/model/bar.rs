//! OHLC bar model.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One interval of price history. Series of bars are always time-ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Start of the interval, in exchange-local time.
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(timestamp: DateTime<FixedOffset>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// High minus low for the interval.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}
