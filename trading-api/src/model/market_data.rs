//! Market data models.
//!
//! Includes `Quote` for last-traded-price lookups, `BarInterval` for bar
//! granularity and `HistoryWindow` for bounding history requests.

use crate::model::instrument::InstrumentToken;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Last traded price of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: f64,
    pub instrument_token: InstrumentToken,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, last_price: f64, instrument_token: InstrumentToken) -> Self {
        Self {
            symbol: symbol.into(),
            last_price,
            instrument_token,
        }
    }
}

/// Bar granularity supported by the brokerage's history endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BarInterval {
    Minute,
    ThreeMinute,
    #[default]
    FiveMinute,
    TenMinute,
    FifteenMinute,
    ThirtyMinute,
    SixtyMinute,
    Day,
}

impl BarInterval {
    /// Wire code used by the history endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            BarInterval::Minute => "minute",
            BarInterval::ThreeMinute => "3minute",
            BarInterval::FiveMinute => "5minute",
            BarInterval::TenMinute => "10minute",
            BarInterval::FifteenMinute => "15minute",
            BarInterval::ThirtyMinute => "30minute",
            BarInterval::SixtyMinute => "60minute",
            BarInterval::Day => "day",
        }
    }

    /// Length of one bar in minutes.
    pub fn minutes(&self) -> i64 {
        match self {
            BarInterval::Minute => 1,
            BarInterval::ThreeMinute => 3,
            BarInterval::FiveMinute => 5,
            BarInterval::TenMinute => 10,
            BarInterval::FifteenMinute => 15,
            BarInterval::ThirtyMinute => 30,
            BarInterval::SixtyMinute => 60,
            BarInterval::Day => 24 * 60,
        }
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(BarInterval::Minute),
            "3minute" => Ok(BarInterval::ThreeMinute),
            "5minute" => Ok(BarInterval::FiveMinute),
            "10minute" => Ok(BarInterval::TenMinute),
            "15minute" => Ok(BarInterval::FifteenMinute),
            "30minute" => Ok(BarInterval::ThirtyMinute),
            "60minute" => Ok(BarInterval::SixtyMinute),
            "day" => Ok(BarInterval::Day),
            other => Err(format!("unknown bar interval '{}'", other)),
        }
    }
}

impl TryFrom<String> for BarInterval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BarInterval> for String {
    fn from(value: BarInterval) -> Self {
        value.as_str().to_string()
    }
}

/// Inclusive time range of a history request, in exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl HistoryWindow {
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Self {
        Self { from, to }
    }

    /// The trading session of `date` between `open` and `close`.
    pub fn session(date: NaiveDate, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            from: date.and_time(open),
            to: date.and_time(close),
        }
    }
}
