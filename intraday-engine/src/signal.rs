//! Moving-average entry signal.
//!
//! Trend following: a close above its trailing average is read as upward
//! momentum and bought, a close below is sold short.

use crate::error::{EngineError, Result};
use std::fmt;
use trading::{Bar, Direction};

pub const DEFAULT_MA_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    None,
}

impl Signal {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Buy => Some(Direction::Buy),
            Signal::Sell => Some(Direction::Sell),
            Signal::None => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::None => write!(f, "NONE"),
        }
    }
}

/// Simple moving average of the close over the last `window` bars.
pub fn moving_average(bars: &[Bar], window: usize) -> Result<f64> {
    if window == 0 {
        return Err(EngineError::invalid("moving average window must be at least 1"));
    }
    if bars.len() < window {
        return Err(EngineError::InsufficientData {
            required: window,
            available: bars.len(),
        });
    }
    let tail = &bars[bars.len() - window..];
    Ok(tail.iter().map(|b| b.close).sum::<f64>() / window as f64)
}

/// Compares the last close with its trailing `window`-bar average.
pub fn generate_signal(bars: &[Bar], window: usize) -> Result<Signal> {
    let average = moving_average(bars, window)?;
    let last_close = match bars.last() {
        Some(bar) => bar.close,
        None => {
            return Err(EngineError::InsufficientData {
                required: window,
                available: 0,
            })
        }
    };

    Ok(if last_close > average {
        Signal::Buy
    } else if last_close < average {
        Signal::Sell
    } else {
        Signal::None
    })
}
