use crate::error::{EngineError, Result};
use trading::Bar;

/// Mean high-low range of `bars`.
///
/// A simplified ATR: the gap between a bar and the previous close is ignored
/// and the ranges are averaged without smoothing.
pub fn estimate_volatility(bars: &[Bar]) -> Result<f64> {
    if bars.is_empty() {
        return Err(EngineError::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    let total: f64 = bars.iter().map(Bar::range).sum();
    Ok(total / bars.len() as f64)
}
