//! Volatility screen over the brokerage universe.

use crate::error::EngineError;
use crate::volatility::estimate_volatility;
use log::{debug, info, warn};
use trading::{BarInterval, Candidate, HistoryWindow, InstrumentInfo, SharedBrokerage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenCriteria {
    /// Stop after this many matches.
    pub max_results: usize,
    /// Exclusive lower bound on the last traded price.
    pub min_price: f64,
    /// Exclusive lower bound on the volatility score.
    pub min_volatility: f64,
}

/// An instrument dropped because its data could not be fetched or scored.
#[derive(Debug)]
pub struct SkippedInstrument {
    pub symbol: String,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct ScreenReport {
    pub candidates: Vec<Candidate>,
    pub skipped: Vec<SkippedInstrument>,
}

pub struct Screener {
    broker: SharedBrokerage,
    window: HistoryWindow,
    interval: BarInterval,
}

impl Screener {
    /// `window` is the span of today's session whose bars feed the
    /// volatility score.
    pub fn new(broker: SharedBrokerage, window: HistoryWindow, interval: BarInterval) -> Self {
        Self {
            broker,
            window,
            interval,
        }
    }

    /// Walks `universe` in order and keeps the first `max_results` equities
    /// whose price and volatility both clear the criteria.
    ///
    /// Instruments whose quote or history cannot be fetched are logged and
    /// recorded in the report's `skipped` list; screening carries on.
    pub async fn screen_universe(&self, universe: &[InstrumentInfo], criteria: ScreenCriteria) -> ScreenReport {
        let mut report = ScreenReport::default();
        if criteria.max_results == 0 {
            return report;
        }

        for instrument in universe.iter().filter(|i| i.instrument_type().is_equity()) {
            match self.score(instrument, &criteria).await {
                Ok(Some(candidate)) => {
                    info!(
                        "Selected {} (price {:.2}, volatility {:.4})",
                        candidate.symbol, candidate.last_price, candidate.volatility_score
                    );
                    report.candidates.push(candidate);
                    if report.candidates.len() >= criteria.max_results {
                        break;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!("Skipping {}: {}", instrument.symbol(), error);
                    report.skipped.push(SkippedInstrument {
                        symbol: instrument.symbol().to_string(),
                        error,
                    });
                }
            }
        }

        report
    }

    async fn score(
        &self,
        instrument: &InstrumentInfo,
        criteria: &ScreenCriteria,
    ) -> Result<Option<Candidate>, EngineError> {
        let quote = self.broker.get_quote(instrument.symbol()).await?;
        if quote.last_price <= criteria.min_price {
            debug!("{} below price floor at {:.2}", instrument.symbol(), quote.last_price);
            return Ok(None);
        }

        let bars = self
            .broker
            .get_history(instrument.instrument_token(), self.window, self.interval)
            .await?;
        let volatility_score = estimate_volatility(&bars)?;
        if volatility_score <= criteria.min_volatility {
            debug!("{} too quiet at {:.4}", instrument.symbol(), volatility_score);
            return Ok(None);
        }

        Ok(Some(Candidate::new(
            instrument.symbol(),
            instrument.instrument_token(),
            quote.last_price,
            volatility_score,
        )))
    }
}
