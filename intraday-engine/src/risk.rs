//! Stop-loss and target computation.
//!
//! The stop sits a fixed fraction away from the entry; the target sits
//! `1 / reward_risk_ratio` stop-distances away on the other side. With the
//! initial ratio of 1/3 the target is three times as far as the stop.

use crate::error::{EngineError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use trading::Direction;

pub const DEFAULT_RISK_FRACTION: f64 = 0.01;

/// Reward:risk ratio of the initial policy (1:3).
pub const INITIAL_RRR: f64 = 1.0 / 3.0;

/// Reward:risk ratio of the adjusted policy (1:2).
pub const ADJUSTED_RRR: f64 = 1.0 / 2.0;

/// Which configured reward:risk ratio new entries use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RiskPolicy {
    /// 1:3, used for the first entries of the session.
    #[default]
    Initial,
    /// 1:2, used once a stop or target has been hit.
    Adjusted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLevels {
    pub stop_loss: f64,
    pub target_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskCalculator {
    risk_fraction: f64,
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self {
            risk_fraction: DEFAULT_RISK_FRACTION,
        }
    }
}

impl RiskCalculator {
    pub fn new(risk_fraction: f64) -> Result<Self> {
        if !(risk_fraction > 0.0 && risk_fraction < 1.0) {
            return Err(EngineError::invalid(format!(
                "risk fraction must be in (0, 1), got {}",
                risk_fraction
            )));
        }
        Ok(Self { risk_fraction })
    }

    pub fn risk_fraction(&self) -> f64 {
        self.risk_fraction
    }

    /// Long-side levels: stop below the entry, target above.
    pub fn compute_risk(&self, entry_price: f64, reward_risk_ratio: f64) -> Result<RiskLevels> {
        validate(entry_price, reward_risk_ratio)?;
        let stop_loss = entry_price * (1.0 - self.risk_fraction);
        let target_price = entry_price + (entry_price - stop_loss) * (1.0 / reward_risk_ratio);
        Ok(RiskLevels {
            stop_loss,
            target_price,
        })
    }

    /// Levels for `direction`. Shorts mirror the long levels around the entry.
    pub fn levels_for(
        &self,
        direction: Direction,
        entry_price: f64,
        reward_risk_ratio: f64,
    ) -> Result<RiskLevels> {
        match direction {
            Direction::Buy => self.compute_risk(entry_price, reward_risk_ratio),
            Direction::Sell => {
                validate(entry_price, reward_risk_ratio)?;
                let stop_loss = entry_price * (1.0 + self.risk_fraction);
                let target_price = entry_price - (stop_loss - entry_price) * (1.0 / reward_risk_ratio);
                if target_price <= 0.0 {
                    return Err(EngineError::invalid(format!(
                        "short target {:.4} for entry {} is not a positive price",
                        target_price, entry_price
                    )));
                }
                Ok(RiskLevels {
                    stop_loss,
                    target_price,
                })
            }
        }
    }
}

/// Long-side levels with the default 1% risk fraction.
pub fn compute_risk(entry_price: f64, reward_risk_ratio: f64) -> Result<RiskLevels> {
    RiskCalculator::default().compute_risk(entry_price, reward_risk_ratio)
}

fn validate(entry_price: f64, reward_risk_ratio: f64) -> Result<()> {
    if !(entry_price.is_finite() && entry_price > 0.0) {
        return Err(EngineError::invalid(format!(
            "entry price must be positive, got {}",
            entry_price
        )));
    }
    if !(reward_risk_ratio.is_finite() && reward_risk_ratio > 0.0) {
        return Err(EngineError::invalid(format!(
            "reward:risk ratio must be positive, got {}",
            reward_risk_ratio
        )));
    }
    Ok(())
}
