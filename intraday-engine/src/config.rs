//! Engine settings.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file
//! (`intraday.toml` unless `--config` names one), then `INTRADAY_*`
//! environment variables with `__` separating nested keys
//! (`INTRADAY_BROKER__ACCESS_TOKEN`). Command-line flags are applied on top by
//! [`crate::args::Args::apply`].

use crate::error::{EngineError, Result};
use crate::risk::{RiskPolicy, ADJUSTED_RRR, DEFAULT_RISK_FRACTION, INITIAL_RRR};
use crate::signal::DEFAULT_MA_WINDOW;
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, Environment, File};
use chrono::{FixedOffset, NaiveTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use trading::BarInterval;

pub const DEFAULT_CONFIG_NAME: &str = "intraday";
pub const ENV_PREFIX: &str = "INTRADAY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Own capital in rupees.
    pub base_capital: f64,
    /// Intraday margin multiplier applied to `base_capital`.
    pub leverage_multiplier: f64,
    /// Maximum number of stocks traded per run.
    pub basket_size: usize,
    pub min_price: f64,
    pub min_volatility: f64,
    pub ma_window: usize,
    pub risk_fraction: f64,
    pub initial_rrr: f64,
    pub adjusted_rrr: f64,
    #[serde(with = "clock")]
    pub entry_cutoff_time: NaiveTime,
    #[serde(with = "clock")]
    pub squareoff_time: NaiveTime,
    pub bar_interval: BarInterval,
    pub exchange: String,
    /// Fixed UTC offset of the exchange clock, e.g. "+05:30".
    pub exchange_utc_offset: String,
    #[serde(with = "clock")]
    pub session_open: NaiveTime,
    #[serde(with = "clock")]
    pub session_close: NaiveTime,
    pub broker: BrokerSettings,
    pub paper: PaperSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BrokerMode {
    /// In-memory simulator with a synthetic market.
    #[default]
    Paper,
    /// Live Kite Connect REST API.
    Kite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub mode: BrokerMode,
    pub base_url: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub tick_size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    pub seed: u64,
    pub universe_size: usize,
    /// Bars generated per instrument, starting at the session open.
    pub bars: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_capital: 20_000.0,
            leverage_multiplier: 5.0,
            basket_size: 5,
            min_price: 100.0,
            min_volatility: 2.0,
            ma_window: DEFAULT_MA_WINDOW,
            risk_fraction: DEFAULT_RISK_FRACTION,
            initial_rrr: INITIAL_RRR,
            adjusted_rrr: ADJUSTED_RRR,
            entry_cutoff_time: hm(14, 30),
            squareoff_time: hm(15, 10),
            bar_interval: BarInterval::default(),
            exchange: "NSE".to_string(),
            exchange_utc_offset: "+05:30".to_string(),
            session_open: hm(9, 15),
            session_close: hm(15, 30),
            broker: BrokerSettings::default(),
            paper: PaperSettings::default(),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            mode: BrokerMode::default(),
            base_url: broker_gateway::kite::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            access_token: None,
            timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 500,
            tick_size: 0.05,
        }
    }
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            universe_size: 40,
            bars: 75,
        }
    }
}

impl Settings {
    /// Reads the file and environment layers. Call [`Settings::validate`]
    /// once command-line overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        Self::from_builder(Config::builder().add_source(file).add_source(env_source()))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_capital > 0.0) {
            return Err(EngineError::config("base_capital must be positive"));
        }
        if !(self.leverage_multiplier > 0.0) {
            return Err(EngineError::config("leverage_multiplier must be positive"));
        }
        if self.basket_size == 0 {
            return Err(EngineError::config("basket_size must be at least 1"));
        }
        if self.ma_window == 0 {
            return Err(EngineError::config("ma_window must be at least 1"));
        }
        if !(self.risk_fraction > 0.0 && self.risk_fraction < 1.0) {
            return Err(EngineError::config("risk_fraction must be in (0, 1)"));
        }
        if !(self.initial_rrr > 0.0 && self.adjusted_rrr > 0.0) {
            return Err(EngineError::config("reward:risk ratios must be positive"));
        }
        if self.entry_cutoff_time >= self.squareoff_time {
            return Err(EngineError::config(format!(
                "entry_cutoff_time {} must be before squareoff_time {}",
                self.entry_cutoff_time, self.squareoff_time
            )));
        }
        if self.session_open >= self.session_close {
            return Err(EngineError::config("session_open must be before session_close"));
        }
        self.utc_offset()?;
        if self.broker.mode == BrokerMode::Kite {
            if self.broker.api_key.as_deref().map_or(true, str::is_empty) {
                return Err(EngineError::config("broker.api_key is required in kite mode"));
            }
            if self.broker.access_token.as_deref().map_or(true, str::is_empty) {
                return Err(EngineError::config(
                    "broker.access_token is required in kite mode; run `broker-gateway login` first",
                ));
            }
        }
        Ok(())
    }

    /// Leveraged capital available for allocation.
    pub fn total_capital(&self) -> f64 {
        self.base_capital * self.leverage_multiplier
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.exchange_utc_offset.parse::<FixedOffset>().map_err(|e| {
            EngineError::config(format!(
                "exchange_utc_offset {:?} is not a UTC offset: {}",
                self.exchange_utc_offset, e
            ))
        })
    }

    pub fn reward_risk_ratio(&self, policy: RiskPolicy) -> f64 {
        match policy {
            RiskPolicy::Initial => self.initial_rrr,
            RiskPolicy::Adjusted => self.adjusted_rrr,
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// `HH:MM` (or `HH:MM:SS`) wall-clock times.
mod clock {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|_| de::Error::custom(format!("expected HH:MM, got {:?}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;
    use std::collections::HashMap;

    fn from_toml(toml: &str) -> Result<Settings> {
        Settings::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.basket_size, 5);
        assert_eq!(settings.ma_window, 20);
        assert_eq!(settings.min_price, 100.0);
        assert_eq!(settings.min_volatility, 2.0);
        assert_eq!(settings.risk_fraction, 0.01);
        assert_eq!(settings.entry_cutoff_time, hm(14, 30));
        assert_eq!(settings.squareoff_time, hm(15, 10));
        assert_eq!(settings.bar_interval, BarInterval::FiveMinute);
        assert_eq!(settings.total_capital(), 100_000.0);
        assert_eq!(settings.utc_offset().unwrap().local_minus_utc(), 19_800);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_sources_yield_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.basket_size, 5);
        assert_eq!(settings.broker.mode, BrokerMode::Paper);
    }

    #[test]
    fn test_file_overrides() {
        let settings = from_toml(
            r#"
            basket_size = 3
            entry_cutoff_time = "13:45"
            bar_interval = "15minute"

            [broker]
            mode = "kite"
            api_key = "key"
            access_token = "token"
            "#,
        )
        .unwrap();
        assert_eq!(settings.basket_size, 3);
        assert_eq!(settings.entry_cutoff_time, hm(13, 45));
        assert_eq!(settings.bar_interval, BarInterval::FifteenMinute);
        assert_eq!(settings.broker.mode, BrokerMode::Kite);
        assert_eq!(settings.broker.timeout_secs, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides_file() {
        let env: HashMap<String, String> = [
            ("INTRADAY_BASKET_SIZE", "7"),
            ("INTRADAY_BROKER__MAX_RETRIES", "4"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = Settings::from_builder(
            Config::builder()
                .add_source(File::from_str("basket_size = 3", FileFormat::Toml))
                .add_source(env_source().source(Some(env))),
        )
        .unwrap();
        assert_eq!(settings.basket_size, 7);
        assert_eq!(settings.broker.max_retries, 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(from_toml(r#"squareoff_time = "quarter past three""#).is_err());

        let inverted = from_toml(
            r#"
            entry_cutoff_time = "15:20"
            squareoff_time = "15:10"
            "#,
        )
        .unwrap();
        assert!(matches!(inverted.validate(), Err(EngineError::Config(_))));

        let mut settings = Settings::default();
        settings.risk_fraction = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.exchange_utc_offset = "IST".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_kite_mode_requires_credentials() {
        let mut settings = Settings::default();
        settings.broker.mode = BrokerMode::Kite;
        settings.broker.api_key = Some("key".into());
        assert!(settings.validate().is_err());
        settings.broker.access_token = Some("token".into());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_policy_ratio() {
        let settings = Settings::default();
        assert_eq!(settings.reward_risk_ratio(RiskPolicy::Initial), INITIAL_RRR);
        assert_eq!(settings.reward_risk_ratio(RiskPolicy::Adjusted), ADJUSTED_RRR);
    }
}
