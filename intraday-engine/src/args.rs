use crate::config::{BrokerMode, Settings};
use crate::risk::RiskPolicy;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML settings file. Defaults to ./intraday.toml when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Brokerage backend, overriding `broker.mode`.
    #[arg(long, value_enum)]
    pub broker: Option<BrokerMode>,

    /// Reward:risk policy for new entries.
    #[arg(long, value_enum, default_value_t = RiskPolicy::Initial)]
    pub policy: RiskPolicy,

    /// Overrides `basket_size`.
    #[arg(long)]
    pub basket_size: Option<usize>,

    /// Overrides `base_capital`.
    #[arg(long)]
    pub capital: Option<f64>,

    /// Keep running the session guard until square-off.
    #[arg(long)]
    pub watch: bool,

    /// Seconds between session guard checks in watch mode.
    #[arg(long, default_value_t = 30)]
    pub poll_secs: u64,

    /// Skip screening and trading; only enforce the session guard.
    #[arg(long)]
    pub guard_only: bool,
}

impl Args {
    /// Applies command-line overrides, the highest-precedence layer.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(mode) = self.broker {
            settings.broker.mode = mode;
        }
        if let Some(basket_size) = self.basket_size {
            settings.basket_size = basket_size;
        }
        if let Some(capital) = self.capital {
            settings.base_capital = capital;
        }
    }
}
