use broker_gateway::{KiteClient, KiteConfig, RetryPolicy};
use clap::{Parser, Subcommand};
use log::info;
use std::time::Duration;
use trading::Brokerage;

/// Kite Connect session and lookup tool.
#[derive(Parser, Debug)]
#[command(name = "broker-gateway", version, about, long_about = None)]
struct Cli {
    /// Kite Connect API key.
    #[arg(long, env = "KITE_API_KEY")]
    api_key: String,

    /// Access token from a previous login.
    #[arg(long, env = "KITE_ACCESS_TOKEN")]
    access_token: Option<String>,

    #[arg(long, default_value = "NSE")]
    exchange: String,

    #[arg(long, default_value = broker_gateway::kite::DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-call timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Exchange a login request token for an access token.
    Login {
        #[arg(long)]
        request_token: String,

        #[arg(long, env = "KITE_API_SECRET")]
        api_secret: String,
    },
    /// Print the last traded price of a symbol.
    Quote { symbol: String },
    /// Count the instruments listed on the exchange.
    Instruments,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = KiteConfig::new(cli.api_key, cli.exchange.clone()).with_base_url(cli.base_url);
    if let Some(token) = cli.access_token {
        config = config.with_access_token(token);
    }
    let retry = RetryPolicy::new(Duration::from_secs(cli.timeout_secs), 2, Duration::from_millis(500));
    let client = KiteClient::new(config, retry)?;

    match cli.command {
        Commands::Login {
            request_token,
            api_secret,
        } => {
            let access_token = client.authenticate(&request_token, &api_secret).await?;
            info!("Login succeeded; export KITE_ACCESS_TOKEN for the engine");
            println!("{}", access_token);
        }
        Commands::Quote { symbol } => {
            let quote = client.get_quote(&symbol).await?;
            println!(
                "{} last={} token={}",
                quote.symbol, quote.last_price, quote.instrument_token
            );
        }
        Commands::Instruments => {
            let instruments = client.list_instruments(&cli.exchange).await?;
            let equities = instruments
                .iter()
                .filter(|i| i.instrument_type().is_equity())
                .count();
            println!(
                "{}: {} instruments, {} equities",
                cli.exchange,
                instruments.len(),
                equities
            );
        }
    }

    Ok(())
}
