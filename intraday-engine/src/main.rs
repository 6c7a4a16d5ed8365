use anyhow::Context;
use broker_gateway::{KiteClient, KiteConfig, PaperBroker, RetryPolicy, SyntheticMarket};
use chrono::{FixedOffset, TimeZone, Utc};
use clap::Parser;
use intraday_engine::args::Args;
use intraday_engine::config::{BrokerMode, Settings};
use intraday_engine::{Engine, RunReport, StockOutcome};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use trading::SharedBrokerage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    args.apply(&mut settings);
    settings.validate()?;
    let offset = settings.utc_offset()?;

    let (broker, paper) = build_broker(&settings, offset)?;
    info!(
        "Intraday engine starting: broker {:?}, capital {:.2} x{}, basket {}",
        settings.broker.mode, settings.base_capital, settings.leverage_multiplier, settings.basket_size
    );
    let engine = Engine::new(broker, settings, args.policy)?;

    // A failed pass is reported at exit; the watch below still squares off.
    let mut failure = None;
    let mut unprotected = 0;
    if args.guard_only {
        match engine.enforce_session(now(offset)).await {
            Ok(decision) => info!("Session guard: {}", decision.phase),
            Err(e) => {
                error!("Session guard failed: {}", e);
                failure = Some(e);
            }
        }
    } else {
        if let Some(paper) = &paper {
            paper.set_clock(now(offset));
        }
        match engine.run(now(offset)).await {
            Ok(report) => {
                log_report(&report);
                unprotected = report.unprotected().count();
            }
            Err(e) => {
                error!("Run failed: {}", e);
                failure = Some(e);
            }
        }
    }

    if args.watch {
        let poll = Duration::from_secs(args.poll_secs.max(1));
        let decision = engine.watch(|| now(offset), poll).await;
        info!("Session {}; exiting watch", decision.phase);
    }

    if unprotected > 0 {
        error!("{} position(s) are live without full protection", unprotected);
        std::process::exit(2);
    }
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn now(offset: FixedOffset) -> chrono::DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// The brokerage to trade through, plus the simulator handle in paper mode so
/// its clock can follow the wall clock.
fn build_broker(
    settings: &Settings,
    offset: FixedOffset,
) -> anyhow::Result<(SharedBrokerage, Option<Arc<PaperBroker>>)> {
    match settings.broker.mode {
        BrokerMode::Paper => {
            let today = now(offset).date_naive();
            let session_start = offset
                .from_local_datetime(&today.and_time(settings.session_open))
                .single()
                .context("session open is not a valid exchange time")?;
            let market = SyntheticMarket {
                exchange: settings.exchange.clone(),
                seed: settings.paper.seed,
                instruments: settings.paper.universe_size,
                bars: settings.paper.bars,
                session_start,
                interval: settings.bar_interval,
            };
            let paper = Arc::new(PaperBroker::synthetic(&market));
            let shared: SharedBrokerage = paper.clone();
            Ok((shared, Some(paper)))
        }
        BrokerMode::Kite => {
            let broker = &settings.broker;
            let api_key = broker.api_key.clone().context("broker.api_key is not set")?;
            let access_token = broker.access_token.clone().context("broker.access_token is not set")?;
            let mut config = KiteConfig::new(api_key, settings.exchange.clone())
                .with_base_url(broker.base_url.clone())
                .with_access_token(access_token);
            config.tick_size = broker.tick_size;
            let retry = RetryPolicy::new(
                Duration::from_secs(broker.timeout_secs),
                broker.max_retries,
                Duration::from_millis(broker.retry_backoff_ms),
            );
            let shared: SharedBrokerage = Arc::new(KiteClient::new(config, retry)?);
            Ok((shared, None))
        }
    }
}

fn log_report(report: &RunReport) {
    if let Some(screened) = &report.screened {
        info!(
            "Basket: {} selected, {} skipped",
            screened.candidates.len(),
            screened.skipped.len()
        );
    }
    for stock in &report.stocks {
        match &stock.outcome {
            StockOutcome::Placed(order, receipt) => info!(
                "{} {} x{} @ {:.2} (stop {:.2}, target {:.2}) entry {}",
                order.direction,
                stock.symbol,
                order.quantity,
                order.entry_price,
                order.stop_loss,
                order.target_price,
                receipt.entry.order_id
            ),
            StockOutcome::NoOp(_) => info!("{}: {:.2} buys no shares", stock.symbol, stock.capital),
            StockOutcome::NoSignal => info!("{}: no signal", stock.symbol),
            StockOutcome::Failed(e) => error!("{}: {}", stock.symbol, e),
        }
    }
    info!(
        "Run complete in phase {}: {} placed, {} failed",
        report.phase,
        report.placed().count(),
        report.failures().count()
    );
}
