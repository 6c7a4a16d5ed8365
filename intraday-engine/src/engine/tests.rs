use super::*;
use broker_gateway::PaperBroker;
use chrono::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use trading::{Bar, Direction, InstrumentInfo, InstrumentType, OrderType};

fn session_start() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-03-04T09:15:00+05:30").unwrap()
}

fn at(hh_mm: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(&format!("2024-03-04T{}:00+05:30", hh_mm)).unwrap()
}

/// 30 five-minute bars with a 4-rupee range and closes `start + step * i`.
fn trend(start: f64, step: f64) -> Vec<Bar> {
    (0..30)
        .map(|i| {
            let close = start + step * i as f64;
            Bar::new(
                session_start() + Duration::minutes(5 * i),
                close,
                close + 2.0,
                close - 2.0,
                close,
            )
        })
        .collect()
}

fn equity(symbol: &str, token: u64) -> InstrumentInfo {
    InstrumentInfo::new(symbol, token, InstrumentType::Equity, "NSE")
}

/// UP trends up, DOWN trends down, FLAT never moves, PENNY fails the price
/// floor.
fn create_test_broker() -> Arc<PaperBroker> {
    Arc::new(
        PaperBroker::new()
            .with_quoted_instrument(equity("PENNY", 1), 40.0, trend(40.0, 0.0))
            .with_quoted_instrument(equity("UP", 2), 220.0, trend(200.0, 1.0))
            .with_quoted_instrument(equity("DOWN", 3), 280.0, trend(300.0, -1.0))
            .with_quoted_instrument(equity("FLAT", 4), 150.0, trend(150.0, 0.0)),
    )
}

fn create_test_engine(broker: &Arc<PaperBroker>, settings: Settings) -> Engine {
    Engine::new(broker.clone(), settings, RiskPolicy::Initial).unwrap()
}

fn outcome<'a>(report: &'a RunReport, symbol: &str) -> &'a StockOutcome {
    &report
        .stocks
        .iter()
        .find(|s| s.symbol == symbol)
        .unwrap_or_else(|| panic!("no report for {}", symbol))
        .outcome
}

#[tokio::test]
async fn test_run_places_brackets_for_selected_stocks() {
    let broker = create_test_broker();
    let engine = create_test_engine(&broker, Settings::default());

    let report = engine.run(at("11:00")).await.unwrap();
    assert_eq!(report.phase, SessionPhase::OpenForEntry);
    assert_eq!(report.close_out, None);

    let screened = report.screened.as_ref().unwrap();
    let symbols: Vec<&str> = screened.candidates.iter().map(|c| c.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["UP", "DOWN", "FLAT"]);

    // Equal volatility, so equal thirds of 20 000 x 5.
    for allocation in &report.allocations {
        assert!((allocation.capital - 100_000.0 / 3.0).abs() < 1e-6);
    }

    match outcome(&report, "UP") {
        StockOutcome::Placed(order, _) => {
            assert_eq!(order.direction, Direction::Buy);
            // Last close inside the 09:15-11:00 window is bar 21.
            assert!((order.entry_price - 221.0).abs() < 1e-9);
            assert!((order.stop_loss - 218.79).abs() < 1e-9);
            assert!((order.target_price - 227.63).abs() < 1e-6);
            assert_eq!(order.quantity, 151);
        }
        other => panic!("unexpected outcome for UP: {other:?}"),
    }
    match outcome(&report, "DOWN") {
        StockOutcome::Placed(order, _) => {
            assert_eq!(order.direction, Direction::Sell);
            assert!(order.stop_loss > order.entry_price && order.entry_price > order.target_price);
            assert_eq!(order.quantity, 119);
        }
        other => panic!("unexpected outcome for DOWN: {other:?}"),
    }
    assert!(matches!(outcome(&report, "FLAT"), StockOutcome::NoSignal));

    assert_eq!(report.placed().count(), 2);
    assert_eq!(report.failures().count(), 0);
    assert_eq!(broker.submitted_orders().len(), 6);
    assert_eq!(broker.position("UP"), 151);
    assert_eq!(broker.position("DOWN"), -119);
}

#[tokio::test]
async fn test_no_orders_after_cutoff() {
    let broker = create_test_broker();
    let engine = create_test_engine(&broker, Settings::default());

    let report = engine.run(at("14:45")).await.unwrap();
    assert_eq!(report.phase, SessionPhase::NoNewEntries);
    assert!(report.screened.is_none());
    assert!(report.stocks.is_empty());
    assert_eq!(broker.call_count(), 0);
}

#[tokio::test]
async fn test_phase_follows_exchange_clock() {
    let broker = create_test_broker();
    let engine = create_test_engine(&broker, Settings::default());

    // 09:05 UTC is 14:35 in Mumbai.
    let now = DateTime::parse_from_rfc3339("2024-03-04T09:05:00+00:00").unwrap();
    assert_eq!(engine.phase_at(now), SessionPhase::NoNewEntries);
    let report = engine.run(now).await.unwrap();
    assert!(report.stocks.is_empty());
}

#[tokio::test]
async fn test_squareoff_flattens_and_repeats() {
    let broker = create_test_broker();
    let engine = create_test_engine(&broker, Settings::default());
    engine.run(at("11:00")).await.unwrap();

    let report = engine.run(at("15:15")).await.unwrap();
    assert_eq!(report.phase, SessionPhase::SquaredOff);
    let ack = report.close_out.unwrap();
    assert_eq!(ack.cancelled_orders, 4);
    assert_eq!(ack.closed_positions, 2);
    assert_eq!(broker.position("UP"), 0);
    assert_eq!(broker.position("DOWN"), 0);

    let again = engine.run(at("15:20")).await.unwrap();
    assert!(again.close_out.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_basket_is_terminal() {
    let broker = Arc::new(
        PaperBroker::new().with_quoted_instrument(equity("PENNY", 1), 40.0, trend(40.0, 0.0)),
    );
    let engine = create_test_engine(&broker, Settings::default());

    let err = engine.run(at("11:00")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert!(broker.submitted_orders().is_empty());
}

#[tokio::test]
async fn test_partial_protection_is_surfaced() {
    let broker = create_test_broker();
    broker.reject_order_type(OrderType::StopMarket(0.0));
    let engine = create_test_engine(&broker, Settings::default());

    let report = engine.run(at("11:00")).await.unwrap();
    let unprotected: Vec<&str> = report.unprotected().map(|s| s.symbol.as_str()).collect();
    assert_eq!(unprotected, vec!["UP", "DOWN"]);
    assert_eq!(report.placed().count(), 0);
    assert_eq!(broker.position("UP"), 151);
}

#[tokio::test]
async fn test_small_allocation_is_noop() {
    let broker = create_test_broker();
    let mut settings = Settings::default();
    settings.base_capital = 100.0;
    settings.leverage_multiplier = 1.0;
    let engine = create_test_engine(&broker, settings);

    let report = engine.run(at("11:00")).await.unwrap();
    assert!(matches!(outcome(&report, "UP"), StockOutcome::NoOp(_)));
    assert!(matches!(outcome(&report, "DOWN"), StockOutcome::NoOp(_)));
    assert!(broker.submitted_orders().is_empty());
}

#[tokio::test]
async fn test_adjusted_policy_tightens_target() {
    let broker = create_test_broker();
    let engine = Engine::new(broker.clone(), Settings::default(), RiskPolicy::Adjusted).unwrap();

    let report = engine.run(at("11:00")).await.unwrap();
    match outcome(&report, "UP") {
        StockOutcome::Placed(order, _) => assert!((order.target_price - 225.42).abs() < 1e-6),
        other => panic!("unexpected outcome for UP: {other:?}"),
    }
}

#[tokio::test]
async fn test_per_stock_failure_does_not_stop_run() {
    let broker = create_test_broker();
    let mut settings = Settings::default();
    // More bars than the window holds at 11:00.
    settings.ma_window = 25;
    let engine = create_test_engine(&broker, settings);

    let report = engine.run(at("11:00")).await.unwrap();
    assert_eq!(report.stocks.len(), 3);
    assert_eq!(report.failures().count(), 3);
    assert!(matches!(
        outcome(&report, "UP"),
        StockOutcome::Failed(EngineError::InsufficientData { required: 25, available: 22 })
    ));
}

#[tokio::test]
async fn test_nothing_screened_before_open() {
    let broker = create_test_broker();
    let engine = create_test_engine(&broker, Settings::default());

    let report = engine.run(at("09:00")).await.unwrap();
    assert_eq!(report.phase, SessionPhase::OpenForEntry);
    assert!(report.screened.is_none());
    assert!(report.stocks.is_empty());
    assert_eq!(broker.call_count(), 0);
}

#[tokio::test]
async fn test_watch_retries_failed_squareoff() {
    let broker = create_test_broker();
    let engine = create_test_engine(&broker, Settings::default());
    engine.run(at("11:00")).await.unwrap();
    broker.fail_close_outs(2);

    let ticks = ["14:50", "15:10", "15:11", "15:12", "15:13"];
    let tick = AtomicUsize::new(0);
    let clock = || at(ticks[tick.fetch_add(1, Ordering::SeqCst).min(ticks.len() - 1)]);

    let decision = engine.watch(clock, std::time::Duration::from_millis(1)).await;
    assert_eq!(decision.phase, SessionPhase::SquaredOff);
    assert_eq!(decision.close_out.unwrap().closed_positions, 2);
    // One open tick, two failed close-outs, then the one that went through.
    assert_eq!(tick.load(Ordering::SeqCst), 4);
    assert_eq!(broker.close_out_count(), 1);
    assert_eq!(broker.position("UP"), 0);
    assert_eq!(broker.position("DOWN"), 0);
}

#[tokio::test]
async fn test_failed_run_still_squares_off_under_watch() {
    let broker = Arc::new(
        PaperBroker::new().with_quoted_instrument(equity("PENNY", 1), 40.0, trend(40.0, 0.0)),
    );
    let engine = create_test_engine(&broker, Settings::default());
    assert!(engine.run(at("11:00")).await.is_err());

    let decision = engine.watch(|| at("15:10"), std::time::Duration::from_millis(1)).await;
    assert_eq!(decision.phase, SessionPhase::SquaredOff);
    assert_eq!(broker.close_out_count(), 1);
}
