//! In-memory brokerage simulator.
//!
//! Market orders fill immediately at the instrument's last price and move the
//! net position. Once a clock is set, quotes come from the last bar at or
//! before it instead of the end of the recorded day. Limit and stop orders rest until `close_all_positions`
//! cancels them. Failures can be injected per symbol or per order type so the
//! pipeline's partial-failure paths can be exercised.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use trading::model::instrument::InstrumentToken;
use trading::{
    Bar, BarInterval, Brokerage, BrokerageError, CloseOutAck, Direction, HistoryWindow,
    InstrumentInfo, InstrumentType, OrderReceipt, OrderRequest, OrderType, Quote,
};
use uuid::Uuid;

struct PaperInstrument {
    info: InstrumentInfo,
    last_price: f64,
    bars: Vec<Bar>,
}

/// A resting protective order.
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub order_id: String,
    pub request: OrderRequest,
}

#[derive(Default)]
struct PaperState {
    instruments: Vec<PaperInstrument>,
    submitted: Vec<OrderRequest>,
    pending: Vec<PendingOrder>,
    positions: HashMap<String, i64>,
    calls: usize,
    close_outs: usize,
    failing_quotes: HashSet<String>,
    failing_history: HashSet<InstrumentToken>,
    rejected_order_types: HashSet<&'static str>,
    failing_close_outs: usize,
    clock: Option<NaiveDateTime>,
}

pub struct PaperBroker {
    state: Mutex<PaperState>,
}

/// Parameters for a randomly generated market.
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    pub exchange: String,
    pub seed: u64,
    pub instruments: usize,
    pub bars: usize,
    /// Timestamp of the first bar.
    pub session_start: DateTime<FixedOffset>,
    pub interval: BarInterval,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperInstrument {
    fn price_at(&self, clock: Option<NaiveDateTime>) -> f64 {
        let (Some(now), Some(first)) = (clock, self.bars.first()) else {
            return self.last_price;
        };
        self.bars
            .iter()
            .take_while(|b| b.timestamp.naive_local() <= now)
            .last()
            .map_or(first.open, |b| b.close)
    }
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Adds an instrument whose last price is the close of its final bar.
    pub fn with_instrument(self, info: InstrumentInfo, bars: Vec<Bar>) -> Self {
        let last_price = bars.last().map(|b| b.close).unwrap_or(0.0);
        self.with_quoted_instrument(info, last_price, bars)
    }

    pub fn with_quoted_instrument(self, info: InstrumentInfo, last_price: f64, bars: Vec<Bar>) -> Self {
        self.lock().instruments.push(PaperInstrument {
            info,
            last_price,
            bars,
        });
        self
    }

    /// Builds a random-walk market. Every fourth instrument is listed as a
    /// future so universe filtering has something to do.
    pub fn synthetic(market: &SyntheticMarket) -> Self {
        let mut rng = StdRng::seed_from_u64(market.seed);
        let step = Duration::minutes(market.interval.minutes());
        let mut broker = Self::new();

        for i in 0..market.instruments {
            let instrument_type = if i % 4 == 3 {
                InstrumentType::Other("FUT".to_string())
            } else {
                InstrumentType::Equity
            };
            let info = InstrumentInfo::new(
                format!("PAPER{:03}", i + 1),
                100_000 + i as InstrumentToken,
                instrument_type,
                market.exchange.clone(),
            );

            let volatility: f64 = rng.gen_range(0.001..0.012);
            let mut price: f64 = rng.gen_range(40.0..2500.0);
            let mut bars = Vec::with_capacity(market.bars);
            for n in 0..market.bars {
                let open = price;
                let close = open * (1.0 + rng.gen_range(-volatility..volatility));
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..volatility));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..volatility));
                bars.push(Bar::new(
                    market.session_start + step * n as i32,
                    open,
                    high,
                    low,
                    close,
                ));
                price = close;
            }
            broker = broker.with_instrument(info, bars);
        }

        info!(
            "Paper market ready: {} instruments, {} bars each (seed {})",
            market.instruments, market.bars, market.seed
        );
        broker
    }

    /// Makes every quote lookup for `symbol` fail.
    pub fn fail_quote(&self, symbol: &str) {
        self.lock().failing_quotes.insert(symbol.to_string());
    }

    /// Makes every history lookup for `instrument_token` fail.
    pub fn fail_history(&self, instrument_token: InstrumentToken) {
        self.lock().failing_history.insert(instrument_token);
    }

    /// Rejects every order of the given type (e.g. `OrderType::Limit(0.0)`).
    pub fn reject_order_type(&self, order_type: OrderType) {
        self.lock().rejected_order_types.insert(order_type.code());
    }

    /// Makes the next `count` close-out requests fail.
    pub fn fail_close_outs(&self, count: usize) {
        self.lock().failing_close_outs = count;
    }

    /// Pins the market clock. Quotes then report the close of the last bar
    /// at or before `now`, or the first bar's open before the session starts.
    pub fn set_clock(&self, now: DateTime<FixedOffset>) {
        self.lock().clock = Some(now.naive_local());
    }

    /// Every order accepted so far, in submission order.
    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.lock().submitted.clone()
    }

    pub fn pending_orders(&self) -> Vec<PendingOrder> {
        self.lock().pending.clone()
    }

    /// Net position in shares; negative when short.
    pub fn position(&self, symbol: &str) -> i64 {
        self.lock().positions.get(symbol).copied().unwrap_or(0)
    }

    /// Total number of brokerage calls received.
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    pub fn close_out_count(&self) -> usize {
        self.lock().close_outs
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Locks the state and counts the call.
    fn begin_call(&self) -> MutexGuard<'_, PaperState> {
        let mut state = self.lock();
        state.calls += 1;
        state
    }
}

#[async_trait]
impl Brokerage for PaperBroker {
    async fn authenticate(&self, _request_token: &str, _secret: &str) -> Result<String, BrokerageError> {
        self.begin_call();
        Ok(format!("paper-{}", Uuid::new_v4()))
    }

    async fn list_instruments(&self, exchange: &str) -> Result<Vec<InstrumentInfo>, BrokerageError> {
        let state = self.begin_call();
        Ok(state
            .instruments
            .iter()
            .filter(|i| i.info.exchange() == exchange)
            .map(|i| i.info.clone())
            .collect())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerageError> {
        let state = self.begin_call();
        if state.failing_quotes.contains(symbol) {
            return Err(BrokerageError::Transport(format!("quote feed down for {}", symbol)));
        }
        state
            .instruments
            .iter()
            .find(|i| i.info.symbol() == symbol)
            .map(|i| Quote::new(symbol, i.price_at(state.clock), i.info.instrument_token()))
            .ok_or_else(|| BrokerageError::NotFound(symbol.to_string()))
    }

    async fn get_history(
        &self,
        instrument_token: InstrumentToken,
        window: HistoryWindow,
        _interval: BarInterval,
    ) -> Result<Vec<Bar>, BrokerageError> {
        let state = self.begin_call();
        if state.failing_history.contains(&instrument_token) {
            return Err(BrokerageError::Transport(format!(
                "history unavailable for {}",
                instrument_token
            )));
        }
        let instrument = state
            .instruments
            .iter()
            .find(|i| i.info.instrument_token() == instrument_token)
            .ok_or_else(|| BrokerageError::NotFound(instrument_token.to_string()))?;
        Ok(instrument
            .bars
            .iter()
            .filter(|b| {
                let local = b.timestamp.naive_local();
                local >= window.from && local <= window.to
            })
            .cloned()
            .collect())
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderReceipt, BrokerageError> {
        let mut state = self.begin_call();
        let code = request.order_type().code();
        if state.rejected_order_types.contains(code) {
            return Err(BrokerageError::rejected(
                "OrderException",
                format!("{} orders disabled", code),
            ));
        }
        if request.quantity() == 0 {
            return Err(BrokerageError::rejected("InputException", "Invalid quantity"));
        }
        if !state.instruments.iter().any(|i| i.info.symbol() == request.symbol()) {
            return Err(BrokerageError::NotFound(request.symbol().to_string()));
        }

        let order_id = Uuid::new_v4().to_string();
        match request.order_type() {
            OrderType::Market => {
                let signed = match request.direction() {
                    Direction::Buy => request.quantity() as i64,
                    Direction::Sell => -(request.quantity() as i64),
                };
                *state.positions.entry(request.symbol().to_string()).or_insert(0) += signed;
            }
            OrderType::Limit(_) | OrderType::StopMarket(_) => state.pending.push(PendingOrder {
                order_id: order_id.clone(),
                request: request.clone(),
            }),
        }
        state.submitted.push(request.clone());
        Ok(OrderReceipt::new(order_id))
    }

    async fn close_all_positions(&self) -> Result<CloseOutAck, BrokerageError> {
        let mut state = self.begin_call();
        if state.failing_close_outs > 0 {
            state.failing_close_outs -= 1;
            return Err(BrokerageError::Transport("order gateway unavailable".into()));
        }
        state.close_outs += 1;

        let cancelled_orders = state.pending.len();
        state.pending.clear();

        let mut closed_positions = 0;
        for quantity in state.positions.values_mut() {
            if *quantity != 0 {
                *quantity = 0;
                closed_positions += 1;
            }
        }

        Ok(CloseOutAck {
            cancelled_orders,
            closed_positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trading::Product;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    fn market(seed: u64) -> SyntheticMarket {
        SyntheticMarket {
            exchange: "NSE".into(),
            seed,
            instruments: 8,
            bars: 30,
            session_start: ist().with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap(),
            interval: BarInterval::FiveMinute,
        }
    }

    fn order(symbol: &str, direction: Direction, qty: u64, order_type: OrderType) -> OrderRequest {
        OrderRequest::new(symbol, "NSE", direction, qty, order_type, Product::Intraday)
    }

    #[tokio::test]
    async fn test_synthetic_market_is_reproducible() {
        let a = PaperBroker::synthetic(&market(7));
        let b = PaperBroker::synthetic(&market(7));

        let universe = a.list_instruments("NSE").await.unwrap();
        assert_eq!(universe.len(), 8);
        assert_eq!(universe.iter().filter(|i| i.instrument_type().is_equity()).count(), 6);

        let qa = a.get_quote("PAPER001").await.unwrap();
        let qb = b.get_quote("PAPER001").await.unwrap();
        assert_eq!(qa, qb);
    }

    #[tokio::test]
    async fn test_history_respects_window() {
        let broker = PaperBroker::synthetic(&market(1));
        let token = broker.get_quote("PAPER001").await.unwrap().instrument_token;
        let start = ist().with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap().naive_local();

        let window = HistoryWindow::new(start, start + Duration::minutes(45));
        let bars = broker.get_history(token, window, BarInterval::FiveMinute).await.unwrap();
        assert_eq!(bars.len(), 10);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_quote_follows_clock() {
        let broker = PaperBroker::synthetic(&market(5));
        let token = broker.get_quote("PAPER001").await.unwrap().instrument_token;
        let start = ist().with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap();
        let window = HistoryWindow::new(start.naive_local(), start.naive_local() + Duration::hours(3));
        let bars = broker.get_history(token, window, BarInterval::FiveMinute).await.unwrap();

        // No clock: the close of the recorded day.
        let end_of_day = broker.get_quote("PAPER001").await.unwrap().last_price;
        assert_eq!(end_of_day, bars[29].close);

        // 10:47 falls inside the bar stamped 10:45.
        broker.set_clock(start + Duration::minutes(92));
        let mid_morning = broker.get_quote("PAPER001").await.unwrap().last_price;
        assert_eq!(mid_morning, bars[18].close);

        broker.set_clock(start - Duration::minutes(10));
        let pre_open = broker.get_quote("PAPER001").await.unwrap().last_price;
        assert_eq!(pre_open, bars[0].open);
    }

    #[tokio::test]
    async fn test_market_orders_move_position_and_close_out_flattens() {
        let broker = PaperBroker::synthetic(&market(3));
        broker
            .submit_order(&order("PAPER001", Direction::Buy, 10, OrderType::Market))
            .await
            .unwrap();
        broker
            .submit_order(&order("PAPER002", Direction::Sell, 4, OrderType::Market))
            .await
            .unwrap();
        broker
            .submit_order(&order("PAPER001", Direction::Sell, 10, OrderType::Limit(120.0)))
            .await
            .unwrap();

        assert_eq!(broker.position("PAPER001"), 10);
        assert_eq!(broker.position("PAPER002"), -4);
        assert_eq!(broker.pending_orders().len(), 1);

        let ack = broker.close_all_positions().await.unwrap();
        assert_eq!(ack.cancelled_orders, 1);
        assert_eq!(ack.closed_positions, 2);
        assert_eq!(broker.position("PAPER001"), 0);

        let again = broker.close_all_positions().await.unwrap();
        assert!(again.is_empty());
        assert_eq!(broker.close_out_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_close_out_leaves_book_untouched() {
        let broker = PaperBroker::synthetic(&market(3));
        broker
            .submit_order(&order("PAPER001", Direction::Buy, 10, OrderType::Market))
            .await
            .unwrap();
        broker.fail_close_outs(1);

        assert!(broker.close_all_positions().await.is_err());
        assert_eq!(broker.position("PAPER001"), 10);
        assert_eq!(broker.close_out_count(), 0);

        let ack = broker.close_all_positions().await.unwrap();
        assert_eq!(ack.closed_positions, 1);
        assert_eq!(broker.position("PAPER001"), 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let broker = PaperBroker::synthetic(&market(3));
        broker.fail_quote("PAPER002");
        broker.reject_order_type(OrderType::StopMarket(0.0));

        assert!(broker.get_quote("PAPER002").await.is_err());
        let err = broker
            .submit_order(&order("PAPER001", Direction::Sell, 1, OrderType::StopMarket(90.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerageError::Rejected { .. }));
        assert!(broker.submitted_orders().is_empty());
    }
}
