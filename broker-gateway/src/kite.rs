//! Kite Connect v3 REST client.
//!
//! Every call goes through [`RetryPolicy`]. Responses use the Kite JSON
//! envelope (`{"status": "success", "data": ...}` or `{"status": "error",
//! "error_type": ..., "message": ...}`), except the instrument dump which is
//! CSV.

use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::DateTime;
use log::{debug, info, warn};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use trading::model::instrument::InstrumentToken;
use trading::{
    Bar, BarInterval, Brokerage, BrokerageError, CloseOutAck, Direction, HistoryWindow,
    InstrumentInfo, InstrumentType, OrderReceipt, OrderRequest, OrderType, Product, Quote,
};

pub const DEFAULT_BASE_URL: &str = "https://api.kite.trade";
const KITE_VERSION: &str = "3";
const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CANDLE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Order statuses that still rest at the exchange.
const PENDING_STATUSES: [&str; 2] = ["OPEN", "TRIGGER PENDING"];

/// Connection settings for [`KiteClient`].
#[derive(Debug, Clone)]
pub struct KiteConfig {
    pub base_url: String,
    pub api_key: String,
    /// Access token from a previous login; `None` until `authenticate` runs.
    pub access_token: Option<String>,
    /// Exchange used for quote lookups and close-out orders.
    pub exchange: String,
    /// Minimum price increment for limit and trigger prices.
    pub tick_size: f64,
}

impl KiteConfig {
    pub fn new(api_key: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            access_token: None,
            exchange: exchange.into(),
            tick_size: 0.05,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

pub struct KiteClient {
    http: reqwest::Client,
    config: KiteConfig,
    retry: RetryPolicy,
    access_token: RwLock<Option<String>>,
}

impl KiteClient {
    pub fn new(config: KiteConfig, retry: RetryPolicy) -> Result<Self, BrokerageError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BrokerageError::Transport(e.to_string()))?;
        let access_token = RwLock::new(config.access_token.clone());
        Ok(Self {
            http,
            config,
            retry,
            access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorization(&self) -> Result<String, BrokerageError> {
        let guard = self
            .access_token
            .read()
            .map_err(|_| BrokerageError::Auth("session lock poisoned".into()))?;
        match guard.as_deref() {
            Some(token) => Ok(format!("token {}:{}", self.config.api_key, token)),
            None => Err(BrokerageError::Auth("no access token, log in first".into())),
        }
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, BrokerageError> {
        Ok(self
            .http
            .get(self.url(path))
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", self.authorization()?))
    }

    /// Sends the request built by `build` and decodes the JSON envelope.
    async fn call<T, B>(&self, label: &str, idempotent: bool, build: B) -> Result<T, BrokerageError>
    where
        T: DeserializeOwned,
        B: Fn() -> Result<RequestBuilder, BrokerageError>,
    {
        self.retry
            .run(label, idempotent, || {
                let request = build();
                async move {
                    let (status, body) = send(request?).await?;
                    decode_envelope(status, &body)
                }
            })
            .await
    }

    async fn place(&self, request: &OrderRequest) -> Result<OrderReceipt, BrokerageError> {
        let mut form: Vec<(&str, String)> = vec![
            ("tradingsymbol", request.symbol().to_string()),
            ("exchange", request.exchange().to_string()),
            ("transaction_type", request.direction().as_str().to_string()),
            ("order_type", request.order_type().code().to_string()),
            ("quantity", request.quantity().to_string()),
            ("product", request.product().code().to_string()),
            ("validity", "DAY".to_string()),
        ];
        match request.order_type() {
            OrderType::Market => {}
            OrderType::Limit(price) => {
                form.push(("price", format_price(round_to_tick(price, self.config.tick_size))))
            }
            OrderType::StopMarket(trigger) => form.push((
                "trigger_price",
                format_price(round_to_tick(trigger, self.config.tick_size)),
            )),
        }

        let label = format!("place {} {}", request.order_type().code(), request.symbol());
        let placed: PlacedOrder = self
            .call(&label, false, || {
                Ok(self
                    .http
                    .post(self.url("/orders/regular"))
                    .header("X-Kite-Version", KITE_VERSION)
                    .header("Authorization", self.authorization()?)
                    .form(&form))
            })
            .await?;
        debug!("Kite accepted order {} for {}", placed.order_id, request.symbol());
        Ok(OrderReceipt::new(placed.order_id))
    }

    async fn cancel(&self, path: &str) -> Result<(), BrokerageError> {
        let _: PlacedOrder = self
            .call("cancel", true, || {
                Ok(self
                    .http
                    .delete(self.url(path))
                    .header("X-Kite-Version", KITE_VERSION)
                    .header("Authorization", self.authorization()?))
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Brokerage for KiteClient {
    async fn authenticate(&self, request_token: &str, secret: &str) -> Result<String, BrokerageError> {
        let checksum = session_checksum(&self.config.api_key, request_token, secret);
        let form = [
            ("api_key", self.config.api_key.clone()),
            ("request_token", request_token.to_string()),
            ("checksum", checksum),
        ];
        let session: Session = self
            .call("session", false, || {
                Ok(self
                    .http
                    .post(self.url("/session/token"))
                    .header("X-Kite-Version", KITE_VERSION)
                    .form(&form))
            })
            .await?;

        let mut guard = self
            .access_token
            .write()
            .map_err(|_| BrokerageError::Auth("session lock poisoned".into()))?;
        *guard = Some(session.access_token.clone());
        info!("Kite session established");
        Ok(session.access_token)
    }

    async fn list_instruments(&self, exchange: &str) -> Result<Vec<InstrumentInfo>, BrokerageError> {
        let path = format!("/instruments/{}", exchange);
        let csv_body = self
            .retry
            .run("instruments", true, || {
                let request = self.get(&path);
                async move {
                    let (status, body) = send(request?).await?;
                    if (200..300).contains(&status) {
                        Ok(body)
                    } else {
                        decode_envelope::<serde_json::Value>(status, &body).map(|_| String::new())
                    }
                }
            })
            .await?;
        parse_instruments(&csv_body)
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerageError> {
        let key = format!("{}:{}", self.config.exchange, symbol);
        let mut quotes: HashMap<String, LtpEntry> = self
            .call("ltp", true, || Ok(self.get("/quote/ltp")?.query(&[("i", key.as_str())])))
            .await?;
        let entry = quotes
            .remove(&key)
            .ok_or_else(|| BrokerageError::NotFound(key.clone()))?;
        Ok(Quote::new(symbol, entry.last_price, entry.instrument_token))
    }

    async fn get_history(
        &self,
        instrument_token: InstrumentToken,
        window: HistoryWindow,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, BrokerageError> {
        let path = format!("/instruments/historical/{}/{}", instrument_token, interval);
        let from = window.from.format(HISTORY_TIME_FORMAT).to_string();
        let to = window.to.format(HISTORY_TIME_FORMAT).to_string();
        let history: Candles = self
            .call("history", true, || {
                Ok(self
                    .get(&path)?
                    .query(&[("from", from.as_str()), ("to", to.as_str())]))
            })
            .await?;
        history.into_bars()
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderReceipt, BrokerageError> {
        self.place(request).await
    }

    async fn close_all_positions(&self) -> Result<CloseOutAck, BrokerageError> {
        let intraday = Product::Intraday.code();
        let mut failures = Vec::new();

        // 1. Cancel resting intraday orders (protective legs) first so they
        //    cannot fill against the flattening trades.
        let cancelled_orders = match self
            .call::<Vec<KiteOrder>, _>("orders", true, || self.get("/orders"))
            .await
        {
            Ok(orders) => {
                let pending = orders
                    .iter()
                    .filter(|o| o.product == intraday && PENDING_STATUSES.contains(&o.status.as_str()))
                    .collect::<Vec<_>>();
                let (done, failed) = attempt_each(pending, |order| {
                    let path = format!("/orders/{}/{}", order.variety, order.order_id);
                    (format!("order {}", order.order_id), async move { self.cancel(&path).await })
                })
                .await;
                failures.extend(failed);
                done
            }
            Err(e) => {
                failures.push(format!("order book ({})", e));
                0
            }
        };

        // 2. Flatten every open intraday position with an opposite market order.
        let closed_positions = match self
            .call::<Positions, _>("positions", true, || self.get("/portfolio/positions"))
            .await
        {
            Ok(positions) => {
                let open = positions
                    .net
                    .iter()
                    .filter(|p| p.product == intraday && p.quantity != 0)
                    .collect::<Vec<_>>();
                let (done, failed) = attempt_each(open, |position| {
                    let request = flatten_request(position);
                    (position.tradingsymbol.clone(), async move {
                        self.place(&request).await.map(|_| ())
                    })
                })
                .await;
                failures.extend(failed);
                done
            }
            Err(e) => {
                failures.push(format!("positions ({})", e));
                0
            }
        };

        info!(
            "Close-out: {} orders cancelled, {} positions flattened, {} failed",
            cancelled_orders,
            closed_positions,
            failures.len()
        );
        if failures.is_empty() {
            Ok(CloseOutAck {
                cancelled_orders,
                closed_positions,
            })
        } else {
            Err(BrokerageError::CloseOutIncomplete {
                cancelled_orders,
                closed_positions,
                failures,
            })
        }
    }
}

/// Runs every leg `start` builds, carrying on past failures. Returns how
/// many legs succeeded and a `"<leg> (<error>)"` line for each that did not.
async fn attempt_each<T, I, F, Fut>(items: I, mut start: F) -> (usize, Vec<String>)
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> (String, Fut),
    Fut: Future<Output = Result<(), BrokerageError>>,
{
    let mut done = 0;
    let mut failures = Vec::new();
    for item in items {
        let (leg, outcome) = start(item);
        match outcome.await {
            Ok(()) => done += 1,
            Err(e) => {
                warn!("Close-out leg {} failed: {}", leg, e);
                failures.push(format!("{} ({})", leg, e));
            }
        }
    }
    (done, failures)
}

/// Opposite market order that takes `position` back to flat.
fn flatten_request(position: &KitePosition) -> OrderRequest {
    let direction = if position.quantity > 0 {
        Direction::Sell
    } else {
        Direction::Buy
    };
    OrderRequest::new(
        position.tradingsymbol.clone(),
        position.exchange.clone(),
        direction,
        position.quantity.unsigned_abs(),
        OrderType::Market,
        Product::Intraday,
    )
}

async fn send(request: RequestBuilder) -> Result<(u16, String), BrokerageError> {
    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(map_transport_error)?;
    Ok((status, body))
}

fn map_transport_error(e: reqwest::Error) -> BrokerageError {
    if e.is_connect() {
        BrokerageError::Connect(e.to_string())
    } else if e.is_decode() {
        BrokerageError::Decode(e.to_string())
    } else {
        BrokerageError::Transport(e.to_string())
    }
}

/// `sha256(api_key + request_token + api_secret)`, hex encoded.
pub fn session_checksum(api_key: &str, request_token: &str, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(request_token.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Snaps a price to the nearest multiple of `tick`.
pub fn round_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick).round() * tick
}

fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    message: Option<String>,
    error_type: Option<String>,
}

/// Decodes a Kite JSON envelope into its `data` payload or a typed error.
pub(crate) fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, BrokerageError> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => return Err(BrokerageError::Decode(e.to_string())),
        Err(_) => {
            return Err(BrokerageError::Http {
                status,
                body: body.to_string(),
            })
        }
    };

    if envelope.status == "success" {
        return envelope
            .data
            .ok_or_else(|| BrokerageError::Decode("success envelope without data".into()));
    }

    let kind = envelope.error_type.unwrap_or_else(|| "GeneralException".to_string());
    let message = envelope.message.unwrap_or_default();
    Err(match kind.as_str() {
        "TokenException" => BrokerageError::Auth(message),
        // Upstream/OMS trouble and throttling: let the status code decide.
        "NetworkException" => BrokerageError::Http {
            status,
            body: message,
        },
        _ if status == 429 => BrokerageError::Http {
            status,
            body: message,
        },
        _ => BrokerageError::Rejected { kind, message },
    })
}

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    instrument_token: InstrumentToken,
    tradingsymbol: String,
    instrument_type: String,
    exchange: String,
}

/// Parses the instrument dump, keeping the broker's row order.
pub(crate) fn parse_instruments(body: &str) -> Result<Vec<InstrumentInfo>, BrokerageError> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    reader
        .deserialize::<InstrumentRow>()
        .map(|row| {
            let row = row.map_err(|e| BrokerageError::Decode(e.to_string()))?;
            Ok(InstrumentInfo::new(
                row.tradingsymbol,
                row.instrument_token,
                InstrumentType::from_code(&row.instrument_type),
                row.exchange,
            ))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Session {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct LtpEntry {
    instrument_token: InstrumentToken,
    last_price: f64,
}

#[derive(Debug, Deserialize)]
struct PlacedOrder {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct KiteOrder {
    order_id: String,
    status: String,
    variety: String,
    product: String,
}

#[derive(Debug, Deserialize)]
struct Positions {
    net: Vec<KitePosition>,
}

#[derive(Debug, Deserialize)]
struct KitePosition {
    tradingsymbol: String,
    exchange: String,
    product: String,
    quantity: i64,
}

/// Candle rows: `[timestamp, open, high, low, close, volume, (oi)]`.
#[derive(Debug, Deserialize)]
struct Candles {
    candles: Vec<Vec<serde_json::Value>>,
}

impl Candles {
    fn into_bars(self) -> Result<Vec<Bar>, BrokerageError> {
        self.candles.iter().map(|row| candle_to_bar(row)).collect()
    }
}

fn candle_to_bar(row: &[serde_json::Value]) -> Result<Bar, BrokerageError> {
    let malformed = || BrokerageError::Decode(format!("malformed candle {:?}", row));
    if row.len() < 5 {
        return Err(malformed());
    }
    let timestamp = row[0]
        .as_str()
        .and_then(|ts| DateTime::parse_from_str(ts, CANDLE_TIME_FORMAT).ok())
        .ok_or_else(malformed)?;
    let price = |i: usize| row[i].as_f64().ok_or_else(malformed);
    Ok(Bar::new(timestamp, price(1)?, price(2)?, price(3)?, price(4)?))
}
