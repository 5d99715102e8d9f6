//! Minimal USDT-M futures client. Shaped per the core's `ExchangeClient`
//! capability set (spec.md §6); not a production-complete Binance
//! integration — request signing and the public endpoints used by the
//! live scheduler are implemented, order placement is a thin, rarely
//! exercised path guarded by the fact that paper mode never calls it.

use crate::domain::market::Timeframe;
use crate::domain::ports::ExchangeClient;
use crate::domain::types::{Candle, Ticker};
use crate::infrastructure::core::circuit_breaker::CircuitBreaker;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

/// USDT-M futures REST client. `api_key`/`api_secret` are only required for
/// the signed endpoints (`create_order`, `set_leverage`); the market-data
/// endpoints used by the cycle scheduler are public.
///
/// Market-data calls go through a circuit breaker (spec.md §7: "circuit-open
/// treated as transient"); a tripped breaker surfaces as an error the cycle
/// scheduler already skips the affected symbol for.
pub struct BinanceFuturesClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    circuit: CircuitBreaker,
}

impl BinanceFuturesClient {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            api_secret,
            circuit: CircuitBreaker::new("binance-futures", 5, 2, Duration::from_secs(30)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn sign(&self, query: &str) -> Result<String> {
        let secret = self
            .api_secret
            .as_deref()
            .context("binance api secret not configured")?;
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).context("invalid hmac key length")?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    /// Runs `fut` behind the circuit breaker, flattening its error type back
    /// down to a plain `anyhow::Error` so callers don't need to know about it.
    async fn guarded<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        use crate::infrastructure::core::circuit_breaker::CircuitBreakerError;
        match self.circuit.call(fut).await {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::Open(msg)) => bail!("binance circuit breaker open: {msg}"),
            Err(CircuitBreakerError::Inner(err)) => Err(err),
        }
    }
}

fn to_venue_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

fn from_venue_symbol(symbol: &str, quote: &str) -> Option<String> {
    symbol
        .strip_suffix(quote)
        .map(|base| format!("{base}/{quote}"))
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoSymbol {
    symbol: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    #[serde(rename = "contractType")]
    contract_type: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Debug, Deserialize)]
struct BookTicker {
    symbol: String,
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct DailyTicker {
    symbol: String,
    #[serde(rename = "quoteVolume")]
    quote_volume: String,
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        self.guarded(async {
            let venue_symbol = to_venue_symbol(symbol);
            let url = format!("{}/fapi/v1/klines", self.base_url);
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("symbol", venue_symbol.as_str()),
                    ("interval", &timeframe.to_string()),
                    ("limit", &limit.to_string()),
                ])
                .send()
                .await
                .context("failed to fetch klines from binance")?;

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("binance klines request failed: {body}");
            }

            // Each row: [open_time, open, high, low, close, volume, close_time, ...]
            let rows: Vec<(i64, String, String, String, String, String, i64, serde_json::Value, serde_json::Value, serde_json::Value, serde_json::Value, serde_json::Value)> =
                response.json().await.context("failed to decode klines response")?;

            let step_ms = timeframe.to_ms();
            let candles = rows
                .into_iter()
                .map(|(open_time_ms, open, high, low, close, volume, close_time_ms, ..)| Candle {
                    exchange: "binance".to_string(),
                    symbol: symbol.to_string(),
                    timeframe,
                    open_time_ms,
                    open: open.parse().unwrap_or_default(),
                    high: high.parse().unwrap_or_default(),
                    low: low.parse().unwrap_or_default(),
                    close: close.parse().unwrap_or_default(),
                    volume: volume.parse().unwrap_or_default(),
                    close_time_ms: if close_time_ms > 0 { close_time_ms } else { open_time_ms + step_ms },
                })
                .collect();
            Ok(candles)
        })
        .await
    }

    async fn fetch_tickers(&self) -> Result<Vec<Ticker>> {
        self.guarded(async {
            let book_url = format!("{}/fapi/v1/ticker/bookTicker", self.base_url);
            let book: Vec<BookTicker> = self
                .client
                .get(&book_url)
                .send()
                .await
                .context("failed to fetch book tickers from binance")?
                .json()
                .await
                .context("failed to decode book ticker response")?;

            let volume_url = format!("{}/fapi/v1/ticker/24hr", self.base_url);
            let daily: Vec<DailyTicker> = self
                .client
                .get(&volume_url)
                .send()
                .await
                .context("failed to fetch 24hr tickers from binance")?
                .json()
                .await
                .context("failed to decode 24hr ticker response")?;

            let volumes: std::collections::HashMap<String, String> =
                daily.into_iter().map(|d| (d.symbol, d.quote_volume)).collect();

            let tickers = book
                .into_iter()
                .filter_map(|b| {
                    let symbol = from_venue_symbol(&b.symbol, "USDT")?;
                    let quote_volume = volumes
                        .get(&b.symbol)
                        .and_then(|v| v.parse::<f64>().ok())
                        .and_then(Decimal::from_f64)
                        .unwrap_or_default();
                    Some(Ticker {
                        symbol,
                        bid: b.bid_price.parse().unwrap_or_default(),
                        ask: b.ask_price.parse().unwrap_or_default(),
                        quote_volume,
                    })
                })
                .collect();
            Ok(tickers)
        })
        .await
    }

    async fn fetch_markets(&self) -> Result<Vec<String>> {
        self.guarded(async {
            let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
            let info: ExchangeInfo = self
                .client
                .get(&url)
                .send()
                .await
                .context("failed to fetch exchange info from binance")?
                .json()
                .await
                .context("failed to decode exchange info response")?;

            let symbols = info
                .symbols
                .into_iter()
                .filter(|s| s.quote_asset == "USDT" && s.contract_type == "PERPETUAL" && s.status == "TRADING")
                .filter_map(|s| from_venue_symbol(&s.symbol, "USDT"))
                .collect();
            Ok(symbols)
        })
        .await
    }

    async fn create_order(
        &self,
        symbol: &str,
        side: &str,
        amount: Decimal,
        price: Option<Decimal>,
    ) -> Result<()> {
        warn!(
            symbol,
            side, %amount, ?price,
            "create_order called on the live exchange client; the core must never do this in paper mode"
        );
        let api_key = self.api_key.as_deref().context("binance api key not configured")?;
        let timestamp = Self::now_ms();
        let order_type = if price.is_some() { "LIMIT" } else { "MARKET" };
        let mut query = format!(
            "symbol={}&side={}&type={}&quantity={}&timestamp={}",
            to_venue_symbol(symbol),
            side,
            order_type,
            amount,
            timestamp
        );
        if let Some(p) = price {
            query.push_str(&format!("&price={p}&timeInForce=GTC"));
        }
        let signature = self.sign(&query)?;
        let url = format!("{}/fapi/v1/order?{query}&signature={signature}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .context("failed to submit order to binance")?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("binance order request failed: {body}");
        }
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let api_key = self.api_key.as_deref().context("binance api key not configured")?;
        let timestamp = Self::now_ms();
        let query = format!(
            "symbol={}&leverage={}&timestamp={}",
            to_venue_symbol(symbol),
            leverage,
            timestamp
        );
        let signature = self.sign(&query)?;
        let url = format!("{}/fapi/v1/leverage?{query}&signature={signature}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .context("failed to set leverage on binance")?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("binance set_leverage request failed: {body}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_symbol_strips_slash() {
        assert_eq!(to_venue_symbol("BTC/USDT"), "BTCUSDT");
    }

    #[test]
    fn venue_symbol_roundtrips_through_quote() {
        assert_eq!(from_venue_symbol("ETHUSDT", "USDT"), Some("ETH/USDT".to_string()));
        assert_eq!(from_venue_symbol("ETHBUSD", "USDT"), None);
    }
}
