use crate::error::BacktestError;
use crate::models::Candle;
use crate::retry::retry_request;
use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use log::info;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SAMPLE_DATA_FILE: &str = "reports/sample-data.csv";
const BINANCE_API_BASE_URL: &str = "https://api.binance.com";
const BINANCE_MAX_LIMIT: usize = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Loads OHLCV bars from a CSV with a `timestamp,open,high,low,close,volume` header.
pub fn load_csv(path: &Path) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open market data file {}", path.display()))?;

    let mut candles = Vec::new();
    for (row, record) in reader.deserialize().enumerate() {
        let candle: Candle = record
            .with_context(|| format!("failed to parse row {} of {}", row + 1, path.display()))?;
        candles.push(candle);
    }

    if candles.is_empty() {
        return Err(BacktestError::EmptyData(format!("sample CSV at '{}' is empty", path.display())).into());
    }

    candles.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    info!("Loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

/// Converts `BTC/USDT` style pairs into exchange tickers such as `BTCUSDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(text) => text.parse::<f64>().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

/// Parses the kline array payload returned by the klines endpoint.
pub fn parse_klines(payload: &Value) -> Result<Vec<Candle>> {
    let rows = payload
        .as_array()
        .ok_or_else(|| anyhow!("unexpected klines payload: expected an array"))?;

    let mut candles = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let fields = row
            .as_array()
            .filter(|fields| fields.len() >= 6)
            .ok_or_else(|| anyhow!("kline row {} is malformed", idx))?;
        let open_time = fields[0]
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| anyhow!("kline row {} has an invalid open time", idx))?;
        let number = |pos: usize, name: &str| {
            value_as_f64(&fields[pos])
                .ok_or_else(|| anyhow!("kline row {} has an invalid {}", idx, name))
        };
        candles.push(Candle {
            timestamp: open_time,
            open: number(1, "open")?,
            high: number(2, "high")?,
            low: number(3, "low")?,
            close: number(4, "close")?,
            volume: number(5, "volume")?,
        });
    }

    candles.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(candles)
}

pub struct ExchangeClient {
    exchange_name: String,
    base_url: String,
    client: reqwest::Client,
}

impl ExchangeClient {
    pub fn new(exchange_name: &str) -> Result<Self> {
        Self::with_base_url(exchange_name, BINANCE_API_BASE_URL)
    }

    pub fn with_base_url(exchange_name: &str, base_url: &str) -> Result<Self> {
        let normalized = exchange_name.trim().to_ascii_lowercase();
        if normalized != "binance" {
            return Err(BacktestError::UnsupportedExchange(exchange_name.to_string()).into());
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            exchange_name: normalized,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    async fn request_klines(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Value> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", timeframe.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("{} returned an error status", url))?;
        response
            .json::<Value>()
            .await
            .context("failed to decode klines response")
    }

    pub async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let ticker = normalize_symbol(symbol);
        let limit = limit.clamp(1, BINANCE_MAX_LIMIT);
        info!(
            "Fetching OHLCV from {} for {} timeframe {}",
            self.exchange_name, symbol, timeframe
        );

        let payload = retry_request!(
            format!("{} klines {}", self.exchange_name, ticker),
            self.request_klines(&ticker, timeframe, limit)
        )?;
        let candles = parse_klines(&payload)?;
        if candles.is_empty() {
            return Err(BacktestError::EmptyData("no OHLCV rows returned from exchange".to_string()).into());
        }
        Ok(candles)
    }
}
