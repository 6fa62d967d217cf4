// src/providers/alphavantage.rs
use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::SeriesBar;
use crate::providers::http::HttpFetcher;
use crate::providers::{bars_in_range, field_f64, MarketDataClient};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

pub const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Series ids with this prefix are fetched from the digital currency endpoint
pub const CRYPTO_PREFIX: &str = "CRYPTO:";

const DAILY_SERIES_KEY: &str = "Time Series (Daily)";
const CRYPTO_SERIES_KEY: &str = "Time Series (Digital Currency Daily)";
const CRYPTO_MARKET: &str = "USD";

/// Daily equity/ETF and crypto bars from Alpha Vantage
#[derive(Clone)]
pub struct AlphaVantageClient {
    api_key: String,
    http: HttpFetcher,
}

impl AlphaVantageClient {
    pub fn new(api_key: &str, http: HttpFetcher) -> Self {
        log::info!("AlphaVantageClient initialized");
        Self {
            api_key: api_key.to_string(),
            http,
        }
    }

    async fn request(&self, id: &str) -> ProviderResult<Vec<SeriesBar>> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("Alpha Vantage".to_string()));
        }

        match id.strip_prefix(CRYPTO_PREFIX) {
            Some(symbol) => {
                let url = HttpFetcher::url_with_query(
                    BASE_URL,
                    &[
                        ("function", "DIGITAL_CURRENCY_DAILY"),
                        ("symbol", symbol),
                        ("market", CRYPTO_MARKET),
                        ("apikey", &self.api_key),
                        ("datatype", "json"),
                    ],
                );
                let payload = self.http.get_json(&url).await?;
                parse_digital_currency_daily(&payload, CRYPTO_MARKET)
            }
            None => {
                let url = HttpFetcher::url_with_query(
                    BASE_URL,
                    &[
                        ("function", "TIME_SERIES_DAILY"),
                        ("symbol", id),
                        ("apikey", &self.api_key),
                        ("outputsize", "full"),
                        ("datatype", "json"),
                    ],
                );
                let payload = self.http.get_json(&url).await?;
                parse_time_series_daily(&payload)
            }
        }
    }
}

#[async_trait]
impl MarketDataClient for AlphaVantageClient {
    fn name(&self) -> &'static str {
        "alpha_vantage"
    }

    async fn fetch_series(&self, id: &str, start: NaiveDate, end: NaiveDate) -> Option<Vec<SeriesBar>> {
        match self.request(id).await {
            Ok(bars) => {
                let bars = bars_in_range(bars, start, end);
                log::info!("Fetched {} records for {}", bars.len(), id);
                (!bars.is_empty()).then_some(bars)
            }
            Err(ProviderError::RateLimit(message)) => {
                log::warn!("Alpha Vantage rate limit for {}: {}", id, message);
                None
            }
            Err(e) => {
                log::error!("Error fetching {} from Alpha Vantage: {}", id, e);
                None
            }
        }
    }
}

/// Error and throttling payloads come back with HTTP 200
fn check_api_messages(payload: &Value) -> ProviderResult<()> {
    if let Some(message) = payload.get("Error Message") {
        return Err(ProviderError::Api(message.to_string()));
    }
    for key in ["Note", "Information"] {
        if let Some(message) = payload.get(key) {
            return Err(ProviderError::RateLimit(message.to_string()));
        }
    }
    Ok(())
}

fn series_object<'a>(payload: &'a Value, key: &str) -> ProviderResult<&'a serde_json::Map<String, Value>> {
    payload.get(key).and_then(Value::as_object).ok_or_else(|| {
        let keys: Vec<&str> = payload
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        ProviderError::MalformedPayload(format!("missing '{}', keys: {:?}", key, keys))
    })
}

/// Bars from a TIME_SERIES_DAILY payload, sorted by date
pub fn parse_time_series_daily(payload: &Value) -> ProviderResult<Vec<SeriesBar>> {
    check_api_messages(payload)?;
    let series = series_object(payload, DAILY_SERIES_KEY)?;

    let mut bars = Vec::with_capacity(series.len());
    for (date, values) in series {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| ProviderError::MalformedPayload(format!("bad date '{}': {}", date, e)))?;
        let close = field_f64(values, "4. close")
            .ok_or_else(|| ProviderError::MalformedPayload(format!("no close on {}", date)))?;
        let volume = field_f64(values, "5. volume").unwrap_or(0.0);
        bars.push(SeriesBar { date, close, volume });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

/// Bars from a DIGITAL_CURRENCY_DAILY payload; rows without a usable close are skipped
pub fn parse_digital_currency_daily(payload: &Value, market: &str) -> ProviderResult<Vec<SeriesBar>> {
    check_api_messages(payload)?;
    let series = series_object(payload, CRYPTO_SERIES_KEY)?;

    let market_close = format!("4a. close ({})", market);
    let mut bars = Vec::with_capacity(series.len());
    for (date_str, values) in series {
        let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            log::warn!("Skipping crypto row with bad date '{}'", date_str);
            continue;
        };
        let close = field_f64(values, &market_close)
            .or_else(|| field_f64(values, "4a. close (USD)"))
            .or_else(|| field_f64(values, "4. close"));
        let Some(close) = close else {
            log::warn!("Skipping date {} due to missing close", date_str);
            continue;
        };
        let volume = field_f64(values, "5. volume")
            .or_else(|| field_f64(values, "6. market cap (USD)"))
            .unwrap_or(0.0);
        bars.push(SeriesBar { date, close, volume });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}
