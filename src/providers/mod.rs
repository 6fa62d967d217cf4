// src/providers/mod.rs
// External market data sources
pub mod alphavantage;
pub mod fred;
pub mod http;
pub mod retry;

use crate::domain::models::SeriesBar;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

pub use alphavantage::AlphaVantageClient;
pub use fred::FredClient;
pub use http::HttpFetcher;
pub use retry::{Backoff, RetryConfig};

/// Source of daily series.
///
/// Implementations swallow every network, rate-limit and payload failure and
/// return `None`; choosing a fallback is up to the caller.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Bars dated within `[start, end]`, sorted by date
    async fn fetch_series(&self, id: &str, start: NaiveDate, end: NaiveDate) -> Option<Vec<SeriesBar>>;
}

pub(crate) fn bars_in_range(bars: Vec<SeriesBar>, start: NaiveDate, end: NaiveDate) -> Vec<SeriesBar> {
    bars.into_iter().filter(|b| b.date >= start && b.date <= end).collect()
}

/// Numeric field that providers encode either as a JSON number or a string
pub(crate) fn field_f64(values: &Value, key: &str) -> Option<f64> {
    match values.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_fields_accept_strings_and_numbers() {
        let values = json!({"a": "1.5", "b": 2, "c": "x", "d": null});
        assert_eq!(field_f64(&values, "a"), Some(1.5));
        assert_eq!(field_f64(&values, "b"), Some(2.0));
        assert_eq!(field_f64(&values, "c"), None);
        assert_eq!(field_f64(&values, "d"), None);
        assert_eq!(field_f64(&values, "missing"), None);
    }
}
