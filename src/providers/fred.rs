// src/providers/fred.rs
use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::SeriesBar;
use crate::providers::http::HttpFetcher;
use crate::providers::{bars_in_range, field_f64, MarketDataClient};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

pub const BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// FRED marks missing observations with a lone dot
const MISSING_VALUE: &str = ".";

/// Economic series from the St. Louis Fed; bars carry the value as `close`
#[derive(Clone)]
pub struct FredClient {
    api_key: String,
    http: HttpFetcher,
}

impl FredClient {
    pub fn new(api_key: &str, http: HttpFetcher) -> Self {
        log::info!("FredClient initialized");
        Self {
            api_key: api_key.to_string(),
            http,
        }
    }

    async fn request(&self, series_id: &str, start: NaiveDate, end: NaiveDate) -> ProviderResult<Vec<SeriesBar>> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("FRED".to_string()));
        }

        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let url = HttpFetcher::url_with_query(
            BASE_URL,
            &[
                ("series_id", series_id),
                ("api_key", &self.api_key),
                ("file_type", "json"),
                ("observation_start", &start),
                ("observation_end", &end),
                ("frequency", "d"),
            ],
        );
        let payload = self.http.get_json(&url).await?;
        parse_observations(&payload)
    }
}

#[async_trait]
impl MarketDataClient for FredClient {
    fn name(&self) -> &'static str {
        "fred"
    }

    async fn fetch_series(&self, id: &str, start: NaiveDate, end: NaiveDate) -> Option<Vec<SeriesBar>> {
        match self.request(id, start, end).await {
            Ok(bars) => {
                let bars = bars_in_range(bars, start, end);
                if bars.is_empty() {
                    log::warn!("No valid observations for series {}", id);
                    return None;
                }
                log::info!("Fetched {} records for FRED series {}", bars.len(), id);
                Some(bars)
            }
            Err(e) => {
                log::error!("Error fetching FRED series {}: {}", id, e);
                None
            }
        }
    }
}

/// Observations as bars, skipping missing and unparseable values
pub fn parse_observations(payload: &Value) -> ProviderResult<Vec<SeriesBar>> {
    if payload.get("error_code").is_some() {
        let message = payload
            .get("error_message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(ProviderError::Api(message.to_string()));
    }

    let observations = payload
        .get("observations")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::MalformedPayload("missing 'observations'".to_string()))?;

    let mut bars: Vec<SeriesBar> = observations
        .iter()
        .filter(|obs| obs.get("value").and_then(Value::as_str) != Some(MISSING_VALUE))
        .filter_map(|obs| {
            let date = obs.get("date").and_then(Value::as_str)?;
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            let value = field_f64(obs, "value")?;
            Some(SeriesBar {
                date,
                close: value,
                volume: 0.0,
            })
        })
        .collect();
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_values_are_skipped() {
        let payload = json!({
            "observations": [
                {"date": "2024-01-03", "value": "4.05"},
                {"date": "2024-01-01", "value": "."},
                {"date": "2024-01-02", "value": "3.95"},
                {"date": "2024-01-04", "value": "n/a"}
            ]
        });

        let bars = parse_observations(&payload).unwrap();
        let values: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(values, vec![3.95, 4.05]);
    }

    #[test]
    fn error_code_is_an_api_error() {
        let payload = json!({"error_code": 400, "error_message": "Bad Request. The value for variable api_key is not registered."});
        assert!(matches!(parse_observations(&payload), Err(ProviderError::Api(_))));
    }
}
