// src/providers/http.rs
use crate::domain::errors::{ProviderError, ProviderResult};
use crate::providers::retry::RetryConfig;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Uri};
use hyper_tls::HttpsConnector;
use serde_json::Value;
use std::time::Duration;

/// Longest slice of an error body kept in the error message
const ERROR_BODY_PREVIEW: usize = 200;

/// JSON-over-HTTPS GET with a per-request timeout and bounded retries
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client<HttpsConnector<HttpConnector>>,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, retry: RetryConfig) -> Self {
        let https = HttpsConnector::new();
        let client = Client::builder().build::<_, Body>(https);
        Self {
            client,
            timeout,
            retry,
        }
    }

    /// Build `base?k=v&...` with percent-encoded values
    pub fn url_with_query(base: &str, params: &[(&str, &str)]) -> String {
        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", base, query)
    }

    pub async fn get_json(&self, url: &str) -> ProviderResult<Value> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry.max_retries && self.retry.should_retry(&e) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    log::warn!(
                        "Request failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        delay,
                        attempt + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> ProviderResult<Value> {
        let uri: Uri = url
            .parse()
            .map_err(|e| ProviderError::Request(format!("Invalid URL: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.get(uri))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        let body = tokio::time::timeout(self.timeout, hyper::body::to_bytes(response.into_body()))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !status.is_success() {
            let message: String = String::from_utf8_lossy(&body).chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| ProviderError::MalformedPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_encoded() {
        let url = HttpFetcher::url_with_query(
            "https://example.com/query",
            &[("function", "TIME_SERIES_DAILY"), ("symbol", "BRK B&C")],
        );
        assert_eq!(url, "https://example.com/query?function=TIME_SERIES_DAILY&symbol=BRK%20B%26C");
    }
}
