// src/api/dto.rs
use crate::analysis::statistics::CorrelationMethod;
use crate::analysis::CorrelationMatrix;
use crate::domain::errors::{AnalysisError, AppError, AppResult};
use crate::domain::models::{GlobalFlowData, Provenance, TimeRange};
use chrono::{DateTime, Utc};
use hyper::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Body, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

pub const PROVENANCE_HEADER: &str = "x-data-provenance";

/// Query string shared by the flow endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowQuery {
    pub time_range: TimeRange,
    pub refresh: bool,
}

impl FlowQuery {
    pub fn parse(query: Option<&str>) -> AppResult<Self> {
        let mut parsed = FlowQuery::default();
        for (key, value) in query_pairs(query) {
            match key.as_str() {
                "timeRange" => {
                    parsed.time_range = value.parse().map_err(AppError::InvalidRequest)?;
                }
                "refresh" => parsed.refresh = parse_bool(&value)?,
                _ => {}
            }
        }
        Ok(parsed)
    }
}

/// Query string of the market insights endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsightsQuery {
    pub method: CorrelationMethod,
}

impl InsightsQuery {
    pub fn parse(query: Option<&str>) -> AppResult<Self> {
        let mut parsed = InsightsQuery::default();
        for (key, value) in query_pairs(query) {
            if key == "method" {
                parsed.method = value.parse()?;
            }
        }
        Ok(parsed)
    }
}

/// Decoded `key=value` pairs; undecodable pairs are skipped
pub fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).ok()?;
            let value = value.replace('+', " ");
            let value = urlencoding::decode(&value).ok()?;
            Some((key.into_owned(), value.into_owned()))
        })
        .collect()
}

fn parse_bool(value: &str) -> AppResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(AppError::InvalidRequest(format!(
            "refresh must be a boolean (got '{}')",
            other
        ))),
    }
}

/// Global flow payload as kept in the response cache
#[derive(Debug, Clone)]
pub struct CachedGlobalFlow {
    pub data: GlobalFlowData,
    pub provenance: Provenance,
    /// Series snapshot the payload was built from
    pub generation: u64,
}

impl CachedGlobalFlow {
    /// Entries built from an older snapshot than `generation` are not served
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation >= generation
    }
}

/// Outflow and inflow between the base region and one partner on the latest date
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BilateralBalance {
    pub source: String,
    pub target: String,
    pub outflow: f64,
    pub inflow: f64,
}

/// Rolling correlation and weighted flow score of one asset pair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairScore {
    pub source: String,
    pub target: String,
    pub rolling_correlation: f64,
    pub flow_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInsightsData {
    pub timestamp: DateTime<Utc>,
    pub method: &'static str,
    /// Undefined correlations serialize as null
    pub correlations: BTreeMap<String, BTreeMap<String, Option<f64>>>,
    pub volatility: BTreeMap<String, f64>,
    pub market_caps: BTreeMap<String, f64>,
    pub flow_intensity: BTreeMap<String, f64>,
    pub pair_scores: Vec<PairScore>,
    pub bilateral_flows: Vec<BilateralBalance>,
    pub insights: Vec<String>,
}

/// Nested map view of a correlation matrix
pub fn correlation_map(matrix: &CorrelationMatrix) -> BTreeMap<String, BTreeMap<String, Option<f64>>> {
    matrix
        .ids
        .iter()
        .zip(&matrix.values)
        .map(|(row_id, row)| {
            let cells = matrix
                .ids
                .iter()
                .zip(row)
                .map(|(col_id, value)| (col_id.clone(), Some(*value).filter(|v| v.is_finite())))
                .collect();
            (row_id.clone(), cells)
        })
        .collect()
}

/// Error answered to an HTTP client as `{"detail": ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            retry_after: None,
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("Not Found: {}", path))
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    /// Map an application error raised while producing `what` data
    pub fn from_app(err: AppError, what: &str, retry_after: u64) -> Self {
        match err {
            AppError::DataUnavailable(detail) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                detail,
                retry_after: Some(retry_after),
            },
            AppError::InvalidRequest(detail) => Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail),
            AppError::Analysis(e @ AnalysisError::UnknownMethod(_)) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            other => {
                log::error!("Error generating {} data: {}", what, other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error generating {} data: {}", what, other),
                )
            }
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = json_response(self.status, &json!({ "detail": self.detail }), None);
        if let Some(secs) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

/// JSON response, tagged with the provenance header when one is given
pub fn json_response<T: Serialize>(status: StatusCode, payload: &T, provenance: Option<Provenance>) -> Response<Body> {
    let (status, body) = match serde_json::to_vec(payload) {
        Ok(body) => (status, body),
        Err(e) => {
            log::error!("Failed to serialize response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"detail":"Failed to serialize response"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(provenance) = provenance {
        response
            .headers_mut()
            .insert(PROVENANCE_HEADER, HeaderValue::from_static(provenance.as_str()));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_query_defaults() {
        let query = FlowQuery::parse(None).unwrap();
        assert_eq!(query.time_range, TimeRange::OneWeek);
        assert!(!query.refresh);
    }

    #[test]
    fn flow_query_reads_both_parameters() {
        let query = FlowQuery::parse(Some("timeRange=3M&refresh=1&other=x")).unwrap();
        assert_eq!(query.time_range, TimeRange::ThreeMonths);
        assert!(query.refresh);
    }

    #[test]
    fn query_values_are_form_decoded() {
        let pairs = query_pairs(Some("note=net+flow%2Fday&time%52ange=1M&flag"));
        assert_eq!(
            pairs,
            vec![
                ("note".to_string(), "net flow/day".to_string()),
                ("timeRange".to_string(), "1M".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn bad_parameters_are_invalid_requests() {
        assert!(matches!(FlowQuery::parse(Some("timeRange=2W")), Err(AppError::InvalidRequest(_))));
        assert!(matches!(FlowQuery::parse(Some("refresh=maybe")), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn insights_query_rejects_unknown_method() {
        assert_eq!(InsightsQuery::parse(Some("method=kendall")).unwrap().method, CorrelationMethod::Kendall);
        let err = InsightsQuery::parse(Some("method=cosine")).unwrap_err();
        assert_eq!(ApiError::from_app(err, "market insights", 60).status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn data_unavailable_maps_to_503_with_retry_after() {
        let err = ApiError::from_app(AppError::DataUnavailable("later".into()), "global flow", 120);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.detail, "later");

        let response = err.into_response();
        assert_eq!(response.headers()[RETRY_AFTER], "120");
    }

    #[test]
    fn internal_errors_keep_the_error_message() {
        let err = ApiError::from_app(AppError::Server("boom".into()), "global flow", 0);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail, "Error generating global flow data: Server error: boom");
    }

    #[test]
    fn correlation_map_nulls_undefined_cells() {
        let matrix = CorrelationMatrix {
            ids: vec!["a".into(), "b".into()],
            values: vec![vec![1.0, f64::NAN], vec![f64::NAN, f64::NAN]],
        };
        let map = correlation_map(&matrix);
        assert_eq!(map["a"]["a"], Some(1.0));
        assert_eq!(map["a"]["b"], None);
    }
}
