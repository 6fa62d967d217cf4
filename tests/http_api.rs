//! Request-level tests of the HTTP surface, driven through `api::handle`.

use chrono::NaiveDate;
use hyper::{Body, Method, Request, Response, StatusCode};
use money_flow::api::{handle, AppState};
use money_flow::config::Config;
use money_flow::domain::models::{AssetClass, FlowRecord, RegionalPoint};
use money_flow::market_data::{DataPipeline, SeriesStore, SeriesTables};
use money_flow::service::DataRefreshService;
use money_flow::storage::{CacheStore, DataPersistence};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct TestApp {
    _dir: TempDir,
    state: Arc<AppState>,
    refresh: DataRefreshService,
}

fn app() -> TestApp {
    let dir = tempdir().expect("tempdir");
    let persistence = DataPersistence::new(dir.path()).expect("persistence");
    let store = Arc::new(SeriesStore::new());
    let cache = Arc::new(CacheStore::new(Duration::from_secs(300)));

    let refresh = DataRefreshService::new(
        Arc::new(DataPipeline::new(42)),
        persistence,
        store.clone(),
        20,
    );
    let state = Arc::new(AppState::with_rng(
        Config::default(),
        cache,
        store,
        StdRng::seed_from_u64(7),
    ));

    TestApp {
        _dir: dir,
        state,
        refresh,
    }
}

async fn send(state: &Arc<AppState>, method: Method, uri: &str, origin: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(origin) = origin {
        builder = builder.header("Origin", origin);
    }
    let request = builder.body(Body::empty()).expect("request");
    handle(state.clone(), request).await.expect("infallible")
}

async fn get(state: &Arc<AppState>, uri: &str) -> Response<Body> {
    send(state, Method::GET, uri, None).await
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn provenance(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get("x-data-provenance")
        .and_then(|v| v.to_str().ok())
}

// =============================================================================
// Service descriptor and liveness
// =============================================================================

#[tokio::test]
async fn root_describes_the_service() {
    let app = app();
    let response = get(&app.state, "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["name"], "Money Flow Observatory API");
    assert_eq!(body["status"], "running");
    assert_eq!(body["endpoints"]["global_flow"], "/api/global-flow");
}

#[tokio::test]
async fn health_reports_cache_size() {
    let app = app();
    let body = json_body(get(&app.state, "/health").await).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache_size"], 0);
}

#[tokio::test]
async fn endpoint_health_routes_are_static() {
    let app = app();
    let body = json_body(get(&app.state, "/api/industry-flow/health").await).await;
    assert_eq!(body, serde_json::json!({"status": "healthy", "service": "industry-flow"}));

    let body = json_body(get(&app.state, "/api/global-flow/health").await).await;
    assert_eq!(body["service"], "global-flow");
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let app = app();
    let response = get(&app.state, "/api/nowhere").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(json_body(response).await["detail"].is_string());
}

// =============================================================================
// Industry flow
// =============================================================================

#[tokio::test]
async fn industry_flow_returns_a_complete_graph() {
    let app = app();
    let response = get(&app.state, "/api/industry-flow?timeRange=1M").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(provenance(&response), Some("synthetic"));

    let body = json_body(response).await;
    assert_eq!(body["nodes"].as_array().unwrap().len(), 5);
    assert_eq!(body["edges"].as_array().unwrap().len(), 10);
    let node = &body["nodes"][0];
    assert!(node["netFlowPct"].is_number());
    assert!(node["marketCap"].is_number());
    assert!(body["edges"][0]["flowIntensity"].is_number());

    // Never cached
    assert_eq!(app.state.cache.len().await, 0);
}

#[tokio::test]
async fn bad_time_range_is_422() {
    let app = app();
    let response = get(&app.state, "/api/industry-flow?timeRange=2W").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["detail"].as_str().unwrap().contains("timeRange"));
}

// =============================================================================
// Global flow
// =============================================================================

#[tokio::test]
async fn global_flow_without_published_data_is_503() {
    let app = app();
    let response = get(&app.state, "/api/global-flow").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("retry-after"));

    let body = json_body(response).await;
    assert!(body["detail"].as_str().unwrap().starts_with("Data not available yet"));
    assert_eq!(app.state.cache.len().await, 0);
}

#[tokio::test]
async fn global_flow_serves_and_caches_refreshed_data() {
    let app = app();
    assert!(app.refresh.refresh_all_data().await);

    let response = get(&app.state, "/api/global-flow?timeRange=1W").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(provenance(&response), Some("derived"));

    let first = json_body(response).await;
    let regions = first["regions"].as_array().unwrap();
    assert_eq!(regions.len(), 5);
    assert_eq!(regions[0]["id"], "usa");
    assert!(regions[0]["stockChange"].is_number());
    let flows = first["flows"].as_array().unwrap();
    assert!(!flows.is_empty());
    assert!(flows[0]["assetType"].is_string());
    assert!(flows[0]["netFlowPercent"].is_number());

    assert_eq!(app.state.cache.len().await, 1);
    assert!(app.state.cache.get("global_flow_1W").await.is_some());

    // Served from the cache: same timestamp
    let second = json_body(get(&app.state, "/api/global-flow?timeRange=1W").await).await;
    assert_eq!(first["timestamp"], second["timestamp"]);

    // Forced refresh skips the cached entry
    let forced = json_body(get(&app.state, "/api/global-flow?timeRange=1W&refresh=true").await).await;
    assert_eq!(forced["regions"], first["regions"]);
    assert_eq!(app.state.cache.len().await, 1);
}

fn regional(region_id: &str, stock_index: f64) -> RegionalPoint {
    RegionalPoint {
        date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        region_id: region_id.to_string(),
        stock_index,
        currency_strength: 1.0,
        bond_yield: 4.3,
    }
}

/// Regional and flow tables whose usa index and usa->japan amount both equal `tag`
fn tagged_tables(tag: f64) -> SeriesTables {
    SeriesTables {
        asset_prices: Vec::new(),
        regional_data: vec![regional("usa", tag)],
        flow_data: vec![FlowRecord {
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            source: "usa".to_string(),
            target: "japan".to_string(),
            asset_class: AssetClass::Equities,
            amount: tag,
        }],
    }
}

#[tokio::test]
async fn global_flow_without_flow_rows_is_marked_synthetic() {
    let app = app();
    app.state.store.publish(SeriesTables {
        regional_data: vec![regional("usa", 5300.0)],
        ..SeriesTables::default()
    });

    let response = get(&app.state, "/api/global-flow?timeRange=1D").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(provenance(&response), Some("synthetic"));

    let body = json_body(response).await;
    let usa = &body["regions"][0];
    assert_eq!(usa["stockIndex"], 5300.0);
    assert_eq!(usa["stockChange"], 0.0);
    // Regions without rows fall back to registry values
    assert_eq!(body["regions"][1]["stockIndex"], 3187.42);
}

#[tokio::test]
async fn cached_global_flow_is_dropped_once_a_newer_snapshot_is_published() {
    let app = app();
    app.state.store.publish(tagged_tables(1.0));
    let first = json_body(get(&app.state, "/api/global-flow").await).await;
    assert_eq!(first["regions"][0]["stockIndex"], 1.0);
    assert_eq!(app.state.cache.len().await, 1);

    // Cache left in place, as when a slow request stores its result after the refresh cleared it
    app.state.store.publish(tagged_tables(2.0));
    let second = json_body(get(&app.state, "/api/global-flow").await).await;
    assert_eq!(second["regions"][0]["stockIndex"], 2.0);
    assert_eq!(second["flows"][0]["amount"], 2.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn global_flow_never_mixes_tables_from_different_publishes() {
    let app = app();
    app.state.store.publish(tagged_tables(1.0));

    let publisher = {
        let store = app.state.store.clone();
        std::thread::spawn(move || {
            for tag in 2..=300 {
                store.publish(tagged_tables(tag as f64));
            }
        })
    };

    for i in 0..150 {
        let uri = if i % 2 == 0 { "/api/global-flow?refresh=true" } else { "/api/global-flow" };
        let response = get(&app.state, uri).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let usa_index = body["regions"][0]["stockIndex"].as_f64().unwrap();
        let flow = body["flows"]
            .as_array()
            .unwrap()
            .iter()
            .find(|edge| edge["source"] == "usa" && edge["target"] == "japan")
            .expect("usa->japan edge");
        assert_eq!(flow["amount"].as_f64().unwrap(), usa_index);
    }
    publisher.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn global_flow_stays_available_during_a_refresh() {
    let app = app();
    assert!(app.refresh.refresh_all_data().await);

    let reads = async {
        for _ in 0..20 {
            let response = get(&app.state, "/api/global-flow?refresh=true").await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["regions"].as_array().unwrap().len(), 5);
            tokio::task::yield_now().await;
        }
    };
    let (refreshed, ()) = tokio::join!(app.refresh.refresh_all_data(), reads);
    assert!(refreshed);
    assert_eq!(app.state.store.generation(), 2);
}

// =============================================================================
// Market insights
// =============================================================================

#[tokio::test]
async fn market_insights_needs_a_published_snapshot() {
    let app = app();
    let response = get(&app.state, "/api/market-insights").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn market_insights_reports_metrics_over_the_snapshot() {
    let app = app();
    assert!(app.refresh.refresh_all_data().await);

    let response = get(&app.state, "/api/market-insights?method=spearman").await;
    assert_eq!(response.status(), StatusCode::OK);
    // Twenty days of prices give a previous snapshot to measure against
    assert_eq!(provenance(&response), Some("derived"));

    let body = json_body(response).await;
    assert_eq!(body["method"], "spearman");
    assert_eq!(body["correlations"]["stocks"]["stocks"], 1.0);
    assert_eq!(body["volatility"].as_object().unwrap().len(), 5);
    assert_eq!(body["pairScores"].as_array().unwrap().len(), 10);
    assert_eq!(body["bilateralFlows"].as_array().unwrap().len(), 4);
    assert!(!body["insights"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn market_insights_rejects_unknown_methods() {
    let app = app();
    let response = get(&app.state, "/api/market-insights?method=cosine").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn preflight_is_answered_for_allowed_origins() {
    let app = app();
    let response = send(&app.state, Method::OPTIONS, "/api/global-flow", Some("http://localhost:3000")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-origin"], "http://localhost:3000");
    assert!(response.headers().contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn unknown_origins_get_no_cors_headers() {
    let app = app();
    let response = send(&app.state, Method::GET, "/health", Some("http://evil.example")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("access-control-allow-origin"));
}
