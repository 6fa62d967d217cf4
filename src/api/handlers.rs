// src/api/handlers.rs
use crate::analysis::{generate_insights, MetricsCalculator};
use crate::api::dto::{
    correlation_map, json_response, ApiError, BilateralBalance, CachedGlobalFlow, FlowQuery,
    InsightsQuery, MarketInsightsData, PairScore,
};
use crate::config::Config;
use crate::domain::catalog::{BASE_REGION, REGIONS};
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::{price_series, GlobalFlowData, Provenance};
use crate::flows::{FlowAggregator, GraphSynthesizer};
use crate::market_data::pipeline;
use crate::market_data::SeriesStore;
use crate::service::duration_until_next_run;
use crate::storage::CacheStore;
use chrono::{Local, Utc};
use hyper::{Body, Response, StatusCode};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const SERVICE_NAME: &str = "Money Flow Observatory API";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

type HandlerResult = Result<Response<Body>, ApiError>;

/// Everything the request handlers share
pub struct AppState {
    pub config: Config,
    pub cache: Arc<CacheStore<CachedGlobalFlow>>,
    pub store: Arc<SeriesStore>,
    pub metrics: MetricsCalculator,
    pub aggregator: FlowAggregator,
    pub synthesizer: GraphSynthesizer,
    rng: Mutex<StdRng>,
}

impl AppState {
    pub fn new(
        config: Config,
        cache: Arc<CacheStore<CachedGlobalFlow>>,
        store: Arc<SeriesStore>,
    ) -> Self {
        Self::with_rng(config, cache, store, StdRng::from_entropy())
    }

    /// Same as `new` with a fixed generator for the stochastic endpoints
    pub fn with_rng(
        config: Config,
        cache: Arc<CacheStore<CachedGlobalFlow>>,
        store: Arc<SeriesStore>,
        rng: StdRng,
    ) -> Self {
        let metrics = MetricsCalculator::new(config.data.correlation_window);
        Self {
            aggregator: FlowAggregator::new(metrics.clone()),
            synthesizer: GraphSynthesizer::new(),
            metrics,
            config,
            cache,
            store,
            rng: Mutex::new(rng),
        }
    }

    fn route(&self, name: &str) -> String {
        format!("{}/{}", self.config.server.api_prefix.trim_end_matches('/'), name)
    }

    fn seconds_until_refresh(&self) -> u64 {
        duration_until_next_run(Local::now().naive_local(), self.config.schedule.refresh_hour).as_secs()
    }

    fn unavailable_message(&self) -> String {
        format!(
            "Data not available yet. Data is refreshed daily at {:02}:00. Please wait for the scheduled refresh.",
            self.config.schedule.refresh_hour
        )
    }

    fn api_error(&self, err: AppError, what: &str) -> ApiError {
        ApiError::from_app(err, what, self.seconds_until_refresh())
    }
}

pub async fn root(state: &AppState) -> HandlerResult {
    let payload = json!({
        "name": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "status": "running",
        "timestamp": Utc::now(),
        "endpoints": {
            "industry_flow": state.route("industry-flow"),
            "global_flow": state.route("global-flow"),
            "market_insights": state.route("market-insights"),
            "health": "/health",
        }
    });
    Ok(json_response(StatusCode::OK, &payload, None))
}

pub async fn health(state: &AppState) -> HandlerResult {
    let payload = json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "cache_size": state.cache.len().await,
    });
    Ok(json_response(StatusCode::OK, &payload, None))
}

/// Static liveness payload of one endpoint family
pub async fn service_health(service: &str) -> HandlerResult {
    Ok(json_response(
        StatusCode::OK,
        &json!({ "status": "healthy", "service": service }),
        None,
    ))
}

/// Industry graph, regenerated on every call
pub async fn industry_flow(state: &AppState, query: Option<&str>) -> HandlerResult {
    let query = FlowQuery::parse(query).map_err(|e| state.api_error(e, "industry flow"))?;
    log::info!("Generating industry flow data for time_range={}", query.time_range.as_str());

    let data = {
        let mut rng = state.rng.lock();
        state.synthesizer.generate(&mut *rng)
    };
    Ok(json_response(StatusCode::OK, &data, Some(Provenance::Synthetic)))
}

/// Global flow payload, served from the cache or assembled from the current snapshot
pub async fn global_flow(state: &AppState, query: Option<&str>) -> HandlerResult {
    let query = FlowQuery::parse(query).map_err(|e| state.api_error(e, "global flow"))?;
    let cache_key = format!("global_flow_{}", query.time_range.as_str());

    if !query.refresh {
        if let Some(cached) = state.cache.get(&cache_key).await {
            let generation = state.store.generation();
            if cached.is_current(generation) {
                log::debug!("Returning cached global flow data ({})", cache_key);
                return Ok(json_response(StatusCode::OK, &cached.data, Some(cached.provenance)));
            }
            log::debug!("Cached {} predates snapshot #{}", cache_key, generation);
        }
    }

    log::info!("Generating global flow data for time_range={}", query.time_range.as_str());
    let built = build_global_flow(state).map_err(|e| state.api_error(e, "global flow"))?;

    state
        .cache
        .set(&cache_key, built.clone(), Some(state.config.global_flow_cache_ttl()))
        .await;

    log::info!(
        "Generated global flow data from snapshot #{}: {} regions, {} flows",
        built.generation,
        built.data.regions.len(),
        built.data.flows.len()
    );
    Ok(json_response(StatusCode::OK, &built.data, Some(built.provenance)))
}

/// Regions and flows both come from one snapshot, never from two refreshes
fn build_global_flow(state: &AppState) -> AppResult<CachedGlobalFlow> {
    let snapshot = state.store.snapshot();
    if snapshot.generation == 0 || snapshot.regional_data.is_empty() {
        log::warn!("No regional data published, waiting for the scheduled refresh");
        return Err(AppError::DataUnavailable(state.unavailable_message()));
    }

    let latest = pipeline::current_regional_indices(&snapshot.regional_data);
    let regions = state.aggregator.build_regions(&snapshot.regional_data, &latest);
    let graph = {
        let mut rng = state.rng.lock();
        state.aggregator.build_flow_graph(&snapshot.flow_data, &mut *rng)
    };

    Ok(CachedGlobalFlow {
        data: GlobalFlowData {
            timestamp: Utc::now(),
            regions,
            flows: graph.edges,
        },
        provenance: graph.provenance,
        generation: snapshot.generation,
    })
}

/// Correlation, volatility and flow metrics over the current series snapshot
pub async fn market_insights(state: &AppState, query: Option<&str>) -> HandlerResult {
    let query = InsightsQuery::parse(query).map_err(|e| state.api_error(e, "market insights"))?;
    let (data, provenance) = build_market_insights(state, query).map_err(|e| state.api_error(e, "market insights"))?;
    Ok(json_response(StatusCode::OK, &data, Some(provenance)))
}

fn build_market_insights(state: &AppState, query: InsightsQuery) -> AppResult<(MarketInsightsData, Provenance)> {
    let snapshot = state.store.snapshot();
    if snapshot.asset_prices.is_empty() {
        return Err(AppError::DataUnavailable(state.unavailable_message()));
    }
    log::info!("Computing market insights from snapshot generation {}", snapshot.generation);

    let metrics = &state.metrics;
    let series = price_series(&snapshot.asset_prices);
    let matrix = metrics.calculate_correlation_matrix(&series, query.method);

    let assets: BTreeSet<&str> = snapshot.asset_prices.iter().map(|p| p.asset_id.as_str()).collect();
    let volatility: BTreeMap<String, f64> = assets
        .iter()
        .map(|asset| (asset.to_string(), metrics.calculate_volatility(&series, asset, None)))
        .collect();

    let market_caps = pipeline::current_market_caps(&snapshot.asset_prices);
    let previous_caps = pipeline::previous_market_caps(&snapshot.asset_prices);
    let intensity = {
        let mut rng = state.rng.lock();
        metrics.calculate_flow_intensity_with_rng(&market_caps, previous_caps.as_ref(), &mut *rng)
    };

    let pair_scores = matrix
        .upper_triangle()
        .into_iter()
        .map(|(a, b, _)| {
            let rolling = metrics.calculate_rolling_correlation(&series, a, b, None);
            let relative_flow = intensity.values.get(b).copied().unwrap_or(0.0)
                - intensity.values.get(a).copied().unwrap_or(0.0);
            let pair_volatility = (volatility.get(a).copied().unwrap_or(0.0)
                + volatility.get(b).copied().unwrap_or(0.0))
                / 2.0;
            PairScore {
                source: a.to_string(),
                target: b.to_string(),
                rolling_correlation: rolling,
                flow_score: metrics.calculate_volatility_weighted_flow_score(rolling, relative_flow, pair_volatility, None),
            }
        })
        .collect();

    let bilateral_flows = REGIONS
        .iter()
        .filter(|region| region.id != BASE_REGION)
        .map(|region| {
            let (outflow, inflow) = metrics.calculate_bilateral_flows(&snapshot.flow_data, BASE_REGION, region.id);
            BilateralBalance {
                source: BASE_REGION.to_string(),
                target: region.id.to_string(),
                outflow,
                inflow,
            }
        })
        .collect();

    let insights = generate_insights(&matrix, &intensity.values, &market_caps);

    Ok((
        MarketInsightsData {
            timestamp: Utc::now(),
            method: query.method.as_str(),
            correlations: correlation_map(&matrix),
            volatility,
            market_caps,
            flow_intensity: intensity.values,
            pair_scores,
            bilateral_flows,
            insights,
        },
        intensity.provenance,
    ))
}
