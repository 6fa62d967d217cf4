// src/main.rs
use money_flow::api::{self, AppState};
use money_flow::config::Config;
use money_flow::domain::errors::AppResult;
use money_flow::market_data::{DataPipeline, SeriesStore};
use money_flow::providers::{AlphaVantageClient, FredClient, HttpFetcher, RetryConfig};
use money_flow::service::{DataRefreshService, Scheduler};
use money_flow::storage::{CacheStore, DataPersistence};

use std::sync::Arc;
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting Money Flow Observatory API v{}", env!("CARGO_PKG_VERSION"));

    // Create the data pipeline with whichever providers have keys
    let pipeline = Arc::new(create_pipeline(&config));

    let persistence = DataPersistence::new(&config.data.data_dir)?;
    let store = Arc::new(SeriesStore::new());
    let cache = Arc::new(CacheStore::new(config.cache_ttl()));

    let refresh_service = Arc::new(DataRefreshService::new(
        pipeline,
        persistence,
        store.clone(),
        config.data.historical_days,
    ));

    // Load persisted data if available
    if !refresh_service.load_persisted_data().await {
        if config.schedule.refresh_on_startup {
            log::info!("Running startup data refresh...");
            refresh_service.refresh_all_data().await;
        } else {
            log::warn!(
                "No data yet; endpoints answer 503 until the {:02}:00 refresh",
                config.schedule.refresh_hour
            );
        }
    }

    // Background jobs
    let mut scheduler = Scheduler::new();
    scheduler.schedule_daily_refresh(refresh_service, cache.clone(), config.schedule.refresh_hour);
    scheduler.schedule_cache_sweep(cache.clone(), config.cache_sweep_interval());

    let state = Arc::new(AppState::new(config, cache.clone(), store));

    let shutdown = async {
        if let Err(e) = ctrl_c().await {
            log::error!("Failed to listen for control-c event: {}", e);
        }
        log::info!("Shutting down Money Flow Observatory API");
    };
    let served = api::serve(state, shutdown).await;

    // Shutdown
    scheduler.shutdown();
    cache.clear().await;
    log::info!("Cache cleared");

    served
}

/// Data pipeline using the configured providers; a missing key means mock data
fn create_pipeline(config: &Config) -> DataPipeline {
    let http = HttpFetcher::new(
        config.request_timeout(),
        RetryConfig::exponential(config.providers.max_retries),
    );

    let mut pipeline = DataPipeline::new(config.data.pipeline_seed).with_call_delay(config.call_delay());

    match &config.providers.alpha_vantage_api_key {
        Some(key) => {
            log::info!("Alpha Vantage client enabled");
            pipeline = pipeline.with_price_client(Arc::new(AlphaVantageClient::new(key, http.clone())));
        }
        None => log::warn!("ALPHA_VANTAGE_API_KEY not set, asset prices will be simulated"),
    }

    match &config.providers.fred_api_key {
        Some(key) => {
            log::info!("FRED client enabled");
            pipeline = pipeline.with_rates_client(Arc::new(FredClient::new(key, http)));
        }
        None => log::warn!("FRED_API_KEY not set, US bond yields will be simulated"),
    }

    pipeline
}
