// src/service/refresh.rs
use crate::domain::errors::{AppError, AppResult};
use crate::market_data::pipeline::{self, DataPipeline};
use crate::market_data::{SeriesStore, SeriesTables};
use crate::storage::{DataPersistence, LatestTables, RefreshMetadata};
use chrono::Utc;
use std::sync::Arc;

/// Fetches fresh tables, persists them and publishes a new series snapshot
pub struct DataRefreshService {
    pipeline: Arc<DataPipeline>,
    persistence: DataPersistence,
    store: Arc<SeriesStore>,
    historical_days: usize,
}

impl DataRefreshService {
    pub fn new(
        pipeline: Arc<DataPipeline>,
        persistence: DataPersistence,
        store: Arc<SeriesStore>,
        historical_days: usize,
    ) -> Self {
        log::info!("DataRefreshService initialized ({} days of history)", historical_days);
        Self {
            pipeline,
            persistence,
            store,
            historical_days,
        }
    }

    pub fn persistence(&self) -> &DataPersistence {
        &self.persistence
    }

    /// Full refresh; failures are logged and reported as `false`
    pub async fn refresh_all_data(&self) -> bool {
        log::info!("Starting data refresh...");
        match self.refresh().await {
            Ok(metadata) => {
                log::info!(
                    "Data refresh completed at {}. Records: {} prices, {} regional, {} flows",
                    metadata.refresh_time,
                    metadata.price_records,
                    metadata.regional_records,
                    metadata.flow_records
                );
                true
            }
            Err(e) => {
                log::error!("Error during data refresh: {}", e);
                false
            }
        }
    }

    async fn refresh(&self) -> AppResult<RefreshMetadata> {
        let refresh_time = Utc::now();
        let days = self.historical_days;

        log::info!("Fetching asset prices...");
        let asset_prices = pipeline::clean_prices(self.pipeline.fetch_asset_prices(days).await);
        log::info!("Fetching regional data...");
        let regional_data = pipeline::clean_regional(self.pipeline.fetch_regional_data(days).await);
        log::info!("Fetching flow data...");
        let flow_data = pipeline::clean_flows(self.pipeline.fetch_flow_data(days));

        let metadata = RefreshMetadata {
            refresh_time,
            price_records: asset_prices.len(),
            regional_records: regional_data.len(),
            flow_records: flow_data.len(),
        };
        let tables = SeriesTables {
            asset_prices,
            regional_data,
            flow_data,
        };

        log::info!("Saving data to persistent storage...");
        let persistence = self.persistence.clone();
        let write_metadata = metadata.clone();
        let tables = tokio::task::spawn_blocking(move || -> AppResult<SeriesTables> {
            persistence.save_latest_tables(&tables.asset_prices, &tables.regional_data, &tables.flow_data)?;
            persistence.save_metadata(&write_metadata)?;
            persistence.save_last_refresh_time(write_metadata.refresh_time)?;
            Ok(tables)
        })
        .await??;

        self.store.publish(tables);
        Ok(metadata)
    }

    /// Publish whatever tables are on disk; returns whether anything was found
    pub async fn load_persisted_data(&self) -> bool {
        log::info!("Loading persisted data from disk...");
        let persistence = self.persistence.clone();
        let loaded = tokio::task::spawn_blocking(move || persistence.load_latest_tables())
            .await
            .map_err(AppError::from)
            .and_then(|result| result.map_err(AppError::from));

        match loaded {
            Ok(LatestTables {
                asset_prices: None,
                regional_data: None,
                flow_data: None,
            }) => {
                log::info!("No persisted data found, waiting for the scheduled refresh");
                false
            }
            Ok(tables) => {
                self.store.publish(SeriesTables {
                    asset_prices: tables.asset_prices.unwrap_or_default(),
                    regional_data: tables.regional_data.unwrap_or_default(),
                    flow_data: tables.flow_data.unwrap_or_default(),
                });
                log::info!("Persisted data loaded successfully");
                true
            }
            Err(e) => {
                log::error!("Error loading persisted data: {}", e);
                false
            }
        }
    }
}
