// src/market_data/store.rs
use crate::domain::models::{FlowRecord, PricePoint, RegionalPoint};
use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable set of the three tables the calculators read from
#[derive(Debug, Clone, Default)]
pub struct SeriesSnapshot {
    pub generation: u64,
    pub asset_prices: Vec<PricePoint>,
    pub regional_data: Vec<RegionalPoint>,
    pub flow_data: Vec<FlowRecord>,
}

impl SeriesSnapshot {
    pub fn is_empty(&self) -> bool {
        self.asset_prices.is_empty() && self.regional_data.is_empty() && self.flow_data.is_empty()
    }
}

/// Tables handed to the store for publication
#[derive(Debug, Clone, Default)]
pub struct SeriesTables {
    pub asset_prices: Vec<PricePoint>,
    pub regional_data: Vec<RegionalPoint>,
    pub flow_data: Vec<FlowRecord>,
}

/// Shared holder of the current snapshot.
///
/// Publishing numbers and swaps in a whole new snapshot under the write lock,
/// so generations are installed in order. Readers clone the `Arc` and keep
/// working on that snapshot even if a newer one is published meanwhile.
#[derive(Debug, Default)]
pub struct SeriesStore {
    current: RwLock<Arc<SeriesSnapshot>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<SeriesSnapshot> {
        self.current.read().clone()
    }

    /// Replace every table at once; returns the new generation number
    pub fn publish(&self, tables: SeriesTables) -> u64 {
        let mut current = self.current.write();
        let generation = current.generation + 1;
        log::info!(
            "Publishing series snapshot #{} ({} prices, {} regional, {} flows)",
            generation,
            tables.asset_prices.len(),
            tables.regional_data.len(),
            tables.flow_data.len()
        );
        *current = Arc::new(SeriesSnapshot {
            generation,
            asset_prices: tables.asset_prices,
            regional_data: tables.regional_data,
            flow_data: tables.flow_data,
        });
        generation
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }
}
