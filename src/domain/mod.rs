// src/domain/mod.rs
pub mod catalog;
pub mod errors;
pub mod models;

// Re-export common types for convenience
pub use errors::{AppError, AppResult, ProviderError, ProviderResult, StorageError, StorageResult};
pub use models::{
    AssetClass, AssetNode, BilateralFlowEdge, FlowEdge, FlowRecord, GlobalFlowData,
    IndustryFlowData, PricePoint, Provenance, RegionData, RegionMetricSnapshot, RegionalPoint,
    SeriesBar, TimeRange, TimeSeriesPoint,
};
