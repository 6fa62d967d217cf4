// src/storage/mod.rs
pub mod cache;
pub mod persistence;

pub use cache::CacheStore;
pub use persistence::{DataPersistence, LatestTables, RefreshMetadata};
