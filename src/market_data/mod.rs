// src/market_data/mod.rs
pub mod pipeline;
pub mod store;

pub use pipeline::DataPipeline;
pub use store::{SeriesSnapshot, SeriesStore, SeriesTables};
