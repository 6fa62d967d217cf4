// src/analysis/mod.rs
pub mod insights;
pub mod metrics;
pub mod policy;
pub mod statistics;

pub use insights::generate_insights;
pub use metrics::{CorrelationMatrix, FlowIntensity, MetricsCalculator};
pub use statistics::CorrelationMethod;
