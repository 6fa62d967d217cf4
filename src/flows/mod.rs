// src/flows/mod.rs
pub mod global;
pub mod industry;

pub use global::{FlowAggregator, FlowGraph};
pub use industry::GraphSynthesizer;
