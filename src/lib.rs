// src/lib.rs
// Main library module declarations

pub mod analysis;
pub mod api;
pub mod config;
pub mod domain;
pub mod flows;
pub mod market_data;
pub mod providers;
pub mod service;
pub mod storage;
