// src/service/mod.rs
pub mod refresh;
pub mod scheduler;

pub use refresh::DataRefreshService;
pub use scheduler::{duration_until_next_run, Scheduler};
