// src/api/mod.rs
pub mod dto;
pub mod handlers;
pub mod server;

pub use dto::{ApiError, CachedGlobalFlow, FlowQuery};
pub use handlers::AppState;
pub use server::{handle, serve};
