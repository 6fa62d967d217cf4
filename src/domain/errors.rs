// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored data was requested but nothing has been persisted yet
    #[error("{0}")]
    DataUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Unknown(s)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Unknown(format!("Background task failed: {}", e))
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Missing API key for {0}")]
    MissingApiKey(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Request(_) | ProviderError::Timeout(_) | ProviderError::Status { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unknown correlation method: {0}")]
    UnknownMethod(String),
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ProviderResult<T> = Result<T, ProviderError>;
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_provider_errors() {
        assert!(ProviderError::Timeout(30).is_transient());
        assert!(ProviderError::Request("reset".into()).is_transient());
        assert!(!ProviderError::RateLimit("note".into()).is_transient());
        assert!(!ProviderError::MalformedPayload("keys".into()).is_transient());
    }

    #[test]
    fn data_unavailable_displays_message_verbatim() {
        let err = AppError::DataUnavailable("Data not available yet".to_string());
        assert_eq!(err.to_string(), "Data not available yet");
    }
}
