//! Error handling for the monitoring console

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Validation error (bad input, rejected before any network call)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown room id
    #[error("Room not found: {0}")]
    RoomNotFound(u32),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
