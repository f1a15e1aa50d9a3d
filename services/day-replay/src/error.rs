//! Error types for the day replay service

/// Errors that can occur in the day replay service
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("History error: {0}")]
    History(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Invalid playback speed: {0}")]
    InvalidSpeed(f64),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("No day has been loaded yet")]
    NoDaySelected,
}

/// Result type alias for day replay operations
pub type Result<T> = std::result::Result<T, ReplayError>;
