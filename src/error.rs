use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Probe failed: {message}")]
    Probe { message: String },

    #[error("Page {page} failed: {message}")]
    PageFetch { page: u64, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Unknown sensor field: {0}")]
    UnknownField(String),

    #[error("Invalid time range: start {0} > end {1}")]
    InvalidTimeRange(u64, u64),

    #[error("Request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for SensorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SensorError::MalformedResponse { message: err.to_string() }
        } else {
            SensorError::Network(err.to_string())
        }
    }
}

pub type SensorResult<T> = Result<T, SensorError>;
