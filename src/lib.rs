pub mod engine;
pub mod error;
pub mod fetch;
pub mod query;
pub mod transport;

pub use engine::{EngineState, FailurePolicy, QueryEngine, QueryHandle, QueryReport};
pub use error::{SensorError, SensorResult};
pub use query::{AggregateResult, QueryParams, Record, SensorField, SortOrder};

use tokio::time::Duration;

/// Records requested per page. Must match what the backend accepts as `size`.
pub const PAGE_SIZE: u64 = 10_000;

pub const DEFAULT_TIMESTAMP_FIELD: &str = "datetime_idx";

#[derive(Debug, Clone)]
pub struct SensorQueryConfig {
    pub endpoint_url: String,
    pub page_size: u64,
    pub timestamp_field: String,
    pub request_timeout_ms: u64,
    pub failure_policy: FailurePolicy,
    // Only used by the HTTP server binary
    pub bind_address: Option<String>,
}

impl Default for SensorQueryConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            page_size: PAGE_SIZE,
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            request_timeout_ms: 30_000,
            failure_policy: FailurePolicy::Lenient,
            bind_address: None,
        }
    }
}

impl SensorQueryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SENSOR_QUERY_URL") {
            config.endpoint_url = url;
        }

        if let Ok(page_size) = std::env::var("SENSOR_QUERY_PAGE_SIZE") {
            config.page_size = page_size.parse().unwrap_or(PAGE_SIZE);
        }

        if let Ok(field) = std::env::var("SENSOR_QUERY_TIMESTAMP_FIELD") {
            if !field.trim().is_empty() {
                config.timestamp_field = field.trim().to_string();
            }
        }

        if let Ok(timeout) = std::env::var("SENSOR_QUERY_TIMEOUT_MS") {
            config.request_timeout_ms = timeout.parse().unwrap_or(30_000);
        }

        if let Ok(strict) = std::env::var("SENSOR_QUERY_STRICT") {
            if strict.parse().unwrap_or(false) {
                config.failure_policy = FailurePolicy::Strict;
            }
        }

        if let Ok(bind_addr) = std::env::var("BIND_ADDRESS") {
            config.bind_address = Some(bind_addr);
        }

        config
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> SensorResult<()> {
        if self.page_size == 0 {
            return Err(SensorError::Config {
                message: "page size must be greater than zero".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(SensorError::Config {
                message: "request timeout must be greater than zero".to_string(),
            });
        }
        if self.timestamp_field.trim().is_empty() {
            return Err(SensorError::Config {
                message: "timestamp field must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
