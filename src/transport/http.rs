use crate::error::{SensorError, SensorResult};
use crate::query::QueryDescriptor;
use crate::transport::{SearchBody, SearchResponse, SearchTransport};
use crate::SensorQueryConfig;
use async_trait::async_trait;
use tokio::time::Duration;
use tracing::{debug, warn};

/// Search transport speaking the Elasticsearch `_search` JSON protocol.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint_url: String,
    timestamp_field: String,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &SensorQueryConfig) -> SensorResult<Self> {
        let endpoint_url = config.endpoint_url.trim().to_string();
        if endpoint_url.is_empty() {
            return Err(SensorError::Config {
                message: "endpoint URL is not set".to_string(),
            });
        }
        if !endpoint_url.starts_with("http://") && !endpoint_url.starts_with("https://") {
            return Err(SensorError::Config {
                message: format!("endpoint URL must be http(s): {}", endpoint_url),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint_url,
            timestamp_field: config.timestamp_field.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn execute(&self, descriptor: &QueryDescriptor) -> SensorResult<SearchResponse> {
        debug!(
            "POST {} (from={}, size={})",
            self.endpoint_url, descriptor.offset, descriptor.size
        );

        let response = self
            .client
            .post(&self.endpoint_url)
            .json(&descriptor.to_body())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SensorError::Timeout {
                        millis: self.request_timeout.as_millis() as u64,
                    }
                } else {
                    SensorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Search backend answered {} for offset {}", status, descriptor.offset);
            return Err(SensorError::Transport {
                message: format!("HTTP error: {}", status),
            });
        }

        let bytes = response.bytes().await?;
        Ok(SearchBody::from_slice(&bytes)?.into_response(&self.timestamp_field))
    }
}
