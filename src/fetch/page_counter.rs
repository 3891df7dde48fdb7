use crate::error::{SensorError, SensorResult};
use crate::query::{QueryBuilder, QueryParams};
use crate::transport::SearchTransport;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCount {
    pub total_matches: u64,
    pub total_pages: u64,
}

/// Number of `page_size` pages needed to cover `total` hits.
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if total == 0 || page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

pub struct PageCounter {
    transport: Arc<dyn SearchTransport>,
    builder: QueryBuilder,
    page_size: u64,
    request_timeout: Duration,
}

impl PageCounter {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        builder: QueryBuilder,
        page_size: u64,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            builder,
            page_size,
            request_timeout,
        }
    }

    /// Issue the zero-size probe and derive the page count from its hit total.
    pub async fn count(&self, params: &QueryParams) -> SensorResult<PageCount> {
        let probe = self.builder.probe(params);

        let response = match tokio::time::timeout(self.request_timeout, self.transport.execute(&probe)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("Probe query failed: {}", e);
                return Err(SensorError::Probe { message: e.to_string() });
            }
            Err(_) => {
                error!("Probe query timed out after {:?}", self.request_timeout);
                return Err(SensorError::Probe {
                    message: SensorError::Timeout {
                        millis: self.request_timeout.as_millis() as u64,
                    }
                    .to_string(),
                });
            }
        };

        let total_matches = response.total_matches.ok_or_else(|| SensorError::Probe {
            message: "response carried no total hit count".to_string(),
        })?;

        let total_pages = page_count(total_matches, self.page_size);
        debug!(
            "Probe found {} matches for {} -> {} pages of {}",
            total_matches, params.field, total_pages, self.page_size
        );

        Ok(PageCount {
            total_matches,
            total_pages,
        })
    }
}
