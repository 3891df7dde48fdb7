use crate::error::{SensorError, SensorResult};
use crate::query::{Page, QueryBuilder, QueryDescriptor, QueryParams, Record};
use crate::transport::SearchTransport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, warn};

/// A page that contributed no records because its request failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub page_index: u64,
    pub offset: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Every record from every successful page, ascending by timestamp.
    pub records: Vec<Record>,
    pub pages_fetched: u64,
    pub failures: Vec<PageFailure>,
}

impl FetchOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct ConcurrentFetcher {
    transport: Arc<dyn SearchTransport>,
    builder: QueryBuilder,
    page_size: u64,
    request_timeout: Duration,
}

impl ConcurrentFetcher {
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

    /// Fetch pages `[0, total_pages)` in parallel and merge them once every
    /// request has finished.
    pub async fn fetch_all(&self, params: &QueryParams, total_pages: u64) -> FetchOutcome {
        if total_pages == 0 {
            return FetchOutcome::default();
        }

        debug!("Fetching {} pages of {} for {}", total_pages, self.page_size, params.field);

        // Fan out: one task per page, each owning its own result slot
        let mut tasks = Vec::with_capacity(total_pages as usize);
        for page_index in 0..total_pages {
            let offset = page_index * self.page_size;
            let descriptor = self.builder.page(params, offset, self.page_size);
            let transport = Arc::clone(&self.transport);
            let request_timeout = self.request_timeout;

            let task = tokio::spawn(async move {
                fetch_page(transport, descriptor, request_timeout).await
            });
            tasks.push((page_index, offset, task));
        }

        // Barrier: every task is awaited whether it succeeded or not
        let mut pages = Vec::with_capacity(tasks.len());
        let mut failures = Vec::new();
        for (page_index, offset, task) in tasks {
            match task.await {
                Ok(Ok(records)) => pages.push(Page {
                    index: page_index,
                    offset,
                    records,
                }),
                Ok(Err(e)) => {
                    warn!("Page {} (offset {}) failed: {}", page_index, offset, e);
                    failures.push(PageFailure {
                        page_index,
                        offset,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    error!("Page {} task aborted: {}", page_index, e);
                    failures.push(PageFailure {
                        page_index,
                        offset,
                        reason: format!("task aborted: {}", e),
                    });
                }
            }
        }

        let pages_fetched = pages.len() as u64;
        let records = merge_pages(pages);
        debug!(
            "Fetched {} records from {}/{} pages",
            records.len(),
            pages_fetched,
            total_pages
        );

        FetchOutcome {
            records,
            pages_fetched,
            failures,
        }
    }
}

async fn fetch_page(
    transport: Arc<dyn SearchTransport>,
    descriptor: QueryDescriptor,
    request_timeout: Duration,
) -> SensorResult<Vec<Record>> {
    match tokio::time::timeout(request_timeout, transport.execute(&descriptor)).await {
        Ok(response) => Ok(response?.records),
        Err(_) => Err(SensorError::Timeout {
            millis: request_timeout.as_millis() as u64,
        }),
    }
}

/// Flatten pages in the order given and sort by timestamp. The sort is
/// stable, so equal timestamps keep their page order.
pub fn merge_pages(pages: Vec<Page>) -> Vec<Record> {
    let total = pages.iter().map(|p| p.records.len()).sum();
    let mut records = Vec::with_capacity(total);
    for page in pages {
        records.extend(page.records);
    }
    records.sort_by_key(|r| r.timestamp);
    records
}
