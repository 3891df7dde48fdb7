use crate::error::{SensorError, SensorResult};
use crate::fetch::{ConcurrentFetcher, PageCounter, PageFailure};
use crate::query::{aggregate, AggregateResult, QueryBuilder, QueryParams, Record, SensorField, SortOrder};
use crate::transport::{HttpTransport, SearchTransport};
use crate::SensorQueryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Lifecycle of a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    ProbeInFlight,
    /// Pages and the baseline lookup are running concurrently.
    PagesInFlight,
    Aggregating,
    Done,
    Failed,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Done | EngineState::Failed)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What to do when some pages could not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Aggregate whatever arrived and list the lost pages in the report.
    #[default]
    Lenient,
    /// Any lost page fails the whole query.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryReport {
    pub request_id: String,
    pub field: SensorField,
    pub result: AggregateResult,
    pub total_matches: u64,
    pub total_pages: u64,
    pub pages_fetched: u64,
    pub failed_pages: Vec<PageFailure>,
    pub baseline_error: Option<String>,
}

impl QueryReport {
    /// True when some data was lost to failed requests.
    pub fn is_partial(&self) -> bool {
        !self.failed_pages.is_empty() || self.baseline_error.is_some()
    }
}

struct StateTracker {
    request_id: String,
    sender: watch::Sender<EngineState>,
}

impl StateTracker {
    fn transition(&self, next: EngineState) {
        let previous = self.sender.send_replace(next);
        debug!("Query {}: {} -> {}", self.request_id, previous, next);
    }
}

/// A query running in the background. The result is delivered exactly once.
pub struct QueryHandle {
    request_id: String,
    state: watch::Receiver<EngineState>,
    result: oneshot::Receiver<SensorResult<QueryReport>>,
}

impl QueryHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.clone()
    }

    pub async fn wait(self) -> SensorResult<QueryReport> {
        self.result.await.unwrap_or_else(|_| {
            Err(SensorError::Transport {
                message: format!("query {} ended without a result", self.request_id),
            })
        })
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    config: SensorQueryConfig,
    builder: QueryBuilder,
    transport: Arc<dyn SearchTransport>,
    counter: Arc<PageCounter>,
    fetcher: Arc<ConcurrentFetcher>,
}

impl QueryEngine {
    pub fn new(config: SensorQueryConfig, transport: Arc<dyn SearchTransport>) -> SensorResult<Self> {
        config.validate()?;

        let builder = QueryBuilder::new(config.timestamp_field.clone());
        let counter = Arc::new(PageCounter::new(
            Arc::clone(&transport),
            builder.clone(),
            config.page_size,
            config.request_timeout(),
        ));
        let fetcher = Arc::new(ConcurrentFetcher::new(
            Arc::clone(&transport),
            builder.clone(),
            config.page_size,
            config.request_timeout(),
        ));

        Ok(Self {
            config,
            builder,
            transport,
            counter,
            fetcher,
        })
    }

    /// Engine talking to the configured HTTP endpoint.
    pub fn connect(config: SensorQueryConfig) -> SensorResult<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::new(config, transport)
    }

    pub fn config(&self) -> &SensorQueryConfig {
        &self.config
    }

    pub async fn query(&self, params: QueryParams) -> SensorResult<QueryReport> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (sender, _receiver) = watch::channel(EngineState::Idle);
        self.run(params, StateTracker { request_id, sender }).await
    }

    /// Start a query in the background and return a handle to observe it.
    pub fn submit(&self, params: QueryParams) -> QueryHandle {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (sender, state) = watch::channel(EngineState::Idle);
        let (result_tx, result) = oneshot::channel();

        let engine = self.clone();
        let tracker = StateTracker {
            request_id: request_id.clone(),
            sender,
        };
        tokio::spawn(async move {
            let outcome = engine.run(params, tracker).await;
            if result_tx.send(outcome).is_err() {
                debug!("Query handle dropped before the result was delivered");
            }
        });

        QueryHandle {
            request_id,
            state,
            result,
        }
    }

    async fn run(&self, params: QueryParams, tracker: StateTracker) -> SensorResult<QueryReport> {
        let request_id = tracker.request_id.clone();
        info!(
            "Executing {} query over [{}, {}] ({})",
            params.field, params.start_time, params.end_time, request_id
        );

        if let Err(e) = params.validate() {
            tracker.transition(EngineState::Failed);
            return Err(e);
        }

        tracker.transition(EngineState::ProbeInFlight);
        let count = match self.counter.count(&params).await {
            Ok(count) => count,
            Err(e) => {
                error!("Query {} failed during probe: {}", request_id, e);
                tracker.transition(EngineState::Failed);
                return Err(e);
            }
        };

        tracker.transition(EngineState::PagesInFlight);
        let (outcome, (baseline_record, baseline_error)) = tokio::join!(
            self.fetcher.fetch_all(&params, count.total_pages),
            self.fetch_baseline(&params)
        );

        if outcome.is_partial() {
            warn!(
                "Query {} lost {} of {} pages",
                request_id,
                outcome.failures.len(),
                count.total_pages
            );
            if self.config.failure_policy == FailurePolicy::Strict {
                tracker.transition(EngineState::Failed);
                let first = &outcome.failures[0];
                return Err(SensorError::PageFetch {
                    page: first.page_index,
                    message: first.reason.clone(),
                });
            }
        }

        tracker.transition(EngineState::Aggregating);
        let result = aggregate(params.field, &outcome.records, baseline_record.as_ref());
        tracker.transition(EngineState::Done);

        info!(
            "Query {} done: {} values (avg={}, min={}, max={}, baseline={})",
            request_id,
            result.values.len(),
            result.average,
            result.minimum,
            result.maximum,
            result.baseline
        );

        Ok(QueryReport {
            request_id,
            field: params.field,
            result,
            total_matches: count.total_matches,
            total_pages: count.total_pages,
            pages_fetched: outcome.pages_fetched,
            failed_pages: outcome.failures,
            baseline_error,
        })
    }

    /// Latest record before the query window. Failures degrade to no baseline.
    async fn fetch_baseline(&self, params: &QueryParams) -> (Option<Record>, Option<String>) {
        let Some(descriptor) = self.builder.baseline(params) else {
            return (None, None);
        };

        let request_timeout = self.config.request_timeout();
        match tokio::time::timeout(request_timeout, self.transport.execute(&descriptor)).await {
            Ok(Ok(response)) => (response.records.into_iter().next(), None),
            Ok(Err(e)) => {
                warn!("Baseline lookup failed, using 0: {}", e);
                (None, Some(e.to_string()))
            }
            Err(_) => {
                let e = SensorError::Timeout {
                    millis: request_timeout.as_millis() as u64,
                };
                warn!("Baseline lookup failed, using 0: {}", e);
                (None, Some(e.to_string()))
            }
        }
    }

    pub async fn query_data(
        &self,
        field: &str,
        sort_key: &str,
        sort_order: SortOrder,
        start_time: u64,
        end_time: u64,
    ) -> SensorResult<AggregateResult> {
        let field: SensorField = field.parse()?;
        let params = QueryParams::new(field, start_time, end_time).with_sort(sort_key, sort_order);
        Ok(self.query(params).await?.result)
    }

    pub async fn query_field(
        &self,
        field: SensorField,
        start_time: u64,
        end_time: u64,
    ) -> SensorResult<AggregateResult> {
        Ok(self.query(QueryParams::new(field, start_time, end_time)).await?.result)
    }

    pub async fn query_dust(&self, start_time: u64, end_time: u64) -> SensorResult<AggregateResult> {
        self.query_field(SensorField::Dust, start_time, end_time).await
    }

    pub async fn query_humidity(&self, start_time: u64, end_time: u64) -> SensorResult<AggregateResult> {
        self.query_field(SensorField::Humidity, start_time, end_time).await
    }

    pub async fn query_temperature(&self, start_time: u64, end_time: u64) -> SensorResult<AggregateResult> {
        self.query_field(SensorField::Temperature, start_time, end_time).await
    }

    pub async fn query_methane(&self, start_time: u64, end_time: u64) -> SensorResult<AggregateResult> {
        self.query_field(SensorField::Methane, start_time, end_time).await
    }

    pub async fn query_carbon_monoxide(&self, start_time: u64, end_time: u64) -> SensorResult<AggregateResult> {
        self.query_field(SensorField::CarbonMonoxide, start_time, end_time).await
    }
}
