use crate::error::{SensorError, SensorResult};
use crate::query::{QueryDescriptor, QueryKind, Record, SortOrder};
use crate::transport::{SearchResponse, SearchTransport};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::{sleep, Duration};

// In-memory search backend used by tests, benches and demos. It honours the
// time range, field-exists filter (skipped for baseline lookups), timestamp
// sort and from/size window of each descriptor, and can be told to fail or
// stall individual pages.
#[derive(Default)]
pub struct MockTransport {
    records: Mutex<Vec<Record>>,
    failing_offsets: Mutex<HashSet<u64>>,
    latencies: Mutex<HashMap<u64, Duration>>,
    requests: Mutex<Vec<QueryDescriptor>>,
    jitter_ms: AtomicU64,
    fail_probe: AtomicBool,
    omit_total: AtomicBool,
    fail_baseline: AtomicBool,
    calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        let transport = Self::new();
        transport.insert_all(records);
        transport
    }

    pub fn insert(&self, record: Record) {
        lock(&self.records).push(record);
    }

    pub fn insert_all(&self, records: impl IntoIterator<Item = Record>) {
        lock(&self.records).extend(records);
    }

    /// Page requests starting at `offset` fail with a transport error.
    pub fn fail_offset(&self, offset: u64) {
        lock(&self.failing_offsets).insert(offset);
    }

    /// Page requests starting at `offset` are answered after `delay`.
    pub fn delay_offset(&self, offset: u64, delay: Duration) {
        lock(&self.latencies).insert(offset, delay);
    }

    /// Every request sleeps a random 0..=max before answering.
    pub fn set_jitter(&self, max: Duration) {
        self.jitter_ms.store(max.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_probe(&self, fail: bool) {
        self.fail_probe.store(fail, Ordering::SeqCst);
    }

    pub fn set_omit_total(&self, omit: bool) {
        self.omit_total.store(omit, Ordering::SeqCst);
    }

    pub fn set_fail_baseline(&self, fail: bool) {
        self.fail_baseline.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<QueryDescriptor> {
        lock(&self.requests).clone()
    }

    /// Page requests only (probes and baseline lookups excluded).
    pub fn page_requests(&self) -> Vec<QueryDescriptor> {
        lock(&self.requests)
            .iter()
            .filter(|d| d.kind == QueryKind::Page)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.records).clear();
        lock(&self.requests).clear();
        self.calls.store(0, Ordering::SeqCst);
    }

    fn planned_delay(&self, descriptor: &QueryDescriptor) -> Duration {
        let mut delay = if descriptor.is_probe() {
            Duration::ZERO
        } else {
            lock(&self.latencies)
                .get(&descriptor.offset)
                .copied()
                .unwrap_or(Duration::ZERO)
        };

        let jitter_ms = self.jitter_ms.load(Ordering::SeqCst);
        if jitter_ms > 0 {
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        }
        delay
    }

    fn search(&self, descriptor: &QueryDescriptor) -> SearchResponse {
        let mut matched: Vec<Record> = lock(&self.records)
            .iter()
            .filter(|r| r.timestamp >= descriptor.from_ts && r.timestamp <= descriptor.to_ts)
            .filter(|r| !descriptor.requires_field() || r.value(descriptor.field).is_some())
            .cloned()
            .collect();

        match descriptor.sort_order {
            SortOrder::Ascending => matched.sort_by_key(|r| r.timestamp),
            SortOrder::Descending => matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        }

        let total = matched.len() as u64;
        let records = matched
            .into_iter()
            .skip(descriptor.offset as usize)
            .take(descriptor.size as usize)
            .collect();

        SearchResponse {
            total_matches: if self.omit_total.load(Ordering::SeqCst) {
                None
            } else {
                Some(total)
            },
            records,
            skipped: 0,
        }
    }
}

#[async_trait]
impl SearchTransport for MockTransport {
    async fn execute(&self, descriptor: &QueryDescriptor) -> SensorResult<SearchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(descriptor.clone());

        let delay = self.planned_delay(descriptor);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        let rejection = match descriptor.kind {
            QueryKind::Probe if self.fail_probe.load(Ordering::SeqCst) => {
                Some("probe rejected by mock backend".to_string())
            }
            QueryKind::Baseline if self.fail_baseline.load(Ordering::SeqCst) => {
                Some("baseline rejected by mock backend".to_string())
            }
            QueryKind::Page if lock(&self.failing_offsets).contains(&descriptor.offset) => {
                Some(format!("page at offset {} rejected by mock backend", descriptor.offset))
            }
            _ => None,
        };
        if let Some(message) = rejection {
            return Err(SensorError::Transport { message });
        }

        Ok(self.search(descriptor))
    }
}
