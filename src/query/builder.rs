use crate::query::{QueryParams, SensorField, SortOrder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What a descriptor asks the backend for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    /// Hit count only, no documents.
    Probe,
    Page,
    /// Latest document before the window, whether or not it carries the field.
    Baseline,
}

/// A single backend search request. Rendered to the wire with [`QueryDescriptor::to_body`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub kind: QueryKind,
    pub field: SensorField,
    pub sort_key: String,
    pub sort_order: SortOrder,
    pub timestamp_field: String,
    pub from_ts: u64,
    pub to_ts: u64,
    pub offset: u64,
    pub size: u64,
}

impl QueryDescriptor {
    pub fn is_probe(&self) -> bool {
        self.kind == QueryKind::Probe
    }

    pub fn is_baseline(&self) -> bool {
        self.kind == QueryKind::Baseline
    }

    /// Only documents carrying the sensor field match. Baseline lookups take
    /// the latest document in range regardless.
    pub fn requires_field(&self) -> bool {
        self.kind != QueryKind::Baseline
    }

    /// Elasticsearch `_search` body: sort, pagination window, the inclusive
    /// time range and, unless this is a baseline lookup, an `exists` filter on
    /// the sensor field.
    pub fn to_body(&self) -> Value {
        let mut filters = Vec::with_capacity(2);
        if self.requires_field() {
            filters.push(json!({ "exists": { "field": self.field.as_str() } }));
        }
        filters.push(json!({
            "range": {
                self.timestamp_field.as_str(): {
                    "gte": self.from_ts,
                    "lte": self.to_ts
                }
            }
        }));

        json!({
            "sort": [
                { self.sort_key.as_str(): { "order": self.sort_order.as_str() } }
            ],
            "size": self.size,
            "from": self.offset,
            "track_total_hits": true,
            "query": { "bool": { "filter": filters } }
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    timestamp_field: String,
}

impl QueryBuilder {
    pub fn new(timestamp_field: impl Into<String>) -> Self {
        Self {
            timestamp_field: timestamp_field.into(),
        }
    }

    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        field: SensorField,
        sort_key: &str,
        sort_order: SortOrder,
        from_ts: u64,
        to_ts: u64,
        offset: u64,
        size: u64,
    ) -> QueryDescriptor {
        QueryDescriptor {
            kind: if size == 0 { QueryKind::Probe } else { QueryKind::Page },
            field,
            sort_key: sort_key.to_string(),
            sort_order,
            timestamp_field: self.timestamp_field.clone(),
            from_ts,
            to_ts,
            offset,
            size,
        }
    }

    pub fn page(&self, params: &QueryParams, offset: u64, size: u64) -> QueryDescriptor {
        self.build(
            params.field,
            &params.sort_key,
            params.sort_order,
            params.start_time,
            params.end_time,
            offset,
            size,
        )
    }

    pub fn probe(&self, params: &QueryParams) -> QueryDescriptor {
        self.page(params, 0, 0)
    }

    /// Latest single record strictly before `start_time`, or `None` when
    /// nothing can precede it.
    pub fn baseline(&self, params: &QueryParams) -> Option<QueryDescriptor> {
        let upper = params.start_time.checked_sub(1)?;
        let mut descriptor = self.build(
            params.field,
            &params.sort_key,
            SortOrder::Descending,
            0,
            upper,
            0,
            1,
        );
        descriptor.kind = QueryKind::Baseline;
        Some(descriptor)
    }
}
