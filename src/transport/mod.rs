pub mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use crate::error::SensorResult;
use crate::query::{QueryDescriptor, Record, SensorField};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// Decoded answer to one search request.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// `None` when the backend omitted the hit count.
    pub total_matches: Option<u64>,
    pub records: Vec<Record>,
    /// Hits dropped because they had no usable timestamp or `_source`.
    pub skipped: u64,
}

#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn execute(&self, descriptor: &QueryDescriptor) -> SensorResult<SearchResponse>;
}

/// Elasticsearch `_search` response body.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub hits: Hits,
}

#[derive(Debug, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Option<Total>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// ES 7+ reports `{"value": n, "relation": "eq"}`, older versions a bare number.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Total {
    Count(u64),
    Tracked { value: u64 },
}

impl Total {
    pub fn value(&self) -> u64 {
        match *self {
            Total::Count(value) | Total::Tracked { value } => value,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source", default)]
    pub source: Option<HashMap<String, Scalar>>,
}

/// A document value. Numbers may arrive as integers, floats or numeric
/// strings; anything else (null, arrays, objects) carries no reading.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Unsigned(u64),
    Integer(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

impl Scalar {
    pub fn as_timestamp(&self) -> Option<u64> {
        match self {
            Scalar::Unsigned(n) => Some(*n),
            Scalar::Float(f) if *f >= 0.0 => Some(*f as u64),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_reading(&self) -> Option<i64> {
        match self {
            Scalar::Unsigned(n) => i64::try_from(*n).ok(),
            Scalar::Integer(n) => Some(*n),
            Scalar::Float(f) => Some(f.round() as i64),
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Other(_) => None,
        }
    }
}

impl SearchBody {
    pub fn from_slice(bytes: &[u8]) -> SensorResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Convert hits to records. A hit without a usable timestamp is dropped
    /// and counted; the rest of the page is kept.
    pub fn into_response(self, timestamp_field: &str) -> SearchResponse {
        let total_matches = self.hits.total.map(|total| total.value());

        let mut records = Vec::with_capacity(self.hits.hits.len());
        let mut skipped = 0;
        for (position, hit) in self.hits.hits.into_iter().enumerate() {
            match hit.source.and_then(|source| decode_record(source, timestamp_field)) {
                Some(record) => records.push(record),
                None => {
                    warn!(
                        "Skipping hit {} without a usable '{}' value",
                        position, timestamp_field
                    );
                    skipped += 1;
                }
            }
        }

        SearchResponse {
            total_matches,
            records,
            skipped,
        }
    }
}

/// Decode a raw `_search` response body.
pub fn decode_response(bytes: &[u8], timestamp_field: &str) -> SensorResult<SearchResponse> {
    Ok(SearchBody::from_slice(bytes)?.into_response(timestamp_field))
}

fn decode_record(mut source: HashMap<String, Scalar>, timestamp_field: &str) -> Option<Record> {
    let timestamp = source.remove(timestamp_field)?.as_timestamp()?;

    let mut record = Record::new(timestamp);
    for field in SensorField::ALL {
        if let Some(raw) = source.get(field.as_str()) {
            record.fields.insert(field, raw.as_reading());
        }
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use serde_json::{json, Value};

    fn decode(body: Value) -> SensorResult<SearchResponse> {
        decode_response(body.to_string().as_bytes(), "datetime_idx")
    }

    #[test]
    fn test_decode_page() {
        let body = json!({
            "took": 3,
            "hits": {
                "total": 2,
                "hits": [
                    { "_source": { "datetime_idx": 1000, "dust": 12, "humidity": null } },
                    { "_source": { "datetime_idx": "2000", "dust": 7.6, "co": "3", "tags": ["a"] } }
                ]
            }
        });

        let response = decode(body).unwrap();
        assert_eq!(response.total_matches, Some(2));
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.skipped, 0);

        let first = &response.records[0];
        assert_eq!(first.timestamp, 1000);
        assert_eq!(first.value(SensorField::Dust), Some(12));
        assert_eq!(first.value(SensorField::Humidity), None);
        assert!(first.fields.contains_key(&SensorField::Humidity));

        let second = &response.records[1];
        assert_eq!(second.timestamp, 2000);
        assert_eq!(second.value(SensorField::Dust), Some(8));
        assert_eq!(second.value(SensorField::CarbonMonoxide), Some(3));
    }

    #[test]
    fn test_decode_negative_reading() {
        let body = json!({ "hits": { "hits": [ { "_source": { "datetime_idx": 5, "temperature": -12 } } ] } });
        let response = decode(body).unwrap();
        assert_eq!(response.records[0].value(SensorField::Temperature), Some(-12));
    }

    #[test]
    fn test_decode_object_total() {
        let body = json!({ "hits": { "total": { "value": 25000, "relation": "eq" }, "hits": [] } });
        let response = decode(body).unwrap();
        assert_eq!(response.total_matches, Some(25000));
        assert!(response.records.is_empty());
    }

    #[test]
    fn test_decode_missing_total() {
        let body = json!({ "hits": { "hits": [] } });
        let response = decode(body).unwrap();
        assert_eq!(response.total_matches, None);
    }

    #[test]
    fn test_hits_without_timestamp_are_skipped() {
        let body = json!({
            "hits": {
                "total": 4,
                "hits": [
                    { "_source": { "datetime_idx": 100, "dust": 1 } },
                    { "_source": { "dust": 99 } },
                    { "_index": "sensors" },
                    { "_source": { "datetime_idx": 300, "dust": 3 } }
                ]
            }
        });

        let response = decode(body).unwrap();
        assert_eq!(response.total_matches, Some(4));
        assert_eq!(response.skipped, 2);
        let timestamps: Vec<u64> = response.records.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![100, 300]);
    }

    #[test]
    fn test_decode_malformed() {
        let no_hits = json!({ "error": "index_not_found_exception" });
        assert!(matches!(decode(no_hits), Err(SensorError::Serialization(_))));

        assert!(matches!(
            decode_response(b"<html>bad gateway</html>", "datetime_idx"),
            Err(SensorError::Serialization(_))
        ));
    }
}
