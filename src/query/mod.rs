pub mod aggregation;
pub mod builder;

pub use aggregation::{aggregate, Aggregator};
pub use builder::{QueryBuilder, QueryDescriptor, QueryKind};

use crate::error::{SensorError, SensorResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SORT_KEY: &str = "datetime_idx";

/// Sensor channels a reading can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorField {
    Dust,
    Humidity,
    Temperature,
    Methane,
    #[serde(rename = "co")]
    CarbonMonoxide,
}

impl SensorField {
    pub const ALL: [SensorField; 5] = [
        SensorField::Dust,
        SensorField::Humidity,
        SensorField::Temperature,
        SensorField::Methane,
        SensorField::CarbonMonoxide,
    ];

    /// Name of the field as stored in the backend documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorField::Dust => "dust",
            SensorField::Humidity => "humidity",
            SensorField::Temperature => "temperature",
            SensorField::Methane => "methane",
            SensorField::CarbonMonoxide => "co",
        }
    }
}

impl fmt::Display for SensorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorField {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dust" => Ok(SensorField::Dust),
            "humidity" => Ok(SensorField::Humidity),
            "temperature" => Ok(SensorField::Temperature),
            "methane" => Ok(SensorField::Methane),
            "co" | "carbon_monoxide" | "carbon-monoxide" => Ok(SensorField::CarbonMonoxide),
            other => Err(SensorError::UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(SensorError::Config {
                message: format!("unknown sort order '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    pub field: SensorField,
    pub sort_key: String,
    pub sort_order: SortOrder,
    pub start_time: u64,
    pub end_time: u64,
}

impl QueryParams {
    pub fn new(field: SensorField, start_time: u64, end_time: u64) -> Self {
        Self {
            field,
            sort_key: DEFAULT_SORT_KEY.to_string(),
            sort_order: SortOrder::Ascending,
            start_time,
            end_time,
        }
    }

    pub fn with_sort(mut self, sort_key: impl Into<String>, sort_order: SortOrder) -> Self {
        self.sort_key = sort_key.into();
        self.sort_order = sort_order;
        self
    }

    pub fn validate(&self) -> SensorResult<()> {
        if self.start_time > self.end_time {
            return Err(SensorError::InvalidTimeRange(self.start_time, self.end_time));
        }
        Ok(())
    }
}

/// One decoded reading. A null field and a missing field are treated alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: u64,
    pub fields: BTreeMap<SensorField, Option<i64>>,
}

impl Record {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, field: SensorField, value: i64) -> Self {
        self.fields.insert(field, Some(value));
        self
    }

    pub fn with_null(mut self, field: SensorField) -> Self {
        self.fields.insert(field, None);
        self
    }

    pub fn value(&self, field: SensorField) -> Option<i64> {
        self.fields.get(&field).copied().flatten()
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub index: u64,
    pub offset: u64,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub average: i64,
    pub maximum: i64,
    pub minimum: i64,
    pub values: Vec<i64>,
    pub timestamps: Vec<u64>,
    pub baseline: i64,
}

impl AggregateResult {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
