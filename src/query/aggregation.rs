use crate::query::{AggregateResult, Record, SensorField};

/// Running reduction over an ordered record stream for one sensor field.
#[derive(Debug, Clone)]
pub struct Aggregator {
    field: SensorField,
    sum: i128,
    count: u64,
    maximum: i64,
    minimum: i64,
    values: Vec<i64>,
    timestamps: Vec<u64>,
    skipped: u64,
}

impl Aggregator {
    pub fn new(field: SensorField) -> Self {
        Self {
            field,
            sum: 0,
            count: 0,
            maximum: i64::MIN,
            minimum: i64::MAX,
            values: Vec::new(),
            timestamps: Vec::new(),
            skipped: 0,
        }
    }

    pub fn with_capacity(field: SensorField, capacity: usize) -> Self {
        let mut aggregator = Self::new(field);
        aggregator.values.reserve(capacity);
        aggregator.timestamps.reserve(capacity);
        aggregator
    }

    pub fn push(&mut self, record: &Record) {
        // Records without a reading for this field are left out entirely
        let Some(value) = record.value(self.field) else {
            self.skipped += 1;
            return;
        };

        self.sum += value as i128;
        self.count += 1;
        self.maximum = self.maximum.max(value);
        self.minimum = self.minimum.min(value);
        self.values.push(value);
        self.timestamps.push(record.timestamp);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn finish(self, baseline_record: Option<&Record>) -> AggregateResult {
        let baseline = baseline_record
            .and_then(|record| record.value(self.field))
            .unwrap_or(0);

        if self.count == 0 {
            return AggregateResult {
                baseline,
                ..AggregateResult::default()
            };
        }

        AggregateResult {
            average: (self.sum / self.count as i128) as i64,
            maximum: self.maximum,
            minimum: self.minimum,
            values: self.values,
            timestamps: self.timestamps,
            baseline,
        }
    }
}

/// Reduce `records` (already in ascending timestamp order) in a single pass.
pub fn aggregate(
    field: SensorField,
    records: &[Record],
    baseline_record: Option<&Record>,
) -> AggregateResult {
    let mut aggregator = Aggregator::with_capacity(field, records.len());
    for record in records {
        aggregator.push(record);
    }
    aggregator.finish(baseline_record)
}
