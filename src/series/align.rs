use std::collections::HashMap;

use crate::models::{OutputRecord, Sample};

/// All samples sharing one timestamp, keyed by composite key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeUnit {
    pub time: i64,
    pub fields: HashMap<String, f64>,
}

impl TimeUnit {
    fn new(time: i64) -> Self {
        Self {
            time,
            fields: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// `metric` for untagged samples, `tag__metric` otherwise.
pub fn composite_key(tag: &str, metric: &str) -> String {
    if tag.is_empty() {
        metric.to_string()
    } else {
        format!("{}__{}", tag, metric)
    }
}

/// Groups consecutive samples with the same timestamp into one row.
///
/// The input must already be grouped by ascending time; nothing is sorted
/// here, so out-of-order input yields out-of-order rows. Duplicate keys at
/// the same timestamp keep the last value.
pub fn align(samples: &[Sample]) -> Vec<TimeUnit> {
    let mut rows = Vec::new();
    let mut current: Option<TimeUnit> = None;

    for sample in samples {
        let starts_new = current
            .as_ref()
            .map_or(true, |unit| unit.time != sample.time);
        if starts_new {
            if let Some(unit) = current.replace(TimeUnit::new(sample.time)) {
                if !unit.is_empty() {
                    rows.push(unit);
                }
            }
        }

        if let Some(unit) = current.as_mut() {
            unit.fields
                .insert(composite_key(&sample.tag, &sample.metric), sample.value);
        }
    }

    if let Some(unit) = current {
        if !unit.is_empty() {
            rows.push(unit);
        }
    }

    rows
}

/// Aligns `samples` and calls `f(current, previous)` once per row.
/// The first row sees no previous row.
pub fn transform<F>(samples: &[Sample], mut f: F) -> Vec<OutputRecord>
where
    F: FnMut(&TimeUnit, Option<&TimeUnit>) -> OutputRecord,
{
    let rows = align(samples);
    let mut out = Vec::with_capacity(rows.len());
    let mut prev: Option<&TimeUnit> = None;

    for row in &rows {
        let mut record = f(row, prev);
        record.x = row.time;
        out.push(record);
        prev = Some(row);
    }

    out
}
