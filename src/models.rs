use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One raw observation of a metric, optionally tagged by instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Epoch milliseconds.
    pub time: i64,
    pub metric: String,
    /// Instance identifier, empty for untagged samples.
    #[serde(default)]
    pub tag: String,
    pub app: String,
    pub value: f64,
}

impl Sample {
    pub fn new(time: i64, metric: &str, tag: &str, app: &str, value: f64) -> Self {
        Self {
            time,
            metric: metric.to_string(),
            tag: tag.to_string(),
            app: app.to_string(),
            value,
        }
    }
}

/// What a chart asks the sample store for. The lookback window travels
/// separately because it changes independently of the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub metrics: Vec<String>,
    pub app: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Drops repeated tags, keeping the first occurrence of each.
pub fn distinct_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter(|tag| seen.insert(tag.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputKey {
    pub id: String,
    pub name: String,
}

impl OutputKey {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// One derived row, `{x, <key>: value, ...}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub x: i64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, f64>,
}

impl OutputRecord {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRanking {
    pub app: String,
    pub value: f64,
}

/// Leaderboards keyed by ranking name, e.g. `moreGetTop5AppsByRT`.
pub type WorstApps = BTreeMap<String, Vec<AppRanking>>;

/// Summary of one output key across a series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyAggregate {
    pub avg: f64,
    pub sum: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub keys: Vec<OutputKey>,
    pub records: Vec<OutputRecord>,
    pub aggregates: BTreeMap<String, KeyAggregate>,
}

impl SeriesResponse {
    pub fn new(keys: Vec<OutputKey>, records: Vec<OutputRecord>) -> Self {
        let aggregates = keys
            .iter()
            .map(|key| (key.id.clone(), aggregate(&records, &key.id)))
            .collect();
        Self {
            keys,
            records,
            aggregates,
        }
    }
}

/// Records without the key are skipped; no values at all gives zeros.
fn aggregate(records: &[OutputRecord], key: &str) -> KeyAggregate {
    let values: Vec<f64> = records.iter().filter_map(|r| r.get(key)).collect();
    if values.is_empty() {
        return KeyAggregate::default();
    }
    let sum: f64 = values.iter().sum();
    KeyAggregate {
        avg: sum / values.len() as f64,
        sum,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ingested: usize,
}
