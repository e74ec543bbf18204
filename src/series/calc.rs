use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::align::{composite_key, TimeUnit};

pub const MILLIS_IN_SECOND: f64 = 1000.0;
pub const NANOS_IN_SECOND: f64 = 1_000_000_000.0;

/// Reference to one raw series inside an aligned row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    pub metric: String,
}

impl FieldRef {
    pub fn new(tag: &str, metric: &str) -> Self {
        Self {
            tag: tag.to_string(),
            metric: metric.to_string(),
        }
    }

    pub fn untagged(metric: &str) -> Self {
        Self::new("", metric)
    }

    pub fn key(&self) -> String {
        composite_key(&self.tag, &self.metric)
    }
}

/// `cur[key] - prev[key]`, or 0 without a previous row.
///
/// Counter resets are not detected: a restarted counter yields a negative
/// delta, which is passed through as is.
pub fn delta(prev: Option<&TimeUnit>, cur: &TimeUnit, key: &str) -> f64 {
    let Some(prev) = prev else {
        return 0.0;
    };
    match (cur.get(key), prev.get(key)) {
        (Some(c), Some(p)) => c - p,
        _ => 0.0,
    }
}

/// Per-second rate between two rows. 0 without a previous row or when no
/// time has elapsed.
pub fn rate(prev: Option<&TimeUnit>, cur: &TimeUnit, key: &str) -> f64 {
    let Some(p) = prev else {
        return 0.0;
    };
    let seconds = (cur.time - p.time) as f64 / MILLIS_IN_SECOND;
    if seconds == 0.0 {
        return 0.0;
    }
    delta(prev, cur, key) / seconds
}

/// Average duration per operation over the interval, in nanoseconds.
///
/// `key_seconds` is a cumulative seconds counter and `key_total` the
/// matching cumulative operation count. This is the marginal average between
/// the two rows, not the lifetime average.
pub fn exectime(prev: Option<&TimeUnit>, cur: &TimeUnit, key_seconds: &str, key_total: &str) -> f64 {
    if prev.is_none() {
        return 0.0;
    }
    let total = delta(prev, cur, key_total);
    if total == 0.0 {
        return 0.0;
    }
    delta(prev, cur, key_seconds) / total * NANOS_IN_SECOND
}

/// `cur[part] / cur[whole]` as a percentage of the current row.
pub fn share(cur: &TimeUnit, key_part: &str, key_whole: &str) -> f64 {
    match (cur.get(key_part), cur.get(key_whole)) {
        (Some(part), Some(whole)) if whole != 0.0 => part * 100.0 / whole,
        _ => 0.0,
    }
}

/// `delta(part) / delta(whole)` as a percentage.
pub fn delta_share(prev: Option<&TimeUnit>, cur: &TimeUnit, key_part: &str, key_whole: &str) -> f64 {
    let whole = delta(prev, cur, key_whole);
    if whole == 0.0 {
        return 0.0;
    }
    delta(prev, cur, key_part) * 100.0 / whole
}

/// Closed set of derived-field calculators a view can be built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Calc {
    Delta { field: FieldRef },
    Rate { field: FieldRef },
    ExecTime { seconds: FieldRef, total: FieldRef },
    Share { part: FieldRef, whole: FieldRef },
    DeltaShare { part: FieldRef, whole: FieldRef },
    Scaled { factor: f64, inner: Box<Calc> },
    Sum { terms: Vec<Calc> },
    Floor { inner: Box<Calc> },
}

impl Calc {
    pub fn delta(field: FieldRef) -> Self {
        Calc::Delta { field }
    }

    pub fn rate(field: FieldRef) -> Self {
        Calc::Rate { field }
    }

    pub fn exectime(seconds: FieldRef, total: FieldRef) -> Self {
        Calc::ExecTime { seconds, total }
    }

    pub fn share(part: FieldRef, whole: FieldRef) -> Self {
        Calc::Share { part, whole }
    }

    pub fn delta_share(part: FieldRef, whole: FieldRef) -> Self {
        Calc::DeltaShare { part, whole }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Calc::Scaled {
            factor,
            inner: Box::new(self),
        }
    }

    pub fn sum(terms: Vec<Calc>) -> Self {
        Calc::Sum { terms }
    }

    pub fn floor(self) -> Self {
        Calc::Floor {
            inner: Box::new(self),
        }
    }

    pub fn eval(&self, cur: &TimeUnit, prev: Option<&TimeUnit>) -> f64 {
        match self {
            Calc::Delta { field } => delta(prev, cur, &field.key()),
            Calc::Rate { field } => rate(prev, cur, &field.key()),
            Calc::ExecTime { seconds, total } => exectime(prev, cur, &seconds.key(), &total.key()),
            Calc::Share { part, whole } => share(cur, &part.key(), &whole.key()),
            Calc::DeltaShare { part, whole } => delta_share(prev, cur, &part.key(), &whole.key()),
            Calc::Scaled { factor, inner } => inner.eval(cur, prev) * factor,
            Calc::Sum { terms } => terms.iter().map(|t| t.eval(cur, prev)).sum(),
            Calc::Floor { inner } => inner.eval(cur, prev).floor(),
        }
    }

    /// Raw metric names this calculator reads.
    pub fn collect_metrics(&self, out: &mut BTreeSet<String>) {
        match self {
            Calc::Delta { field } | Calc::Rate { field } => {
                out.insert(field.metric.clone());
            }
            Calc::ExecTime { seconds: a, total: b }
            | Calc::Share { part: a, whole: b }
            | Calc::DeltaShare { part: a, whole: b } => {
                out.insert(a.metric.clone());
                out.insert(b.metric.clone());
            }
            Calc::Scaled { inner, .. } | Calc::Floor { inner } => inner.collect_metrics(out),
            Calc::Sum { terms } => terms.iter().for_each(|t| t.collect_metrics(out)),
        }
    }
}
