//! Synthetic metric profiles: how each known metric should look when no real
//! telemetry is available.

use std::collections::HashMap;

use crate::error::{MonitorError, Result};

/// Seconds between two synthetic scrapes.
pub const SCRAPE_INTERVAL_SECS: i64 = 15;

const SCRAPE: f64 = SCRAPE_INTERVAL_SECS as f64;

/// Upper bound for a counter's per-tick increment.
#[derive(Debug, Clone, PartialEq)]
pub enum CounterCap {
    None,
    Value(f64),
    /// Increment may not exceed the named counter's increment at the same tick.
    Sibling(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSpec {
    Counter {
        initial: f64,
        step_bound: Option<f64>,
        cap: CounterCap,
    },
    Gauge {
        initial: f64,
        step_bound: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
    Fixed {
        value: f64,
    },
}

impl MetricSpec {
    pub fn counter(initial: f64) -> Self {
        MetricSpec::Counter {
            initial,
            step_bound: None,
            cap: CounterCap::None,
        }
    }

    pub fn capped_by(initial: f64, sibling: &str) -> Self {
        MetricSpec::Counter {
            initial,
            step_bound: None,
            cap: CounterCap::Sibling(sibling.to_string()),
        }
    }

    pub fn gauge(initial: f64, step_bound: f64, min: f64, max: f64) -> Self {
        MetricSpec::Gauge {
            initial,
            step_bound: Some(step_bound),
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn fixed(value: f64) -> Self {
        MetricSpec::Fixed { value }
    }
}

/// Cap with sibling names resolved to table indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cap {
    None,
    Value(f64),
    Sibling(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Profile {
    Counter { initial: f64, bound: f64, cap: Cap },
    Gauge {
        initial: f64,
        bound: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    Fixed { value: f64 },
}

impl Profile {
    pub fn initial(&self) -> f64 {
        match self {
            Profile::Counter { initial, .. } | Profile::Gauge { initial, .. } => *initial,
            Profile::Fixed { value } => *value,
        }
    }
}

/// One metric in a generation plan. Siblings that were not requested are
/// still walked so the caps they impose hold, but they are not emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    pub index: usize,
    pub emit: bool,
}

/// Immutable set of resolved profiles.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    names: Vec<String>,
    profiles: Vec<Profile>,
    index: HashMap<String, usize>,
}

impl ProfileTable {
    /// Resolves sibling references and validates every spec.
    pub fn new(entries: Vec<(String, MetricSpec)>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, (name, _)) in entries.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(invalid(name, "declared twice"));
            }
        }

        let mut names = Vec::with_capacity(entries.len());
        let mut profiles = Vec::with_capacity(entries.len());
        for (name, spec) in &entries {
            profiles.push(resolve(name, spec, &entries, &index)?);
            names.push(name.clone());
        }

        let table = Self {
            names,
            profiles,
            index,
        };
        table.check_acyclic()?;
        Ok(table)
    }

    pub fn standard() -> Result<Self> {
        Self::new(standard_entries())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn profile(&self, index: usize) -> &Profile {
        &self.profiles[index]
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Orders the requested metrics so every capping sibling is walked
    /// before the counters it caps.
    pub fn plan(&self, metrics: &[String]) -> Result<Vec<PlanStep>> {
        let requested = metrics
            .iter()
            .map(|name| {
                self.lookup(name).ok_or_else(|| {
                    MonitorError::InvalidQuery(format!("No synthetic profile for metric {}", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut placed = vec![false; self.len()];
        let mut plan = Vec::with_capacity(requested.len());
        for &index in &requested {
            self.place(index, &requested, &mut placed, &mut plan);
        }
        Ok(plan)
    }

    fn place(&self, index: usize, requested: &[usize], placed: &mut [bool], plan: &mut Vec<PlanStep>) {
        if placed[index] {
            return;
        }
        placed[index] = true;
        if let Profile::Counter {
            cap: Cap::Sibling(sibling),
            ..
        } = self.profiles[index]
        {
            self.place(sibling, requested, placed, plan);
        }
        plan.push(PlanStep {
            index,
            emit: requested.contains(&index),
        });
    }

    fn check_acyclic(&self) -> Result<()> {
        for start in 0..self.len() {
            let mut current = start;
            for _ in 0..self.len() {
                match self.profiles[current] {
                    Profile::Counter {
                        cap: Cap::Sibling(next),
                        ..
                    } => {
                        if next == start {
                            return Err(invalid(&self.names[start], "has a cyclic sibling cap"));
                        }
                        current = next;
                    }
                    _ => break,
                }
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> MonitorError {
    MonitorError::Config(format!("Synthetic profile {} {}", name, reason))
}

fn check_finite(name: &str, values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(invalid(name, "has a non-finite parameter"))
    }
}

fn resolve(
    name: &str,
    spec: &MetricSpec,
    entries: &[(String, MetricSpec)],
    index: &HashMap<String, usize>,
) -> Result<Profile> {
    match spec {
        MetricSpec::Fixed { value } => {
            check_finite(name, &[*value])?;
            Ok(Profile::Fixed { value: *value })
        }
        MetricSpec::Gauge {
            initial,
            step_bound,
            min,
            max,
        } => {
            let bound = step_bound.unwrap_or(initial / 5.0).abs();
            check_finite(name, &[*initial, bound])?;
            if min.map_or(false, |min| *initial < min) || max.map_or(false, |max| *initial > max) {
                return Err(invalid(name, "starts outside its bounds"));
            }
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(invalid(name, "has min above max"));
                }
            }
            Ok(Profile::Gauge {
                initial: *initial,
                bound,
                min: *min,
                max: *max,
            })
        }
        MetricSpec::Counter {
            initial,
            step_bound,
            cap,
        } => {
            let bound = step_bound.unwrap_or(initial / 5.0).abs();
            check_finite(name, &[*initial, bound])?;
            let cap = match cap {
                CounterCap::None => Cap::None,
                CounterCap::Value(value) => {
                    if !value.is_finite() || *value < 0.0 {
                        return Err(invalid(name, "has a negative cap"));
                    }
                    Cap::Value(*value)
                }
                CounterCap::Sibling(sibling) => {
                    let target = *index
                        .get(sibling)
                        .ok_or_else(|| invalid(name, "is capped by an unknown metric"))?;
                    if !matches!(entries[target].1, MetricSpec::Counter { .. }) {
                        return Err(invalid(name, "is capped by a metric that is not a counter"));
                    }
                    Cap::Sibling(target)
                }
            };
            Ok(Profile::Counter {
                initial: *initial,
                bound,
                cap,
            })
        }
    }
}

/// Profiles for every metric the built-in views read.
pub fn standard_entries() -> Vec<(String, MetricSpec)> {
    let entries = vec![
        // HTTP
        ("heeus_http_status_2xx_total", MetricSpec::counter(200.0 * SCRAPE)),
        ("heeus_http_status_4xx_total", MetricSpec::counter(50.0 * SCRAPE)),
        ("heeus_http_status_5xx_total", MetricSpec::counter(50.0 * SCRAPE)),
        ("heeus_http_status_503_total", MetricSpec::counter(20.0 * SCRAPE)),
        // Storage cache
        ("heeus_istoragecache_get_total", MetricSpec::counter(100.0 * SCRAPE)),
        (
            "heeus_istoragecache_get_cached_total",
            MetricSpec::capped_by(35.0 * SCRAPE, "heeus_istoragecache_get_total"),
        ),
        ("heeus_istoragecache_getbatch_total", MetricSpec::counter(120.0 * SCRAPE)),
        (
            "heeus_istoragecache_getbatch_cached_total",
            MetricSpec::capped_by(60.0 * SCRAPE, "heeus_istoragecache_getbatch_total"),
        ),
        ("heeus_istoragecache_put_total", MetricSpec::counter(50.0 * SCRAPE)),
        ("heeus_istoragecache_putbatch_total", MetricSpec::counter(60.0 * SCRAPE)),
        ("heeus_istoragecache_read_total", MetricSpec::counter(80.0 * SCRAPE)),
        ("heeus_istoragecache_get_seconds", MetricSpec::counter(2.0 * SCRAPE)),
        ("heeus_istoragecache_getbatch_seconds", MetricSpec::counter(7.0 * SCRAPE)),
        ("heeus_istoragecache_put_seconds", MetricSpec::counter(3.0 * SCRAPE)),
        ("heeus_istoragecache_putbatch_seconds", MetricSpec::counter(12.0 * SCRAPE)),
        ("heeus_istoragecache_read_seconds", MetricSpec::counter(6.0 * SCRAPE)),
        // Command processor
        ("heeus_cp_commands_total", MetricSpec::counter(100.0 * SCRAPE)),
        ("heeus_cp_commands_seconds", MetricSpec::counter(2.0 * SCRAPE)),
        ("heeus_cp_exec_seconds", MetricSpec::counter(SCRAPE)),
        ("heeus_cp_validate_seconds", MetricSpec::counter(0.5 * SCRAPE)),
        ("heeus_cp_putplog_seconds", MetricSpec::counter(0.5 * SCRAPE)),
        // Query processor
        ("heeus_qp_queries_total", MetricSpec::counter(200.0 * SCRAPE)),
        ("heeus_qp_queries_seconds", MetricSpec::counter(4.0 * SCRAPE)),
        ("heeus_qp_build_seconds", MetricSpec::counter(SCRAPE)),
        ("heeus_qp_exec_seconds", MetricSpec::counter(3.0 * SCRAPE)),
        ("heeus_qp_exec_fields_seconds", MetricSpec::counter(0.5 * SCRAPE)),
        ("heeus_qp_exec_enrich_seconds", MetricSpec::counter(0.5 * SCRAPE)),
        ("heeus_qp_exec_filter_seconds", MetricSpec::counter(0.5 * SCRAPE)),
        ("heeus_qp_exec_order_seconds", MetricSpec::counter(0.5 * SCRAPE)),
        ("heeus_qp_exec_count_seconds", MetricSpec::counter(0.5 * SCRAPE)),
        ("heeus_qp_exec_send_seconds", MetricSpec::counter(0.5 * SCRAPE)),
        // Node
        ("node_cpu_idle_seconds_total", MetricSpec::counter(0.2 * SCRAPE)),
        (
            "node_memory_memavailable_bytes",
            MetricSpec::gauge(32e9, 1e8, 3e9, 64e9),
        ),
        ("node_memory_memtotal_bytes", MetricSpec::fixed(64e9)),
        (
            "node_filesystem_free_bytes",
            MetricSpec::gauge(2e12, 8e8, 1e10, 4e12),
        ),
        ("node_filesystem_size_bytes", MetricSpec::fixed(4e12)),
        ("node_disk_read_bytes_total", MetricSpec::counter(100_000.0)),
        ("node_disk_write_bytes_total", MetricSpec::counter(50_000.0)),
        ("node_disk_reads_completed_total", MetricSpec::counter(20_000.0)),
        ("node_disk_writes_completed_total", MetricSpec::counter(10_000.0)),
    ];

    entries
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::ViewKind;

    fn entry(name: &str, spec: MetricSpec) -> (String, MetricSpec) {
        (name.to_string(), spec)
    }

    #[test]
    fn test_standard_table_covers_every_view() {
        let table = ProfileTable::standard().unwrap();
        let tags = vec!["hvm1".to_string()];
        for kind in ViewKind::ALL {
            let view = kind.descriptor("sys", &tags).unwrap();
            for metric in &view.query.metrics {
                assert!(table.lookup(metric).is_some(), "{} has no profile", metric);
            }
        }
    }

    #[test]
    fn test_default_step_bound_is_a_fifth() {
        let table = ProfileTable::new(vec![entry("a_total", MetricSpec::counter(50.0))]).unwrap();
        assert_eq!(
            *table.profile(0),
            Profile::Counter {
                initial: 50.0,
                bound: 10.0,
                cap: Cap::None
            }
        );
    }

    #[test]
    fn test_sibling_resolved_to_index() {
        let table = ProfileTable::new(vec![
            entry("hits_total", MetricSpec::capped_by(10.0, "gets_total")),
            entry("gets_total", MetricSpec::counter(20.0)),
        ])
        .unwrap();
        match table.profile(0) {
            Profile::Counter { cap, .. } => assert_eq!(*cap, Cap::Sibling(1)),
            other => panic!("unexpected profile {:?}", other),
        }
    }

    #[test]
    fn test_plan_walks_siblings_first() {
        let table = ProfileTable::new(vec![
            entry("hits_total", MetricSpec::capped_by(10.0, "gets_total")),
            entry("gets_total", MetricSpec::counter(20.0)),
            entry("other_total", MetricSpec::counter(5.0)),
        ])
        .unwrap();

        let plan = table.plan(&["hits_total".to_string()]).unwrap();
        assert_eq!(
            plan,
            vec![
                PlanStep { index: 1, emit: false },
                PlanStep { index: 0, emit: true },
            ]
        );

        let plan = table
            .plan(&["hits_total".to_string(), "gets_total".to_string()])
            .unwrap();
        assert_eq!(
            plan,
            vec![
                PlanStep { index: 1, emit: true },
                PlanStep { index: 0, emit: true },
            ]
        );
    }

    #[test]
    fn test_unknown_metric_is_invalid_query() {
        let table = ProfileTable::standard().unwrap();
        let err = table.plan(&["no_such_metric".to_string()]).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidQuery(_)));
    }

    #[test]
    fn test_rejects_bad_tables() {
        let unknown = ProfileTable::new(vec![entry("a", MetricSpec::capped_by(1.0, "b"))]);
        assert!(matches!(unknown, Err(MonitorError::Config(_))));

        let cyclic = ProfileTable::new(vec![
            entry("a", MetricSpec::capped_by(1.0, "b")),
            entry("b", MetricSpec::capped_by(1.0, "a")),
        ]);
        assert!(matches!(cyclic, Err(MonitorError::Config(_))));

        let gauge_sibling = ProfileTable::new(vec![
            entry("a", MetricSpec::capped_by(1.0, "b")),
            entry("b", MetricSpec::gauge(5.0, 1.0, 0.0, 10.0)),
        ]);
        assert!(matches!(gauge_sibling, Err(MonitorError::Config(_))));

        let outside = ProfileTable::new(vec![entry("g", MetricSpec::gauge(50.0, 1.0, 0.0, 10.0))]);
        assert!(matches!(outside, Err(MonitorError::Config(_))));

        let twice = ProfileTable::new(vec![
            entry("a", MetricSpec::counter(1.0)),
            entry("a", MetricSpec::counter(2.0)),
        ]);
        assert!(matches!(twice, Err(MonitorError::Config(_))));
    }
}
