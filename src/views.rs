//! Chart descriptors: which raw metrics a chart needs and how its fields are
//! derived from them.
//!
//! Descriptors are plain data. The transform is the interpretation of
//! `fields` over the aligned rows, so a descriptor can be listed, serialized
//! and tested without running anything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{MonitorError, Result};
use crate::models::{distinct_tags, MetricQuery, OutputKey, OutputRecord, Sample};
use crate::series::{self, Calc, FieldRef};

const CPU_IDLE: &str = "node_cpu_idle_seconds_total";
const MEM_AVAILABLE: &str = "node_memory_memavailable_bytes";
const MEM_TOTAL: &str = "node_memory_memtotal_bytes";
const FS_FREE: &str = "node_filesystem_free_bytes";
const FS_SIZE: &str = "node_filesystem_size_bytes";
const DISK_READ_BYTES: &str = "node_disk_read_bytes_total";
const DISK_WRITE_BYTES: &str = "node_disk_write_bytes_total";
const DISK_READS: &str = "node_disk_reads_completed_total";
const DISK_WRITES: &str = "node_disk_writes_completed_total";

const CP_COMMANDS_TOTAL: &str = "heeus_cp_commands_total";
const QP_QUERIES_TOTAL: &str = "heeus_qp_queries_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewKind {
    HvmsCpuUsage,
    HvmsMemoryUsage,
    HvmsDiskUsage,
    HvmsDiskIo,
    HvmsIops,
    ProcessorsRps,
    HttpStatusCodes,
    StorageIops,
    StorageCacheHits,
    StorageExecTime,
    CommandProcessor,
    QueryProcessor,
}

impl ViewKind {
    pub const ALL: [ViewKind; 12] = [
        ViewKind::HvmsCpuUsage,
        ViewKind::HvmsMemoryUsage,
        ViewKind::HvmsDiskUsage,
        ViewKind::HvmsDiskIo,
        ViewKind::HvmsIops,
        ViewKind::ProcessorsRps,
        ViewKind::HttpStatusCodes,
        ViewKind::StorageIops,
        ViewKind::StorageCacheHits,
        ViewKind::StorageExecTime,
        ViewKind::CommandProcessor,
        ViewKind::QueryProcessor,
    ];

    /// Charts shown on the per-application performance page.
    pub const APP_PERFORMANCE: [ViewKind; 7] = [
        ViewKind::ProcessorsRps,
        ViewKind::HttpStatusCodes,
        ViewKind::CommandProcessor,
        ViewKind::QueryProcessor,
        ViewKind::StorageIops,
        ViewKind::StorageExecTime,
        ViewKind::StorageCacheHits,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::HvmsCpuUsage => "hvms-cpu-usage",
            ViewKind::HvmsMemoryUsage => "hvms-memory-usage",
            ViewKind::HvmsDiskUsage => "hvms-disk-usage",
            ViewKind::HvmsDiskIo => "hvms-disk-io",
            ViewKind::HvmsIops => "hvms-iops",
            ViewKind::ProcessorsRps => "processors-rps",
            ViewKind::HttpStatusCodes => "http-status-codes",
            ViewKind::StorageIops => "storage-iops",
            ViewKind::StorageCacheHits => "storage-cache-hits",
            ViewKind::StorageExecTime => "storage-exec-time",
            ViewKind::CommandProcessor => "command-processor",
            ViewKind::QueryProcessor => "query-processor",
        }
    }

    /// Node-level views fan out one field per instance tag.
    pub fn is_node_level(&self) -> bool {
        matches!(
            self,
            ViewKind::HvmsCpuUsage
                | ViewKind::HvmsMemoryUsage
                | ViewKind::HvmsDiskUsage
                | ViewKind::HvmsDiskIo
                | ViewKind::HvmsIops
        )
    }

    /// Repeated tags are collapsed so every key and query tag is unique.
    pub fn descriptor(self, app: &str, tags: &[String]) -> Result<ViewDescriptor> {
        let tags = distinct_tags(tags);
        let tags = tags.as_slice();
        if self.is_node_level() && tags.is_empty() {
            return Err(MonitorError::InvalidQuery(format!(
                "{} needs at least one instance tag",
                self
            )));
        }

        let descriptor = match self {
            ViewKind::HvmsCpuUsage => per_tag(self, app, tags, &[CPU_IDLE], |tag| {
                Calc::rate(FieldRef::new(tag, CPU_IDLE)).scaled(100.0).floor()
            }),
            ViewKind::HvmsMemoryUsage => per_tag(self, app, tags, &[MEM_AVAILABLE, MEM_TOTAL], |tag| {
                Calc::share(FieldRef::new(tag, MEM_AVAILABLE), FieldRef::new(tag, MEM_TOTAL))
            }),
            ViewKind::HvmsDiskUsage => per_tag(self, app, tags, &[FS_FREE, FS_SIZE], |tag| {
                Calc::share(FieldRef::new(tag, FS_FREE), FieldRef::new(tag, FS_SIZE))
            }),
            ViewKind::HvmsDiskIo => per_tag(
                self,
                app,
                tags,
                &[DISK_READ_BYTES, DISK_WRITE_BYTES],
                |tag| {
                    Calc::sum(vec![
                        Calc::rate(FieldRef::new(tag, DISK_READ_BYTES)),
                        Calc::rate(FieldRef::new(tag, DISK_WRITE_BYTES)),
                    ])
                },
            ),
            ViewKind::HvmsIops => per_tag(self, app, tags, &[DISK_READS, DISK_WRITES], |tag| {
                Calc::sum(vec![
                    Calc::rate(FieldRef::new(tag, DISK_WRITES)),
                    Calc::rate(FieldRef::new(tag, DISK_READS)),
                ])
            }),
            ViewKind::ProcessorsRps => processors_rps(app),
            ViewKind::HttpStatusCodes => http_status_codes(app),
            ViewKind::StorageIops => storage_iops(app),
            ViewKind::StorageCacheHits => storage_cache_hits(app),
            ViewKind::StorageExecTime => storage_exec_time(app),
            ViewKind::CommandProcessor => command_processor(app),
            ViewKind::QueryProcessor => query_processor(app),
        };

        Ok(descriptor)
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ViewKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        ViewKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| MonitorError::NotFound(format!("View {} not found", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    pub calc: Calc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub kind: ViewKind,
    pub query: MetricQuery,
    pub keys: Vec<OutputKey>,
    pub fields: Vec<FieldSpec>,
}

impl ViewDescriptor {
    /// One output record per aligned row, first row included.
    pub fn transform(&self, samples: &[Sample]) -> Vec<OutputRecord> {
        series::transform(samples, |cur, prev| OutputRecord {
            x: cur.time,
            fields: self
                .fields
                .iter()
                .map(|field| (field.id.clone(), field.calc.eval(cur, prev)))
                .collect(),
        })
    }

    /// Every raw metric name the fields read.
    pub fn referenced_metrics(&self) -> BTreeSet<String> {
        let mut metrics = BTreeSet::new();
        for field in &self.fields {
            field.calc.collect_metrics(&mut metrics);
        }
        metrics
    }
}

fn query(app: &str, metrics: &[&str], tags: &[String]) -> MetricQuery {
    MetricQuery {
        metrics: metrics.iter().map(|m| m.to_string()).collect(),
        app: app.to_string(),
        tags: tags.to_vec(),
    }
}

fn per_tag<F>(kind: ViewKind, app: &str, tags: &[String], metrics: &[&str], calc: F) -> ViewDescriptor
where
    F: Fn(&str) -> Calc,
{
    ViewDescriptor {
        kind,
        query: query(app, metrics, tags),
        keys: tags.iter().map(|tag| OutputKey::new(tag, tag)).collect(),
        fields: tags
            .iter()
            .map(|tag| FieldSpec {
                id: tag.clone(),
                calc: calc(tag),
            })
            .collect(),
    }
}

/// Builds a process-level descriptor from `(id, display name, calc)` rows.
fn fixed(kind: ViewKind, app: &str, metrics: &[&str], rows: Vec<(&str, &str, Calc)>) -> ViewDescriptor {
    let keys = rows.iter().map(|(id, name, _)| OutputKey::new(id, name)).collect();
    let fields = rows
        .into_iter()
        .map(|(id, _, calc)| FieldSpec {
            id: id.to_string(),
            calc,
        })
        .collect();

    ViewDescriptor {
        kind,
        query: query(app, metrics, &[]),
        keys,
        fields,
    }
}

fn floored_rate(metric: &str) -> Calc {
    Calc::rate(FieldRef::untagged(metric)).floor()
}

fn exectime(seconds: &str, total: &str) -> Calc {
    Calc::exectime(FieldRef::untagged(seconds), FieldRef::untagged(total))
}

fn processors_rps(app: &str) -> ViewDescriptor {
    fixed(
        ViewKind::ProcessorsRps,
        app,
        &[CP_COMMANDS_TOTAL, QP_QUERIES_TOTAL],
        vec![
            ("q", "Queries", floored_rate(QP_QUERIES_TOTAL)),
            ("c", "Commands", floored_rate(CP_COMMANDS_TOTAL)),
            (
                "tot",
                "Total",
                Calc::sum(vec![
                    floored_rate(CP_COMMANDS_TOTAL),
                    floored_rate(QP_QUERIES_TOTAL),
                ]),
            ),
        ],
    )
}

fn http_status_codes(app: &str) -> ViewDescriptor {
    let delta = |metric: &str| Calc::delta(FieldRef::untagged(metric)).floor();
    fixed(
        ViewKind::HttpStatusCodes,
        app,
        &[
            "heeus_http_status_2xx_total",
            "heeus_http_status_4xx_total",
            "heeus_http_status_5xx_total",
            "heeus_http_status_503_total",
        ],
        vec![
            ("c2xx", "2xx", delta("heeus_http_status_2xx_total")),
            ("c4xx", "4xx", delta("heeus_http_status_4xx_total")),
            ("c5xx", "5xx", delta("heeus_http_status_5xx_total")),
            ("c503", "503", delta("heeus_http_status_503_total")),
        ],
    )
}

fn storage_iops(app: &str) -> ViewDescriptor {
    fixed(
        ViewKind::StorageIops,
        app,
        &[
            "heeus_istoragecache_get_total",
            "heeus_istoragecache_getbatch_total",
            "heeus_istoragecache_put_total",
            "heeus_istoragecache_putbatch_total",
            "heeus_istoragecache_read_total",
        ],
        vec![
            ("get", "Get", floored_rate("heeus_istoragecache_get_total")),
            ("getbatch", "GetBatch", floored_rate("heeus_istoragecache_getbatch_total")),
            ("put", "Put", floored_rate("heeus_istoragecache_put_total")),
            ("putbatch", "PutBatch", floored_rate("heeus_istoragecache_putbatch_total")),
            ("read", "Read", floored_rate("heeus_istoragecache_read_total")),
        ],
    )
}

fn storage_cache_hits(app: &str) -> ViewDescriptor {
    let hits = |cached: &str, total: &str| {
        Calc::delta_share(FieldRef::untagged(cached), FieldRef::untagged(total))
    };
    fixed(
        ViewKind::StorageCacheHits,
        app,
        &[
            "heeus_istoragecache_get_total",
            "heeus_istoragecache_get_cached_total",
            "heeus_istoragecache_getbatch_total",
            "heeus_istoragecache_getbatch_cached_total",
        ],
        vec![
            (
                "get",
                "Get",
                hits("heeus_istoragecache_get_cached_total", "heeus_istoragecache_get_total"),
            ),
            (
                "getBatch",
                "GetBatch",
                hits(
                    "heeus_istoragecache_getbatch_cached_total",
                    "heeus_istoragecache_getbatch_total",
                ),
            ),
        ],
    )
}

fn storage_exec_time(app: &str) -> ViewDescriptor {
    let ops = [
        ("get", "Get"),
        ("getbatch", "GetBatch"),
        ("put", "Put"),
        ("putbatch", "PutBatch"),
        ("read", "Read"),
    ];
    let pairs: Vec<(String, String)> = ops
        .iter()
        .map(|(op, _)| {
            (
                format!("heeus_istoragecache_{}_seconds", op),
                format!("heeus_istoragecache_{}_total", op),
            )
        })
        .collect();

    let metrics: Vec<&str> = pairs
        .iter()
        .flat_map(|(seconds, total)| [seconds.as_str(), total.as_str()])
        .collect();
    let rows = ops
        .iter()
        .zip(&pairs)
        .map(|((id, name), (seconds, total))| (*id, *name, exectime(seconds, total)))
        .collect();

    fixed(ViewKind::StorageExecTime, app, &metrics, rows)
}

fn command_processor(app: &str) -> ViewDescriptor {
    fixed(
        ViewKind::CommandProcessor,
        app,
        &[
            CP_COMMANDS_TOTAL,
            "heeus_cp_commands_seconds",
            "heeus_cp_exec_seconds",
            "heeus_cp_validate_seconds",
            "heeus_cp_putplog_seconds",
        ],
        vec![
            ("tot", "Total Command", exectime("heeus_cp_commands_seconds", CP_COMMANDS_TOTAL)),
            ("validate", "Validate", exectime("heeus_cp_validate_seconds", CP_COMMANDS_TOTAL)),
            ("exec", "Exec", exectime("heeus_cp_exec_seconds", CP_COMMANDS_TOTAL)),
            ("plog", "PutPLog", exectime("heeus_cp_putplog_seconds", CP_COMMANDS_TOTAL)),
        ],
    )
}

fn query_processor(app: &str) -> ViewDescriptor {
    let stages = [
        ("tot", "Total Query", "heeus_qp_queries_seconds"),
        ("build", "Build", "heeus_qp_build_seconds"),
        ("exec", "Exec", "heeus_qp_exec_seconds"),
        ("execFields", "Exec/Fields", "heeus_qp_exec_fields_seconds"),
        ("execEnrich", "Exec/Enrich", "heeus_qp_exec_enrich_seconds"),
        ("execFilter", "Exec/Filter", "heeus_qp_exec_filter_seconds"),
        ("execOrder", "Exec/Order", "heeus_qp_exec_order_seconds"),
        ("execCount", "Exec/Count", "heeus_qp_exec_count_seconds"),
        ("execSend", "Exec/Send", "heeus_qp_exec_send_seconds"),
    ];

    let mut metrics = vec![QP_QUERIES_TOTAL];
    metrics.extend(stages.iter().map(|(_, _, seconds)| *seconds));
    let rows = stages
        .iter()
        .map(|(id, name, seconds)| (*id, *name, exectime(seconds, QP_QUERIES_TOTAL)))
        .collect();

    fixed(ViewKind::QueryProcessor, app, &metrics, rows)
}
