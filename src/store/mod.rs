//! The boundary between derived series and wherever raw samples come from.

pub mod duck;
pub mod emulator;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Backend, Config};
use crate::error::{MonitorError, Result};
use crate::models::{MetricQuery, Sample, WorstApps};

pub use duck::DuckDbStore;
pub use emulator::EmulatorStore;

/// Source of raw samples.
///
/// `fetch_samples` must return samples grouped by ascending timestamp and
/// should return only the metrics and tags the query names.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Short label used in logs and self-metrics.
    fn backend(&self) -> &'static str;

    async fn fetch_samples(&self, query: &MetricQuery, interval_secs: u64) -> Result<Vec<Sample>>;

    async fn fetch_worst_apps(&self, interval_secs: u64) -> Result<WorstApps>;

    async fn ingest(&self, _samples: Vec<Sample>) -> Result<usize> {
        Err(MonitorError::Unsupported(format!(
            "{} store does not accept samples",
            self.backend()
        )))
    }
}

pub fn open_store(config: &Config) -> Result<Arc<dyn SampleStore>> {
    match config.backend {
        Backend::Emulator => {
            info!("Using emulated samples");
            let latency = Duration::from_millis(config.emulate_latency_ms);
            Ok(Arc::new(EmulatorStore::standard(latency)?))
        }
        Backend::DuckDb => {
            let store = match &config.duckdb_path {
                Some(path) => {
                    info!("Opening sample store at {}", path);
                    DuckDbStore::open(path)?
                }
                None => {
                    info!("Opening in-memory sample store");
                    DuckDbStore::in_memory()?
                }
            };
            Ok(Arc::new(store))
        }
    }
}
