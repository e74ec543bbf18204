//! Request lifecycle of one chart, and of a page of charts.

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics::{self, FetchTimer};
use crate::models::{OutputKey, OutputRecord};
use crate::store::SampleStore;
use crate::views::{ViewDescriptor, ViewKind};

/// Fetches the raw samples a descriptor names and derives its records.
pub async fn fetch_series(
    store: &dyn SampleStore,
    view: &ViewDescriptor,
    interval_secs: u64,
) -> Result<Vec<OutputRecord>> {
    metrics::record_series_request(view.kind.name());

    let samples = {
        let _timer = FetchTimer::new(store.backend());
        store.fetch_samples(&view.query, interval_secs).await
    };
    let samples = samples.map_err(|e| {
        metrics::record_fetch_failure();
        warn!("Fetching samples for {} failed: {}", view.kind, e);
        e.into_fetch()
    })?;

    let records = view.transform(&samples);
    debug!(
        "{} produced {} records from {} samples",
        view.kind,
        records.len(),
        samples.len()
    );
    Ok(records)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    Loading,
    Ready { records: Vec<OutputRecord> },
    Failed { error: String },
}

/// One chart's data. Every `load` supersedes the ones before it: a result
/// that arrives after a newer load started is dropped. There is no retry; a
/// failure stays until the next load.
pub struct SeriesLoader {
    store: Arc<dyn SampleStore>,
    view: ViewDescriptor,
    generation: AtomicU64,
    state: Mutex<LoadState>,
}

impl SeriesLoader {
    pub fn new(store: Arc<dyn SampleStore>, view: ViewDescriptor) -> Self {
        Self {
            store,
            view,
            generation: AtomicU64::new(0),
            state: Mutex::new(LoadState::Loading),
        }
    }

    pub fn view(&self) -> &ViewDescriptor {
        &self.view
    }

    pub fn state(&self) -> LoadState {
        self.state.lock().clone()
    }

    /// Returns whether this load's result was applied.
    pub async fn load(&self, interval_secs: u64) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.lock() = LoadState::Loading;

        let result = fetch_series(self.store.as_ref(), &self.view, interval_secs).await;

        let mut state = self.state.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding stale {} result", self.view.kind);
            return false;
        }
        *state = match result {
            Ok(records) => LoadState::Ready { records },
            Err(e) => LoadState::Failed {
                error: e.to_string(),
            },
        };
        true
    }
}

#[derive(Debug, Serialize)]
pub struct ChartSnapshot {
    pub keys: Vec<OutputKey>,
    #[serde(flatten)]
    pub state: LoadState,
}

/// A page of charts that load concurrently and independently.
pub struct Dashboard {
    charts: Vec<SeriesLoader>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn SampleStore>, views: Vec<ViewDescriptor>) -> Self {
        let charts = views
            .into_iter()
            .map(|view| SeriesLoader::new(store.clone(), view))
            .collect();
        Self { charts }
    }

    /// The per-application performance page.
    pub fn app_performance(store: Arc<dyn SampleStore>, app: &str) -> Result<Self> {
        let views = ViewKind::APP_PERFORMANCE
            .iter()
            .map(|kind| kind.descriptor(app, &[]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(store, views))
    }

    pub async fn reload(&self, interval_secs: u64) {
        join_all(self.charts.iter().map(|chart| chart.load(interval_secs))).await;
    }

    pub fn snapshot(&self) -> BTreeMap<ViewKind, ChartSnapshot> {
        self.charts
            .iter()
            .map(|chart| {
                (
                    chart.view().kind,
                    ChartSnapshot {
                        keys: chart.view().keys.clone(),
                        state: chart.state(),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::models::{MetricQuery, Sample, WorstApps};
    use crate::store::EmulatorStore;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Answers after `interval_secs` milliseconds so tests can order
    /// completions; interval 13 fails with a storage error.
    struct SlowStore;

    #[async_trait]
    impl SampleStore for SlowStore {
        fn backend(&self) -> &'static str {
            "slow"
        }

        async fn fetch_samples(&self, query: &MetricQuery, interval_secs: u64) -> Result<Vec<Sample>> {
            tokio::time::sleep(Duration::from_millis(interval_secs)).await;
            if interval_secs == 13 {
                return Err(MonitorError::Database("backend unavailable".to_string()));
            }
            Ok(query
                .metrics
                .iter()
                .flat_map(|metric| {
                    [
                        Sample::new(0, metric, "", &query.app, 0.0),
                        Sample::new(15_000, metric, "", &query.app, interval_secs as f64 * 15.0),
                    ]
                })
                .collect())
        }

        async fn fetch_worst_apps(&self, _interval_secs: u64) -> Result<WorstApps> {
            Ok(WorstApps::new())
        }
    }

    fn rps_loader() -> SeriesLoader {
        let view = ViewKind::ProcessorsRps.descriptor("untill/air", &[]).unwrap();
        SeriesLoader::new(Arc::new(SlowStore), view)
    }

    #[tokio::test]
    async fn test_load_applies_result() {
        let loader = rps_loader();
        assert_eq!(loader.state(), LoadState::Loading);
        assert!(loader.load(4).await);

        match loader.state() {
            LoadState::Ready { records } => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[1].get("c"), Some(4.0));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_storage_failure_becomes_fetch_error() {
        let view = ViewKind::ProcessorsRps.descriptor("untill/air", &[]).unwrap();
        let err = fetch_series(&SlowStore, &view, 13).await.unwrap_err();
        assert!(matches!(err, MonitorError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_failure_is_surfaced_once() {
        let loader = rps_loader();
        assert!(loader.load(13).await);
        assert!(matches!(loader.state(), LoadState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let loader = rps_loader();
        // the first load answers last
        let (stale, fresh) = tokio::join!(loader.load(200), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            loader.load(5).await
        });

        assert!(!stale);
        assert!(fresh);
        match loader.state() {
            LoadState::Ready { records } => assert_eq!(records[1].get("c"), Some(5.0)),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_app_performance_dashboard() {
        let store: Arc<dyn SampleStore> = Arc::new(EmulatorStore::standard(Duration::ZERO).unwrap());
        let dashboard = Dashboard::app_performance(store, "untill/air").unwrap();
        dashboard.reload(600).await;

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.len(), ViewKind::APP_PERFORMANCE.len());
        for (kind, chart) in &snapshot {
            match &chart.state {
                LoadState::Ready { records } => assert_eq!(records.len(), 40, "{}", kind),
                other => panic!("{} is {:?}", kind, other),
            }
        }
    }
}
