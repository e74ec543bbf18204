//! Sample store that fabricates plausible telemetry instead of querying a
//! backend. Used for demos and whenever no real store is configured.

pub mod profile;
pub mod walk;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::error::Result;
use crate::metrics;
use crate::models::{AppRanking, MetricQuery, Sample, WorstApps};
use crate::store::SampleStore;

pub use profile::{MetricSpec, ProfileTable, SCRAPE_INTERVAL_SECS};
pub use walk::{generate, Window};

#[derive(Debug, Clone)]
pub struct EmulatorStore {
    table: Arc<ProfileTable>,
    latency: Duration,
}

impl EmulatorStore {
    pub fn new(table: ProfileTable, latency: Duration) -> Self {
        Self {
            table: Arc::new(table),
            latency,
        }
    }

    pub fn standard(latency: Duration) -> Result<Self> {
        Ok(Self::new(ProfileTable::standard()?, latency))
    }

    /// Waits the configured latency, jittered by up to a quarter either way.
    async fn emulate_latency(&self) {
        if self.latency.is_zero() {
            return;
        }
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        sleep(self.latency.mul_f64(jitter)).await;
    }
}

#[async_trait]
impl SampleStore for EmulatorStore {
    fn backend(&self) -> &'static str {
        "emulator"
    }

    async fn fetch_samples(&self, query: &MetricQuery, interval_secs: u64) -> Result<Vec<Sample>> {
        self.emulate_latency().await;

        let window = Window::lookback(chrono::Utc::now().timestamp_millis(), interval_secs);
        let mut rng = StdRng::from_entropy();
        let samples = generate(&self.table, query, window, &mut rng)?;

        debug!(
            "Generated {} samples for {} metrics of {}",
            samples.len(),
            query.metrics.len(),
            query.app
        );
        metrics::record_generated(samples.len());
        Ok(samples)
    }

    async fn fetch_worst_apps(&self, _interval_secs: u64) -> Result<WorstApps> {
        self.emulate_latency().await;
        Ok(canned_worst_apps())
    }
}

fn ranking(entries: &[(&str, f64)]) -> Vec<AppRanking> {
    entries
        .iter()
        .map(|(app, value)| AppRanking {
            app: app.to_string(),
            value: *value,
        })
        .collect()
}

/// Fixed leaderboards; the emulator has no per-app history to rank.
pub fn canned_worst_apps() -> WorstApps {
    let by_rt = [
        ("untill/air", 940.0),
        ("sys/monitor", 20430.0),
        ("sys/registry", 2114640.0),
    ];
    let by_rps = [
        ("untill/air", 12034.0),
        ("sys/registry", 456.0),
        ("sys/monitor", 67.0),
    ];
    let by_cache_hits = [
        ("untill/air", 45.0),
        ("sys/registry", 32.0),
        ("sys/monitor", 8.0),
    ];
    let batch_by_rt = [
        ("untill/air", 30.0),
        ("sys/monitor", 41.0),
        ("sys/registry", 62.0),
    ];
    let by_batch_size = [
        ("untill/air", 60.0),
        ("sys/registry", 12.0),
        ("sys/monitor", 6.0),
    ];

    let lists: [(&str, &[(&str, f64)]); 13] = [
        ("moreGetTop5AppsByRT", &by_rt),
        ("moreGetTop5AppsByRPS", &by_rps),
        ("moreGetBottom5AppsByCacheHits", &by_cache_hits),
        ("moreGetBatchTop5AppsByRT", &batch_by_rt),
        ("moreGetBatchTop5AppsByRPS", &by_rps),
        ("moreGetBatchBottom5AppsByCacheHits", &by_cache_hits),
        ("morePutTop5AppsByRT", &by_rt),
        ("morePutTop5AppsByRPS", &by_rps),
        ("moreReadTop5AppsByRT", &by_rt),
        ("moreReadTop5AppsByRPS", &by_rps),
        ("morePutBatchTop5AppsByRT", &by_rt),
        ("morePutBatchTop5AppsByRPS", &by_rps),
        ("morePutBatchTop5AppsByBatchSize", &by_batch_size),
    ];

    lists
        .iter()
        .map(|(name, entries)| (name.to_string(), ranking(entries)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::align;

    fn store() -> EmulatorStore {
        EmulatorStore::standard(Duration::ZERO).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_covers_window() {
        let query = MetricQuery {
            metrics: vec![
                "heeus_cp_commands_total".to_string(),
                "heeus_qp_queries_total".to_string(),
            ],
            app: "untill/air".to_string(),
            tags: vec![],
        };

        let samples = store().fetch_samples(&query, 3600).await.unwrap();
        assert_eq!(samples.len(), 240 * 2);
        assert!(samples.iter().all(|s| s.app == "untill/air" && s.tag.is_empty()));

        let rows = align(&samples);
        assert_eq!(rows.len(), 240);
        assert!(rows.windows(2).all(|w| w[1].time - w[0].time == 15_000));
    }

    #[tokio::test]
    async fn test_unknown_metric_fails() {
        let query = MetricQuery {
            metrics: vec!["no_such_metric".to_string()],
            app: "untill/air".to_string(),
            tags: vec![],
        };
        assert!(store().fetch_samples(&query, 60).await.is_err());
    }

    #[tokio::test]
    async fn test_worst_apps() {
        let worst = store().fetch_worst_apps(3600).await.unwrap();
        assert_eq!(worst.len(), 13);
        assert_eq!(worst["moreGetTop5AppsByRPS"][0].app, "untill/air");
        assert_eq!(worst["morePutBatchTop5AppsByBatchSize"][2].value, 6.0);
    }

    #[tokio::test]
    async fn test_ingest_is_unsupported() {
        assert!(store().ingest(vec![]).await.is_err());
    }
}
