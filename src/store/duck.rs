use async_trait::async_trait;
use duckdb::{params, params_from_iter, types::Value, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::leaderboard::Increases;
use crate::metrics;
use crate::models::{MetricQuery, Sample, WorstApps};
use crate::store::SampleStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS samples (
        app VARCHAR NOT NULL,
        metric VARCHAR NOT NULL,
        tag VARCHAR NOT NULL,
        time_ms BIGINT NOT NULL,
        value DOUBLE NOT NULL,
        PRIMARY KEY (app, metric, tag, time_ms)
    );
";

/// Sample store backed by an embedded DuckDB database.
#[derive(Clone)]
pub struct DuckDbStore {
    db: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    pub fn open(path: &str) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn since(interval_secs: u64) -> i64 {
        let span = i64::try_from(interval_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        chrono::Utc::now().timestamp_millis().saturating_sub(span)
    }
}

/// `?, ?, ?` for `n` placeholders.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl SampleStore for DuckDbStore {
    fn backend(&self) -> &'static str {
        "duckdb"
    }

    async fn fetch_samples(&self, query: &MetricQuery, interval_secs: u64) -> Result<Vec<Sample>> {
        if query.metrics.is_empty() {
            return Ok(Vec::new());
        }

        // Untagged queries only see untagged samples.
        let tags: Vec<String> = if query.tags.is_empty() {
            vec![String::new()]
        } else {
            query.tags.clone()
        };

        let sql = format!(
            "SELECT time_ms, metric, tag, value FROM samples
             WHERE app = ? AND time_ms >= ? AND metric IN ({}) AND tag IN ({})
             ORDER BY time_ms, metric, tag",
            placeholders(query.metrics.len()),
            placeholders(tags.len())
        );

        let mut values = vec![
            Value::Text(query.app.clone()),
            Value::BigInt(Self::since(interval_secs)),
        ];
        values.extend(query.metrics.iter().cloned().map(Value::Text));
        values.extend(tags.into_iter().map(Value::Text));

        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok(Sample {
                time: row.get(0)?,
                metric: row.get(1)?,
                tag: row.get(2)?,
                app: query.app.clone(),
                value: row.get(3)?,
            })
        })?;

        let samples = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Read {} samples for {}", samples.len(), query.app);
        Ok(samples)
    }

    async fn fetch_worst_apps(&self, interval_secs: u64) -> Result<WorstApps> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT app, metric, max(value) - min(value)
             FROM samples
             WHERE time_ms >= ? AND tag = ''
             GROUP BY app, metric",
        )?;
        let rows = stmt.query_map(params![Self::since(interval_secs)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut increases = Increases::default();
        for row in rows {
            let (app, metric, increase) = row?;
            increases.insert(&app, &metric, increase);
        }

        Ok(increases.rank(interval_secs))
    }

    async fn ingest(&self, samples: Vec<Sample>) -> Result<usize> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO samples (app, metric, tag, time_ms, value)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for sample in &samples {
                stmt.execute(params![
                    sample.app,
                    sample.metric,
                    sample.tag,
                    sample.time,
                    sample.value
                ])?;
            }
        }
        tx.commit()?;

        info!("Ingested {} samples", samples.len());
        metrics::record_ingested(samples.len());
        Ok(samples.len())
    }
}
