//! Bounded random walks over the synthetic profiles.

use rand::Rng;
use std::collections::HashMap;

use super::profile::{Cap, Profile, ProfileTable, SCRAPE_INTERVAL_SECS};
use crate::error::Result;
use crate::models::{distinct_tags, MetricQuery, Sample};

const SCRAPE_INTERVAL_MS: i64 = SCRAPE_INTERVAL_SECS * 1000;

/// Gauges start drifting by one unit before the first random step.
const GAUGE_INITIAL_OFFSET: f64 = 1.0;

/// Position of one metric × tag walk.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cursor {
    pub value: Option<f64>,
    pub offset: Option<f64>,
}

/// Per-run walk state keyed by (profile index, tag index). A fresh state is
/// created for every generation call.
#[derive(Debug, Clone, Default)]
pub struct WalkState {
    cursors: HashMap<(usize, usize), Cursor>,
}

impl WalkState {
    pub fn cursor(&self, metric: usize, tag: usize) -> Cursor {
        self.cursors.get(&(metric, tag)).copied().unwrap_or_default()
    }

    pub fn set(&mut self, metric: usize, tag: usize, cursor: Cursor) {
        self.cursors.insert((metric, tag), cursor);
    }
}

/// Half-open `[start, end)` window in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn lookback(end: i64, seconds: u64) -> Self {
        let span = i64::try_from(seconds).unwrap_or(i64::MAX / 1000).saturating_mul(1000);
        Self {
            start: end.saturating_sub(span),
            end,
        }
    }

    /// Scrape ticks from `start`, every 15 seconds, stopping before `end`.
    pub fn ticks(&self) -> impl Iterator<Item = i64> {
        let end = self.end;
        std::iter::successors(Some(self.start), |t| Some(t + SCRAPE_INTERVAL_MS))
            .take_while(move |t| *t < end)
    }
}

/// Advances one walk by a single tick.
///
/// `sibling_offset` is the current offset of the counter that caps this one,
/// if the profile has such a cap and that counter has started stepping.
pub fn advance<R: Rng>(
    profile: &Profile,
    cursor: Cursor,
    sibling_offset: Option<f64>,
    rng: &mut R,
) -> Cursor {
    match (*profile, cursor.value) {
        (Profile::Fixed { value }, _) => Cursor {
            value: Some(value),
            offset: None,
        },
        (_, None) => Cursor {
            value: Some(profile.initial()),
            offset: None,
        },
        (Profile::Gauge { bound, min, max, .. }, Some(value)) => {
            let offset = match cursor.offset {
                None => GAUGE_INITIAL_OFFSET,
                Some(offset) => offset + rng.gen_range(-bound..=bound),
            };
            step_gauge(value, offset, min, max)
        }
        (Profile::Counter { bound, cap, .. }, Some(value)) => {
            let offset = match cursor.offset {
                None => bound,
                Some(offset) => (offset + rng.gen_range(-bound..=bound)).max(0.0),
            };
            let limit = match cap {
                Cap::None => None,
                Cap::Value(limit) => Some(limit),
                Cap::Sibling(_) => sibling_offset,
            };
            let offset = limit.map_or(offset, |limit| offset.min(limit));
            Cursor {
                value: Some(value + offset),
                offset: Some(offset),
            }
        }
    }
}

/// Hitting either bound pins the value there and zeroes the drift.
fn step_gauge(value: f64, offset: f64, min: Option<f64>, max: Option<f64>) -> Cursor {
    let mut value = value + offset;
    let mut offset = offset;
    if let Some(max) = max {
        if value > max {
            value = max;
            offset = 0.0;
        }
    }
    if let Some(min) = min {
        if value < min {
            value = min;
            offset = 0.0;
        }
    }
    Cursor {
        value: Some(value),
        offset: Some(offset),
    }
}

/// Fabricates samples for every requested metric × tag across `window`.
///
/// Samples come out grouped by tick, so they can be aligned directly.
/// Untagged queries walk the single tag `""`; a repeated tag is walked once.
pub fn generate<R: Rng>(
    table: &ProfileTable,
    query: &MetricQuery,
    window: Window,
    rng: &mut R,
) -> Result<Vec<Sample>> {
    let plan = table.plan(&query.metrics)?;
    let tags = if query.tags.is_empty() {
        vec![String::new()]
    } else {
        distinct_tags(&query.tags)
    };

    let emitted = plan.iter().filter(|step| step.emit).count();
    let mut samples = Vec::with_capacity(window.ticks().count() * emitted * tags.len());
    let mut state = WalkState::default();

    for time in window.ticks() {
        for step in &plan {
            let profile = table.profile(step.index);
            for (tag_index, tag) in tags.iter().enumerate() {
                let sibling_offset = match profile {
                    Profile::Counter {
                        cap: Cap::Sibling(sibling),
                        ..
                    } => state.cursor(*sibling, tag_index).offset,
                    _ => None,
                };
                let cursor = advance(profile, state.cursor(step.index, tag_index), sibling_offset, rng);
                state.set(step.index, tag_index, cursor);

                if step.emit {
                    samples.push(Sample {
                        time,
                        metric: table.name(step.index).to_string(),
                        tag: tag.clone(),
                        app: query.app.clone(),
                        value: cursor.value.unwrap_or_default(),
                    });
                }
            }
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::emulator::profile::MetricSpec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn table(entries: Vec<(&str, MetricSpec)>) -> ProfileTable {
        ProfileTable::new(
            entries
                .into_iter()
                .map(|(name, spec)| (name.to_string(), spec))
                .collect(),
        )
        .unwrap()
    }

    fn query(metrics: &[&str], tags: &[&str]) -> MetricQuery {
        MetricQuery {
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            app: "untill/air".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn series<'a>(samples: &'a [Sample], metric: &'a str, tag: &'a str) -> impl Iterator<Item = &'a Sample> {
        samples
            .iter()
            .filter(move |s| s.metric == metric && s.tag == tag)
    }

    #[test]
    fn test_window_ticks() {
        let window = Window::lookback(60_000, 60);
        let ticks: Vec<i64> = window.ticks().collect();
        assert_eq!(ticks, vec![0, 15_000, 30_000, 45_000]);
        assert_eq!(Window::lookback(60_000, 0).ticks().count(), 0);
    }

    #[test]
    fn test_first_tick_is_initial_value() {
        let table = table(vec![("a_total", MetricSpec::counter(300.0))]);
        let mut rng = StdRng::seed_from_u64(7);
        let samples = generate(&table, &query(&["a_total"], &[]), Window::lookback(30_000, 30), &mut rng).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 300.0);
        assert_eq!(samples[0].tag, "");
        assert_eq!(samples[0].app, "untill/air");
        // first step uses the whole bound
        assert_eq!(samples[1].value, 360.0);
    }

    #[test]
    fn test_fixed_never_moves() {
        let table = table(vec![("size_bytes", MetricSpec::fixed(4e12))]);
        let mut rng = StdRng::seed_from_u64(1);
        let samples = generate(&table, &query(&["size_bytes"], &["hvm1"]), Window::lookback(3_600_000, 3600), &mut rng).unwrap();
        assert_eq!(samples.len(), 240);
        assert!(samples.iter().all(|s| s.value == 4e12));
    }

    #[test]
    fn test_gauge_stays_within_bounds() {
        let table = table(vec![(
            "free_bytes",
            MetricSpec::gauge(50.0, 20.0, 10.0, 100.0),
        )]);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let samples = generate(
                &table,
                &query(&["free_bytes"], &["hvm1", "hvm2"]),
                Window::lookback(86_400_000, 86_400),
                &mut rng,
            )
            .unwrap();
            assert!(samples
                .iter()
                .all(|s| (10.0..=100.0).contains(&s.value)), "seed {}", seed);
        }
    }

    #[test]
    fn test_counter_is_non_decreasing() {
        let table = ProfileTable::standard().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let tags = ["hvm1", "hvm2"];
        let samples = generate(
            &table,
            &query(&["node_disk_read_bytes_total", "heeus_cp_commands_total"], &tags),
            Window::lookback(86_400_000, 86_400),
            &mut rng,
        )
        .unwrap();

        for metric in ["node_disk_read_bytes_total", "heeus_cp_commands_total"] {
            for tag in tags {
                let values: Vec<f64> = series(&samples, metric, tag).map(|s| s.value).collect();
                assert_eq!(values.len(), 5760);
                assert!(values.windows(2).all(|w| w[1] >= w[0]), "{} {}", metric, tag);
            }
        }
    }

    #[test]
    fn test_sibling_cap_bounds_increment() {
        let table = table(vec![
            ("hits_total", MetricSpec::capped_by(500.0, "gets_total")),
            ("gets_total", MetricSpec::counter(100.0)),
        ]);

        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let samples = generate(
                &table,
                &query(&["hits_total", "gets_total"], &["hvm1"]),
                Window::lookback(3_600_000, 3600),
                &mut rng,
            )
            .unwrap();

            let hits: Vec<f64> = series(&samples, "hits_total", "hvm1").map(|s| s.value).collect();
            let gets: Vec<f64> = series(&samples, "gets_total", "hvm1").map(|s| s.value).collect();
            assert_eq!(hits.len(), gets.len());
            for i in 1..hits.len() {
                let hit_step = hits[i] - hits[i - 1];
                let get_step = gets[i] - gets[i - 1];
                assert!(hit_step <= get_step + 1e-9, "seed {} tick {}", seed, i);
            }
        }
    }

    #[test]
    fn test_unrequested_sibling_is_not_emitted() {
        let table = ProfileTable::standard().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let samples = generate(
            &table,
            &query(&["heeus_istoragecache_get_cached_total"], &[]),
            Window::lookback(600_000, 600),
            &mut rng,
        )
        .unwrap();
        assert_eq!(samples.len(), 40);
        assert!(samples
            .iter()
            .all(|s| s.metric == "heeus_istoragecache_get_cached_total"));
    }

    #[test]
    fn test_samples_grouped_by_tick() {
        let table = ProfileTable::standard().unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let samples = generate(
            &table,
            &query(&["node_memory_memavailable_bytes", "node_memory_memtotal_bytes"], &["a", "b"]),
            Window::lookback(300_000, 300),
            &mut rng,
        )
        .unwrap();
        assert!(samples.windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(crate::series::align(&samples).len(), 20);
    }

    #[test]
    fn test_repeated_tag_walked_once() {
        let table = ProfileTable::standard().unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let samples = generate(
            &table,
            &query(&["node_disk_reads_completed_total", "node_disk_writes_completed_total"], &["hvm1", "hvm1"]),
            Window::lookback(60_000, 60),
            &mut rng,
        )
        .unwrap();

        assert_eq!(samples.len(), 8);
        let distinct: HashSet<(&str, &str, i64)> = samples
            .iter()
            .map(|s| (s.tag.as_str(), s.metric.as_str(), s.time))
            .collect();
        assert_eq!(distinct.len(), samples.len());
    }

    #[test]
    fn test_advance_threads_state() {
        let profile = Profile::Counter {
            initial: 10.0,
            bound: 0.0,
            cap: Cap::Value(1.0),
        };
        let mut rng = StdRng::seed_from_u64(0);
        let first = advance(&profile, Cursor::default(), None, &mut rng);
        assert_eq!(first, Cursor { value: Some(10.0), offset: None });
        let second = advance(&profile, first, None, &mut rng);
        assert_eq!(second, Cursor { value: Some(10.0), offset: Some(0.0) });
    }
}
