//! Worst-performing applications over a window, ranked from per-app counter
//! increases.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{AppRanking, WorstApps};
use crate::series::calc::NANOS_IN_SECOND;

pub const LEADERBOARD_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rank {
    /// Operations per second.
    Rps { total: &'static str },
    /// Average operation time in nanoseconds.
    Rt {
        seconds: &'static str,
        total: &'static str,
    },
    /// Share of operations served from cache, in percent.
    CacheHits {
        cached: &'static str,
        total: &'static str,
    },
    /// Average number of items per batch.
    BatchSize {
        items: &'static str,
        total: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leaderboard {
    pub name: &'static str,
    pub rank: Rank,
    /// Lowest values first instead of highest.
    pub ascending: bool,
}

const fn top(name: &'static str, rank: Rank) -> Leaderboard {
    Leaderboard {
        name,
        rank,
        ascending: false,
    }
}

const fn bottom(name: &'static str, rank: Rank) -> Leaderboard {
    Leaderboard {
        name,
        rank,
        ascending: true,
    }
}

const fn rt(seconds: &'static str, total: &'static str) -> Rank {
    Rank::Rt { seconds, total }
}

pub const LEADERBOARDS: [Leaderboard; 13] = [
    top(
        "moreGetTop5AppsByRT",
        rt("heeus_istoragecache_get_seconds", "heeus_istoragecache_get_total"),
    ),
    top(
        "moreGetTop5AppsByRPS",
        Rank::Rps {
            total: "heeus_istoragecache_get_total",
        },
    ),
    bottom(
        "moreGetBottom5AppsByCacheHits",
        Rank::CacheHits {
            cached: "heeus_istoragecache_get_cached_total",
            total: "heeus_istoragecache_get_total",
        },
    ),
    top(
        "moreGetBatchTop5AppsByRT",
        rt(
            "heeus_istoragecache_getbatch_seconds",
            "heeus_istoragecache_getbatch_total",
        ),
    ),
    top(
        "moreGetBatchTop5AppsByRPS",
        Rank::Rps {
            total: "heeus_istoragecache_getbatch_total",
        },
    ),
    bottom(
        "moreGetBatchBottom5AppsByCacheHits",
        Rank::CacheHits {
            cached: "heeus_istoragecache_getbatch_cached_total",
            total: "heeus_istoragecache_getbatch_total",
        },
    ),
    top(
        "morePutTop5AppsByRT",
        rt("heeus_istoragecache_put_seconds", "heeus_istoragecache_put_total"),
    ),
    top(
        "morePutTop5AppsByRPS",
        Rank::Rps {
            total: "heeus_istoragecache_put_total",
        },
    ),
    top(
        "moreReadTop5AppsByRT",
        rt("heeus_istoragecache_read_seconds", "heeus_istoragecache_read_total"),
    ),
    top(
        "moreReadTop5AppsByRPS",
        Rank::Rps {
            total: "heeus_istoragecache_read_total",
        },
    ),
    top(
        "morePutBatchTop5AppsByRT",
        rt(
            "heeus_istoragecache_putbatch_seconds",
            "heeus_istoragecache_putbatch_total",
        ),
    ),
    top(
        "morePutBatchTop5AppsByRPS",
        Rank::Rps {
            total: "heeus_istoragecache_putbatch_total",
        },
    ),
    top(
        "morePutBatchTop5AppsByBatchSize",
        Rank::BatchSize {
            items: "heeus_istoragecache_putbatch_items_total",
            total: "heeus_istoragecache_putbatch_total",
        },
    ),
];

/// Counter increase per app and metric over one window.
#[derive(Debug, Clone, Default)]
pub struct Increases {
    by_app: HashMap<String, HashMap<String, f64>>,
}

impl Increases {
    pub fn insert(&mut self, app: &str, metric: &str, increase: f64) {
        self.by_app
            .entry(app.to_string())
            .or_default()
            .insert(metric.to_string(), increase);
    }

    fn get(&self, app: &str, metric: &str) -> Option<f64> {
        self.by_app.get(app).and_then(|m| m.get(metric)).copied()
    }

    fn score(&self, app: &str, rank: Rank, interval_secs: u64) -> Option<f64> {
        match rank {
            Rank::Rps { total } => {
                if interval_secs == 0 {
                    return None;
                }
                Some(self.get(app, total)? / interval_secs as f64)
            }
            Rank::Rt { seconds, total } => {
                let count = self.get(app, total)?;
                if count == 0.0 {
                    return None;
                }
                Some(self.get(app, seconds)? / count * NANOS_IN_SECOND)
            }
            Rank::CacheHits { cached, total } => {
                let count = self.get(app, total)?;
                if count == 0.0 {
                    return None;
                }
                Some(self.get(app, cached)? * 100.0 / count)
            }
            Rank::BatchSize { items, total } => {
                let count = self.get(app, total)?;
                if count == 0.0 {
                    return None;
                }
                Some(self.get(app, items)? / count)
            }
        }
    }

    /// Ranks every app with data for a leaderboard; apps missing one of the
    /// counters it needs are left out.
    pub fn rank(&self, interval_secs: u64) -> WorstApps {
        LEADERBOARDS
            .iter()
            .map(|board| {
                let mut entries: Vec<AppRanking> = self
                    .by_app
                    .keys()
                    .filter_map(|app| {
                        self.score(app, board.rank, interval_secs)
                            .map(|value| AppRanking {
                                app: app.clone(),
                                value,
                            })
                    })
                    .collect();

                entries.sort_by(|a, b| {
                    let order = a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal);
                    let order = if board.ascending { order } else { order.reverse() };
                    order.then_with(|| a.app.cmp(&b.app))
                });
                entries.truncate(LEADERBOARD_SIZE);
                (board.name.to_string(), entries)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn apps(list: &[AppRanking]) -> Vec<&str> {
        list.iter().map(|r| r.app.as_str()).collect()
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let mut increases = Increases::default();
        for (i, app) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
            increases.insert(app, "heeus_istoragecache_get_total", 600.0 * (i + 1) as f64);
        }

        let worst = increases.rank(60);
        let rps = &worst["moreGetTop5AppsByRPS"];
        assert_eq!(apps(rps), vec!["f", "e", "d", "c", "b"]);
        assert_eq!(rps[0].value, 60.0);
        assert!(worst["moreGetTop5AppsByRT"].is_empty());
    }

    #[test]
    fn test_cache_hits_lowest_first() {
        let mut increases = Increases::default();
        increases.insert("untill/air", "heeus_istoragecache_get_total", 100.0);
        increases.insert("untill/air", "heeus_istoragecache_get_cached_total", 45.0);
        increases.insert("sys/monitor", "heeus_istoragecache_get_total", 100.0);
        increases.insert("sys/monitor", "heeus_istoragecache_get_cached_total", 8.0);

        let worst = increases.rank(60);
        let hits = &worst["moreGetBottom5AppsByCacheHits"];
        assert_eq!(apps(hits), vec!["sys/monitor", "untill/air"]);
        assert_eq!(hits[1].value, 45.0);
    }

    #[test]
    fn test_batch_size_needs_item_counter() {
        let mut increases = Increases::default();
        increases.insert("untill/air", "heeus_istoragecache_putbatch_total", 10.0);
        increases.insert("untill/air", "heeus_istoragecache_putbatch_items_total", 600.0);
        increases.insert("sys/monitor", "heeus_istoragecache_putbatch_total", 10.0);

        let worst = increases.rank(60);
        let sizes = &worst["morePutBatchTop5AppsByBatchSize"];
        assert_eq!(apps(sizes), vec!["untill/air"]);
        assert_eq!(sizes[0].value, 60.0);
    }

    #[test]
    fn test_every_list_is_present_without_data() {
        let worst = Increases::default().rank(60);
        assert_eq!(worst.len(), LEADERBOARDS.len());
        assert!(worst.values().all(|list| list.is_empty()));
    }

    #[test]
    fn test_rt_skips_idle_apps() {
        let mut increases = Increases::default();
        increases.insert("busy", "heeus_istoragecache_put_seconds", 0.5);
        increases.insert("busy", "heeus_istoragecache_put_total", 5.0);
        increases.insert("idle", "heeus_istoragecache_put_seconds", 0.0);
        increases.insert("idle", "heeus_istoragecache_put_total", 0.0);

        let worst = increases.rank(60);
        let rt = &worst["morePutTop5AppsByRT"];
        assert_eq!(apps(rt), vec!["busy"]);
        assert!((rt[0].value - 100_000_000.0).abs() < 1e-3);
    }
}
