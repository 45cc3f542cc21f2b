//! `MetricStore`: per-`(metric_name, label_set_hash)` bounded ring buffer,
//! default capacity 1000 points, default retention 1 hour. Aggregations are
//! computed on demand from the ring rather than maintained incrementally.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};

use crate::ring::RingBuffer;
use crate::sample::{label_set_hash, MetricSample};

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_RETENTION: Duration = Duration::hours(1);

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub count: usize,
}

struct Series {
    name: String,
    samples: RingBuffer<MetricSample>,
}

pub struct MetricStore {
    capacity: usize,
    retention: Duration,
    series: RwLock<HashMap<String, Series>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            retention: DEFAULT_RETENTION,
            series: RwLock::new(HashMap::new()),
        }
    }

    fn key(name: &str, hash: &str) -> String {
        format!("{name}\u{0}{hash}")
    }

    pub fn ingest(&self, sample: MetricSample) {
        let hash = label_set_hash(&sample.labels);
        let key = Self::key(&sample.name, &hash);
        let mut series = self.series.write().expect("metric store lock poisoned");
        let entry = series.entry(key).or_insert_with(|| Series {
            name: sample.name.clone(),
            samples: RingBuffer::new(self.capacity),
        });
        entry.samples.push(sample);
    }

    /// Drops samples older than the retention window from every series.
    /// Empty series are left in place; they carry no material cost and a
    /// concurrent reader may be mid-iteration over them.
    pub fn prune_expired(&self) {
        let cutoff = Utc::now() - self.retention;
        let mut series = self.series.write().expect("metric store lock poisoned");
        for entry in series.values_mut() {
            let retained: Vec<MetricSample> = entry
                .samples
                .iter()
                .filter(|s| s.timestamp >= cutoff)
                .cloned()
                .collect();
            let mut fresh = RingBuffer::new(self.capacity);
            for sample in retained {
                fresh.push(sample);
            }
            entry.samples = fresh;
        }
    }

    /// Aggregate the samples ingested in the last `window_seconds`. A
    /// window of 0 aggregates the full retained ring.
    pub fn query(
        &self,
        name: &str,
        labels: &std::collections::BTreeMap<String, String>,
        window_seconds: u64,
    ) -> Option<Aggregation> {
        let hash = label_set_hash(labels);
        let key = Self::key(name, &hash);
        let series = self.series.read().expect("metric store lock poisoned");
        let entry = series.get(&key)?;
        if window_seconds == 0 {
            return Some(aggregate(entry.samples.iter().map(|s| s.value)));
        }
        let cutoff = Utc::now() - Duration::seconds(window_seconds as i64);
        Some(aggregate(
            entry
                .samples
                .iter()
                .filter(|s| s.timestamp >= cutoff)
                .map(|s| s.value),
        ))
    }

    /// Names of every series currently tracked, regardless of label set.
    pub fn known_metric_names(&self) -> Vec<String> {
        let series = self.series.read().expect("metric store lock poisoned");
        let mut names: Vec<String> = series.values().map(|s| s.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

fn aggregate(values: impl Iterator<Item = f64>) -> Aggregation {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let count = sorted.len();
    if count == 0 {
        return Aggregation::default();
    }
    let sum: f64 = sorted.iter().sum();
    Aggregation {
        avg: sum / count as f64,
        min: sorted[0],
        max: sorted[count - 1],
        p50: percentile(&sorted, 0.50),
        p95: percentile(&sorted, 0.95),
        count,
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::MetricKind;
    use std::collections::BTreeMap;

    fn sample(name: &str, value: f64) -> MetricSample {
        MetricSample {
            name: name.to_string(),
            value,
            timestamp: Utc::now(),
            labels: BTreeMap::new(),
            kind: MetricKind::Gauge,
        }
    }

    #[test]
    fn query_on_unknown_series_returns_none() {
        let store = MetricStore::new();
        assert!(store.query("unknown", &BTreeMap::new(), 0).is_none());
    }

    #[test]
    fn aggregate_over_empty_window_reports_zero_count_and_no_error() {
        let agg = aggregate(std::iter::empty());
        assert_eq!(agg.count, 0);
        assert_eq!(agg.avg, 0.0);
        assert_eq!(agg.min, 0.0);
        assert_eq!(agg.max, 0.0);
        assert_eq!(agg.p50, 0.0);
        assert_eq!(agg.p95, 0.0);
    }

    #[test]
    fn aggregation_reflects_ingested_values() {
        let store = MetricStore::new();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            store.ingest(sample("latency_ms", v));
        }
        let agg = store.query("latency_ms", &BTreeMap::new(), 0).unwrap();
        assert_eq!(agg.count, 5);
        assert_eq!(agg.min, 1.0);
        assert_eq!(agg.max, 5.0);
        assert_eq!(agg.avg, 3.0);
        assert_eq!(agg.p50, 3.0);
    }

    #[test]
    fn distinct_label_sets_are_tracked_as_separate_series() {
        let store = MetricStore::new();
        let mut labels_a = BTreeMap::new();
        labels_a.insert("service".to_string(), "stt".to_string());
        let mut labels_b = BTreeMap::new();
        labels_b.insert("service".to_string(), "tts".to_string());

        store.ingest(MetricSample {
            labels: labels_a.clone(),
            ..sample("requests_total", 10.0)
        });
        store.ingest(MetricSample {
            labels: labels_b.clone(),
            ..sample("requests_total", 99.0)
        });

        assert_eq!(store.query("requests_total", &labels_a, 0).unwrap().max, 10.0);
        assert_eq!(store.query("requests_total", &labels_b, 0).unwrap().max, 99.0);
    }

    #[test]
    fn windowed_query_excludes_samples_outside_the_window() {
        let store = MetricStore::new();
        store.ingest(MetricSample {
            timestamp: Utc::now() - Duration::seconds(120),
            ..sample("latency_ms", 1.0)
        });
        store.ingest(sample("latency_ms", 9.0));

        let windowed = store.query("latency_ms", &BTreeMap::new(), 30).unwrap();
        assert_eq!(windowed.count, 1);
        assert_eq!(windowed.max, 9.0);

        let unwindowed = store.query("latency_ms", &BTreeMap::new(), 0).unwrap();
        assert_eq!(unwindowed.count, 2);
    }

    #[test]
    fn prune_expired_drops_samples_older_than_retention() {
        let store = MetricStore::new();
        store.ingest(MetricSample {
            timestamp: Utc::now() - Duration::hours(2),
            ..sample("stale_metric", 1.0)
        });
        store.prune_expired();
        assert!(store.query("stale_metric", &BTreeMap::new(), 0).is_none()
            || store.query("stale_metric", &BTreeMap::new(), 0).unwrap().count == 0);
    }
}
