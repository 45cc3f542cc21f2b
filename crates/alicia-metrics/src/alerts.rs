//! Alert rule evaluation: edge-triggered firing/clearing against
//! `MetricStore` aggregations, with flap suppression (at most one state
//! change per rule per 30 s). Evaluated on a fixed interval by the owning
//! collector task, mirroring the polling-loop shape of `alicia-balancer`'s
//! health prober rather than reacting per-sample.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::MetricStore;

pub const EVALUATION_INTERVAL: Duration = Duration::from_secs(10);
pub const FLAP_SUPPRESSION: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl Comparator {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > threshold,
            Comparator::LessThan => value < threshold,
            Comparator::GreaterOrEqual => value >= threshold,
            Comparator::LessOrEqual => value <= threshold,
            Comparator::Equal => value == threshold,
            Comparator::NotEqual => value != threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Avg,
    Min,
    Max,
    P50,
    P95,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub rule_id: String,
    pub metric_name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub aggregate: Aggregate,
    pub comparator: Comparator,
    pub threshold: f64,
    /// Size of the trailing aggregation window. 0 aggregates the full
    /// retained ring.
    #[serde(default)]
    pub window_seconds: u64,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub rule_id: String,
    pub metric_name: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub fired_at: chrono::DateTime<Utc>,
}

struct RuleState {
    firing: bool,
    last_transition: Instant,
}

pub struct AlertEngine {
    rules: Vec<AlertRule>,
    state: HashMap<String, RuleState>,
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules,
            state: HashMap::new(),
        }
    }

    /// Evaluates every rule against the current store contents. Returns the
    /// transitions (fired or cleared) that actually happened this tick —
    /// rules whose state is unchanged, or that are within their flap
    /// suppression window, produce nothing.
    pub fn evaluate(&mut self, store: &MetricStore) -> Vec<(AlertTransition, AlertEvent)> {
        let now = Instant::now();
        let mut transitions = Vec::new();

        for rule in &self.rules {
            if !rule.enabled {
                continue;
            }
            let Some(agg) = store.query(&rule.metric_name, &rule.labels, rule.window_seconds) else {
                continue;
            };
            let value = match rule.aggregate {
                Aggregate::Avg => agg.avg,
                Aggregate::Min => agg.min,
                Aggregate::Max => agg.max,
                Aggregate::P50 => agg.p50,
                Aggregate::P95 => agg.p95,
            };
            let should_fire = rule.comparator.holds(value, rule.threshold);

            let entry = self.state.entry(rule.rule_id.clone()).or_insert(RuleState {
                firing: false,
                last_transition: now - FLAP_SUPPRESSION,
            });

            if should_fire == entry.firing {
                continue;
            }
            if now.duration_since(entry.last_transition) < FLAP_SUPPRESSION {
                continue;
            }

            entry.firing = should_fire;
            entry.last_transition = now;

            let event = AlertEvent {
                rule_id: rule.rule_id.clone(),
                metric_name: rule.metric_name.clone(),
                value,
                threshold: rule.threshold,
                severity: rule.severity,
                fired_at: Utc::now(),
            };
            let transition = if should_fire {
                AlertTransition::Fired
            } else {
                AlertTransition::Cleared
            };
            transitions.push((transition, event));
        }

        transitions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    Fired,
    Cleared,
}

impl AlertTransition {
    pub fn topic(self) -> &'static str {
        match self {
            AlertTransition::Fired => "alicia/alerts/active",
            AlertTransition::Cleared => "alicia/alerts/cleared",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{MetricKind, MetricSample};

    fn rule() -> AlertRule {
        AlertRule {
            rule_id: "r1".to_string(),
            metric_name: "cpu_pct".to_string(),
            labels: BTreeMap::new(),
            aggregate: Aggregate::Max,
            comparator: Comparator::GreaterThan,
            threshold: 80.0,
            window_seconds: 0,
            severity: Severity::Warning,
            enabled: true,
        }
    }

    fn push(store: &MetricStore, value: f64) {
        store.ingest(MetricSample {
            name: "cpu_pct".to_string(),
            value,
            timestamp: Utc::now(),
            labels: BTreeMap::new(),
            kind: MetricKind::Gauge,
        });
    }

    #[test]
    fn fires_on_threshold_crossing_and_suppresses_immediate_reflap() {
        let store = MetricStore::new();
        let mut engine = AlertEngine::new(vec![rule()]);

        push(&store, 10.0);
        assert!(engine.evaluate(&store).is_empty());

        push(&store, 95.0);
        push(&store, 95.0);
        let fired = engine.evaluate(&store);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, AlertTransition::Fired);

        // Still above threshold: no repeated firing event.
        assert!(engine.evaluate(&store).is_empty());
    }

    #[test]
    fn unknown_series_is_silently_skipped() {
        let store = MetricStore::new();
        let mut engine = AlertEngine::new(vec![rule()]);
        assert!(engine.evaluate(&store).is_empty());
    }

    #[test]
    fn disabled_rule_never_fires() {
        let store = MetricStore::new();
        let mut disabled = rule();
        disabled.enabled = false;
        let mut engine = AlertEngine::new(vec![disabled]);

        push(&store, 95.0);
        assert!(engine.evaluate(&store).is_empty());
    }

    #[test]
    fn equal_and_not_equal_comparators_hold() {
        assert!(Comparator::Equal.holds(80.0, 80.0));
        assert!(!Comparator::Equal.holds(80.1, 80.0));
        assert!(Comparator::NotEqual.holds(80.1, 80.0));
        assert!(!Comparator::NotEqual.holds(80.0, 80.0));
    }

    #[test]
    fn event_carries_rule_severity() {
        let store = MetricStore::new();
        let mut critical = rule();
        critical.severity = Severity::Critical;
        let mut engine = AlertEngine::new(vec![critical]);

        push(&store, 95.0);
        push(&store, 95.0);
        let fired = engine.evaluate(&store);
        assert_eq!(fired[0].1.severity, Severity::Critical);
    }
}
