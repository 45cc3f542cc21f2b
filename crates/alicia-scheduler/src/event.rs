//! `ScheduledEvent` and `ExecutionRecord` types, and the cron
//! normalization/due-check helpers reused near-verbatim from the rule
//! cooldown scheduler: `normalize_cron` prepends a seconds field for the
//! `cron` crate, `is_cron_due` treats the window between the last run (or
//! one day back) and now as the due interval.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleKind {
    Once { at: DateTime<Utc> },
    Interval { seconds: i64 },
    Cron { expression: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event_id: String,
    pub schedule_kind: ScheduleKind,
    pub target_topic: String,
    pub payload: serde_json::Value,
    pub expect_response: bool,
    #[serde(default = "default_response_timeout_s")]
    pub response_timeout_s: u64,
    #[serde(default)]
    pub allow_overlap: bool,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

fn default_response_timeout_s() -> u64 {
    10
}

impl ScheduledEvent {
    pub fn new(
        event_id: impl Into<String>,
        schedule_kind: ScheduleKind,
        target_topic: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            schedule_kind,
            target_topic: target_topic.into(),
            payload,
            expect_response: false,
            response_timeout_s: default_response_timeout_s(),
            allow_overlap: false,
            enabled: true,
            last_run: None,
            next_run: None,
        }
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub event_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub detail: String,
}

pub const HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;

/// Prepend a seconds field to a 5-field cron expression; pass 6-field
/// expressions through unchanged.
pub fn normalize_cron(cron_5field: &str) -> String {
    let trimmed = cron_5field.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// A cron-scheduled event is due if its most recent tick at or before `now`
/// falls after `last_run` (or, with no prior run, within the last day).
pub fn is_cron_due(schedule: &Schedule, now: DateTime<Utc>, last_run: Option<DateTime<Utc>>) -> bool {
    let check_from = last_run.unwrap_or(now - chrono::Duration::days(1));
    schedule.after(&check_from).next().is_some_and(|next| next <= now)
}

/// Whether `event` should fire at `now`, and if so what its `last_run`/
/// `next_run` fields become afterward. Returns `None` when not due.
pub fn evaluate_due(event: &ScheduledEvent, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
    if !event.enabled {
        return None;
    }
    match &event.schedule_kind {
        ScheduleKind::Once { at } => {
            if event.last_run.is_none() && *at <= now {
                Some((now, None))
            } else {
                None
            }
        }
        ScheduleKind::Interval { seconds } => {
            let interval = chrono::Duration::seconds(*seconds);
            match event.last_run {
                None => Some((now, Some(now + interval))),
                Some(last) => {
                    if now >= last + interval {
                        // Catch up at most one missed interval; any further
                        // missed ticks are skipped, not queued.
                        Some((now, Some(now + interval)))
                    } else {
                        None
                    }
                }
            }
        }
        ScheduleKind::Cron { expression } => {
            let normalized = normalize_cron(expression);
            match Schedule::from_str(&normalized) {
                Ok(schedule) => {
                    if is_cron_due(&schedule, now, event.last_run) {
                        let next = schedule.after(&now).next();
                        Some((now, next))
                    } else {
                        None
                    }
                }
                Err(_) => None,
            }
        }
    }
}
