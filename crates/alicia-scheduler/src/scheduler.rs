//! `SchedulerState`: owns the `{event_id: ScheduledEvent}` map and the
//! per-event capped execution history, generalized from `RuleScheduler`'s
//! `{entries: HashMap<id, Entry>}` shape to full CRUD plus execution
//! bookkeeping instead of a single cooldown/cron evaluation loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use chrono::Utc;
use thiserror::Error;

use crate::event::{evaluate_due, ExecutionRecord, ScheduledEvent, HISTORY_CAPACITY};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("event not found: {0}")]
    NotFound(String),
    #[error("event already exists: {0}")]
    AlreadyExists(String),
    #[error("event {0} is already running and does not allow overlap")]
    Overlapping(String),
}

struct EventState {
    event: ScheduledEvent,
    history: VecDeque<ExecutionRecord>,
}

#[derive(Default)]
pub struct SchedulerState {
    events: RwLock<HashMap<String, EventState>>,
    running: RwLock<HashSet<String>>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, event: ScheduledEvent) -> Result<(), SchedulerError> {
        let mut events = self.events.write().expect("scheduler lock poisoned");
        if events.contains_key(&event.event_id) {
            return Err(SchedulerError::AlreadyExists(event.event_id));
        }
        events.insert(
            event.event_id.clone(),
            EventState {
                event,
                history: VecDeque::new(),
            },
        );
        Ok(())
    }

    pub fn update(&self, event: ScheduledEvent) -> Result<(), SchedulerError> {
        let mut events = self.events.write().expect("scheduler lock poisoned");
        let slot = events
            .get_mut(&event.event_id)
            .ok_or_else(|| SchedulerError::NotFound(event.event_id.clone()))?;
        slot.event = event;
        Ok(())
    }

    pub fn delete(&self, event_id: &str) -> Result<(), SchedulerError> {
        let mut events = self.events.write().expect("scheduler lock poisoned");
        events
            .remove(event_id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::NotFound(event_id.to_string()))
    }

    pub fn get(&self, event_id: &str) -> Option<ScheduledEvent> {
        let events = self.events.read().expect("scheduler lock poisoned");
        events.get(event_id).map(|s| s.event.clone())
    }

    pub fn list(&self) -> Vec<ScheduledEvent> {
        let events = self.events.read().expect("scheduler lock poisoned");
        let mut list: Vec<ScheduledEvent> = events.values().map(|s| s.event.clone()).collect();
        list.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        list
    }

    pub fn history(&self, event_id: &str) -> Vec<ExecutionRecord> {
        let events = self.events.read().expect("scheduler lock poisoned");
        events
            .get(event_id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Event ids due to fire right now, skipping events already running
    /// unless they allow overlap.
    pub fn due_event_ids(&self) -> Vec<String> {
        let now = Utc::now();
        let events = self.events.read().expect("scheduler lock poisoned");
        let running = self.running.read().expect("scheduler lock poisoned");
        events
            .values()
            .filter(|s| {
                if running.contains(&s.event.event_id) && !s.event.allow_overlap {
                    return false;
                }
                evaluate_due(&s.event, now).is_some()
            })
            .map(|s| s.event.event_id.clone())
            .collect()
    }

    /// Marks `event_id` running, advancing its `last_run`/`next_run`.
    /// Fails with `Overlapping` if it is already running and does not
    /// allow overlap.
    pub fn begin_run(&self, event_id: &str) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let mut running = self.running.write().expect("scheduler lock poisoned");
        let mut events = self.events.write().expect("scheduler lock poisoned");
        let slot = events
            .get_mut(event_id)
            .ok_or_else(|| SchedulerError::NotFound(event_id.to_string()))?;

        if running.contains(event_id) && !slot.event.allow_overlap {
            return Err(SchedulerError::Overlapping(event_id.to_string()));
        }

        if let Some((last, next)) = evaluate_due(&slot.event, now) {
            slot.event.last_run = Some(last);
            slot.event.next_run = next;
            if matches!(slot.event.schedule_kind, crate::event::ScheduleKind::Once { .. }) {
                slot.event.enabled = false;
            }
        }
        running.insert(event_id.to_string());
        Ok(())
    }

    pub fn finish_run(&self, record: ExecutionRecord) {
        let mut running = self.running.write().expect("scheduler lock poisoned");
        running.remove(&record.event_id);
        drop(running);

        let mut events = self.events.write().expect("scheduler lock poisoned");
        if let Some(slot) = events.get_mut(&record.event_id) {
            if slot.history.len() == HISTORY_CAPACITY {
                slot.history.pop_front();
            }
            slot.history.push_back(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ExecutionStatus, ScheduleKind};

    fn event(id: &str) -> ScheduledEvent {
        ScheduledEvent::new(id, ScheduleKind::Interval { seconds: 1 }, "t", serde_json::json!({}))
    }

    #[test]
    fn create_then_get_round_trips() {
        let state = SchedulerState::new();
        state.create(event("e1")).unwrap();
        assert!(state.get("e1").is_some());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let state = SchedulerState::new();
        state.create(event("e1")).unwrap();
        assert!(matches!(state.create(event("e1")), Err(SchedulerError::AlreadyExists(_))));
    }

    #[test]
    fn overlap_is_rejected_unless_allowed() {
        let state = SchedulerState::new();
        state.create(event("e1")).unwrap();
        state.begin_run("e1").unwrap();
        assert!(matches!(state.begin_run("e1"), Err(SchedulerError::Overlapping(_))));
    }

    #[test]
    fn overlap_allowed_when_flagged() {
        let state = SchedulerState::new();
        let mut e = event("e1");
        e.allow_overlap = true;
        state.create(e).unwrap();
        state.begin_run("e1").unwrap();
        assert!(state.begin_run("e1").is_ok());
    }

    #[test]
    fn history_is_capped_at_capacity() {
        let state = SchedulerState::new();
        state.create(event("e1")).unwrap();
        for _ in 0..(HISTORY_CAPACITY + 10) {
            state.finish_run(ExecutionRecord {
                event_id: "e1".to_string(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
                status: ExecutionStatus::Completed,
                detail: String::new(),
            });
        }
        assert_eq!(state.history("e1").len(), HISTORY_CAPACITY);
    }
}
