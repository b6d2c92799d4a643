//! Data model shared between the controller's decision engine, action executor,
//! and state store. Kept dependency-light (`serde` + `chrono` only) so it can be
//! used from tests and fakes without pulling in any transport crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable, configuration-derived description of one monitored container app.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppMapping {
    pub resource_group: String,
    /// Globally unique key; also the state store row key.
    pub container_app: String,
    #[serde(default = "default_desired_replicas")]
    pub desired_replicas: u32,
    pub queues: Vec<String>,
    #[serde(default)]
    pub schedules: Vec<ScheduleWindow>,
    #[serde(default)]
    pub notify_emails: Vec<String>,
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    #[serde(default = "default_restart_cooldown_minutes")]
    pub restart_cooldown_minutes: i64,
    #[serde(default = "default_consumer_timeout_minutes")]
    pub consumer_timeout_minutes: i64,
    #[serde(default = "default_startup_grace_period_minutes")]
    pub startup_grace_period_minutes: i64,
}

fn default_desired_replicas() -> u32 {
    1
}
fn default_max_restart_attempts() -> u32 {
    3
}
fn default_restart_cooldown_minutes() -> i64 {
    5
}
fn default_consumer_timeout_minutes() -> i64 {
    10
}
fn default_startup_grace_period_minutes() -> i64 {
    3
}

/// A recurring active interval during which `desired_replicas` is overridden.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleWindow {
    /// 5- or 6-field cron expression, evaluated in UTC.
    pub cron: String,
    pub desired_replicas: u32,
    pub duration_minutes: i64,
    #[serde(default)]
    pub window_label: Option<String>,
}

/// One broker queue's transient reading for the current tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub queue_name: String,
    pub pending_messages: u64,
    pub active_consumers: u64,
}

/// Per-app, per-queue durable observation history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct QueueConsumerState {
    pub last_consumer_seen: Option<DateTime<Utc>>,
    pub last_message_seen: Option<DateTime<Utc>>,
    pub has_active_consumers: bool,
    pub message_count: u64,
    /// Start of the current non-empty run; cleared when the queue empties.
    pub first_message_seen_at: Option<DateTime<Utc>>,
    pub last_processing_alert: Option<DateTime<Utc>>,
    pub processing_alert_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RestartAttempt {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub attempt_number: u32,
    pub success: bool,
}

/// Most recent outcome of the action executor, serialized into `RuntimeState`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionResult {
    Success,
    Failed(String),
}

impl ActionResult {
    pub fn as_display(&self) -> String {
        match self {
            ActionResult::Success => "Success".to_string(),
            ActionResult::Failed(kind) => format!("Failed: {kind}"),
        }
    }
}

/// Durable, per-app runtime record. `(partition_key="state", row_key=container_app)`
/// uniquely addresses a row; see the state store for that keying.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct RuntimeState {
    pub last_start: Option<DateTime<Utc>>,
    pub last_stop: Option<DateTime<Utc>>,
    pub last_restart: Option<DateTime<Utc>>,
    pub last_non_zero_depth_at: Option<DateTime<Utc>>,
    pub last_schedule_start: Option<DateTime<Utc>>,
    pub schedule_active_until: Option<DateTime<Utc>>,
    /// Suppresses rules 5-7 until this instant, following a successful Restart.
    pub restart_verification_until: Option<DateTime<Utc>>,

    pub last_action: Option<Action>,
    pub last_action_result: Option<ActionResult>,

    pub cooldown_until: Option<DateTime<Utc>>,

    pub restart_attempt_count: u32,
    pub last_restart_time: Option<DateTime<Utc>>,
    pub restart_history: Vec<RestartAttempt>,

    /// First instant, within the current unbroken run, that every mapped queue
    /// had `active_consumers > 0`. Used to reset `restart_attempt_count` after
    /// `startup_grace_period_minutes` of continuous health.
    pub healthy_since: Option<DateTime<Utc>>,

    pub queue_consumer_status: BTreeMap<String, QueueConsumerState>,
}

pub const MAX_RESTART_HISTORY: usize = 20;

impl RuntimeState {
    /// Appends an attempt, keeping at most [`MAX_RESTART_HISTORY`] most-recent rows.
    pub fn push_restart_attempt(&mut self, attempt: RestartAttempt) {
        self.restart_history.push(attempt);
        if self.restart_history.len() > MAX_RESTART_HISTORY {
            let overflow = self.restart_history.len() - MAX_RESTART_HISTORY;
            self.restart_history.drain(0..overflow);
        }
    }

    /// Drops `queue_consumer_status` keys no longer present in `queues`, per the
    /// invariant that stale per-queue entries don't survive a mapping change.
    pub fn prune_stale_queues(&mut self, queues: &[String]) {
        let keep: std::collections::BTreeSet<&str> = queues.iter().map(String::as_str).collect();
        self.queue_consumer_status
            .retain(|queue, _| keep.contains(queue.as_str()));
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    None,
    Start,
    Stop,
    Restart,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::None => "None",
            Action::Start => "Start",
            Action::Stop => "Stop",
            Action::Restart => "Restart",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReasonCode {
    ScheduleStart,
    Cooldown,
    MaxAttemptsReached,
    MultiQueueConflict,
    StuckQueue,
    DemandArrived,
    IdleTimeout,
    RestartVerificationPending,
    NoOp,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::ScheduleStart => "ScheduleStart",
            ReasonCode::Cooldown => "Cooldown",
            ReasonCode::MaxAttemptsReached => "MaxAttemptsReached",
            ReasonCode::MultiQueueConflict => "MultiQueueConflict",
            ReasonCode::StuckQueue => "StuckQueue",
            ReasonCode::DemandArrived => "DemandArrived",
            ReasonCode::IdleTimeout => "IdleTimeout",
            ReasonCode::RestartVerificationPending => "RestartVerificationPending",
            ReasonCode::NoOp => "NoOp",
        }
    }
}

/// Output of the decision engine for one app, for one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub desired_replicas: u32,
    pub reason: ReasonCode,
    pub conflict: bool,
}

impl Decision {
    pub fn none(reason: ReasonCode) -> Self {
        Decision {
            action: Action::None,
            desired_replicas: 0,
            reason,
            conflict: false,
        }
    }

    pub fn conflict() -> Self {
        Decision {
            action: Action::None,
            desired_replicas: 0,
            reason: ReasonCode::MultiQueueConflict,
            conflict: true,
        }
    }
}

/// A "this consumer has been chewing on the same queue for too long" signal,
/// independent of the action decision; forwarded verbatim to the notifier.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessingAlert {
    pub container_app: String,
    pub queue_name: String,
    pub idle_duration_minutes: i64,
    pub alert_number: u32,
}

/// Current replica count as reported by the container-app driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppStatus {
    pub min_replicas: u32,
}

impl AppStatus {
    pub fn is_inactive(&self) -> bool {
        self.min_replicas == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_history_caps_at_max() {
        let mut state = RuntimeState::default();
        for i in 0..25 {
            state.push_restart_attempt(RestartAttempt {
                timestamp: Utc::now(),
                reason: "StuckQueue".into(),
                attempt_number: i,
                success: true,
            });
        }
        assert_eq!(state.restart_history.len(), MAX_RESTART_HISTORY);
        assert_eq!(state.restart_history.first().unwrap().attempt_number, 5);
        assert_eq!(state.restart_history.last().unwrap().attempt_number, 24);
    }

    #[test]
    fn prune_stale_queues_drops_removed_keys() {
        let mut state = RuntimeState::default();
        state
            .queue_consumer_status
            .insert("q1".into(), QueueConsumerState::default());
        state
            .queue_consumer_status
            .insert("stale".into(), QueueConsumerState::default());
        state.prune_stale_queues(&["q1".to_string()]);
        assert!(state.queue_consumer_status.contains_key("q1"));
        assert!(!state.queue_consumer_status.contains_key("stale"));
    }
}
