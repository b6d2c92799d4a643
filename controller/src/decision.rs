//! Pure decision engine: `(mapping, queue snapshots, runtime state, now) -> Decision`.
//!
//! No I/O, no clock reads, no hidden state — mirrors the teacher's `planner.rs`
//! functions (`should_failover`, `build_promotion_decision`), one pure function
//! per rule, composed into a single ordered table.

use autoscaler_types::{Action, AppStatus, Decision, QueueSnapshot, ReasonCode, RuntimeState};
use autoscaler_types::{AppMapping, ProcessingAlert};
use chrono::{DateTime, Duration, Utc};

use crate::config::MessageProcessingAlertsConfig;
use crate::schedule::ActiveWindow;

pub struct EngineInputs<'a> {
    pub mapping: &'a AppMapping,
    pub queues: &'a [QueueSnapshot],
    pub state: &'a RuntimeState,
    pub status: AppStatus,
    pub now: DateTime<Utc>,
    pub idle_timeout_minutes: i64,
    pub active_window: Option<ActiveWindow>,
}

fn any_pending(queues: &[QueueSnapshot]) -> bool {
    queues.iter().any(|q| q.pending_messages > 0)
}

fn all_consumers_present(queues: &[QueueSnapshot]) -> bool {
    !queues.is_empty() && queues.iter().all(|q| q.active_consumers > 0)
}

fn any_consumer_present(queues: &[QueueSnapshot]) -> bool {
    queues.iter().any(|q| q.active_consumers > 0)
}

fn all_idle(inputs: &EngineInputs) -> bool {
    inputs.queues.iter().all(|q| {
        if q.pending_messages != 0 || q.active_consumers != 0 {
            return false;
        }
        let history = inputs.state.queue_consumer_status.get(&q.queue_name);
        let timed_out = |seen: Option<DateTime<Utc>>| match seen {
            None => true,
            Some(t) => inputs.now - t >= Duration::minutes(inputs.idle_timeout_minutes),
        };
        match history {
            None => true,
            Some(h) => timed_out(h.last_message_seen) && timed_out(h.last_consumer_seen),
        }
    })
}

/// Finds a queue with pending work, no current consumers, and an unbroken
/// non-empty run older than `consumerTimeoutMinutes`.
fn stuck_queue<'a>(inputs: &EngineInputs<'a>) -> Option<&'a QueueSnapshot> {
    inputs.queues.iter().find(|q| {
        if q.pending_messages == 0 || q.active_consumers != 0 {
            return false;
        }
        inputs
            .state
            .queue_consumer_status
            .get(&q.queue_name)
            .and_then(|h| h.first_message_seen_at)
            .is_some_and(|first| {
                inputs.now - first > Duration::minutes(inputs.mapping.consumer_timeout_minutes)
            })
    })
}

fn retry_budget_exhausted(mapping: &AppMapping, state: &RuntimeState, now: DateTime<Utc>) -> bool {
    if state.restart_attempt_count < mapping.max_restart_attempts {
        return false;
    }
    let window = Duration::minutes(
        mapping.restart_cooldown_minutes * mapping.max_restart_attempts as i64,
    );
    state
        .last_restart_time
        .is_some_and(|last| now - last < window)
}

pub fn decide(inputs: EngineInputs) -> Decision {
    let inactive_replicas = inputs.status.is_inactive();

    if let Some(window) = &inputs.active_window {
        if inactive_replicas {
            return Decision {
                action: Action::Start,
                desired_replicas: window.desired_replicas,
                reason: ReasonCode::ScheduleStart,
                conflict: false,
            };
        }
    }

    if inputs
        .state
        .cooldown_until
        .is_some_and(|until| inputs.now < until)
    {
        return Decision::none(ReasonCode::Cooldown);
    }

    if retry_budget_exhausted(inputs.mapping, inputs.state, inputs.now) {
        return Decision::none(ReasonCode::MaxAttemptsReached);
    }

    if inputs
        .state
        .restart_verification_until
        .is_some_and(|until| inputs.now < until)
    {
        return Decision::none(ReasonCode::RestartVerificationPending);
    }

    if stuck_queue(&inputs).is_some() {
        if any_consumer_present(inputs.queues) && !all_consumers_present(inputs.queues) {
            return Decision::conflict();
        }
        return Decision {
            action: Action::Restart,
            desired_replicas: inputs.mapping.desired_replicas,
            reason: ReasonCode::StuckQueue,
            conflict: false,
        };
    }

    if any_pending(inputs.queues) && inactive_replicas {
        return Decision {
            action: Action::Start,
            desired_replicas: inputs.mapping.desired_replicas,
            reason: ReasonCode::DemandArrived,
            conflict: false,
        };
    }

    if inputs.active_window.is_none() && all_idle(&inputs) && !inactive_replicas {
        return Decision {
            action: Action::Stop,
            desired_replicas: 0,
            reason: ReasonCode::IdleTimeout,
            conflict: false,
        };
    }

    Decision::none(ReasonCode::NoOp)
}

/// Alert cadence, independent of the action decision. The worker applies the
/// returned `processing_alert_count`/`last_processing_alert` updates to state.
pub fn processing_alerts(
    mapping: &AppMapping,
    state: &RuntimeState,
    now: DateTime<Utc>,
    config: &MessageProcessingAlertsConfig,
) -> Vec<ProcessingAlert> {
    let mut alerts = Vec::new();
    for queue_name in &mapping.queues {
        let Some(history) = state.queue_consumer_status.get(queue_name) else {
            continue;
        };
        let Some(first_seen) = history.first_message_seen_at else {
            continue;
        };
        if history.processing_alert_count >= config.max_alerts {
            continue;
        }
        let idle_minutes = (now - first_seen).num_minutes().max(0);
        if idle_minutes < config.first_alert_minutes {
            continue;
        }
        let due = match history.last_processing_alert {
            None => true,
            Some(last) => (now - last).num_minutes() >= config.followup_interval_minutes,
        };
        if !due {
            continue;
        }
        alerts.push(ProcessingAlert {
            container_app: mapping.container_app.clone(),
            queue_name: queue_name.clone(),
            idle_duration_minutes: idle_minutes,
            alert_number: history.processing_alert_count + 1,
        });
    }
    alerts
}
