//! Action Executor: applies a [`Decision`] through the driver, updates durable
//! state, and fires a best-effort notification. Callers serialize invocations
//! per app via [`crate::worker`]'s per-app mutex map.

use std::sync::Arc;

use autoscaler_types::{Action, ActionResult, Decision, RestartAttempt, ReasonCode, RuntimeState};
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::driver::ContainerAppDriver;
use crate::notify::{Notification, NotificationKind, NotificationSink};

pub struct ExecutorDeps {
    pub driver: Arc<dyn ContainerAppDriver>,
    pub notifier: Arc<dyn NotificationSink>,
    pub cooldown_minutes: i64,
    pub restart_verification_timeout_minutes: i64,
    pub dry_run: bool,
}

/// Applies `decision` to `state`, returning the (possibly unchanged) state to
/// be persisted by the caller. Never returns an error: driver failures are
/// recorded in state and reported via notification, not propagated.
pub async fn execute(
    deps: &ExecutorDeps,
    resource_group: &str,
    container_app: &str,
    notify_emails: &[String],
    decision: Decision,
    mut state: RuntimeState,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> RuntimeState {
    if decision.conflict {
        info!(%container_app, "restart skipped: multi-queue conflict");
        dispatch(
            deps,
            Notification {
                kind: NotificationKind::ConflictSkipped,
                container_app: container_app.to_string(),
                resource_group: resource_group.to_string(),
                action: Action::None,
                desired_replicas: decision.desired_replicas,
                timestamp: now,
                restart_attempt_count: state.restart_attempt_count,
                recent_restart_history: state.restart_history.clone(),
                detail: None,
                recipients: notify_emails.to_vec(),
            },
        )
        .await;
        return state;
    }

    if decision.action == Action::None {
        if decision.reason == ReasonCode::MaxAttemptsReached
            && !matches!(state.last_action_result, Some(ActionResult::Failed(_)))
        {
            dispatch(
                deps,
                Notification {
                    kind: NotificationKind::Failure,
                    container_app: container_app.to_string(),
                    resource_group: resource_group.to_string(),
                    action: Action::Restart,
                    desired_replicas: decision.desired_replicas,
                    timestamp: now,
                    restart_attempt_count: state.restart_attempt_count,
                    recent_restart_history: state.restart_history.clone(),
                    detail: Some("retry budget exhausted".to_string()),
                    recipients: notify_emails.to_vec(),
                },
            )
            .await;
            state.last_action_result = Some(ActionResult::Failed("MaxAttemptsReached".into()));
        }
        return state;
    }

    if state
        .cooldown_until
        .is_some_and(|until| now < until)
    {
        return state;
    }

    if decision.action == Action::Restart {
        state.restart_attempt_count += 1;
        state.last_restart_time = Some(now);
    }

    let outcome = if deps.dry_run {
        info!(%container_app, action = decision.action.as_str(), reason = decision.reason.as_str(), "dry-run: skipping driver call");
        DriverOutcome::Ok
    } else {
        tokio::select! {
            result = run_driver(deps, resource_group, container_app, decision.action, decision.desired_replicas) => {
                match result {
                    Ok(()) => DriverOutcome::Ok,
                    Err(err) => DriverOutcome::Failed(err.to_string()),
                }
            }
            _ = cancel.cancelled() => DriverOutcome::Cancelled,
        }
    };

    match outcome {
        DriverOutcome::Cancelled => {
            warn!(%container_app, action = decision.action.as_str(), "action cancelled mid-flight");
            return mark_cancelled(state);
        }
        DriverOutcome::Ok => {
            match decision.action {
                Action::Start => state.last_start = Some(now),
                Action::Stop => state.last_stop = Some(now),
                Action::Restart => {
                    state.last_restart = Some(now);
                    state.restart_verification_until =
                        Some(now + Duration::minutes(deps.restart_verification_timeout_minutes));
                    state.push_restart_attempt(RestartAttempt {
                        timestamp: now,
                        reason: decision.reason.as_str().to_string(),
                        attempt_number: state.restart_attempt_count,
                        success: true,
                    });
                }
                Action::None => {}
            }
            state.last_action = Some(decision.action);
            state.last_action_result = Some(ActionResult::Success);
            state.cooldown_until = Some(now + Duration::minutes(deps.cooldown_minutes));

            dispatch(
                deps,
                Notification {
                    kind: NotificationKind::Success,
                    container_app: container_app.to_string(),
                    resource_group: resource_group.to_string(),
                    action: decision.action,
                    desired_replicas: decision.desired_replicas,
                    timestamp: now,
                    restart_attempt_count: state.restart_attempt_count,
                    recent_restart_history: state.restart_history.clone(),
                    detail: None,
                    recipients: notify_emails.to_vec(),
                },
            )
            .await;
        }
        DriverOutcome::Failed(err) => {
            error!(%container_app, action = decision.action.as_str(), %err, "driver call failed");
            state.last_action = Some(decision.action);
            state.last_action_result = Some(ActionResult::Failed(err.clone()));
            if decision.action == Action::Restart {
                state.push_restart_attempt(RestartAttempt {
                    timestamp: now,
                    reason: decision.reason.as_str().to_string(),
                    attempt_number: state.restart_attempt_count,
                    success: false,
                });
            }

            dispatch(
                deps,
                Notification {
                    kind: NotificationKind::Failure,
                    container_app: container_app.to_string(),
                    resource_group: resource_group.to_string(),
                    action: decision.action,
                    desired_replicas: decision.desired_replicas,
                    timestamp: now,
                    restart_attempt_count: state.restart_attempt_count,
                    recent_restart_history: state.restart_history.clone(),
                    detail: Some(err),
                    recipients: notify_emails.to_vec(),
                },
            )
            .await;
        }
    }

    state
}

enum DriverOutcome {
    Ok,
    Failed(String),
    Cancelled,
}

async fn run_driver(
    deps: &ExecutorDeps,
    resource_group: &str,
    container_app: &str,
    action: Action,
    desired_replicas: u32,
) -> Result<(), crate::error::Error> {
    match action {
        Action::Start => deps.driver.start(resource_group, container_app, desired_replicas).await,
        Action::Stop => deps.driver.stop(resource_group, container_app).await,
        Action::Restart => deps.driver.restart(resource_group, container_app, desired_replicas).await,
        Action::None => Ok(()),
    }
}

async fn dispatch(deps: &ExecutorDeps, notification: Notification) {
    if deps.dry_run {
        info!(subject = %notification.subject(), "dry-run: skipping notification send");
        return;
    }
    deps.notifier.send(notification).await;
}

/// Marks a cancelled in-flight action per §5: never extends cooldown, never retried.
pub fn mark_cancelled(mut state: RuntimeState) -> RuntimeState {
    state.last_action_result = Some(ActionResult::Failed("Canceled".into()));
    state
}
