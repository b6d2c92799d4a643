//! Monitoring Worker: the top-level tick loop. One leader-renewal task keeps
//! the lease fresh; this module only reads the resulting [`LeaderElection::is_leader`]
//! snapshot, mirroring the teacher's `reconcile::run()` split between the
//! lease-renewal `tokio::select!` loop and the spawned controller task.

use std::collections::HashMap;
use std::sync::Arc;

use autoscaler_common::health::ReadinessFlag;
use autoscaler_types::{QueueConsumerState, QueueSnapshot};
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{Duration as TokioDuration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::BrokerProbe;
use crate::config::Config;
use crate::decision::{self, EngineInputs};
use crate::driver::ContainerAppDriver;
use crate::executor::{self, ExecutorDeps};
use crate::leader::LeaderElection;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::schedule;
use crate::state_store::StateStore;

pub struct WorkerDeps {
    pub config: Config,
    pub broker: Arc<dyn BrokerProbe>,
    pub driver: Arc<dyn ContainerAppDriver>,
    pub state_store: Arc<dyn StateStore>,
    pub leader: Arc<dyn LeaderElection>,
    pub notifier: Arc<dyn NotificationSink>,
    pub dry_run: bool,
}

/// Dedicated renewer task: the sole writer of the lease, per the design note
/// that all other components only ever read a snapshot `is_leader` flag.
pub fn spawn_leader_renewal(
    leader: Arc<dyn LeaderElection>,
    renew_every: TokioDuration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(renew_every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    leader.release().await;
                    break;
                }
                _ = tick.tick() => {}
            }
            if let Err(err) = leader.try_acquire_or_renew().await {
                warn!(%err, "leader election acquire/renew failed");
            }
        }
    })
}

/// Runs the monitoring loop until `cancel` fires. In-flight per-app executors
/// are awaited up to `2 * pollIntervalSeconds` before the function returns.
pub async fn run(deps: WorkerDeps, readiness: ReadinessFlag, cancel: CancellationToken) {
    let poll_interval = TokioDuration::from_secs(deps.config.poll_interval_seconds);
    let mut tick = interval(poll_interval);
    let app_locks: Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>> =
        Arc::new(AsyncMutex::new(HashMap::new()));
    let deps = Arc::new(deps);
    let mut in_flight: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutdown requested, awaiting in-flight ticks");
                let grace = poll_interval * 2;
                if tokio::time::timeout(grace, join_all(in_flight)).await.is_err() {
                    warn!("in-flight app ticks did not finish within the shutdown grace period");
                }
                break;
            }
            _ = tick.tick() => {}
        }

        if !deps.leader.is_leader() {
            readiness.set_ready(false);
            continue;
        }
        readiness.set_ready(true);

        in_flight.retain(|handle| !handle.is_finished());
        for mapping in deps.config.mappings.iter().cloned() {
            let deps = deps.clone();
            let app_locks = app_locks.clone();
            let cancel = cancel.clone();
            in_flight.push(tokio::spawn(async move {
                let lock = {
                    let mut locks = app_locks.lock().await;
                    locks
                        .entry(mapping.container_app.clone())
                        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                        .clone()
                };
                let Ok(_guard) = lock.try_lock() else {
                    // Previous tick for this app is still running; skip this one.
                    return;
                };
                run_one_app(&deps, &mapping, &cancel).await;
            }));
        }
    }
}

/// Runs every configured app's tick once, sequentially, with no locking or
/// spawning. Used by integration tests to exercise a full tick deterministically.
pub async fn run_one_tick(deps: &WorkerDeps, cancel: &CancellationToken) {
    for mapping in &deps.config.mappings {
        run_one_app(deps, mapping, cancel).await;
    }
}

async fn run_one_app(
    deps: &WorkerDeps,
    mapping: &autoscaler_types::AppMapping,
    cancel: &CancellationToken,
) {
    let now = Utc::now();
    let container_app = mapping.container_app.as_str();

    let probes = mapping.queues.iter().map(|queue_name| {
        let broker = deps.broker.clone();
        let queue_name = queue_name.clone();
        async move { (queue_name.clone(), broker.probe(&queue_name).await) }
    });
    let probe_results = join_all(probes).await;

    let mut state = match deps.state_store.load(container_app).await {
        Ok(state) => state,
        Err(err) => {
            warn!(%container_app, %err, "state load failed, using fresh state");
            autoscaler_types::RuntimeState::default()
        }
    };
    state.prune_stale_queues(&mapping.queues);

    let mut queues = Vec::with_capacity(mapping.queues.len());
    for (queue_name, result) in probe_results {
        match result {
            Ok(snapshot) => {
                update_consumer_state(&mut state, &snapshot, now);
                queues.push(snapshot);
            }
            Err(err) => {
                warn!(%container_app, queue = %queue_name, %err, "broker probe failed, treating queue as unknown");
                // Unknown queue: carry the last known reading so idle/stuck
                // predicates degrade safely instead of assuming emptiness.
                let last = state
                    .queue_consumer_status
                    .get(&queue_name)
                    .map(|h| QueueSnapshot {
                        queue_name: queue_name.clone(),
                        pending_messages: h.message_count,
                        active_consumers: if h.has_active_consumers { 1 } else { 0 },
                    })
                    .unwrap_or(QueueSnapshot {
                        queue_name: queue_name.clone(),
                        pending_messages: 0,
                        active_consumers: 0,
                    });
                queues.push(last);
            }
        }
    }

    maybe_reset_restart_attempts(mapping, &mut state, now);

    let active_window = match schedule::active_window(mapping, now) {
        Ok(window) => window,
        Err(err) => {
            warn!(%container_app, %err, "schedule evaluation failed, treating as inactive");
            None
        }
    };

    let status = match deps.driver.get_status(&mapping.resource_group, container_app).await {
        Ok(status) => status,
        Err(err) => {
            warn!(%container_app, %err, "status fetch failed, skipping tick");
            let _ = deps.state_store.save(container_app, &state).await;
            return;
        }
    };

    let decision = decision::decide(EngineInputs {
        mapping,
        queues: &queues,
        state: &state,
        status,
        now,
        idle_timeout_minutes: deps.config.idle_timeout_minutes,
        active_window,
    });

    let alerts = decision::processing_alerts(
        mapping,
        &state,
        now,
        &deps.config.message_processing_alerts,
    );
    for alert in &alerts {
        if let Some(history) = state.queue_consumer_status.get_mut(&alert.queue_name) {
            history.processing_alert_count = alert.alert_number;
            history.last_processing_alert = Some(now);
        }
        let recipients = if deps.config.message_processing_alerts.alert_emails.is_empty() {
            mapping.notify_emails.clone()
        } else {
            deps.config.message_processing_alerts.alert_emails.clone()
        };
        if !deps.dry_run {
            deps.notifier
                .send(Notification {
                    kind: NotificationKind::ProcessingAlert,
                    container_app: container_app.to_string(),
                    resource_group: mapping.resource_group.clone(),
                    action: autoscaler_types::Action::None,
                    desired_replicas: mapping.desired_replicas,
                    timestamp: now,
                    restart_attempt_count: state.restart_attempt_count,
                    recent_restart_history: vec![],
                    detail: Some(format!(
                        "queue {} idle for {} minutes (alert #{})",
                        alert.queue_name, alert.idle_duration_minutes, alert.alert_number
                    )),
                    recipients,
                })
                .await;
        }
    }

    let executor_deps = ExecutorDeps {
        driver: deps.driver.clone(),
        notifier: deps.notifier.clone(),
        cooldown_minutes: deps.config.cooldown_minutes,
        restart_verification_timeout_minutes: deps.config.restart_verification_timeout_minutes,
        dry_run: deps.dry_run,
    };

    let state = executor::execute(
        &executor_deps,
        &mapping.resource_group,
        container_app,
        &mapping.notify_emails,
        decision,
        state,
        now,
        cancel,
    )
    .await;

    if let Err(err) = deps.state_store.save(container_app, &state).await {
        warn!(%container_app, %err, "state save failed");
    }
}

fn update_consumer_state(
    state: &mut autoscaler_types::RuntimeState,
    snapshot: &QueueSnapshot,
    now: chrono::DateTime<Utc>,
) {
    let entry = state
        .queue_consumer_status
        .entry(snapshot.queue_name.clone())
        .or_insert_with(QueueConsumerState::default);

    entry.message_count = snapshot.pending_messages;
    entry.has_active_consumers = snapshot.active_consumers > 0;

    if snapshot.active_consumers > 0 {
        entry.last_consumer_seen = Some(now);
    }
    if snapshot.pending_messages > 0 {
        entry.last_message_seen = Some(now);
        if entry.first_message_seen_at.is_none() {
            entry.first_message_seen_at = Some(now);
        }
    } else {
        entry.first_message_seen_at = None;
        entry.processing_alert_count = 0;
        entry.last_processing_alert = None;
    }
}

/// Resets `restart_attempt_count` after every mapped queue has had an active
/// consumer continuously for `startupGracePeriodMinutes` (see the Open
/// Questions resolution recorded in the design notes).
fn maybe_reset_restart_attempts(
    mapping: &autoscaler_types::AppMapping,
    state: &mut autoscaler_types::RuntimeState,
    now: chrono::DateTime<Utc>,
) {
    let all_healthy = !mapping.queues.is_empty()
        && mapping.queues.iter().all(|q| {
            state
                .queue_consumer_status
                .get(q)
                .is_some_and(|h| h.has_active_consumers)
        });

    if !all_healthy {
        state.healthy_since = None;
        return;
    }

    let healthy_since = *state.healthy_since.get_or_insert(now);
    if now - healthy_since >= chrono::Duration::minutes(mapping.startup_grace_period_minutes) {
        state.restart_attempt_count = 0;
    }
}
