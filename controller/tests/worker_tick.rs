//! End-to-end tick tests using in-memory fakes for every external collaborator.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use autoscaler_controller::broker::BrokerProbe;
use autoscaler_controller::config::{
    BrokerConfig, CloudAuth, CloudConfig, Config, LeaderElectionConfig,
    MessageProcessingAlertsConfig, SmtpConfig, StateStoreConfig,
};
use autoscaler_controller::driver::ContainerAppDriver;
use autoscaler_controller::error::Result;
use autoscaler_controller::leader::LeaderElection;
use autoscaler_controller::notify::{Notification, NotificationSink};
use autoscaler_controller::state_store::StateStore;
use autoscaler_controller::worker::{self, WorkerDeps};
use autoscaler_types::{Action, AppMapping, AppStatus, QueueSnapshot, RuntimeState};
use tokio_util::sync::CancellationToken;

struct FakeBroker {
    snapshots: HashMap<String, QueueSnapshot>,
}

#[async_trait]
impl BrokerProbe for FakeBroker {
    async fn probe(&self, queue_name: &str) -> Result<QueueSnapshot> {
        Ok(self
            .snapshots
            .get(queue_name)
            .cloned()
            .unwrap_or(QueueSnapshot {
                queue_name: queue_name.to_string(),
                pending_messages: 0,
                active_consumers: 0,
            }))
    }
}

struct FakeDriver {
    status: AppStatus,
    calls: Mutex<Vec<(Action, u32)>>,
}

#[async_trait]
impl ContainerAppDriver for FakeDriver {
    async fn start(&self, _rg: &str, _app: &str, desired: u32) -> Result<()> {
        self.calls.lock().unwrap().push((Action::Start, desired));
        Ok(())
    }
    async fn stop(&self, _rg: &str, _app: &str) -> Result<()> {
        self.calls.lock().unwrap().push((Action::Stop, 0));
        Ok(())
    }
    async fn restart(&self, _rg: &str, _app: &str, desired: u32) -> Result<()> {
        self.calls.lock().unwrap().push((Action::Restart, desired));
        Ok(())
    }
    async fn get_status(&self, _rg: &str, _app: &str) -> Result<AppStatus> {
        Ok(self.status)
    }
}

#[derive(Default)]
struct FakeStateStore {
    rows: Mutex<HashMap<String, RuntimeState>>,
}

#[async_trait]
impl StateStore for FakeStateStore {
    async fn load(&self, container_app: &str) -> Result<RuntimeState> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(container_app)
            .cloned()
            .unwrap_or_default())
    }
    async fn save(&self, container_app: &str, state: &RuntimeState) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(container_app.to_string(), state.clone());
        Ok(())
    }
}

struct AlwaysLeader;

#[async_trait]
impl LeaderElection for AlwaysLeader {
    async fn try_acquire_or_renew(&self) -> Result<bool> {
        Ok(true)
    }
    async fn release(&self) {}
    fn is_leader(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct CapturingNotifier {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for CapturingNotifier {
    async fn send(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

fn test_mapping() -> AppMapping {
    AppMapping {
        resource_group: "rg1".into(),
        container_app: "app1".into(),
        desired_replicas: 2,
        queues: vec!["orders".into()],
        schedules: vec![],
        notify_emails: vec!["ops@example.com".into()],
        max_restart_attempts: 3,
        restart_cooldown_minutes: 5,
        consumer_timeout_minutes: 10,
        startup_grace_period_minutes: 3,
    }
}

fn test_config(mapping: AppMapping) -> Config {
    Config {
        poll_interval_seconds: 15,
        cooldown_minutes: 5,
        idle_timeout_minutes: 10,
        restart_verification_timeout_minutes: 5,
        mappings: vec![mapping],
        message_processing_alerts: MessageProcessingAlertsConfig::default(),
        broker: BrokerConfig {
            server_url: "tcp://localhost:5672".into(),
            username: None,
            password: None,
        },
        cloud: CloudConfig {
            subscription_id: "sub".into(),
            resource_group_name: "rg1".into(),
            auth: CloudAuth::ManagedIdentity {
                managed_identity_client_id: None,
            },
        },
        smtp: SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: None,
            password: None,
            from_address: "noreply@example.com".into(),
        },
        state_store: StateStoreConfig {
            redis_url: "redis://localhost:6379".into(),
        },
        leader_election: LeaderElectionConfig::default(),
    }
}

#[tokio::test]
async fn pending_messages_with_no_consumers_starts_the_app() {
    let mapping = test_mapping();
    let config = test_config(mapping);

    let mut snapshots = HashMap::new();
    snapshots.insert(
        "orders".to_string(),
        QueueSnapshot {
            queue_name: "orders".into(),
            pending_messages: 10,
            active_consumers: 0,
        },
    );

    let driver = Arc::new(FakeDriver {
        status: AppStatus { min_replicas: 0 },
        calls: Mutex::new(vec![]),
    });
    let state_store = Arc::new(FakeStateStore::default());
    let notifier = Arc::new(CapturingNotifier::default());

    let deps = WorkerDeps {
        config,
        broker: Arc::new(FakeBroker { snapshots }),
        driver: driver.clone(),
        state_store: state_store.clone(),
        leader: Arc::new(AlwaysLeader),
        notifier: notifier.clone(),
        dry_run: false,
    };

    let cancel = CancellationToken::new();
    worker::run_one_tick(&deps, &cancel).await;

    let calls = driver.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[(Action::Start, 2)]);
    drop(calls);

    let state = state_store.rows.lock().unwrap().get("app1").cloned().unwrap();
    assert!(state.last_start.is_some());
    assert!(state.cooldown_until.is_some());
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn all_queues_idle_past_timeout_stops_a_running_app() {
    let mapping = test_mapping();
    let config = test_config(mapping);

    let mut snapshots = HashMap::new();
    snapshots.insert(
        "orders".to_string(),
        QueueSnapshot {
            queue_name: "orders".into(),
            pending_messages: 0,
            active_consumers: 0,
        },
    );

    let driver = Arc::new(FakeDriver {
        status: AppStatus { min_replicas: 2 },
        calls: Mutex::new(vec![]),
    });
    let state_store = Arc::new(FakeStateStore::default());

    let mut seeded = RuntimeState::default();
    let stale = chrono::Utc::now() - chrono::Duration::minutes(30);
    seeded.last_non_zero_depth_at = Some(stale);
    let mut history = autoscaler_types::QueueConsumerState::default();
    history.last_message_seen = Some(stale);
    history.last_consumer_seen = Some(stale);
    seeded.queue_consumer_status.insert("orders".to_string(), history);
    state_store
        .rows
        .lock()
        .unwrap()
        .insert("app1".to_string(), seeded);

    let notifier = Arc::new(CapturingNotifier::default());

    let deps = WorkerDeps {
        config,
        broker: Arc::new(FakeBroker { snapshots }),
        driver: driver.clone(),
        state_store: state_store.clone(),
        leader: Arc::new(AlwaysLeader),
        notifier,
        dry_run: false,
    };

    let cancel = CancellationToken::new();
    worker::run_one_tick(&deps, &cancel).await;

    let calls = driver.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[(Action::Stop, 0)]);
}

#[tokio::test]
async fn dry_run_never_calls_the_driver_or_notifier() {
    let mapping = test_mapping();
    let config = test_config(mapping);

    let mut snapshots = HashMap::new();
    snapshots.insert(
        "orders".to_string(),
        QueueSnapshot {
            queue_name: "orders".into(),
            pending_messages: 10,
            active_consumers: 0,
        },
    );

    let driver = Arc::new(FakeDriver {
        status: AppStatus { min_replicas: 0 },
        calls: Mutex::new(vec![]),
    });
    let notifier = Arc::new(CapturingNotifier::default());

    let deps = WorkerDeps {
        config,
        broker: Arc::new(FakeBroker { snapshots }),
        driver: driver.clone(),
        state_store: Arc::new(FakeStateStore::default()),
        leader: Arc::new(AlwaysLeader),
        notifier: notifier.clone(),
        dry_run: true,
    };

    let cancel = CancellationToken::new();
    worker::run_one_tick(&deps, &cancel).await;

    assert!(driver.calls.lock().unwrap().is_empty());
    assert!(notifier.sent.lock().unwrap().is_empty());
}
