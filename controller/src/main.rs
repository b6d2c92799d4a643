use std::sync::Arc;

use autoscaler_common::{health, logging, shutdown, tls};
use autoscaler_controller::broker::http::HttpBrokerProbe;
use autoscaler_controller::cli::Cli;
use autoscaler_controller::config::Config;
use autoscaler_controller::driver::http::HttpContainerAppDriver;
use autoscaler_controller::leader::redis::RedisLeaderElection;
use autoscaler_controller::notify::email::EmailNotificationSink;
use autoscaler_controller::state_store::redis::RedisStateStore;
use autoscaler_controller::worker::{self, WorkerDeps};
use clap::Parser;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_format: logging::LogFormat = cli.logging.log_format.parse().unwrap_or_else(|err| {
        eprintln!("invalid --log-format, defaulting to pretty: {err}");
        logging::LogFormat::Pretty
    });
    logging::init(log_format);
    tls::install_rustls_provider();

    let config = match Config::load_from_path(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration invalid, refusing to start");
            std::process::exit(1);
        }
    };

    info!(
        mappings = config.mappings.len(),
        dry_run = cli.dry_run,
        "starting controller"
    );

    let readiness = health::ReadinessFlag::new();
    health::maybe_spawn(cli.health.port(), readiness.clone());

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown::shutdown_signal().await;
        shutdown_cancel.cancel();
    });

    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("aca-controller-{}", uuid::Uuid::new_v4()));

    let leader = match RedisLeaderElection::new(&config.state_store, &config.leader_election, holder_id) {
        Ok(leader) => Arc::new(leader),
        Err(err) => {
            error!(%err, "failed to initialize leader election");
            std::process::exit(1);
        }
    };

    let state_store = match RedisStateStore::new(&config.state_store) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(%err, "failed to initialize state store");
            std::process::exit(1);
        }
    };

    let broker = Arc::new(HttpBrokerProbe::new(&config.broker));
    let driver = Arc::new(HttpContainerAppDriver::new(&config.cloud));
    let notifier: Arc<dyn autoscaler_controller::notify::NotificationSink> =
        match EmailNotificationSink::new(&config.smtp) {
            Ok(sink) => Arc::new(sink),
            Err(err) => {
                error!(%err, "failed to initialize notification sink");
                std::process::exit(1);
            }
        };

    let renew_every = Duration::from_secs(config.leader_election.renew_interval_seconds);
    let renewal_task = worker::spawn_leader_renewal(leader.clone(), renew_every, cancel.clone());

    let worker_deps = WorkerDeps {
        config,
        broker,
        driver,
        state_store,
        leader,
        notifier,
        dry_run: cli.dry_run,
    };

    worker::run(worker_deps, readiness, cancel).await;
    renewal_task.abort();
    info!("controller shut down");
}
