//! Minimal `/healthz` + `/readyz` server, spawned only when a port is configured.
//!
//! Mirrors the shape of a small sidecar HTTP server: always-ok liveness, and a
//! readiness flag the rest of the process can flip once it has leadership or
//! has completed its first tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct ReadinessFlag(Arc<AtomicBool>);

impl ReadinessFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Spawns the health server on `port` if `Some`; a no-op otherwise.
pub fn maybe_spawn(port: Option<u16>, readiness: ReadinessFlag) {
    let Some(port) = port else {
        return;
    };
    tokio::spawn(async move {
        if let Err(err) = run(port, readiness).await {
            warn!(%err, "health server exited");
        }
    });
}

async fn run(port: u16, readiness: ReadinessFlag) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/readyz",
            get(move || {
                let readiness = readiness.clone();
                async move {
                    if readiness.is_ready() {
                        (axum::http::StatusCode::OK, "ok")
                    } else {
                        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "not ready")
                    }
                }
            }),
        );
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "health server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
