pub mod redis;

use async_trait::async_trait;
use autoscaler_types::RuntimeState;

use crate::error::Result;

/// Durable per-app runtime record store. `load` returns a fresh default when no
/// row exists — callers never see a "not found" error.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, container_app: &str) -> Result<RuntimeState>;
    async fn save(&self, container_app: &str, state: &RuntimeState) -> Result<()>;
}
