pub mod http;

use async_trait::async_trait;
use autoscaler_types::AppStatus;

use crate::error::Result;

/// Interface to the cloud control plane. Every mutating call is idempotent
/// with respect to the target replica count: calling `start` twice with the
/// same `desired_replicas` is equivalent to calling it once.
#[async_trait]
pub trait ContainerAppDriver: Send + Sync {
    async fn start(&self, resource_group: &str, app: &str, desired_replicas: u32) -> Result<()>;
    async fn stop(&self, resource_group: &str, app: &str) -> Result<()>;
    async fn restart(&self, resource_group: &str, app: &str, desired_replicas: u32) -> Result<()>;
    async fn get_status(&self, resource_group: &str, app: &str) -> Result<AppStatus>;
}
