pub mod http;

use async_trait::async_trait;
use autoscaler_types::QueueSnapshot;

use crate::error::Result;

/// Interface to the external broker's management API. A probe failure for one
/// queue must never block probes of sibling queues — callers fan these out
/// concurrently and treat a failed queue as "unknown" for the tick.
#[async_trait]
pub trait BrokerProbe: Send + Sync {
    async fn probe(&self, queue_name: &str) -> Result<QueueSnapshot>;
}
