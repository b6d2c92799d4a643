pub mod redis;

use async_trait::async_trait;

use crate::error::Result;

/// Blob/lease-style single-holder leader election. Only one replica of the
/// controller may hold the lease at a time; every other replica idles as a hot
/// standby, repeatedly attempting [`LeaderElection::try_acquire`].
#[async_trait]
pub trait LeaderElection: Send + Sync {
    /// Returns `true` exactly when the caller now owns the lease (newly
    /// acquired or successfully renewed).
    async fn try_acquire_or_renew(&self) -> Result<bool>;

    /// Best-effort release; failures are logged, never propagated.
    async fn release(&self);

    /// Last known leadership state, as of the most recent `try_acquire_or_renew`.
    fn is_leader(&self) -> bool;
}
