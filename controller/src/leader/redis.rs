use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tracing::{info, warn};

use crate::config::{LeaderElectionConfig, StateStoreConfig};
use crate::error::{Error, Result};

use super::LeaderElection;

/// Releases the lease only if it is still held by `holder_id` — prevents a
/// straggling release from clobbering another replica's freshly acquired lease.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed lease: `SET key holder NX PX ttl` to acquire, `SET key holder
/// XX PX ttl` to renew, the script above to release. Mirrors the teacher's
/// `LeaseLock`/`try_acquire_or_renew` shape over a Kubernetes `Lease` object.
pub struct RedisLeaderElection {
    pool: Pool,
    key: String,
    holder_id: String,
    ttl_ms: usize,
    is_leader: AtomicBool,
}

impl RedisLeaderElection {
    pub fn new(
        store_config: &StateStoreConfig,
        config: &LeaderElectionConfig,
        holder_id: String,
    ) -> Result<Self> {
        let pool = RedisPoolConfig::from_url(&store_config.redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| Error::RedisPool(err.to_string()))?;
        Ok(Self {
            pool,
            key: config.key_prefix.clone(),
            holder_id,
            ttl_ms: (config.lease_ttl_seconds * 1000) as usize,
            is_leader: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl LeaderElection for RedisLeaderElection {
    async fn try_acquire_or_renew(&self) -> Result<bool> {
        let mut conn = self.pool.get().await.map_err(|err| {
            self.is_leader.store(false, Ordering::Release);
            Error::RedisPool(err.to_string())
        })?;

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&self.holder_id)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(Error::from)?;

        if acquired.is_some() {
            if !self.is_leader.swap(true, Ordering::AcqRel) {
                info!(holder_id = %self.holder_id, "acquired leadership");
            }
            return Ok(true);
        }

        let current_holder: Option<String> = conn.get(&self.key).await.map_err(Error::from)?;
        if current_holder.as_deref() == Some(self.holder_id.as_str()) {
            let renewed: Option<String> = redis::cmd("SET")
                .arg(&self.key)
                .arg(&self.holder_id)
                .arg("XX")
                .arg("PX")
                .arg(self.ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(Error::from)?;
            let still_leader = renewed.is_some();
            if !still_leader {
                warn!(holder_id = %self.holder_id, "lease disappeared mid-renew");
            }
            self.is_leader.store(still_leader, Ordering::Release);
            return Ok(still_leader);
        }

        if self.is_leader.swap(false, Ordering::AcqRel) {
            warn!(holder_id = %self.holder_id, "lost leadership");
        }
        Ok(false)
    }

    async fn release(&self) {
        self.is_leader.store(false, Ordering::Release);
        let Ok(mut conn) = self.pool.get().await else {
            return;
        };
        let script = Script::new(RELEASE_SCRIPT);
        let result: Result<i64, _> = script
            .key(&self.key)
            .arg(&self.holder_id)
            .invoke_async(&mut conn)
            .await;
        if let Err(err) = result {
            warn!(%err, "best-effort lease release failed");
        }
    }

    fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }
}
