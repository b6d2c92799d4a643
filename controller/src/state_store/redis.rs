use async_trait::async_trait;
use autoscaler_types::RuntimeState;
use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use tracing::warn;

use crate::config::StateStoreConfig;
use crate::error::{Error, Result};

use super::StateStore;

const ROW_PREFIX: &str = "aca-controller:state";

/// `deadpool-redis`-backed store; each app's RuntimeState round-trips as one
/// JSON-encoded string value keyed by `aca-controller:state:<containerApp>`.
#[derive(Clone)]
pub struct RedisStateStore {
    pool: Pool,
}

impl RedisStateStore {
    pub fn new(config: &StateStoreConfig) -> Result<Self> {
        let pool = RedisPoolConfig::from_url(&config.redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| Error::RedisPool(err.to_string()))?;
        Ok(Self { pool })
    }

    fn key(container_app: &str) -> String {
        format!("{ROW_PREFIX}:{container_app}")
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn load(&self, container_app: &str) -> Result<RuntimeState> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, %container_app, "state store unreachable on load, using fresh state");
                return Ok(RuntimeState::default());
            }
        };
        let raw: Option<String> = match conn.get(Self::key(container_app)).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, %container_app, "state store load failed, using fresh state");
                return Ok(RuntimeState::default());
            }
        };
        match raw {
            None => Ok(RuntimeState::default()),
            Some(json) => serde_json::from_str(&json).map_err(Error::from),
        }
    }

    async fn save(&self, container_app: &str, state: &RuntimeState) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| Error::StateStoreFailed(err.to_string()))?;
        let json = serde_json::to_string(state)?;
        let _: () = conn
            .set(Self::key(container_app), json)
            .await
            .map_err(|err| Error::StateStoreFailed(err.to_string()))?;
        Ok(())
    }
}
