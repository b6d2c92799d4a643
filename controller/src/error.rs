#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("broker probe failed: {source}")]
    BrokerProbeFailed {
        #[from]
        source: reqwest::Error,
    },

    #[error("cloud driver call failed: {0}")]
    CloudDriverFailed(String),

    #[error("state store operation failed: {0}")]
    StateStoreFailed(String),

    #[error("leadership lost")]
    LeadershipLost,

    #[error("notification send failed: {0}")]
    NotificationFailed(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to parse json: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("failed to parse yaml: {source}")]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("invalid cron expression: {0}")]
    Cron(String),

    #[error("redis error: {source}")]
    Redis {
        #[from]
        source: redis::RedisError,
    },

    #[error("redis pool error: {0}")]
    RedisPool(String),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
