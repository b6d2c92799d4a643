use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use autoscaler_types::QueueSnapshot;
use serde::Deserialize;

use crate::config::BrokerConfig;
use crate::error::Result;

use super::BrokerProbe;

struct ClientInner {
    client: reqwest::Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

/// `reqwest`-backed client for the broker's management HTTP API.
#[derive(Clone)]
pub struct HttpBrokerProbe {
    inner: Arc<ClientInner>,
}

impl Deref for HttpBrokerProbe {
    type Target = ClientInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Deserialize)]
struct QueueInfo {
    #[serde(rename = "messageCount")]
    message_count: u64,
    #[serde(rename = "consumerCount")]
    consumer_count: u64,
}

impl HttpBrokerProbe {
    pub fn new(config: &BrokerConfig) -> Self {
        let endpoint = config
            .server_url
            .replace("tcp://", "https://")
            .trim_end_matches('/')
            .to_string();
        Self {
            inner: Arc::new(ClientInner {
                client: reqwest::Client::new(),
                endpoint,
                username: config.username.clone(),
                password: config.password.clone(),
            }),
        }
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.clone()),
            None => builder,
        }
    }
}

#[async_trait]
impl BrokerProbe for HttpBrokerProbe {
    async fn probe(&self, queue_name: &str) -> Result<QueueSnapshot> {
        let url = format!("{}/api/queues/{}", self.endpoint, queue_name);
        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?;
        let info: QueueInfo = response.json().await?;
        Ok(QueueSnapshot {
            queue_name: queue_name.to_string(),
            pending_messages: info.message_count,
            active_consumers: info.consumer_count,
        })
    }
}
