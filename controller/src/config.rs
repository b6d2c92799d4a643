use std::path::Path;

use autoscaler_types::AppMapping;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_poll_interval_seconds() -> u64 {
    15
}
fn default_cooldown_minutes() -> i64 {
    5
}
fn default_idle_timeout_minutes() -> i64 {
    10
}
fn default_restart_verification_timeout_minutes() -> i64 {
    5
}
fn default_first_alert_minutes() -> i64 {
    20
}
fn default_followup_interval_minutes() -> i64 {
    5
}
fn default_max_alerts() -> u32 {
    6
}
fn default_lease_ttl_seconds() -> u64 {
    30
}
fn default_renew_interval_seconds() -> u64 {
    10
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: i64,
    #[serde(default = "default_restart_verification_timeout_minutes")]
    pub restart_verification_timeout_minutes: i64,

    pub mappings: Vec<AppMapping>,

    #[serde(default)]
    pub message_processing_alerts: MessageProcessingAlertsConfig,

    pub broker: BrokerConfig,
    pub cloud: CloudConfig,
    pub smtp: SmtpConfig,
    pub state_store: StateStoreConfig,
    #[serde(default)]
    pub leader_election: LeaderElectionConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProcessingAlertsConfig {
    #[serde(default = "default_first_alert_minutes")]
    pub first_alert_minutes: i64,
    #[serde(default = "default_followup_interval_minutes")]
    pub followup_interval_minutes: i64,
    #[serde(default = "default_max_alerts")]
    pub max_alerts: u32,
    #[serde(default)]
    pub alert_emails: Vec<String>,
}

impl Default for MessageProcessingAlertsConfig {
    fn default() -> Self {
        Self {
            first_alert_minutes: default_first_alert_minutes(),
            followup_interval_minutes: default_followup_interval_minutes(),
            max_alerts: default_max_alerts(),
            alert_emails: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    pub server_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    pub subscription_id: String,
    pub resource_group_name: String,
    #[serde(flatten)]
    pub auth: CloudAuth,
}

/// Externally tagged: a config document picks exactly one of these two shapes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "authKind", rename_all = "camelCase")]
pub enum CloudAuth {
    ManagedIdentity {
        #[serde(default)]
        managed_identity_client_id: Option<String>,
    },
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from_address: String,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStoreConfig {
    pub redis_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionConfig {
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_lease_ttl_seconds")]
    pub lease_ttl_seconds: u64,
    #[serde(default = "default_renew_interval_seconds")]
    pub renew_interval_seconds: u64,
}

fn default_key_prefix() -> String {
    "aca-controller:leader".to_string()
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            lease_ttl_seconds: default_lease_ttl_seconds(),
            renew_interval_seconds: default_renew_interval_seconds(),
        }
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&raw)?,
            _ => serde_yaml::from_str(&raw)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mappings.is_empty() {
            return Err(Error::ConfigInvalid(
                "mappings must contain at least one entry".into(),
            ));
        }
        if !(1..=3600).contains(&self.poll_interval_seconds) {
            return Err(Error::ConfigInvalid(
                "pollIntervalSeconds must be in [1, 3600]".into(),
            ));
        }
        if !(0..=1440).contains(&self.cooldown_minutes) {
            return Err(Error::ConfigInvalid(
                "cooldownMinutes must be in [0, 1440]".into(),
            ));
        }
        if !(1..=1440).contains(&self.idle_timeout_minutes) {
            return Err(Error::ConfigInvalid(
                "idleTimeoutMinutes must be in [1, 1440]".into(),
            ));
        }
        if !(1..=60).contains(&self.restart_verification_timeout_minutes) {
            return Err(Error::ConfigInvalid(
                "restartVerificationTimeoutMinutes must be in [1, 60]".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for mapping in &self.mappings {
            if mapping.queues.is_empty() {
                return Err(Error::ConfigInvalid(format!(
                    "mapping {} has no queues",
                    mapping.container_app
                )));
            }
            if !seen.insert(mapping.container_app.clone()) {
                return Err(Error::ConfigInvalid(format!(
                    "duplicate containerApp key: {}",
                    mapping.container_app
                )));
            }
        }

        Ok(())
    }
}
