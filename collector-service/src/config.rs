use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

use crate::pipeline::{
    scheduler::{DEFAULT_INTERVAL, STORE_ONLY_INTERVAL},
    BrokerLegPolicy, FailurePolicy,
};

/// Environment variable naming the project / namespace.
pub const PROJECT_ID_ENV: &str = "projectID";
/// Environment variable holding the device's host (IP or name).
pub const DEVICE_HOST_ENV: &str = "PW2IP";
/// Environment variable pointing at the TOML config file.
pub const CONFIG_PATH_ENV: &str = "COLLECTOR_CONFIG";

pub const AGGREGATES_PATH: &str = "/api/meters/aggregates";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
}

impl DeviceConfig {
    pub fn endpoint_url(&self) -> String {
        format!("http://{}{}", self.host, AGGREGATES_PATH)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub uri: String,
    pub max_connections: u32,
    pub write_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://collector@localhost:5432/telemetry".to_string(),
            max_connections: 2,
            write_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// CA bundle used to verify the broker's certificate chain.
    pub ca_cert: Option<PathBuf>,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    /// Lab use only: accept any server certificate and host name.
    pub insecure_skip_server_verification: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_cert: Some(PathBuf::from("certs/roots.pem")),
            client_cert: PathBuf::from("certs/client-crt.pem"),
            client_key: PathBuf::from("certs/client-key.pem"),
            insecure_skip_server_verification: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub region: String,
    pub registry: String,
    pub device: String,
    /// Token audience; falls back to the project id when unset.
    pub audience: Option<String>,
    /// Publish topic; defaults to `projects/{audience}/topics/devicetelemetry`.
    pub topic: Option<String>,
    pub connect_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub disconnect_linger_ms: u64,
    pub keep_alive_secs: u64,
    pub leg_policy: BrokerLegPolicy,
    pub tls: TlsConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "mqtt.googleapis.com".to_string(),
            port: 8883,
            region: "asia-east1".to_string(),
            registry: "home".to_string(),
            device: "dev1".to_string(),
            audience: None,
            topic: None,
            connect_timeout_ms: 10_000,
            publish_timeout_ms: 5_000,
            disconnect_linger_ms: 250,
            keep_alive_secs: 30,
            leg_policy: BrokerLegPolicy::default(),
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            private_key: PathBuf::from("rsa_private.pem"),
            public_key: PathBuf::from("rsa_cert.pem"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Unset means 60s for the publishing collector and 5s store-only.
    pub interval_secs: Option<u64>,
    pub failure_policy: FailurePolicy,
}

impl ScheduleConfig {
    pub fn interval(&self, broker_enabled: bool) -> Duration {
        match self.interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None if broker_enabled => DEFAULT_INTERVAL,
            None => STORE_ONLY_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub project: ProjectConfig,
    pub device: DeviceConfig,
    pub store: StoreConfig,
    pub broker: BrokerConfig,
    pub credentials: CredentialsConfig,
    pub schedule: ScheduleConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Read the TOML file named by `COLLECTOR_CONFIG` (default
    /// `collector-config.toml`), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        use std::env;

        let path =
            env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "collector-config.toml".to_string());
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let mut cfg = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        cfg.apply_env_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup(PROJECT_ID_ENV).filter(|v| !v.is_empty()) {
            self.project.id = id;
        }
        if let Some(host) = lookup(DEVICE_HOST_ENV).filter(|v| !v.is_empty()) {
            self.device.host = host;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.id.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "project id is empty; set [project].id or ${PROJECT_ID_ENV}"
            )));
        }
        if self.device.host.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "device host is empty; set [device].host or ${DEVICE_HOST_ENV}"
            )));
        }
        if self.schedule.interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "schedule.interval_secs must be positive".to_string(),
            ));
        }
        if self.broker.enabled
            && !self.broker.tls.insecure_skip_server_verification
            && self.broker.tls.ca_cert.is_none()
        {
            return Err(ConfigError::Invalid(
                "broker.tls.ca_cert is required unless insecure_skip_server_verification is set"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        self.schedule.interval(self.broker.enabled)
    }

    pub fn audience(&self) -> &str {
        self.broker.audience.as_deref().unwrap_or(&self.project.id)
    }

    pub fn topic(&self) -> String {
        match &self.broker.topic {
            Some(t) => t.clone(),
            None => format!("projects/{}/topics/devicetelemetry", self.audience()),
        }
    }

    pub fn client_id(&self) -> String {
        format!(
            "projects/{}/locations/{}/registries/{}/devices/{}",
            self.project.id, self.broker.region, self.broker.registry, self.broker.device
        )
    }
}
