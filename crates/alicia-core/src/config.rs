//! Layered configuration loading: CLI flag > env `<SERVICE>_CONFIG` >
//! `./config.yaml`, then per-field environment overrides. Env-driven
//! sections, a `redacted_summary` for safe logging, and an explicit
//! three-tier search order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AliciaError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            tls: false,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub name: String,
    #[serde(default = "ServiceIdentity::default_instance_id")]
    pub instance_id: String,
}

impl ServiceIdentity {
    fn default_instance_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "HeartbeatConfig::default_interval")]
    pub interval_s: u64,
}

impl HeartbeatConfig {
    fn default_interval() -> u64 {
        15
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_s: Self::default_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "HealthConfig::default_bind")]
    pub bind: String,
}

impl HealthConfig {
    fn default_bind() -> String {
        "0.0.0.0:8080".to_string()
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// The full recognized option set from spec §6, one section per dotted
/// prefix (`mqtt.*`, `service.*`, `heartbeat.*`, `health.*`, `logging.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub service: ServiceIdentity,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load via the three-tier search order: `cli_path` (if given) wins;
    /// else env `<SERVICE_ENV_PREFIX>_CONFIG`; else `./config.yaml`. Individual
    /// `ALICIA_*` environment variables override whatever the file set.
    pub fn load(service_env_prefix: &str, cli_path: Option<PathBuf>) -> Result<Self> {
        let env_var = format!("{service_env_prefix}_CONFIG");
        let path = cli_path
            .or_else(|| std::env::var(&env_var).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./config.yaml"));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::minimal_default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| AliciaError::Config(format!("{}: {e}", path.display())))
    }

    /// Used when no config file is present; `service.name` must still be
    /// supplied via `ALICIA_SERVICE_NAME` or the caller gets a config error
    /// at `Config::validate`.
    fn minimal_default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            service: ServiceIdentity {
                name: String::new(),
                instance_id: ServiceIdentity::default_instance_id(),
            },
            heartbeat: HeartbeatConfig::default(),
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ALICIA_MQTT_HOST") {
            self.mqtt.host = v;
        }
        if let Ok(v) = std::env::var("ALICIA_MQTT_PORT") {
            if let Ok(port) = v.parse() {
                self.mqtt.port = port;
            }
        }
        if let Ok(v) = std::env::var("ALICIA_MQTT_TLS") {
            self.mqtt.tls = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("ALICIA_MQTT_USERNAME") {
            self.mqtt.username = Some(v);
        }
        if let Ok(v) = std::env::var("ALICIA_MQTT_PASSWORD") {
            self.mqtt.password = Some(v);
        }
        if let Ok(v) = std::env::var("ALICIA_SERVICE_NAME") {
            self.service.name = v;
        }
        if let Ok(v) = std::env::var("ALICIA_SERVICE_INSTANCE_ID") {
            self.service.instance_id = v;
        }
        if let Ok(v) = std::env::var("ALICIA_HEARTBEAT_INTERVAL_S") {
            if let Ok(secs) = v.parse() {
                self.heartbeat.interval_s = secs;
            }
        }
        if let Ok(v) = std::env::var("ALICIA_HEALTH_BIND") {
            self.health.bind = v;
        }
        if let Ok(v) = std::env::var("ALICIA_LOGGING_LEVEL") {
            self.logging.level = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.name.is_empty() {
            return Err(AliciaError::Config(
                "service.name is required (config file or ALICIA_SERVICE_NAME)".into(),
            ));
        }
        Ok(())
    }

    /// Safe-to-log summary — never includes `mqtt.password` or key material.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "mqtt": {
                "host": self.mqtt.host,
                "port": self.mqtt.port,
                "tls": self.mqtt.tls,
                "username": self.mqtt.username,
                "password": self.mqtt.password.as_ref().map(|_| "***"),
            },
            "service": {
                "name": self.service.name,
                "instance_id": self.service.instance_id,
            },
            "heartbeat": { "interval_s": self.heartbeat.interval_s },
            "health": { "bind": self.health.bind },
            "logging": { "level": self.logging.level },
        })
    }

    pub fn log_summary(&self) {
        tracing::info!(config = %self.redacted_summary(), "loaded configuration");
    }
}
