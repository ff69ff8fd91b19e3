//! Configuration layer (C9, §6). Typed, serde-backed config loaded from a
//! TOML file with environment-variable overrides, following the `config`
//! crate's standard double-underscore nesting convention.

use crate::error::{Result, SabiError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which `FingerprintStore`/`MetadataStore` backing to use (§9: selected by
/// a config-typed tag, never by runtime type-introspection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
    Mysql,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub backend: StoreBackend,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            host: "localhost".to_string(),
            port: 5432,
            database: "sabi".to_string(),
            user: "sabi".to_string(),
            password: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// Builds the `diesel`-style connection URL for the relational backends.
    pub fn connection_url(&self) -> String {
        let scheme = match self.backend {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Mysql => "mysql",
            StoreBackend::Memory => "memory",
        };
        format!(
            "{scheme}://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub sample_rate: u32,
    pub chunk_seconds: f64,
    pub window_duration: f64,
    pub hop_duration: f64,
    pub overlap: f64,
    pub confidence_threshold: f64,
    pub energy_threshold_db: f64,
    pub debounce_duration: f64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_seconds: 0.5,
            window_duration: 2.0,
            hop_duration: 0.5,
            overlap: 0.5,
            confidence_threshold: 0.5,
            energy_threshold_db: -40.0,
            debounce_duration: 5.0,
        }
    }
}

/// Consumed only by the event-sink collaborator (§6); the core never opens
/// a socket with these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub topic_prefix: String,
    pub qos: u8,
    pub retain: bool,
    pub debounce_seconds: f64,
    pub client_id_prefix: String,
    pub keepalive: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            topic_prefix: "sabi".to_string(),
            qos: 0,
            retain: false,
            debounce_seconds: 5.0,
            client_id_prefix: "sabi".to_string(),
            keepalive: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub recognition: RecognitionConfig,
    pub mqtt: MqttConfig,
}

impl Config {
    /// Loads config with precedence: baked-in defaults, then an optional
    /// TOML file, then `SABI_DATABASE__*`/`SABI_RECOGNITION__*` environment
    /// variables (double-underscore nesting, the `config` crate's idiom).
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default()).map_err(|e| {
                SabiError::Config(format!("failed to seed defaults: {e}"))
            })?);

        if let Some(path) = toml_path {
            builder = builder.add_source(config::File::from(path).required(false));
        } else if let Ok(env_path) = std::env::var("SABI_CONFIG") {
            builder = builder.add_source(config::File::with_name(&env_path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SABI")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder
            .build()
            .map_err(|e| SabiError::Config(e.to_string()))?;
        built
            .try_deserialize()
            .map_err(|e| SabiError::Config(e.to_string()))
    }
}
