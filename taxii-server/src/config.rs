//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TAXII_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use taxii_protocol::ProtocolVersion;
use taxii_storage::{CollectionDefinition, ServiceDefinition};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Message handling configuration.
    pub protocol: ProtocolConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
    /// TAXII services to register at startup.
    pub services: Vec<ServiceDefinition>,
    /// Collections to register at startup.
    pub collections: Vec<CollectionDefinition>,
}

impl Config {
    /// Loads configuration from `path`, or from `TAXII_CONFIG` when no path
    /// is given, then applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("TAXII_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, msg) => ConfigError::ParseError(path.to_path_buf(), msg),
            other => other,
        })
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.protocol.apply_env_overrides();
        self.auth.apply_env_overrides();
        self.storage.apply_env_overrides();
        self.logging.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Checks the parts of the configuration that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.versions.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one protocol version must be enabled".to_string(),
            ));
        }
        for service in &self.services {
            service
                .validate()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }
        for collection in &self.collections {
            for id in &collection.service_ids {
                if !self.services.iter().any(|s| &s.id == id) {
                    return Err(ConfigError::ValidationError(format!(
                        "collection '{}' references unknown service '{}'",
                        collection.name, id
                    )));
                }
            }
        }
        for account in &self.auth.accounts {
            account.validate()?;
        }
        Ok(())
    }
}

fn env_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Host (and optional scheme) prefixed to relative service addresses in
    /// discovery and collection information responses.
    pub domain: Option<String>,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            domain: Some("localhost:9000".to_string()),
            max_body_bytes: 10 * 1024 * 1024,
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("TAXII_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(domain) = std::env::var("TAXII_DOMAIN") {
            self.domain = if domain.is_empty() { None } else { Some(domain) };
        }

        if let Ok(max) = std::env::var("TAXII_MAX_BODY_BYTES") {
            if let Ok(n) = max.parse() {
                self.max_body_bytes = n;
            }
        }
    }
}

/// Message handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Validate request bodies against the version schema before parsing.
    pub xml_validation: bool,
    /// Protocol versions the server accepts.
    pub versions: Vec<ProtocolVersion>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            xml_validation: true,
            versions: ProtocolVersion::ALL.to_vec(),
        }
    }
}

impl ProtocolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(validate) = std::env::var("TAXII_XML_VALIDATION") {
            self.xml_validation = env_flag(&validate);
        }
    }
}

/// Access level granted on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    /// Implies read.
    Modify,
}

/// A configured account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub username: String,
    /// Plaintext password, hashed on load.
    pub password: Option<String>,
    /// SHA-256 hex hash of the password.
    /// Generate hashes with: `taxiid hash-password <password>`
    pub password_hash: Option<String>,
    pub is_admin: bool,
    /// Collection name to access level.
    pub permissions: BTreeMap<String, Permission>,
}

impl AccountConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.username.is_empty() {
            return Err(ConfigError::ValidationError(
                "account username must not be empty".to_string(),
            ));
        }
        match (&self.password, &self.password_hash) {
            (None, None) => Err(ConfigError::ValidationError(format!(
                "account '{}' needs a password or password_hash",
                self.username
            ))),
            (_, Some(hash)) if hash.len() != 64 || hex::decode(hash).is_err() => {
                Err(ConfigError::ValidationError(format!(
                    "account '{}': password_hash must be 64 hex characters",
                    self.username
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of tokens issued by `/management/auth`.
    pub token_ttl_secs: u64,
    pub accounts: Vec<AccountConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 3600,
            accounts: Vec::new(),
        }
    }
}

impl AuthConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(ttl) = std::env::var("TAXII_TOKEN_TTL") {
            if let Ok(secs) = ttl.parse() {
                self.token_ttl_secs = secs;
            }
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot file loaded at startup and written at shutdown.
    pub snapshot_path: Option<PathBuf>,
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TAXII_SNAPSHOT") {
            self.snapshot_path = Some(PathBuf::from(path));
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Log target to level. `root` sets the default level.
    pub levels: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut levels = BTreeMap::new();
        levels.insert("root".to_string(), "info".to_string());
        Self {
            format: LogFormat::Plain,
            levels,
        }
    }
}

impl LoggingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(format) = std::env::var("TAXII_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "json" => self.format = LogFormat::Json,
                "plain" => self.format = LogFormat::Plain,
                _ => {}
            }
        }

        if let Ok(level) = std::env::var("TAXII_LOG_LEVEL") {
            if !level.is_empty() {
                self.levels.insert("root".to_string(), level);
            }
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics at `/management/metrics`.
    pub enabled: bool,
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("TAXII_METRICS_ENABLED") {
            self.enabled = env_flag(&enabled);
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
