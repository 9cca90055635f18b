//! Gateway configuration, loaded once at start-up from a TOML file.
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:8080"
//! auth_keys = ["secret"]
//!
//! [dbs]
//! shard1 = "mysql://reader:pw@10.0.0.1:3306/app"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{GatewayOptions, HostRegistry};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Host registry: name → connection descriptor
    #[serde(default)]
    pub dbs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: f64,
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: f64,
    #[serde(default = "default_read_only_guard")]
    pub read_only_guard: bool,
    #[serde(default)]
    pub auth_keys: Vec<String>,
    /// Directory for rolling JSON log files; stdout when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

// Default value functions
fn default_listen() -> String { "127.0.0.1:8080".to_string() }
fn default_timeout_secs() -> f64 { 10.0 }
fn default_max_timeout_secs() -> f64 { 300.0 }
fn default_read_only_guard() -> bool { true }
fn default_channel_capacity() -> usize { 256 }

/// Upper bound for any configured timeout: one day
pub const TIMEOUT_CEILING_SECS: f64 = 86_400.0;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            default_timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            read_only_guard: default_read_only_guard(),
            auth_keys: Vec::new(),
            log_dir: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Reads, parses and validates the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        for (name, secs) in [
            ("default_timeout_secs", self.server.default_timeout_secs),
            ("max_timeout_secs", self.server.max_timeout_secs),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "server.{name} must be a positive number of seconds"
                )));
            }
            if secs > TIMEOUT_CEILING_SECS {
                return Err(ConfigError::Invalid(format!(
                    "server.{name} must not exceed {TIMEOUT_CEILING_SECS} seconds"
                )));
            }
        }
        if self.server.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "server.channel_capacity must be at least 1".to_string(),
            ));
        }

        for (name, descriptor) in &self.dbs {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("dbs contains an empty host name".to_string()));
            }
            if descriptor.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "dbs.{name} has an empty connection descriptor"
                )));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen.parse().map_err(|e| {
            ConfigError::Invalid(format!("server.listen '{}': {e}", self.server.listen))
        })
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            default_timeout: timeout_duration(self.server.default_timeout_secs),
            max_timeout: timeout_duration(self.server.max_timeout_secs),
            read_only_guard: self.server.read_only_guard,
            channel_capacity: self.server.channel_capacity,
        }
    }

    pub fn host_registry(&self) -> HostRegistry {
        HostRegistry::from_map(self.dbs.clone())
    }

    pub fn auth_keys(&self) -> AuthKeys {
        AuthKeys::new(self.server.auth_keys.iter().cloned())
    }
}

/// Seconds to a `Duration` for configs built without [`Config::validate`]:
/// clamped to the ceiling, the default when not representable.
fn timeout_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.min(TIMEOUT_CEILING_SECS))
        .unwrap_or_else(|_| Duration::from_secs_f64(default_timeout_secs()))
}

/// Accepted request keys. An empty set rejects every request.
#[derive(Clone, Default)]
pub struct AuthKeys {
    keys: HashSet<String>,
}

impl AuthKeys {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().filter(|k| !k.is_empty()).collect(),
        }
    }

    pub fn is_authorized(&self, key: &str) -> bool {
        !key.is_empty() && self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

impl fmt::Debug for AuthKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKeys({} keys)", self.keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        listen = "0.0.0.0:9000"
        default_timeout_secs = 5
        auth_keys = ["k1", "k2"]

        [dbs]
        shard1 = "mysql://reader:pw@10.0.0.1:3306/app"
        local = "sqlite:///srv/app.db"
    "#;

    #[test]
    fn parses_with_defaults() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.listen_addr().unwrap().port(), 9000);
        assert_eq!(config.server.max_timeout_secs, 300.0);
        assert!(config.server.read_only_guard);
        assert!(config.server.log_dir.is_none());

        let options = config.gateway_options();
        assert_eq!(options.default_timeout, Duration::from_secs(5));
        assert_eq!(options.channel_capacity, 256);

        let hosts = config.host_registry();
        assert_eq!(hosts.names().collect::<Vec<_>>(), vec!["local", "shard1"]);
    }

    #[test]
    fn empty_file_is_valid() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.dbs.is_empty());
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert!(config.auth_keys().is_empty());
    }

    #[test]
    fn rejects_invalid_values() {
        let blank = "[dbs]\nshard1 = \"  \"\n";
        assert!(matches!(Config::from_toml_str(blank), Err(ConfigError::Invalid(_))));

        let bad_listen = "[server]\nlisten = \"not an address\"\n";
        assert!(matches!(Config::from_toml_str(bad_listen), Err(ConfigError::Invalid(_))));

        let bad_timeout = "[server]\ndefault_timeout_secs = 0\n";
        assert!(matches!(Config::from_toml_str(bad_timeout), Err(ConfigError::Invalid(_))));

        assert!(matches!(Config::from_toml_str("[server"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_timeouts_beyond_ceiling() {
        for toml in [
            "[server]\nmax_timeout_secs = 1e20\n",
            "[server]\nmax_timeout_secs = 1.8e19\n",
            "[server]\ndefault_timeout_secs = 86401\n",
        ] {
            assert!(
                matches!(Config::from_toml_str(toml), Err(ConfigError::Invalid(_))),
                "{toml}"
            );
        }
        assert!(Config::from_toml_str("[server]\nmax_timeout_secs = 86400\n").is_ok());
    }

    #[test]
    fn gateway_options_clamp_unvalidated_timeouts() {
        let mut config = Config::default();
        config.server.max_timeout_secs = 1e20;
        config.server.default_timeout_secs = -1.0;

        let options = config.gateway_options();
        assert_eq!(options.max_timeout, Duration::from_secs(86_400));
        assert_eq!(options.default_timeout, Duration::from_secs(10));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn auth_keys_fail_closed() {
        let keys = AuthKeys::new(vec!["secret".to_string(), String::new()]);
        assert_eq!(keys.len(), 1);
        assert!(keys.is_authorized("secret"));
        assert!(!keys.is_authorized("Secret"));
        assert!(!keys.is_authorized(""));
        assert!(!format!("{keys:?}").contains("secret"));

        let none = AuthKeys::default();
        assert!(!none.is_authorized("anything"));
    }
}
