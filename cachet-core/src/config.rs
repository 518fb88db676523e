//! Cache configuration.

use crate::error::{CacheError, CacheResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Generic backend configuration.
///
/// A plain value handed to a driver constructor. Fields a backend has no use
/// for are ignored; backend-specific tuning goes through [`Config::extra`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend address (host:port, URL or path, backend-defined).
    pub addr: String,
    /// Authentication password.
    pub password: Option<String>,
    /// Database index (Redis-style backends).
    pub db: u32,
    /// Connection timeout.
    #[serde(with = "duration_secs")]
    pub dial_timeout: Duration,
    /// Read timeout.
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,
    /// Write timeout.
    #[serde(with = "duration_secs")]
    pub write_timeout: Duration,
    /// Connection pool settings.
    pub pool: PoolConfig,
    /// Driver-specific settings.
    pub extra: HashMap<String, serde_json::Value>,
}

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of idle connections.
    pub max_idle_conns: usize,
    /// Maximum number of active connections.
    pub max_active_conns: usize,
    /// Maximum time a connection may sit idle.
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection.
    #[serde(with = "duration_secs")]
    pub max_conn_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_conns: 10,
            max_active_conns: 100,
            idle_timeout: Duration::from_secs(5 * 60),
            max_conn_lifetime: Duration::from_secs(60 * 60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: String::new(),
            password: None,
            db: 0,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            pool: PoolConfig::default(),
            extra: HashMap::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("dial_timeout", &self.dial_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("pool", &self.pool)
            .field("extra", &self.extra)
            .finish()
    }
}

impl Config {
    /// Create a configuration with default settings for the given address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Recognised variables: `CACHET_ADDR`, `CACHET_PASSWORD`, `CACHET_DB`,
    /// `CACHET_DIAL_TIMEOUT`, `CACHET_READ_TIMEOUT`, `CACHET_WRITE_TIMEOUT`
    /// (seconds), `CACHET_POOL_MAX_IDLE` and `CACHET_POOL_MAX_ACTIVE`.
    /// Values that fail to parse are ignored.
    pub fn from_env() -> ConfigBuilder {
        let mut builder = ConfigBuilder::new();

        if let Ok(addr) = std::env::var("CACHET_ADDR") {
            builder = builder.addr(addr);
        }

        if let Ok(password) = std::env::var("CACHET_PASSWORD") {
            builder = builder.password(password);
        }

        if let Some(db) = env_parse("CACHET_DB") {
            builder = builder.db(db);
        }

        if let Some(secs) = env_parse("CACHET_DIAL_TIMEOUT") {
            builder = builder.dial_timeout(Duration::from_secs(secs));
        }

        if let Some(secs) = env_parse("CACHET_READ_TIMEOUT") {
            builder = builder.read_timeout(Duration::from_secs(secs));
        }

        if let Some(secs) = env_parse("CACHET_WRITE_TIMEOUT") {
            builder = builder.write_timeout(Duration::from_secs(secs));
        }

        if let Some(max) = env_parse("CACHET_POOL_MAX_IDLE") {
            builder = builder.max_idle_conns(max);
        }

        if let Some(max) = env_parse("CACHET_POOL_MAX_ACTIVE") {
            builder = builder.max_active_conns(max);
        }

        builder
    }

    /// Validate the configuration.
    ///
    /// Only the address is mandatory; every other field has a usable default.
    pub fn validate(&self) -> CacheResult<()> {
        if self.addr.is_empty() {
            return Err(CacheError::InvalidConfig("addr is required".to_string()));
        }
        Ok(())
    }

    /// Read a driver-specific setting as `T`.
    ///
    /// Returns `Ok(None)` when the key is absent and
    /// [`CacheError::InvalidConfig`] when it cannot be converted.
    pub fn extra<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.extra.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| CacheError::InvalidConfig(format!("extra {key:?}: {e}"))),
            None => Ok(None),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder starting from the defaults.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the backend address.
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the database index.
    pub fn db(mut self, db: u32) -> Self {
        self.config.db = db;
        self
    }

    /// Set the connection timeout.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections.
    pub fn max_idle_conns(mut self, max: usize) -> Self {
        self.config.pool.max_idle_conns = max;
        self
    }

    /// Set the maximum number of active connections.
    pub fn max_active_conns(mut self, max: usize) -> Self {
        self.config.pool.max_active_conns = max;
        self
    }

    /// Set the idle timeout for pooled connections.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_conn_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.pool.max_conn_lifetime = lifetime;
        self
    }

    /// Set a driver-specific setting.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.extra.insert(key.into(), value.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
