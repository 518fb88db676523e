//! Driver registry - selects cache backends by name at runtime.
//!
//! Backend crates register a [`Constructor`] under a driver name during
//! initialization; applications then open caches by name without depending on
//! the backend's concrete type.
//!
//! ## Lifecycle
//!
//! The process-wide registry returned by [`Registry::global`] is created on
//! first use, populated while the application starts up and read afterwards.
//! Entries are never removed. Independent registries can be built with
//! [`Registry::new`] (handy in tests).
//!
//! ```
//! use cachet_core::{Cache, Config, Registry};
//! use std::sync::Arc;
//!
//! # fn open_backend(_config: Config) -> cachet_core::CacheResult<Arc<dyn Cache>> {
//! #     Err(cachet_core::CacheError::ConnectionLost)
//! # }
//! let registry = Registry::new();
//! assert!(registry.register("redis", open_backend));
//! assert!(!registry.register("redis", open_backend));
//! assert_eq!(registry.drivers(), vec!["redis".to_string()]);
//! ```

use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::traits::Cache;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds a cache instance from a configuration.
pub type Constructor = Arc<dyn Fn(Config) -> CacheResult<Arc<dyn Cache>> + Send + Sync>;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// Thread-safe mapping from driver name to constructor.
///
/// Lookups take the read side of the lock and run concurrently; registration
/// takes the write side. Constructors are always invoked after the lock has
/// been released.
#[derive(Default)]
pub struct Registry {
    drivers: RwLock<HashMap<String, Constructor>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Register a constructor under `name`.
    ///
    /// The first registration for a name wins. Later attempts are logged and
    /// ignored, and return `false`; they never replace the first registration or panic.
    pub fn register<F>(&self, name: impl Into<String>, constructor: F) -> bool
    where
        F: Fn(Config) -> CacheResult<Arc<dyn Cache>> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut drivers = self.drivers.write();

        if drivers.contains_key(&name) {
            warn!(driver = %name, "cache driver already registered");
            return false;
        }

        debug!(driver = %name, "registered cache driver");
        drivers.insert(name, Arc::new(constructor));
        true
    }

    /// Open a cache using the driver registered under `name`.
    ///
    /// The constructor's result is returned as is. Fails with
    /// [`CacheError::DriverNotFound`] if no such driver exists.
    pub fn open(&self, name: &str, config: Config) -> CacheResult<Arc<dyn Cache>> {
        let constructor = self.drivers.read().get(name).cloned();

        match constructor {
            Some(constructor) => constructor(config),
            None => {
                debug!(driver = %name, "cache driver not found");
                Err(CacheError::DriverNotFound(name.to_string()))
            }
        }
    }

    /// Open a cache, panicking on failure.
    ///
    /// Only for initialization code that treats a missing or broken backend
    /// as unrecoverable.
    ///
    /// # Panics
    ///
    /// Panics if the driver is unknown or its constructor fails.
    pub fn must_open(&self, name: &str, config: Config) -> Arc<dyn Cache> {
        match self.open(name, config) {
            Ok(cache) => cache,
            Err(e) => panic!("{}", e),
        }
    }

    /// Names of all registered drivers, in no particular order.
    pub fn drivers(&self) -> Vec<String> {
        self.drivers.read().keys().cloned().collect()
    }

    /// Check if a driver is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.drivers.read().contains_key(name)
    }

    /// Number of registered drivers.
    pub fn len(&self) -> usize {
        self.drivers.read().len()
    }

    /// Check if no driver is registered.
    pub fn is_empty(&self) -> bool {
        self.drivers.read().is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let drivers = self.drivers.read();
        f.debug_struct("Registry")
            .field("driver_count", &drivers.len())
            .field("drivers", &drivers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Register a driver in the global registry. See [`Registry::register`].
pub fn register<F>(name: impl Into<String>, constructor: F) -> bool
where
    F: Fn(Config) -> CacheResult<Arc<dyn Cache>> + Send + Sync + 'static,
{
    Registry::global().register(name, constructor)
}

/// Open a cache from the global registry. See [`Registry::open`].
pub fn open(name: &str, config: Config) -> CacheResult<Arc<dyn Cache>> {
    Registry::global().open(name, config)
}

/// Open a cache from the global registry or panic. See [`Registry::must_open`].
pub fn must_open(name: &str, config: Config) -> Arc<dyn Cache> {
    Registry::global().must_open(name, config)
}

/// Driver names in the global registry.
pub fn drivers() -> Vec<String> {
    Registry::global().drivers()
}
