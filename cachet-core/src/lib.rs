//! Backend-agnostic caching for Cachet.
//!
//! Provides one capability contract for key-value cache backends, a runtime
//! registry that opens backends by driver name, and a namespacing decorator
//! that keeps independent users of one backend from colliding.
//!
//! # Features
//!
//! - **Uniform contract** - scalar, batch, counter, TTL, hash, list, set and
//!   pub/sub operations behind the [`Cache`] trait
//! - **Driver registry** - backends register a constructor; applications
//!   select one with a name and a [`Config`]
//! - **Namespaces** - [`Namespace`] prefixes every key and can flush only
//!   its own keys
//! - **Cancellation** - every operation takes a [`Context`] carrying a
//!   cancellation signal and an optional deadline
//!
//! # Examples
//!
//! ## Opening a backend by name
//!
//! ```no_run
//! use cachet_core::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), CacheError> {
//! let config = Config::builder()
//!     .addr("localhost:6379")
//!     .read_timeout(Duration::from_secs(1))
//!     .build();
//!
//! let cache = open("redis", config)?;
//! let ctx = Context::background().with_timeout(Duration::from_millis(500));
//!
//! cache.set(&ctx, "greeting", Value::from("hello"), None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Namespacing
//!
//! ```no_run
//! use cachet_core::*;
//! use std::sync::Arc;
//!
//! # async fn example(cache: Arc<dyn Cache>) -> Result<(), CacheError> {
//! let ctx = Context::background();
//! let orders = Namespace::new(cache.clone(), "orders");
//!
//! // Stored as "orders:42"
//! orders.set(&ctx, "42", Value::from("paid"), None).await?;
//! assert_eq!(cache.get(&ctx, "orders:42").await?, "paid");
//!
//! // Removes "orders:*" and nothing else
//! orders.flush_namespace(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod namespace;
pub mod pubsub;
pub mod registry;
pub mod traits;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigBuilder, PoolConfig};
pub use context::Context;
pub use error::{CacheError, CacheResult, is_not_found, is_timeout};
pub use namespace::Namespace;
pub use pubsub::{Message, Subscription};
pub use registry::{Constructor, Registry, drivers, must_open, open, register};
pub use traits::{Cache, KeyTtl, StringCache, StringCacheAdapter};
pub use value::Value;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::Context;
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::namespace::Namespace;
    pub use crate::pubsub::{Message, Subscription};
    pub use crate::registry::Registry;
    pub use crate::traits::{Cache, KeyTtl, StringCache, StringCacheAdapter};
    pub use crate::value::Value;
}
