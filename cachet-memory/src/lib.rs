//! In-process backend for Cachet.
//!
//! [`MemoryCache`] implements the full [`cachet_core::Cache`] contract on a
//! map held in process memory: typed values, per-key expiration, glob key
//! enumeration and pub/sub between handles. It is registered under the
//! driver name [`DRIVER_NAME`].
//!
//! # Examples
//!
//! ```
//! use cachet_core::{Cache, Config, Context, Namespace, Registry, Value};
//!
//! # #[tokio::main]
//! # async fn main() -> cachet_core::CacheResult<()> {
//! let registry = Registry::new();
//! cachet_memory::register(&registry);
//!
//! let config = Config::builder().extra("max_entries", 10_000).build();
//! let cache = registry.open(cachet_memory::DRIVER_NAME, config)?;
//!
//! let sessions = Namespace::new(cache, "sessions");
//! let ctx = Context::background();
//! sessions.set(&ctx, "abc", Value::from("user:1"), None).await?;
//! assert_eq!(sessions.get(&ctx, "abc").await?, "user:1");
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Extra key     | Type  | Meaning                                  |
//! |---------------|-------|------------------------------------------|
//! | `max_entries` | `u64` | Capacity limit; new keys beyond it fail  |

pub mod pattern;
pub mod store;

pub use pattern::glob_match;
pub use store::{DRIVER_NAME, MemoryCache, constructor, register, register_global};
