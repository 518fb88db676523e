//! Cache capability contracts.

use crate::context::Context;
use crate::error::{CacheError, CacheResult};
use crate::pubsub::Subscription;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Remaining lifetime of a key, as reported by [`Cache::ttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key expires after the given duration.
    Expires(Duration),
    /// The key exists and has no expiration.
    Persistent,
    /// The key does not exist.
    Missing,
}

impl KeyTtl {
    /// The remaining duration, if the key has one.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyTtl::Expires(d) => Some(*d),
            _ => None,
        }
    }

    /// Whether the key exists.
    pub fn exists(&self) -> bool {
        !matches!(self, KeyTtl::Missing)
    }
}

/// Full cache capability contract.
///
/// Every operation except [`close`](Cache::close) receives a [`Context`];
/// implementations must honour its cancellation and deadline. Expirations are
/// `Option<Duration>`: `None` (or a zero duration) means the entry never
/// expires.
///
/// Batch and derived numeric operations have default implementations built on
/// the scalar ones. Backends with native support should override them.
#[async_trait]
pub trait Cache: Send + Sync {
    // ========== Scalar Operations ==========

    /// Get a value as a string.
    ///
    /// Returns [`CacheError::NotFound`] if the key does not exist.
    async fn get(&self, ctx: &Context, key: &str) -> CacheResult<String>;

    /// Get a value as raw bytes.
    ///
    /// Returns [`CacheError::NotFound`] if the key does not exist.
    async fn get_bytes(&self, ctx: &Context, key: &str) -> CacheResult<Vec<u8>>;

    /// Store a value.
    ///
    /// # Arguments
    ///
    /// * `key` - The cache key
    /// * `value` - The value to store
    /// * `ttl` - Optional time-to-live; `None` keeps the entry forever
    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    /// Store a value only if the key is absent.
    ///
    /// Returns `true` if the value was stored.
    async fn set_nx(
        &self,
        ctx: &Context,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<bool>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, ctx: &Context, key: &str) -> CacheResult<()>;

    /// Count how many of `keys` exist.
    async fn exists(&self, ctx: &Context, keys: &[&str]) -> CacheResult<u64>;

    // ========== Batch Operations ==========

    /// Get multiple keys.
    ///
    /// Returns one slot per requested key in input order; `None` marks a key
    /// that does not exist.
    async fn mget(&self, ctx: &Context, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        use futures::future::try_join_all;

        let futures = keys.iter().map(|key| async move {
            match self.get(ctx, key).await {
                Ok(value) => Ok(Some(value)),
                Err(CacheError::NotFound) => Ok(None),
                Err(e) => Err(e),
            }
        });
        try_join_all(futures).await
    }

    /// Store every pair without expiration.
    ///
    /// Every key is attempted, but no cross-key atomicity is promised: when an
    /// error is returned some pairs may already be stored.
    async fn mset(&self, ctx: &Context, pairs: HashMap<String, Value>) -> CacheResult<()> {
        use futures::future::try_join_all;

        let futures = pairs
            .into_iter()
            .map(|(key, value)| async move { self.set(ctx, &key, value, None).await });
        try_join_all(futures).await?;
        Ok(())
    }

    /// Delete multiple keys, ignoring the ones that do not exist.
    async fn mdelete(&self, ctx: &Context, keys: &[&str]) -> CacheResult<()> {
        use futures::future::try_join_all;

        let futures = keys.iter().map(|key| self.delete(ctx, key));
        try_join_all(futures).await?;
        Ok(())
    }

    // ========== Numeric Operations ==========

    /// Increment by one. See [`incr_by`](Cache::incr_by).
    async fn incr(&self, ctx: &Context, key: &str) -> CacheResult<i64> {
        self.incr_by(ctx, key, 1).await
    }

    /// Add `delta` to an integer value and return the result.
    ///
    /// A missing key starts at zero. Fails with [`CacheError::InvalidValue`]
    /// if the stored value is not an integer or the result overflows.
    async fn incr_by(&self, ctx: &Context, key: &str, delta: i64) -> CacheResult<i64>;

    /// Decrement by one. See [`incr_by`](Cache::incr_by).
    async fn decr(&self, ctx: &Context, key: &str) -> CacheResult<i64> {
        self.incr_by(ctx, key, -1).await
    }

    /// Subtract `delta` from an integer value and return the result.
    async fn decr_by(&self, ctx: &Context, key: &str, delta: i64) -> CacheResult<i64> {
        let delta = delta.checked_neg().ok_or(CacheError::InvalidValue)?;
        self.incr_by(ctx, key, delta).await
    }

    // ========== TTL Operations ==========

    /// Get the remaining time-to-live of a key.
    async fn ttl(&self, ctx: &Context, key: &str) -> CacheResult<KeyTtl>;

    /// Set or replace the expiration of a key.
    async fn expire(&self, ctx: &Context, key: &str, ttl: Duration) -> CacheResult<()>;

    /// Remove the expiration of a key.
    async fn persist(&self, ctx: &Context, key: &str) -> CacheResult<()>;

    // ========== Hash Operations ==========

    /// Get a hash field. Fails with [`CacheError::NotFound`] if the key or the
    /// field is missing.
    async fn hget(&self, ctx: &Context, key: &str, field: &str) -> CacheResult<String>;

    /// Set a hash field.
    async fn hset(&self, ctx: &Context, key: &str, field: &str, value: Value) -> CacheResult<()>;

    /// Get every field of a hash. A missing key yields an empty map.
    async fn hgetall(&self, ctx: &Context, key: &str) -> CacheResult<HashMap<String, String>>;

    /// Delete hash fields.
    async fn hdel(&self, ctx: &Context, key: &str, fields: &[&str]) -> CacheResult<()>;

    // ========== List Operations ==========

    /// Push values onto the head of a list, one after the other.
    async fn lpush(&self, ctx: &Context, key: &str, values: Vec<Value>) -> CacheResult<()>;

    /// Append values to the tail of a list.
    async fn rpush(&self, ctx: &Context, key: &str, values: Vec<Value>) -> CacheResult<()>;

    /// Pop from the head of a list. Fails with [`CacheError::NotFound`] when
    /// the list is empty or missing.
    async fn lpop(&self, ctx: &Context, key: &str) -> CacheResult<String>;

    /// Pop from the tail of a list.
    async fn rpop(&self, ctx: &Context, key: &str) -> CacheResult<String>;

    /// Length of a list; zero for a missing key.
    async fn llen(&self, ctx: &Context, key: &str) -> CacheResult<u64>;

    // ========== Set Operations ==========

    /// Add members to a set.
    async fn sadd(&self, ctx: &Context, key: &str, members: Vec<Value>) -> CacheResult<()>;

    /// List the members of a set.
    async fn smembers(&self, ctx: &Context, key: &str) -> CacheResult<Vec<String>>;

    /// Remove members from a set.
    async fn srem(&self, ctx: &Context, key: &str, members: Vec<Value>) -> CacheResult<()>;

    // ========== Pub/Sub ==========

    /// Publish a message to a channel.
    async fn publish(&self, ctx: &Context, channel: &str, message: &str) -> CacheResult<()> {
        let _ = (ctx, channel, message);
        Err(CacheError::Unsupported("publish".to_string()))
    }

    /// Subscribe to channels.
    async fn subscribe(&self, ctx: &Context, channels: &[&str]) -> CacheResult<Subscription> {
        let _ = (ctx, channels);
        Err(CacheError::Unsupported("subscribe".to_string()))
    }

    // ========== Administration ==========

    /// Check that the backend is reachable.
    async fn ping(&self, ctx: &Context) -> CacheResult<()>;

    /// Remove every key in the backend database.
    ///
    /// **Warning:** this ignores any namespacing and wipes data belonging to
    /// every user of the backend.
    async fn flush_db(&self, ctx: &Context) -> CacheResult<()>;

    /// List keys matching a glob pattern.
    ///
    /// Patterns use Redis `KEYS` syntax: `*`, `?`, `[...]` classes and `\`
    /// escapes for a literal metacharacter. Backends must honour the escapes,
    /// since [`Namespace`](crate::Namespace) escapes its prefix this way.
    ///
    /// **Warning:** enumerating keys can be expensive on large datasets and
    /// backends may refuse it.
    async fn keys(&self, ctx: &Context, pattern: &str) -> CacheResult<Vec<String>>;

    /// Release backend resources.
    ///
    /// Safe to call more than once. Every holder of a shared handle is
    /// affected.
    async fn close(&self) -> CacheResult<()>;
}

/// Minimal string-only cache contract.
///
/// For callers that only need scalar string storage, and for backends that
/// cannot offer the full [`Cache`] surface.
#[async_trait]
pub trait StringCache: Send + Sync {
    /// Get a value. Returns [`CacheError::NotFound`] if the key does not exist.
    async fn get(&self, ctx: &Context, key: &str) -> CacheResult<String>;

    /// Store a value with an optional time-to-live.
    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    /// Delete a key.
    async fn delete(&self, ctx: &Context, key: &str) -> CacheResult<()>;

    /// Check if a key exists.
    async fn exists(&self, ctx: &Context, key: &str) -> CacheResult<bool>;

    /// Release backend resources.
    async fn close(&self) -> CacheResult<()>;
}

/// Exposes a full [`Cache`] through the [`StringCache`] contract.
pub struct StringCacheAdapter<C: ?Sized> {
    cache: Arc<C>,
}

impl<C: Cache + ?Sized> StringCacheAdapter<C> {
    /// Wrap a shared cache handle.
    pub fn new(cache: Arc<C>) -> Self {
        Self { cache }
    }

    /// The wrapped cache.
    pub fn inner(&self) -> &Arc<C> {
        &self.cache
    }
}

impl<C: ?Sized> Clone for StringCacheAdapter<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

#[async_trait]
impl<C: Cache + ?Sized> StringCache for StringCacheAdapter<C> {
    async fn get(&self, ctx: &Context, key: &str) -> CacheResult<String> {
        Cache::get(&*self.cache, ctx, key).await
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        Cache::set(&*self.cache, ctx, key, Value::from(value), ttl).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> CacheResult<()> {
        Cache::delete(&*self.cache, ctx, key).await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> CacheResult<bool> {
        Cache::exists(&*self.cache, ctx, &[key]).await.map(|n| n > 0)
    }

    async fn close(&self) -> CacheResult<()> {
        Cache::close(&*self.cache).await
    }
}
