//! Key namespacing decorator.
//!
//! A [`Namespace`] wraps a shared cache handle and rewrites every key to
//! `prefix + separator + key` before delegating, so several modules can share
//! one backend without key collisions.
//!
//! ```
//! use cachet_core::{Cache, Namespace};
//! use std::sync::Arc;
//!
//! fn scoped(cache: Arc<dyn Cache>) {
//!     let app = Namespace::new(cache, "app");
//!     let users = app.sub_namespace("user");
//!
//!     assert_eq!(users.prefix(), "app:user");
//!     assert_eq!(users.key("42"), "app:user:42");
//! }
//! ```

use crate::context::Context;
use crate::error::CacheResult;
use crate::pubsub::Subscription;
use crate::traits::{Cache, KeyTtl};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default separator between prefix and key.
pub const DEFAULT_SEPARATOR: &str = ":";

/// Cache decorator that confines keys to a prefix.
///
/// The wrapped cache is shared, never owned exclusively: sub-namespaces and
/// clones hold the same handle, and [`close`](Cache::close) through any of
/// them closes the backend for all.
pub struct Namespace<C: ?Sized = dyn Cache> {
    cache: Arc<C>,
    prefix: String,
    separator: String,
}

impl<C: Cache + ?Sized> Namespace<C> {
    /// Create a namespace over `cache`.
    ///
    /// Surrounding whitespace is trimmed from the prefix. An empty prefix
    /// leaves keys untouched.
    pub fn new(cache: Arc<C>, prefix: impl AsRef<str>) -> Self {
        Self {
            cache,
            prefix: prefix.as_ref().trim().to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    /// Use `separator` between prefix and key.
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// The namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The separator between prefix and key.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// The wrapped cache.
    pub fn inner(&self) -> &Arc<C> {
        &self.cache
    }

    /// Map a local key to the key stored in the backend.
    pub fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            return key.to_string();
        }
        format!("{}{}{}", self.prefix, self.separator, key)
    }

    /// Map a backend key back to a local key.
    ///
    /// Keys that do not carry this namespace's prefix are returned unchanged.
    pub fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return key;
        }
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(self.separator.as_str()))
            .unwrap_or(key)
    }

    /// Create a nested namespace sharing the same cache.
    ///
    /// With prefix `app` and separator `:`, `sub_namespace("user")` yields the
    /// prefix `app:user`. Under an empty prefix the sub-prefix is used as is.
    /// The separator is inherited; override it with
    /// [`with_separator`](Self::with_separator).
    pub fn sub_namespace(&self, sub_prefix: &str) -> Self {
        let prefix = if self.prefix.is_empty() {
            sub_prefix.to_string()
        } else {
            format!("{}{}{}", self.prefix, self.separator, sub_prefix)
        };

        Self {
            cache: Arc::clone(&self.cache),
            prefix,
            separator: self.separator.clone(),
        }
    }

    /// Delete every key in this namespace.
    ///
    /// Unlike [`flush_db`](Cache::flush_db) this leaves other namespaces
    /// alone. With an empty prefix there is nothing narrower to target, and
    /// the whole database is flushed.
    pub async fn flush_namespace(&self, ctx: &Context) -> CacheResult<()> {
        if self.prefix.is_empty() {
            warn!("flushing namespace without prefix clears the whole database");
            return self.cache.flush_db(ctx).await;
        }

        let pattern = format!("{}*", escape_glob(&self.scope()));
        let keys = self.cache.keys(ctx, &pattern).await?;

        if keys.is_empty() {
            return Ok(());
        }

        debug!(namespace = %self.prefix, count = keys.len(), "flushing namespace");
        self.cache.mdelete(ctx, &as_refs(&keys)).await
    }

    fn scope(&self) -> String {
        format!("{}{}", self.prefix, self.separator)
    }

    fn keys_for(&self, keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| self.key(k)).collect()
    }
}

impl<C: ?Sized> Clone for Namespace<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            prefix: self.prefix.clone(),
            separator: self.separator.clone(),
        }
    }
}

impl<C: ?Sized> fmt::Debug for Namespace<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("prefix", &self.prefix)
            .field("separator", &self.separator)
            .finish()
    }
}

fn as_refs(keys: &[String]) -> Vec<&str> {
    keys.iter().map(String::as_str).collect()
}

/// Escape glob metacharacters so `s` only matches itself.
fn escape_glob(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl<C: Cache + ?Sized> Cache for Namespace<C> {
    async fn get(&self, ctx: &Context, key: &str) -> CacheResult<String> {
        self.cache.get(ctx, &self.key(key)).await
    }

    async fn get_bytes(&self, ctx: &Context, key: &str) -> CacheResult<Vec<u8>> {
        self.cache.get_bytes(ctx, &self.key(key)).await
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        self.cache.set(ctx, &self.key(key), value, ttl).await
    }

    async fn set_nx(
        &self,
        ctx: &Context,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        self.cache.set_nx(ctx, &self.key(key), value, ttl).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> CacheResult<()> {
        self.cache.delete(ctx, &self.key(key)).await
    }

    async fn exists(&self, ctx: &Context, keys: &[&str]) -> CacheResult<u64> {
        let keys = self.keys_for(keys);
        self.cache.exists(ctx, &as_refs(&keys)).await
    }

    async fn mget(&self, ctx: &Context, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        let keys = self.keys_for(keys);
        self.cache.mget(ctx, &as_refs(&keys)).await
    }

    async fn mset(&self, ctx: &Context, pairs: HashMap<String, Value>) -> CacheResult<()> {
        let pairs = pairs
            .into_iter()
            .map(|(key, value)| (self.key(&key), value))
            .collect();
        self.cache.mset(ctx, pairs).await
    }

    async fn mdelete(&self, ctx: &Context, keys: &[&str]) -> CacheResult<()> {
        let keys = self.keys_for(keys);
        self.cache.mdelete(ctx, &as_refs(&keys)).await
    }

    async fn incr(&self, ctx: &Context, key: &str) -> CacheResult<i64> {
        self.cache.incr(ctx, &self.key(key)).await
    }

    async fn incr_by(&self, ctx: &Context, key: &str, delta: i64) -> CacheResult<i64> {
        self.cache.incr_by(ctx, &self.key(key), delta).await
    }

    async fn decr(&self, ctx: &Context, key: &str) -> CacheResult<i64> {
        self.cache.decr(ctx, &self.key(key)).await
    }

    async fn decr_by(&self, ctx: &Context, key: &str, delta: i64) -> CacheResult<i64> {
        self.cache.decr_by(ctx, &self.key(key), delta).await
    }

    async fn ttl(&self, ctx: &Context, key: &str) -> CacheResult<KeyTtl> {
        self.cache.ttl(ctx, &self.key(key)).await
    }

    async fn expire(&self, ctx: &Context, key: &str, ttl: Duration) -> CacheResult<()> {
        self.cache.expire(ctx, &self.key(key), ttl).await
    }

    async fn persist(&self, ctx: &Context, key: &str) -> CacheResult<()> {
        self.cache.persist(ctx, &self.key(key)).await
    }

    async fn hget(&self, ctx: &Context, key: &str, field: &str) -> CacheResult<String> {
        self.cache.hget(ctx, &self.key(key), field).await
    }

    async fn hset(&self, ctx: &Context, key: &str, field: &str, value: Value) -> CacheResult<()> {
        self.cache.hset(ctx, &self.key(key), field, value).await
    }

    async fn hgetall(&self, ctx: &Context, key: &str) -> CacheResult<HashMap<String, String>> {
        self.cache.hgetall(ctx, &self.key(key)).await
    }

    async fn hdel(&self, ctx: &Context, key: &str, fields: &[&str]) -> CacheResult<()> {
        self.cache.hdel(ctx, &self.key(key), fields).await
    }

    async fn lpush(&self, ctx: &Context, key: &str, values: Vec<Value>) -> CacheResult<()> {
        self.cache.lpush(ctx, &self.key(key), values).await
    }

    async fn rpush(&self, ctx: &Context, key: &str, values: Vec<Value>) -> CacheResult<()> {
        self.cache.rpush(ctx, &self.key(key), values).await
    }

    async fn lpop(&self, ctx: &Context, key: &str) -> CacheResult<String> {
        self.cache.lpop(ctx, &self.key(key)).await
    }

    async fn rpop(&self, ctx: &Context, key: &str) -> CacheResult<String> {
        self.cache.rpop(ctx, &self.key(key)).await
    }

    async fn llen(&self, ctx: &Context, key: &str) -> CacheResult<u64> {
        self.cache.llen(ctx, &self.key(key)).await
    }

    async fn sadd(&self, ctx: &Context, key: &str, members: Vec<Value>) -> CacheResult<()> {
        self.cache.sadd(ctx, &self.key(key), members).await
    }

    async fn smembers(&self, ctx: &Context, key: &str) -> CacheResult<Vec<String>> {
        self.cache.smembers(ctx, &self.key(key)).await
    }

    async fn srem(&self, ctx: &Context, key: &str, members: Vec<Value>) -> CacheResult<()> {
        self.cache.srem(ctx, &self.key(key), members).await
    }

    async fn publish(&self, ctx: &Context, channel: &str, message: &str) -> CacheResult<()> {
        self.cache.publish(ctx, &self.key(channel), message).await
    }

    async fn subscribe(&self, ctx: &Context, channels: &[&str]) -> CacheResult<Subscription> {
        let channels = self.keys_for(channels);
        let subscription = self.cache.subscribe(ctx, &as_refs(&channels)).await?;

        if self.prefix.is_empty() {
            Ok(subscription)
        } else {
            Ok(subscription.with_channel_prefix(self.scope()))
        }
    }

    async fn ping(&self, ctx: &Context) -> CacheResult<()> {
        self.cache.ping(ctx).await
    }

    /// Flush the entire backend database, not just this namespace.
    ///
    /// **Warning:** other namespaces sharing the backend lose their data too.
    /// Use [`Namespace::flush_namespace`] to clear only this namespace.
    async fn flush_db(&self, ctx: &Context) -> CacheResult<()> {
        warn!(namespace = %self.prefix, "flushing entire database through namespace");
        self.cache.flush_db(ctx).await
    }

    /// List keys in this namespace matching `pattern`.
    ///
    /// The returned keys have the namespace prefix removed.
    async fn keys(&self, ctx: &Context, pattern: &str) -> CacheResult<Vec<String>> {
        let pattern = if self.prefix.is_empty() {
            pattern.to_string()
        } else {
            format!("{}{}", escape_glob(&self.scope()), pattern)
        };

        let keys = self.cache.keys(ctx, &pattern).await?;
        Ok(keys
            .iter()
            .map(|key| self.strip_prefix(key).to_string())
            .collect())
    }

    async fn close(&self) -> CacheResult<()> {
        self.cache.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::testing::MockCache;
    use std::sync::atomic::Ordering;

    fn namespace(prefix: &str) -> (Arc<MockCache>, Namespace<MockCache>) {
        let mock = Arc::new(MockCache::new());
        let ns = Namespace::new(mock.clone(), prefix);
        (mock, ns)
    }

    #[test]
    fn test_key_round_trip() {
        for prefix in ["app", "a", "orders:eu", "with space"] {
            let (_, ns) = namespace(prefix);
            for key in ["42", "", "user:1", ":leading", "app:nested"] {
                let full = ns.key(key);
                assert_eq!(full, format!("{}:{}", prefix, key));
                assert_eq!(ns.strip_prefix(&full), key);
            }
        }
    }

    #[test]
    fn test_empty_prefix_is_identity() {
        let (_, ns) = namespace("");
        for key in ["42", "", "a:b"] {
            assert_eq!(ns.key(key), key);
            assert_eq!(ns.strip_prefix(key), key);
        }
    }

    #[test]
    fn test_prefix_is_trimmed() {
        let (_, ns) = namespace("  users \n");
        assert_eq!(ns.prefix(), "users");
        assert_eq!(ns.key("1"), "users:1");

        let (_, blank) = namespace("   ");
        assert_eq!(blank.prefix(), "");
    }

    #[test]
    fn test_strip_prefix_leaves_foreign_keys() {
        let (_, ns) = namespace("app");
        assert_eq!(ns.strip_prefix("other:z"), "other:z");
        assert_eq!(ns.strip_prefix("app"), "app");
        assert_eq!(ns.strip_prefix("application:x"), "application:x");
        assert_eq!(ns.strip_prefix("app/x"), "app/x");
    }

    #[test]
    fn test_custom_separator() {
        let (_, ns) = namespace("app");
        let ns = ns.with_separator("/");
        assert_eq!(ns.separator(), "/");
        assert_eq!(ns.key("x"), "app/x");
        assert_eq!(ns.strip_prefix("app/x"), "x");
        assert_eq!(ns.strip_prefix("app:x"), "app:x");
    }

    #[test]
    fn test_sub_namespace_composition() {
        let (mock, a) = namespace("a");
        let b = a.sub_namespace("b");
        assert_eq!(b.prefix(), "a:b");
        assert_eq!(b.key("k"), "a:b:k");
        assert!(Arc::ptr_eq(b.inner(), &mock));

        let (_, root) = namespace("");
        assert_eq!(root.sub_namespace("b").prefix(), "b");
    }

    #[test]
    fn test_sub_namespace_separator() {
        let (_, a) = namespace("a");
        let a = a.with_separator(".");
        assert_eq!(a.sub_namespace("b").key("k"), "a.b.k");

        let overridden = a.sub_namespace("b").with_separator("/");
        assert_eq!(overridden.prefix(), "a.b");
        assert_eq!(overridden.key("k"), "a.b/k");
    }

    #[tokio::test]
    async fn test_scalar_operations_are_prefixed() {
        let (mock, ns) = namespace("orders");
        let ctx = Context::background();

        ns.set(&ctx, "42", Value::from("paid"), None).await.unwrap();
        assert_eq!(mock.value("orders:42"), Some("paid".to_string()));
        assert_eq!(ns.get(&ctx, "42").await.unwrap(), "paid");
        assert_eq!(ns.get_bytes(&ctx, "42").await.unwrap(), b"paid");

        assert!(!ns.set_nx(&ctx, "42", Value::from("new"), None).await.unwrap());
        assert_eq!(mock.last_keys("set_nx"), Some(vec!["orders:42".to_string()]));

        assert_eq!(ns.exists(&ctx, &["42", "43"]).await.unwrap(), 1);
        assert_eq!(
            mock.last_keys("exists"),
            Some(vec!["orders:42".to_string(), "orders:43".to_string()])
        );

        ns.delete(&ctx, "42").await.unwrap();
        assert_eq!(mock.value("orders:42"), None);
    }

    #[tokio::test]
    async fn test_batch_operations_are_prefixed() {
        let (mock, ns) = namespace("app");
        let ctx = Context::background();

        let mut pairs = HashMap::new();
        pairs.insert("x".to_string(), Value::from(1));
        pairs.insert("y".to_string(), Value::from(2));
        ns.mset(&ctx, pairs).await.unwrap();
        assert_eq!(mock.stored_keys(), vec!["app:x", "app:y"]);

        let values = ns.mget(&ctx, &["y", "missing", "x"]).await.unwrap();
        assert_eq!(
            values,
            vec![Some("2".to_string()), None, Some("1".to_string())]
        );

        ns.mdelete(&ctx, &["x", "y"]).await.unwrap();
        assert_eq!(
            mock.last_keys("mdelete"),
            Some(vec!["app:x".to_string(), "app:y".to_string()])
        );
        assert!(mock.stored_keys().is_empty());
    }

    #[tokio::test]
    async fn test_structured_operations_are_prefixed() {
        let (mock, ns) = namespace("s");
        let ctx = Context::background();
        let expected = Some(vec!["s:k".to_string()]);

        assert_eq!(ns.incr(&ctx, "k").await.unwrap(), 1);
        assert_eq!(ns.incr_by(&ctx, "k", 4).await.unwrap(), 5);
        assert_eq!(ns.decr(&ctx, "k").await.unwrap(), 4);
        assert_eq!(ns.decr_by(&ctx, "k", 4).await.unwrap(), 0);
        assert_eq!(mock.last_keys("incr_by"), expected);

        assert_eq!(ns.ttl(&ctx, "k").await.unwrap(), KeyTtl::Persistent);
        ns.expire(&ctx, "k", Duration::from_secs(1)).await.unwrap();
        ns.persist(&ctx, "k").await.unwrap();
        assert_eq!(mock.last_keys("expire"), expected);
        assert_eq!(mock.last_keys("persist"), expected);

        ns.hset(&ctx, "k", "f", Value::from("v")).await.unwrap();
        let _ = ns.hget(&ctx, "k", "f").await;
        ns.hgetall(&ctx, "k").await.unwrap();
        ns.hdel(&ctx, "k", &["f"]).await.unwrap();
        for op in ["hset", "hget", "hgetall", "hdel"] {
            assert_eq!(mock.last_keys(op), expected, "{}", op);
        }

        ns.lpush(&ctx, "k", vec![Value::from("a")]).await.unwrap();
        ns.rpush(&ctx, "k", vec![Value::from("b")]).await.unwrap();
        let _ = ns.lpop(&ctx, "k").await;
        let _ = ns.rpop(&ctx, "k").await;
        ns.llen(&ctx, "k").await.unwrap();
        for op in ["lpush", "rpush", "lpop", "rpop", "llen"] {
            assert_eq!(mock.last_keys(op), expected, "{}", op);
        }

        ns.sadd(&ctx, "k", vec![Value::from("m")]).await.unwrap();
        ns.smembers(&ctx, "k").await.unwrap();
        ns.srem(&ctx, "k", vec![Value::from("m")]).await.unwrap();
        for op in ["sadd", "smembers", "srem"] {
            assert_eq!(mock.last_keys(op), expected, "{}", op);
        }
    }

    #[tokio::test]
    async fn test_keys_strips_prefix() {
        let (mock, ns) = namespace("app");
        let ctx = Context::background();
        mock.insert("app:user:1", "a");
        mock.insert("app:user:2", "b");
        mock.insert("other:user:3", "c");

        let keys = ns.keys(&ctx, "user*").await.unwrap();

        assert_eq!(keys, vec!["user:1", "user:2"]);
        assert_eq!(mock.last_keys("keys"), Some(vec!["app:user*".to_string()]));
    }

    #[tokio::test]
    async fn test_flush_namespace_only_touches_own_keys() {
        let (mock, ns) = namespace("app");
        let ctx = Context::background();
        mock.insert("app:x", "1");
        mock.insert("app:y", "2");
        mock.insert("other:z", "3");

        ns.flush_namespace(&ctx).await.unwrap();

        assert_eq!(mock.last_keys("keys"), Some(vec!["app:*".to_string()]));
        assert_eq!(
            mock.last_keys("mdelete"),
            Some(vec!["app:x".to_string(), "app:y".to_string()])
        );
        assert_eq!(mock.stored_keys(), vec!["other:z"]);
        assert_eq!(mock.call_count("flush_db"), 0);
    }

    #[tokio::test]
    async fn test_flush_namespace_without_matches_is_noop() {
        let (mock, ns) = namespace("empty");
        let ctx = Context::background();
        mock.insert("other:z", "3");

        ns.flush_namespace(&ctx).await.unwrap();

        assert_eq!(mock.call_count("mdelete"), 0);
        assert_eq!(mock.stored_keys(), vec!["other:z"]);
    }

    #[tokio::test]
    async fn test_flush_namespace_without_prefix_flushes_everything() {
        let (mock, ns) = namespace("");
        let ctx = Context::background();
        mock.insert("app:x", "1");
        mock.insert("other:z", "3");

        ns.flush_namespace(&ctx).await.unwrap();

        assert_eq!(mock.call_count("flush_db"), 1);
        assert!(mock.stored_keys().is_empty());
    }

    #[tokio::test]
    async fn test_flush_db_bypasses_namespace() {
        let (mock, ns) = namespace("app");
        let ctx = Context::background();
        mock.insert("app:x", "1");
        mock.insert("other:z", "3");

        ns.flush_db(&ctx).await.unwrap();

        assert!(mock.stored_keys().is_empty());
    }

    #[tokio::test]
    async fn test_errors_forwarded_unchanged() {
        let (mock, ns) = namespace("app");
        let ctx = Context::background();

        let err = ns.get(&ctx, "missing").await.unwrap_err();
        assert!(err.is_not_found());

        mock.fail_with(CacheError::Timeout);
        assert_eq!(ns.ping(&ctx).await, Err(CacheError::Timeout));
        assert_eq!(ns.flush_namespace(&ctx).await, Err(CacheError::Timeout));
        assert_eq!(
            ns.sub_namespace("x").keys(&ctx, "*").await,
            Err(CacheError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_close_is_shared() {
        let (mock, parent) = namespace("app");
        let child = parent.sub_namespace("child");

        child.close().await.unwrap();
        parent.close().await.unwrap();

        assert_eq!(mock.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pubsub_channels_are_prefixed() {
        let (mock, ns) = namespace("app");
        let ctx = Context::background();

        ns.publish(&ctx, "events", "hello").await.unwrap();
        assert_eq!(mock.last_keys("publish"), Some(vec!["app:events".to_string()]));

        let sub = ns.subscribe(&ctx, &["events", "alerts"]).await.unwrap();
        assert_eq!(
            mock.last_keys("subscribe"),
            Some(vec!["app:events".to_string(), "app:alerts".to_string()])
        );
        assert_eq!(sub.channels(), ["events".to_string(), "alerts".to_string()]);
    }

    #[tokio::test]
    async fn test_nested_namespace_over_namespace() {
        let mock = Arc::new(MockCache::new());
        let outer: Arc<dyn Cache> = Arc::new(Namespace::new(mock.clone(), "tenant"));
        let inner = Namespace::new(outer, "cart");
        let ctx = Context::background();

        inner.set(&ctx, "1", Value::from("x"), None).await.unwrap();

        assert_eq!(mock.value("tenant:cart:1"), Some("x".to_string()));
        assert_eq!(inner.keys(&ctx, "*").await.unwrap(), vec!["1"]);
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("app:"), "app:");
        assert_eq!(escape_glob("a*b?[c]\\:"), "a\\*b\\?\\[c\\]\\\\:");
    }
}
