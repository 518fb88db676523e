//! Recording mock store for unit tests.

use crate::context::Context;
use crate::error::{CacheError, CacheResult};
use crate::pubsub::Subscription;
use crate::traits::{Cache, KeyTtl};
use crate::value::Value;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// String-only in-memory store that records the keys every call received.
#[derive(Default)]
pub(crate) struct MockCache {
    data: Mutex<BTreeMap<String, String>>,
    calls: Mutex<Vec<(&'static str, Vec<String>)>>,
    pub(crate) closes: AtomicUsize,
    fail_with: Mutex<Option<CacheError>>,
}

impl MockCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, key: &str, value: &str) {
        self.data.lock().insert(key.to_string(), value.to_string());
    }

    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    pub(crate) fn stored_keys(&self) -> Vec<String> {
        self.data.lock().keys().cloned().collect()
    }

    /// Make every subsequent call fail with `err`.
    pub(crate) fn fail_with(&self, err: CacheError) {
        *self.fail_with.lock() = Some(err);
    }

    /// Keys passed to the most recent call of `op`.
    pub(crate) fn last_keys(&self, op: &str) -> Option<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(name, _)| *name == op)
            .map(|(_, keys)| keys.clone())
    }

    pub(crate) fn call_count(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|(name, _)| *name == op).count()
    }

    fn record(&self, op: &'static str, keys: &[&str]) -> CacheResult<()> {
        self.calls
            .lock()
            .push((op, keys.iter().map(|k| k.to_string()).collect()));
        match self.fail_with.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Cache for MockCache {
    async fn get(&self, _ctx: &Context, key: &str) -> CacheResult<String> {
        self.record("get", &[key])?;
        self.value(key).ok_or(CacheError::NotFound)
    }

    async fn get_bytes(&self, _ctx: &Context, key: &str) -> CacheResult<Vec<u8>> {
        self.record("get_bytes", &[key])?;
        self.value(key).map(String::into_bytes).ok_or(CacheError::NotFound)
    }

    async fn set(
        &self,
        _ctx: &Context,
        key: &str,
        value: Value,
        _ttl: Option<Duration>,
    ) -> CacheResult<()> {
        self.record("set", &[key])?;
        self.insert(key, &value.to_string());
        Ok(())
    }

    async fn set_nx(
        &self,
        _ctx: &Context,
        key: &str,
        value: Value,
        _ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        self.record("set_nx", &[key])?;
        let mut data = self.data.lock();
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete(&self, _ctx: &Context, key: &str) -> CacheResult<()> {
        self.record("delete", &[key])?;
        self.data.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, _ctx: &Context, keys: &[&str]) -> CacheResult<u64> {
        self.record("exists", keys)?;
        let data = self.data.lock();
        Ok(keys.iter().filter(|k| data.contains_key(**k)).count() as u64)
    }

    async fn mdelete(&self, _ctx: &Context, keys: &[&str]) -> CacheResult<()> {
        self.record("mdelete", keys)?;
        let mut data = self.data.lock();
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }

    async fn incr_by(&self, _ctx: &Context, key: &str, delta: i64) -> CacheResult<i64> {
        self.record("incr_by", &[key])?;
        let mut data = self.data.lock();
        let current: i64 = match data.get(key) {
            Some(v) => v.parse().map_err(|_| CacheError::InvalidValue)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(CacheError::InvalidValue)?;
        data.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn ttl(&self, _ctx: &Context, key: &str) -> CacheResult<KeyTtl> {
        self.record("ttl", &[key])?;
        Ok(if self.data.lock().contains_key(key) {
            KeyTtl::Persistent
        } else {
            KeyTtl::Missing
        })
    }

    async fn expire(&self, _ctx: &Context, key: &str, _ttl: Duration) -> CacheResult<()> {
        self.record("expire", &[key])
    }

    async fn persist(&self, _ctx: &Context, key: &str) -> CacheResult<()> {
        self.record("persist", &[key])
    }

    async fn hget(&self, _ctx: &Context, key: &str, _field: &str) -> CacheResult<String> {
        self.record("hget", &[key])?;
        Err(CacheError::NotFound)
    }

    async fn hset(&self, _ctx: &Context, key: &str, _field: &str, _value: Value) -> CacheResult<()> {
        self.record("hset", &[key])
    }

    async fn hgetall(&self, _ctx: &Context, key: &str) -> CacheResult<HashMap<String, String>> {
        self.record("hgetall", &[key])?;
        Ok(HashMap::new())
    }

    async fn hdel(&self, _ctx: &Context, key: &str, _fields: &[&str]) -> CacheResult<()> {
        self.record("hdel", &[key])
    }

    async fn lpush(&self, _ctx: &Context, key: &str, _values: Vec<Value>) -> CacheResult<()> {
        self.record("lpush", &[key])
    }

    async fn rpush(&self, _ctx: &Context, key: &str, _values: Vec<Value>) -> CacheResult<()> {
        self.record("rpush", &[key])
    }

    async fn lpop(&self, _ctx: &Context, key: &str) -> CacheResult<String> {
        self.record("lpop", &[key])?;
        Err(CacheError::NotFound)
    }

    async fn rpop(&self, _ctx: &Context, key: &str) -> CacheResult<String> {
        self.record("rpop", &[key])?;
        Err(CacheError::NotFound)
    }

    async fn llen(&self, _ctx: &Context, key: &str) -> CacheResult<u64> {
        self.record("llen", &[key])?;
        Ok(0)
    }

    async fn sadd(&self, _ctx: &Context, key: &str, _members: Vec<Value>) -> CacheResult<()> {
        self.record("sadd", &[key])
    }

    async fn smembers(&self, _ctx: &Context, key: &str) -> CacheResult<Vec<String>> {
        self.record("smembers", &[key])?;
        Ok(Vec::new())
    }

    async fn srem(&self, _ctx: &Context, key: &str, _members: Vec<Value>) -> CacheResult<()> {
        self.record("srem", &[key])
    }

    async fn publish(&self, _ctx: &Context, channel: &str, _message: &str) -> CacheResult<()> {
        self.record("publish", &[channel])
    }

    async fn subscribe(&self, _ctx: &Context, channels: &[&str]) -> CacheResult<Subscription> {
        self.record("subscribe", channels)?;
        let (_tx, sub) =
            Subscription::channel_pair(channels.iter().map(|c| c.to_string()).collect());
        Ok(sub)
    }

    async fn ping(&self, _ctx: &Context) -> CacheResult<()> {
        self.record("ping", &[])
    }

    async fn flush_db(&self, _ctx: &Context) -> CacheResult<()> {
        self.record("flush_db", &[])?;
        self.data.lock().clear();
        Ok(())
    }

    /// Supports exact keys and a single trailing `*`.
    async fn keys(&self, _ctx: &Context, pattern: &str) -> CacheResult<Vec<String>> {
        self.record("keys", &[pattern])?;
        let data = self.data.lock();
        let keys = match pattern.strip_suffix('*') {
            Some(prefix) => data
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => data.keys().filter(|k| *k == pattern).cloned().collect(),
        };
        Ok(keys)
    }

    async fn close(&self) -> CacheResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
