//! In-process cache backend.

use crate::pattern::glob_match;
use async_trait::async_trait;
use cachet_core::{
    Cache, CacheError, CacheResult, Config, Context, KeyTtl, Message, Registry, Subscription,
    Value,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Driver name the memory backend registers under.
pub const DRIVER_NAME: &str = "memory";

/// Capacity of the pub/sub fan-out channel.
const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Data {
    Str(Vec<u8>),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    data: Data,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(data: Data) -> Self {
        Self {
            data,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Store = HashMap<String, Entry>;

/// Cache backed by a map in process memory.
///
/// Supports every [`Cache`] operation, including pub/sub between handles to
/// the same instance. Expired entries are dropped lazily when touched.
///
/// # Example
///
/// ```
/// use cachet_core::{Cache, Context, Value};
/// use cachet_memory::MemoryCache;
///
/// # #[tokio::main]
/// # async fn main() -> cachet_core::CacheResult<()> {
/// let cache = MemoryCache::new();
/// let ctx = Context::background();
///
/// cache.set(&ctx, "hits", Value::from(1), None).await?;
/// assert_eq!(cache.incr(&ctx, "hits").await?, 2);
/// # Ok(())
/// # }
/// ```
pub struct MemoryCache {
    data: RwLock<Store>,
    events: broadcast::Sender<Message>,
    shutdown: watch::Sender<bool>,
    max_entries: Option<usize>,
    closed: AtomicBool,
}

impl MemoryCache {
    /// Create an unbounded cache.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            data: RwLock::new(HashMap::new()),
            events,
            shutdown,
            max_entries: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Limit the number of keys the cache will hold.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Create a cache from a generic configuration.
    ///
    /// The address is ignored. `extra["max_entries"]` sets a capacity limit
    /// and must be a positive integer.
    pub fn from_config(config: &Config) -> CacheResult<Self> {
        let cache = Self::new();

        match config.extra::<usize>("max_entries")? {
            Some(0) => Err(CacheError::InvalidConfig(
                "max_entries must be positive".to_string(),
            )),
            Some(max) => Ok(cache.with_max_entries(max)),
            None => Ok(cache),
        }
    }

    /// The capacity limit, if any.
    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Whether [`close`](Cache::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of stored keys, expired or not.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Check if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Drop every expired entry now.
    pub async fn purge_expired(&self) -> usize {
        let mut data = self.data.write().await;
        let before = data.len();
        let now = Instant::now();
        data.retain(|_, entry| !entry.is_expired(now));
        before - data.len()
    }

    fn ensure_open(&self) -> CacheResult<()> {
        if self.is_closed() {
            return Err(CacheError::ConnectionLost);
        }
        Ok(())
    }

    /// Run an operation under the caller's context.
    async fn run<T, F>(&self, ctx: &Context, op: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        self.ensure_open()?;
        ctx.run(op).await
    }

    /// Fail with [`CacheError::CacheFull`] unless `keys` fit.
    fn reserve(&self, data: &mut Store, keys: &[&str]) -> CacheResult<()> {
        let Some(max) = self.max_entries else {
            return Ok(());
        };

        let incoming = |data: &Store| keys.iter().filter(|k| !data.contains_key(**k)).count();

        if data.len() + incoming(data) > max {
            let now = Instant::now();
            data.retain(|_, entry| !entry.is_expired(now));

            if data.len() + incoming(data) > max {
                warn!(max_entries = max, "memory cache is full");
                return Err(CacheError::CacheFull);
            }
        }
        Ok(())
    }

    /// Insert a fresh entry, replacing whatever was stored.
    fn put(&self, data: &mut Store, key: &str, entry: Entry) -> CacheResult<()> {
        self.reserve(data, &[key])?;
        data.insert(key.to_string(), entry);
        Ok(())
    }

    /// The live entry for `key`, created with `empty` if absent.
    fn entry_or_insert<'a>(
        &self,
        data: &'a mut Store,
        key: &str,
        empty: fn() -> Data,
    ) -> CacheResult<&'a mut Entry> {
        if live_mut(data, key).is_none() {
            self.put(data, key, Entry::new(empty()))?;
        }
        data.get_mut(key).ok_or(CacheError::NotFound)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("max_entries", &self.max_entries)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn live<'a>(data: &'a Store, key: &str) -> Option<&'a Entry> {
    data.get(key).filter(|entry| !entry.is_expired(Instant::now()))
}

fn live_mut<'a>(data: &'a mut Store, key: &str) -> Option<&'a mut Entry> {
    if data
        .get(key)
        .is_some_and(|entry| entry.is_expired(Instant::now()))
    {
        data.remove(key);
    }
    data.get_mut(key)
}

/// `None`, zero and a lifetime past the clock's range all mean "never expires".
fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.filter(|d| !d.is_zero())
        .and_then(|d| Instant::now().checked_add(d))
}

fn utf8(bytes: &[u8]) -> CacheResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CacheError::InvalidValue)
}

fn parse_int(bytes: &[u8]) -> CacheResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CacheError::InvalidValue)
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, ctx: &Context, key: &str) -> CacheResult<String> {
        self.run(ctx, async {
            let data = self.data.read().await;
            match live(&data, key).map(|e| &e.data) {
                Some(Data::Str(bytes)) => utf8(bytes),
                Some(_) => Err(CacheError::InvalidValue),
                None => Err(CacheError::NotFound),
            }
        })
        .await
    }

    async fn get_bytes(&self, ctx: &Context, key: &str) -> CacheResult<Vec<u8>> {
        self.run(ctx, async {
            let data = self.data.read().await;
            match live(&data, key).map(|e| &e.data) {
                Some(Data::Str(bytes)) => Ok(bytes.clone()),
                Some(_) => Err(CacheError::InvalidValue),
                None => Err(CacheError::NotFound),
            }
        })
        .await
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            let entry = Entry {
                data: Data::Str(value.into_bytes()),
                expires_at: deadline(ttl),
            };
            self.put(&mut data, key, entry)
        })
        .await
    }

    async fn set_nx(
        &self,
        ctx: &Context,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            if live_mut(&mut data, key).is_some() {
                return Ok(false);
            }
            let entry = Entry {
                data: Data::Str(value.into_bytes()),
                expires_at: deadline(ttl),
            };
            self.put(&mut data, key, entry)?;
            Ok(true)
        })
        .await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> CacheResult<()> {
        self.run(ctx, async {
            self.data.write().await.remove(key);
            Ok(())
        })
        .await
    }

    async fn exists(&self, ctx: &Context, keys: &[&str]) -> CacheResult<u64> {
        self.run(ctx, async {
            let data = self.data.read().await;
            Ok(keys.iter().filter(|k| live(&data, k).is_some()).count() as u64)
        })
        .await
    }

    async fn mget(&self, ctx: &Context, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        self.run(ctx, async {
            let data = self.data.read().await;
            Ok(keys
                .iter()
                .map(|key| match live(&data, key).map(|e| &e.data) {
                    Some(Data::Str(bytes)) => utf8(bytes).ok(),
                    _ => None,
                })
                .collect())
        })
        .await
    }

    /// Stores every pair or none of them.
    async fn mset(&self, ctx: &Context, pairs: HashMap<String, Value>) -> CacheResult<()> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            let keys: Vec<&str> = pairs.keys().map(String::as_str).collect();
            self.reserve(&mut data, &keys)?;

            for (key, value) in pairs {
                data.insert(key, Entry::new(Data::Str(value.into_bytes())));
            }
            Ok(())
        })
        .await
    }

    async fn mdelete(&self, ctx: &Context, keys: &[&str]) -> CacheResult<()> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            for key in keys {
                data.remove(*key);
            }
            Ok(())
        })
        .await
    }

    /// The key keeps its expiration.
    async fn incr_by(&self, ctx: &Context, key: &str, delta: i64) -> CacheResult<i64> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            let entry = self.entry_or_insert(&mut data, key, || Data::Str(b"0".to_vec()))?;

            let Data::Str(bytes) = &mut entry.data else {
                return Err(CacheError::InvalidValue);
            };

            let next = parse_int(bytes)?
                .checked_add(delta)
                .ok_or(CacheError::InvalidValue)?;
            *bytes = next.to_string().into_bytes();
            Ok(next)
        })
        .await
    }

    async fn ttl(&self, ctx: &Context, key: &str) -> CacheResult<KeyTtl> {
        self.run(ctx, async {
            let data = self.data.read().await;
            Ok(match live(&data, key) {
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
                Some(_) => KeyTtl::Persistent,
                None => KeyTtl::Missing,
            })
        })
        .await
    }

    /// A zero `ttl` deletes the key. Missing keys are left alone.
    async fn expire(&self, ctx: &Context, key: &str, ttl: Duration) -> CacheResult<()> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            if ttl.is_zero() {
                data.remove(key);
            } else if let Some(entry) = live_mut(&mut data, key) {
                entry.expires_at = deadline(Some(ttl));
            }
            Ok(())
        })
        .await
    }

    async fn persist(&self, ctx: &Context, key: &str) -> CacheResult<()> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            if let Some(entry) = live_mut(&mut data, key) {
                entry.expires_at = None;
            }
            Ok(())
        })
        .await
    }

    async fn hget(&self, ctx: &Context, key: &str, field: &str) -> CacheResult<String> {
        self.run(ctx, async {
            let data = self.data.read().await;
            match live(&data, key).map(|e| &e.data) {
                Some(Data::Hash(fields)) => fields.get(field).cloned().ok_or(CacheError::NotFound),
                Some(_) => Err(CacheError::InvalidValue),
                None => Err(CacheError::NotFound),
            }
        })
        .await
    }

    async fn hset(&self, ctx: &Context, key: &str, field: &str, value: Value) -> CacheResult<()> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            let entry = self.entry_or_insert(&mut data, key, || Data::Hash(HashMap::new()))?;
            match &mut entry.data {
                Data::Hash(fields) => {
                    fields.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                _ => Err(CacheError::InvalidValue),
            }
        })
        .await
    }

    async fn hgetall(&self, ctx: &Context, key: &str) -> CacheResult<HashMap<String, String>> {
        self.run(ctx, async {
            let data = self.data.read().await;
            match live(&data, key).map(|e| &e.data) {
                Some(Data::Hash(fields)) => Ok(fields.clone()),
                Some(_) => Err(CacheError::InvalidValue),
                None => Ok(HashMap::new()),
            }
        })
        .await
    }

    async fn hdel(&self, ctx: &Context, key: &str, fields: &[&str]) -> CacheResult<()> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            let emptied = match live_mut(&mut data, key).map(|e| &mut e.data) {
                Some(Data::Hash(stored)) => {
                    for field in fields {
                        stored.remove(*field);
                    }
                    stored.is_empty()
                }
                Some(_) => return Err(CacheError::InvalidValue),
                None => false,
            };
            if emptied {
                data.remove(key);
            }
            Ok(())
        })
        .await
    }

    /// Values are pushed one at a time, so `[a, b]` leaves `b` at the head.
    async fn lpush(&self, ctx: &Context, key: &str, values: Vec<Value>) -> CacheResult<()> {
        self.run(ctx, async {
            if values.is_empty() {
                return Ok(());
            }
            let mut data = self.data.write().await;
            let entry = self.entry_or_insert(&mut data, key, || Data::List(VecDeque::new()))?;
            match &mut entry.data {
                Data::List(list) => {
                    for value in values {
                        list.push_front(value.to_string());
                    }
                    Ok(())
                }
                _ => Err(CacheError::InvalidValue),
            }
        })
        .await
    }

    async fn rpush(&self, ctx: &Context, key: &str, values: Vec<Value>) -> CacheResult<()> {
        self.run(ctx, async {
            if values.is_empty() {
                return Ok(());
            }
            let mut data = self.data.write().await;
            let entry = self.entry_or_insert(&mut data, key, || Data::List(VecDeque::new()))?;
            match &mut entry.data {
                Data::List(list) => {
                    list.extend(values.iter().map(Value::to_string));
                    Ok(())
                }
                _ => Err(CacheError::InvalidValue),
            }
        })
        .await
    }

    async fn lpop(&self, ctx: &Context, key: &str) -> CacheResult<String> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            pop(&mut data, key, VecDeque::pop_front)
        })
        .await
    }

    async fn rpop(&self, ctx: &Context, key: &str) -> CacheResult<String> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            pop(&mut data, key, VecDeque::pop_back)
        })
        .await
    }

    async fn llen(&self, ctx: &Context, key: &str) -> CacheResult<u64> {
        self.run(ctx, async {
            let data = self.data.read().await;
            match live(&data, key).map(|e| &e.data) {
                Some(Data::List(list)) => Ok(list.len() as u64),
                Some(_) => Err(CacheError::InvalidValue),
                None => Ok(0),
            }
        })
        .await
    }

    async fn sadd(&self, ctx: &Context, key: &str, members: Vec<Value>) -> CacheResult<()> {
        self.run(ctx, async {
            if members.is_empty() {
                return Ok(());
            }
            let mut data = self.data.write().await;
            let entry = self.entry_or_insert(&mut data, key, || Data::Set(BTreeSet::new()))?;
            match &mut entry.data {
                Data::Set(set) => {
                    set.extend(members.iter().map(Value::to_string));
                    Ok(())
                }
                _ => Err(CacheError::InvalidValue),
            }
        })
        .await
    }

    /// Members are returned in sorted order.
    async fn smembers(&self, ctx: &Context, key: &str) -> CacheResult<Vec<String>> {
        self.run(ctx, async {
            let data = self.data.read().await;
            match live(&data, key).map(|e| &e.data) {
                Some(Data::Set(set)) => Ok(set.iter().cloned().collect()),
                Some(_) => Err(CacheError::InvalidValue),
                None => Ok(Vec::new()),
            }
        })
        .await
    }

    async fn srem(&self, ctx: &Context, key: &str, members: Vec<Value>) -> CacheResult<()> {
        self.run(ctx, async {
            let mut data = self.data.write().await;
            let emptied = match live_mut(&mut data, key).map(|e| &mut e.data) {
                Some(Data::Set(set)) => {
                    for member in &members {
                        set.remove(&member.to_string());
                    }
                    set.is_empty()
                }
                Some(_) => return Err(CacheError::InvalidValue),
                None => false,
            };
            if emptied {
                data.remove(key);
            }
            Ok(())
        })
        .await
    }

    /// Publishing with no subscribers is not an error.
    async fn publish(&self, ctx: &Context, channel: &str, message: &str) -> CacheResult<()> {
        self.run(ctx, async {
            let receivers = self
                .events
                .send(Message {
                    channel: channel.to_string(),
                    payload: message.to_string(),
                    pattern: None,
                })
                .unwrap_or(0);
            debug!(channel = %channel, receivers, "published message");
            Ok(())
        })
        .await
    }

    /// The subscription ends when it is dropped or the cache is closed.
    async fn subscribe(&self, ctx: &Context, channels: &[&str]) -> CacheResult<Subscription> {
        self.run(ctx, async {
            let names: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
            let (tx, subscription) = Subscription::channel_pair(names.clone());
            let mut events = self.events.subscribe();
            let mut shutdown = self.shutdown.subscribe();

            debug!(channels = ?names, "subscribed");

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tx.closed() => break,
                        event = events.recv() => match event {
                            Ok(message) if names.contains(&message.channel) => {
                                if tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "subscriber lagged, messages dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            });

            Ok(subscription)
        })
        .await
    }

    async fn ping(&self, ctx: &Context) -> CacheResult<()> {
        self.run(ctx, async { Ok(()) }).await
    }

    async fn flush_db(&self, ctx: &Context) -> CacheResult<()> {
        self.run(ctx, async {
            self.data.write().await.clear();
            Ok(())
        })
        .await
    }

    /// Matching keys in sorted order.
    async fn keys(&self, ctx: &Context, pattern: &str) -> CacheResult<Vec<String>> {
        self.run(ctx, async {
            let data = self.data.read().await;
            let now = Instant::now();
            let mut keys: Vec<String> = data
                .iter()
                .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
                .map(|(key, _)| key.clone())
                .collect();
            keys.sort();
            Ok(keys)
        })
        .await
    }

    async fn close(&self) -> CacheResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.send_replace(true);
        self.data.write().await.clear();
        info!("memory cache closed");
        Ok(())
    }
}

fn pop(
    data: &mut Store,
    key: &str,
    take: fn(&mut VecDeque<String>) -> Option<String>,
) -> CacheResult<String> {
    let (value, emptied) = match live_mut(data, key).map(|e| &mut e.data) {
        Some(Data::List(list)) => (take(list), list.is_empty()),
        Some(_) => return Err(CacheError::InvalidValue),
        None => return Err(CacheError::NotFound),
    };
    if emptied {
        data.remove(key);
    }
    value.ok_or(CacheError::NotFound)
}

/// Driver constructor for the memory backend.
pub fn constructor(config: Config) -> CacheResult<Arc<dyn Cache>> {
    let cache = MemoryCache::from_config(&config)?;
    debug!(max_entries = ?cache.max_entries(), "opened memory cache");
    Ok(Arc::new(cache))
}

/// Register the memory backend in `registry` under [`DRIVER_NAME`].
pub fn register(registry: &Registry) -> bool {
    registry.register(DRIVER_NAME, constructor)
}

/// Register the memory backend in the global registry.
pub fn register_global() -> bool {
    register(Registry::global())
}
