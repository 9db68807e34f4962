//! A loader-backed, size-and-TTL bounded cache that coalesces concurrent
//! loads for the same key (single-flight).
//!
//! `get(key)` either serves a fresh cached entry or joins (and, if none is
//! in flight, starts) exactly one loader invocation per key; every other
//! concurrent caller for that key awaits the same future. On loader
//! failure nothing is cached and the error propagates to every waiter.

use async_trait::async_trait;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::debug;
use twin_kernel::Revision;

pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a cache lookup / load: an entity may legitimately not exist.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    pub exists: bool,
    pub revision: Revision,
    pub value: Option<V>,
}

impl<V> Entry<V> {
    pub fn found(revision: Revision, value: V) -> Self {
        Self {
            exists: true,
            revision,
            value: Some(value),
        }
    }

    pub fn missing() -> Self {
        Self {
            exists: false,
            revision: Revision::UNKNOWN,
            value: None,
        }
    }
}

#[async_trait]
pub trait Loader<K, V>: Send + Sync {
    async fn load(&self, key: &K) -> Result<Entry<V>, LoaderError>;
}

/// Wraps a boxed loader error so it can be cloned across single-flight waiters.
#[derive(Debug)]
pub struct LoaderErrorBox(pub LoaderError);

impl std::fmt::Display for LoaderErrorBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for LoaderErrorBox {}

struct CachedEntry<V> {
    entry: Entry<V>,
    inserted_at: Instant,
}

type SharedResult<V> = Result<Entry<V>, Arc<LoaderErrorBox>>;

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

pub struct EntityCache<K, V> {
    loader: Arc<dyn Loader<K, V>>,
    capacity: usize,
    ttl: Duration,
    store: DashMap<K, CachedEntry<V>>,
    inflight: DashMap<K, Arc<OnceCell<SharedResult<V>>>>,
    counters: Counters,
    name: &'static str,
}

impl<K, V> EntityCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, loader: Arc<dyn Loader<K, V>>, capacity: usize, ttl: Duration) -> Self {
        Self {
            loader,
            capacity,
            ttl,
            store: DashMap::new(),
            inflight: DashMap::new(),
            counters: Counters::default(),
            name,
        }
    }

    fn fresh_cached(&self, key: &K) -> Option<Entry<V>> {
        let cached = self.store.get(key)?;
        if cached.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(cached.entry.clone())
    }

    /// Reads the current cached value without triggering a load on a miss.
    pub fn peek(&self, key: &K) -> Option<Entry<V>> {
        self.fresh_cached(key)
    }

    /// Seeds or overwrites the cached entry directly, bypassing the loader.
    /// Used by callers that can cheaply derive an updated value themselves
    /// (e.g. applying an event to an already-cached snapshot).
    pub fn put(&self, key: K, entry: Entry<V>) {
        self.promote(key, entry);
    }

    pub async fn get(&self, key: &K) -> Result<Entry<V>, Arc<LoaderErrorBox>> {
        if let Some(entry) = self.fresh_cached(key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("entity_cache.hit", "cache" => self.name).increment(1);
            return Ok(entry);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("entity_cache.miss", "cache" => self.name).increment(1);

        let already_inflight = self.inflight.contains_key(key);
        if already_inflight {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("entity_cache.coalesced", "cache" => self.name).increment(1);
        }

        let cell = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let loader = self.loader.clone();
        let owned_key = key.clone();
        let result = cell
            .get_or_init(|| async move {
                loader
                    .load(&owned_key)
                    .await
                    .map_err(|e| Arc::new(LoaderErrorBox(e)))
            })
            .await
            .clone();

        // Only the caller that observes its own cell as still mapped removes it;
        // this keeps a fresh attempt possible after this round completes.
        self.inflight.remove_if(key, |_, v| Arc::ptr_eq(v, &cell));

        if let Ok(entry) = &result {
            self.promote(key.clone(), entry.clone());
        }
        result
    }

    fn promote(&self, key: K, entry: Entry<V>) {
        if self.store.len() >= self.capacity && !self.store.contains_key(&key) {
            if let Some(evict_key) = self.store.iter().next().map(|kv| kv.key().clone()) {
                self.store.remove(&evict_key);
                debug!(cache = self.name, "evicted entry at capacity");
            }
        }
        self.store.insert(
            key,
            CachedEntry {
                entry,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.store.remove(key);
    }

    pub fn hits(&self) -> u64 {
        self.counters.hits.load(Ordering::Relaxed)
    }
    pub fn misses(&self) -> u64 {
        self.counters.misses.load(Ordering::Relaxed)
    }
    pub fn coalesced(&self) -> u64 {
        self.counters.coalesced.load(Ordering::Relaxed)
    }
}

/// A cache-projected view converting a full value `V` to a narrower
/// capability `W` — e.g. a cached `Policy` projected down to the compiled
/// `Enforcer` capability derived from it.
pub struct ProjectedCache<K, V, W> {
    inner: Arc<EntityCache<K, V>>,
    project: Arc<dyn Fn(&V) -> W + Send + Sync>,
}

impl<K, V, W> ProjectedCache<K, V, W>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    W: Clone,
{
    pub fn new(inner: Arc<EntityCache<K, V>>, project: impl Fn(&V) -> W + Send + Sync + 'static) -> Self {
        Self {
            inner,
            project: Arc::new(project),
        }
    }

    pub async fn get(&self, key: &K) -> Result<Entry<W>, Arc<LoaderErrorBox>> {
        let entry = self.inner.get(key).await?;
        Ok(Entry {
            exists: entry.exists,
            revision: entry.revision,
            value: entry.value.as_ref().map(|v| (self.project)(v)),
        })
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.invalidate(key);
    }
}
