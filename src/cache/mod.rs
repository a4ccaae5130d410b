pub mod retry;
pub mod tvl;

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

pub use retry::{RetryPolicy, retry_with_backoff};
pub use tvl::{AggregateTvl, HttpTvlSource, TvlCache, TvlReading, TvlSource};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{operation} 重试 {attempts} 次后仍失败: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
}

/// 缓存条目：过期后仍保留，供回源失败时兜底。
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
            ttl: self.ttl,
        }
    }
}

impl<V> CacheEntry<V> {
    pub fn new(value: Arc<V>, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// 缓存后端抽象：统一 `get` / `insert` / `remove` 接口，支持插拔式实现。
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    type Value: Send + Sync + 'static;

    /// 返回条目，包括已过期的。
    async fn get(&self, key: &Self::Key) -> Option<CacheEntry<Self::Value>>;

    async fn insert(&self, key: Self::Key, entry: CacheEntry<Self::Value>);

    async fn remove(&self, key: &Self::Key);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Fresh,
    Fetched,
    Stale,
}

impl CacheSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheSource::Fresh => "fresh",
            CacheSource::Fetched => "fetched",
            CacheSource::Stale => "stale",
        }
    }
}

#[derive(Debug)]
pub struct CacheLookup<V> {
    pub value: Arc<V>,
    pub source: CacheSource,
    pub fetched_at: Instant,
}

/// 高层缓存封装，内建 per-key 回源锁，同一 key 的并发未命中只回源一次。
pub struct Cache<B>
where
    B: CacheBackend,
{
    backend: B,
    locks: DashMap<B::Key, Arc<tokio::sync::Mutex<()>>>,
    /// 每次 `invalidate` 递增；回源前后不一致说明期间被清除过，结果不回写。
    epochs: DashMap<B::Key, u64>,
}

impl<B> Default for Cache<B>
where
    B: CacheBackend + Default,
{
    fn default() -> Self {
        Self::new(B::default())
    }
}

impl<B> Cache<B>
where
    B: CacheBackend,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            locks: DashMap::new(),
            epochs: DashMap::new(),
        }
    }

    pub async fn get_fresh(&self, key: &B::Key) -> Option<CacheEntry<B::Value>> {
        self.backend.get(key).await.filter(CacheEntry::is_fresh)
    }

    pub async fn get_any(&self, key: &B::Key) -> Option<CacheEntry<B::Value>> {
        self.backend.get(key).await
    }

    pub async fn insert(&self, key: B::Key, value: B::Value, ttl: Duration) -> CacheEntry<B::Value> {
        let entry = CacheEntry::new(Arc::new(value), ttl);
        self.backend.insert(key, entry.clone()).await;
        entry
    }

    /// 无条件清除，包括正在回源的结果。
    pub async fn invalidate(&self, key: &B::Key) {
        *self.epochs.entry(key.clone()).or_insert(0) += 1;
        self.backend.remove(key).await;
    }

    fn epoch(&self, key: &B::Key) -> u64 {
        self.epochs.get(key).map(|epoch| *epoch).unwrap_or(0)
    }

    fn key_lock(&self, key: &B::Key) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// 未命中或过期时带退避重试回源；重试耗尽但存在旧值时返回旧值。
pub async fn with_retry_and_cache<B, F, Fut>(
    cache: &Cache<B>,
    key: B::Key,
    ttl: Duration,
    policy: &RetryPolicy,
    operation: &str,
    mut fetch: F,
) -> Result<CacheLookup<B::Value>, CacheError>
where
    B: CacheBackend,
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<B::Value>>,
{
    if let Some(entry) = cache.get_fresh(&key).await {
        return Ok(CacheLookup {
            value: entry.value,
            source: CacheSource::Fresh,
            fetched_at: entry.fetched_at,
        });
    }

    let lock = cache.key_lock(&key);
    let _guard = lock.lock().await;

    if let Some(entry) = cache.get_fresh(&key).await {
        return Ok(CacheLookup {
            value: entry.value,
            source: CacheSource::Fresh,
            fetched_at: entry.fetched_at,
        });
    }

    let epoch = cache.epoch(&key);
    match retry_with_backoff(policy, operation, &mut fetch).await {
        Ok(value) if cache.epoch(&key) != epoch => {
            debug!(target: "cache", operation, "回源期间缓存被清除，结果不回写");
            let entry = CacheEntry::new(Arc::new(value), ttl);
            Ok(CacheLookup {
                value: entry.value,
                source: CacheSource::Fetched,
                fetched_at: entry.fetched_at,
            })
        }
        Ok(value) => {
            let entry = cache.insert(key, value, ttl).await;
            Ok(CacheLookup {
                value: entry.value,
                source: CacheSource::Fetched,
                fetched_at: entry.fetched_at,
            })
        }
        Err(err) => match cache.get_any(&key).await {
            Some(entry) => {
                warn!(
                    target: "cache",
                    operation,
                    age_ms = entry.fetched_at.elapsed().as_millis() as u64,
                    error = %err,
                    "回源失败，返回过期缓存"
                );
                Ok(CacheLookup {
                    value: entry.value,
                    source: CacheSource::Stale,
                    fetched_at: entry.fetched_at,
                })
            }
            None => Err(CacheError::Exhausted {
                operation: operation.to_string(),
                attempts: policy.max_attempts(),
                last_error: format!("{err:#}"),
            }),
        },
    }
}

/// 默认内存后端，基于 DashMap。
pub struct InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    entries: DashMap<K, CacheEntry<V>>,
}

impl<K, V> Default for InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl<K, V> CacheBackend for InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    async fn get(&self, key: &Self::Key) -> Option<CacheEntry<Self::Value>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    async fn insert(&self, key: Self::Key, entry: CacheEntry<Self::Value>) {
        self.entries.insert(key, entry);
    }

    async fn remove(&self, key: &Self::Key) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;

    type TestCache = Cache<InMemoryBackend<&'static str, u64>>;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            retries: 2,
            initial_delay: Duration::from_millis(10),
            backoff_factor: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_skips_fetch() {
        let cache = TestCache::default();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        for expected in [CacheSource::Fetched, CacheSource::Fresh] {
            let lookup = with_retry_and_cache(&cache, "k", ttl, &fast_policy(), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await
            .expect("lookup");
            assert_eq!(lookup.source, expected);
            assert_eq!(*lookup.value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_value_survives_failed_refresh() {
        let cache = TestCache::default();
        let ttl = Duration::from_secs(1);
        with_retry_and_cache(&cache, "k", ttl, &fast_policy(), "test", || async { Ok(5) })
            .await
            .expect("seed");

        tokio::time::sleep(Duration::from_secs(2)).await;
        let calls = AtomicUsize::new(0);
        let lookup = with_retry_and_cache(&cache, "k", ttl, &fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("indexer down")) }
        })
        .await
        .expect("stale");
        assert_eq!(lookup.source, CacheSource::Stale);
        assert_eq!(*lookup.value, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_without_previous_value_errors() {
        let cache = TestCache::default();
        let err = with_retry_and_cache(
            &cache,
            "k",
            Duration::from_secs(1),
            &fast_policy(),
            "test",
            || async { Err::<u64, _>(anyhow!("boom")) },
        )
        .await
        .unwrap_err();
        match err {
            CacheError::Exhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("boom"));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_during_fetch_discards_result() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let cache = Arc::new(TestCache::default());
                let ttl = Duration::from_secs(60);
                let (started_tx, started) = tokio::sync::oneshot::channel::<()>();
                let (release, gate) = tokio::sync::oneshot::channel::<()>();

                let pending = tokio::task::spawn_local({
                    let cache = Arc::clone(&cache);
                    async move {
                        let mut signals = Some((started_tx, gate));
                        with_retry_and_cache(&*cache, "k", ttl, &fast_policy(), "test", move || {
                            let signals = signals.take();
                            async move {
                                if let Some((started_tx, gate)) = signals {
                                    let _ = started_tx.send(());
                                    let _ = gate.await;
                                }
                                Ok(9)
                            }
                        })
                        .await
                    }
                });
                started.await.expect("fetch started");

                cache.invalidate(&"k").await;
                let _ = release.send(());
                let lookup = pending.await.expect("join").expect("lookup");

                assert_eq!(*lookup.value, 9);
                assert!(cache.get_any(&"k").await.is_none());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let cache = TestCache::default();
        let ttl = Duration::from_secs(60);
        with_retry_and_cache(&cache, "k", ttl, &fast_policy(), "test", || async { Ok(1) })
            .await
            .expect("seed");
        cache.invalidate(&"k").await;
        assert!(cache.get_any(&"k").await.is_none());

        let lookup = with_retry_and_cache(&cache, "k", ttl, &fast_policy(), "test", || async { Ok(2) })
            .await
            .expect("refetch");
        assert_eq!(lookup.source, CacheSource::Fetched);
        assert_eq!(*lookup.value, 2);
    }
}
