use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::catalog::Vault;
use crate::config::TvlConfig;
use crate::monitoring::events;

use super::{Cache, CacheError, CacheSource, InMemoryBackend, RetryPolicy, with_retry_and_cache};

/// 金库 TVL 数据源（美元计价）。
#[async_trait]
pub trait TvlSource: Send + Sync {
    async fn fetch_tvl(&self, vault: &Vault) -> anyhow::Result<Decimal>;
}

/// `GET {base}/vaults/{id}/tvl` → `{ "tvlUsd": "…" }`。
#[derive(Clone, Debug)]
pub struct HttpTvlSource {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvlResponse {
    tvl_usd: Decimal,
}

impl HttpTvlSource {
    pub fn new(client: reqwest::Client, config: &TvlConfig) -> Self {
        Self {
            base_url: config.api_base.clone(),
            client,
            request_timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn endpoint(&self, vault_id: &str) -> String {
        format!("{}/vaults/{vault_id}/tvl", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TvlSource for HttpTvlSource {
    async fn fetch_tvl(&self, vault: &Vault) -> anyhow::Result<Decimal> {
        let url = self.endpoint(&vault.id);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .with_context(|| format!("请求 {url} 失败"))?
            .error_for_status()
            .with_context(|| format!("{url} 返回错误状态"))?;
        let body: TvlResponse = response
            .json()
            .await
            .with_context(|| format!("解析 {url} 响应失败"))?;
        Ok(body.tvl_usd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TvlReading {
    pub vault: String,
    pub tvl_usd: Decimal,
    pub source: CacheSource,
    pub fetched_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct AggregateTvl {
    pub total_usd: Decimal,
    pub readings: Vec<TvlReading>,
    /// 既无法回源也没有旧值的金库。
    pub failed: Vec<String>,
}

impl AggregateTvl {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn stale_vaults(&self) -> impl Iterator<Item = &str> {
        self.readings
            .iter()
            .filter(|reading| reading.source == CacheSource::Stale)
            .map(|reading| reading.vault.as_str())
    }
}

pub struct TvlCache {
    source: Arc<dyn TvlSource>,
    cache: Cache<InMemoryBackend<String, Decimal>>,
    ttl: Duration,
    policy: RetryPolicy,
}

impl TvlCache {
    pub fn new(source: Arc<dyn TvlSource>, ttl: Duration, policy: RetryPolicy) -> Self {
        Self {
            source,
            cache: Cache::default(),
            ttl,
            policy,
        }
    }

    pub fn from_config(source: Arc<dyn TvlSource>, config: &TvlConfig) -> Self {
        Self::new(
            source,
            Duration::from_secs(config.ttl_secs),
            RetryPolicy::from(config),
        )
    }

    pub async fn get(&self, vault: &Vault) -> Result<TvlReading, CacheError> {
        let operation = format!("tvl:{}", vault.id);
        let result = with_retry_and_cache(
            &self.cache,
            vault.id.clone(),
            self.ttl,
            &self.policy,
            &operation,
            || self.source.fetch_tvl(vault),
        )
        .await;

        match result {
            Ok(lookup) => {
                events::tvl_lookup(&vault.id, lookup.source.as_str());
                Ok(TvlReading {
                    vault: vault.id.clone(),
                    tvl_usd: *lookup.value,
                    source: lookup.source,
                    fetched_at: lookup.fetched_at,
                })
            }
            Err(err) => {
                events::tvl_lookup(&vault.id, "failed");
                warn!(target: "cache::tvl", vault = %vault.id, error = %err, "TVL 获取失败");
                Err(err)
            }
        }
    }

    pub async fn invalidate(&self, vault_id: &str) {
        self.cache.invalidate(&vault_id.to_string()).await;
    }

    /// 并发查询多个金库并求和；失败的金库单独列出，不计入总额。
    pub async fn aggregate(&self, vaults: &[Vault]) -> AggregateTvl {
        let results = join_all(vaults.iter().map(|vault| self.get(vault))).await;

        let mut aggregate = AggregateTvl::default();
        for (vault, result) in vaults.iter().zip(results) {
            match result {
                Ok(reading) => {
                    aggregate.total_usd += reading.tvl_usd;
                    aggregate.readings.push(reading);
                }
                Err(_) => aggregate.failed.push(vault.id.clone()),
            }
        }

        info!(
            target: "cache::tvl",
            vaults = vaults.len(),
            total_usd = %aggregate.total_usd,
            failed = aggregate.failed.len(),
            stale = aggregate.stale_vaults().count(),
            "汇总 TVL 完成"
        );
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use alloy_primitives::Address;
    use anyhow::anyhow;

    use super::*;
    use crate::catalog::{ChainId, Token};

    #[derive(Default)]
    struct FakeSource {
        values: HashMap<String, Decimal>,
        calls: AtomicUsize,
        down: AtomicBool,
        latency: Duration,
    }

    #[async_trait]
    impl TvlSource for FakeSource {
        async fn fetch_tvl(&self, vault: &Vault) -> anyhow::Result<Decimal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(anyhow!("indexer unavailable"));
            }
            self.values
                .get(&vault.id)
                .copied()
                .ok_or_else(|| anyhow!("unknown vault {}", vault.id))
        }
    }

    fn vault(id: &str) -> Vault {
        Vault {
            id: id.to_string(),
            name: id.to_string(),
            chain: ChainId(1),
            contract: Address::repeat_byte(0x44),
            asset: Token {
                chain: ChainId(1),
                address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
                symbol: "USDC".to_string(),
                decimals: 6,
            },
        }
    }

    fn source(values: &[(&str, i64)]) -> Arc<FakeSource> {
        Arc::new(FakeSource {
            values: values
                .iter()
                .map(|(id, value)| (id.to_string(), Decimal::from(*value)))
                .collect(),
            ..Default::default()
        })
    }

    fn tvl_cache(source: Arc<FakeSource>) -> TvlCache {
        TvlCache::new(source, Duration::from_secs(60), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_served_when_refresh_fails() {
        let source = source(&[("usdc-core", 1_000)]);
        let cache = tvl_cache(source.clone());
        let first = cache.get(&vault("usdc-core")).await.expect("first");
        assert_eq!(first.source, CacheSource::Fetched);

        tokio::time::sleep(Duration::from_secs(61)).await;
        source.down.store(true, Ordering::SeqCst);
        let second = cache.get(&vault("usdc-core")).await.expect("stale");
        assert_eq!(second.source, CacheSource::Stale);
        assert_eq!(second.tvl_usd, Decimal::from(1_000));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1 + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_fetch() {
        let source = Arc::new(FakeSource {
            values: HashMap::from([("usdc-core".to_string(), Decimal::from(5))]),
            latency: Duration::from_millis(100),
            ..Default::default()
        });
        let cache = tvl_cache(source.clone());
        let target = vault("usdc-core");
        let (a, b) = tokio::join!(cache.get(&target), cache.get(&target));
        assert_eq!(a.expect("a").tvl_usd, Decimal::from(5));
        assert_eq!(b.expect("b").source, CacheSource::Fresh);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aggregate_reports_sum_and_failures() {
        let source = source(&[("usdc-core", 1_500), ("weth-prime", 2_500)]);
        let cache = tvl_cache(source);
        let vaults = [vault("usdc-core"), vault("weth-prime"), vault("ghost")];
        let aggregate = cache.aggregate(&vaults).await;
        assert_eq!(aggregate.total_usd, Decimal::from(4_000));
        assert_eq!(aggregate.failed, vec!["ghost".to_string()]);
        assert!(!aggregate.is_complete());
        assert_eq!(aggregate.stale_vaults().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_triggers_refetch() {
        let source = source(&[("usdc-core", 10)]);
        let cache = tvl_cache(source.clone());
        cache.get(&vault("usdc-core")).await.expect("first");
        cache.invalidate("usdc-core").await;
        let reading = cache.get(&vault("usdc-core")).await.expect("second");
        assert_eq!(reading.source, CacheSource::Fetched);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
