use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::warn;

use crate::cache::{HttpTvlSource, TvlCache};
use crate::catalog::{ChainCatalog, ChainId, Vault};
use crate::cli::args::{GasCmd, TvlCmd};
use crate::cli::context::build_http_client;
use crate::cli::utils::{format_amount, format_gwei};
use crate::config::AppConfig;
use crate::gas::GasStrategy;
use crate::rpc::EvmJsonRpcClient;

/// 生成一次 gas 计划并输出。读不到网络费率时给出档位固定值。
pub async fn handle_gas_cmd(cmd: GasCmd, config: &AppConfig, catalog: &ChainCatalog) -> Result<()> {
    let chain = catalog.require_chain(ChainId(cmd.chain))?;
    let client = build_http_client(Duration::from_millis(config.rpc.timeout_ms))?;
    let rpc = EvmJsonRpcClient::new(chain, client, &config.rpc)?;
    let strategy = GasStrategy::new(&config.gas);
    let plan = strategy
        .plan_with_limit(&rpc, cmd.kind, cmd.urgency, cmd.gas_limit)
        .await;

    println!("chain: {} ({})", chain.name, chain.id);
    println!("kind: {} / urgency: {}", cmd.kind, cmd.urgency);
    println!("gas limit: {}", plan.gas_limit);
    println!("max fee: {}", format_gwei(plan.max_fee_per_gas));
    println!("priority fee: {}", format_gwei(plan.max_priority_fee_per_gas));
    println!("max cost: {}", format_gwei(plan.max_cost_wei()));
    Ok(())
}

pub async fn handle_tvl_cmd(cmd: TvlCmd, config: &AppConfig, catalog: &ChainCatalog) -> Result<()> {
    let vaults = select_vaults(catalog, &cmd.vaults)?;
    if vaults.is_empty() {
        println!("目录中没有配置金库");
        return Ok(());
    }

    let client = build_http_client(Duration::from_millis(config.tvl.timeout_ms))?;
    let source = Arc::new(HttpTvlSource::new(client, &config.tvl));
    let cache = TvlCache::from_config(source, &config.tvl);
    let aggregate = cache.aggregate(&vaults).await;

    for reading in &aggregate.readings {
        println!(
            "{:<20} {:>18}  [{}]",
            reading.vault,
            format_amount(reading.tvl_usd, "USD"),
            reading.source.as_str()
        );
    }
    for vault in &aggregate.failed {
        println!("{vault:<20} {:>18}  [unavailable]", "—");
    }
    println!("total: {}", format_amount(aggregate.total_usd, "USD"));
    if !aggregate.is_complete() {
        warn!(
            target: "cache::tvl",
            failed = aggregate.failed.len(),
            "部分金库 TVL 不可用，总额偏低"
        );
    }
    Ok(())
}

fn select_vaults(catalog: &ChainCatalog, ids: &[String]) -> Result<Vec<Vault>> {
    if ids.is_empty() {
        return Ok(catalog.vaults().cloned().collect());
    }
    ids.iter()
        .map(|id| {
            catalog
                .require_vault(id)
                .cloned()
                .map_err(|err| anyhow!(err))
        })
        .collect()
}
