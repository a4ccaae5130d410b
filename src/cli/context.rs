use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use time::{UtcOffset, macros::format_description};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

use crate::catalog::{ChainCatalog, ChainId};
use crate::chain::JsonRpcWallet;
use crate::config::{AppConfig, ConfigError, LoggingConfig, LoggingProfile, load_config};
use crate::orchestrator::WalletContext;
use crate::rpc::ChainContext;
use crate::transfer::TransferRequest;

use super::args::{InitCmd, RouteArgs};

/// 初始化 tracing，兼顾 JSON 与文本输出模式。
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let mut filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if matches!(config.profile, LoggingProfile::Lean) {
        const QUIET_TARGETS: &[(&str, &str)] = &[
            ("hyper", "warn"),
            ("hyper_util::client::legacy", "warn"),
            ("reqwest", "info"),
            ("monitoring::quote", "warn"),
            ("latency", "info"),
        ];
        for (module, level) in QUIET_TARGETS {
            if !config.level.contains(module) {
                if let Ok(directive) = format!("{module}={level}").parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }
    }

    if config.profile.is_verbose() {
        const VERBOSE_TARGETS: &[(&str, &str)] = &[
            ("quote::engine", "debug"),
            ("quote::http", "debug"),
            ("fees", "debug"),
            ("gas", "debug"),
            ("latency", "debug"),
        ];
        for (module, level) in VERBOSE_TARGETS {
            if let Ok(directive) = format!("{module}={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    let time_format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::from_hms(config.timezone_offset_hours, 0, 0).map_err(|err| {
        anyhow!(
            "invalid logging timezone offset {}: {err}",
            config.timezone_offset_hours
        )
    })?;
    let offset_timer = OffsetTime::new(offset, time_format);

    let base = fmt()
        .with_timer(offset_timer)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    if config.json {
        base.json()
            .with_current_span(false)
            .with_span_list(false)
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    } else {
        base.with_env_filter(filter)
            .event_format(fmt::format().compact())
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    }
    Ok(())
}

/// 加载主配置；用于 `meridian --config` 的入口。
pub fn load_configuration(path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    load_config(path)
}

/// 写出默认配置模版。
pub fn init_configs(args: InitCmd) -> Result<()> {
    let output_dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    fs::create_dir_all(&output_dir)?;

    let contents = toml::to_string_pretty(&AppConfig::default()).context("序列化默认配置失败")?;
    let target_path = output_dir.join("meridian.toml");
    if target_path.exists() && !args.force {
        println!(
            "跳过 {}（文件已存在，如需覆盖请加 --force）",
            target_path.display()
        );
        return Ok(());
    }
    fs::write(&target_path, contents)?;
    println!("已写入 {}", target_path.display());
    Ok(())
}

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("meridian/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("构建 HTTP 客户端失败")
}

pub fn load_catalog(config: &AppConfig) -> Result<Arc<ChainCatalog>> {
    let catalog = ChainCatalog::from_config(&config.catalog).context("链目录配置非法")?;
    Ok(Arc::new(catalog))
}

/// 根据命令行参数与目录构造转账请求。
pub fn resolve_route(catalog: &ChainCatalog, route: &RouteArgs, amount: &str) -> Result<TransferRequest> {
    let source_chain = ChainId(route.from_chain);
    let destination_chain = ChainId(route.to_chain.unwrap_or(route.from_chain));
    catalog.require_chain(destination_chain)?;
    let source_token = catalog
        .require_token(source_chain, &route.from_token)?
        .clone();
    let destination_token = match route.to_token.as_deref() {
        Some(symbol) => catalog.require_token(destination_chain, symbol)?.clone(),
        None if route_is_bridge(source_chain, destination_chain) => catalog
            .require_token(destination_chain, &source_token.symbol)
            .with_context(|| {
                format!(
                    "链 {destination_chain} 上没有 {}，请用 --to-token 指定目标代币",
                    source_token.symbol
                )
            })?
            .clone(),
        None => return Err(anyhow!("同链转账必须指定 --to-token")),
    };
    Ok(TransferRequest::new(
        amount,
        source_token,
        Some(destination_token),
        destination_chain,
        route.slippage,
    )?)
}

fn route_is_bridge(source: ChainId, destination: ChainId) -> bool {
    source != destination
}

/// 钱包桥地址必须是 http(s) URL。
pub fn build_wallet_context(
    config: &AppConfig,
    catalog: &ChainCatalog,
    client: reqwest::Client,
) -> Result<WalletContext> {
    let raw = config
        .wallet
        .rpc_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("未配置 wallet.rpc_url，无法发送交易"))?;
    let url = Url::parse(raw).with_context(|| format!("wallet.rpc_url 非法: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("wallet.rpc_url 仅支持 http/https: {raw}"));
    }

    let wallet = JsonRpcWallet::new(
        client.clone(),
        url.as_str(),
        Duration::from_millis(config.wallet.timeout_ms),
    );
    let chains = ChainContext::from_catalog(catalog, client, &config.rpc);
    Ok(WalletContext::new(Arc::new(wallet), chains))
}
