use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::{ChainFamily, NativeCurrency};
use crate::gas::Urgency;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub prices: PriceServiceConfig,
    #[serde(default)]
    pub tvl: TvlConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingProfile {
    #[default]
    Lean,
    Verbose,
}

impl LoggingProfile {
    pub fn is_verbose(self) -> bool {
        matches!(self, LoggingProfile::Verbose)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "super::default_logging_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub profile: LoggingProfile,
    #[serde(default)]
    pub timezone_offset_hours: i8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "super::default_prometheus_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuoteConfig {
    #[serde(default = "super::default_quote_api_base")]
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrator: Option<String>,
    #[serde(default = "super::default_quote_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "super::default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "super::default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "super::default_slow_quote_warn_ms")]
    pub slow_quote_warn_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriceServiceConfig {
    #[serde(default = "super::default_indexer_api_base")]
    pub api_base: String,
    #[serde(default = "super::default_price_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TvlConfig {
    #[serde(default = "super::default_indexer_api_base")]
    pub api_base: String,
    #[serde(default = "super::default_tvl_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "super::default_tvl_retries")]
    pub retries: u32,
    #[serde(default = "super::default_tvl_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "super::default_tvl_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "super::default_price_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GasConfig {
    #[serde(default)]
    pub limits: GasLimitConfig,
    #[serde(default)]
    pub tiers: GasTiersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasLimitConfig {
    #[serde(default = "super::default_approval_gas_limit")]
    pub approval: u64,
    #[serde(default = "super::default_deposit_gas_limit")]
    pub deposit: u64,
    #[serde(default = "super::default_deposit_gas_limit")]
    pub withdrawal: u64,
    #[serde(default = "super::default_swap_gas_limit")]
    pub swap: u64,
    #[serde(default = "super::default_allowance_reset_gas_limit")]
    pub allowance_reset: u64,
}

/// 单个紧急度档位：倍率作用于预言机报出的 (max fee, priority fee)，
/// 预言机不可用时退回固定 gwei 值。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GasTierConfig {
    pub max_fee_multiplier: Decimal,
    pub priority_fee_multiplier: Decimal,
    pub fallback_max_fee_gwei: Decimal,
    pub fallback_priority_fee_gwei: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasTiersConfig {
    #[serde(default = "super::default_low_tier")]
    pub low: GasTierConfig,
    #[serde(default = "super::default_medium_tier")]
    pub medium: GasTierConfig,
    #[serde(default = "super::default_high_tier")]
    pub high: GasTierConfig,
    #[serde(default = "super::default_very_high_tier")]
    pub very_high: GasTierConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    #[serde(default = "super::default_rpc_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "super::default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    #[serde(default = "super::default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "super::default_deposit_urgency")]
    pub deposit_urgency: Urgency,
    #[serde(default = "super::default_swap_urgency")]
    pub swap_urgency: Urgency,
    #[serde(default = "super::default_arrival_timeout_secs")]
    pub arrival_timeout_secs: u64,
    #[serde(default = "super::default_arrival_poll_interval_ms")]
    pub arrival_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletConfig {
    /// EIP-1193 JSON-RPC 钱包桥地址；为空时 `deposit` 命令不可用。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(default = "super::default_wallet_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "super::default_catalog_chains")]
    pub chains: Vec<ChainEntry>,
    #[serde(default = "super::default_catalog_tokens")]
    pub tokens: Vec<TokenEntry>,
    #[serde(default)]
    pub vaults: Vec<VaultEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChainEntry {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub family: ChainFamily,
    pub native_currency: NativeCurrency,
    #[serde(default, deserialize_with = "super::deserialize_rpc_urls")]
    pub rpc_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenEntry {
    pub chain: u64,
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VaultEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub chain: u64,
    pub contract: String,
    /// 金库底层资产在目录中的符号。
    pub asset: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rpc_url_string_is_accepted() {
        let raw = r#"
            [[chains]]
            id = 10
            name = "Optimism"
            native_currency = { name = "Ether", symbol = "ETH", decimals = 18 }
            rpc_urls = "https://mainnet.optimism.io"
        "#;
        let catalog: CatalogConfig = toml::from_str(raw).expect("parse catalog");
        assert_eq!(catalog.chains.len(), 1);
        assert_eq!(
            catalog.chains[0].rpc_urls,
            vec!["https://mainnet.optimism.io".to_string()]
        );
        assert!(!catalog.tokens.is_empty(), "tokens fall back to built-ins");
    }

    #[test]
    fn gas_tier_overrides_from_yaml() {
        let raw = "tiers:\n  high:\n    max_fee_multiplier: 1.3\n    priority_fee_multiplier: 1.8\n    fallback_max_fee_gwei: 30\n    fallback_priority_fee_gwei: 3\n";
        let gas: GasConfig = serde_yaml::from_str(raw).expect("parse gas");
        assert_eq!(gas.tiers.high.max_fee_multiplier, Decimal::new(13, 1));
        assert_eq!(gas.tiers.low, super::super::default_low_tier());
        assert_eq!(gas.limits.swap, 250_000);
    }
}
