use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::Deserializer;

use crate::catalog::{ChainFamily, NativeCurrency};
use crate::gas::Urgency;

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

use self::types as cfg;

pub(crate) fn default_logging_level() -> String {
    "info".to_string()
}

pub(crate) fn default_slow_quote_warn_ms() -> u64 {
    1_500
}

pub(crate) fn default_prometheus_listen() -> String {
    "0.0.0.0:9898".to_string()
}

pub(crate) fn default_quote_api_base() -> String {
    "https://li.quest/v1".to_string()
}

pub(crate) fn default_indexer_api_base() -> String {
    "http://127.0.0.1:8787/v1".to_string()
}

pub(crate) fn default_quote_timeout_ms() -> u64 {
    10_000
}

pub(crate) fn default_debounce_ms() -> u64 {
    300
}

pub(crate) fn default_refresh_interval_ms() -> u64 {
    5_000
}

pub(crate) fn default_price_timeout_ms() -> u64 {
    5_000
}

pub(crate) fn default_tvl_ttl_secs() -> u64 {
    60
}

pub(crate) fn default_tvl_retries() -> u32 {
    3
}

pub(crate) fn default_tvl_initial_delay_ms() -> u64 {
    1_000
}

pub(crate) fn default_tvl_backoff_factor() -> f64 {
    2.0
}

pub(crate) fn default_approval_gas_limit() -> u64 {
    90_000
}

pub(crate) fn default_deposit_gas_limit() -> u64 {
    180_000
}

pub(crate) fn default_swap_gas_limit() -> u64 {
    250_000
}

pub(crate) fn default_allowance_reset_gas_limit() -> u64 {
    70_000
}

fn tier(max_fee: (i64, u32), priority: (i64, u32), fallback_max: (i64, u32), fallback_priority: (i64, u32)) -> cfg::GasTierConfig {
    cfg::GasTierConfig {
        max_fee_multiplier: Decimal::new(max_fee.0, max_fee.1),
        priority_fee_multiplier: Decimal::new(priority.0, priority.1),
        fallback_max_fee_gwei: Decimal::new(fallback_max.0, fallback_max.1),
        fallback_priority_fee_gwei: Decimal::new(fallback_priority.0, fallback_priority.1),
    }
}

pub(crate) fn default_low_tier() -> cfg::GasTierConfig {
    tier((101, 2), (105, 2), (8, 0), (5, 1))
}

pub(crate) fn default_medium_tier() -> cfg::GasTierConfig {
    tier((105, 2), (12, 1), (10, 0), (1, 0))
}

pub(crate) fn default_high_tier() -> cfg::GasTierConfig {
    tier((11, 1), (15, 1), (15, 0), (15, 1))
}

pub(crate) fn default_very_high_tier() -> cfg::GasTierConfig {
    tier((12, 1), (2, 0), (20, 0), (2, 0))
}

pub(crate) fn default_rpc_timeout_ms() -> u64 {
    10_000
}

pub(crate) fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

pub(crate) fn default_confirmation_timeout_secs() -> u64 {
    180
}

pub(crate) fn default_deposit_urgency() -> Urgency {
    Urgency::Medium
}

pub(crate) fn default_swap_urgency() -> Urgency {
    Urgency::High
}

pub(crate) fn default_arrival_timeout_secs() -> u64 {
    900
}

pub(crate) fn default_arrival_poll_interval_ms() -> u64 {
    10_000
}

pub(crate) fn default_wallet_timeout_ms() -> u64 {
    120_000
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RpcUrlField {
    Single(String),
    Multiple(Vec<String>),
}

pub(crate) fn deserialize_rpc_urls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let helper = Option::<RpcUrlField>::deserialize(deserializer)?;
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    let values = match helper {
        Some(RpcUrlField::Single(url)) => vec![url],
        Some(RpcUrlField::Multiple(list)) => list,
        None => Vec::new(),
    };

    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            urls.push(trimmed.to_string());
        }
    }

    Ok(urls)
}

fn evm_chain(id: u64, name: &str, currency: (&str, &str), rpc: &str, explorer: &str) -> cfg::ChainEntry {
    cfg::ChainEntry {
        id,
        name: name.to_string(),
        family: ChainFamily::Evm,
        native_currency: NativeCurrency {
            name: currency.0.to_string(),
            symbol: currency.1.to_string(),
            decimals: 18,
        },
        rpc_urls: vec![rpc.to_string()],
        explorer_url: Some(explorer.to_string()),
    }
}

pub(crate) fn default_catalog_chains() -> Vec<cfg::ChainEntry> {
    vec![
        evm_chain(1, "Ethereum", ("Ether", "ETH"), "https://eth.llamarpc.com", "https://etherscan.io"),
        evm_chain(10, "Optimism", ("Ether", "ETH"), "https://mainnet.optimism.io", "https://optimistic.etherscan.io"),
        evm_chain(137, "Polygon", ("POL", "POL"), "https://polygon-rpc.com", "https://polygonscan.com"),
        evm_chain(8453, "Base", ("Ether", "ETH"), "https://mainnet.base.org", "https://basescan.org"),
        evm_chain(42161, "Arbitrum One", ("Ether", "ETH"), "https://arb1.arbitrum.io/rpc", "https://arbiscan.io"),
        cfg::ChainEntry {
            id: 1_151_111_081_099_710,
            name: "Solana".to_string(),
            family: ChainFamily::Solana,
            native_currency: NativeCurrency {
                name: "Solana".to_string(),
                symbol: "SOL".to_string(),
                decimals: 9,
            },
            rpc_urls: vec!["https://api.mainnet-beta.solana.com".to_string()],
            explorer_url: Some("https://solscan.io".to_string()),
        },
        cfg::ChainEntry {
            id: 9_270_000_000_000_000,
            name: "Sui".to_string(),
            family: ChainFamily::Sui,
            native_currency: NativeCurrency {
                name: "Sui".to_string(),
                symbol: "SUI".to_string(),
                decimals: 9,
            },
            rpc_urls: vec!["https://fullnode.mainnet.sui.io:443".to_string()],
            explorer_url: Some("https://suiscan.xyz/mainnet".to_string()),
        },
    ]
}

fn token(chain: u64, symbol: &str, address: &str, decimals: u8) -> cfg::TokenEntry {
    cfg::TokenEntry {
        chain,
        address: address.to_string(),
        symbol: symbol.to_string(),
        decimals,
    }
}

pub(crate) fn default_catalog_tokens() -> Vec<cfg::TokenEntry> {
    const NATIVE: &str = crate::catalog::NATIVE_TOKEN_ADDRESS;
    vec![
        token(1, "ETH", NATIVE, 18),
        token(1, "WETH", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18),
        token(1, "USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6),
        token(1, "USDT", "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6),
        token(10, "ETH", NATIVE, 18),
        token(10, "USDC", "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", 6),
        token(137, "POL", NATIVE, 18),
        token(137, "WETH", "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619", 18),
        token(137, "USDC", "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", 6),
        token(8453, "ETH", NATIVE, 18),
        token(8453, "USDC", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", 6),
        token(42161, "ETH", NATIVE, 18),
        token(42161, "USDC", "0xaf88d065e77c8cC2239327C5EDb3A432268e5831", 6),
        token(1_151_111_081_099_710, "SOL", "11111111111111111111111111111111", 9),
        token(1_151_111_081_099_710, "USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6),
        token(9_270_000_000_000_000, "SUI", "0x2::sui::SUI", 9),
    ]
}

impl Default for cfg::LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_logging_level(),
            json: false,
            profile: cfg::LoggingProfile::Lean,
            timezone_offset_hours: 0,
        }
    }
}

impl Default for cfg::PrometheusConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_prometheus_listen(),
        }
    }
}

impl Default for cfg::QuoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_quote_api_base(),
            api_key: None,
            integrator: None,
            timeout_ms: default_quote_timeout_ms(),
            debounce_ms: default_debounce_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            slow_quote_warn_ms: default_slow_quote_warn_ms(),
        }
    }
}

impl Default for cfg::PriceServiceConfig {
    fn default() -> Self {
        Self {
            api_base: default_indexer_api_base(),
            timeout_ms: default_price_timeout_ms(),
        }
    }
}

impl Default for cfg::TvlConfig {
    fn default() -> Self {
        Self {
            api_base: default_indexer_api_base(),
            ttl_secs: default_tvl_ttl_secs(),
            retries: default_tvl_retries(),
            initial_delay_ms: default_tvl_initial_delay_ms(),
            backoff_factor: default_tvl_backoff_factor(),
            timeout_ms: default_price_timeout_ms(),
        }
    }
}

impl Default for cfg::GasLimitConfig {
    fn default() -> Self {
        Self {
            approval: default_approval_gas_limit(),
            deposit: default_deposit_gas_limit(),
            withdrawal: default_deposit_gas_limit(),
            swap: default_swap_gas_limit(),
            allowance_reset: default_allowance_reset_gas_limit(),
        }
    }
}

impl Default for cfg::GasTiersConfig {
    fn default() -> Self {
        Self {
            low: default_low_tier(),
            medium: default_medium_tier(),
            high: default_high_tier(),
            very_high: default_very_high_tier(),
        }
    }
}

impl Default for cfg::RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_rpc_timeout_ms(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
        }
    }
}

impl Default for cfg::OrchestratorConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            deposit_urgency: default_deposit_urgency(),
            swap_urgency: default_swap_urgency(),
            arrival_timeout_secs: default_arrival_timeout_secs(),
            arrival_poll_interval_ms: default_arrival_poll_interval_ms(),
        }
    }
}

impl Default for cfg::WalletConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            timeout_ms: default_wallet_timeout_ms(),
        }
    }
}

impl Default for cfg::CatalogConfig {
    fn default() -> Self {
        Self {
            chains: default_catalog_chains(),
            tokens: default_catalog_tokens(),
            vaults: Vec::new(),
        }
    }
}
