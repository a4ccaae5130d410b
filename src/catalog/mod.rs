//! 静态链 / 代币 / 金库目录：启动时从配置加载一次，之后只读。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{CatalogConfig, ChainEntry, TokenEntry, VaultEntry};

pub const NATIVE_TOKEN_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("链 {0} 重复定义")]
    DuplicateChain(ChainId),
    #[error("链 {chain} 上的代币 {symbol} 重复定义")]
    DuplicateToken { chain: ChainId, symbol: String },
    #[error("金库 {0} 重复定义")]
    DuplicateVault(String),
    #[error("未知链 {0}")]
    UnknownChain(ChainId),
    #[error("链 {chain} 上不存在代币 {symbol}")]
    UnknownToken { chain: ChainId, symbol: String },
    #[error("未知金库 {0}")]
    UnknownVault(String),
    #[error("地址 {value} 非法: {reason}")]
    InvalidAddress { value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// EIP-155 / EIP-3085 使用的 0x 前缀十六进制形式。
    pub fn as_hex(&self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn from_hex(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))?;
        u64::from_str_radix(digits, 16).ok().map(ChainId)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ChainId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    #[default]
    Evm,
    Solana,
    Sui,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: ChainId,
    pub name: String,
    pub family: ChainFamily,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub explorer_url: Option<String>,
}

impl Chain {
    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(|s| s.as_str())
    }

    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{tx_hash}", base.trim_end_matches('/')))
    }
}

/// 价格服务与缓存使用的代币键：网络 + 小写地址。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenKey {
    pub network: ChainId,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub chain: ChainId,
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn is_native(&self) -> bool {
        let address = self.address.trim();
        address.eq_ignore_ascii_case(NATIVE_TOKEN_ADDRESS) || address.eq_ignore_ascii_case("native")
    }

    pub fn evm_address(&self) -> Result<Address, CatalogError> {
        if self.is_native() {
            return Ok(Address::ZERO);
        }
        parse_address(&self.address)
    }

    pub fn key(&self) -> TokenKey {
        TokenKey {
            network: self.chain,
            address: self.address.trim().to_ascii_lowercase(),
        }
    }

    /// 同一资产（同链同地址）判断，忽略符号与大小写差异。
    pub fn same_asset(&self, other: &Token) -> bool {
        self.key() == other.key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vault {
    pub id: String,
    pub name: String,
    pub chain: ChainId,
    pub contract: Address,
    pub asset: Token,
}

#[derive(Debug, Clone, Default)]
pub struct ChainCatalog {
    chains: BTreeMap<ChainId, Chain>,
    tokens: Vec<Token>,
    vaults: BTreeMap<String, Vault>,
}

impl ChainCatalog {
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let mut catalog = ChainCatalog::default();
        for entry in &config.chains {
            catalog.insert_chain(entry)?;
        }
        for entry in &config.tokens {
            catalog.insert_token(entry)?;
        }
        for entry in &config.vaults {
            catalog.insert_vault(entry)?;
        }
        Ok(catalog)
    }

    fn insert_chain(&mut self, entry: &ChainEntry) -> Result<(), CatalogError> {
        let id = ChainId(entry.id);
        if self.chains.contains_key(&id) {
            return Err(CatalogError::DuplicateChain(id));
        }
        self.chains.insert(
            id,
            Chain {
                id,
                name: entry.name.clone(),
                family: entry.family,
                native_currency: entry.native_currency.clone(),
                rpc_urls: entry.rpc_urls.clone(),
                explorer_url: entry.explorer_url.clone(),
            },
        );
        Ok(())
    }

    fn insert_token(&mut self, entry: &TokenEntry) -> Result<(), CatalogError> {
        let chain = ChainId(entry.chain);
        let family = self.require_chain(chain)?.family;
        if family == ChainFamily::Evm && !entry.address.eq_ignore_ascii_case("native") {
            parse_address(&entry.address)?;
        }
        if self.token(chain, &entry.symbol).is_some() {
            return Err(CatalogError::DuplicateToken {
                chain,
                symbol: entry.symbol.clone(),
            });
        }
        self.tokens.push(Token {
            chain,
            address: entry.address.trim().to_string(),
            symbol: entry.symbol.trim().to_string(),
            decimals: entry.decimals,
        });
        Ok(())
    }

    fn insert_vault(&mut self, entry: &VaultEntry) -> Result<(), CatalogError> {
        let chain = ChainId(entry.chain);
        self.require_chain(chain)?;
        if self.vaults.contains_key(&entry.id) {
            return Err(CatalogError::DuplicateVault(entry.id.clone()));
        }
        let asset = self
            .token(chain, &entry.asset)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownToken {
                chain,
                symbol: entry.asset.clone(),
            })?;
        let contract = parse_address(&entry.contract)?;
        self.vaults.insert(
            entry.id.clone(),
            Vault {
                id: entry.id.clone(),
                name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
                chain,
                contract,
                asset,
            },
        );
        Ok(())
    }

    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(&id)
    }

    pub fn require_chain(&self, id: ChainId) -> Result<&Chain, CatalogError> {
        self.chain(id).ok_or(CatalogError::UnknownChain(id))
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.values()
    }

    /// 按符号（忽略大小写）或地址查找代币。
    pub fn token(&self, chain: ChainId, symbol_or_address: &str) -> Option<&Token> {
        let needle = symbol_or_address.trim();
        self.tokens.iter().find(|token| {
            token.chain == chain
                && (token.symbol.eq_ignore_ascii_case(needle)
                    || token.address.eq_ignore_ascii_case(needle))
        })
    }

    pub fn require_token(&self, chain: ChainId, symbol: &str) -> Result<&Token, CatalogError> {
        self.token(chain, symbol)
            .ok_or_else(|| CatalogError::UnknownToken {
                chain,
                symbol: symbol.to_string(),
            })
    }

    pub fn vault(&self, id: &str) -> Option<&Vault> {
        self.vaults.get(id)
    }

    pub fn require_vault(&self, id: &str) -> Result<&Vault, CatalogError> {
        self.vault(id)
            .ok_or_else(|| CatalogError::UnknownVault(id.to_string()))
    }

    pub fn vaults(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.values()
    }
}

pub fn parse_address(raw: &str) -> Result<Address, CatalogError> {
    Address::from_str(raw.trim()).map_err(|err| CatalogError::InvalidAddress {
        value: raw.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;

    #[test]
    fn default_catalog_loads() {
        let catalog = ChainCatalog::from_config(&CatalogConfig::default()).expect("catalog");
        let ethereum = catalog.chain(ChainId(1)).expect("ethereum");
        assert_eq!(ethereum.family, ChainFamily::Evm);
        assert_eq!(ethereum.native_currency.symbol, "ETH");

        let usdc = catalog.token(ChainId(137), "usdc").expect("polygon usdc");
        assert_eq!(usdc.decimals, 6);
        assert!(catalog.token(ChainId(1), "ETH").expect("eth").is_native());
    }

    #[test]
    fn duplicate_chain_is_rejected() {
        let mut config = CatalogConfig::default();
        let first = config.chains[0].clone();
        config.chains.push(first);
        let err = ChainCatalog::from_config(&config).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateChain(ChainId(1)));
    }

    #[test]
    fn vault_requires_known_asset() {
        let mut config = CatalogConfig::default();
        config.vaults.push(VaultEntry {
            id: "usdc-core".to_string(),
            name: None,
            chain: 1,
            contract: "0x1111111111111111111111111111111111111111".to_string(),
            asset: "DOGE".to_string(),
        });
        let err = ChainCatalog::from_config(&config).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownToken { .. }));
    }

    #[test]
    fn chain_id_hex_round_trip() {
        assert_eq!(ChainId(137).as_hex(), "0x89");
        assert_eq!(ChainId::from_hex("0x89"), Some(ChainId(137)));
        assert_eq!(ChainId::from_hex("137"), None);
    }

    #[test]
    fn explorer_url_trims_trailing_slash() {
        let catalog = ChainCatalog::from_config(&CatalogConfig::default()).expect("catalog");
        let chain = catalog.chain(ChainId(1)).expect("ethereum");
        assert_eq!(
            chain.explorer_tx_url("0xabc").as_deref(),
            Some("https://etherscan.io/tx/0xabc")
        );
    }
}
