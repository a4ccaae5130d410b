use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{Chain, ChainId};
use crate::gas::GasPlan;
use crate::rpc::TxHash;

/// EIP-1193 约定的错误码。
pub const UNKNOWN_CHAIN_CODE: i64 = 4902;
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("钱包不认识链 {0}")]
    UnknownChain(ChainId),
    #[error("用户拒绝了钱包请求")]
    UserRejected,
    #[error("钱包返回错误 {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("钱包连接失败: {0}")]
    Transport(String),
    #[error("钱包不支持该操作: {0}")]
    Unsupported(String),
}

/// `wallet_addEthereumChain` 的参数（EIP-3085）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDefinition {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrencyDefinition,
    pub rpc_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeCurrencyDefinition {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl From<&Chain> for ChainDefinition {
    fn from(chain: &Chain) -> Self {
        Self {
            chain_id: chain.id.as_hex(),
            chain_name: chain.name.clone(),
            native_currency: NativeCurrencyDefinition {
                name: chain.native_currency.name.clone(),
                symbol: chain.native_currency.symbol.clone(),
                decimals: chain.native_currency.decimals,
            },
            rpc_urls: chain.rpc_urls.clone(),
            block_explorer_urls: chain.explorer_url.iter().cloned().collect(),
        }
    }
}

/// 交给钱包签名广播的交易。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    pub chain: ChainId,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas: GasPlan,
}

#[async_trait]
pub trait WalletCapability: Send + Sync {
    async fn current_chain(&self) -> Result<ChainId, WalletError>;

    async fn switch_chain(&self, chain: ChainId) -> Result<(), WalletError>;

    async fn add_chain(&self, definition: &ChainDefinition) -> Result<(), WalletError>;

    async fn address(&self) -> Result<Address, WalletError>;

    async fn send_transaction(&self, tx: &UnsignedTx) -> Result<TxHash, WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChainCatalog;
    use crate::config::CatalogConfig;

    #[test]
    fn chain_definition_uses_hex_id_and_camel_case() {
        let catalog = ChainCatalog::from_config(&CatalogConfig::default()).expect("catalog");
        let polygon = catalog.chain(ChainId(137)).expect("polygon");
        let definition = ChainDefinition::from(polygon);
        let value = serde_json::to_value(&definition).expect("json");
        assert_eq!(value["chainId"], "0x89");
        assert_eq!(value["chainName"], "Polygon");
        assert_eq!(value["nativeCurrency"]["symbol"], "POL");
        assert_eq!(value["blockExplorerUrls"][0], "https://polygonscan.com");
    }
}
