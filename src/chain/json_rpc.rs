use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::catalog::ChainId;
use crate::rpc::{JsonRpcTransport, RpcError, TxHash};

use super::wallet::{
    ChainDefinition, UNKNOWN_CHAIN_CODE, USER_REJECTED_CODE, UnsignedTx, WalletCapability, WalletError,
};

/// 通过 EIP-1193 风格 JSON-RPC 桥访问外部钱包；签名在钱包侧完成。
#[derive(Debug)]
pub struct JsonRpcWallet {
    transport: JsonRpcTransport,
}

impl JsonRpcWallet {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport: JsonRpcTransport::new(client, url, timeout),
        }
    }
}

#[async_trait]
impl WalletCapability for JsonRpcWallet {
    async fn current_chain(&self) -> Result<ChainId, WalletError> {
        let raw: String = self
            .transport
            .call("eth_chainId", Value::Array(Vec::new()))
            .await
            .map_err(|err| map_wallet_error(err, None))?;
        ChainId::from_hex(&raw)
            .ok_or_else(|| WalletError::Transport(format!("eth_chainId 返回值非法: {raw}")))
    }

    async fn switch_chain(&self, chain: ChainId) -> Result<(), WalletError> {
        let _: Value = self
            .transport
            .call(
                "wallet_switchEthereumChain",
                json!([{ "chainId": chain.as_hex() }]),
            )
            .await
            .map_err(|err| map_wallet_error(err, Some(chain)))?;
        info!(target: "wallet::json_rpc", chain = %chain, "钱包已切换网络");
        Ok(())
    }

    async fn add_chain(&self, definition: &ChainDefinition) -> Result<(), WalletError> {
        let _: Value = self
            .transport
            .call("wallet_addEthereumChain", json!([definition]))
            .await
            .map_err(|err| map_wallet_error(err, ChainId::from_hex(&definition.chain_id)))?;
        info!(target: "wallet::json_rpc", chain = %definition.chain_id, name = %definition.chain_name, "钱包已添加网络");
        Ok(())
    }

    async fn address(&self) -> Result<Address, WalletError> {
        let accounts: Vec<Address> = self
            .transport
            .call("eth_accounts", Value::Array(Vec::new()))
            .await
            .map_err(|err| map_wallet_error(err, None))?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::Unsupported("钱包未授权任何账户".to_string()))
    }

    async fn send_transaction(&self, tx: &UnsignedTx) -> Result<TxHash, WalletError> {
        let payload = transaction_payload(tx);
        debug!(target: "wallet::json_rpc", chain = %tx.chain, to = %tx.to, "请求钱包签名并广播交易");
        self.transport
            .call("eth_sendTransaction", json!([payload]))
            .await
            .map_err(|err| map_wallet_error(err, Some(tx.chain)))
    }
}

fn transaction_payload(tx: &UnsignedTx) -> Value {
    json!({
        "from": tx.from,
        "to": tx.to,
        "data": tx.data,
        "value": format!("{:#x}", tx.value),
        "gas": format!("{:#x}", tx.gas.gas_limit),
        "maxFeePerGas": format!("{:#x}", tx.gas.max_fee_per_gas),
        "maxPriorityFeePerGas": format!("{:#x}", tx.gas.max_priority_fee_per_gas),
        "type": "0x2",
        "chainId": tx.chain.as_hex(),
    })
}

/// 钱包错误码归类。部分钱包把 4902 包在 `data.originalError` 里，
/// 或只给出 "Unrecognized chain ID" 文案。
pub(crate) fn map_wallet_error(err: RpcError, chain: Option<ChainId>) -> WalletError {
    match err {
        RpcError::Rpc { code, message, data } => {
            let nested_code = data
                .as_ref()
                .and_then(|data| data.get("originalError"))
                .and_then(|original| original.get("code"))
                .and_then(Value::as_i64);
            let unknown_chain = code == UNKNOWN_CHAIN_CODE
                || nested_code == Some(UNKNOWN_CHAIN_CODE)
                || message.to_ascii_lowercase().contains("unrecognized chain");
            if code == USER_REJECTED_CODE || nested_code == Some(USER_REJECTED_CODE) {
                WalletError::UserRejected
            } else if unknown_chain {
                match chain {
                    Some(chain) => WalletError::UnknownChain(chain),
                    None => WalletError::Rpc { code, message },
                }
            } else {
                WalletError::Rpc { code, message }
            }
        }
        other => WalletError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, U256};

    use super::*;
    use crate::gas::{GasPlan, GasTxType};

    fn rpc_error(code: i64, message: &str, data: Option<Value>) -> RpcError {
        RpcError::Rpc {
            code,
            message: message.to_string(),
            data,
        }
    }

    #[test]
    fn wallet_error_codes_are_classified() {
        assert!(matches!(
            map_wallet_error(rpc_error(4001, "User rejected the request.", None), Some(ChainId(1))),
            WalletError::UserRejected
        ));
        assert!(matches!(
            map_wallet_error(rpc_error(4902, "Unknown chain", None), Some(ChainId(10))),
            WalletError::UnknownChain(ChainId(10))
        ));
        assert!(matches!(
            map_wallet_error(
                rpc_error(-32603, "Internal error", Some(json!({"originalError": {"code": 4902}}))),
                Some(ChainId(8453))
            ),
            WalletError::UnknownChain(ChainId(8453))
        ));
        assert!(matches!(
            map_wallet_error(
                rpc_error(-32603, "Unrecognized chain ID \"0x2105\".", None),
                Some(ChainId(8453))
            ),
            WalletError::UnknownChain(_)
        ));
        assert!(matches!(
            map_wallet_error(rpc_error(-32000, "nonce too low", None), None),
            WalletError::Rpc { code: -32000, .. }
        ));
        assert!(matches!(
            map_wallet_error(RpcError::Transport("closed".into()), None),
            WalletError::Transport(_)
        ));
    }

    #[test]
    fn transaction_payload_is_eip1559() {
        let tx = UnsignedTx {
            chain: ChainId(137),
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x02),
            data: Bytes::from(vec![0x09, 0x5e, 0xa7, 0xb3]),
            value: U256::ZERO,
            gas: GasPlan {
                gas_limit: 90_000,
                max_fee_per_gas: 10_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
                tx_type: GasTxType::Eip1559,
            },
        };
        let payload = transaction_payload(&tx);
        assert_eq!(payload["type"], "0x2");
        assert_eq!(payload["chainId"], "0x89");
        assert_eq!(payload["gas"], "0x15f90");
        assert_eq!(payload["value"], "0x0");
        assert_eq!(payload["maxFeePerGas"], "0x2540be400");
        assert_eq!(payload["data"], "0x095ea7b3");
    }
}
