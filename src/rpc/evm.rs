use std::time::Duration;

use alloy_primitives::{Address, B256, U256, hex};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::catalog::{Chain, ChainFamily, ChainId, Token};
use crate::config::RpcConfig;
use crate::gas::{FeeOracle, NetworkFeeData};
use crate::monitoring::{LatencyMetadata, measure_result};

use super::transport::JsonRpcTransport;
use super::{ChainRpc, RpcError, TxHash, TxReceipt, abi};

/// EVM 链只读客户端：余额、授权额度、费率与回执轮询。
#[derive(Debug)]
pub struct EvmJsonRpcClient {
    chain: ChainId,
    transport: JsonRpcTransport,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader {
    #[serde(default)]
    base_fee_per_gas: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

impl EvmJsonRpcClient {
    pub fn new(chain: &Chain, client: reqwest::Client, config: &RpcConfig) -> Result<Self, RpcError> {
        if chain.family != ChainFamily::Evm {
            return Err(RpcError::UnsupportedChain(chain.id));
        }
        let url = chain
            .primary_rpc_url()
            .ok_or(RpcError::MissingEndpoint(chain.id))?;
        Ok(Self {
            chain: chain.id,
            transport: JsonRpcTransport::new(client, url, Duration::from_millis(config.timeout_ms)),
            poll_interval: Duration::from_millis(config.receipt_poll_interval_ms.max(1)),
        })
    }

    async fn eth_call(&self, to: Address, data: alloy_primitives::Bytes) -> Result<U256, RpcError> {
        let raw: String = self
            .transport
            .call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        let bytes = hex::decode(raw.trim())
            .map_err(|err| RpcError::Schema(format!("eth_call 返回非十六进制数据: {err}")))?;
        abi::decode_uint(&bytes)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, RpcError> {
        let raw: Option<RawReceipt> = self
            .transport
            .call("eth_getTransactionReceipt", json!([hash]))
            .await?;
        raw.map(receipt_from_raw).transpose()
    }
}

#[async_trait]
impl FeeOracle for EvmJsonRpcClient {
    async fn fee_data(&self) -> Result<NetworkFeeData, RpcError> {
        let metadata = LatencyMetadata::from_pairs([("chain", self.chain.to_string())]);
        let header: Option<BlockHeader> = measure_result(
            "rpc.fee_data",
            metadata,
            self.transport
                .call("eth_getBlockByNumber", json!(["latest", false])),
        )
        .await?;

        let base_fee = header
            .and_then(|header| header.base_fee_per_gas)
            .map(|raw| parse_quantity_u128(&raw))
            .transpose()?;

        let priority = match self
            .transport
            .call::<_, String>("eth_maxPriorityFeePerGas", Value::Array(Vec::new()))
            .await
        {
            Ok(raw) => Some(parse_quantity_u128(&raw)?),
            Err(err) => {
                warn!(target: "rpc::evm", chain = %self.chain, error = %err, "节点不支持 eth_maxPriorityFeePerGas");
                None
            }
        };

        Ok(fee_data_from_parts(base_fee, priority))
    }
}

#[async_trait]
impl ChainRpc for EvmJsonRpcClient {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn balance_of(&self, token: &Token, owner: Address) -> Result<U256, RpcError> {
        if token.is_native() {
            let raw: String = self
                .transport
                .call("eth_getBalance", json!([owner, "latest"]))
                .await?;
            return parse_quantity(&raw);
        }
        let contract = token
            .evm_address()
            .map_err(|err| RpcError::Schema(err.to_string()))?;
        self.eth_call(contract, abi::balance_of(owner)).await
    }

    async fn allowance(&self, token: &Token, owner: Address, spender: Address) -> Result<U256, RpcError> {
        if token.is_native() {
            return Ok(U256::MAX);
        }
        let contract = token
            .evm_address()
            .map_err(|err| RpcError::Schema(err.to_string()))?;
        self.eth_call(contract, abi::allowance(owner, spender)).await
    }

    async fn wait_for_receipt(&self, hash: TxHash, timeout: Duration) -> Result<TxReceipt, RpcError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(err) => {
                    debug!(target: "rpc::evm", chain = %self.chain, %hash, error = %err, "查询回执失败，继续轮询");
                }
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(RpcError::ConfirmationTimeout { hash, timeout });
            }
            sleep(self.poll_interval).await;
        }
    }
}

fn fee_data_from_parts(base_fee: Option<u128>, priority: Option<u128>) -> NetworkFeeData {
    let max_fee = match (base_fee, priority) {
        (Some(base), Some(tip)) => Some(base.saturating_mul(2).saturating_add(tip)),
        _ => None,
    };
    NetworkFeeData {
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: priority,
    }
}

fn receipt_from_raw(raw: RawReceipt) -> Result<TxReceipt, RpcError> {
    let success = match raw.status.as_deref() {
        Some(status) => parse_quantity(status)? == U256::from(1u8),
        None => true,
    };
    let block_number = raw
        .block_number
        .as_deref()
        .map(parse_quantity_u64)
        .transpose()?;
    Ok(TxReceipt {
        hash: raw.transaction_hash,
        success,
        block_number,
    })
}

pub(crate) fn parse_quantity(raw: &str) -> Result<U256, RpcError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| RpcError::Schema(format!("数量缺少 0x 前缀: {raw}")))?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|err| RpcError::Schema(format!("数量非法 {raw}: {err}")))
}

fn parse_quantity_u128(raw: &str) -> Result<u128, RpcError> {
    let value = parse_quantity(raw)?;
    u128::try_from(value).map_err(|_| RpcError::Schema(format!("数量超出 u128: {raw}")))
}

fn parse_quantity_u64(raw: &str) -> Result<u64, RpcError> {
    let value = parse_quantity(raw)?;
    u64::try_from(value).map_err(|_| RpcError::Schema(format!("数量超出 u64: {raw}")))
}
