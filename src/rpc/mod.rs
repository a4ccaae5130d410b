pub mod abi;
pub mod error;
pub mod evm;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::catalog::{ChainCatalog, ChainFamily, ChainId, Token};
use crate::config::RpcConfig;
use crate::gas::FeeOracle;

pub use error::RpcError;
pub use evm::EvmJsonRpcClient;
pub use transport::JsonRpcTransport;

pub type TxHash = B256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// 编排器对单条链的只读能力。
#[async_trait]
pub trait ChainRpc: FeeOracle {
    fn chain(&self) -> ChainId;

    async fn balance_of(&self, token: &Token, owner: Address) -> Result<U256, RpcError>;

    async fn allowance(&self, token: &Token, owner: Address, spender: Address)
    -> Result<U256, RpcError>;

    /// 等待一个确认；超时返回 [`RpcError::ConfirmationTimeout`]。
    async fn wait_for_receipt(&self, hash: TxHash, timeout: Duration) -> Result<TxReceipt, RpcError>;
}

/// 调用期注入的链客户端集合，按链 id 查找。
#[derive(Clone, Default)]
pub struct ChainContext {
    clients: HashMap<ChainId, Arc<dyn ChainRpc>>,
}

impl ChainContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Arc<dyn ChainRpc>) -> Self {
        self.insert(client);
        self
    }

    pub fn insert(&mut self, client: Arc<dyn ChainRpc>) {
        self.clients.insert(client.chain(), client);
    }

    pub fn get(&self, chain: ChainId) -> Option<Arc<dyn ChainRpc>> {
        self.clients.get(&chain).cloned()
    }

    pub fn require(&self, chain: ChainId) -> Result<Arc<dyn ChainRpc>, RpcError> {
        self.get(chain).ok_or(RpcError::MissingEndpoint(chain))
    }

    /// 为目录中每条配置了端点的 EVM 链建立客户端。
    pub fn from_catalog(
        catalog: &ChainCatalog,
        client: reqwest::Client,
        config: &RpcConfig,
    ) -> Self {
        let mut context = Self::new();
        for chain in catalog
            .chains()
            .filter(|chain| chain.family == ChainFamily::Evm && chain.primary_rpc_url().is_some())
        {
            match EvmJsonRpcClient::new(chain, client.clone(), config) {
                Ok(rpc) => context.insert(Arc::new(rpc)),
                Err(err) => {
                    tracing::warn!(target: "rpc::evm", chain = %chain.id, error = %err, "跳过链客户端");
                }
            }
        }
        context
    }
}

impl std::fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut chains: Vec<_> = self.clients.keys().collect();
        chains.sort();
        f.debug_struct("ChainContext").field("chains", &chains).finish()
    }
}
