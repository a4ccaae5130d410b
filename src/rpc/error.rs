use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::catalog::ChainId;

use super::TxHash;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC 传输错误: {0}")]
    Transport(String),
    #[error("RPC 返回错误 {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("RPC 响应格式异常: {0}")]
    Schema(String),
    #[error("链 {0} 未配置 RPC 端点")]
    MissingEndpoint(ChainId),
    #[error("链 {0} 不支持 EVM 调用")]
    UnsupportedChain(ChainId),
    #[error("交易 {hash} 在 {timeout:?} 内未确认")]
    ConfirmationTimeout { hash: TxHash, timeout: Duration },
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        match self {
            RpcError::Http(err) => err.is_timeout(),
            RpcError::ConfirmationTimeout { .. } => true,
            _ => false,
        }
    }
}
