use std::error::Error as _;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::catalog::{CatalogError, ChainId};
use crate::chain::{ChainSwitchError, WalletError};
use crate::friendly::FriendlyCategory;
use crate::rpc::{RpcError, TxHash};
use crate::transfer::AmountError;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("已有转账在执行")]
    Busy,
    #[error("网络不匹配: {0}")]
    WrongNetwork(#[from] ChainSwitchError),
    #[error("{symbol} 余额不足: 需要 {required}，可用 {available}")]
    InsufficientBalance {
        symbol: String,
        required: Decimal,
        available: Decimal,
    },
    #[error("{symbol} 授权额度不足: 需要 {required}，链上 {approved}")]
    InsufficientAllowance {
        symbol: String,
        required: Decimal,
        approved: Decimal,
    },
    #[error("没有已采纳的报价")]
    NoAcceptedQuote,
    #[error("路由 {0} 未附带可执行交易")]
    RouteNotExecutable(String),
    #[error("报价输出 {output} 与金库资产 {asset} 不一致")]
    FundingMismatch { output: String, asset: String },
    #[error("{step} 阶段钱包错误: {source}")]
    Wallet {
        step: &'static str,
        #[source]
        source: WalletError,
    },
    #[error("{step} 阶段 RPC 错误: {source}")]
    Rpc {
        step: &'static str,
        #[source]
        source: RpcError,
    },
    #[error("{step} 交易 {hash} 执行失败（revert）")]
    Reverted { step: &'static str, hash: TxHash },
    #[error("{step} 交易 {hash} 尚未确认")]
    Pending {
        step: &'static str,
        hash: TxHash,
        explorer_url: Option<String>,
    },
    #[error("跨链资金在 {waited_secs}s 内未到达链 {chain}")]
    ArrivalTimeout { chain: ChainId, waited_secs: u64 },
    #[error("兑换 {swap_hash} 已完成，但后续存入失败，资金停留在 {holding}: {source}")]
    PartialFailure {
        swap_hash: TxHash,
        holding: String,
        #[source]
        source: Box<TransferError>,
    },
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl TransferError {
    pub fn describe(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }

    /// 失败发生的步骤名，用于 `TransferStep::Failed`。
    pub fn step(&self) -> &'static str {
        match self {
            TransferError::Busy => "idle",
            TransferError::WrongNetwork(_) => "chain_verified",
            TransferError::InsufficientBalance { .. } => "balance_checked",
            TransferError::InsufficientAllowance { .. } => "approved",
            TransferError::NoAcceptedQuote
            | TransferError::RouteNotExecutable(_)
            | TransferError::FundingMismatch { .. } => "quote_accepted",
            TransferError::Wallet { step, .. }
            | TransferError::Rpc { step, .. }
            | TransferError::Reverted { step, .. }
            | TransferError::Pending { step, .. } => *step,
            TransferError::ArrivalTimeout { .. } => "awaiting_arrival",
            TransferError::PartialFailure { source, .. } => source.step(),
            TransferError::Amount(_) | TransferError::Catalog(_) => "idle",
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            TransferError::Pending { .. } => "pending",
            TransferError::PartialFailure { .. } => "partial",
            TransferError::Busy => "busy",
            _ => "failed",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TransferError::Pending { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            TransferError::Busy => "已有转账在进行中，请等待完成。".to_string(),
            TransferError::WrongNetwork(err) => err.reason.clone(),
            TransferError::InsufficientBalance { .. } => FriendlyCategory::Balance.message().to_string(),
            TransferError::InsufficientAllowance { .. } => {
                FriendlyCategory::Approval.message().to_string()
            }
            TransferError::NoAcceptedQuote | TransferError::RouteNotExecutable(_) => {
                "报价已失效，请等待新的报价后重试。".to_string()
            }
            TransferError::Wallet {
                source: WalletError::UserRejected,
                ..
            } => "你已在钱包中取消交易。".to_string(),
            TransferError::Reverted { step, .. } => format!("{step} 交易在链上执行失败，请重新发起。"),
            TransferError::Pending { explorer_url, .. } => match explorer_url {
                Some(url) => format!("交易已提交但尚未确认，请在浏览器中查看: {url}"),
                None => "交易已提交但尚未确认，请稍后在浏览器中查看。".to_string(),
            },
            TransferError::ArrivalTimeout { .. } => "跨链资金尚未到账，请稍后查看余额。".to_string(),
            TransferError::PartialFailure { holding, .. } => {
                format!("兑换已完成但存入失败，资金目前为 {holding}，请手动存入。")
            }
            other => FriendlyCategory::classify(&other.describe()).message().to_string(),
        }
    }
}
