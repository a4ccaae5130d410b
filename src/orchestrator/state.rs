use std::fmt;

use alloy_primitives::U256;

use crate::catalog::ChainId;
use crate::gas::TxKind;
use crate::rpc::TxHash;

/// 单次转账的步骤指针，只存在于本次执行期间。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferStep {
    #[default]
    Idle,
    ChainVerified,
    QuoteAccepted,
    Swapped,
    AwaitingArrival,
    BalanceChecked,
    AllowanceChecked,
    AllowanceReset,
    Approved,
    Deposited,
    Withdrawn,
    Done,
    /// 已广播但确认超时，结果未知。
    Pending { hash: TxHash },
    Failed { step: String, message: String },
}

impl TransferStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStep::Idle => "idle",
            TransferStep::ChainVerified => "chain_verified",
            TransferStep::QuoteAccepted => "quote_accepted",
            TransferStep::Swapped => "swapped",
            TransferStep::AwaitingArrival => "awaiting_arrival",
            TransferStep::BalanceChecked => "balance_checked",
            TransferStep::AllowanceChecked => "allowance_checked",
            TransferStep::AllowanceReset => "allowance_reset",
            TransferStep::Approved => "approved",
            TransferStep::Deposited => "deposited",
            TransferStep::Withdrawn => "withdrawn",
            TransferStep::Done => "done",
            TransferStep::Pending { .. } => "pending",
            TransferStep::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStep::Done | TransferStep::Pending { .. } | TransferStep::Failed { .. }
        )
    }
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStep::Pending { hash } => write!(f, "pending({hash})"),
            TransferStep::Failed { step, message } => write!(f, "failed({step}): {message}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// 由链上余额与授权额度读数推导，不持久化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalState {
    #[default]
    NotChecked,
    InsufficientBalance,
    /// 现有额度非零但不足：先归零再授权。
    NeedsReset,
    NeedsApproval,
    Approved,
}

impl ApprovalState {
    pub fn assess(balance: U256, allowance: U256, required: U256) -> Self {
        if balance < required {
            ApprovalState::InsufficientBalance
        } else if allowance >= required {
            ApprovalState::Approved
        } else if allowance > U256::ZERO {
            ApprovalState::NeedsReset
        } else {
            ApprovalState::NeedsApproval
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalState::NotChecked => "not_checked",
            ApprovalState::InsufficientBalance => "insufficient_balance",
            ApprovalState::NeedsReset => "needs_reset",
            ApprovalState::NeedsApproval => "needs_approval",
            ApprovalState::Approved => "approved",
        }
    }
}

/// 已广播的一笔链上写入。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub kind: TxKind,
    pub chain: ChainId,
    pub hash: TxHash,
    pub explorer_url: Option<String>,
}

/// 通过 `watch` 通道发布的进度快照。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub action: Option<&'static str>,
    pub step: TransferStep,
    pub writes: usize,
}
