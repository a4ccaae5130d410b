use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::rpc::RpcError;

pub const GWEI: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Approval,
    Deposit,
    Withdrawal,
    Swap,
    AllowanceReset,
}

impl TxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Approval => "approval",
            TxKind::Deposit => "deposit",
            TxKind::Withdrawal => "withdrawal",
            TxKind::Swap => "swap",
            TxKind::AllowanceReset => "allowance_reset",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "approval" | "approve" => Ok(TxKind::Approval),
            "deposit" => Ok(TxKind::Deposit),
            "withdrawal" | "withdraw" => Ok(TxKind::Withdrawal),
            "swap" => Ok(TxKind::Swap),
            "allowance_reset" | "reset" => Ok(TxKind::AllowanceReset),
            other => Err(format!("未知交易类型: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            "very_high" | "veryhigh" => Ok(Urgency::VeryHigh),
            other => Err(format!("未知紧急度: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasTxType {
    #[default]
    Eip1559,
}

/// 每笔交易现算的 EIP-1559 手续费参数，金额单位为 wei。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPlan {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub tx_type: GasTxType,
}

impl GasPlan {
    /// 最坏情况下的手续费上限（wei）。
    pub fn max_cost_wei(&self) -> u128 {
        self.max_fee_per_gas.saturating_mul(u128::from(self.gas_limit))
    }
}

/// 预言机报出的费率，字段缺失表示节点未提供。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkFeeData {
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl NetworkFeeData {
    pub fn new(max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        Self {
            max_fee_per_gas: Some(max_fee_per_gas),
            max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
        }
    }

    /// 最高费用为正才算可用；L2 上优先费为零是正常报价。
    pub fn usable(&self) -> Option<(u128, u128)> {
        match (self.max_fee_per_gas, self.max_priority_fee_per_gas) {
            (Some(max_fee), Some(priority)) if max_fee > 0 => Some((max_fee, priority)),
            _ => None,
        }
    }
}

#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn fee_data(&self) -> Result<NetworkFeeData, RpcError>;
}
