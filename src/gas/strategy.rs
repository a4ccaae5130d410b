use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::{debug, warn};

use crate::config::{GasConfig, GasLimitConfig, GasTierConfig, GasTiersConfig};
use crate::monitoring::events;

use super::types::{FeeOracle, GWEI, GasPlan, GasTxType, NetworkFeeData, TxKind, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeSource {
    Oracle,
    Fallback,
}

impl FeeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            FeeSource::Oracle => "oracle",
            FeeSource::Fallback => "fallback",
        }
    }
}

/// 按交易类型与紧急度生成 [`GasPlan`]。一次预言机读取，其余全部是纯计算，
/// 任何异常都退回档位固定值，不会让调用方失败。
#[derive(Debug, Clone)]
pub struct GasStrategy {
    limits: GasLimitConfig,
    tiers: GasTiersConfig,
}

impl Default for GasStrategy {
    fn default() -> Self {
        Self::new(&GasConfig::default())
    }
}

impl GasStrategy {
    pub fn new(config: &GasConfig) -> Self {
        Self {
            limits: config.limits.clone(),
            tiers: config.tiers.clone(),
        }
    }

    pub fn gas_limit(&self, kind: TxKind) -> u64 {
        match kind {
            TxKind::Approval => self.limits.approval,
            TxKind::Deposit => self.limits.deposit,
            TxKind::Withdrawal => self.limits.withdrawal,
            TxKind::Swap => self.limits.swap,
            TxKind::AllowanceReset => self.limits.allowance_reset,
        }
    }

    pub fn tier(&self, urgency: Urgency) -> &GasTierConfig {
        match urgency {
            Urgency::Low => &self.tiers.low,
            Urgency::Medium => &self.tiers.medium,
            Urgency::High => &self.tiers.high,
            Urgency::VeryHigh => &self.tiers.very_high,
        }
    }

    pub async fn plan<O>(&self, oracle: &O, kind: TxKind, urgency: Urgency) -> GasPlan
    where
        O: FeeOracle + ?Sized,
    {
        self.plan_with_limit(oracle, kind, urgency, None).await
    }

    pub async fn plan_with_limit<O>(
        &self,
        oracle: &O,
        kind: TxKind,
        urgency: Urgency,
        gas_limit_override: Option<u64>,
    ) -> GasPlan
    where
        O: FeeOracle + ?Sized,
    {
        let fee_data = match oracle.fee_data().await {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(
                    target: "gas",
                    kind = kind.as_str(),
                    urgency = urgency.as_str(),
                    error = %err,
                    "读取网络费率失败，使用固定档位"
                );
                None
            }
        };
        self.plan_from(kind, urgency, fee_data, gas_limit_override)
    }

    /// 纯函数部分：给定预言机结果算出计划。
    pub fn plan_from(
        &self,
        kind: TxKind,
        urgency: Urgency,
        fee_data: Option<NetworkFeeData>,
        gas_limit_override: Option<u64>,
    ) -> GasPlan {
        let gas_limit = gas_limit_override.unwrap_or_else(|| self.gas_limit(kind));
        let tier = self.tier(urgency);

        let (plan, source) = match fee_data
            .and_then(|data| data.usable())
            .and_then(|(max_fee, priority)| scaled_fees(tier, max_fee, priority))
        {
            Some((max_fee, priority)) => (build_plan(gas_limit, max_fee, priority), FeeSource::Oracle),
            None => {
                let (max_fee, priority) = fallback_fees(tier);
                (build_plan(gas_limit, max_fee, priority), FeeSource::Fallback)
            }
        };

        debug!(
            target: "gas",
            kind = kind.as_str(),
            urgency = urgency.as_str(),
            source = source.as_str(),
            gas_limit = plan.gas_limit,
            max_fee_per_gas = plan.max_fee_per_gas,
            max_priority_fee_per_gas = plan.max_priority_fee_per_gas,
            "生成 gas 计划"
        );
        events::gas_plan(kind, urgency, source, &plan);
        plan
    }
}

fn build_plan(gas_limit: u64, max_fee: u128, priority: u128) -> GasPlan {
    GasPlan {
        gas_limit,
        max_fee_per_gas: max_fee.max(priority),
        max_priority_fee_per_gas: priority,
        tx_type: GasTxType::Eip1559,
    }
}

fn scaled_fees(tier: &GasTierConfig, max_fee: u128, priority: u128) -> Option<(u128, u128)> {
    let max_fee = scale(max_fee, tier.max_fee_multiplier)?;
    let priority = scale(priority, tier.priority_fee_multiplier)?;
    if max_fee == 0 {
        return None;
    }
    Some((max_fee, priority))
}

fn scale(value: u128, multiplier: Decimal) -> Option<u128> {
    let scaled = Decimal::from_u128(value)?.checked_mul(multiplier)?;
    scaled.ceil().to_u128()
}

fn fallback_fees(tier: &GasTierConfig) -> (u128, u128) {
    (
        gwei_to_wei(tier.fallback_max_fee_gwei),
        gwei_to_wei(tier.fallback_priority_fee_gwei),
    )
}

fn gwei_to_wei(gwei: Decimal) -> u128 {
    gwei.max(Decimal::ZERO)
        .checked_mul(Decimal::from_u128(GWEI).unwrap_or(Decimal::ZERO))
        .and_then(|wei| wei.ceil().to_u128())
        .unwrap_or(0)
}
