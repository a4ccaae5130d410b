use std::fmt;

use alloy_primitives::{Address, Bytes, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::ChainId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub String);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 路由附带的可执行交易。`approval_address` 为需要授权的合约（通常是路由器）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTransaction {
    pub chain: ChainId,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub approval_address: Option<Address>,
    pub gas_limit: Option<u64>,
}

/// 报价服务返回的一条路由。收到后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub route_id: RouteId,
    pub expected_output_amount: Decimal,
    pub eta_seconds: Option<u64>,
    pub protocol_fee_bps: Option<u32>,
    pub relayer_fee_estimate: Option<Decimal>,
    pub source_token_price_usd: Option<Decimal>,
    pub destination_token_price_usd: Option<Decimal>,
    pub transaction: Option<RouteTransaction>,
}

impl Quote {
    pub fn new(route_id: impl Into<String>, expected_output_amount: Decimal) -> Self {
        Self {
            route_id: RouteId(route_id.into()),
            expected_output_amount,
            eta_seconds: None,
            protocol_fee_bps: None,
            relayer_fee_estimate: None,
            source_token_price_usd: None,
            destination_token_price_usd: None,
            transaction: None,
        }
    }

    pub fn with_eta(mut self, seconds: u64) -> Self {
        self.eta_seconds = Some(seconds);
        self
    }

    pub fn with_protocol_fee_bps(mut self, bps: u32) -> Self {
        self.protocol_fee_bps = Some(bps);
        self
    }

    pub fn with_relayer_fee(mut self, fee: Decimal) -> Self {
        self.relayer_fee_estimate = Some(fee);
        self
    }

    pub fn with_prices(mut self, source: Option<Decimal>, destination: Option<Decimal>) -> Self {
        self.source_token_price_usd = source;
        self.destination_token_price_usd = destination;
        self
    }

    pub fn with_transaction(mut self, transaction: RouteTransaction) -> Self {
        self.transaction = Some(transaction);
        self
    }
}
