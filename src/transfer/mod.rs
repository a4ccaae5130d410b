//! 用户输入的转账请求：每次输入变化都会重建，不持久化。

pub mod units;

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{ChainId, Token};

pub use units::{from_base_units, parse_amount, to_base_units};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("金额为空")]
    Empty,
    #[error("金额格式非法: {0}")]
    Invalid(String),
    #[error("金额不能为负: {0}")]
    Negative(String),
    #[error("金额 {amount} 超出代币精度 {decimals}")]
    TooPrecise { amount: String, decimals: u8 },
    #[error("金额超出可表示范围: {0}")]
    Overflow(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("滑点参数非法: {0}（可选 auto 或 0-10000 基点）")]
pub struct SlippageParseError(String);

/// 滑点：自动，或固定基点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SlippageSpec {
    #[default]
    Auto,
    Bps(u16),
}

impl SlippageSpec {
    pub fn bps(&self) -> Option<u16> {
        match self {
            SlippageSpec::Auto => None,
            SlippageSpec::Bps(value) => Some(*value),
        }
    }
}

impl FromStr for SlippageSpec {
    type Err = SlippageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(SlippageSpec::Auto);
        }
        match trimmed.parse::<u16>() {
            Ok(value) if value <= 10_000 => Ok(SlippageSpec::Bps(value)),
            _ => Err(SlippageParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for SlippageSpec {
    type Error = SlippageParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlippageSpec> for String {
    fn from(value: SlippageSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SlippageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlippageSpec::Auto => f.write_str("auto"),
            SlippageSpec::Bps(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount: Decimal,
    pub source_token: Token,
    /// 跨链桥接同一资产时为空。
    pub destination_token: Option<Token>,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub slippage: SlippageSpec,
}

impl TransferRequest {
    pub fn new(
        amount: &str,
        source_token: Token,
        destination_token: Option<Token>,
        destination_chain: ChainId,
        slippage: SlippageSpec,
    ) -> Result<Self, AmountError> {
        let amount = parse_amount(amount)?;
        Ok(Self {
            amount,
            source_chain: source_token.chain,
            source_token,
            destination_token,
            destination_chain,
            slippage,
        })
    }

    pub fn is_cross_chain(&self) -> bool {
        self.source_chain != self.destination_chain
    }

    /// 报价输出所在的代币。跨链且未指定目标代币时未知，源链地址不能代表目标链资产。
    pub fn output_token(&self) -> Option<&Token> {
        match &self.destination_token {
            Some(token) => Some(token),
            None if !self.is_cross_chain() => Some(&self.source_token),
            None => None,
        }
    }

    /// 零金额不值得向报价服务发请求。
    pub fn is_quotable(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn with_amount(&self, amount: Decimal) -> Self {
        Self {
            amount,
            ..self.clone()
        }
    }

    pub fn describe(&self) -> String {
        let destination = self
            .destination_token
            .as_ref()
            .map(|token| token.symbol.as_str())
            .unwrap_or(self.source_token.symbol.as_str());
        format!(
            "{} {}@{} -> {}@{}",
            self.amount, self.source_token.symbol, self.source_chain, destination, self.destination_chain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth(chain: u64) -> Token {
        Token {
            chain: ChainId(chain),
            address: "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619".to_string(),
            symbol: "WETH".to_string(),
            decimals: 18,
        }
    }

    #[test]
    fn slippage_parses_auto_and_bps() {
        assert_eq!("AUTO".parse::<SlippageSpec>(), Ok(SlippageSpec::Auto));
        assert_eq!("50".parse::<SlippageSpec>(), Ok(SlippageSpec::Bps(50)));
        assert!("10001".parse::<SlippageSpec>().is_err());
        assert!("-1".parse::<SlippageSpec>().is_err());
    }

    #[test]
    fn request_tracks_chains_and_quotability() {
        let request =
            TransferRequest::new("1.5", weth(1), Some(weth(137)), ChainId(137), SlippageSpec::Auto)
                .expect("request");
        assert!(request.is_cross_chain());
        assert!(request.is_quotable());
        assert_eq!(request.source_chain, ChainId(1));

        let zero = request.with_amount(Decimal::ZERO);
        assert!(!zero.is_quotable());
    }

    #[test]
    fn request_rejects_garbage_amount() {
        let err = TransferRequest::new("abc", weth(1), None, ChainId(137), SlippageSpec::Auto)
            .unwrap_err();
        assert!(matches!(err, AmountError::Invalid(_)));
    }
}
