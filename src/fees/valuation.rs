use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::quote::Quote;
use crate::transfer::TransferRequest;

const BPS_DENOMINATOR: u32 = 10_000;

/// 费用的计价单位。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeDenomination {
    Usd,
    /// 两侧都没有价格、且是同一资产时，以源代币数量计价。
    SourceToken(String),
}

impl fmt::Display for FeeDenomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeDenomination::Usd => f.write_str("USD"),
            FeeDenomination::SourceToken(symbol) => f.write_str(symbol),
        }
    }
}

/// 由最新报价与输入金额推导出的展示数据。缺失值与溢出都保持 `None`，不当作零。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub denomination: Option<FeeDenomination>,
    pub input_value: Option<Decimal>,
    pub output_value: Option<Decimal>,
    /// 输入价值 − 输出价值，已包含滑点与价格变动。
    pub total_fee: Option<Decimal>,
    pub protocol_fee: Option<Decimal>,
    pub relayer_fee: Option<Decimal>,
    pub eta_seconds: Option<u64>,
    /// 目标价格缺失、同链时借用了源代币价格。
    pub destination_price_approximated: bool,
}

impl FeeBreakdown {
    pub fn derive(request: &TransferRequest, quote: &Quote) -> Self {
        let input_amount = request.amount;
        let output_amount = quote.expected_output_amount;
        let source_price = quote.source_token_price_usd;

        let mut destination_price_approximated = false;
        let destination_price = match quote.destination_token_price_usd {
            Some(price) => Some(price),
            None if !request.is_cross_chain() && source_price.is_some() => {
                destination_price_approximated = true;
                source_price
            }
            None => None,
        };

        let (denomination, input_value, output_value) = match (source_price, destination_price) {
            (Some(source), Some(destination)) => (
                Some(FeeDenomination::Usd),
                input_amount.checked_mul(source),
                output_amount.checked_mul(destination),
            ),
            (None, None) if is_same_asset(request) => (
                Some(FeeDenomination::SourceToken(request.source_token.symbol.clone())),
                Some(input_amount),
                Some(output_amount),
            ),
            (Some(source), None) => (None, input_amount.checked_mul(source), None),
            (None, Some(destination)) => (None, None, output_amount.checked_mul(destination)),
            (None, None) => (None, None, None),
        };

        let total_fee = match (input_value, output_value) {
            (Some(input), Some(output)) if denomination.is_some() => input.checked_sub(output),
            _ => None,
        };

        let protocol_fee = quote.protocol_fee_bps.and_then(|bps| {
            let reference = if denomination.is_some() {
                input_value?
            } else {
                input_amount.checked_mul(source_price?)?
            };
            reference
                .checked_mul(Decimal::from(bps))?
                .checked_div(Decimal::from(BPS_DENOMINATOR))
        });

        let breakdown = Self {
            denomination,
            input_value,
            output_value,
            total_fee,
            protocol_fee,
            relayer_fee: quote.relayer_fee_estimate,
            eta_seconds: quote.eta_seconds,
            destination_price_approximated,
        };

        debug!(
            target: "fees",
            route = %quote.route_id,
            denomination = ?breakdown.denomination,
            total_fee = ?breakdown.total_fee,
            protocol_fee = ?breakdown.protocol_fee,
            approximated = breakdown.destination_price_approximated,
            "费用推导完成"
        );
        breakdown
    }
}

fn is_same_asset(request: &TransferRequest) -> bool {
    match &request.destination_token {
        None => true,
        Some(destination) => {
            destination.symbol.eq_ignore_ascii_case(&request.source_token.symbol)
                && destination.decimals == request.source_token.decimals
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::catalog::{ChainId, Token};
    use crate::transfer::SlippageSpec;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("decimal")
    }

    fn token(chain: u64, symbol: &str, decimals: u8) -> Token {
        Token {
            chain: ChainId(chain),
            address: format!("0x{:040x}", chain),
            symbol: symbol.to_string(),
            decimals,
        }
    }

    fn request(amount: &str, source: Token, destination: Token) -> TransferRequest {
        let chain = destination.chain;
        TransferRequest::new(amount, source, Some(destination), chain, SlippageSpec::Auto)
            .expect("request")
    }

    #[test]
    fn weth_bridge_without_prices_uses_source_units() {
        let request = request("1.5", token(1, "WETH", 18), token(137, "WETH", 18));
        let quote = Quote::new("r1", dec("1.487")).with_protocol_fee_bps(5);
        let fees = FeeBreakdown::derive(&request, &quote);

        assert_eq!(fees.denomination, Some(FeeDenomination::SourceToken("WETH".into())));
        assert_eq!(fees.protocol_fee, Some(dec("0.00075")));
        assert_eq!(fees.total_fee, Some(dec("0.013")));
        assert_eq!(fees.relayer_fee, None);
        assert_eq!(fees.eta_seconds, None);
    }

    #[test]
    fn usd_valuation_uses_each_side_price() {
        let request = request("100", token(1, "USDC", 6), token(137, "WETH", 18));
        let quote = Quote::new("r2", dec("0.04"))
            .with_prices(Some(dec("1")), Some(dec("2450")))
            .with_protocol_fee_bps(10)
            .with_relayer_fee(dec("0.35"))
            .with_eta(120);
        let fees = FeeBreakdown::derive(&request, &quote);

        assert_eq!(fees.denomination, Some(FeeDenomination::Usd));
        assert_eq!(fees.input_value, Some(dec("100")));
        assert_eq!(fees.output_value, Some(dec("98")));
        assert_eq!(fees.total_fee, Some(dec("2")));
        assert_eq!(fees.protocol_fee, Some(dec("0.1")));
        assert_eq!(fees.relayer_fee, Some(dec("0.35")));
        assert_eq!(fees.eta_seconds, Some(120));
        assert!(!fees.destination_price_approximated);
    }

    #[test]
    fn same_chain_reuses_source_price() {
        let request = request("2", token(1, "WETH", 18), token(1, "STETH", 18));
        let quote = Quote::new("r3", dec("1.99")).with_prices(Some(dec("2000")), None);
        let fees = FeeBreakdown::derive(&request, &quote);

        assert!(fees.destination_price_approximated);
        assert_eq!(fees.total_fee, Some(dec("20")));
    }

    #[test]
    fn cross_chain_missing_destination_price_stays_unknown() {
        let request = request("2", token(1, "WETH", 18), token(137, "USDC", 6));
        let quote = Quote::new("r4", dec("3900"))
            .with_prices(Some(dec("2000")), None)
            .with_protocol_fee_bps(5);
        let fees = FeeBreakdown::derive(&request, &quote);

        assert!(!fees.destination_price_approximated);
        assert_eq!(fees.denomination, None);
        assert_eq!(fees.input_value, Some(dec("4000")));
        assert_eq!(fees.output_value, None);
        assert_eq!(fees.total_fee, None);
        assert_eq!(fees.protocol_fee, Some(dec("2")));
    }

    #[test]
    fn absent_protocol_fee_is_not_zero() {
        let request = request("1", token(1, "USDC", 6), token(10, "USDC", 6));
        let quote = Quote::new("r5", dec("0.99"));
        let fees = FeeBreakdown::derive(&request, &quote);
        assert_eq!(fees.protocol_fee, None);
        assert_eq!(fees.total_fee, Some(dec("0.01")));
    }

    #[test]
    fn overflowing_valuation_is_unknown() {
        let request = request("79228162514264337593543950335", token(1, "USDC", 6), token(1, "DAI", 18));
        let quote = Quote::new("r6", dec("1"))
            .with_prices(Some(dec("2")), Some(dec("1")))
            .with_protocol_fee_bps(5);
        let fees = FeeBreakdown::derive(&request, &quote);

        assert_eq!(fees.denomination, Some(FeeDenomination::Usd));
        assert_eq!(fees.input_value, None);
        assert_eq!(fees.output_value, Some(dec("1")));
        assert_eq!(fees.total_fee, None);
        assert_eq!(fees.protocol_fee, None);
    }

    #[test]
    fn derivation_is_deterministic() {
        let request = request("1.5", token(1, "WETH", 18), token(137, "WETH", 18));
        let quote = Quote::new("r1", dec("1.487")).with_protocol_fee_bps(5);
        assert_eq!(
            FeeBreakdown::derive(&request, &quote),
            FeeBreakdown::derive(&request, &quote)
        );
    }
}
