use rust_decimal::Decimal;

use crate::fees::{FeeBreakdown, FeeDenomination};
use crate::gas::GWEI;

const DISPLAY_DP: u32 = 6;

pub fn format_amount(value: Decimal, symbol: &str) -> String {
    format!("{} {symbol}", value.round_dp(DISPLAY_DP).normalize())
}

/// wei → gwei，保留三位小数。
pub fn format_gwei(wei: u128) -> String {
    let whole = wei / GWEI;
    let frac = (wei % GWEI) / 1_000_000;
    format!("{whole}.{frac:03} gwei")
}

fn format_value(value: Option<Decimal>, denomination: Option<&FeeDenomination>) -> String {
    match (value, denomination) {
        (Some(value), Some(FeeDenomination::Usd)) => {
            format!("${}", value.round_dp(2).normalize())
        }
        (Some(value), Some(FeeDenomination::SourceToken(symbol))) => format_amount(value, symbol),
        _ => "—".to_string(),
    }
}

/// 费用明细的逐行文本；缺失值显示为占位符而不是 0。
pub fn format_breakdown(breakdown: &FeeBreakdown) -> Vec<String> {
    let denomination = breakdown.denomination.as_ref();
    let mut lines = vec![
        format!("input value: {}", format_value(breakdown.input_value, denomination)),
        format!("output value: {}", format_value(breakdown.output_value, denomination)),
        format!("total fee: {}", format_value(breakdown.total_fee, denomination)),
        format!("protocol fee: {}", format_value(breakdown.protocol_fee, denomination)),
        format!("relayer fee: {}", format_value(breakdown.relayer_fee, denomination)),
    ];
    match breakdown.eta_seconds {
        Some(seconds) => lines.push(format!("eta: ~{seconds}s")),
        None => lines.push("eta: —".to_string()),
    }
    if breakdown.destination_price_approximated {
        lines.push("note: 目标代币价格缺失，按源代币价格估算".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gwei_keeps_three_decimals() {
        assert_eq!(format_gwei(1_500_000_000), "1.500 gwei");
        assert_eq!(format_gwei(30 * GWEI + 7_000_000), "30.007 gwei");
        assert_eq!(format_gwei(0), "0.000 gwei");
    }

    #[test]
    fn missing_values_render_as_placeholder() {
        let breakdown = FeeBreakdown {
            denomination: Some(FeeDenomination::SourceToken("USDC".to_string())),
            input_value: Some(Decimal::new(15, 1)),
            output_value: Some(Decimal::new(1487, 3)),
            total_fee: Some(Decimal::new(13, 3)),
            protocol_fee: None,
            relayer_fee: None,
            eta_seconds: None,
            destination_price_approximated: false,
        };
        let lines = format_breakdown(&breakdown);
        assert_eq!(lines[0], "input value: 1.5 USDC");
        assert_eq!(lines[2], "total fee: 0.013 USDC");
        assert_eq!(lines[3], "protocol fee: —");
        assert_eq!(lines[5], "eta: —");
    }

    #[test]
    fn usd_values_round_to_cents() {
        let breakdown = FeeBreakdown {
            denomination: Some(FeeDenomination::Usd),
            input_value: Some(Decimal::new(300_123, 2)),
            output_value: None,
            total_fee: None,
            protocol_fee: None,
            relayer_fee: None,
            eta_seconds: Some(45),
            destination_price_approximated: true,
        };
        let lines = format_breakdown(&breakdown);
        assert_eq!(lines[0], "input value: $3001.23");
        assert_eq!(lines[5], "eta: ~45s");
        assert_eq!(lines.len(), 7);
    }
}
