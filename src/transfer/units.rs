use std::str::FromStr;

use alloy_primitives::U256;
use rust_decimal::Decimal;

use super::AmountError;

const MAX_DECIMAL_SCALE: u8 = 28;

/// 解析用户输入的十进制金额字符串。
pub fn parse_amount(raw: &str) -> Result<Decimal, AmountError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    let value = Decimal::from_str(trimmed).map_err(|_| AmountError::Invalid(raw.to_string()))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AmountError::Negative(raw.to_string()));
    }
    Ok(value.normalize())
}

/// 十进制金额 → 链上最小单位，精确换算，不做四舍五入。
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative(amount.to_string()));
    }
    let normalized = amount.normalize();
    let scale = normalized.scale();
    if scale > u32::from(decimals) {
        return Err(AmountError::TooPrecise {
            amount: amount.to_string(),
            decimals,
        });
    }
    let mantissa = normalized.mantissa().unsigned_abs();
    let exponent = U256::from(u32::from(decimals) - scale);
    let factor = U256::from(10u8)
        .checked_pow(exponent)
        .ok_or_else(|| AmountError::Overflow(amount.to_string()))?;
    U256::from(mantissa)
        .checked_mul(factor)
        .ok_or_else(|| AmountError::Overflow(amount.to_string()))
}

/// 链上最小单位 → 十进制金额。超过 `Decimal` 表示范围时返回错误。
pub fn from_base_units(value: U256, decimals: u8) -> Result<Decimal, AmountError> {
    if decimals > MAX_DECIMAL_SCALE {
        return Err(AmountError::Overflow(value.to_string()));
    }
    let raw = i128::try_from(value).map_err(|_| AmountError::Overflow(value.to_string()))?;
    Decimal::try_from_i128_with_scale(raw, u32::from(decimals))
        .map(|amount| amount.normalize())
        .map_err(|_| AmountError::Overflow(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_units_are_exact() {
        let amount = parse_amount("1.5").expect("amount");
        assert_eq!(
            to_base_units(amount, 18).expect("units"),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert_eq!(to_base_units(amount, 6).expect("units"), U256::from(1_500_000u64));
    }

    #[test]
    fn too_precise_amount_is_rejected() {
        let amount = parse_amount("0.0000001").expect("amount");
        assert!(matches!(
            to_base_units(amount, 6),
            Err(AmountError::TooPrecise { decimals: 6, .. })
        ));
    }

    #[test]
    fn from_base_units_normalizes() {
        let value = from_base_units(U256::from(1_487_000u64), 6).expect("decimal");
        assert_eq!(value, Decimal::from_str("1.487").expect("decimal"));
    }

    #[test]
    fn negative_and_empty_input() {
        assert_eq!(parse_amount("  "), Err(AmountError::Empty));
        assert!(matches!(parse_amount("-2"), Err(AmountError::Negative(_))));
    }
}
