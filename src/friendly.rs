//! 原始 RPC / 报价服务错误 → 面向用户的一句话提示。
//!
//! 原始错误只写日志，展示层只看到这里固定的几类文案。

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FriendlyCategory {
    Balance,
    Slippage,
    Gas,
    Approval,
    Timeout,
    Generic,
}

const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "deadline", "超时"];
const APPROVAL_PATTERNS: &[&str] = &["allowance", "approve", "not approved", "授权"];
const BALANCE_PATTERNS: &[&str] = &[
    "insufficient funds",
    "insufficient balance",
    "exceeds balance",
    "余额不足",
];
const SLIPPAGE_PATTERNS: &[&str] = &[
    "slippage",
    "price impact",
    "too little received",
    "insufficient output",
    "return amount is not enough",
    "滑点",
];
const GAS_PATTERNS: &[&str] = &[
    "gas",
    "fee cap",
    "underpriced",
    "max fee",
    "base fee",
    "intrinsic",
];

impl FriendlyCategory {
    /// 按关键字归类；顺序有意义：超时优先，"insufficient funds for gas" 归为余额。
    pub fn classify(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let contains_any = |patterns: &[&str]| patterns.iter().any(|p| lowered.contains(p));

        if contains_any(TIMEOUT_PATTERNS) {
            FriendlyCategory::Timeout
        } else if contains_any(APPROVAL_PATTERNS) {
            FriendlyCategory::Approval
        } else if contains_any(BALANCE_PATTERNS) {
            FriendlyCategory::Balance
        } else if contains_any(SLIPPAGE_PATTERNS) {
            FriendlyCategory::Slippage
        } else if contains_any(GAS_PATTERNS) {
            FriendlyCategory::Gas
        } else {
            FriendlyCategory::Generic
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            FriendlyCategory::Balance => "余额不足，请减少金额后重试。",
            FriendlyCategory::Slippage => "价格波动超出滑点容忍度，请调高滑点或稍后重试。",
            FriendlyCategory::Gas => "网络手续费估算失败，请稍后重试。",
            FriendlyCategory::Approval => "代币授权未完成，请重新授权后再试。",
            FriendlyCategory::Timeout => "请求超时，请检查网络后重试。",
            FriendlyCategory::Generic => "操作失败，请稍后重试。",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FriendlyCategory::Balance => "balance",
            FriendlyCategory::Slippage => "slippage",
            FriendlyCategory::Gas => "gas",
            FriendlyCategory::Approval => "approval",
            FriendlyCategory::Timeout => "timeout",
            FriendlyCategory::Generic => "generic",
        }
    }
}

impl fmt::Display for FriendlyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_rpc_errors() {
        assert_eq!(
            FriendlyCategory::classify("insufficient funds for gas * price + value"),
            FriendlyCategory::Balance
        );
        assert_eq!(
            FriendlyCategory::classify("ERC20: transfer amount exceeds allowance"),
            FriendlyCategory::Approval
        );
        assert_eq!(
            FriendlyCategory::classify("execution reverted: Too little received"),
            FriendlyCategory::Slippage
        );
        assert_eq!(
            FriendlyCategory::classify("replacement transaction underpriced"),
            FriendlyCategory::Gas
        );
        assert_eq!(
            FriendlyCategory::classify("request to https://rpc timed out"),
            FriendlyCategory::Timeout
        );
        assert_eq!(
            FriendlyCategory::classify("something odd"),
            FriendlyCategory::Generic
        );
    }

    #[test]
    fn messages_are_single_sentences() {
        for category in [
            FriendlyCategory::Balance,
            FriendlyCategory::Slippage,
            FriendlyCategory::Gas,
            FriendlyCategory::Approval,
            FriendlyCategory::Timeout,
            FriendlyCategory::Generic,
        ] {
            let message = category.message();
            assert_eq!(message.matches('。').count(), 1, "{message}");
        }
    }
}
