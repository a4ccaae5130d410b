//! EIP-1559 手续费规划：交易类型决定 gas limit，紧急度决定倍率与兜底值。

pub mod strategy;
pub mod types;

pub use strategy::{FeeSource, GasStrategy};
pub use types::{FeeOracle, GWEI, GasPlan, GasTxType, NetworkFeeData, TxKind, Urgency};
