//! meridian：跨链转账编排与报价引擎。
//!
//! 负责报价防抖与过期丢弃、费用估算、分级 gas 策略、授权 + 存入/兑换的多步链上流程、
//! 钱包网络同步，以及带退避重试的 TVL 缓存。

pub mod cache;
pub mod catalog;
pub mod chain;
pub mod cli;
pub mod config;
pub mod fees;
pub mod friendly;
pub mod gas;
pub mod monitoring;
pub mod orchestrator;
pub mod quote;
pub mod rpc;
pub mod transfer;

pub use catalog::{Chain, ChainCatalog, ChainFamily, ChainId, Token, TokenKey, Vault};
pub use transfer::{SlippageSpec, TransferRequest};
