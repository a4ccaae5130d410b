//! 钱包能力抽象与切链协调。

pub mod json_rpc;
pub mod switch;
pub mod wallet;

pub use json_rpc::JsonRpcWallet;
pub use switch::{ChainSwitchCoordinator, ChainSwitchError, SwitchOutcome};
pub use wallet::{
    ChainDefinition, NativeCurrencyDefinition, UnsignedTx, WalletCapability, WalletError,
};
