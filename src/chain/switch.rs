use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{ChainCatalog, ChainId};
use crate::monitoring::events;

use super::wallet::{ChainDefinition, WalletCapability, WalletError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    AlreadyOnChain,
    Switched,
    AddedAndSwitched,
}

impl SwitchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchOutcome::AlreadyOnChain => "already_on_chain",
            SwitchOutcome::Switched => "switched",
            SwitchOutcome::AddedAndSwitched => "added_and_switched",
        }
    }
}

/// 切链失败，`reason` 为可直接展示的一句话。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ChainSwitchError {
    pub required: ChainId,
    pub reason: String,
}

impl ChainSwitchError {
    fn new(required: ChainId, reason: impl Into<String>) -> Self {
        Self {
            required,
            reason: reason.into(),
        }
    }
}

/// 保证钱包当前网络与转账所需网络一致。
#[derive(Debug, Clone)]
pub struct ChainSwitchCoordinator {
    catalog: Arc<ChainCatalog>,
}

impl ChainSwitchCoordinator {
    pub fn new(catalog: Arc<ChainCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn ensure<W>(&self, wallet: &W, required: ChainId) -> Result<SwitchOutcome, ChainSwitchError>
    where
        W: WalletCapability + ?Sized,
    {
        let result = self.ensure_inner(wallet, required).await;
        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "failed",
        };
        events::chain_switch(required, label);
        result
    }

    async fn ensure_inner<W>(&self, wallet: &W, required: ChainId) -> Result<SwitchOutcome, ChainSwitchError>
    where
        W: WalletCapability + ?Sized,
    {
        let current = wallet
            .current_chain()
            .await
            .map_err(|err| self.reject(required, err))?;
        if current == required {
            return Ok(SwitchOutcome::AlreadyOnChain);
        }

        info!(target: "chain::switch", from = %current, to = %required, "请求钱包切换网络");
        match wallet.switch_chain(required).await {
            Ok(()) => Ok(SwitchOutcome::Switched),
            Err(WalletError::UnknownChain(_)) => {
                let chain = self.catalog.chain(required).ok_or_else(|| {
                    ChainSwitchError::new(required, format!("目录中没有链 {required} 的定义，无法添加到钱包。"))
                })?;
                let definition = ChainDefinition::from(chain);
                info!(target: "chain::switch", chain = %required, name = %chain.name, "钱包未知该链，尝试添加网络");
                wallet
                    .add_chain(&definition)
                    .await
                    .map_err(|err| self.reject(required, err))?;
                wallet
                    .switch_chain(required)
                    .await
                    .map_err(|err| self.reject(required, err))?;
                Ok(SwitchOutcome::AddedAndSwitched)
            }
            Err(err) => Err(self.reject(required, err)),
        }
    }

    fn reject(&self, required: ChainId, err: WalletError) -> ChainSwitchError {
        warn!(target: "chain::switch", chain = %required, error = %err, "切换网络失败");
        let name = self
            .catalog
            .chain(required)
            .map(|chain| chain.name.clone())
            .unwrap_or_else(|| required.to_string());
        let reason = match err {
            WalletError::UserRejected => format!("你已拒绝切换到 {name}。"),
            WalletError::UnknownChain(_) => format!("钱包无法识别 {name}，请手动添加该网络。"),
            WalletError::Unsupported(_) => format!("当前钱包不支持切换到 {name}。"),
            WalletError::Rpc { .. } | WalletError::Transport(_) => {
                format!("切换到 {name} 失败，请在钱包中手动切换。")
            }
        };
        ChainSwitchError::new(required, reason)
    }
}
