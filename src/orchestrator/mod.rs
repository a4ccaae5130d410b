//! 授权 + 存入 / 兑换的多步链上流程。
//!
//! 每一步广播后等待一个确认再前进；任何 revert 或 RPC 错误都会终止整个流程，
//! 链上写入不做自动重试。同一编排器同一时间只执行一笔转账。

pub mod error;
pub mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::catalog::{ChainCatalog, ChainId, Token, Vault};
use crate::chain::{ChainSwitchCoordinator, UnsignedTx, WalletCapability};
use crate::config::OrchestratorConfig;
use crate::gas::{GasStrategy, TxKind, Urgency};
use crate::monitoring::events;
use crate::quote::{Quote, QuoteEngine, RouteTransaction};
use crate::rpc::{ChainContext, ChainRpc, RpcError, TxReceipt, abi};
use crate::transfer::{TransferRequest, from_base_units, to_base_units};

pub use error::TransferError;
pub use state::{ApprovalState, SubmittedTx, TransferProgress, TransferStep};

/// 调用期注入的钱包与链客户端。
#[derive(Clone)]
pub struct WalletContext {
    pub wallet: Arc<dyn WalletCapability>,
    pub chains: ChainContext,
}

impl WalletContext {
    pub fn new(wallet: Arc<dyn WalletCapability>, chains: ChainContext) -> Self {
        Self { wallet, chains }
    }
}

/// 兑换 / 桥接腿：请求与对应的已采纳报价。
#[derive(Debug, Clone)]
pub struct Funding {
    pub request: TransferRequest,
    pub quote: Quote,
}

#[derive(Debug, Clone)]
pub enum TransferAction {
    VaultDeposit { vault: Vault, amount: Decimal },
    /// 先兑换 / 跨链，再以到账金额存入金库；两阶段，非原子。
    SwapAndDeposit { vault: Vault, funding: Funding },
    Withdrawal { vault: Vault, amount: Decimal },
    Swap(Funding),
}

impl TransferAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAction::VaultDeposit { .. } => "deposit",
            TransferAction::SwapAndDeposit { .. } => "swap_deposit",
            TransferAction::Withdrawal { .. } => "withdrawal",
            TransferAction::Swap(_) => "swap",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferReport {
    pub action: &'static str,
    pub writes: Vec<SubmittedTx>,
    pub final_step: TransferStep,
    /// 实际存入 / 取出的资产数量。
    pub settled_amount: Option<Decimal>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub confirmation_timeout: Duration,
    pub approval_urgency: Urgency,
    pub deposit_urgency: Urgency,
    pub swap_urgency: Urgency,
    pub arrival_timeout: Duration,
    pub arrival_poll_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_secs),
            approval_urgency: Urgency::Medium,
            deposit_urgency: config.deposit_urgency,
            swap_urgency: config.swap_urgency,
            arrival_timeout: Duration::from_secs(config.arrival_timeout_secs),
            arrival_poll_interval: Duration::from_millis(config.arrival_poll_interval_ms.max(1)),
        }
    }
}

pub struct TransferOrchestrator {
    catalog: Arc<ChainCatalog>,
    switcher: ChainSwitchCoordinator,
    gas: GasStrategy,
    settings: OrchestratorSettings,
    busy: AtomicBool,
    progress: watch::Sender<TransferProgress>,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 单次执行的步骤指针与已广播交易。
struct Run<'a> {
    action: &'static str,
    progress: &'a watch::Sender<TransferProgress>,
    writes: Vec<SubmittedTx>,
    started: Instant,
}

impl<'a> Run<'a> {
    fn new(action: &'static str, progress: &'a watch::Sender<TransferProgress>) -> Self {
        let run = Self {
            action,
            progress,
            writes: Vec::new(),
            started: Instant::now(),
        };
        run.publish(TransferStep::Idle);
        run
    }

    fn advance(&self, step: TransferStep) {
        events::transfer_step(self.action, step.as_str());
        self.publish(step);
    }

    fn record(&mut self, tx: SubmittedTx) {
        self.writes.push(tx);
        let writes = self.writes.len();
        self.progress.send_modify(|progress| progress.writes = writes);
    }

    fn publish(&self, step: TransferStep) {
        self.progress.send_replace(TransferProgress {
            action: Some(self.action),
            step,
            writes: self.writes.len(),
        });
    }
}

/// 一笔待广播的写入。
struct TxRequest {
    kind: TxKind,
    urgency: Urgency,
    to: Address,
    data: Bytes,
    value: U256,
    gas_limit: Option<u64>,
}

impl TransferOrchestrator {
    pub fn new(catalog: Arc<ChainCatalog>, gas: GasStrategy, settings: OrchestratorSettings) -> Self {
        let (progress, _) = watch::channel(TransferProgress::default());
        Self {
            switcher: ChainSwitchCoordinator::new(Arc::clone(&catalog)),
            catalog,
            gas,
            settings,
            busy: AtomicBool::new(false),
            progress,
        }
    }

    pub fn settings(&self) -> OrchestratorSettings {
        self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<TransferProgress> {
        self.progress.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn execute(
        &self,
        ctx: &WalletContext,
        action: TransferAction,
    ) -> Result<TransferReport, TransferError> {
        let label = action.as_str();
        let _flight = self.acquire(label)?;
        let mut run = Run::new(label, &self.progress);
        info!(target: "orchestrator", action = label, "开始转账流程");

        let outcome = match &action {
            TransferAction::VaultDeposit { vault, amount } => {
                self.deposit_flow(ctx, &mut run, vault, *amount).await
            }
            TransferAction::SwapAndDeposit { vault, funding } => {
                self.swap_and_deposit_flow(ctx, &mut run, vault, funding).await
            }
            TransferAction::Withdrawal { vault, amount } => {
                self.withdrawal_flow(ctx, &mut run, vault, *amount).await
            }
            TransferAction::Swap(funding) => self
                .swap_leg(ctx, &mut run, funding)
                .await
                .map(|_| Some(funding.quote.expected_output_amount)),
        };
        self.finish(run, outcome)
    }

    /// 用报价引擎当前采纳的报价执行兑换；给出金库时兑换后存入。执行期间暂停定时刷新。
    pub async fn execute_with_engine(
        &self,
        ctx: &WalletContext,
        engine: &QuoteEngine,
        vault: Option<Vault>,
    ) -> Result<TransferReport, TransferError> {
        let _pause = engine.begin_execution();
        let snapshot = engine.snapshot();
        let (Some(request), Some(quote)) = (snapshot.request, snapshot.quote) else {
            return Err(TransferError::NoAcceptedQuote);
        };
        let funding = Funding { request, quote };
        let action = match vault {
            Some(vault) => TransferAction::SwapAndDeposit { vault, funding },
            None => TransferAction::Swap(funding),
        };
        self.execute(ctx, action).await
    }

    /// 只做授权。额度已足够时零写入。
    pub async fn ensure_allowance(
        &self,
        ctx: &WalletContext,
        token: &Token,
        spender: Address,
        amount: Decimal,
    ) -> Result<TransferReport, TransferError> {
        let _flight = self.acquire("approve")?;
        let mut run = Run::new("approve", &self.progress);
        let outcome = async {
            self.verify_chain(ctx, &run, token.chain).await?;
            let rpc = self.rpc(ctx, token.chain)?;
            let owner = self.owner(ctx, "chain_verified").await?;
            let required = to_base_units(amount, token.decimals)?;
            if token.is_native() {
                run.advance(TransferStep::AllowanceChecked);
            } else {
                self.approve_exact(ctx, &mut run, rpc.as_ref(), token, owner, spender, required, None)
                    .await?;
            }
            Ok(Some(amount))
        }
        .await;
        self.finish(run, outcome)
    }

    fn acquire(&self, action: &'static str) -> Result<FlightGuard<'_>, TransferError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(target: "orchestrator", action, "已有转账在执行，拒绝并发请求");
            return Err(TransferError::Busy);
        }
        Ok(FlightGuard(&self.busy))
    }

    fn finish(
        &self,
        run: Run<'_>,
        outcome: Result<Option<Decimal>, TransferError>,
    ) -> Result<TransferReport, TransferError> {
        let elapsed = run.started.elapsed();
        let action = run.action;
        match outcome {
            Ok(settled_amount) => {
                run.advance(TransferStep::Done);
                events::transfer_finished(action, "done", run.writes.len(), elapsed);
                info!(
                    target: "orchestrator",
                    action,
                    writes = run.writes.len(),
                    settled = ?settled_amount,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "转账流程完成"
                );
                Ok(TransferReport {
                    action,
                    writes: run.writes,
                    final_step: TransferStep::Done,
                    settled_amount,
                    elapsed,
                })
            }
            Err(err) => {
                let step = match &err {
                    TransferError::Pending { hash, .. } => TransferStep::Pending { hash: *hash },
                    other => TransferStep::Failed {
                        step: other.step().to_string(),
                        message: other.user_message(),
                    },
                };
                run.advance(step);
                events::transfer_finished(action, err.outcome(), run.writes.len(), elapsed);
                warn!(
                    target: "orchestrator",
                    action,
                    step = err.step(),
                    writes = run.writes.len(),
                    error = %err.describe(),
                    "转账流程终止"
                );
                Err(err)
            }
        }
    }

    async fn deposit_flow(
        &self,
        ctx: &WalletContext,
        run: &mut Run<'_>,
        vault: &Vault,
        amount: Decimal,
    ) -> Result<Option<Decimal>, TransferError> {
        self.verify_chain(ctx, run, vault.chain).await?;
        let rpc = self.rpc(ctx, vault.chain)?;
        let owner = self.owner(ctx, "chain_verified").await?;
        let required = to_base_units(amount, vault.asset.decimals)?;
        self.deposit_into(ctx, run, rpc.as_ref(), vault, owner, required)
            .await?;
        Ok(Some(amount))
    }

    async fn swap_and_deposit_flow(
        &self,
        ctx: &WalletContext,
        run: &mut Run<'_>,
        vault: &Vault,
        funding: &Funding,
    ) -> Result<Option<Decimal>, TransferError> {
        let request = &funding.request;
        if !funds_vault_asset(request, vault) {
            let output = request
                .destination_token
                .as_ref()
                .unwrap_or(&request.source_token);
            return Err(TransferError::FundingMismatch {
                output: format!("{}@{}", output.symbol, request.destination_chain),
                asset: format!("{}@{}", vault.asset.symbol, vault.chain),
            });
        }

        let destination = self.rpc(ctx, vault.chain)?;
        let owner = self.owner(ctx, "quote_accepted").await?;
        let baseline = destination
            .balance_of(&vault.asset, owner)
            .await
            .map_err(|source| TransferError::Rpc {
                step: "quote_accepted",
                source,
            })?;
        let expected = to_base_units(funding.quote.expected_output_amount, vault.asset.decimals)?;

        let swap = self.swap_leg(ctx, run, funding).await?;

        let second_phase = async {
            let received = self
                .await_arrival(run, destination.as_ref(), &vault.asset, owner, baseline)
                .await?;
            let amount = received.min(expected);
            self.verify_chain(ctx, run, vault.chain).await?;
            self.deposit_into(ctx, run, destination.as_ref(), vault, owner, amount)
                .await?;
            Ok::<_, TransferError>(amount)
        }
        .await;

        match second_phase {
            Ok(amount) => Ok(Some(display_amount(amount, vault.asset.decimals))),
            // 已广播未确认的存入仍可能上链，不能报告为部分失败。
            Err(err @ TransferError::Pending { .. }) => Err(err),
            Err(source) => Err(TransferError::PartialFailure {
                swap_hash: swap.hash,
                holding: format!(
                    "{} {}@{}",
                    funding.quote.expected_output_amount, vault.asset.symbol, vault.chain
                ),
                source: Box::new(source),
            }),
        }
    }

    async fn withdrawal_flow(
        &self,
        ctx: &WalletContext,
        run: &mut Run<'_>,
        vault: &Vault,
        amount: Decimal,
    ) -> Result<Option<Decimal>, TransferError> {
        self.verify_chain(ctx, run, vault.chain).await?;
        let rpc = self.rpc(ctx, vault.chain)?;
        let owner = self.owner(ctx, "chain_verified").await?;
        let required = to_base_units(amount, vault.asset.decimals)?;
        self.submit(
            ctx,
            run,
            rpc.as_ref(),
            owner,
            TxRequest {
                kind: TxKind::Withdrawal,
                urgency: self.settings.deposit_urgency,
                to: vault.contract,
                data: abi::vault_withdraw(required, owner, owner),
                value: U256::ZERO,
                gas_limit: None,
            },
        )
        .await?;
        run.advance(TransferStep::Withdrawn);
        Ok(Some(amount))
    }

    /// 余额检查 → 授权 → 提交前重读余额 → 存入。
    async fn deposit_into(
        &self,
        ctx: &WalletContext,
        run: &mut Run<'_>,
        rpc: &dyn ChainRpc,
        vault: &Vault,
        owner: Address,
        required: U256,
    ) -> Result<(), TransferError> {
        let balance = self.check_balance(rpc, &vault.asset, owner, required).await?;
        run.advance(TransferStep::BalanceChecked);

        let value = if vault.asset.is_native() {
            run.advance(TransferStep::AllowanceChecked);
            required
        } else {
            self.approve_exact(
                ctx,
                run,
                rpc,
                &vault.asset,
                owner,
                vault.contract,
                required,
                Some(balance),
            )
            .await?;
            U256::ZERO
        };

        self.check_balance(rpc, &vault.asset, owner, required).await?;
        self.submit(
            ctx,
            run,
            rpc,
            owner,
            TxRequest {
                kind: TxKind::Deposit,
                urgency: self.settings.deposit_urgency,
                to: vault.contract,
                data: abi::vault_deposit(required, owner),
                value,
                gas_limit: None,
            },
        )
        .await?;
        run.advance(TransferStep::Deposited);
        Ok(())
    }

    /// 执行报价附带的交易；需要时先授权给路由合约。
    async fn swap_leg(
        &self,
        ctx: &WalletContext,
        run: &mut Run<'_>,
        funding: &Funding,
    ) -> Result<TxReceipt, TransferError> {
        let request = &funding.request;
        let quote = &funding.quote;
        let route = executable_route(quote)?;

        self.verify_chain(ctx, run, request.source_chain).await?;
        info!(
            target: "orchestrator",
            route = %quote.route_id,
            request = %request.describe(),
            expected_output = %quote.expected_output_amount,
            "采纳报价"
        );
        run.advance(TransferStep::QuoteAccepted);

        let rpc = self.rpc(ctx, request.source_chain)?;
        let owner = self.owner(ctx, "quote_accepted").await?;
        let token = &request.source_token;
        let required = to_base_units(request.amount, token.decimals)?;

        let balance = self.check_balance(rpc.as_ref(), token, owner, required).await?;
        run.advance(TransferStep::BalanceChecked);

        match route.approval_address {
            Some(spender) if !token.is_native() => {
                self.approve_exact(
                    ctx,
                    run,
                    rpc.as_ref(),
                    token,
                    owner,
                    spender,
                    required,
                    Some(balance),
                )
                .await?;
            }
            _ => run.advance(TransferStep::AllowanceChecked),
        }

        self.check_balance(rpc.as_ref(), token, owner, required).await?;
        let receipt = self
            .submit(
                ctx,
                run,
                rpc.as_ref(),
                owner,
                TxRequest {
                    kind: TxKind::Swap,
                    urgency: self.settings.swap_urgency,
                    to: route.to,
                    data: route.data.clone(),
                    value: route.value,
                    gas_limit: route.gas_limit,
                },
            )
            .await?;
        run.advance(TransferStep::Swapped);
        Ok(receipt)
    }

    /// 现有额度非零时先归零，再授权精确数量；从不授权无限额度。
    #[allow(clippy::too_many_arguments)]
    async fn approve_exact(
        &self,
        ctx: &WalletContext,
        run: &mut Run<'_>,
        rpc: &dyn ChainRpc,
        token: &Token,
        owner: Address,
        spender: Address,
        required: U256,
        balance: Option<U256>,
    ) -> Result<(), TransferError> {
        let token_address = token.evm_address()?;
        let allowance = rpc
            .allowance(token, owner, spender)
            .await
            .map_err(|source| TransferError::Rpc {
                step: "allowance_checked",
                source,
            })?;
        let state = ApprovalState::assess(balance.unwrap_or(U256::MAX), allowance, required);
        info!(
            target: "orchestrator",
            token = %token.symbol,
            %spender,
            %allowance,
            %required,
            state = state.as_str(),
            "授权检查"
        );
        run.advance(TransferStep::AllowanceChecked);

        match state {
            ApprovalState::Approved => return Ok(()),
            ApprovalState::InsufficientBalance => {
                return Err(insufficient_balance(
                    token,
                    required,
                    balance.unwrap_or_default(),
                ));
            }
            ApprovalState::NeedsReset => {
                self.submit(
                    ctx,
                    run,
                    rpc,
                    owner,
                    TxRequest {
                        kind: TxKind::AllowanceReset,
                        urgency: self.settings.approval_urgency,
                        to: token_address,
                        data: abi::approve(spender, U256::ZERO),
                        value: U256::ZERO,
                        gas_limit: None,
                    },
                )
                .await?;
                run.advance(TransferStep::AllowanceReset);
            }
            ApprovalState::NeedsApproval | ApprovalState::NotChecked => {}
        }

        self.submit(
            ctx,
            run,
            rpc,
            owner,
            TxRequest {
                kind: TxKind::Approval,
                urgency: self.settings.approval_urgency,
                to: token_address,
                data: abi::approve(spender, required),
                value: U256::ZERO,
                gas_limit: None,
            },
        )
        .await?;

        let approved = rpc
            .allowance(token, owner, spender)
            .await
            .map_err(|source| TransferError::Rpc {
                step: "approved",
                source,
            })?;
        if approved < required {
            return Err(TransferError::InsufficientAllowance {
                symbol: token.symbol.clone(),
                required: display_amount(required, token.decimals),
                approved: display_amount(approved, token.decimals),
            });
        }
        run.advance(TransferStep::Approved);
        Ok(())
    }

    /// 广播并等待一个确认。确认超时视为待定而非失败。
    async fn submit(
        &self,
        ctx: &WalletContext,
        run: &mut Run<'_>,
        rpc: &dyn ChainRpc,
        owner: Address,
        request: TxRequest,
    ) -> Result<TxReceipt, TransferError> {
        let step = request.kind.as_str();
        let chain = rpc.chain();
        let gas = self
            .gas
            .plan_with_limit(rpc, request.kind, request.urgency, request.gas_limit)
            .await;
        let tx = UnsignedTx {
            chain,
            from: owner,
            to: request.to,
            data: request.data,
            value: request.value,
            gas,
        };

        let hash = ctx
            .wallet
            .send_transaction(&tx)
            .await
            .map_err(|source| TransferError::Wallet { step, source })?;
        let hash_hex = hash.to_string();
        events::transaction_submitted(request.kind, chain, &hash_hex);
        let explorer_url = self
            .catalog
            .chain(chain)
            .and_then(|entry| entry.explorer_tx_url(&hash_hex));
        run.record(SubmittedTx {
            kind: request.kind,
            chain,
            hash,
            explorer_url: explorer_url.clone(),
        });

        let started = Instant::now();
        match rpc
            .wait_for_receipt(hash, self.settings.confirmation_timeout)
            .await
        {
            Ok(receipt) => {
                events::transaction_confirmed(request.kind, &hash_hex, receipt.success, started.elapsed());
                if receipt.success {
                    Ok(receipt)
                } else {
                    Err(TransferError::Reverted { step, hash })
                }
            }
            Err(RpcError::ConfirmationTimeout { .. }) => Err(TransferError::Pending {
                step,
                hash,
                explorer_url,
            }),
            Err(source) => Err(TransferError::Rpc { step, source }),
        }
    }

    async fn verify_chain(
        &self,
        ctx: &WalletContext,
        run: &Run<'_>,
        chain: ChainId,
    ) -> Result<(), TransferError> {
        self.switcher.ensure(ctx.wallet.as_ref(), chain).await?;
        run.advance(TransferStep::ChainVerified);
        Ok(())
    }

    async fn check_balance(
        &self,
        rpc: &dyn ChainRpc,
        token: &Token,
        owner: Address,
        required: U256,
    ) -> Result<U256, TransferError> {
        let balance = rpc
            .balance_of(token, owner)
            .await
            .map_err(|source| TransferError::Rpc {
                step: "balance_checked",
                source,
            })?;
        if balance < required {
            return Err(insufficient_balance(token, required, balance));
        }
        Ok(balance)
    }

    /// 轮询目标链余额直到跨链资金到账，返回相对基线的增量。
    async fn await_arrival(
        &self,
        run: &Run<'_>,
        rpc: &dyn ChainRpc,
        token: &Token,
        owner: Address,
        baseline: U256,
    ) -> Result<U256, TransferError> {
        run.advance(TransferStep::AwaitingArrival);
        let deadline = Instant::now() + self.settings.arrival_timeout;
        loop {
            match rpc.balance_of(token, owner).await {
                Ok(balance) if balance > baseline => {
                    let received = balance - baseline;
                    info!(
                        target: "orchestrator",
                        chain = %rpc.chain(),
                        token = %token.symbol,
                        %received,
                        "跨链资金已到账"
                    );
                    return Ok(received);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(target: "orchestrator", chain = %rpc.chain(), error = %err, "读取到账余额失败");
                }
            }
            if Instant::now() >= deadline {
                return Err(TransferError::ArrivalTimeout {
                    chain: rpc.chain(),
                    waited_secs: self.settings.arrival_timeout.as_secs(),
                });
            }
            sleep(self.settings.arrival_poll_interval).await;
        }
    }

    fn rpc(&self, ctx: &WalletContext, chain: ChainId) -> Result<Arc<dyn ChainRpc>, TransferError> {
        ctx.chains.require(chain).map_err(|source| TransferError::Rpc {
            step: "chain_verified",
            source,
        })
    }

    async fn owner(&self, ctx: &WalletContext, step: &'static str) -> Result<Address, TransferError> {
        ctx.wallet
            .address()
            .await
            .map_err(|source| TransferError::Wallet { step, source })
    }
}

fn executable_route(quote: &Quote) -> Result<&RouteTransaction, TransferError> {
    quote
        .transaction
        .as_ref()
        .ok_or_else(|| TransferError::RouteNotExecutable(quote.route_id.to_string()))
}

fn funds_vault_asset(request: &TransferRequest, vault: &Vault) -> bool {
    if request.destination_chain != vault.chain {
        return false;
    }
    match &request.destination_token {
        Some(token) => token.same_asset(&vault.asset),
        None => request
            .source_token
            .symbol
            .eq_ignore_ascii_case(&vault.asset.symbol),
    }
}

fn insufficient_balance(token: &Token, required: U256, available: U256) -> TransferError {
    TransferError::InsufficientBalance {
        symbol: token.symbol.clone(),
        required: display_amount(required, token.decimals),
        available: display_amount(available, token.decimals),
    }
}

fn display_amount(value: U256, decimals: u8) -> Decimal {
    from_base_units(value, decimals).unwrap_or(Decimal::MAX)
}
