use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::catalog::{ChainCatalog, ChainId};
use crate::cli::args::{DepositCmd, WithdrawCmd};
use crate::cli::context::{build_http_client, build_wallet_context};
use crate::cli::utils::format_amount;
use crate::config::AppConfig;
use crate::gas::GasStrategy;
use crate::orchestrator::{
    Funding, OrchestratorSettings, TransferAction, TransferError, TransferOrchestrator,
    TransferReport, WalletContext,
};
use crate::quote::{QuoteProvider, RoutingApiClient};
use crate::transfer::{TransferRequest, parse_amount};

pub async fn handle_deposit_cmd(cmd: DepositCmd, config: &AppConfig, catalog: Arc<ChainCatalog>) -> Result<()> {
    let vault = catalog.require_vault(&cmd.vault)?.clone();
    let client = build_http_client(Duration::from_millis(config.rpc.timeout_ms))?;

    let action = match (cmd.from_chain, cmd.from_token.as_deref()) {
        (Some(chain), Some(symbol)) => {
            let source = catalog.require_token(ChainId(chain), symbol)?.clone();
            if source.same_asset(&vault.asset) {
                TransferAction::VaultDeposit {
                    vault,
                    amount: parse_amount(&cmd.amount)?,
                }
            } else {
                let request = TransferRequest::new(
                    &cmd.amount,
                    source,
                    Some(vault.asset.clone()),
                    vault.chain,
                    cmd.slippage,
                )?;
                let funding = fetch_funding(config, request).await?;
                TransferAction::SwapAndDeposit { vault, funding }
            }
        }
        _ => TransferAction::VaultDeposit {
            vault,
            amount: parse_amount(&cmd.amount)?,
        },
    };

    let ctx = build_wallet_context(config, &catalog, client)?;
    run_action(config, catalog, &ctx, action).await
}

pub async fn handle_withdraw_cmd(cmd: WithdrawCmd, config: &AppConfig, catalog: Arc<ChainCatalog>) -> Result<()> {
    let vault = catalog.require_vault(&cmd.vault)?.clone();
    let amount = parse_amount(&cmd.amount)?;
    let client = build_http_client(Duration::from_millis(config.rpc.timeout_ms))?;
    let ctx = build_wallet_context(config, &catalog, client)?;
    run_action(config, catalog, &ctx, TransferAction::Withdrawal { vault, amount }).await
}

/// 兑换 / 跨链腿必须带可执行交易，取第一条满足条件的路由。
async fn fetch_funding(config: &AppConfig, request: TransferRequest) -> Result<Funding> {
    let client = build_http_client(Duration::from_millis(config.quote.timeout_ms))?;
    let provider = RoutingApiClient::new(client, &config.quote);
    let quotes = provider.get_quote(&request).await.map_err(|err| {
        warn!(target: "quote::http", error = %err.describe(), "报价请求失败");
        anyhow!(err.user_message())
    })?;
    let quote = quotes
        .into_iter()
        .find(|quote| quote.transaction.is_some())
        .ok_or_else(|| anyhow!("没有可执行的路由：{}", request.describe()))?;
    info!(
        target: "orchestrator",
        route = %quote.route_id,
        expected = %quote.expected_output_amount,
        "已采纳报价"
    );
    Ok(Funding { request, quote })
}

async fn run_action(
    config: &AppConfig,
    catalog: Arc<ChainCatalog>,
    ctx: &WalletContext,
    action: TransferAction,
) -> Result<()> {
    let orchestrator = TransferOrchestrator::new(
        catalog,
        GasStrategy::new(&config.gas),
        OrchestratorSettings::from(&config.orchestrator),
    );
    let printer = spawn_progress_printer(&orchestrator);
    let symbol = settled_symbol(&action);
    let result = orchestrator.execute(ctx, action).await;
    printer.abort();

    match result {
        Ok(report) => {
            print_report(&report, &symbol);
            Ok(())
        }
        Err(err) => report_failure(err),
    }
}

fn spawn_progress_printer(orchestrator: &TransferOrchestrator) -> JoinHandle<()> {
    let mut progress = orchestrator.subscribe();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            println!("  · {} (writes: {})", snapshot.step, snapshot.writes);
        }
    })
}

fn settled_symbol(action: &TransferAction) -> String {
    match action {
        TransferAction::VaultDeposit { vault, .. }
        | TransferAction::SwapAndDeposit { vault, .. }
        | TransferAction::Withdrawal { vault, .. } => vault.asset.symbol.clone(),
        TransferAction::Swap(funding) => funding
            .request
            .destination_token
            .as_ref()
            .unwrap_or(&funding.request.source_token)
            .symbol
            .clone(),
    }
}

fn print_report(report: &TransferReport, symbol: &str) {
    println!(
        "✅ {} 完成，共 {} 笔交易，用时 {:.1}s",
        report.action,
        report.writes.len(),
        report.elapsed.as_secs_f64()
    );
    if let Some(amount) = report.settled_amount {
        println!("settled: {}", format_amount(amount, symbol));
    }
    for tx in &report.writes {
        match &tx.explorer_url {
            Some(url) => println!("  {} {}", tx.kind, url),
            None => println!("  {} {} (chain {})", tx.kind, tx.hash, tx.chain),
        }
    }
}

/// 已提交未确认不算失败，进程正常退出。
fn report_failure(err: TransferError) -> Result<()> {
    warn!(
        target: "orchestrator",
        step = err.step(),
        outcome = err.outcome(),
        error = %err.describe(),
        "转账未完成"
    );
    let message = err.user_message();
    if err.is_pending() {
        println!("⏳ {message}");
        return Ok(());
    }
    Err(anyhow!(message))
}
