use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::catalog::ChainCatalog;
use crate::cli::args::{QuoteCmd, WatchCmd};
use crate::cli::context::{build_http_client, resolve_route};
use crate::cli::utils::{format_amount, format_breakdown};
use crate::config::AppConfig;
use crate::fees::{FeeBreakdown, PriceApiClient, fill_missing_prices};
use crate::quote::{QuoteEngine, QuoteEngineSettings, QuoteProvider, QuoteState, QuoteStatus, RoutingApiClient};

/// 单次报价：取最优路由，补齐价格后输出费用估算。
pub async fn handle_quote_cmd(cmd: QuoteCmd, config: &AppConfig, catalog: &ChainCatalog) -> Result<()> {
    let request = resolve_route(catalog, &cmd.route, &cmd.amount)?;
    let client = build_http_client(Duration::from_millis(config.quote.timeout_ms))?;
    let provider = RoutingApiClient::new(client.clone(), &config.quote);

    let quotes = provider.get_quote(&request).await.map_err(|err| {
        warn!(target: "quote::http", error = %err.describe(), "报价请求失败");
        anyhow!(err.user_message())
    })?;
    let best = quotes
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("没有找到可用路由：{}", request.describe()))?;

    let prices = PriceApiClient::new(client, &config.prices);
    let quote = fill_missing_prices(&prices, &request, best).await;
    let breakdown = FeeBreakdown::derive(&request, &quote);

    println!("route: {}", quote.route_id);
    println!("request: {}", request.describe());
    println!(
        "expected output: {}",
        format_amount(quote.expected_output_amount, output_symbol(&request))
    );
    for line in format_breakdown(&breakdown) {
        println!("{line}");
    }
    Ok(())
}

/// 实时报价：每读入一行视为一次金额输入，空行清空。
pub async fn handle_watch_cmd(cmd: WatchCmd, config: &AppConfig, catalog: &ChainCatalog) -> Result<()> {
    let client = build_http_client(Duration::from_millis(config.quote.timeout_ms))?;
    let provider = Arc::new(RoutingApiClient::new(client, &config.quote));
    let engine = QuoteEngine::new(provider, QuoteEngineSettings::from(&config.quote));
    engine.start_refresh();

    let mut updates = engine.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            print_state(&state);
        }
    });

    info!(
        target: "quote::engine",
        debounce_ms = config.quote.debounce_ms,
        refresh_ms = config.quote.refresh_interval_ms,
        "实时报价已启动，输入金额回车，空行清空，q 退出"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = line.trim();
                if matches!(input, "q" | "quit" | "exit") {
                    break;
                }
                if input.is_empty() {
                    engine.update_request(None);
                    continue;
                }
                match resolve_route(catalog, &cmd.route, input) {
                    Ok(request) => engine.update_request(Some(request)),
                    Err(err) => {
                        println!("输入无效: {err}");
                        engine.update_request(None);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(target: "quote::engine", "收到终止信号，停止实时报价");
                break;
            }
        }
    }

    engine.shutdown();
    printer.abort();
    Ok(())
}

fn print_state(state: &QuoteState) {
    match state.status {
        QuoteStatus::Idle => println!("[{}] 等待输入", state.generation),
        QuoteStatus::Loading => println!("[{}] 报价中…", state.generation),
        QuoteStatus::Failed => println!(
            "[{}] ⚠️ {}",
            state.generation,
            state.error.unwrap_or("报价失败，请稍后重试。")
        ),
        QuoteStatus::Ready => {
            let (Some(request), Some(quote)) = (&state.request, &state.quote) else {
                return;
            };
            let breakdown = FeeBreakdown::derive(request, quote);
            println!(
                "[{}] {} → {}",
                state.generation,
                request.describe(),
                format_amount(quote.expected_output_amount, output_symbol(request))
            );
            for line in format_breakdown(&breakdown) {
                println!("    {line}");
            }
        }
    }
}

fn output_symbol(request: &crate::transfer::TransferRequest) -> &str {
    request
        .destination_token
        .as_ref()
        .unwrap_or(&request.source_token)
        .symbol
        .as_str()
}
