use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing::info;

static EXPORTER: OnceCell<SocketAddr> = OnceCell::new();
static PROMETHEUS_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn try_init_prometheus(listen: &str) -> Result<SocketAddr> {
    EXPORTER
        .get_or_try_init(|| {
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("invalid prometheus listen address: {listen}"))?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("failed to install prometheus exporter")?;
            describe_metrics();
            PROMETHEUS_ENABLED.store(true, Ordering::Relaxed);
            info!(target: "monitoring", listen = %addr, "Prometheus 指标已启用");
            Ok(addr)
        })
        .copied()
}

pub fn prometheus_enabled() -> bool {
    PROMETHEUS_ENABLED.load(Ordering::Relaxed)
}

fn describe_metrics() {
    describe_counter!("meridian_quote_dispatch_total", "报价请求发出次数");
    describe_counter!("meridian_quote_total", "报价结果（成功 / 失败）");
    describe_counter!("meridian_quote_stale_total", "被丢弃的过期报价响应");
    describe_histogram!("meridian_quote_latency_ms", "报价请求耗时（毫秒）");
    describe_counter!("meridian_gas_plan_total", "生成的 gas 计划数");
    describe_counter!("meridian_transaction_total", "已确认交易数");
    describe_histogram!("meridian_transaction_confirm_ms", "交易确认耗时（毫秒）");
    describe_counter!("meridian_transfer_total", "转账流程结果");
    describe_counter!("meridian_tvl_lookup_total", "TVL 查询结果");
    describe_counter!("meridian_retry_total", "远程调用重试次数");
}
