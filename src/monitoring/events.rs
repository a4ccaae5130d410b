use std::time::Duration;

use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::catalog::ChainId;
use crate::friendly::FriendlyCategory;
use crate::gas::{FeeSource, GasPlan, TxKind, Urgency};
use crate::transfer::TransferRequest;

use super::metrics::prometheus_enabled;

pub fn quote_dispatched(generation: u64, request: &TransferRequest, refresh: bool) {
    info!(
        target: "monitoring::quote",
        event = "dispatch",
        generation,
        refresh,
        source_chain = %request.source_chain,
        destination_chain = %request.destination_chain,
        request = %request.describe(),
        "quote dispatched"
    );

    if prometheus_enabled() {
        let trigger = if refresh { "refresh" } else { "input" };
        counter!("meridian_quote_dispatch_total", "trigger" => trigger).increment(1);
    }
}

pub fn quote_applied(generation: u64, route_id: &str, elapsed: Duration) {
    let latency_ms = elapsed.as_secs_f64() * 1_000.0;
    info!(
        target: "monitoring::quote",
        event = "applied",
        generation,
        route_id,
        latency_ms,
        "quote applied"
    );

    if prometheus_enabled() {
        counter!("meridian_quote_total", "result" => "success").increment(1);
        histogram!("meridian_quote_latency_ms", "result" => "success").record(latency_ms);
    }
}

pub fn quote_failed(generation: u64, category: FriendlyCategory, elapsed: Duration) {
    let latency_ms = elapsed.as_secs_f64() * 1_000.0;
    warn!(
        target: "monitoring::quote",
        event = "failed",
        generation,
        category = category.as_str(),
        latency_ms,
        "quote failed"
    );

    if prometheus_enabled() {
        counter!(
            "meridian_quote_total",
            "result" => "error",
            "category" => category.as_str()
        )
        .increment(1);
        histogram!("meridian_quote_latency_ms", "result" => "error").record(latency_ms);
    }
}

pub fn quote_stale(generation: u64, current: u64, success: bool) {
    debug!(
        target: "monitoring::quote",
        event = "stale",
        generation,
        current,
        success,
        "stale quote response discarded"
    );

    if prometheus_enabled() {
        counter!("meridian_quote_stale_total").increment(1);
    }
}

pub fn quote_refresh_skipped(reason: &'static str) {
    debug!(
        target: "monitoring::quote",
        event = "refresh_skipped",
        reason,
        "periodic refresh skipped"
    );

    if prometheus_enabled() {
        counter!("meridian_quote_refresh_skipped_total", "reason" => reason).increment(1);
    }
}

pub fn gas_plan(kind: TxKind, urgency: Urgency, source: FeeSource, plan: &GasPlan) {
    if prometheus_enabled() {
        counter!(
            "meridian_gas_plan_total",
            "kind" => kind.as_str(),
            "urgency" => urgency.as_str(),
            "source" => source.as_str()
        )
        .increment(1);
        histogram!("meridian_gas_max_fee_gwei", "urgency" => urgency.as_str())
            .record(plan.max_fee_per_gas as f64 / 1e9);
    }
}

pub fn chain_switch(required: ChainId, outcome: &'static str) {
    info!(
        target: "monitoring::chain",
        event = "switch",
        required = %required,
        outcome,
        "chain switch finished"
    );

    if prometheus_enabled() {
        counter!("meridian_chain_switch_total", "outcome" => outcome).increment(1);
    }
}

pub fn transfer_step(action: &'static str, step: &str) {
    info!(
        target: "monitoring::transfer",
        event = "step",
        action,
        step,
        "transfer step advanced"
    );
}

pub fn transaction_submitted(kind: TxKind, chain: ChainId, hash: &str) {
    info!(
        target: "monitoring::transaction",
        event = "submitted",
        kind = kind.as_str(),
        chain = %chain,
        hash,
        "transaction submitted"
    );

    if prometheus_enabled() {
        counter!("meridian_transaction_submitted_total", "kind" => kind.as_str()).increment(1);
    }
}

pub fn transaction_confirmed(kind: TxKind, hash: &str, success: bool, elapsed: Duration) {
    let latency_ms = elapsed.as_secs_f64() * 1_000.0;
    if success {
        info!(
            target: "monitoring::transaction",
            event = "confirmed",
            kind = kind.as_str(),
            hash,
            latency_ms,
            "transaction confirmed"
        );
    } else {
        warn!(
            target: "monitoring::transaction",
            event = "reverted",
            kind = kind.as_str(),
            hash,
            latency_ms,
            "transaction reverted"
        );
    }

    if prometheus_enabled() {
        let result = if success { "success" } else { "reverted" };
        counter!(
            "meridian_transaction_total",
            "kind" => kind.as_str(),
            "result" => result
        )
        .increment(1);
        histogram!("meridian_transaction_confirm_ms", "kind" => kind.as_str()).record(latency_ms);
    }
}

pub fn transfer_finished(action: &'static str, outcome: &'static str, writes: usize, elapsed: Duration) {
    let latency_ms = elapsed.as_secs_f64() * 1_000.0;
    info!(
        target: "monitoring::transfer",
        event = "finished",
        action,
        outcome,
        writes,
        latency_ms,
        "transfer finished"
    );

    if prometheus_enabled() {
        counter!(
            "meridian_transfer_total",
            "action" => action,
            "outcome" => outcome
        )
        .increment(1);
        histogram!("meridian_transfer_writes", "action" => action).record(writes as f64);
    }
}

pub fn tvl_lookup(vault: &str, outcome: &'static str) {
    debug!(
        target: "monitoring::tvl",
        event = "lookup",
        vault,
        outcome,
        "tvl lookup"
    );

    if prometheus_enabled() {
        counter!("meridian_tvl_lookup_total", "outcome" => outcome).increment(1);
    }
}

pub fn retry_attempt(operation: &str, attempt: u32, delay: Duration, error: &str) {
    warn!(
        target: "monitoring::retry",
        event = "retry",
        operation,
        attempt,
        delay_ms = delay.as_millis() as u64,
        error,
        "remote call failed, retrying"
    );

    if prometheus_enabled() {
        counter!("meridian_retry_total", "operation" => operation.to_string()).increment(1);
    }
}
