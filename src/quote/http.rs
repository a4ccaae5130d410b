use std::time::{Duration, Instant};

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::catalog::Token;
use crate::config::QuoteConfig;
use crate::monitoring::{LatencyMetadata, guard_with_metadata};
use crate::transfer::{TransferRequest, from_base_units, to_base_units};

use super::serde_helpers::{field_as_string, option_field_as_string};
use super::{Quote, QuoteError, QuoteProvider, RouteId, RouteTransaction};

/// `GET {base}/quote` 路由服务客户端。
#[derive(Clone, Debug)]
pub struct RoutingApiClient {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
    slow_threshold: Duration,
    api_key: Option<String>,
    integrator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoutesResponse {
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoute {
    id: String,
    #[serde(with = "field_as_string")]
    to_amount: U256,
    #[serde(default)]
    eta_seconds: Option<u64>,
    #[serde(default)]
    protocol_fee_bps: Option<u32>,
    #[serde(default)]
    relayer_fee: Option<Decimal>,
    #[serde(default)]
    from_token_price_usd: Option<Decimal>,
    #[serde(default)]
    to_token_price_usd: Option<Decimal>,
    #[serde(default)]
    transaction_request: Option<RawTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    to: Address,
    data: Bytes,
    #[serde(default, with = "option_field_as_string")]
    value: Option<U256>,
    #[serde(default)]
    approval_address: Option<Address>,
    #[serde(default, with = "option_field_as_string")]
    gas_limit: Option<u64>,
}

impl RoutingApiClient {
    pub fn new(client: reqwest::Client, config: &QuoteConfig) -> Self {
        Self {
            base_url: config.api_base.clone(),
            client,
            request_timeout: Duration::from_millis(config.timeout_ms),
            slow_threshold: Duration::from_millis(config.slow_quote_warn_ms),
            api_key: config.api_key.clone(),
            integrator: config.integrator.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn query(&self, request: &TransferRequest) -> Result<Vec<(&'static str, String)>, QuoteError> {
        let amount = to_base_units(request.amount, request.source_token.decimals)
            .map_err(|err| QuoteError::InvalidRequest(err.to_string()))?;
        let destination = output_token(request)?;

        let mut query = vec![
            ("fromChain", request.source_chain.to_string()),
            ("toChain", request.destination_chain.to_string()),
            ("fromToken", request.source_token.address.clone()),
            ("toToken", destination.address.clone()),
            ("fromAmount", amount.to_string()),
        ];
        if let Some(bps) = request.slippage.bps() {
            let fraction = Decimal::from(bps) / Decimal::from(10_000u32);
            query.push(("slippage", fraction.normalize().to_string()));
        }
        if let Some(integrator) = &self.integrator {
            query.push(("integrator", integrator.clone()));
        }
        Ok(query)
    }
}

#[async_trait]
impl QuoteProvider for RoutingApiClient {
    async fn get_quote(&self, request: &TransferRequest) -> Result<Vec<Quote>, QuoteError> {
        let url = self.endpoint("/quote");
        let metadata = LatencyMetadata::from_pairs([("stage", "quote"), ("url", url.as_str())]);
        let mut guard = guard_with_metadata("routing.quote", metadata)
            .with_slow_threshold(self.slow_threshold);
        let start = Instant::now();

        let mut http_request = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .query(&self.query(request)?);
        if let Some(key) = &self.api_key {
            http_request = http_request.header("x-api-key", key);
        }

        let response = http_request.send().await.map_err(|err| {
            if err.is_timeout() {
                QuoteError::Timeout(self.request_timeout.as_millis() as u64)
            } else {
                QuoteError::Http(err)
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(QuoteError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(QuoteError::NoRoute);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuoteError::ApiStatus {
                endpoint: url,
                status,
                body,
            });
        }

        let value: Value = response.json().await?;
        let quotes = parse_routes(value, request)?;

        guard.finish();
        let elapsed_ms = start.elapsed().as_micros() as f64 / 1_000.0;
        info!(
            target: "quote::http",
            request = %request.describe(),
            routes = quotes.len(),
            best_output = %quotes.first().map(|q| q.expected_output_amount).unwrap_or_default(),
            elapsed_ms,
            "报价请求完成"
        );

        Ok(quotes)
    }
}

pub(crate) fn parse_routes(value: Value, request: &TransferRequest) -> Result<Vec<Quote>, QuoteError> {
    let response: RoutesResponse = serde_json::from_value(value)
        .map_err(|err| QuoteError::Schema(format!("解析报价响应失败: {err}")))?;
    let destination = output_token(request)?;

    response
        .routes
        .into_iter()
        .map(|route| {
            let expected_output_amount = from_base_units(route.to_amount, destination.decimals)
                .map_err(|err| QuoteError::Schema(format!("路由 {} 输出金额非法: {err}", route.id)))?;
            let transaction = route.transaction_request.map(|tx| RouteTransaction {
                chain: request.source_chain,
                to: tx.to,
                data: tx.data,
                value: tx.value.unwrap_or(U256::ZERO),
                approval_address: tx.approval_address,
                gas_limit: tx.gas_limit,
            });
            Ok(Quote {
                route_id: RouteId(route.id),
                expected_output_amount,
                eta_seconds: route.eta_seconds,
                protocol_fee_bps: route.protocol_fee_bps,
                relayer_fee_estimate: route.relayer_fee,
                source_token_price_usd: route.from_token_price_usd,
                destination_token_price_usd: route.to_token_price_usd,
                transaction,
            })
        })
        .collect()
}

fn output_token(request: &TransferRequest) -> Result<&Token, QuoteError> {
    request.output_token().ok_or_else(|| {
        QuoteError::InvalidRequest(format!(
            "跨链请求缺少链 {} 上的目标代币",
            request.destination_chain
        ))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::catalog::{ChainId, Token};
    use crate::transfer::SlippageSpec;

    fn usdc(chain: u64, address: &str, decimals: u8) -> Token {
        Token {
            chain: ChainId(chain),
            address: address.to_string(),
            symbol: "USDC".to_string(),
            decimals,
        }
    }

    fn usdc_ethereum() -> Token {
        usdc(1, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6)
    }

    fn request(slippage: SlippageSpec) -> TransferRequest {
        let destination = usdc(137, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", 6);
        TransferRequest::new("1.5", usdc_ethereum(), Some(destination), ChainId(137), slippage)
            .expect("request")
    }

    fn bsc_request() -> TransferRequest {
        let destination = usdc(56, "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d", 18);
        TransferRequest::new("1.5", usdc_ethereum(), Some(destination), ChainId(56), SlippageSpec::Auto)
            .expect("request")
    }

    #[test]
    fn routes_are_converted_to_quotes() {
        let value = json!({
            "routes": [{
                "id": "route-1",
                "toAmount": "1487000",
                "etaSeconds": 120,
                "protocolFeeBps": 5,
                "relayerFee": "0.01",
                "fromTokenPriceUsd": "1.0",
                "transactionRequest": {
                    "to": "0x1111111111111111111111111111111111111111",
                    "data": "0xdeadbeef",
                    "value": "0",
                    "approvalAddress": "0x2222222222222222222222222222222222222222"
                }
            }]
        });
        let quotes = parse_routes(value, &request(SlippageSpec::Auto)).expect("quotes");
        assert_eq!(quotes.len(), 1);
        let quote = &quotes[0];
        assert_eq!(quote.route_id, RouteId("route-1".into()));
        assert_eq!(quote.expected_output_amount, Decimal::new(1487, 3));
        assert_eq!(quote.eta_seconds, Some(120));
        assert_eq!(quote.protocol_fee_bps, Some(5));
        assert_eq!(quote.relayer_fee_estimate, Some(Decimal::new(1, 2)));
        assert_eq!(quote.destination_token_price_usd, None);
        let tx = quote.transaction.as_ref().expect("tx");
        assert_eq!(tx.chain, ChainId(1));
        assert_eq!(tx.value, U256::ZERO);
        assert_eq!(tx.approval_address, Some(Address::repeat_byte(0x22)));
    }

    #[test]
    fn bridge_output_uses_destination_token_decimals() {
        let client = RoutingApiClient::new(reqwest::Client::new(), &QuoteConfig::default());
        let request = bsc_request();
        let query = client.query(&request).expect("query");
        assert!(query.contains(&("fromAmount", "1500000".to_string())));
        assert!(query.contains(&(
            "toToken",
            "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d".to_string()
        )));

        let value = json!({"routes": [{"id": "bsc", "toAmount": "1487000000000000000"}]});
        let quotes = parse_routes(value, &request).expect("quotes");
        assert_eq!(quotes[0].expected_output_amount, Decimal::new(1487, 3));
    }

    #[test]
    fn bridge_without_destination_token_is_rejected() {
        let client = RoutingApiClient::new(reqwest::Client::new(), &QuoteConfig::default());
        let request = TransferRequest::new("1.5", usdc_ethereum(), None, ChainId(56), SlippageSpec::Auto)
            .expect("request");
        assert!(matches!(client.query(&request), Err(QuoteError::InvalidRequest(_))));
        let value = json!({"routes": [{"id": "x", "toAmount": "1"}]});
        assert!(matches!(parse_routes(value, &request), Err(QuoteError::InvalidRequest(_))));
    }

    #[test]
    fn empty_body_yields_no_routes() {
        let quotes = parse_routes(json!({}), &request(SlippageSpec::Auto)).expect("quotes");
        assert!(quotes.is_empty());
    }

    #[test]
    fn malformed_amount_is_schema_error() {
        let value = json!({"routes": [{"id": "x", "toAmount": "abc"}]});
        let err = parse_routes(value, &request(SlippageSpec::Auto)).unwrap_err();
        assert!(matches!(err, QuoteError::Schema(_)));
    }

    #[test]
    fn query_carries_base_units_and_slippage_fraction() {
        let client = RoutingApiClient::new(reqwest::Client::new(), &QuoteConfig::default());
        let query = client.query(&request(SlippageSpec::Bps(50))).expect("query");
        assert!(query.contains(&("fromAmount", "1500000".to_string())));
        assert!(query.contains(&("slippage", "0.005".to_string())));
        assert!(query.contains(&("toChain", "137".to_string())));

        let auto = client.query(&request(SlippageSpec::Auto)).expect("query");
        assert!(auto.iter().all(|(key, _)| *key != "slippage"));
    }
}
