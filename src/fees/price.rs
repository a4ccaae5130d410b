use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{ChainId, Token, TokenKey};
use crate::config::PriceServiceConfig;
use crate::monitoring::{LatencyMetadata, guard_with_metadata};
use crate::quote::Quote;
use crate::transfer::TransferRequest;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("failed to call price service: {0}")]
    Http(#[from] reqwest::Error),
    #[error("price service timed out after {0} ms")]
    Timeout(u64),
    #[error("price service returned status {status}: {body}")]
    ApiStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected price response schema: {0}")]
    Schema(String),
}

/// 批量 `{network, address} → USD` 价格查询。未知代币不出现在结果中。
#[async_trait]
pub trait PriceService: Send + Sync {
    async fn prices(&self, tokens: &[TokenKey]) -> Result<HashMap<TokenKey, Decimal>, PriceError>;
}

/// `POST {base}/prices`。
#[derive(Clone, Debug)]
pub struct PriceApiClient {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct PriceRequest<'a> {
    tokens: &'a [TokenKey],
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    prices: Vec<RawPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrice {
    network: ChainId,
    address: String,
    #[serde(default)]
    price_usd: Option<Decimal>,
}

impl PriceApiClient {
    pub fn new(client: reqwest::Client, config: &PriceServiceConfig) -> Self {
        Self {
            base_url: config.api_base.clone(),
            client,
            request_timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[async_trait]
impl PriceService for PriceApiClient {
    async fn prices(&self, tokens: &[TokenKey]) -> Result<HashMap<TokenKey, Decimal>, PriceError> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/prices", self.base_url.trim_end_matches('/'));
        let count = tokens.len().to_string();
        let metadata = LatencyMetadata::from_pairs([("stage", "prices"), ("tokens", count.as_str())]);
        let mut guard = guard_with_metadata("prices.batch", metadata);

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&PriceRequest { tokens })
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    PriceError::Timeout(self.request_timeout.as_millis() as u64)
                } else {
                    PriceError::Http(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PriceError::ApiStatus { status, body });
        }
        let value: Value = response.json().await?;
        let prices = parse_prices(value)?;
        guard.finish();
        Ok(prices)
    }
}

pub(crate) fn parse_prices(value: Value) -> Result<HashMap<TokenKey, Decimal>, PriceError> {
    let response: PriceResponse =
        serde_json::from_value(value).map_err(|err| PriceError::Schema(err.to_string()))?;
    Ok(response
        .prices
        .into_iter()
        .filter_map(|raw| {
            raw.price_usd.map(|price| {
                (
                    TokenKey {
                        network: raw.network,
                        address: raw.address.trim().to_ascii_lowercase(),
                    },
                    price,
                )
            })
        })
        .collect())
}

/// 报价缺少某一侧价格时用价格服务补齐；查询失败只记日志，原样返回。
pub async fn fill_missing_prices<P>(service: &P, request: &TransferRequest, quote: Quote) -> Quote
where
    P: PriceService + ?Sized,
{
    let source_key = request.source_token.key();
    let destination_key = request.output_token().map(Token::key);

    let mut missing = Vec::with_capacity(2);
    if quote.source_token_price_usd.is_none() {
        missing.push(source_key.clone());
    }
    if let Some(key) = &destination_key {
        if quote.destination_token_price_usd.is_none() && !missing.contains(key) {
            missing.push(key.clone());
        }
    }
    if missing.is_empty() {
        return quote;
    }

    match service.prices(&missing).await {
        Ok(prices) => {
            debug!(target: "fees", requested = missing.len(), found = prices.len(), "补齐代币价格");
            let mut quote = quote;
            if quote.source_token_price_usd.is_none() {
                quote.source_token_price_usd = prices.get(&source_key).copied();
            }
            if quote.destination_token_price_usd.is_none() {
                quote.destination_token_price_usd = destination_key
                    .as_ref()
                    .and_then(|key| prices.get(key).copied());
            }
            quote
        }
        Err(err) => {
            warn!(target: "fees", error = %err, "价格服务不可用，沿用报价自带价格");
            quote
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::catalog::Token;
    use crate::transfer::SlippageSpec;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("decimal")
    }

    fn token(chain: u64, address: &str, symbol: &str) -> Token {
        Token {
            chain: ChainId(chain),
            address: address.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
        }
    }

    #[derive(Default)]
    struct FixedPrices {
        prices: HashMap<TokenKey, Decimal>,
        fail: bool,
        requested: Mutex<Vec<TokenKey>>,
    }

    #[async_trait]
    impl PriceService for FixedPrices {
        async fn prices(
            &self,
            tokens: &[TokenKey],
        ) -> Result<HashMap<TokenKey, Decimal>, PriceError> {
            self.requested.lock().expect("lock").extend_from_slice(tokens);
            if self.fail {
                return Err(PriceError::Timeout(5_000));
            }
            Ok(tokens
                .iter()
                .filter_map(|key| self.prices.get(key).map(|price| (key.clone(), *price)))
                .collect())
        }
    }

    #[test]
    fn parse_prices_lowercases_and_skips_unknown() {
        let value = json!({
            "prices": [
                { "network": 1, "address": "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "priceUsd": "2450.12" },
                { "network": 137, "address": "0xdead", "priceUsd": null }
            ]
        });
        let prices = parse_prices(value).expect("prices");
        assert_eq!(prices.len(), 1);
        let key = TokenKey {
            network: ChainId(1),
            address: "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".to_string(),
        };
        assert_eq!(prices.get(&key), Some(&dec("2450.12")));
    }

    #[tokio::test]
    async fn fills_only_missing_side() {
        let source = token(1, "0xaaaa", "WETH");
        let destination = token(137, "0xbbbb", "WETH");
        let request = TransferRequest::new(
            "1",
            source.clone(),
            Some(destination.clone()),
            ChainId(137),
            SlippageSpec::Auto,
        )
        .expect("request");
        let service = FixedPrices {
            prices: HashMap::from([(destination.key(), dec("2449"))]),
            ..Default::default()
        };
        let quote = Quote::new("r", dec("0.99")).with_prices(Some(dec("2450")), None);

        let filled = fill_missing_prices(&service, &request, quote).await;
        assert_eq!(filled.source_token_price_usd, Some(dec("2450")));
        assert_eq!(filled.destination_token_price_usd, Some(dec("2449")));
        assert_eq!(*service.requested.lock().expect("lock"), vec![destination.key()]);
    }

    #[tokio::test]
    async fn service_failure_keeps_quote() {
        let request = TransferRequest::new(
            "1",
            token(1, "0xaaaa", "WETH"),
            None,
            ChainId(10),
            SlippageSpec::Auto,
        )
        .expect("request");
        let service = FixedPrices {
            fail: true,
            ..Default::default()
        };
        let quote = Quote::new("r", dec("0.99"));
        let filled = fill_missing_prices(&service, &request, quote.clone()).await;
        assert_eq!(filled, quote);
        assert_eq!(service.requested.lock().expect("lock").len(), 1);
    }
}
