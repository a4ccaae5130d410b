use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::trace;

use super::RpcError;

#[derive(Debug, serde::Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// 单端点 JSON-RPC 2.0 over HTTP。
#[derive(Debug)]
pub struct JsonRpcTransport {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(target: "rpc::transport", url = %self.url, method, id, "发送 JSON-RPC 请求");

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let raw: Value = response.json().await?;
        parse_response(method, raw)
    }
}

pub(crate) fn parse_response<R>(method: &str, raw: Value) -> Result<R, RpcError>
where
    R: DeserializeOwned,
{
    if let Some(error) = raw.get("error").filter(|value| !value.is_null()) {
        let object: RpcErrorObject = serde_json::from_value(error.clone())
            .map_err(|err| RpcError::Schema(format!("{method} 错误对象无法解析: {err}")))?;
        return Err(RpcError::Rpc {
            code: object.code,
            message: object.message,
            data: object.data,
        });
    }

    let result = raw
        .get("result")
        .cloned()
        .ok_or_else(|| RpcError::Schema(format!("{method} 响应缺少 result")))?;
    serde_json::from_value(result)
        .map_err(|err| RpcError::Schema(format!("{method} result 无法解析: {err}")))
}
