use async_trait::async_trait;

use crate::transfer::TransferRequest;

use super::{Quote, QuoteError};

/// 外部路由 / 报价服务。返回按优劣排序的候选，引擎只取第一条。
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_quote(&self, request: &TransferRequest) -> Result<Vec<Quote>, QuoteError>;
}
