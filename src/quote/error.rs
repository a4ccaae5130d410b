use std::error::Error as _;

use thiserror::Error;

use crate::friendly::FriendlyCategory;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("failed to call routing API: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing API timed out after {0} ms")]
    Timeout(u64),
    #[error("routing API request to {endpoint} failed with status {status}: {body}")]
    ApiStatus {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("routing API rate limited")]
    RateLimited,
    #[error("failed to parse routing response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected routing response schema: {0}")]
    Schema(String),
    #[error("no route found")]
    NoRoute,
    #[error("quote request rejected: {0}")]
    InvalidRequest(String),
}

impl QuoteError {
    /// 拼接完整的错误链，用于日志。
    pub fn describe(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }

    pub fn category(&self) -> FriendlyCategory {
        match self {
            QuoteError::Timeout(_) => FriendlyCategory::Timeout,
            QuoteError::Http(err) if err.is_timeout() => FriendlyCategory::Timeout,
            _ => FriendlyCategory::classify(&self.describe()),
        }
    }

    /// 展示层使用的单句提示。
    pub fn user_message(&self) -> &'static str {
        match self {
            QuoteError::NoRoute => "暂无可用路由，请调整金额或代币后重试。",
            _ => self.category().message(),
        }
    }
}
