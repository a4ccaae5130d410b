//! 报价：外部路由服务抽象、HTTP 客户端与实时报价引擎。

pub mod engine;
pub mod error;
pub mod generation;
pub mod http;
pub mod provider;
pub mod serde_helpers;
pub mod types;

pub use engine::{ExecutionGuard, QuoteEngine, QuoteEngineSettings, QuoteState, QuoteStatus};
pub use error::QuoteError;
pub use generation::RequestGeneration;
pub use http::RoutingApiClient;
pub use provider::QuoteProvider;
pub use types::{Quote, RouteId, RouteTransaction};
