use std::borrow::Cow;
use std::future::Future;

use tracing::Level;

use super::types::{LatencyGuard, LatencyMetadata};

pub fn guard_with_metadata(
    operation: impl Into<Cow<'static, str>>,
    metadata: LatencyMetadata,
) -> LatencyGuard {
    LatencyGuard::new(operation, Level::DEBUG, metadata)
}

/// 对返回 `Result` 的远程调用计时；失败时升到 WARN。
pub async fn measure_result<Fut, T, E>(
    operation: impl Into<Cow<'static, str>>,
    metadata: LatencyMetadata,
    fut: Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let mut guard = LatencyGuard::new(operation, Level::DEBUG, metadata);
    let res = fut.await;
    if res.is_err() {
        guard.set_level(Level::WARN);
    }
    guard.finish();
    res
}
