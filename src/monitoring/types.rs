use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Level;

#[derive(Debug, Clone, Default)]
pub struct LatencyMetadata {
    fields: Arc<BTreeMap<String, String>>,
}

impl LatencyMetadata {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self {
            fields: Arc::new(fields),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// 作用域计时器：`finish` 或 drop 时记录一次耗时。
#[derive(Debug)]
pub struct LatencyGuard {
    operation: Cow<'static, str>,
    start: Instant,
    level: Level,
    slow_threshold: Option<Duration>,
    metadata: LatencyMetadata,
    ended: bool,
}

impl LatencyGuard {
    pub fn new(
        operation: impl Into<Cow<'static, str>>,
        level: Level,
        metadata: LatencyMetadata,
    ) -> Self {
        Self {
            operation: operation.into(),
            start: Instant::now(),
            level,
            slow_threshold: None,
            metadata,
            ended: false,
        }
    }

    /// 超过阈值时按 WARN 输出。
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn finish(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.ended {
            self.ended = true;
            let level = match self.slow_threshold {
                Some(threshold) if elapsed > threshold && self.level > Level::WARN => Level::WARN,
                _ => self.level,
            };
            log_latency(level, &self.operation, elapsed, &self.metadata);
        }
        elapsed
    }
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

fn log_latency(level: Level, operation: &str, elapsed: Duration, metadata: &LatencyMetadata) {
    let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
    let elapsed_ms_display = format!("{elapsed_ms:.3}");
    let metadata_summary = metadata
        .fields()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");

    macro_rules! log_event {
        ($macro:ident) => {
            tracing::$macro!(
                target: "latency",
                %operation,
                elapsed_ms = %elapsed_ms_display,
                metadata = %metadata_summary,
                "耗时统计"
            )
        };
    }

    match level {
        Level::ERROR => log_event!(error),
        Level::WARN => log_event!(warn),
        Level::INFO => log_event!(info),
        Level::DEBUG => log_event!(debug),
        Level::TRACE => log_event!(trace),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_is_idempotent() {
        let mut guard = LatencyGuard::new("unit", Level::TRACE, LatencyMetadata::default());
        let first = guard.finish();
        let second = guard.finish();
        assert!(second >= first);
        assert!(guard.ended);
    }

    #[test]
    fn metadata_from_pairs_is_sorted() {
        let metadata = LatencyMetadata::from_pairs([("vault", "b"), ("attempt", "1")]);
        let keys: Vec<_> = metadata.fields().keys().cloned().collect();
        assert_eq!(keys, vec!["attempt".to_string(), "vault".to_string()]);
    }
}
