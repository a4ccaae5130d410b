use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, warn};

use crate::config::QuoteConfig;
use crate::monitoring::events;
use crate::transfer::TransferRequest;

use super::{Quote, QuoteError, QuoteProvider, RequestGeneration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteEngineSettings {
    pub debounce: Duration,
    pub refresh_interval: Duration,
}

impl Default for QuoteEngineSettings {
    fn default() -> Self {
        Self::from(&QuoteConfig::default())
    }
}

impl From<&QuoteConfig> for QuoteEngineSettings {
    fn from(config: &QuoteConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            refresh_interval: Duration::from_millis(config.refresh_interval_ms.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// 展示层看到的报价状态，只会由最新代数的请求写入。
#[derive(Debug, Clone)]
pub struct QuoteState {
    pub status: QuoteStatus,
    pub generation: u64,
    pub request: Option<TransferRequest>,
    pub quote: Option<Quote>,
    pub error: Option<&'static str>,
    pub updated_at: Option<Instant>,
}

impl QuoteState {
    fn idle(generation: u64) -> Self {
        Self {
            status: QuoteStatus::Idle,
            generation,
            request: None,
            quote: None,
            error: None,
            updated_at: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QuoteStatus::Loading
    }
}

struct EngineInner {
    provider: Arc<dyn QuoteProvider>,
    settings: QuoteEngineSettings,
    generation: RequestGeneration,
    state: watch::Sender<QuoteState>,
    // 锁顺序：debounce → request。
    request: Mutex<Option<TransferRequest>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    refresh: Mutex<Option<JoinHandle<()>>>,
    executing: AtomicUsize,
}

/// 实时报价引擎：输入防抖、最新请求优先、定时刷新。
///
/// 所有方法都需要在 tokio 运行时内调用。克隆共享同一个引擎。
#[derive(Clone)]
pub struct QuoteEngine {
    inner: Arc<EngineInner>,
}

/// 持有期间暂停定时刷新；转账执行时由编排器持有。
pub struct ExecutionGuard {
    inner: Arc<EngineInner>,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.inner.executing.fetch_sub(1, Ordering::AcqRel);
    }
}

impl QuoteEngine {
    pub fn new(provider: Arc<dyn QuoteProvider>, settings: QuoteEngineSettings) -> Self {
        let (state, _) = watch::channel(QuoteState::idle(0));
        Self {
            inner: Arc::new(EngineInner {
                provider,
                settings,
                generation: RequestGeneration::new(),
                state,
                request: Mutex::new(None),
                debounce: Mutex::new(None),
                refresh: Mutex::new(None),
                executing: AtomicUsize::new(0),
            }),
        }
    }

    pub fn settings(&self) -> QuoteEngineSettings {
        self.inner.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<QuoteState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> QuoteState {
        self.inner.state.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.current()
    }

    pub fn current_request(&self) -> Option<TransferRequest> {
        self.inner.request.lock().clone()
    }

    /// 最近一次被应用到展示状态的报价。
    pub fn accepted_quote(&self) -> Option<Quote> {
        self.inner.state.borrow().quote.clone()
    }

    /// 输入变化。重置防抖计时；清空或不可报价的请求立即推进代数并清空状态，不访问报价服务。
    pub fn update_request(&self, request: Option<TransferRequest>) {
        let mut pending = self.inner.debounce.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let mut current = self.inner.request.lock();
        *current = request.clone();

        match request {
            Some(request) if request.is_quotable() => {
                let weak = Arc::downgrade(&self.inner);
                let delay = self.inner.settings.debounce;
                *pending = Some(tokio::spawn(async move {
                    sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.dispatch_if_current(&request);
                    }
                }));
            }
            request => {
                let generation = self.inner.generation.advance();
                self.inner.state.send_replace(QuoteState {
                    request,
                    updated_at: Some(Instant::now()),
                    ..QuoteState::idle(generation)
                });
                debug!(target: "quote::engine", generation, "请求已清空，丢弃在途报价");
            }
        }
    }

    /// 执行一次定时刷新；被跳过时返回 `false`。
    pub fn refresh_tick(&self) -> bool {
        self.inner.refresh_tick()
    }

    /// 启动定时刷新任务。重复调用无副作用。
    pub fn start_refresh(&self) {
        let mut slot = self.inner.refresh.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let period = self.inner.settings.refresh_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.refresh_tick();
            }
        }));
    }

    pub fn begin_execution(&self) -> ExecutionGuard {
        self.inner.executing.fetch_add(1, Ordering::AcqRel);
        ExecutionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn is_executing(&self) -> bool {
        self.inner.executing.load(Ordering::Acquire) > 0
    }

    pub fn shutdown(&self) {
        self.inner.abort_tasks();
    }
}

impl EngineInner {
    fn debounce_pending(&self) -> bool {
        self.debounce
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn dispatch_if_current(self: &Arc<Self>, request: &TransferRequest) {
        let guard = self.request.lock();
        if guard.as_ref() != Some(request) {
            return;
        }
        self.dispatch_locked(request.clone(), false);
    }

    fn refresh_tick(self: &Arc<Self>) -> bool {
        if self.executing.load(Ordering::Acquire) > 0 {
            events::quote_refresh_skipped("executing");
            return false;
        }
        if self.debounce_pending() {
            events::quote_refresh_skipped("debounce_pending");
            return false;
        }
        if self.state.borrow().is_loading() {
            events::quote_refresh_skipped("loading");
            return false;
        }

        let guard = self.request.lock();
        match guard.as_ref() {
            Some(request) if request.is_quotable() => {
                self.dispatch_locked(request.clone(), true);
                true
            }
            _ => {
                events::quote_refresh_skipped("no_request");
                false
            }
        }
    }

    /// 调用方必须持有 `request` 锁，保证代数推进与请求变更互斥。
    fn dispatch_locked(self: &Arc<Self>, request: TransferRequest, refresh: bool) {
        let generation = self.generation.advance();
        self.state.send_modify(|state| {
            if state.request.as_ref() != Some(&request) {
                state.quote = None;
            }
            state.status = QuoteStatus::Loading;
            state.generation = generation;
            state.request = Some(request.clone());
            state.error = None;
        });
        events::quote_dispatched(generation, &request, refresh);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.complete(generation, request).await;
        });
    }

    async fn complete(&self, generation: u64, request: TransferRequest) {
        let started = Instant::now();
        let result = self
            .provider
            .get_quote(&request)
            .await
            .and_then(|quotes| quotes.into_iter().next().ok_or(QuoteError::NoRoute));
        let elapsed = started.elapsed();

        let mut applied = false;
        self.state.send_if_modified(|state| {
            if !self.generation.is_current(generation) || state.generation != generation {
                return false;
            }
            applied = true;
            match &result {
                Ok(quote) => {
                    state.status = QuoteStatus::Ready;
                    state.quote = Some(quote.clone());
                    state.error = None;
                }
                Err(err) => {
                    state.status = QuoteStatus::Failed;
                    state.quote = None;
                    state.error = Some(err.user_message());
                }
            }
            state.updated_at = Some(Instant::now());
            true
        });

        if !applied {
            events::quote_stale(generation, self.generation.current(), result.is_ok());
            return;
        }

        match result {
            Ok(quote) => events::quote_applied(generation, &quote.route_id.0, elapsed),
            Err(err) => {
                warn!(
                    target: "quote::engine",
                    generation,
                    request = %request.describe(),
                    error = %err.describe(),
                    "报价失败"
                );
                events::quote_failed(generation, err.category(), elapsed);
            }
        }
    }

    fn abort_tasks(&self) {
        if let Some(handle) = self.debounce.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.refresh.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use tokio::sync::oneshot;

    use super::*;
    use crate::catalog::{ChainId, Token};
    use crate::transfer::SlippageSpec;

    type Reply = Result<Vec<Quote>, QuoteError>;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
        empty: bool,
    }

    #[async_trait]
    impl QuoteProvider for CountingProvider {
        async fn get_quote(&self, request: &TransferRequest) -> Reply {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(QuoteError::Schema("insufficient balance for route".into()));
            }
            if self.empty {
                return Ok(Vec::new());
            }
            Ok(vec![Quote::new(format!("route-{call}"), request.amount)])
        }
    }

    /// 每次调用挂起，直到测试通过 oneshot 回复。
    #[derive(Default)]
    struct GatedProvider {
        pending: Mutex<Vec<(Decimal, oneshot::Sender<Reply>)>>,
    }

    impl GatedProvider {
        fn take(&self, amount: &str) -> oneshot::Sender<Reply> {
            let amount = Decimal::from_str(amount).expect("amount");
            let mut pending = self.pending.lock();
            let index = pending
                .iter()
                .position(|(value, _)| *value == amount)
                .expect("pending call");
            pending.remove(index).1
        }

        fn len(&self) -> usize {
            self.pending.lock().len()
        }
    }

    #[async_trait]
    impl QuoteProvider for GatedProvider {
        async fn get_quote(&self, request: &TransferRequest) -> Reply {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().push((request.amount, tx));
            rx.await.unwrap_or(Err(QuoteError::NoRoute))
        }
    }

    fn weth() -> Token {
        Token {
            chain: ChainId(1),
            address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(),
            symbol: "WETH".to_string(),
            decimals: 18,
        }
    }

    fn request(amount: &str) -> TransferRequest {
        TransferRequest::new(amount, weth(), None, ChainId(137), SlippageSpec::Auto).expect("request")
    }

    fn quote_for(amount: &str) -> Reply {
        Ok(vec![Quote::new(
            format!("route-{amount}"),
            Decimal::from_str(amount).expect("amount"),
        )])
    }

    fn engine(provider: Arc<dyn QuoteProvider>) -> QuoteEngine {
        QuoteEngine::new(provider, QuoteEngineSettings::default())
    }

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_inputs_triggers_one_call() {
        let provider = Arc::new(CountingProvider::default());
        let engine = engine(provider.clone());

        for amount in ["1", "1.2", "1.25", "1.5"] {
            engine.update_request(Some(request(amount)));
            sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(400)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            engine.current_request().map(|request| request.amount),
            Some(Decimal::from_str("1.5").expect("amount"))
        );

        let state = engine.snapshot();
        assert_eq!(state.status, QuoteStatus::Ready);
        assert_eq!(
            state.quote.expect("quote").expected_output_amount,
            Decimal::from_str("1.5").expect("amount")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_responses_keep_latest() {
        let provider = Arc::new(GatedProvider::default());
        let engine = engine(provider.clone());

        for amount in ["1", "2", "3"] {
            engine.update_request(Some(request(amount)));
            sleep(Duration::from_millis(350)).await;
        }
        assert_eq!(provider.len(), 3);
        assert!(engine.snapshot().is_loading());

        provider.take("3").send(quote_for("3")).expect("send");
        settle().await;
        provider.take("1").send(quote_for("1")).expect("send");
        settle().await;
        provider.take("2").send(quote_for("2")).expect("send");
        settle().await;

        let state = engine.snapshot();
        assert_eq!(state.status, QuoteStatus::Ready);
        assert_eq!(state.generation, engine.generation());
        assert_eq!(state.quote.expect("quote").route_id.0, "route-3");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_error_is_swallowed() {
        let provider = Arc::new(GatedProvider::default());
        let engine = engine(provider.clone());

        engine.update_request(Some(request("1")));
        sleep(Duration::from_millis(350)).await;
        engine.update_request(Some(request("2")));
        sleep(Duration::from_millis(350)).await;

        provider.take("2").send(quote_for("2")).expect("send");
        settle().await;
        provider.take("1").send(Err(QuoteError::Timeout(10_000))).expect("send");
        settle().await;

        let state = engine.snapshot();
        assert_eq!(state.status, QuoteStatus::Ready);
        assert!(state.error.is_none());
        assert_eq!(state.quote.expect("quote").route_id.0, "route-2");
    }

    #[tokio::test(start_paused = true)]
    async fn provider_error_clears_quote_with_message() {
        let provider = Arc::new(CountingProvider {
            fail: true,
            ..Default::default()
        });
        let engine = engine(provider);
        engine.update_request(Some(request("1")));
        sleep(Duration::from_millis(350)).await;

        let state = engine.snapshot();
        assert_eq!(state.status, QuoteStatus::Failed);
        assert!(state.quote.is_none());
        assert_eq!(state.error, Some("余额不足，请减少金额后重试。"));
        assert!(engine.accepted_quote().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_route_list_is_no_route() {
        let provider = Arc::new(CountingProvider {
            empty: true,
            ..Default::default()
        });
        let engine = engine(provider);
        engine.update_request(Some(request("1")));
        sleep(Duration::from_millis(350)).await;

        let state = engine.snapshot();
        assert_eq!(state.status, QuoteStatus::Failed);
        assert_eq!(state.error, Some(QuoteError::NoRoute.user_message()));
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_request_discards_in_flight_quote() {
        let provider = Arc::new(GatedProvider::default());
        let engine = engine(provider.clone());

        engine.update_request(Some(request("1")));
        sleep(Duration::from_millis(350)).await;
        let dispatched = engine.generation();

        engine.update_request(None);
        assert!(engine.generation() > dispatched);
        provider.take("1").send(quote_for("1")).expect("send");
        settle().await;

        let state = engine.snapshot();
        assert_eq!(state.status, QuoteStatus::Idle);
        assert!(state.quote.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_amount_never_calls_provider() {
        let provider = Arc::new(CountingProvider::default());
        let engine = engine(provider.clone());
        engine.update_request(Some(request("0")));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.snapshot().status, QuoteStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_pauses_while_executing() {
        let provider = Arc::new(CountingProvider::default());
        let engine = engine(provider.clone());
        engine.start_refresh();
        engine.update_request(Some(request("1")));

        sleep(Duration::from_secs(6)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let guard = engine.begin_execution();
        assert!(engine.is_executing());
        sleep(Duration::from_secs(10)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        drop(guard);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_skips_while_loading() {
        let provider = Arc::new(GatedProvider::default());
        let engine = engine(provider.clone());
        engine.update_request(Some(request("1")));
        sleep(Duration::from_millis(350)).await;
        assert_eq!(provider.len(), 1);

        engine.start_refresh();
        sleep(Duration::from_millis(5_100)).await;
        assert_eq!(provider.len(), 1);

        provider.take("1").send(quote_for("1")).expect("send");
        sleep(Duration::from_secs(5)).await;
        assert_eq!(provider.len(), 1, "refresh dispatched a new request");
        assert_eq!(engine.snapshot().quote.expect("kept").route_id.0, "route-1");
    }
}
