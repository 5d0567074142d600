//! 事件引擎（EventEngine）
//!
//! 生产者的唯一入口，编排“订阅表 → 节流闸门 → 延迟队列 → 帧调度”：
//! - `publish`：按模式立即执行、入队，或咨询节流闸门；
//! - `tick`：每个宿主帧调用一次，先裁剪再在预算内公平排空队列；
//! - 所有方法都只需 `&self`，用户回调执行期间不持有任何内部借用，
//!   因此处理器可以通过 `Rc<EventEngine<_>>` 重入发布、订阅或退订。
//!
//! 引擎是单线程的（内部使用 `Rc` 与 `RefCell`，天然 `!Send + !Sync`）。
//!
use super::handler::{DispatchSummary, Handler, HandlerTable, dispatch_chain, run_isolated};
use super::queue::{DeferredQueue, QueuedEvent, Retention};
use super::scheduler::{FrameBudget, FrameScheduler};
use super::throttle::{ThrottleConfig, ThrottleDecision, ThrottleGate};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::key::EventKey;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// 发布模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PublishMode {
    /// 在 `publish` 返回前同步调用全部处理器
    #[default]
    Immediate,
    /// 无条件入队，下一帧执行
    Queued,
    /// 经节流闸门判定
    Throttled,
}

/// 一次发布的去向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// 已同步执行
    Dispatched(DispatchSummary),
    /// 已进入延迟队列
    Deferred,
    /// 被节流策略丢弃
    Dropped,
    /// 未被受理（类型不匹配、键被禁用、引擎已关闭或未知键名）
    Rejected,
}

/// 最近一帧的宿主时间
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    pub delta: f32,
    pub unscaled_delta: f32,
}

/// 单帧处理报告
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    pub frame: u64,
    /// 裁剪丢弃的条目数
    pub trimmed: usize,
    /// 本帧执行的条目数
    pub processed: usize,
    /// 其中为保证前进而强制执行的条目数
    pub forced: usize,
    /// 执行中出现失败的处理器调用数
    pub failed: usize,
    /// 帧结束时仍在队列中的条目数
    pub remaining: usize,
    pub elapsed: Duration,
    /// 因时间预算耗尽而提前结束
    pub budget_exhausted: bool,
}

struct Pending<K: EventKey> {
    queue: DeferredQueue<K>,
    scheduler: FrameScheduler<K>,
}

struct TickGuard<'a>(&'a Cell<bool>);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// 事件引擎
pub struct EventEngine<K: EventKey> {
    clock: Rc<dyn Clock>,
    handlers: RefCell<HandlerTable<K>>,
    throttles: RefCell<ThrottleGate<K>>,
    pending: RefCell<Pending<K>>,
    disabled: RefCell<HashSet<K>>,
    closed: Cell<bool>,
    paused: Cell<bool>,
    in_tick: Cell<bool>,
    frame: Cell<u64>,
    frame_time: Cell<FrameTime>,
}

impl<K: EventKey> Default for EventEngine<K> {
    fn default() -> Self {
        Self::new(FrameBudget::default())
    }
}

impl<K: EventKey> EventEngine<K> {
    pub fn new(budget: FrameBudget) -> Self {
        Self::with_clock(budget, SystemClock::new())
    }

    /// 预算非法（如 NaN 或负数）时记录错误并回退到默认预算；
    /// 需要显式失败时使用 `from_config` 或 `set_frame_budget`
    pub fn with_clock(budget: FrameBudget, clock: impl Clock + 'static) -> Self {
        let budget = match budget.validate() {
            Ok(()) => budget,
            Err(err) => {
                error!(error = %err, "invalid frame budget, using defaults");
                FrameBudget::default()
            }
        };
        Self {
            clock: Rc::new(clock),
            handlers: RefCell::new(HandlerTable::new()),
            throttles: RefCell::new(ThrottleGate::new()),
            pending: RefCell::new(Pending {
                queue: DeferredQueue::new(),
                scheduler: FrameScheduler::new(budget),
            }),
            disabled: RefCell::new(HashSet::new()),
            closed: Cell::new(false),
            paused: Cell::new(false),
            in_tick: Cell::new(false),
            frame: Cell::new(0),
            frame_time: Cell::new(FrameTime::default()),
        }
    }

    /// 由配置构建：校验预算并按名称解析节流配置
    pub fn from_config(config: &EngineConfig) -> DispatchResult<Self> {
        Self::from_config_with_clock(config, SystemClock::new())
    }

    pub fn from_config_with_clock(
        config: &EngineConfig,
        clock: impl Clock + 'static,
    ) -> DispatchResult<Self> {
        config.validate()?;
        let engine = Self::with_clock(config.frame_budget, clock);
        for (name, throttle) in &config.throttles {
            let key = K::from_name(name).ok_or_else(|| DispatchError::UnknownKey {
                name: name.clone(),
            })?;
            engine.configure_throttle(key, *throttle)?;
        }
        Ok(engine)
    }

    // --- 订阅 ---

    pub fn subscribe<P: 'static>(&self, key: K, handler: Handler<P>) -> DispatchResult<()> {
        if self.closed.get() {
            warn!(key = key.name(), "subscribe on closed engine");
            return Err(DispatchError::Closed);
        }
        let id = handler.id().clone();
        let result = self.handlers.borrow_mut().subscribe(key, handler);
        match &result {
            Ok(()) => trace!(key = key.name(), handler = %id, "handler subscribed"),
            Err(err) => log_rejection("subscribe", key, err),
        }
        result
    }

    pub fn unsubscribe<P: 'static>(&self, key: K, handler: &Handler<P>) -> DispatchResult<()> {
        let result = self.handlers.borrow_mut().unsubscribe(key, handler);
        match &result {
            Ok(()) => trace!(key = key.name(), handler = %handler.id(), "handler unsubscribed"),
            Err(err) => log_rejection("unsubscribe", key, err),
        }
        result
    }

    pub fn handler_count(&self, key: K) -> usize {
        self.handlers.borrow().handler_count(key)
    }

    // --- 发布 ---

    pub fn publish<P: 'static>(&self, key: K, payload: P, mode: PublishMode) -> PublishOutcome {
        if self.closed.get() {
            warn!(key = key.name(), "publish on closed engine");
            return PublishOutcome::Rejected;
        }
        if !self.is_enabled(key) {
            trace!(key = key.name(), "publish on disabled key ignored");
            return PublishOutcome::Rejected;
        }

        match mode {
            PublishMode::Immediate => self.invoke(key, &payload),
            PublishMode::Queued => self.enqueue(key, payload, Retention::Unbounded),
            PublishMode::Throttled => {
                let now = self.clock.now();
                let decision = self.throttles.borrow_mut().check(key, now);
                match decision {
                    None => {
                        let err = DispatchError::ThrottleNotConfigured { key: key.name() };
                        warn!(key = key.name(), error = %err, "falling back to immediate");
                        self.invoke(key, &payload)
                    }
                    Some(ThrottleDecision::Allow) => self.invoke(key, &payload),
                    Some(ThrottleDecision::Drop) => {
                        trace!(key = key.name(), "throttled event dropped");
                        PublishOutcome::Dropped
                    }
                    Some(ThrottleDecision::Defer(retention)) => {
                        trace!(key = key.name(), ?retention, "throttled event deferred");
                        self.enqueue(key, payload, retention)
                    }
                }
            }
        }
    }

    /// 立即执行，忽略任何模式
    pub fn publish_now<P: 'static>(&self, key: K, payload: P) -> PublishOutcome {
        self.publish(key, payload, PublishMode::Immediate)
    }

    /// 按键名发布
    pub fn publish_by_name<P: 'static>(
        &self,
        name: &str,
        payload: P,
        mode: PublishMode,
    ) -> PublishOutcome {
        match K::from_name(name) {
            Some(key) => self.publish(key, payload, mode),
            None => {
                warn!(name, "publish on unknown event name");
                PublishOutcome::Rejected
            }
        }
    }

    fn invoke<P: 'static>(&self, key: K, payload: &P) -> PublishOutcome {
        let snapshot = self.handlers.borrow().snapshot::<P>(key);
        match snapshot {
            Ok(handlers) => PublishOutcome::Dispatched(dispatch_chain(key.name(), &handlers, payload)),
            Err(err) => {
                error!(key = key.name(), error = %err, "event dropped");
                PublishOutcome::Rejected
            }
        }
    }

    fn enqueue<P: 'static>(&self, key: K, payload: P, retention: Retention) -> PublishOutcome {
        let snapshot = self.handlers.borrow().snapshot::<P>(key);
        let handlers = match snapshot {
            Ok(handlers) => handlers,
            Err(err) => {
                error!(key = key.name(), error = %err, "event dropped");
                return PublishOutcome::Rejected;
            }
        };

        let name = key.name();
        let event = QueuedEvent::new(key, self.clock.now(), retention, move || {
            dispatch_chain(name, &handlers, &payload)
        });
        self.pending.borrow_mut().queue.push_back(event);
        PublishOutcome::Deferred
    }

    // --- 节流 ---

    /// 创建或替换键的节流窗口
    pub fn configure_throttle(&self, key: K, config: ThrottleConfig) -> DispatchResult<()> {
        let now = self.clock.now();
        let result = self.throttles.borrow_mut().configure(key, config, now);
        match &result {
            Ok(()) => debug!(key = key.name(), ?config, "throttle configured"),
            Err(err) => log_rejection("configure_throttle", key, err),
        }
        result
    }

    pub fn remove_throttle(&self, key: K) -> Option<ThrottleConfig> {
        let removed = self.throttles.borrow_mut().remove(key);
        if removed.is_some() {
            debug!(key = key.name(), "throttle removed");
        }
        removed
    }

    pub fn throttle_config(&self, key: K) -> Option<ThrottleConfig> {
        self.throttles.borrow().config(key)
    }

    // --- 键开关 ---

    pub fn disable(&self, key: K) {
        if self.disabled.borrow_mut().insert(key) {
            debug!(key = key.name(), "event key disabled");
        }
    }

    pub fn enable(&self, key: K) {
        if self.disabled.borrow_mut().remove(&key) {
            debug!(key = key.name(), "event key enabled");
        }
    }

    pub fn is_enabled(&self, key: K) -> bool {
        !self.disabled.borrow().contains(&key)
    }

    // --- 帧驱动 ---

    /// 每个宿主帧调用一次：裁剪，然后在预算内排空
    pub fn tick(&self, delta_time: f32, unscaled_delta_time: f32) -> TickReport {
        if self.in_tick.replace(true) {
            warn!("re-entrant tick ignored");
            return TickReport::default();
        }
        let _guard = TickGuard(&self.in_tick);

        if !(delta_time.is_finite() && delta_time >= 0.0)
            || !(unscaled_delta_time.is_finite() && unscaled_delta_time >= 0.0)
        {
            warn!(delta_time, unscaled_delta_time, "suspicious frame delta");
        }
        self.frame_time.set(FrameTime {
            delta: delta_time,
            unscaled_delta: unscaled_delta_time,
        });
        let frame = self.frame.get() + 1;
        self.frame.set(frame);

        let start = self.clock.now();
        let mut report = TickReport {
            frame,
            ..TickReport::default()
        };

        report.trimmed = {
            let mut pending = self.pending.borrow_mut();
            let Pending { queue, scheduler } = &mut *pending;
            scheduler.begin_tick();
            scheduler.trim(queue)
        };

        if !self.paused.get() {
            self.drain(start, &mut report);
        }

        report.remaining = self.queued_count();
        report.elapsed = self.clock.now().saturating_sub(start);
        if report.processed > 0 || report.trimmed > 0 {
            debug!(
                frame,
                processed = report.processed,
                trimmed = report.trimmed,
                forced = report.forced,
                failed = report.failed,
                remaining = report.remaining,
                budget_exhausted = report.budget_exhausted,
                "frame drained"
            );
        }
        report
    }

    fn drain(&self, start: Duration, report: &mut TickReport) {
        loop {
            let elapsed = self.clock.now().saturating_sub(start);
            let selection = {
                let mut pending = self.pending.borrow_mut();
                let Pending { queue, scheduler } = &mut *pending;
                if queue.is_empty() {
                    break;
                }
                if scheduler.budget().is_exhausted(elapsed) {
                    report.budget_exhausted = true;
                    break;
                }
                scheduler.select_next(queue)
            };
            let Some(selection) = selection else {
                break;
            };

            if selection.forced {
                report.forced += 1;
            }
            report.processed += 1;

            let key = selection.event.key();
            match run_isolated(key.name(), || Ok(selection.event.invoke())) {
                Ok(summary) => report.failed += summary.failed,
                Err(err) => {
                    report.failed += 1;
                    error!(key = key.name(), error = %err, "queued invocation failed");
                }
            }
        }
    }

    /// 暂停时仍会每帧裁剪，但不排空
    pub fn set_paused(&self, paused: bool) {
        self.paused.set(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    pub fn frame_budget(&self) -> FrameBudget {
        self.pending.borrow().scheduler.budget()
    }

    pub fn set_frame_budget(&self, budget: FrameBudget) -> DispatchResult<()> {
        budget.validate()?;
        self.pending.borrow_mut().scheduler.set_budget(budget);
        Ok(())
    }

    // --- 诊断 ---

    pub fn queued_count(&self) -> usize {
        self.pending.borrow().queue.len()
    }

    pub fn processed_this_tick(&self) -> usize {
        self.pending.borrow().scheduler.processed_this_tick()
    }

    pub fn frame(&self) -> u64 {
        self.frame.get()
    }

    pub fn last_frame_time(&self) -> FrameTime {
        self.frame_time.get()
    }

    // --- 生命周期 ---

    /// 丢弃全部待执行条目（不执行）
    pub fn clear_queue(&self) -> usize {
        let dropped = self.pending.borrow_mut().queue.clear();
        if dropped > 0 {
            trace!(dropped, "deferred queue cleared");
        }
        dropped
    }

    /// 关闭引擎：清空订阅、节流与队列，之后的订阅与发布都会被拒绝
    pub fn shutdown(&self) {
        if self.closed.replace(true) {
            return;
        }
        let handlers = self.handlers.borrow_mut().clear();
        self.throttles.borrow_mut().clear();
        let dropped = self.pending.borrow_mut().queue.clear();
        debug!(handlers, dropped, "event engine shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl<K: EventKey> Drop for EventEngine<K> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().queue.len();
        if pending > 0 {
            debug!(pending, "event engine dropped with pending events");
        }
    }
}

fn log_rejection<K: EventKey>(op: &'static str, key: K, err: &DispatchError) {
    match err {
        DispatchError::TypeMismatch { .. } => error!(op, key = key.name(), error = %err, "rejected"),
        _ => warn!(op, key = key.name(), error = %err, "rejected"),
    }
}
