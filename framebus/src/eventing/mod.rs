//! 事件子系统（eventing）
//!
//! 单线程、帧驱动的进程内发布/订阅：
//! - `HandlerTable`：按事件键维护类型化处理器链；
//! - `ThrottleGate`：按键的固定窗口节流与溢出策略；
//! - `DeferredQueue`：延迟执行的有序队列，支持任意位置删除；
//! - `FrameScheduler`：每帧裁剪并在时间预算内公平排空；
//! - `EventEngine`：组合以上组件的发布入口。
//!
pub mod engine;
pub mod handler;
pub mod queue;
pub mod scheduler;
pub mod throttle;

pub use engine::{EventEngine, FrameTime, PublishMode, PublishOutcome, TickReport};
pub use handler::{DispatchSummary, Handler, HandlerId, HandlerTable};
pub use queue::{DeferredQueue, EntryId, QueuedEvent, Retention};
pub use scheduler::{
    DEFAULT_MAX_CONSECUTIVE_PER_KEY, DEFAULT_MAX_PROCESSING_TIME_MS, FrameBudget, FrameScheduler,
    Selection,
};
pub use throttle::{OverflowStrategy, ThrottleConfig, ThrottleDecision, ThrottleGate, ThrottleWindow};
