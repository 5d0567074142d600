//! 帧驱动事件总线（framebus）
//!
//! 面向游戏循环、UI 等“每帧 tick 一次”宿主的进程内事件分发：
//! - 事件键（`key`）：启动时已知的封闭集合，配合 `framebus_macros::event_key` 声明
//! - 处理器与订阅表（`eventing::handler`）：结构化身份，重复订阅被拒绝
//! - 节流（`eventing::throttle`）：固定窗口计数 + 丢弃 / 保留最新 / 入队三种溢出策略
//! - 延迟队列与帧调度（`eventing::queue`、`eventing::scheduler`）：
//!   每帧先裁剪，再在毫秒级预算内按键公平排空
//! - 时钟（`clock`）与配置（`config`）：可注入时间源，JSON / TOML 配置加载
//!
//! 典型用法：
//! 1. 用 `#[event_key]` 声明事件枚举；
//! 2. 构建 `EventEngine` 并为各键订阅 `Handler`；
//! 3. 业务代码以 `PublishMode` 发布事件；
//! 4. 宿主循环每帧调用一次 `tick`。
//!
//! 引擎是单线程的：所有状态只在宿主线程上访问，处理器可以重入发布。
//!
pub mod clock;
pub mod config;
pub mod error;
pub mod eventing;
pub mod key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{DispatchError, DispatchResult};
pub use eventing::{
    DispatchSummary, EventEngine, FrameBudget, Handler, HandlerId, OverflowStrategy, PublishMode,
    PublishOutcome, ThrottleConfig, TickReport,
};
pub use key::EventKey;

// 允许在本 crate 内部通过 ::framebus 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::framebus 路径。
extern crate self as framebus;
