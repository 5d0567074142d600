//! 事件引擎统一错误定义
//!
//! 覆盖订阅/退订、载荷类型校验、节流配置、处理器执行与配置加载等最小必要集合。
//! 引擎内部的失败一律在本地吸收并记录日志，注册与配置类调用额外以
//! `DispatchResult` 的形式返回给调用方。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    // --- 订阅表 ---
    #[error("duplicate handler: key={key}, handler={handler}")]
    DuplicateHandler { key: &'static str, handler: String },
    #[error("unknown handler: key={key}, handler={handler}")]
    UnknownHandler { key: &'static str, handler: String },
    #[error("type mismatch: key={key}, expected={expected}, found={found}")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    // --- 节流与执行 ---
    #[error("throttle not configured: key={key}")]
    ThrottleNotConfigured { key: &'static str },
    #[error("handler failed: key={key}, reason={reason}")]
    HandlerFailed { key: &'static str, reason: String },

    // --- 配置与生命周期 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("unknown event key: {name}")]
    UnknownKey { name: String },
    #[error("engine closed")]
    Closed,

    // --- 配置解码 ---
    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("toml error: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// 统一 Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        DispatchError::InvalidConfig {
            reason: reason.into(),
        }
    }
}
