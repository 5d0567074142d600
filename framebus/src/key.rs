//! 事件键（EventKey）
//!
//! 事件键是启动时即已知的封闭集合，通常为无字段枚举。
//! 推荐使用 `framebus_macros::event_key` 属性宏声明：
//!
//! ```ignore
//! use framebus_macros::event_key;
//!
//! #[event_key]
//! enum GameEvent {
//!     PlayerMoved,
//!     ScoreChanged,
//! }
//! ```
//!
use std::fmt::Debug;
use std::hash::Hash;

/// 事件键：不透明、可枚举、启动时已知
pub trait EventKey: Copy + Eq + Hash + Debug + 'static {
    /// 键名（用于日志与按名发布）
    fn name(&self) -> &'static str;

    /// 全部键（声明顺序）
    fn all() -> &'static [Self];

    /// 按名称解析，大小写不敏感
    fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Manual {
        Open,
        Close,
    }

    impl EventKey for Manual {
        fn name(&self) -> &'static str {
            match self {
                Manual::Open => "Open",
                Manual::Close => "Close",
            }
        }

        fn all() -> &'static [Self] {
            &[Manual::Open, Manual::Close]
        }
    }

    #[test]
    fn from_name_ignores_case() {
        assert_eq!(Manual::from_name("close"), Some(Manual::Close));
        assert_eq!(Manual::from_name("OPEN"), Some(Manual::Open));
        assert_eq!(Manual::from_name("Resume"), None);
    }
}
