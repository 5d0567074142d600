//! 节流闸门（ThrottleGate）
//!
//! 每个事件键一个固定时长窗口计数器：窗口内超过上限的发布按溢出策略处理，
//! 窗口到期后在下一次检查时重置。窗口只能通过显式配置创建、显式移除销毁。
//!
use super::queue::Retention;
use crate::error::{DispatchError, DispatchResult};
use crate::key::EventKey;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 超出窗口上限时的处理策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// 直接丢弃（仅 trace 日志）
    AlwaysDrop,
    /// 入队并标记，按键保留最新的 `max_queued_for_key` 条
    DropOldest,
    /// 入队且不设上限
    #[default]
    AddToQueue,
}

/// 单个键的节流配置
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// 每个窗口内允许立即执行的次数
    pub max_events_per_window: u32,
    /// 窗口时长（秒）
    pub window_seconds: f64,
    #[builder(default)]
    #[serde(default)]
    pub strategy: OverflowStrategy,
    /// 仅对 `DropOldest` 生效
    #[builder(default = 1)]
    #[serde(default = "default_max_queued_for_key")]
    pub max_queued_for_key: usize,
}

fn default_max_queued_for_key() -> usize {
    1
}

impl ThrottleConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if !self.window_seconds.is_finite() || self.window_seconds <= 0.0 {
            return Err(DispatchError::invalid_config(format!(
                "window_seconds must be a positive finite number, got {}",
                self.window_seconds
            )));
        }
        if self.strategy == OverflowStrategy::DropOldest && self.max_queued_for_key == 0 {
            return Err(DispatchError::invalid_config(
                "max_queued_for_key must be at least 1 for drop_oldest",
            ));
        }
        Ok(())
    }
}

/// 一个键的窗口状态
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThrottleWindow {
    config: ThrottleConfig,
    count: u32,
    window_start: Duration,
}

impl ThrottleWindow {
    fn new(config: ThrottleConfig, now: Duration) -> Self {
        Self {
            config,
            count: 0,
            window_start: now,
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn window_start(&self) -> Duration {
        self.window_start
    }

    fn is_throttled(&mut self, now: Duration) -> bool {
        let elapsed = now.saturating_sub(self.window_start);
        if elapsed.as_secs_f64() >= self.config.window_seconds {
            self.count = 0;
            self.window_start = now;
            return false;
        }
        if self.count >= self.config.max_events_per_window {
            return true;
        }
        self.count += 1;
        false
    }
}

/// 节流判定结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// 未超限，立即执行
    Allow,
    /// 超限且策略为丢弃
    Drop,
    /// 超限，按给定保留策略入队
    Defer(Retention),
}

/// 节流闸门：事件键 -> 窗口
pub struct ThrottleGate<K: EventKey> {
    windows: HashMap<K, ThrottleWindow>,
}

impl<K: EventKey> Default for ThrottleGate<K> {
    fn default() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }
}

impl<K: EventKey> ThrottleGate<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建或替换窗口；窗口起点为 `now`
    pub fn configure(&mut self, key: K, config: ThrottleConfig, now: Duration) -> DispatchResult<()> {
        config.validate()?;
        self.windows.insert(key, ThrottleWindow::new(config, now));
        Ok(())
    }

    pub fn remove(&mut self, key: K) -> Option<ThrottleConfig> {
        self.windows.remove(&key).map(|w| w.config)
    }

    pub fn config(&self, key: K) -> Option<ThrottleConfig> {
        self.windows.get(&key).map(|w| w.config)
    }

    pub fn window(&self, key: K) -> Option<&ThrottleWindow> {
        self.windows.get(&key)
    }

    /// 窗口计数检查；未配置时返回 `None`
    pub fn is_throttled(&mut self, key: K, now: Duration) -> Option<bool> {
        self.windows.get_mut(&key).map(|w| w.is_throttled(now))
    }

    /// 计数检查并映射为溢出策略
    pub fn check(&mut self, key: K, now: Duration) -> Option<ThrottleDecision> {
        let window = self.windows.get_mut(&key)?;
        if !window.is_throttled(now) {
            return Some(ThrottleDecision::Allow);
        }
        let decision = match window.config.strategy {
            OverflowStrategy::AlwaysDrop => ThrottleDecision::Drop,
            OverflowStrategy::DropOldest => ThrottleDecision::Defer(Retention::DropOldest {
                max_queued: window.config.max_queued_for_key,
            }),
            OverflowStrategy::AddToQueue => ThrottleDecision::Defer(Retention::Unbounded),
        };
        Some(decision)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Key {
        Move,
    }

    impl EventKey for Key {
        fn name(&self) -> &'static str {
            "Move"
        }

        fn all() -> &'static [Self] {
            &[Key::Move]
        }
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn config(strategy: OverflowStrategy) -> ThrottleConfig {
        ThrottleConfig::builder()
            .max_events_per_window(2)
            .window_seconds(1.0)
            .strategy(strategy)
            .build()
    }

    #[test]
    fn window_allows_max_then_throttles() {
        let mut gate = ThrottleGate::new();
        gate.configure(Key::Move, config(OverflowStrategy::AddToQueue), secs(0.0))
            .unwrap();

        assert_eq!(gate.is_throttled(Key::Move, secs(0.0)), Some(false));
        assert_eq!(gate.is_throttled(Key::Move, secs(0.0)), Some(false));
        assert_eq!(gate.is_throttled(Key::Move, secs(0.0)), Some(true));
        assert_eq!(gate.is_throttled(Key::Move, secs(0.5)), Some(true));
        assert_eq!(gate.window(Key::Move).unwrap().count(), 2);
    }

    #[test]
    fn expired_window_resets_on_check() {
        let mut gate = ThrottleGate::new();
        gate.configure(Key::Move, config(OverflowStrategy::AddToQueue), secs(0.0))
            .unwrap();
        gate.is_throttled(Key::Move, secs(0.1));
        gate.is_throttled(Key::Move, secs(0.2));
        assert_eq!(gate.is_throttled(Key::Move, secs(0.3)), Some(true));

        assert_eq!(gate.is_throttled(Key::Move, secs(1.0)), Some(false));
        let window = gate.window(Key::Move).unwrap();
        assert_eq!(window.count(), 0);
        assert_eq!(window.window_start(), secs(1.0));
    }

    #[test]
    fn decision_follows_strategy() {
        let mut gate = ThrottleGate::new();
        let cases = [
            (OverflowStrategy::AlwaysDrop, ThrottleDecision::Drop),
            (
                OverflowStrategy::DropOldest,
                ThrottleDecision::Defer(Retention::DropOldest { max_queued: 1 }),
            ),
            (
                OverflowStrategy::AddToQueue,
                ThrottleDecision::Defer(Retention::Unbounded),
            ),
        ];
        for (strategy, expected) in cases {
            gate.configure(Key::Move, config(strategy), secs(0.0)).unwrap();
            assert_eq!(gate.check(Key::Move, secs(0.0)), Some(ThrottleDecision::Allow));
            assert_eq!(gate.check(Key::Move, secs(0.0)), Some(ThrottleDecision::Allow));
            assert_eq!(gate.check(Key::Move, secs(0.0)), Some(expected));
        }
    }

    #[test]
    fn unconfigured_and_removed_keys_are_none() {
        let mut gate = ThrottleGate::new();
        assert_eq!(gate.check(Key::Move, secs(0.0)), None);

        gate.configure(Key::Move, config(OverflowStrategy::AlwaysDrop), secs(0.0))
            .unwrap();
        assert_eq!(
            gate.remove(Key::Move).map(|c| c.strategy),
            Some(OverflowStrategy::AlwaysDrop)
        );
        assert_eq!(gate.is_throttled(Key::Move, secs(0.0)), None);
        assert!(gate.is_empty());
    }

    #[test]
    fn invalid_config_keeps_existing_window() {
        let mut gate = ThrottleGate::new();
        gate.configure(Key::Move, config(OverflowStrategy::AddToQueue), secs(0.0))
            .unwrap();

        let bad = ThrottleConfig {
            window_seconds: 0.0,
            ..config(OverflowStrategy::AddToQueue)
        };
        assert!(matches!(
            gate.configure(Key::Move, bad, secs(0.0)),
            Err(DispatchError::InvalidConfig { .. })
        ));

        let bad = ThrottleConfig {
            max_queued_for_key: 0,
            ..config(OverflowStrategy::DropOldest)
        };
        assert!(gate.configure(Key::Move, bad, secs(0.0)).is_err());
        assert_eq!(gate.config(Key::Move).unwrap().window_seconds, 1.0);
    }
}
