//! 时钟（Clock）
//!
//! 引擎读取时间的唯一入口：节流窗口、入队时间戳与每帧预算都基于它。
//! - `SystemClock`：单调时钟（`Instant`），生产默认；
//! - `ManualClock`：由宿主或测试显式推进，便于确定性回放。
//!
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// 时间源：返回自时钟原点以来经过的时长
pub trait Clock {
    fn now(&self) -> Duration;
}

/// 基于 `Instant` 的单调时钟
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// 手动推进的时钟；克隆共享同一时间线
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置绝对时间
    pub fn set(&self, at: Duration) {
        self.now.set(at);
    }

    /// 以秒为单位设置绝对时间
    pub fn set_secs(&self, secs: f64) {
        self.now.set(Duration::from_secs_f64(secs.max(0.0)));
    }

    /// 向前推进
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_timeline() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        other.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(500));

        clock.set_secs(-1.0);
        assert_eq!(other.now(), Duration::ZERO);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
