//! 帧调度器（FrameScheduler）
//!
//! 每帧一次：先裁剪（DropOldest），再在时间预算内按键公平地排空延迟队列。
//!
//! ```text
//! tick ──► trim ──► begin drain
//!                     │
//!          ┌──────────┴──────────────────────────────────────────┐
//!          │ elapsed >= budget 或队列为空 ─► 结束                 │
//!          │ 从游标起向后（回绕）找第一个 count(key) < cap 的条目   │
//!          │   ├─ 找到    ─► 执行，游标移到后继，count(key) += 1    │
//!          │   │            （越过尾部回绕时开启新一轮，计数清零）   │
//!          │   └─ 全部封顶 ─► 计数清零，从队头开启新一轮            │
//!          │                 （cap 为 0 时强制执行扫描起点条目）     │
//!          └─────────────────────────────────────────────────────┘
//! ```
//!
use super::queue::{DeferredQueue, EntryId, QueuedEvent, Retention};
use crate::error::{DispatchError, DispatchResult};
use crate::key::EventKey;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

pub const DEFAULT_MAX_PROCESSING_TIME_MS: f64 = 2.0;
pub const DEFAULT_MAX_CONSECUTIVE_PER_KEY: u32 = 3;

/// 每帧预算
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameBudget {
    /// 单帧排空的墙钟上限（毫秒）
    #[builder(default = DEFAULT_MAX_PROCESSING_TIME_MS)]
    pub max_processing_time_ms: f64,
    /// 同一键在一轮公平调度中最多连续执行的次数
    #[builder(default = DEFAULT_MAX_CONSECUTIVE_PER_KEY)]
    pub max_consecutive_per_key: u32,
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self {
            max_processing_time_ms: DEFAULT_MAX_PROCESSING_TIME_MS,
            max_consecutive_per_key: DEFAULT_MAX_CONSECUTIVE_PER_KEY,
        }
    }
}

impl FrameBudget {
    /// 不限时的预算（仅受公平性约束）
    pub fn unlimited(max_consecutive_per_key: u32) -> Self {
        Self {
            max_processing_time_ms: f64::INFINITY,
            max_consecutive_per_key,
        }
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.max_processing_time_ms.is_nan() || self.max_processing_time_ms < 0.0 {
            return Err(DispatchError::invalid_config(format!(
                "max_processing_time_ms must be >= 0, got {}",
                self.max_processing_time_ms
            )));
        }
        Ok(())
    }

    pub fn is_exhausted(&self, elapsed: Duration) -> bool {
        let elapsed_ms = elapsed.as_nanos() as f64 / 1_000_000.0;
        elapsed_ms >= self.max_processing_time_ms
    }
}

/// 一次选取的结果
#[derive(Debug)]
pub struct Selection<K> {
    pub event: QueuedEvent<K>,
    /// 所有键均已封顶时为保证前进而强制执行
    pub forced: bool,
}

pub struct FrameScheduler<K: EventKey> {
    budget: FrameBudget,
    cursor: Option<EntryId>,
    consecutive: HashMap<K, u32>,
    processed_this_tick: usize,
}

impl<K: EventKey> FrameScheduler<K> {
    pub fn new(budget: FrameBudget) -> Self {
        Self {
            budget,
            cursor: None,
            consecutive: HashMap::new(),
            processed_this_tick: 0,
        }
    }

    pub fn budget(&self) -> FrameBudget {
        self.budget
    }

    pub fn set_budget(&mut self, budget: FrameBudget) {
        self.budget = budget;
    }

    pub fn processed_this_tick(&self) -> usize {
        self.processed_this_tick
    }

    pub fn cursor(&self) -> Option<EntryId> {
        self.cursor
    }

    /// 帧开始：清空本帧计数
    pub fn begin_tick(&mut self) {
        self.consecutive.clear();
        self.processed_this_tick = 0;
    }

    /// 裁剪 DropOldest 标记条目，返回被丢弃数
    pub fn trim(&mut self, queue: &mut DeferredQueue<K>) -> usize {
        let mut tagged: HashMap<K, (usize, Vec<(Duration, u64, EntryId)>)> = HashMap::new();
        for (id, event) in queue.iter() {
            if let Retention::DropOldest { max_queued } = event.retention() {
                let (bound, entries) = tagged
                    .entry(event.key())
                    .or_insert_with(|| (max_queued, Vec::new()));
                // 以最新条目携带的上限为准
                *bound = max_queued;
                entries.push((event.enqueued_at(), event.seq(), id));
            }
        }

        let mut trimmed = 0;
        for (key, (bound, mut entries)) in tagged {
            if entries.len() <= bound {
                continue;
            }
            entries.sort_by_key(|&(at, seq, _)| (at, seq));
            let surplus = entries.len() - bound;
            for &(_, _, id) in entries.iter().take(surplus) {
                if queue.remove(id).is_some() {
                    trimmed += 1;
                }
            }
            trace!(key = key.name(), surplus, bound, "dropped oldest queued events");
        }
        trimmed
    }

    /// 取出下一条应执行的条目，并推进游标与计数
    pub fn select_next(&mut self, queue: &mut DeferredQueue<K>) -> Option<Selection<K>> {
        let scan_start = self
            .cursor
            .filter(|id| queue.contains(*id))
            .or_else(|| queue.front())?;
        let cap = self.budget.max_consecutive_per_key;

        let (target, forced) = match self.scan_eligible(queue, scan_start) {
            Some(id) => (id, false),
            None => {
                self.consecutive.clear();
                match queue.front() {
                    Some(head) if cap > 0 => (head, false),
                    _ => (scan_start, true),
                }
            }
        };

        let next = queue.next(target);
        let wraps = next.is_none();
        let event = queue.remove(target)?;
        self.cursor = next.or_else(|| queue.front());

        *self.consecutive.entry(event.key()).or_insert(0) += 1;
        if wraps {
            self.consecutive.clear();
        }
        self.processed_this_tick += 1;

        Some(Selection { event, forced })
    }

    fn scan_eligible(&self, queue: &DeferredQueue<K>, start: EntryId) -> Option<EntryId> {
        let cap = self.budget.max_consecutive_per_key;
        let mut id = start;
        for _ in 0..queue.len() {
            let event = queue.get(id)?;
            if self.consecutive.get(&event.key()).copied().unwrap_or(0) < cap {
                return Some(id);
            }
            id = queue.next_wrapping(id)?;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::handler::DispatchSummary;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Key {
        A,
        B,
        C,
    }

    impl EventKey for Key {
        fn name(&self) -> &'static str {
            match self {
                Key::A => "A",
                Key::B => "B",
                Key::C => "C",
            }
        }

        fn all() -> &'static [Self] {
            &[Key::A, Key::B, Key::C]
        }
    }

    fn push(queue: &mut DeferredQueue<Key>, key: Key, at_ms: u64, retention: Retention) {
        queue.push_back(QueuedEvent::new(
            key,
            Duration::from_millis(at_ms),
            retention,
            DispatchSummary::default,
        ));
    }

    fn drain_all(scheduler: &mut FrameScheduler<Key>, queue: &mut DeferredQueue<Key>) -> Vec<Key> {
        scheduler.begin_tick();
        let mut order = Vec::new();
        while let Some(sel) = scheduler.select_next(queue) {
            order.push(sel.event.key());
        }
        order
    }

    #[test]
    fn trim_keeps_newest_per_key() {
        let mut queue = DeferredQueue::new();
        let tag = Retention::DropOldest { max_queued: 2 };
        push(&mut queue, Key::A, 30, tag);
        push(&mut queue, Key::A, 10, tag);
        push(&mut queue, Key::B, 5, tag);
        push(&mut queue, Key::A, 20, tag);
        push(&mut queue, Key::A, 0, Retention::Unbounded);

        let mut scheduler = FrameScheduler::new(FrameBudget::default());
        assert_eq!(scheduler.trim(&mut queue), 1);

        let left: Vec<(Key, Duration)> = queue
            .iter()
            .map(|(_, e)| (e.key(), e.enqueued_at()))
            .collect();
        assert_eq!(
            left,
            vec![
                (Key::A, Duration::from_millis(30)),
                (Key::B, Duration::from_millis(5)),
                (Key::A, Duration::from_millis(20)),
                (Key::A, Duration::from_millis(0)),
            ]
        );
    }

    #[test]
    fn trim_uses_newest_bound_and_seq_for_ties() {
        let mut queue = DeferredQueue::new();
        push(&mut queue, Key::C, 0, Retention::DropOldest { max_queued: 3 });
        push(&mut queue, Key::C, 0, Retention::DropOldest { max_queued: 3 });
        push(&mut queue, Key::C, 0, Retention::DropOldest { max_queued: 1 });

        let mut scheduler = FrameScheduler::new(FrameBudget::default());
        assert_eq!(scheduler.trim(&mut queue), 2);
        let (_, survivor) = queue.iter().next().unwrap();
        assert_eq!(survivor.seq(), 2);
    }

    #[test]
    fn blocks_of_two_keys_alternate_in_rounds_of_cap() {
        let mut queue = DeferredQueue::new();
        for i in 0..5 {
            push(&mut queue, Key::A, i, Retention::Unbounded);
        }
        for i in 0..5 {
            push(&mut queue, Key::B, 10 + i, Retention::Unbounded);
        }

        let mut scheduler = FrameScheduler::new(FrameBudget::unlimited(3));
        let order = drain_all(&mut scheduler, &mut queue);
        use Key::{A, B};
        assert_eq!(order, vec![A, A, A, B, B, B, A, A, B, B]);
        assert_eq!(scheduler.processed_this_tick(), 10);
    }

    #[test]
    fn interleaved_keys_keep_queue_order() {
        let mut queue = DeferredQueue::new();
        for i in 0..3 {
            push(&mut queue, Key::A, i, Retention::Unbounded);
            push(&mut queue, Key::B, i, Retention::Unbounded);
            push(&mut queue, Key::C, i, Retention::Unbounded);
        }

        let mut scheduler = FrameScheduler::new(FrameBudget::unlimited(1));
        let order = drain_all(&mut scheduler, &mut queue);
        use Key::{A, B, C};
        assert_eq!(order, vec![A, B, C, A, B, C, A, B, C]);
    }

    #[test]
    fn zero_cap_still_makes_progress() {
        let mut queue = DeferredQueue::new();
        push(&mut queue, Key::A, 0, Retention::Unbounded);
        push(&mut queue, Key::B, 1, Retention::Unbounded);

        let mut scheduler = FrameScheduler::new(FrameBudget::unlimited(0));
        scheduler.begin_tick();
        let first = scheduler.select_next(&mut queue).unwrap();
        assert!(first.forced);
        assert_eq!(first.event.key(), Key::A);
        let second = scheduler.select_next(&mut queue).unwrap();
        assert!(second.forced);
        assert!(scheduler.select_next(&mut queue).is_none());
    }

    #[test]
    fn cursor_survives_across_ticks() {
        let mut queue = DeferredQueue::new();
        for i in 0..4 {
            push(&mut queue, Key::A, i, Retention::Unbounded);
        }
        push(&mut queue, Key::B, 10, Retention::Unbounded);

        let mut scheduler = FrameScheduler::new(FrameBudget::unlimited(2));
        scheduler.begin_tick();
        assert_eq!(scheduler.select_next(&mut queue).unwrap().event.key(), Key::A);
        assert_eq!(scheduler.select_next(&mut queue).unwrap().event.key(), Key::A);

        // 下一帧从游标处继续：A 计数已重置
        scheduler.begin_tick();
        let cursor = scheduler.cursor().unwrap();
        assert_eq!(queue.get(cursor).unwrap().seq(), 2);
        assert_eq!(scheduler.select_next(&mut queue).unwrap().event.seq(), 2);
    }

    #[test]
    fn budget_exhaustion_is_inclusive() {
        let budget = FrameBudget::builder().max_processing_time_ms(2.0).build();
        assert!(!budget.is_exhausted(Duration::from_micros(1999)));
        assert!(budget.is_exhausted(Duration::from_millis(2)));
        assert!(!FrameBudget::unlimited(3).is_exhausted(Duration::from_secs(3600)));
        assert!(
            FrameBudget {
                max_processing_time_ms: -1.0,
                ..FrameBudget::default()
            }
            .validate()
            .is_err()
        );
    }
}
