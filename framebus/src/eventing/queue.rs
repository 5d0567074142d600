//! 延迟队列（DeferredQueue）
//!
//! 基于 slab 的双向链表：尾部追加 O(1)，任意位置删除 O(1)。
//! 条目以带代数的 `EntryId` 寻址，已删除条目的旧 id 不会命中复用的槽位。
//!
use super::handler::DispatchSummary;
use crate::key::EventKey;
use std::fmt;
use std::time::Duration;

/// 条目的保留策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Retention {
    /// 不参与裁剪
    #[default]
    Unbounded,
    /// 同键标记条目最多保留 `max_queued` 条，超出时先丢最旧的
    DropOldest { max_queued: usize },
}

type Invocation = Box<dyn FnOnce() -> DispatchSummary>;

/// 一条待执行事件：入队时已绑定载荷与处理器链快照
pub struct QueuedEvent<K> {
    key: K,
    invocation: Invocation,
    enqueued_at: Duration,
    retention: Retention,
    seq: u64,
}

impl<K: EventKey> QueuedEvent<K> {
    pub fn new<F>(key: K, enqueued_at: Duration, retention: Retention, invocation: F) -> Self
    where
        F: FnOnce() -> DispatchSummary + 'static,
    {
        Self {
            key,
            invocation: Box::new(invocation),
            enqueued_at,
            retention,
            seq: 0,
        }
    }

    pub fn key(&self) -> K {
        self.key
    }

    pub fn enqueued_at(&self) -> Duration {
        self.enqueued_at
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// 入队序号，时间戳相同时用于排序
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn invoke(self) -> DispatchSummary {
        (self.invocation)()
    }
}

impl<K: fmt::Debug> fmt::Debug for QueuedEvent<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("key", &self.key)
            .field("enqueued_at", &self.enqueued_at)
            .field("retention", &self.retention)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// 队列条目句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId {
    index: usize,
    generation: u64,
}

struct Node<K> {
    event: QueuedEvent<K>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot<K> {
    generation: u64,
    node: Option<Node<K>>,
}

pub struct DeferredQueue<K> {
    slots: Vec<Slot<K>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    next_seq: u64,
}

impl<K> Default for DeferredQueue<K> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            next_seq: 0,
        }
    }
}

impl<K: EventKey> DeferredQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 追加到尾部并分配入队序号
    pub fn push_back(&mut self, mut event: QueuedEvent<K>) -> EntryId {
        event.seq = self.next_seq;
        self.next_seq += 1;

        let node = Node {
            event,
            prev: self.tail,
            next: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.link_next(tail, Some(index)),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        EntryId {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// 删除任意条目；id 失效时返回 `None`
    pub fn remove(&mut self, id: EntryId) -> Option<QueuedEvent<K>> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation += 1;
        self.free.push(id.index);

        match node.prev {
            Some(prev) => self.link_next(prev, node.next),
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.link_prev(next, node.prev),
            None => self.tail = node.prev,
        }
        self.len -= 1;
        Some(node.event)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: EntryId) -> Option<&QueuedEvent<K>> {
        self.node(id).map(|n| &n.event)
    }

    pub fn front(&self) -> Option<EntryId> {
        self.head.and_then(|i| self.id_at(i))
    }

    pub fn back(&self) -> Option<EntryId> {
        self.tail.and_then(|i| self.id_at(i))
    }

    /// 后继条目；位于尾部时为 `None`
    pub fn next(&self, id: EntryId) -> Option<EntryId> {
        self.node(id)?.next.and_then(|i| self.id_at(i))
    }

    /// 后继条目，越过尾部时回绕到头部
    pub fn next_wrapping(&self, id: EntryId) -> Option<EntryId> {
        if !self.contains(id) {
            return None;
        }
        self.next(id).or_else(|| self.front())
    }

    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            queue: self,
            cursor: self.head,
        }
    }

    /// 丢弃全部条目（不执行），返回丢弃数
    pub fn clear(&mut self) -> usize {
        let dropped = self.len;
        while let Some(id) = self.front() {
            self.remove(id);
        }
        dropped
    }

    fn node(&self, id: EntryId) -> Option<&Node<K>> {
        let slot = self.slots.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn id_at(&self, index: usize) -> Option<EntryId> {
        let slot = self.slots.get(index)?;
        slot.node.as_ref().map(|_| EntryId {
            index,
            generation: slot.generation,
        })
    }

    fn link_next(&mut self, index: usize, next: Option<usize>) {
        if let Some(node) = self.slots[index].node.as_mut() {
            node.next = next;
        }
    }

    fn link_prev(&mut self, index: usize, prev: Option<usize>) {
        if let Some(node) = self.slots[index].node.as_mut() {
            node.prev = prev;
        }
    }
}

/// 按队列顺序遍历 `(EntryId, &QueuedEvent)`
pub struct Iter<'a, K> {
    queue: &'a DeferredQueue<K>,
    cursor: Option<usize>,
}

impl<'a, K: EventKey> Iterator for Iter<'a, K> {
    type Item = (EntryId, &'a QueuedEvent<K>);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.queue.slots[index];
        let node = slot.node.as_ref()?;
        self.cursor = node.next;
        Some((
            EntryId {
                index,
                generation: slot.generation,
            },
            &node.event,
        ))
    }
}
