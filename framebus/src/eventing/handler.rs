//! 事件处理器（Handler）与订阅表（HandlerTable）
//!
//! - `Handler<P>`：绑定到某一载荷类型 `P` 的回调，携带结构化身份 `HandlerId`；
//! - `HandlerTable`：按事件键维护有序处理器链，链在订阅时即确定载荷类型，
//!   发布时通过 `Any` 向下转型取回，失败即视为类型不匹配。
//!
//! 身份比较基于“函数 + 接收者”而非回调对象本身，
//! 因此重新构造同一目标的 `Handler` 也能正确退订。
//!
use crate::error::{DispatchError, DispatchResult};
use crate::key::EventKey;
use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use tracing::{error, trace};

type Callback<P> = Rc<dyn Fn(&P) -> anyhow::Result<()>>;

/// 处理器的结构化身份
///
/// 函数与方法以函数项的类型区分：每个函数项都是独立的零大小类型，
/// 不依赖函数地址（优化后相同函数体可能共享地址）。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HandlerId {
    /// 普通函数
    Function { item: TypeId, name: &'static str },
    /// 绑定到某个 `Rc` 接收者的方法
    Method {
        item: TypeId,
        name: &'static str,
        receiver: usize,
    },
    /// 由调用方提供稳定标签的任意闭包
    Tagged(Cow<'static, str>),
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerId::Function { name, .. } => write!(f, "fn:{name}"),
            HandlerId::Method { name, receiver, .. } => write!(f, "method:{name}#{receiver:#x}"),
            HandlerId::Tagged(tag) => write!(f, "tag:{tag}"),
        }
    }
}

/// 类型化处理器
pub struct Handler<P> {
    id: HandlerId,
    callback: Callback<P>,
}

impl<P> Clone for Handler<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<P> fmt::Debug for Handler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("payload", &type_name::<P>())
            .finish()
    }
}

impl<P: 'static> Handler<P> {
    /// 由函数项（或不捕获的闭包）构造，身份为其类型
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&P) -> anyhow::Result<()> + Copy + 'static,
    {
        const {
            assert!(
                size_of::<F>() == 0,
                "Handler::from_fn takes a fn item; use Handler::tagged for capturing closures"
            )
        };
        Self {
            id: HandlerId::Function {
                item: TypeId::of::<F>(),
                name: type_name::<F>(),
            },
            callback: Rc::new(f),
        }
    }

    /// 绑定到接收者的方法；接收者以弱引用持有，释放后调用变为空操作
    pub fn method<R, F>(receiver: &Rc<R>, method: F) -> Self
    where
        R: 'static,
        F: Fn(&R, &P) -> anyhow::Result<()> + Copy + 'static,
    {
        const {
            assert!(
                size_of::<F>() == 0,
                "Handler::method takes a fn item such as `Type::method`"
            )
        };
        let weak: Weak<R> = Rc::downgrade(receiver);
        let id = HandlerId::Method {
            item: TypeId::of::<F>(),
            name: type_name::<F>(),
            receiver: Rc::as_ptr(receiver) as *const () as usize,
        };
        let callback: Callback<P> = Rc::new(move |payload: &P| match weak.upgrade() {
            Some(receiver) => method(&*receiver, payload),
            None => {
                trace!(receiver = type_name::<R>(), "receiver dropped, handler skipped");
                Ok(())
            }
        });
        Self { id, callback }
    }

    /// 任意闭包 + 稳定标签；同一标签视为同一处理器
    pub fn tagged<F>(tag: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(&P) -> anyhow::Result<()> + 'static,
    {
        Self {
            id: HandlerId::Tagged(tag.into()),
            callback: Rc::new(f),
        }
    }

    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    pub(crate) fn call(&self, payload: &P) -> anyhow::Result<()> {
        (self.callback)(payload)
    }
}

/// 一次分发的结果统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// 被调用的处理器数
    pub invoked: usize,
    /// 其中返回错误或 panic 的数量
    pub failed: usize,
}

/// 在隔离边界内执行用户代码：错误与 panic 都被转换为 `HandlerFailed`
pub(crate) fn run_isolated<T>(
    key: &'static str,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> DispatchResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(DispatchError::HandlerFailed {
            key,
            reason: format!("{err:#}"),
        }),
        Err(payload) => Err(DispatchError::HandlerFailed {
            key,
            reason: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// 按订阅顺序依次调用处理器链，单个失败不影响其余处理器
pub(crate) fn dispatch_chain<P>(
    key: &'static str,
    handlers: &[Handler<P>],
    payload: &P,
) -> DispatchSummary
where
    P: 'static,
{
    let mut summary = DispatchSummary::default();
    for handler in handlers {
        summary.invoked += 1;
        if let Err(err) = run_isolated(key, || handler.call(payload)) {
            summary.failed += 1;
            error!(key, handler = %handler.id(), error = %err, "event handler failed");
        }
    }
    summary
}

trait Records {
    fn len(&self) -> usize;
    fn contains_id(&self, id: &HandlerId) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: 'static> Records for Vec<Handler<P>> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn contains_id(&self, id: &HandlerId) -> bool {
        self.iter().any(|h| &h.id == id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Chain {
    payload: TypeId,
    payload_name: &'static str,
    records: Box<dyn Records>,
}

impl Chain {
    fn new<P: 'static>(first: Handler<P>) -> Self {
        Self {
            payload: TypeId::of::<P>(),
            payload_name: type_name::<P>(),
            records: Box::new(vec![first]),
        }
    }

    fn typed<P: 'static>(&self) -> Option<&Vec<Handler<P>>> {
        if self.payload != TypeId::of::<P>() {
            return None;
        }
        self.records.as_any().downcast_ref::<Vec<Handler<P>>>()
    }

    fn typed_mut<P: 'static>(&mut self) -> Option<&mut Vec<Handler<P>>> {
        if self.payload != TypeId::of::<P>() {
            return None;
        }
        self.records.as_any_mut().downcast_mut::<Vec<Handler<P>>>()
    }
}

/// 订阅表：事件键 -> 类型化处理器链
pub struct HandlerTable<K: EventKey> {
    chains: HashMap<K, Chain>,
}

impl<K: EventKey> Default for HandlerTable<K> {
    fn default() -> Self {
        Self {
            chains: HashMap::new(),
        }
    }
}

impl<K: EventKey> HandlerTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加处理器；重复身份或载荷类型不一致时拒绝且不改变状态
    pub fn subscribe<P: 'static>(&mut self, key: K, handler: Handler<P>) -> DispatchResult<()> {
        let chain = match self.chains.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Chain::new(handler));
                return Ok(());
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        let expected = chain.payload_name;
        let records = chain
            .typed_mut::<P>()
            .ok_or_else(|| DispatchError::TypeMismatch {
                key: key.name(),
                expected,
                found: type_name::<P>(),
            })?;

        if records.iter().any(|h| h.id == handler.id) {
            return Err(DispatchError::DuplicateHandler {
                key: key.name(),
                handler: handler.id.to_string(),
            });
        }

        records.push(handler);
        Ok(())
    }

    /// 移除第一个身份相同的处理器；链为空时整项删除
    pub fn unsubscribe<P: 'static>(&mut self, key: K, handler: &Handler<P>) -> DispatchResult<()> {
        let unknown = || DispatchError::UnknownHandler {
            key: key.name(),
            handler: handler.id.to_string(),
        };

        let chain = self.chains.get_mut(&key).ok_or_else(unknown)?;
        let expected = chain.payload_name;
        let records = chain
            .typed_mut::<P>()
            .ok_or_else(|| DispatchError::TypeMismatch {
                key: key.name(),
                expected,
                found: type_name::<P>(),
            })?;

        let pos = records
            .iter()
            .position(|h| h.id == handler.id)
            .ok_or_else(unknown)?;
        records.remove(pos);

        if records.is_empty() {
            self.chains.remove(&key);
        }
        Ok(())
    }

    /// 取出处理器链的快照；未注册时为空链
    pub fn snapshot<P: 'static>(&self, key: K) -> DispatchResult<Vec<Handler<P>>> {
        let Some(chain) = self.chains.get(&key) else {
            return Ok(Vec::new());
        };
        chain
            .typed::<P>()
            .cloned()
            .ok_or_else(|| DispatchError::TypeMismatch {
                key: key.name(),
                expected: chain.payload_name,
                found: type_name::<P>(),
            })
    }

    pub fn contains<P: 'static>(&self, key: K, handler: &Handler<P>) -> bool {
        self.chains
            .get(&key)
            .is_some_and(|c| c.records.contains_id(&handler.id))
    }

    pub fn handler_count(&self, key: K) -> usize {
        self.chains.get(&key).map_or(0, |c| c.records.len())
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.chains.keys().copied()
    }

    pub fn clear(&mut self) -> usize {
        let total = self.chains.values().map(|c| c.records.len()).sum();
        self.chains.clear();
        total
    }
}
