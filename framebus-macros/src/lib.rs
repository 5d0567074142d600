use proc_macro::TokenStream;

mod derive_utils;
mod event_key;

/// 事件键宏：作用于无字段枚举，生成 `::framebus::EventKey` 实现。
/// - 自动合并派生 `Clone, Copy, Debug, PartialEq, Eq, Hash`
/// - `EventKey::name` 默认返回变体名，`EventKey::all` 按声明顺序返回全部变体
/// - 同时实现 `Display`（输出键名）
/// - 变体可通过 `#[event_key(name = "...")]` 覆写键名；键名大小写不敏感地唯一
///
/// ```ignore
/// use framebus_macros::event_key;
///
/// #[event_key]
/// enum UiEvent {
///     PanelOpen,
///     #[event_key(name = "panel.close")]
///     PanelClose,
/// }
/// ```
#[proc_macro_attribute]
pub fn event_key(attr: TokenStream, item: TokenStream) -> TokenStream {
    event_key::expand(attr, item)
}
