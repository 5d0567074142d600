use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::{Attribute, Path, Token};

// 拆分出已有 derive 列表，其余属性原样保留
fn split_derives(attrs: &[Attribute]) -> syn::Result<(Vec<Attribute>, Vec<Path>)> {
    let mut retained = Vec::new();
    let mut existing = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("derive") {
            let list = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)?;
            existing.extend(list);
        } else {
            retained.push(attr.clone());
        }
    }
    Ok((retained, existing))
}

// 以末段标识去重：`Debug` 与 `std::fmt::Debug` 视为同一派生
fn derive_key(path: &Path) -> String {
    match path.segments.last() {
        Some(last) => last.ident.to_string(),
        None => path.to_token_stream().to_string(),
    }
}

/// 合并必需派生与用户已有派生（必需项在前，重复项只保留一次）
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: &[Path]) -> syn::Result<()> {
    let (retained, existing) = split_derives(attrs)?;

    let mut seen = std::collections::HashSet::new();
    let merged: Vec<Path> = required
        .iter()
        .cloned()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();

    let derive: Attribute = syn::parse_quote!(#[derive(#(#merged),*)]);
    *attrs = std::iter::once(derive).chain(retained).collect();
    Ok(())
}
