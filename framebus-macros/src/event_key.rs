use crate::derive_utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Fields, Item, ItemEnum, LitStr, Path};

/// #[event_key] 宏实现
/// - 仅支持无字段变体的枚举，且不带泛型
/// - 合并派生：Clone, Copy, Debug, PartialEq, Eq, Hash
/// - 生成 `::framebus::EventKey`（name / all）与 `Display`
/// - 变体可通过 `#[event_key(name = "...")]` 覆写键名，默认为变体名
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    match try_expand(attr.into(), item.into()) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn try_expand(
    attr: proc_macro2::TokenStream,
    item: proc_macro2::TokenStream,
) -> syn::Result<proc_macro2::TokenStream> {
    if !attr.is_empty() {
        return Err(syn::Error::new(
            attr.span(),
            "#[event_key] does not take arguments on the enum; use #[event_key(name = \"...\")] on variants",
        ));
    }

    let mut enum_item = match syn::parse2::<Item>(item)? {
        Item::Enum(e) => e,
        other => {
            return Err(syn::Error::new(
                other.span(),
                "#[event_key] can only be used on enum types",
            ));
        }
    };

    if !enum_item.generics.params.is_empty() {
        return Err(syn::Error::new(
            enum_item.generics.span(),
            "#[event_key] enums cannot be generic",
        ));
    }
    if enum_item.variants.is_empty() {
        return Err(syn::Error::new(
            enum_item.ident.span(),
            "#[event_key] requires at least one variant",
        ));
    }

    let required: Vec<Path> = vec![
        syn::parse_quote!(Clone),
        syn::parse_quote!(Copy),
        syn::parse_quote!(Debug),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(Eq),
        syn::parse_quote!(Hash),
    ];
    apply_derives(&mut enum_item.attrs, &required)?;

    let names = variant_names(&mut enum_item)?;
    let enum_ident = &enum_item.ident;
    let variants: Vec<_> = enum_item.variants.iter().map(|v| &v.ident).collect();

    Ok(quote! {
        #enum_item

        impl ::framebus::EventKey for #enum_ident {
            fn name(&self) -> &'static str {
                match self {
                    #( Self::#variants => #names, )*
                }
            }

            fn all() -> &'static [Self] {
                &[ #( Self::#variants ),* ]
            }
        }

        impl ::core::fmt::Display for #enum_ident {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(::framebus::EventKey::name(self))
            }
        }
    })
}

// 校验变体并取出键名；同时剥离变体上的 #[event_key(..)] 属性
fn variant_names(enum_item: &mut ItemEnum) -> syn::Result<Vec<LitStr>> {
    let mut names: Vec<LitStr> = Vec::with_capacity(enum_item.variants.len());

    for v in &mut enum_item.variants {
        if !matches!(v.fields, Fields::Unit) {
            return Err(syn::Error::new(
                v.span(),
                "#[event_key] supports only fieldless variants",
            ));
        }

        let mut rename: Option<LitStr> = None;
        let mut retained = Vec::new();
        for attr in &v.attrs {
            if !attr.path().is_ident("event_key") {
                retained.push(attr.clone());
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    if rename.is_some() {
                        return Err(meta.error("duplicate 'name' specified for this variant"));
                    }
                    rename = Some(meta.value()?.parse()?);
                    Ok(())
                } else {
                    Err(meta.error("unsupported key; expected `name = \"...\"`"))
                }
            })?;
        }
        v.attrs = retained;

        let name = rename.unwrap_or_else(|| LitStr::new(&v.ident.to_string(), v.ident.span()));
        if name.value().is_empty() {
            return Err(syn::Error::new(name.span(), "event key name cannot be empty"));
        }
        if let Some(prev) = names
            .iter()
            .find(|n| n.value().eq_ignore_ascii_case(&name.value()))
        {
            return Err(syn::Error::new(
                name.span(),
                format!("event key name '{}' collides with '{}'", name.value(), prev.value()),
            ));
        }
        names.push(name);
    }

    Ok(names)
}
