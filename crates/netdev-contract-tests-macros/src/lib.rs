//! # netdev-contract-tests-macros
//!
//! 提供 `netdev_tck` 属性宏：为标注的模块注入一致性用例的测试入口，每个用例一个
//! 多线程 `#[tokio::test]`。宏的实现分为三个阶段：解析参数、确定用例清单、把测试函数植入模块。

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Expr, Ident, ItemMod, Meta, Path, Result as SynResult, Token, parse_macro_input};

/// 与 `netdev-contract-tests` 的用例清单保持同序。
const DEFAULT_CASES: [&str; 11] = [
    "basic_io",
    "ping_pong",
    "racy_read",
    "racy_write",
    "read_timeout",
    "write_timeout",
    "past_timeout",
    "present_timeout",
    "future_timeout",
    "close_timeout",
    "concurrent_methods",
];

struct TckArgs {
    factory: Path,
    cases: Vec<Ident>,
}

#[proc_macro_attribute]
/// 教案级说明：
/// - **意图（Why）**：后端作者只需声明连接对工厂，即可获得全部一致性用例的测试入口，
///   避免手写样板代码时遗漏用例；
/// - **逻辑（How）**：先由 `parse_args` 解析 `factory = 路径` 与可选的 `cases(...)`，
///   再由 `inject_tests` 把测试函数追加到模块；任何语法问题都转化为编译期诊断；
/// - **契约（What）**：`factory` 必须指向一个无参函数，返回实现 `PairFactory` 的值；
///   调用方 crate 需依赖 `tokio`（启用 `macros` 与 `rt-multi-thread`）与 `netdev-contract-tests`。
pub fn netdev_tck(attr: TokenStream, item: TokenStream) -> TokenStream {
    let module = parse_macro_input!(item as ItemMod);

    match parse_args(attr).and_then(|args| inject_tests(args, module)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// 教案级说明：
/// - **契约**：接受 `factory = path` 与可选的 `cases(a, b, ...)`，顺序不限；缺少 `factory` 报错；
///   `cases` 缺省或为空时使用全部用例。
fn parse_args(attr: TokenStream) -> SynResult<TckArgs> {
    let metas = syn::parse::Parser::parse(Punctuated::<Meta, Token![,]>::parse_terminated, attr)?;

    let mut factory = None;
    let mut cases = Vec::new();
    for meta in metas {
        match meta {
            Meta::NameValue(pair) if pair.path.is_ident("factory") => match pair.value {
                Expr::Path(expr) => factory = Some(expr.path),
                other => {
                    return Err(syn::Error::new(other.span(), "factory 需为函数路径"));
                }
            },
            Meta::List(list) if list.path.is_ident("cases") => {
                let nested: Punctuated<Ident, Token![,]> =
                    list.parse_args_with(Punctuated::parse_terminated)?;
                for ident in nested {
                    if !DEFAULT_CASES.contains(&ident.to_string().as_str()) {
                        return Err(syn::Error::new(ident.span(), "未知的一致性用例"));
                    }
                    cases.push(ident);
                }
            }
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "netdev_tck 属性仅支持 factory = ... 与 cases(...)",
                ));
            }
        }
    }

    let factory = factory.ok_or_else(|| {
        syn::Error::new(Span::call_site(), "netdev_tck 需要 factory = 工厂函数")
    })?;
    if cases.is_empty() {
        cases = DEFAULT_CASES
            .iter()
            .map(|name| Ident::new(name, Span::call_site()))
            .collect();
    }
    Ok(TckArgs { factory, cases })
}

/// 教案级说明：
/// - **逻辑**：为每个用例生成一个同名的 `async fn` 测试，调用 `run_named`；
///   模块内注入 `use super::*`，使工厂路径可按调用处的写法解析；
/// - **权衡**：需处理内联与文件模块两种情况，`module.content` 为空时重新拼装模块以保留可见性与属性。
fn inject_tests(args: TckArgs, mut module: ItemMod) -> SynResult<proc_macro2::TokenStream> {
    let TckArgs { factory, cases } = args;
    let mut generated: Vec<syn::Item> = vec![syn::parse_quote! {
        #[allow(unused_imports)]
        use super::*;
    }];
    for case in cases {
        let name = case.to_string();
        let item: syn::Item = syn::parse_quote! {
            #[::tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn #case() {
                ::netdev_contract_tests::run_named(&#factory(), #name).await;
            }
        };
        generated.push(item);
    }

    if let Some((_, ref mut items)) = module.content {
        items.extend(generated);
        Ok(quote! { #module })
    } else {
        let ident = &module.ident;
        let vis = &module.vis;
        let attrs = &module.attrs;
        Ok(quote! {
            #(#attrs)*
            #vis mod #ident {
                #(#generated)*
            }
        })
    }
}
