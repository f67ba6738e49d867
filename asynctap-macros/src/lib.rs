//! Procedural macros for asynctap
//!
//! This crate provides the `#[asynctap::test]` attribute macro for plugging
//! async assertion-facade tests into Rust's own test runner.
//!
//! # Example
//!
//! ```rust,ignore
//! use asynctap::prelude::*;
//!
//! #[asynctap::test]
//! async fn my_test(t: TestContext) {
//!     t.is(&(2 + 2), &4, "adds up");
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input, FnArg, Ident, ItemFn, Lit, Pat, Token, Type,
};

/// Configuration options for the test macro.
#[derive(Default)]
struct TestConfig {
    /// Which reporting backend to use ("flat" or "nested")
    reporter: Option<String>,
}

impl Parse for TestConfig {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut config = TestConfig::default();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match ident.to_string().as_str() {
                "reporter" => {
                    let lit: Lit = input.parse()?;
                    if let Lit::Str(s) = lit {
                        config.reporter = Some(s.value());
                    }
                }
                _ => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {ident}"),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(config)
    }
}

/// Determines if a function parameter is requesting a TestContext.
fn is_context_param(arg: &FnArg) -> bool {
    if let FnArg::Typed(pat_type) = arg {
        if let Type::Path(type_path) = &*pat_type.ty {
            if let Some(segment) = type_path.path.segments.last() {
                return segment.ident == "TestContext";
            }
        }
    }
    false
}

/// Extracts the parameter name from a function argument.
fn get_param_name(arg: &FnArg) -> Option<&Pat> {
    if let FnArg::Typed(pat_type) = arg {
        Some(&pat_type.pat)
    } else {
        None
    }
}

/// Test attribute macro for assertion-facade tests under libtest.
///
/// The annotated function must be async; anything else is a configuration
/// error reported at expansion time. A `t: TestContext` parameter receives
/// the assertion facade; TAP output goes to stdout where libtest captures it,
/// and any failing assertion fails the surrounding test.
///
/// # Basic Usage
///
/// ```rust,ignore
/// use asynctap::prelude::*;
///
/// #[asynctap::test]
/// async fn test_equality(t: TestContext) {
///     t.is(&1, &1, "same");
/// }
/// ```
///
/// # Configuration Options
///
/// - `reporter = "flat"` or `reporter = "nested"` - Select the reporting
///   backend (default: the `ASYNCTAP_REPORTER` environment variable)
///
/// ```rust,ignore
/// #[asynctap::test(reporter = "nested")]
/// async fn test_nested_output(t: TestContext) {
///     t.pass("shown as a subtest");
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = parse_macro_input!(attr as TestConfig);
    let input = parse_macro_input!(item as ItemFn);

    expand_test(config, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_test(config: TestConfig, input: ItemFn) -> syn::Result<TokenStream2> {
    let name = &input.sig.ident;
    let name_str = name.to_string();
    let body = &input.block;
    let attrs = &input.attrs;
    let vis = &input.vis;

    // The whole point of the shim: only async bodies are accepted.
    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input.sig,
            "asynctap only accepts async functions",
        ));
    }

    let kind = match config.reporter.as_deref() {
        Some("flat") => quote! { ::asynctap::report::ReporterKind::Flat },
        Some("nested") => quote! { ::asynctap::report::ReporterKind::Nested },
        Some(other) => {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                format!("unsupported reporter: {other}. Use \"flat\" or \"nested\""),
            ));
        }
        None => quote! {
            match ::asynctap::report::ReporterKind::from_env() {
                ::core::result::Result::Ok(kind) => kind,
                ::core::result::Result::Err(err) => panic!("{err}"),
            }
        },
    };

    let ctx_pat = input
        .sig
        .inputs
        .iter()
        .find(|arg| is_context_param(arg))
        .and_then(get_param_name);

    let closure_param = match ctx_pat {
        Some(pat) => quote! { #pat },
        None => quote! { _ },
    };

    Ok(quote! {
        #[::tokio::test]
        #(#attrs)*
        #vis async fn #name() {
            ::asynctap::standalone(#kind, #name_str, |#closure_param: ::asynctap::TestContext| async move {
                #body
                Ok(())
            })
            .await;
        }
    })
}
