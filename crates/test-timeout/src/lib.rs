//! Deadline attributes for tests that may block forever.
//!
//! Queue tests park on `blocking_pop`, which has no timeout of its own; a bug
//! in pairing shows up as a hung test rather than a failure. These attributes
//! run the body on a helper thread and fail the test once the deadline passes.
//!
//! ```ignore
//! #[test_timeout::timeout]                 // sync, 60s
//! #[test_timeout::timeout(5)]              // sync, 5s
//! #[test_timeout::tokio_timeout_test]      // async, current-thread runtime
//! #[test_timeout::tokio_timeout_test(10, paused)] // async, paused tokio clock
//! ```
//!
//! The deadline can be stretched at runtime with `TEST_TIMEOUT_SCALE`
//! (a positive integer multiplier) on slow machines.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Attribute, Ident, ItemFn, LitInt, Token};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

struct TestOptions {
    secs: u64,
    paused: bool,
}

impl Parse for TestOptions {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut options = TestOptions {
            secs: DEFAULT_TIMEOUT_SECS,
            paused: false,
        };
        while !input.is_empty() {
            if input.peek(LitInt) {
                options.secs = parse_secs(&input.parse::<LitInt>()?)?;
            } else {
                let ident: Ident = input.parse()?;
                match ident.to_string().as_str() {
                    "secs" => {
                        input.parse::<Token![=]>()?;
                        options.secs = parse_secs(&input.parse::<LitInt>()?)?;
                    }
                    "paused" => options.paused = true,
                    other => {
                        return Err(syn::Error::new_spanned(
                            &ident,
                            format!("unknown option `{other}`; expected `secs = N` or `paused`"),
                        ))
                    }
                }
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(options)
    }
}

fn parse_secs(lit: &LitInt) -> syn::Result<u64> {
    let secs: u64 = lit.base10_parse()?;
    if secs == 0 {
        return Err(syn::Error::new_spanned(
            lit,
            "timeout must be greater than zero",
        ));
    }
    Ok(secs)
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = parse_macro_input!(attr as TestOptions);
    let mut function = parse_macro_input!(item as ItemFn);

    if function.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            &function.sig.ident,
            "tokio_timeout_test can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }
    function.sig.asyncness = None;
    function.attrs.retain(|attr| !is_tokio_test_attribute(attr));

    let block = &function.block;
    let paused = options.paused;
    let body = quote! {
        let mut builder = tokio::runtime::Builder::new_current_thread();
        builder.enable_all();
        if #paused {
            builder.start_paused(true);
        }
        let runtime = builder.build().expect("failed to build Tokio runtime");
        runtime.block_on(async {
            tokio::time::timeout(__test_deadline, async move #block)
                .await
                .expect("test timed out");
        });
    };
    expand(&function, options.secs, body).into()
}

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = parse_macro_input!(attr as TestOptions);
    let mut function = parse_macro_input!(item as ItemFn);

    if function.sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &function.sig.ident,
            "timeout expects a synchronous test; use tokio_timeout_test for async tests",
        )
        .to_compile_error()
        .into();
    }
    if options.paused {
        return syn::Error::new_spanned(
            &function.sig.ident,
            "`paused` only applies to tokio_timeout_test",
        )
        .to_compile_error()
        .into();
    }
    function.attrs.retain(|attr| !is_plain_test_attribute(attr));

    let block = &function.block;
    let body = quote! {
        (|| #block)();
    };
    expand(&function, options.secs, body).into()
}

/// Wraps `body` in a `#[test]` that runs it on a helper thread and waits at
/// most the (scaled) deadline for it to report back.
fn expand(function: &ItemFn, secs: u64, body: TokenStream2) -> TokenStream2 {
    let attrs = &function.attrs;
    let vis = &function.vis;
    let sig = &function.sig;
    quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let __test_scale: u64 = std::env::var("TEST_TIMEOUT_SCALE")
                .ok()
                .and_then(|value| value.parse().ok())
                .filter(|scale: &u64| *scale > 0)
                .unwrap_or(1);
            let __test_deadline = std::time::Duration::from_secs(#secs * __test_scale);
            let (sender, receiver) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    #body
                }));
                let _ = sender.send(result);
            });
            match receiver.recv_timeout(__test_deadline) {
                Ok(Ok(())) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test exceeded its {}s deadline", __test_deadline.as_secs())
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread exited before reporting a result")
                }
            }
        }
    }
}

fn is_tokio_test_attribute(attr: &Attribute) -> bool {
    let mut segments = attr.path().segments.iter();
    matches!(
        (segments.next(), segments.next(), segments.next()),
        (Some(first), Some(second), None)
            if first.ident == "tokio" && second.ident == "test"
    )
}

fn is_plain_test_attribute(attr: &Attribute) -> bool {
    attr.path().is_ident("test")
}
