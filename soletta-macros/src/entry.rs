//! Expansion logic for `#[soletta::main]` and `#[soletta::test]`.
use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::parse::Parser;

use crate::parse::*;

// syn::AttributeArgs does not implement syn::Parse
type AttributeArgs = syn::punctuated::Punctuated<syn::Meta, syn::Token![,]>;

/// Config used in case of the attribute not being able to build a valid config
const DEFAULT_ERROR_CONFIG: FinalConfig = FinalConfig { max_tasks: None };

/// For a quickstart on how this works, let's analyze this example:
///
/// ```rust,no_run
/// #[soletta::main(max_tasks = 64)]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// The compiler splits the tokens where `args` is everything between the
/// proc_macro parentheses:
/// - `max_tasks = 64`
///
/// And `item` is the function whose body becomes the root task:
/// ```no_compile
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    // If any of the steps for this macro fail, we still want to expand to an
    // item that is as close to the expected output as possible. This helps
    // out IDEs such that completions and other related features keep working.
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if input.sig.ident == "main" && !input.sig.inputs.is_empty() {
        let msg = "the main function cannot accept arguments";
        Err(syn::Error::new_spanned(&input.sig.ident, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, false))
    };

    match config {
        Ok(config) => parse_knobs(input, false, config),
        Err(e) => token_stream_with_error(parse_knobs(input, false, DEFAULT_ERROR_CONFIG), e),
    }
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };
    let config = if let Some(attr) = input.attrs().find(|attr| is_test_attribute(attr)) {
        let msg = "second test attribute is supplied, consider removing or changing the order of your test attributes";
        Err(syn::Error::new_spanned(attr, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, true))
    };

    match config {
        Ok(config) => parse_knobs(input, true, config),
        Err(e) => token_stream_with_error(parse_knobs(input, true, DEFAULT_ERROR_CONFIG), e),
    }
}

struct FinalConfig {
    max_tasks: Option<usize>,
}

struct ConfigBuilder {
    max_tasks: Option<(usize, Span)>,
    is_test: bool,
}

impl ConfigBuilder {
    fn new(is_test: bool) -> Self {
        ConfigBuilder {
            max_tasks: None,
            is_test,
        }
    }

    fn macro_name(&self) -> &'static str {
        if self.is_test {
            "soletta::test"
        } else {
            "soletta::main"
        }
    }

    fn set_max_tasks(&mut self, max_tasks: syn::Lit, span: Span) -> Result<(), syn::Error> {
        if self.max_tasks.is_some() {
            return Err(syn::Error::new(span, "`max_tasks` set multiple times."));
        }

        let max_tasks = parse_int(max_tasks, span, "max_tasks")?;
        if max_tasks == 0 {
            return Err(syn::Error::new(span, "`max_tasks` may not be 0."));
        }
        self.max_tasks = Some((max_tasks, span));

        Ok(())
    }

    fn build(&self) -> Result<FinalConfig, syn::Error> {
        Ok(FinalConfig {
            max_tasks: self.max_tasks.map(|(v, _)| v),
        })
    }
}

fn build_config(
    input: &ItemFn,
    args: AttributeArgs,
    is_test: bool,
) -> Result<FinalConfig, syn::Error> {
    if input.sig.asyncness.is_none() {
        let msg = "the `async` keyword is missing from the function declaration";
        return Err(syn::Error::new_spanned(input.sig.fn_token, msg));
    }

    let mut config = ConfigBuilder::new(is_test);
    let macro_name = config.macro_name();

    for arg in args {
        match arg {
            syn::Meta::NameValue(namevalue) => {
                let ident = namevalue
                    .path
                    .get_ident()
                    .ok_or_else(|| {
                        syn::Error::new_spanned(&namevalue, "Must have specified ident")
                    })?
                    .to_string()
                    .to_lowercase();
                let lit = match &namevalue.value {
                    syn::Expr::Lit(syn::ExprLit { lit, .. }) => lit,
                    expr => return Err(syn::Error::new_spanned(expr, "Must be a literal")),
                };
                match ident.as_str() {
                    "max_tasks" => {
                        config.set_max_tasks(lit.clone(), syn::spanned::Spanned::span(lit))?;
                    }
                    name => {
                        let msg =
                            format!("Unknown attribute {name} is specified; expected `max_tasks`");
                        return Err(syn::Error::new_spanned(namevalue, msg));
                    }
                }
            }
            syn::Meta::Path(path) => {
                let name = path
                    .get_ident()
                    .ok_or_else(|| syn::Error::new_spanned(&path, "Must have specified ident"))?
                    .to_string()
                    .to_lowercase();
                let msg = match name.as_str() {
                    "max_tasks" => {
                        format!("The `{name}` attribute requires an argument.")
                    }
                    name => {
                        format!(
                            "Unknown attribute {name} is specified; expected `max_tasks`. \
                             Note that `{macro_name}` drives a single-threaded event loop, \
                             there is no runtime flavor to select."
                        )
                    }
                };
                return Err(syn::Error::new_spanned(path, msg));
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Unknown attribute inside the macro",
                ));
            }
        }
    }

    config.build()
}

fn parse_knobs(mut input: ItemFn, is_test: bool, config: FinalConfig) -> TokenStream {
    input.sig.asyncness = None;

    // If type mismatch occurs, the current rustc points to the last statement.
    let (last_stmt_start_span, last_stmt_end_span) = {
        let mut last_stmt = input.stmts.last().cloned().unwrap_or_default().into_iter();

        // `Span` on stable Rust has a limitation that only points to the first
        // token, not the whole tokens. We can work around this limitation by
        // using the first/last span of the tokens like
        // `syn::Error::new_spanned` does.
        let start = last_stmt.next().map_or_else(Span::call_site, |t| t.span());
        let end = last_stmt.last().map_or(start, |t| t.span());
        (start, end)
    };

    let mut builder = quote_spanned! {last_stmt_start_span=>
        soletta::runtime::Builder::new()
    };

    if let Some(v) = config.max_tasks {
        builder = quote_spanned! {last_stmt_start_span=> #builder.max_tasks(#v) };
    }

    let generated_attrs = if is_test {
        quote! {
            #[::core::prelude::v1::test]
        }
    } else {
        quote! {}
    };

    // This explicit `return` is intentional. See tokio-rs/tokio#4636
    let last_block = quote_spanned! {last_stmt_end_span=>
        #[allow(clippy::expect_used, clippy::needless_return, clippy::unwrap_in_result)]
        {
            return #builder
                .try_build()
                .expect("Failed building the EventLoop")
                .block_on(body);
        }
    };

    // The root task is stored by the loop, so unlike a polled-in-place root
    // future it must be `'static`. The body is therefore always captured in
    // an owned `async` block, for `main` and tests alike.
    let body = input.body();
    let body = quote! {
        let body = async #body;
    };

    input.into_tokens(generated_attrs, body, last_block)
}
