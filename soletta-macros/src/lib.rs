#![allow(clippy::needless_doctest_main)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

//! Attribute macros for use with soletta.

mod entry;
mod parse;

/// Marks an async function to be driven by a soletta event loop. The macro
/// builds the loop, submits the function body as the root task and runs the
/// loop until that task completes, so `main` does not have to deal with
/// `EventLoop` or `Builder` directly.
///
/// Note: the macro is intentionally simplistic. If it does not fit your
/// setup, use [`runtime::Builder`] which provides the full interface.
///
/// # Options
///
/// The event loop can be configured with a `max_tasks` parameter, bounding
/// the number of concurrently live tasks:
///
/// ```no_run
/// #[soletta::main(max_tasks = 256)]
/// # async fn main() {}
/// ```
///
/// # Function arguments
///
/// Function arguments are NOT allowed.
///
/// # Usage
///
/// ```no_run
/// #[soletta::main]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// Equivalent code not using `#[soletta::main]`:
///
/// ```no_run
/// fn main() {
///     soletta::runtime::Builder::new()
///         .try_build()
///         .unwrap()
///         .block_on(async {
///             println!("Hello world");
///         })
/// }
/// ```
///
/// [`runtime::Builder`]: ../soletta/runtime/struct.Builder.html
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Marks an async function to be run as a test on its own soletta event
/// loop. Each test gets a fresh loop; the function body becomes the root
/// task.
///
/// # Usage
///
/// ```no_run
/// #[soletta::test]
/// async fn my_test() {
///     assert!(true);
/// }
/// ```
///
/// Equivalent code not using `#[soletta::test]`:
///
/// ```no_run
/// #[test]
/// fn my_test() {
///     soletta::runtime::Builder::new()
///         .try_build()
///         .unwrap()
///         .block_on(async {
///             assert!(true);
///         })
/// }
/// ```
///
/// The same `max_tasks` option as [`macro@main`] is accepted.
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
