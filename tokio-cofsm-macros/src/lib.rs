//! Proc macros binding owner methods to tokio-cofsm state hooks.

use darling::FromMeta;
use proc_macro::TokenStream;
use syn::{DeriveInput, ItemImpl, parse_macro_input};

mod attrs;
mod codegen;
mod helpers;
mod validation;

/// Implements `StateId` for a fieldless enum.
///
/// `all()` lists the variants in declaration order and `name()` returns
/// each variant's identifier.
#[proc_macro_derive(StateId)]
pub fn derive_state_id(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match validation::StateEnum::parse(&input) {
        Ok(states) => codegen::render_state_id(&states).into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Implements `HookTable` for the owner type of an inherent impl block.
///
/// Methods tagged `#[hook(state = Variant, on = kind)]` are bound as that
/// state's `kind` hook, where `kind` is one of `enter`, `exit`, `finally`,
/// `tick`, `late_tick` or `fixed_tick`. A bare `#[hook]` infers both from
/// the method name: `wall_run_exit` binds the `exit` hook of `WallRun`.
///
/// Hooks take `&self` and nothing else and return nothing. `enter` and
/// `exit` hooks may be `async fn`.
///
/// ```rust,ignore
/// #[state_hooks(state = Stance)]
/// impl Player {
///     #[hook]
///     async fn idle_exit(&self) {
///         tokio::time::sleep(Duration::from_millis(100)).await;
///     }
///
///     #[hook(state = Run, on = tick)]
///     fn advance(&self) {}
/// }
/// ```
#[proc_macro_attribute]
pub fn state_hooks(args: TokenStream, input: TokenStream) -> TokenStream {
    let meta = match darling::ast::NestedMeta::parse_meta_list(args.into()) {
        Ok(meta) => meta,
        Err(e) => return darling::Error::from(e).write_errors().into(),
    };
    let args = match attrs::StateHooksArgs::from_list(&meta) {
        Ok(args) => args,
        Err(e) => return e.write_errors().into(),
    };
    let input_impl = parse_macro_input!(input as ItemImpl);

    match generate_hooks(args, input_impl) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn generate_hooks(args: attrs::StateHooksArgs, input: ItemImpl) -> syn::Result<proc_macro2::TokenStream> {
    let table = validation::HookTableStructure::parse(args, input)?;
    Ok(codegen::render_hook_table(&table))
}
