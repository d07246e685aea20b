//! Code generation for the hook macros.

use proc_macro2::TokenStream;
use quote::quote;

use crate::helpers;
use crate::validation::{HookTableStructure, StateEnum};

/// Generates `impl StateId` for a validated enum.
pub fn render_state_id(states: &StateEnum) -> TokenStream {
    let name = &states.name;
    let variants = &states.variants;
    let names: Vec<String> = variants.iter().map(ToString::to_string).collect();

    quote! {
        impl ::tokio_cofsm::StateId for #name {
            fn all() -> &'static [Self] {
                &[#(Self::#variants),*]
            }

            fn name(&self) -> &'static str {
                match self {
                    #(Self::#variants => #names,)*
                }
            }
        }
    }
}

/// Re-emits the impl block and adds `impl HookTable` for its type.
pub fn render_hook_table(table: &HookTableStructure) -> TokenStream {
    let item = &table.item;
    let state = &table.state;
    let self_ty = &table.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    let bindings = table.hooks.iter().map(|hook| {
        let builder = helpers::builder_method(hook.kind, hook.is_async);
        let variant = &hook.variant;
        let method = &hook.method;

        if hook.is_async {
            quote! {
                .#builder(#state::#variant, |owner: ::std::sync::Arc<Self>| async move {
                    owner.#method().await
                })
            }
        } else {
            quote! {
                .#builder(#state::#variant, |owner: &Self| owner.#method())
            }
        }
    });

    quote! {
        #item

        impl #impl_generics ::tokio_cofsm::HookTable<#state> for #self_ty #where_clause {
            fn bind_hooks(
                builder: ::tokio_cofsm::RegistryBuilder<#state, Self>,
            ) -> ::tokio_cofsm::RegistryBuilder<#state, Self> {
                builder #(#bindings)*
            }
        }
    }
}
