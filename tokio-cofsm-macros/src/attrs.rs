//! Attribute parsing for the hook macros.

use darling::FromMeta;
use syn::{Ident, Path};

/// Arguments for the `#[state_hooks(state = Stance)]` attribute.
#[derive(Debug, FromMeta)]
pub struct StateHooksArgs {
    /// The state enum the hooks are bound for.
    pub state: Path,
}

/// Arguments for the `#[hook(state = Idle, on = enter)]` attribute.
///
/// Either field may be omitted and inferred from the method name.
#[derive(Debug, Default, FromMeta)]
pub struct HookAttr {
    pub state: Option<Ident>,
    pub on: Option<Ident>,
}

impl HookAttr {
    /// Parses a `#[hook]` or `#[hook(...)]` attribute.
    pub fn from_attribute(attr: &syn::Attribute) -> syn::Result<Self> {
        match &attr.meta {
            syn::Meta::Path(_) => Ok(Self::default()),
            meta => Self::from_meta(meta).map_err(syn::Error::from),
        }
    }
}
