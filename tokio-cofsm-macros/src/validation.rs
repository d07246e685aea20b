//! Validation of macro input.

use std::collections::HashSet;

use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Error, Fields, FnArg, Ident, ImplItem, ItemImpl, Path, ReturnType, Type};

use crate::attrs::{HookAttr, StateHooksArgs};
use crate::helpers;

/// The kinds of hook a method can be bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Enter,
    Exit,
    Finally,
    Tick,
    LateTick,
    FixedTick,
}

impl HookKind {
    /// Ordered so that no suffix is tried before a longer one ending in it.
    pub const BY_SUFFIX_LEN: [HookKind; 6] = [
        HookKind::LateTick,
        HookKind::FixedTick,
        HookKind::Finally,
        HookKind::Enter,
        HookKind::Exit,
        HookKind::Tick,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Finally => "finally",
            Self::Tick => "tick",
            Self::LateTick => "late_tick",
            Self::FixedTick => "fixed_tick",
        }
    }

    pub fn allows_async(self) -> bool {
        matches!(self, Self::Enter | Self::Exit)
    }

    fn parse(ident: &Ident) -> syn::Result<Self> {
        Self::BY_SUFFIX_LEN
            .into_iter()
            .find(|kind| ident == kind.suffix())
            .ok_or_else(|| {
                Error::new_spanned(
                    ident,
                    "expected one of: enter, exit, finally, tick, late_tick, fixed_tick",
                )
            })
    }
}

/// A fieldless enum deriving `StateId`.
#[derive(Debug)]
pub struct StateEnum {
    pub name: Ident,
    pub variants: Vec<Ident>,
}

impl StateEnum {
    pub fn parse(input: &DeriveInput) -> syn::Result<Self> {
        let Data::Enum(data) = &input.data else {
            return Err(Error::new_spanned(&input.ident, "StateId can only be derived for enums"));
        };
        if !input.generics.params.is_empty() {
            return Err(Error::new_spanned(&input.generics, "StateId enums cannot be generic"));
        }
        if data.variants.is_empty() {
            return Err(Error::new_spanned(
                &input.ident,
                "StateId enums need at least one variant",
            ));
        }

        let variants = data
            .variants
            .iter()
            .map(|variant| match variant.fields {
                Fields::Unit => Ok(variant.ident.clone()),
                _ => Err(Error::new_spanned(variant, "StateId variants cannot carry fields")),
            })
            .collect::<syn::Result<Vec<_>>>()?;

        Ok(Self {
            name: input.ident.clone(),
            variants,
        })
    }
}

/// One method bound as a hook.
#[derive(Debug, Clone)]
pub struct HookBinding {
    pub method: Ident,
    pub variant: Ident,
    pub kind: HookKind,
    pub is_async: bool,
}

/// A `#[state_hooks]` impl block after validation.
#[derive(Debug)]
pub struct HookTableStructure {
    pub state: Path,
    pub self_ty: Type,
    pub hooks: Vec<HookBinding>,
    /// The original impl block with `#[hook]` attributes removed.
    pub item: ItemImpl,
}

impl HookTableStructure {
    pub fn parse(args: StateHooksArgs, mut item: ItemImpl) -> syn::Result<Self> {
        if let Some((_, path, _)) = &item.trait_ {
            return Err(Error::new_spanned(
                path,
                "#[state_hooks] must be applied to an inherent impl block",
            ));
        }

        let mut hooks = Vec::new();
        let mut seen = HashSet::new();

        for impl_item in &mut item.items {
            let ImplItem::Fn(method) = impl_item else {
                continue;
            };

            let (hook_attrs, other_attrs): (Vec<_>, Vec<_>) = std::mem::take(&mut method.attrs)
                .into_iter()
                .partition(|attr| attr.path().is_ident("hook"));
            method.attrs = other_attrs;

            let attr = match hook_attrs.as_slice() {
                [] => continue,
                [attr] => HookAttr::from_attribute(attr)?,
                [_, extra, ..] => {
                    return Err(Error::new_spanned(extra, "a method can only be bound once"));
                }
            };

            let binding = HookBinding::resolve(attr, &method.sig)?;
            if !seen.insert((binding.variant.to_string(), binding.kind)) {
                return Err(Error::new_spanned(
                    &method.sig.ident,
                    format!(
                        "`{}` hook for state `{}` is already bound",
                        binding.kind.suffix(),
                        binding.variant
                    ),
                ));
            }
            hooks.push(binding);
        }

        Ok(Self {
            state: args.state,
            self_ty: (*item.self_ty).clone(),
            hooks,
            item,
        })
    }
}

impl HookBinding {
    fn resolve(attr: HookAttr, sig: &syn::Signature) -> syn::Result<Self> {
        let name = sig.ident.to_string();
        let inferred = helpers::split_hook_name(&name);

        let kind = match &attr.on {
            Some(on) => HookKind::parse(on)?,
            None => inferred.map(|(_, kind)| kind).ok_or_else(|| {
                Error::new_spanned(
                    &sig.ident,
                    "cannot infer hook kind from method name; use #[hook(on = ...)]",
                )
            })?,
        };

        let variant = match attr.state {
            Some(state) => state,
            None => {
                let prefix = name
                    .strip_suffix(kind.suffix())
                    .and_then(|rest| rest.strip_suffix('_'))
                    .filter(|prefix| !prefix.is_empty())
                    .ok_or_else(|| {
                        Error::new_spanned(
                            &sig.ident,
                            "cannot infer state from method name; use #[hook(state = ...)]",
                        )
                    })?;
                Ident::new(&helpers::pascal_case(prefix), sig.ident.span())
            }
        };

        validate_signature(sig, kind)?;

        Ok(Self {
            method: sig.ident.clone(),
            variant,
            kind,
            is_async: sig.asyncness.is_some(),
        })
    }
}

fn validate_signature(sig: &syn::Signature, kind: HookKind) -> syn::Result<()> {
    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => return Err(Error::new(sig.span(), "hook methods must take `&self`")),
    }
    if sig.inputs.len() > 1 {
        return Err(Error::new_spanned(
            &sig.inputs,
            "hook methods take no arguments besides `&self`",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(Error::new_spanned(&sig.generics, "hook methods cannot be generic"));
    }
    if let ReturnType::Type(_, ty) = &sig.output {
        return Err(Error::new_spanned(ty, "hook methods must not return a value"));
    }
    if let Some(asyncness) = &sig.asyncness
        && !kind.allows_async()
    {
        return Err(Error::new_spanned(
            asyncness,
            format!("`{}` hooks cannot be async", kind.suffix()),
        ));
    }
    Ok(())
}
