use quote::format_ident;
use syn::Ident;

use crate::validation::HookKind;

/// Converts `wall_run` to `WallRun`.
pub fn pascal_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Splits `wall_run_late_tick` into `("wall_run", LateTick)`.
///
/// Longer suffixes are tried first so `_late_tick` is not read as `_tick`.
pub fn split_hook_name(name: &str) -> Option<(&str, HookKind)> {
    HookKind::BY_SUFFIX_LEN.iter().find_map(|kind| {
        let prefix = name.strip_suffix(kind.suffix())?.strip_suffix('_')?;
        (!prefix.is_empty()).then_some((prefix, *kind))
    })
}

/// The `RegistryBuilder` method binding `kind`: `on_exit` or `on_exit_async`.
pub fn builder_method(kind: HookKind, is_async: bool) -> Ident {
    if is_async {
        format_ident!("on_{}_async", kind.suffix())
    } else {
        format_ident!("on_{}", kind.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_case_joins_words() {
        assert_eq!(pascal_case("idle"), "Idle");
        assert_eq!(pascal_case("wall_run"), "WallRun");
        assert_eq!(pascal_case("_dash__left"), "DashLeft");
    }

    #[test]
    fn split_prefers_longest_suffix() {
        assert_eq!(
            split_hook_name("wall_run_late_tick"),
            Some(("wall_run", HookKind::LateTick))
        );
        assert_eq!(split_hook_name("idle_tick"), Some(("idle", HookKind::Tick)));
        assert_eq!(
            split_hook_name("jump_fixed_tick"),
            Some(("jump", HookKind::FixedTick))
        );
        assert_eq!(split_hook_name("run_exit"), Some(("run", HookKind::Exit)));
    }

    #[test]
    fn split_rejects_names_without_state() {
        assert_eq!(split_hook_name("enter"), None);
        assert_eq!(split_hook_name("_enter"), None);
        assert_eq!(split_hook_name("idle_update"), None);
        assert_eq!(split_hook_name("reenter"), None);
    }

    #[test]
    fn builder_method_names() {
        assert_eq!(builder_method(HookKind::Enter, true), "on_enter_async");
        assert_eq!(builder_method(HookKind::LateTick, false), "on_late_tick");
    }
}
