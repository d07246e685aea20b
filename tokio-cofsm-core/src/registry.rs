//! Hook bindings per state.
//!
//! A [`StateRegistry`] maps every value of a state domain to a
//! [`StateBinding`]: the enter/exit/finally/tick hooks an owner type
//! declared for it. Registries are built once per owner type and shared
//! read-only by all machines of that type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::FsmError;
use crate::runner::TickKind;
use crate::scheduler::HookFuture;
use crate::state::{StateId, StateOwner};

/// A hook that completes within the call.
pub type SyncHook<O> = Arc<dyn Fn(&O) + Send + Sync>;

/// A hook that returns an operation to be run by the scheduler.
pub type AsyncHook<O> = Arc<dyn Fn(Arc<O>) -> HookFuture + Send + Sync>;

/// The kind of hook a callback is bound as.
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
    /// Whether this kind may be bound to an asynchronous operation.
    #[must_use]
    pub const fn allows_async(self) -> bool {
        matches!(self, Self::Enter | Self::Exit)
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Finally => "finally",
            Self::Tick => "tick",
            Self::LateTick => "late_tick",
            Self::FixedTick => "fixed_tick",
        })
    }
}

/// An enter or exit hook, either synchronous or asynchronous.
pub enum PhaseHook<O> {
    Sync(SyncHook<O>),
    Async(AsyncHook<O>),
}

impl<O> PhaseHook<O> {
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl<O> Clone for PhaseHook<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(hook) => Self::Sync(Arc::clone(hook)),
            Self::Async(hook) => Self::Async(Arc::clone(hook)),
        }
    }
}

/// The hooks bound to one state.
///
/// Unset hooks are no-ops. A binding with nothing set backs the "no state"
/// slot a machine starts in.
pub struct StateBinding<O> {
    enter: Option<PhaseHook<O>>,
    exit: Option<PhaseHook<O>>,
    finally: Option<SyncHook<O>>,
    tick: Option<SyncHook<O>>,
    late_tick: Option<SyncHook<O>>,
    fixed_tick: Option<SyncHook<O>>,
}

impl<O> Default for StateBinding<O> {
    fn default() -> Self {
        Self {
            enter: None,
            exit: None,
            finally: None,
            tick: None,
            late_tick: None,
            fixed_tick: None,
        }
    }
}

impl<O> StateBinding<O> {
    #[must_use]
    pub fn enter(&self) -> Option<&PhaseHook<O>> {
        self.enter.as_ref()
    }

    #[must_use]
    pub fn exit(&self) -> Option<&PhaseHook<O>> {
        self.exit.as_ref()
    }

    #[must_use]
    pub fn has_async_enter(&self) -> bool {
        self.enter.as_ref().is_some_and(PhaseHook::is_async)
    }

    #[must_use]
    pub fn has_async_exit(&self) -> bool {
        self.exit.as_ref().is_some_and(PhaseHook::is_async)
    }

    /// Whether a hook of `kind` is bound.
    #[must_use]
    pub fn is_bound(&self, kind: HookKind) -> bool {
        match kind {
            HookKind::Enter => self.enter.is_some(),
            HookKind::Exit => self.exit.is_some(),
            HookKind::Finally => self.finally.is_some(),
            HookKind::Tick => self.tick.is_some(),
            HookKind::LateTick => self.late_tick.is_some(),
            HookKind::FixedTick => self.fixed_tick.is_some(),
        }
    }

    pub(crate) fn run_finally(&self, owner: &O) {
        if let Some(finally) = &self.finally {
            finally(owner);
        }
    }

    /// Runs the tick hook for `kind`, returning whether one was bound.
    pub(crate) fn run_tick(&self, kind: TickKind, owner: &O) -> bool {
        let hook = match kind {
            TickKind::Tick => &self.tick,
            TickKind::LateTick => &self.late_tick,
            TickKind::FixedTick => &self.fixed_tick,
        };
        match hook {
            Some(hook) => {
                hook(owner);
                true
            }
            None => false,
        }
    }
}

impl<O> fmt::Debug for StateBinding<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = |hook: &Option<PhaseHook<O>>| match hook {
            None => "none",
            Some(PhaseHook::Sync(_)) => "sync",
            Some(PhaseHook::Async(_)) => "async",
        };
        f.debug_struct("StateBinding")
            .field("enter", &phase(&self.enter))
            .field("exit", &phase(&self.exit))
            .field("finally", &self.finally.is_some())
            .field("tick", &self.tick.is_some())
            .field("late_tick", &self.late_tick.is_some())
            .field("fixed_tick", &self.fixed_tick.is_some())
            .finish()
    }
}

/// Bindings for every value of a state domain.
pub struct StateRegistry<S: StateId, O> {
    bindings: HashMap<S, Arc<StateBinding<O>>>,
    domain: &'static [S],
}

impl<S: StateId, O> Default for StateRegistry<S, O> {
    /// An unbuilt registry. Machines created against it reject every
    /// transition with [`FsmError::NotInitialized`].
    fn default() -> Self {
        Self {
            bindings: HashMap::new(),
            domain: &[],
        }
    }
}

impl<S: StateId, O: StateOwner> StateRegistry<S, O> {
    #[must_use]
    pub fn builder() -> RegistryBuilder<S, O> {
        RegistryBuilder::new()
    }
}

impl<S: StateId, O> StateRegistry<S, O> {
    /// Looks up the binding for `state`.
    #[must_use]
    pub fn resolve(&self, state: S) -> Option<&Arc<StateBinding<O>>> {
        self.bindings.get(&state)
    }

    /// The states this registry was built for.
    #[must_use]
    pub fn domain(&self) -> &'static [S] {
        self.domain
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<S: StateId, O> fmt::Debug for StateRegistry<S, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for state in self.domain {
            if let Some(binding) = self.bindings.get(state) {
                map.entry(&state.name(), binding);
            }
        }
        map.finish()
    }
}

/// Collects hook bindings and validates them into a [`StateRegistry`].
///
/// Binding errors are deferred to [`build`](Self::build) so calls can be
/// chained; the first error wins.
pub struct RegistryBuilder<S: StateId, O> {
    bindings: HashMap<S, StateBinding<O>>,
    error: Option<FsmError>,
}

impl<S: StateId, O: StateOwner> Default for RegistryBuilder<S, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateId, O: StateOwner> RegistryBuilder<S, O> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn on_enter<F>(self, state: S, hook: F) -> Self
    where
        F: Fn(&O) + Send + Sync + 'static,
    {
        self.bind(state, HookKind::Enter, |binding| {
            binding.enter = Some(PhaseHook::Sync(Arc::new(hook)));
        })
    }

    #[must_use]
    pub fn on_enter_async<F, Fut>(self, state: S, hook: F) -> Self
    where
        F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bind(state, HookKind::Enter, |binding| {
            binding.enter = Some(PhaseHook::Async(boxed_async(hook)));
        })
    }

    #[must_use]
    pub fn on_exit<F>(self, state: S, hook: F) -> Self
    where
        F: Fn(&O) + Send + Sync + 'static,
    {
        self.bind(state, HookKind::Exit, |binding| {
            binding.exit = Some(PhaseHook::Sync(Arc::new(hook)));
        })
    }

    #[must_use]
    pub fn on_exit_async<F, Fut>(self, state: S, hook: F) -> Self
    where
        F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bind(state, HookKind::Exit, |binding| {
            binding.exit = Some(PhaseHook::Async(boxed_async(hook)));
        })
    }

    #[must_use]
    pub fn on_finally<F>(self, state: S, hook: F) -> Self
    where
        F: Fn(&O) + Send + Sync + 'static,
    {
        self.bind(state, HookKind::Finally, |binding| {
            binding.finally = Some(Arc::new(hook));
        })
    }

    #[must_use]
    pub fn on_tick<F>(self, state: S, hook: F) -> Self
    where
        F: Fn(&O) + Send + Sync + 'static,
    {
        self.bind(state, HookKind::Tick, |binding| {
            binding.tick = Some(Arc::new(hook));
        })
    }

    #[must_use]
    pub fn on_late_tick<F>(self, state: S, hook: F) -> Self
    where
        F: Fn(&O) + Send + Sync + 'static,
    {
        self.bind(state, HookKind::LateTick, |binding| {
            binding.late_tick = Some(Arc::new(hook));
        })
    }

    #[must_use]
    pub fn on_fixed_tick<F>(self, state: S, hook: F) -> Self
    where
        F: Fn(&O) + Send + Sync + 'static,
    {
        self.bind(state, HookKind::FixedTick, |binding| {
            binding.fixed_tick = Some(Arc::new(hook));
        })
    }

    /// Validates the collected bindings.
    ///
    /// Every state in `S::all()` receives a binding, empty if nothing was
    /// declared for it.
    pub fn build(mut self) -> Result<StateRegistry<S, O>, FsmError> {
        let domain = S::all();
        if domain.is_empty() {
            return Err(FsmError::EmptyDomain);
        }
        if let Some(err) = self.error {
            return Err(err);
        }

        let bindings = domain
            .iter()
            .map(|state| {
                let binding = self.bindings.remove(state).unwrap_or_default();
                (*state, Arc::new(binding))
            })
            .collect();

        Ok(StateRegistry { bindings, domain })
    }

    fn bind(mut self, state: S, hook: HookKind, apply: impl FnOnce(&mut StateBinding<O>)) -> Self {
        if self.error.is_some() {
            return self;
        }
        if !S::all().contains(&state) {
            self.error = Some(FsmError::DelegateBinding {
                state: state.name(),
                hook,
                reason: "state is not part of the declared domain",
            });
            return self;
        }

        let binding = self.bindings.entry(state).or_default();
        if binding.is_bound(hook) {
            self.error = Some(FsmError::DelegateBinding {
                state: state.name(),
                hook,
                reason: "hook is already bound",
            });
            return self;
        }

        apply(binding);
        self
    }
}

fn boxed_async<O, F, Fut>(hook: F) -> AsyncHook<O>
where
    O: StateOwner,
    F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |owner: Arc<O>| -> HookFuture { Box::pin(hook(owner)) })
}

/// Declares the hooks an owner type provides for state type `S`.
///
/// Normally generated by `#[state_hooks]`.
pub trait HookTable<S: StateId>: StateOwner + Sized {
    /// Adds this type's hooks to `builder`.
    fn bind_hooks(builder: RegistryBuilder<S, Self>) -> RegistryBuilder<S, Self>;

    /// Builds a registry holding this type's hooks.
    fn registry() -> Result<StateRegistry<S, Self>, FsmError> {
        Self::bind_hooks(StateRegistry::builder()).build()
    }
}

type CacheKey = (TypeId, TypeId);

/// Registries keyed by owner type and state type, built on first use.
///
/// Owned by whoever composes the application; there is no process-wide
/// instance.
#[derive(Default)]
pub struct RegistryCache {
    entries: Mutex<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
}

impl RegistryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached registry for `(O, S)`, building it if absent.
    ///
    /// A build failure is returned and nothing is cached.
    pub fn get_or_build<S, O>(&self) -> Result<Arc<StateRegistry<S, O>>, FsmError>
    where
        S: StateId,
        O: HookTable<S>,
    {
        let key = (TypeId::of::<O>(), TypeId::of::<S>());
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get(&key)
            && let Ok(registry) = Arc::clone(entry).downcast::<StateRegistry<S, O>>()
        {
            return Ok(registry);
        }

        let registry = Arc::new(O::registry()?);
        tracing::debug!(
            owner = std::any::type_name::<O>(),
            states = registry.len(),
            "built state registry"
        );
        entries.insert(key, Arc::clone(&registry) as Arc<dyn Any + Send + Sync>);
        Ok(registry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RegistryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Light {
        Red,
        Green,
        Broken,
    }

    impl StateId for Light {
        fn all() -> &'static [Self] {
            // `Broken` is deliberately left out of the domain.
            &[Light::Red, Light::Green]
        }

        fn name(&self) -> &'static str {
            match self {
                Light::Red => "Red",
                Light::Green => "Green",
                Light::Broken => "Broken",
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Nothing {}

    impl StateId for Nothing {
        fn all() -> &'static [Self] {
            &[]
        }

        fn name(&self) -> &'static str {
            match *self {}
        }
    }

    #[derive(Default)]
    struct Lamp {
        ticks: AtomicUsize,
    }

    impl StateOwner for Lamp {}

    impl HookTable<Light> for Lamp {
        fn bind_hooks(builder: RegistryBuilder<Light, Self>) -> RegistryBuilder<Light, Self> {
            builder
                .on_enter(Light::Red, |_| {})
                .on_exit_async(Light::Red, |_| async {})
                .on_tick(Light::Green, |lamp| {
                    lamp.ticks.fetch_add(1, Ordering::SeqCst);
                })
        }
    }

    #[test]
    fn build_covers_whole_domain() {
        let registry = Lamp::registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.domain(), &[Light::Red, Light::Green]);

        let red = registry.resolve(Light::Red).unwrap();
        assert!(red.is_bound(HookKind::Enter));
        assert!(!red.has_async_enter());
        assert!(red.has_async_exit());

        let green = registry.resolve(Light::Green).unwrap();
        assert!(green.enter().is_none());
        assert!(green.is_bound(HookKind::Tick));
        assert!(!green.is_bound(HookKind::LateTick));
    }

    #[test]
    fn tick_hook_runs_against_owner() {
        let registry = Lamp::registry().unwrap();
        let lamp = Lamp::default();
        let green = registry.resolve(Light::Green).unwrap();

        assert!(green.run_tick(TickKind::Tick, &lamp));
        assert!(!green.run_tick(TickKind::FixedTick, &lamp));
        assert_eq!(lamp.ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_hook_is_a_binding_error() {
        let result = StateRegistry::<Light, Lamp>::builder()
            .on_enter(Light::Red, |_| {})
            .on_enter_async(Light::Red, |_| async {})
            .build();

        assert_eq!(
            result.unwrap_err(),
            FsmError::DelegateBinding {
                state: "Red",
                hook: HookKind::Enter,
                reason: "hook is already bound",
            }
        );
    }

    #[test]
    fn state_outside_domain_is_a_binding_error() {
        let result = StateRegistry::<Light, Lamp>::builder()
            .on_finally(Light::Broken, |_| {})
            .build();

        assert!(matches!(
            result,
            Err(FsmError::DelegateBinding {
                state: "Broken",
                hook: HookKind::Finally,
                ..
            })
        ));
    }

    #[test]
    fn empty_domain_is_rejected() {
        struct Void;
        impl StateOwner for Void {}

        let result = StateRegistry::<Nothing, Void>::builder().build();
        assert_eq!(result.unwrap_err(), FsmError::EmptyDomain);
    }

    #[test]
    fn default_registry_is_unbuilt() {
        let registry = StateRegistry::<Light, Lamp>::default();
        assert!(registry.is_empty());
        assert!(registry.resolve(Light::Red).is_none());
    }

    #[test]
    fn cache_builds_once_per_owner() {
        let cache = RegistryCache::new();
        let first = cache.get_or_build::<Light, Lamp>().unwrap();
        let second = cache.get_or_build::<Light, Lamp>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hook_kind_display_is_snake_case() {
        assert_eq!(HookKind::LateTick.to_string(), "late_tick");
        assert_eq!(HookKind::Finally.to_string(), "finally");
        assert!(HookKind::Exit.allows_async());
        assert!(!HookKind::Tick.allows_async());
    }
}
