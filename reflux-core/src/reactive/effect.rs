//! Effect Implementation
//!
//! A [`ReactiveEffect`] is one evaluation context: a function plus the
//! bookkeeping needed to know which deps it read on its last run.
//!
//! # How Effects Work
//!
//! 1. Running an effect pushes it onto the [`Runtime`] stack, so every dep
//!    read during the run registers it as a subscriber.
//!
//! 2. When the run finishes, deps that were read last time but not this time
//!    drop the effect (see [`dep`](super::dep) for the marker protocol).
//!
//! 3. When a dep it belongs to is triggered, the effect either re-runs or, if
//!    it carries a scheduler, hands control to the scheduler instead.
//!
//! # Lifetime
//!
//! Deps only hold weak references to effects. Dropping the last handle of an
//! effect removes it from every dep it was in, and [`ReactiveEffect::stop`]
//! does the same while keeping the handle usable.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use smallvec::SmallVec;

use super::context::ContextGuard;
use super::dep::{Dep, DepId};
use super::runtime::Runtime;
use super::subscriber::{Subscriber, SubscriberId};

/// Callback invoked instead of re-running an effect when it is triggered.
pub type EffectScheduler = Box<dyn Fn(&Runtime)>;

/// Debug hook callback.
pub type DebugHook = Rc<dyn Fn(&DebuggerEvent)>;

/// What a debug hook is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerEventKind {
    /// The effect was added to a dep.
    Track,
    /// A dep the effect belongs to fired.
    Trigger,
}

/// Event passed to debug hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebuggerEvent {
    pub effect: SubscriberId,
    pub dep: DepId,
    pub kind: DebuggerEventKind,
}

/// Optional hooks observing an effect's tracking. They have no effect on
/// behavior.
#[derive(Clone, Default)]
pub struct DebuggerOptions {
    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,
}

impl DebuggerOptions {
    /// Set the hook called when the effect starts depending on a dep.
    pub fn on_track<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + 'static,
    {
        self.on_track = Some(Rc::new(hook));
        self
    }

    /// Set the hook called when a dep the effect depends on fires.
    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + 'static,
    {
        self.on_trigger = Some(Rc::new(hook));
        self
    }
}

/// Bookkeeping shared by every effect, independent of its result type.
pub(crate) struct EffectState {
    id: SubscriberId,

    /// Deps read during the most recent run, in first-read order.
    /// Only tracking and reconciliation mutate this list.
    pub(crate) deps: RefCell<SmallVec<[Dep; 4]>>,

    active: Cell<bool>,
    running: Cell<bool>,
    defer_stop: Cell<bool>,
    allow_recurse: Cell<bool>,

    /// Set for effects owned by a computed value.
    computed: bool,

    scheduler: Option<EffectScheduler>,
    debugger: RefCell<DebuggerOptions>,
}

impl EffectState {
    fn new(scheduler: Option<EffectScheduler>, computed: bool) -> Self {
        Self {
            id: SubscriberId::new(),
            deps: RefCell::new(SmallVec::new()),
            active: Cell::new(true),
            running: Cell::new(false),
            defer_stop: Cell::new(false),
            allow_recurse: Cell::new(false),
            computed,
            scheduler,
            debugger: RefCell::new(DebuggerOptions::default()),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.computed
    }

    pub(crate) fn allow_recurse(&self) -> bool {
        self.allow_recurse.get()
    }

    pub(crate) fn scheduler(&self) -> Option<&EffectScheduler> {
        self.scheduler.as_ref()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.get()
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.set(running);
    }

    pub(crate) fn take_defer_stop(&self) -> bool {
        self.defer_stop.replace(false)
    }

    /// Remove this effect from every dep it is in and forget them.
    pub(crate) fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in &deps {
            dep.remove(self.id);
        }
    }

    /// Deactivate the effect. Deferred until the current run ends if the
    /// effect is running.
    pub(crate) fn stop(&self) {
        if self.running.get() {
            self.defer_stop.set(true);
            return;
        }
        if self.active.get() {
            self.cleanup();
            self.active.set(false);
            tracing::debug!(effect = self.id.raw(), "effect stopped");
        }
    }

    /// Invoke the matching debug hook, if any.
    pub(crate) fn emit(&self, dep: DepId, kind: DebuggerEventKind) {
        let hook = {
            let debugger = self.debugger.borrow();
            match kind {
                DebuggerEventKind::Track => debugger.on_track.clone(),
                DebuggerEventKind::Trigger => debugger.on_trigger.clone(),
            }
        };
        if let Some(hook) = hook {
            hook(&DebuggerEvent {
                effect: self.id,
                dep,
                kind,
            });
        }
    }
}

impl Drop for EffectState {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().iter() {
            dep.remove(self.id);
        }
    }
}

struct EffectInner<T> {
    state: EffectState,
    getter: Box<dyn Fn(&Runtime) -> T>,
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn state(&self) -> &EffectState {
        &self.state
    }

    fn rerun(self: Rc<Self>, rt: &Runtime) {
        let _ = ReactiveEffect { inner: self }.run(rt);
    }
}

/// An evaluation context producing values of type `T`.
///
/// Creating an effect does not run it; see [`effect`] for the eager variant.
///
/// # Example
///
/// ```rust
/// use reflux_core::reactive::{ReactiveEffect, Runtime, Signal};
///
/// let rt = Runtime::new();
/// let count = Signal::new(2);
///
/// let c = count.clone();
/// let square = ReactiveEffect::new(move |rt| c.get(rt) * c.get(rt));
///
/// assert_eq!(square.run(&rt), Some(4));
/// assert_eq!(square.dep_count(), 1);
/// ```
pub struct ReactiveEffect<T> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create a new effect re-run directly whenever it is triggered.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn(&Runtime) -> T + 'static,
    {
        Self::build(Box::new(getter), None, false)
    }

    /// Create a new effect whose triggers call `scheduler` instead of
    /// re-running it.
    pub fn with_scheduler<F, S>(getter: F, scheduler: S) -> Self
    where
        F: Fn(&Runtime) -> T + 'static,
        S: Fn(&Runtime) + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(scheduler)), false)
    }

    pub(crate) fn build(
        getter: Box<dyn Fn(&Runtime) -> T>,
        scheduler: Option<EffectScheduler>,
        computed: bool,
    ) -> Self {
        Self {
            inner: Rc::new(EffectInner {
                state: EffectState::new(scheduler, computed),
                getter,
            }),
        }
    }

    /// Run the effect, tracking every dep it reads.
    ///
    /// An inactive effect runs its function without tracking. Returns `None`
    /// without running if the effect is already running further up the stack.
    pub fn run(&self, rt: &Runtime) -> Option<T> {
        if !self.inner.state.is_active() {
            return Some((self.inner.getter)(rt));
        }

        let subscriber: Rc<dyn Subscriber> = self.inner.clone();
        let _guard = ContextGuard::enter(rt, subscriber)?;
        Some((self.inner.getter)(rt))
    }

    /// Type-erased handle to this effect.
    pub fn handle(&self) -> EffectHandle {
        EffectHandle {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ReactiveEffect<T> {
    /// Get the effect's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.state.id()
    }

    /// Whether the effect still tracks its reads.
    pub fn is_active(&self) -> bool {
        self.inner.state.is_active()
    }

    /// Number of deps recorded on the last run.
    pub fn dep_count(&self) -> usize {
        self.inner.state.deps.borrow().len()
    }

    /// Whether the effect depends on the given dep.
    pub fn depends_on(&self, dep: &Dep) -> bool {
        self.inner.state.deps.borrow().iter().any(|d| d.ptr_eq(dep))
    }

    /// Remove the effect from every dep and stop tracking.
    ///
    /// When called from inside the effect's own run, takes effect once that
    /// run returns.
    pub fn stop(&self) {
        self.inner.state.stop();
    }

    /// Allow writes made during the effect's own run to trigger it again.
    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.state.allow_recurse.set(allow);
    }

    /// Attach debug hooks, replacing any previous ones.
    pub fn set_debugger(&self, options: DebuggerOptions) {
        *self.inner.state.debugger.borrow_mut() = options;
    }

    pub(crate) fn state(&self) -> &EffectState {
        &self.inner.state
    }
}

impl<T> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

/// Type-erased handle to an effect of any result type.
#[derive(Clone)]
pub struct EffectHandle {
    pub(crate) inner: Rc<dyn Subscriber>,
}

impl EffectHandle {
    /// Get the effect's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.state().id()
    }

    /// Whether the effect still tracks its reads.
    pub fn is_active(&self) -> bool {
        self.inner.state().is_active()
    }

    /// Whether the effect belongs to a computed value.
    pub fn is_computed(&self) -> bool {
        self.inner.state().is_computed()
    }

    /// Run the effect, discarding its result.
    pub fn run(&self, rt: &Runtime) {
        Rc::clone(&self.inner).rerun(rt);
    }

    /// Remove the effect from every dep and stop tracking.
    pub fn stop(&self) {
        self.inner.state().stop();
    }
}

impl Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("computed", &self.is_computed())
            .finish()
    }
}

/// Create an effect and run it once to establish its dependencies.
///
/// The returned handle keeps the effect alive; dropping it unsubscribes the
/// effect everywhere.
pub fn effect<F>(rt: &Runtime, f: F) -> ReactiveEffect<()>
where
    F: Fn(&Runtime) + 'static,
{
    let effect = ReactiveEffect::new(f);
    effect.run(rt);
    effect
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
