//! Computed Implementation
//!
//! A [`Computed`] is a cached derived value that re-evaluates only when one
//! of its dependencies changes.
//!
//! # How Computed Values Work
//!
//! 1. Construction wraps the getter in an effect but does not run it. The
//!    value starts dirty.
//!
//! 2. Reading a dirty value runs the effect, which records the deps the
//!    getter reads, stores the result and marks the value clean.
//!
//! 3. When one of those deps fires, the effect's scheduler marks the value
//!    dirty and triggers the computed's own dep, so readers of the computed
//!    learn it may have changed. Nothing is recomputed at this point.
//!
//! 4. The next read recomputes.
//!
//! A computed is itself a source: reading it inside another effect subscribes
//! that effect to the computed's dep, exactly like reading a [`Signal`].
//!
//! # Non-cacheable Mode
//!
//! With caching disabled (non-interactive rendering), the owned effect is
//! inactive: it never tracks, is never notified, and every read re-runs the
//! getter.
//!
//! [`Signal`]: super::Signal

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::dep::Dep;
use super::effect::{DebuggerOptions, ReactiveEffect};
use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};

type Getter<T> = Box<dyn Fn(&Runtime) -> T>;
type Setter<T> = Box<dyn Fn(&Runtime, T)>;

/// Getter and setter of a writable computed value.
pub struct ComputedOptions<T> {
    pub get: Getter<T>,
    pub set: Setter<T>,
}

impl<T> ComputedOptions<T> {
    /// Bundle a getter with the setter writes are forwarded to.
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&Runtime) -> T + 'static,
        S: Fn(&Runtime, T) + 'static,
    {
        Self {
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

/// A lazily recomputed, cached derived value.
///
/// Cloning yields another handle to the same cache.
///
/// # Example
///
/// ```rust
/// use reflux_core::reactive::{computed, Runtime, Signal};
///
/// let rt = Runtime::new();
/// let count = Signal::new(1);
///
/// let c = count.clone();
/// let double = computed(&rt, move |rt| c.get(rt) * 2);
/// assert_eq!(double.get(&rt), 2);
///
/// count.set(&rt, 5);
/// assert_eq!(double.get(&rt), 10);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    /// Subscribers reading this computed.
    dep: Dep,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    dirty: Cell<bool>,
    cacheable: bool,
    read_only: bool,
    setter: Option<Setter<T>>,
    effect: ReactiveEffect<T>,
}

impl<T> ComputedInner<T> {
    /// Scheduler body: flag the cache stale and tell our own readers.
    fn mark_dirty(&self, rt: &Runtime) {
        if self.dirty.get() {
            return;
        }
        self.dirty.set(true);
        tracing::trace!(effect = self.effect.id().raw(), "computed marked dirty");
        rt.trigger(&self.dep);
    }
}

/// Clears the dirty flag for one evaluation and sets it again if the getter
/// unwinds, so the next read retries instead of reporting a cycle.
struct PendingRun<'a> {
    dirty: &'a Cell<bool>,
    finished: bool,
}

impl<'a> PendingRun<'a> {
    fn start(dirty: &'a Cell<bool>) -> Self {
        dirty.set(false);
        Self {
            dirty,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for PendingRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.dirty.set(true);
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a read-only, cached computed value.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn(&Runtime) -> T + 'static,
    {
        Self::new_raw(Box::new(getter), None, true, true)
    }

    /// Create a cached computed value whose writes go to `setter`.
    pub fn writable<G, S>(getter: G, setter: S) -> Self
    where
        G: Fn(&Runtime) -> T + 'static,
        S: Fn(&Runtime, T) + 'static,
    {
        Self::new_raw(Box::new(getter), Some(Box::new(setter)), false, true)
    }

    /// Create a computed value with every knob explicit.
    ///
    /// The owned effect is created here, wired so that its notifications
    /// mark this value dirty, and left inactive when `cacheable` is false.
    pub fn new_raw(
        getter: Getter<T>,
        setter: Option<Setter<T>>,
        read_only: bool,
        cacheable: bool,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let scheduler: Box<dyn Fn(&Runtime)> = Box::new(move |rt| {
                if let Some(this) = weak.upgrade() {
                    this.mark_dirty(rt);
                }
            });

            let effect = ReactiveEffect::build(getter, Some(scheduler), true);
            effect.state().set_active(cacheable);

            ComputedInner {
                dep: Dep::new(),
                value: RefCell::new(None),
                dirty: Cell::new(true),
                cacheable,
                read_only,
                setter,
                effect,
            }
        });

        Self { inner }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the getter reads this computed before its first value
    /// exists. Use [`try_get`](Computed::try_get) to handle that case.
    pub fn get(&self, rt: &Runtime) -> T {
        match self.try_get(rt) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, recomputing if necessary.
    pub fn try_get(&self, rt: &Runtime) -> Result<T> {
        let inner = &self.inner;

        // Readers of a computed depend on it like on any other source
        rt.track(&inner.dep);

        if inner.dirty.get() || !inner.cacheable || !inner.effect.is_active() {
            // Cleared up front so notifications arriving mid-run re-dirty it.
            let mut pending = PendingRun::start(&inner.dirty);
            if let Some(value) = inner.effect.run(rt) {
                *inner.value.borrow_mut() = Some(value);
            }
            pending.finish();
        }

        inner.value.borrow().clone().ok_or(ReactiveError::Cycle)
    }

    /// Write through the setter.
    ///
    /// Never touches the cached value: the setter is expected to mutate some
    /// upstream source, which marks this value dirty through the usual path.
    /// On a read-only computed this is a no-op that logs a warning and
    /// returns [`ReactiveError::ReadOnly`].
    pub fn set(&self, rt: &Runtime, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(rt, value);
                Ok(())
            }
            None if self.inner.read_only => {
                if rt.config().warn_on_readonly_write {
                    tracing::warn!(
                        effect = self.inner.effect.id().raw(),
                        "write operation failed: computed value is readonly"
                    );
                }
                Err(ReactiveError::ReadOnly)
            }
            None => Ok(()),
        }
    }
}

impl<T> Computed<T> {
    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Whether reads are memoized.
    pub fn is_cacheable(&self) -> bool {
        self.inner.cacheable
    }

    /// Whether writes are rejected.
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// The effect wrapping the getter, e.g. for attaching debug hooks.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }

    /// The dep of effects reading this computed.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.len()
    }

    /// Remove the computed from the graph.
    ///
    /// Its effect leaves every dep it was in. Later reads still work but
    /// re-run the getter each time, since no notification can reach it.
    pub fn dispose(&self) {
        self.inner.effect.stop();
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("value", &*self.inner.value.borrow())
            .field("dirty", &self.is_dirty())
            .field("cacheable", &self.is_cacheable())
            .field("read_only", &self.is_read_only())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a read-only computed value.
///
/// Caching follows the runtime: disabled when [`RuntimeConfig::ssr`] is set.
///
/// [`RuntimeConfig::ssr`]: crate::config::RuntimeConfig::ssr
pub fn computed<T, F>(rt: &Runtime, getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn(&Runtime) -> T + 'static,
{
    Computed::new_raw(Box::new(getter), None, true, !rt.config().ssr)
}

/// Create a read-only computed value observed by debug hooks.
///
/// Like [`computed`], but attaches `debugger` to the owned effect. The hooks
/// are dropped when caching is disabled.
pub fn computed_debug<T, F>(rt: &Runtime, getter: F, debugger: DebuggerOptions) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn(&Runtime) -> T + 'static,
{
    let cacheable = !rt.config().ssr;
    let computed = Computed::new_raw(Box::new(getter), None, true, cacheable);
    attach_debugger(&computed, Some(debugger));
    computed
}

/// Create a writable computed value, optionally with debug hooks.
///
/// Debug hooks are only attached when caching is enabled; a non-cacheable
/// computed never tracks, so they would never fire.
pub fn computed_with<T>(
    rt: &Runtime,
    options: ComputedOptions<T>,
    debugger: Option<DebuggerOptions>,
) -> Computed<T>
where
    T: Clone + 'static,
{
    let cacheable = !rt.config().ssr;
    let computed = Computed::new_raw(options.get, Some(options.set), false, cacheable);
    attach_debugger(&computed, debugger);
    computed
}

fn attach_debugger<T>(computed: &Computed<T>, debugger: Option<DebuggerOptions>) {
    if let Some(debugger) = debugger.filter(|_| computed.is_cacheable()) {
        computed.effect().set_debugger(debugger);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::reactive::{effect, ReactiveEffect, Signal};

    fn counted<T: Clone + 'static>(
        rt: &Runtime,
        f: impl Fn(&Runtime) -> T + 'static,
    ) -> (Computed<T>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let computed = computed(rt, move |rt| {
            calls_clone.set(calls_clone.get() + 1);
            f(rt)
        });
        (computed, calls)
    }

    #[test]
    fn computed_is_lazy() {
        let rt = Runtime::new();
        let (computed, calls) = counted(&rt, |_| 42);

        assert!(computed.is_dirty());
        assert!(!computed.has_value());
        assert_eq!(calls.get(), 0);

        assert_eq!(computed.get(&rt), 42);
        assert_eq!(calls.get(), 1);
        assert!(computed.has_value());
        assert!(!computed.is_dirty());
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let rt = Runtime::new();
        let (computed, calls) = counted(&rt, |_| 42);

        assert_eq!(computed.get(&rt), 42);
        assert_eq!(computed.get(&rt), 42);
        assert_eq!(computed.get(&rt), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn source_change_marks_dirty_without_recomputing() {
        let rt = Runtime::new();
        let source = Signal::new(1);
        let s = source.clone();
        let (computed, calls) = counted(&rt, move |rt| s.get(rt) + 1);

        assert_eq!(computed.get(&rt), 2);
        source.set(&rt, 10);

        assert!(computed.is_dirty());
        assert_eq!(calls.get(), 1);

        assert_eq!(computed.get(&rt), 11);
        assert_eq!(calls.get(), 2);
        assert!(!computed.is_dirty());
    }

    #[test]
    fn readers_are_told_once_until_the_next_read() {
        let rt = Runtime::new();
        let source = Signal::new(0);
        let s = source.clone();
        let (computed, calls) = counted(&rt, move |rt| s.get(rt));

        let notified = Rc::new(Cell::new(0));
        let (c, n) = (computed.clone(), notified.clone());
        let watcher = ReactiveEffect::with_scheduler(
            move |rt| c.get(rt),
            move |_| n.set(n.get() + 1),
        );
        assert_eq!(watcher.run(&rt), Some(0));
        assert_eq!(computed.subscriber_count(), 1);

        source.set(&rt, 1);
        assert_eq!(notified.get(), 1);

        // Still dirty, so the second write is absorbed.
        source.set(&rt, 2);
        assert_eq!(notified.get(), 1);
        assert_eq!(calls.get(), 1);

        assert_eq!(computed.get(&rt), 2);
        source.set(&rt, 3);
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn reader_effect_reruns_with_fresh_value() {
        let rt = Runtime::new();
        let source = Signal::new(1);
        let s = source.clone();
        let (computed, _) = counted(&rt, move |rt| s.get(rt) * 10);

        let seen = Rc::new(Cell::new(0));
        let (c, seen_clone) = (computed.clone(), seen.clone());
        let _reader = effect(&rt, move |rt| seen_clone.set(c.get(rt)));
        assert_eq!(seen.get(), 10);

        source.set(&rt, 4);
        assert_eq!(seen.get(), 40);
        assert!(!computed.is_dirty());
    }

    #[test]
    fn non_cacheable_reruns_every_read() {
        let config = RuntimeConfig {
            ssr: true,
            ..RuntimeConfig::default()
        };
        let rt = Runtime::with_config(config).unwrap();
        let source = Signal::new(3);
        let s = source.clone();
        let (computed, calls) = counted(&rt, move |rt| s.get(rt));

        assert!(!computed.is_cacheable());
        assert!(!computed.effect().is_active());

        assert_eq!(computed.get(&rt), 3);
        assert_eq!(computed.get(&rt), 3);
        assert_eq!(calls.get(), 2);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn read_only_write_is_rejected() {
        let rt = Runtime::new();
        let (computed, calls) = counted(&rt, |_| 1);
        assert_eq!(computed.get(&rt), 1);

        assert!(computed.is_read_only());
        assert!(matches!(computed.set(&rt, 5), Err(ReactiveError::ReadOnly)));
        assert_eq!(computed.get(&rt), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn writable_forwards_to_setter() {
        let rt = Runtime::new();
        let source = Signal::new(2);

        let (get_src, set_src) = (source.clone(), source.clone());
        let doubled = computed_with(
            &rt,
            ComputedOptions::new(
                move |rt| get_src.get(rt) * 2,
                move |rt, value: i32| set_src.set(rt, value / 2),
            ),
            None,
        );

        assert!(!doubled.is_read_only());
        assert_eq!(doubled.get(&rt), 4);

        doubled.set(&rt, 20).unwrap();
        assert_eq!(source.get_untracked(), 10);
        assert!(doubled.is_dirty());
        assert_eq!(doubled.get(&rt), 20);
    }

    #[test]
    fn getter_only_without_read_only_flag_ignores_writes() {
        let rt = Runtime::new();
        let computed: Computed<i32> = Computed::new_raw(Box::new(|_: &Runtime| 1), None, false, true);
        assert!(computed.set(&rt, 2).is_ok());
        assert_eq!(computed.get(&rt), 1);
    }

    #[test]
    fn dispose_detaches_from_sources() {
        let rt = Runtime::new();
        let source = Signal::new(1);
        let s = source.clone();
        let (computed, calls) = counted(&rt, move |rt| s.get(rt));

        assert_eq!(computed.get(&rt), 1);
        assert_eq!(source.subscriber_count(), 1);

        computed.dispose();
        assert_eq!(source.subscriber_count(), 0);

        source.set(&rt, 2);
        assert!(!computed.is_dirty());

        // Disposed values cannot be notified, so reads recompute.
        assert_eq!(computed.get(&rt), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn dropping_computed_detaches_from_sources() {
        let rt = Runtime::new();
        let source = Signal::new(1);
        {
            let s = source.clone();
            let computed = Computed::new(move |rt| s.get(rt));
            computed.get(&rt);
            assert_eq!(source.subscriber_count(), 1);
        }
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn self_read_during_first_evaluation_is_a_cycle() {
        let rt = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::default();

        let slot_clone = slot.clone();
        let computed = Computed::new(move |rt| {
            let this = slot_clone.borrow().clone();
            match this {
                Some(this) => this.try_get(rt).unwrap_or(-1),
                None => 0,
            }
        });
        *slot.borrow_mut() = Some(computed.clone());

        assert_eq!(computed.try_get(&rt).unwrap(), -1);

        // Break the Rc cycle between the computed and its own getter.
        slot.borrow_mut().take();
    }

    #[test]
    fn panicking_getter_leaves_value_dirty() {
        let rt = Runtime::new();
        let fail = Rc::new(Cell::new(true));
        let f = fail.clone();
        let (computed, calls) = counted(&rt, move |_| {
            if f.get() {
                panic!("getter failed");
            }
            5
        });

        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| computed.try_get(&rt)));
        assert!(result.is_err());
        assert!(computed.is_dirty());
        assert!(!computed.has_value());
        assert!(rt.active_effect().is_none());

        fail.set(false);
        assert_eq!(computed.try_get(&rt).unwrap(), 5);
        assert_eq!(calls.get(), 2);
        assert!(!computed.is_dirty());
    }

    #[test]
    fn read_only_debug_hooks_follow_cacheability() {
        let source = Signal::new(1);

        let rt = Runtime::new();
        let tracked = Rc::new(Cell::new(0));
        let (s, t) = (source.clone(), tracked.clone());
        let value = computed_debug(
            &rt,
            move |rt| s.get(rt),
            DebuggerOptions::default().on_track(move |_| t.set(t.get() + 1)),
        );
        assert!(value.is_read_only());
        assert_eq!(value.get(&rt), 1);
        assert_eq!(tracked.get(), 1);

        let ssr = Runtime::with_config(RuntimeConfig {
            ssr: true,
            ..RuntimeConfig::default()
        })
        .unwrap();
        let ssr_tracked = Rc::new(Cell::new(0));
        let (s, t) = (source.clone(), ssr_tracked.clone());
        let ssr_value = computed_debug(
            &ssr,
            move |rt| s.get(rt),
            DebuggerOptions::default().on_track(move |_| t.set(t.get() + 1)),
        );
        assert_eq!(ssr_value.get(&ssr), 1);
        assert_eq!(ssr_tracked.get(), 0);
    }

    #[test]
    fn debugger_is_only_attached_when_cacheable() {
        let rt = Runtime::new();
        let source = Signal::new(1);
        let tracked = Rc::new(Cell::new(0));

        let (get_src, set_src, t) = (source.clone(), source.clone(), tracked.clone());
        let computed = computed_with(
            &rt,
            ComputedOptions::new(move |rt| get_src.get(rt), move |rt, v| set_src.set(rt, v)),
            Some(DebuggerOptions::default().on_track(move |_| t.set(t.get() + 1))),
        );
        computed.get(&rt);
        assert_eq!(tracked.get(), 1);

        let ssr = Runtime::with_config(RuntimeConfig {
            ssr: true,
            ..RuntimeConfig::default()
        })
        .unwrap();
        let ssr_tracked = Rc::new(Cell::new(0));
        let (get_src, set_src, t) = (source.clone(), source.clone(), ssr_tracked.clone());
        let ssr_computed = computed_with(
            &ssr,
            ComputedOptions::new(move |rt| get_src.get(rt), move |rt, v| set_src.set(rt, v)),
            Some(DebuggerOptions::default().on_track(move |_| t.set(t.get() + 1))),
        );
        ssr_computed.get(&ssr);
        assert_eq!(ssr_tracked.get(), 0);
    }
}
