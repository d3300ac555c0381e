//! Subscriber Sets
//!
//! A [`Dep`] is the set of evaluation contexts interested in one source. Reads
//! of the source add the running context, writes notify every member.
//!
//! # Tracking Markers
//!
//! Each dep carries two `u32` bitfields, `was_tracked` and `new_tracked`, with
//! one bit per level of effect nesting. They let an effect reconcile its
//! dependency list after a run in a single pass instead of clearing and
//! re-adding itself everywhere:
//!
//! 1. Before the run, every dep already in the effect's list gets the current
//!    depth bit set in `was_tracked` ([`init_dep_markers`]).
//! 2. During the run, a read sets the bit in `new_tracked`. The effect is only
//!    added to the dep if the bit was set for the first time this run and the
//!    dep was not already tracked ([`Runtime::track`]).
//! 3. After the run, deps that were tracked before but not touched now lose
//!    the effect, and both bits are cleared ([`finalize_dep_markers`]).
//!
//! Nested runs use the next bit, so an inner run never aliases the markers of
//! the run that encloses it.
//!
//! Membership is keyed by [`SubscriberId`] and holds only weak references, so
//! a dep never keeps an effect alive.
//!
//! [`Runtime::track`]: super::Runtime::track

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::effect::{EffectHandle, EffectState};
use super::subscriber::{Subscriber, SubscriberId};

/// Unique identifier for a dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(u64);

impl DepId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The set of evaluation contexts subscribed to one source.
///
/// Cloning a `Dep` yields another handle to the same set.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

struct DepInner {
    id: DepId,
    subscribers: RefCell<IndexMap<SubscriberId, Weak<dyn Subscriber>>>,
    was_tracked: Cell<u32>,
    new_tracked: Cell<u32>,
}

impl Dep {
    /// Create an empty dep with both markers zeroed.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::new(),
                subscribers: RefCell::new(IndexMap::new()),
                was_tracked: Cell::new(0),
                new_tracked: Cell::new(0),
            }),
        }
    }

    /// Create a dep pre-populated with the given effects.
    ///
    /// The effects do not record this dep in their own dependency lists, so
    /// this is meant for short-lived sets built only to be triggered.
    pub fn with_effects<I>(effects: I) -> Self
    where
        I: IntoIterator<Item = EffectHandle>,
    {
        let dep = Self::new();
        for effect in effects {
            dep.add(&effect.inner);
        }
        dep
    }

    /// Get the dep's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Whether no effect is subscribed.
    pub fn is_empty(&self) -> bool {
        self.inner.subscribers.borrow().is_empty()
    }

    /// Whether the given effect is subscribed.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.subscribers.borrow().contains_key(&id)
    }

    /// IDs of the current subscribers.
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.inner.subscribers.borrow().keys().copied().collect()
    }

    /// Visit every live subscriber.
    ///
    /// Iterates over a snapshot taken before the first call, so `f` may add
    /// or remove members of this dep freely.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&EffectHandle),
    {
        for inner in self.snapshot() {
            f(&EffectHandle { inner });
        }
    }

    /// Raw `was_tracked` marker.
    pub fn was_tracked(&self) -> u32 {
        self.inner.was_tracked.get()
    }

    /// Raw `new_tracked` marker.
    pub fn new_tracked(&self) -> u32 {
        self.inner.new_tracked.get()
    }

    /// Whether both handles point to the same set.
    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn was_tracked_at(&self, bit: u32) -> bool {
        self.inner.was_tracked.get() & bit != 0
    }

    pub(crate) fn new_tracked_at(&self, bit: u32) -> bool {
        self.inner.new_tracked.get() & bit != 0
    }

    pub(crate) fn mark_new_tracked(&self, bit: u32) {
        self.inner.new_tracked.set(self.inner.new_tracked.get() | bit);
    }

    fn mark_was_tracked(&self, bit: u32) {
        self.inner.was_tracked.set(self.inner.was_tracked.get() | bit);
    }

    fn clear_markers(&self, bit: u32) {
        self.inner.was_tracked.set(self.inner.was_tracked.get() & !bit);
        self.inner.new_tracked.set(self.inner.new_tracked.get() & !bit);
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub(crate) fn add(&self, effect: &Rc<dyn Subscriber>) -> bool {
        let id = effect.state().id();
        let mut subscribers = self.inner.subscribers.borrow_mut();
        if subscribers.contains_key(&id) {
            return false;
        }
        subscribers.insert(id, Rc::downgrade(effect));
        true
    }

    /// Remove a subscriber. Returns `false` if it was not present.
    ///
    /// Only reconciliation and effect cleanup remove members.
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        self.inner
            .subscribers
            .borrow_mut()
            .swap_remove(&id)
            .is_some()
    }

    /// Strong handles to every live subscriber, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<Rc<dyn Subscriber>> {
        self.inner
            .subscribers
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscribers", &self.subscriber_ids())
            .field("was_tracked", &format_args!("{:#b}", self.was_tracked()))
            .field("new_tracked", &format_args!("{:#b}", self.new_tracked()))
            .finish()
    }
}

/// Mark every dep the effect currently depends on as tracked at `bit`.
pub(crate) fn init_dep_markers(deps: &[Dep], bit: u32) {
    for dep in deps {
        dep.mark_was_tracked(bit);
    }
}

/// Drop the deps the effect stopped reading during the run at `bit`.
///
/// Compacts the dependency list in place and clears `bit` on every visited
/// dep so the next run at this depth starts clean.
pub(crate) fn finalize_dep_markers(effect: &EffectState, bit: u32) {
    let mut deps = effect.deps.borrow_mut();
    if deps.is_empty() {
        return;
    }

    let id = effect.id();
    deps.retain(|dep| {
        let stale = dep.was_tracked_at(bit) && !dep.new_tracked_at(bit);
        if stale {
            dep.remove(id);
        }
        dep.clear_markers(bit);
        !stale
    });
}
