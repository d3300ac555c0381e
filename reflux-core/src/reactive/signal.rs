//! Signal Implementation
//!
//! A Signal is the simplest mutable source: a value plus the [`Dep`] of
//! effects reading it. Reads call [`Runtime::track`], writes call
//! [`Runtime::trigger`]; everything else about dependency tracking lives in
//! the runtime.
//!
//! # Example
//!
//! ```rust
//! use reflux_core::reactive::{Runtime, Signal};
//!
//! let rt = Runtime::new();
//! let count = Signal::new(0);
//!
//! count.set(&rt, 5);
//! assert_eq!(count.get(&rt), 5);
//! ```

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::dep::{Dep, DepId};
use super::runtime::Runtime;

/// A reactive source holding a value of type `T`.
///
/// Cloning a signal yields another handle to the same value.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    value: RefCell<T>,
    dep: Dep,
}

impl<T> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                dep: Dep::new(),
            }),
        }
    }

    /// Get the ID of the signal's dep.
    pub fn id(&self) -> DepId {
        self.inner.dep.id()
    }

    /// The dep of effects reading this signal.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Get the current value, tracking the read.
    pub fn get(&self, rt: &Runtime) -> T
    where
        T: Clone,
    {
        rt.track(&self.inner.dep);
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    ///
    /// The signal must not be written from inside `f`.
    pub fn with<R>(&self, rt: &Runtime, f: impl FnOnce(&T) -> R) -> R {
        rt.track(&self.inner.dep);
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, rt: &Runtime, value: T) {
        *self.inner.value.borrow_mut() = value;
        rt.trigger(&self.inner.dep);
    }

    /// Update the value using a function, then notify subscribers.
    pub fn update<F>(&self, rt: &Runtime, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.borrow());
        self.set(rt, new_value);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.len()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect;
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let rt = Runtime::new();
        let signal = Signal::new(0);
        assert_eq!(signal.get(&rt), 0);

        signal.set(&rt, 42);
        assert_eq!(signal.get(&rt), 42);
    }

    #[test]
    fn signal_update() {
        let rt = Runtime::new();
        let signal = Signal::new(10);
        signal.update(&rt, |v| v + 5);
        assert_eq!(signal.get_untracked(), 15);
    }

    #[test]
    fn signal_with_borrows_non_clone_values() {
        let rt = Runtime::new();
        let signal = Signal::new(vec![1, 2, 3]);
        assert_eq!(signal.with(&rt, |v| v.len()), 3);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let rt = Runtime::new();
        let signal = Signal::new(0);
        let call_count = Rc::new(Cell::new(0));

        let (s, calls) = (signal.clone(), call_count.clone());
        let _effect = effect(&rt, move |rt| {
            s.get(rt);
            calls.set(calls.get() + 1);
        });
        assert_eq!(call_count.get(), 1);
        assert_eq!(signal.subscriber_count(), 1);

        signal.set(&rt, 1);
        assert_eq!(call_count.get(), 2);

        signal.set(&rt, 2);
        assert_eq!(call_count.get(), 3);
    }

    #[test]
    fn reads_outside_effects_do_not_subscribe() {
        let rt = Runtime::new();
        let signal = Signal::new(1);
        signal.get(&rt);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let rt = Runtime::new();
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(&rt, 42);
        assert_eq!(signal2.get(&rt), 42);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        assert_ne!(s1.id(), s2.id());
    }
}
