//! Reactive Runtime
//!
//! The runtime is the explicit context object threaded through every read and
//! write. It owns the stack of running effects and the current nesting depth,
//! and implements the two entry points the source layer calls:
//!
//! - [`Runtime::track`] on read: subscribe the running effect to a dep.
//! - [`Runtime::trigger`] on write: notify every subscriber of a dep.
//!
//! # How It Works
//!
//! 1. Running an effect pushes it and increments the depth (see
//!    [`ContextGuard`](super::context)).
//!
//! 2. Reads inside the run call `track`, which uses the depth's marker bit to
//!    add the effect to each dep at most once, and only if it was not already
//!    there before the run.
//!
//! 3. Writes call `trigger` in two phases. Effects owned by computed values
//!    are notified first; their schedulers mark the value dirty and notify
//!    its readers in turn. Plain effects reached anywhere in that cascade are
//!    queued, and run once each when the outermost `trigger` returns, so every
//!    computed value they read is already dirty.
//!
//! The runtime is single-threaded: nesting is plain call-stack recursion and
//! nothing here is `Send`.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::dep::{Dep, DepId};
use super::effect::{DebuggerEventKind, EffectHandle};
use super::subscriber::{Subscriber, SubscriberId};
use crate::config::RuntimeConfig;
use crate::error::Result;

/// Execution context for effects and computed values.
pub struct Runtime {
    config: RuntimeConfig,

    /// Running effects, innermost last.
    stack: RefCell<Vec<Rc<dyn Subscriber>>>,

    /// Current nesting depth; equals the stack length.
    depth: Cell<u32>,

    should_track: Cell<bool>,
    track_stack: RefCell<Vec<bool>>,

    /// Nesting of `trigger` calls currently notifying.
    trigger_depth: Cell<u32>,

    /// Plain effects waiting for the outermost `trigger` to finish, with the
    /// dep that first reached them.
    pending: RefCell<IndexMap<SubscriberId, (Weak<dyn Subscriber>, DepId)>>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            stack: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            should_track: Cell::new(true),
            track_stack: RefCell::new(Vec::new()),
            trigger_depth: Cell::new(0),
            pending: RefCell::new(IndexMap::new()),
        }
    }

    /// The runtime's configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current effect nesting depth. Zero outside any effect.
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// The innermost running effect, if any.
    pub fn active_effect(&self) -> Option<SubscriberId> {
        self.stack.borrow().last().map(|effect| effect.state().id())
    }

    /// Whether a read right now would be recorded as a dependency.
    pub fn is_tracking(&self) -> bool {
        self.should_track.get() && !self.stack.borrow().is_empty()
    }

    /// Stop attributing reads until the matching [`reset_tracking`].
    ///
    /// [`reset_tracking`]: Runtime::reset_tracking
    pub fn pause_tracking(&self) {
        self.track_stack.borrow_mut().push(self.should_track.get());
        self.should_track.set(false);
    }

    /// Attribute reads again until the matching [`reset_tracking`].
    ///
    /// [`reset_tracking`]: Runtime::reset_tracking
    pub fn enable_tracking(&self) {
        self.track_stack.borrow_mut().push(self.should_track.get());
        self.should_track.set(true);
    }

    /// Restore the tracking state saved by the last pause or enable.
    pub fn reset_tracking(&self) {
        let last = self.track_stack.borrow_mut().pop();
        self.should_track.set(last.unwrap_or(true));
    }

    /// Run `f` without recording any of its reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.pause_tracking();
        let result = f();
        self.reset_tracking();
        result
    }

    /// Record that the running effect reads `dep`.
    ///
    /// Does nothing outside an effect or while tracking is paused.
    pub fn track(&self, dep: &Dep) {
        if !self.should_track.get() {
            return;
        }
        let Some(effect) = self.stack.borrow().last().cloned() else {
            return;
        };

        let state = effect.state();
        let depth = self.depth.get();
        let should_add = if depth <= self.config.max_track_depth {
            let bit = 1u32 << depth;
            if dep.new_tracked_at(bit) {
                false
            } else {
                dep.mark_new_tracked(bit);
                !dep.was_tracked_at(bit)
            }
        } else {
            !dep.contains(state.id())
        };

        if !should_add {
            return;
        }

        dep.add(&effect);
        state.deps.borrow_mut().push(dep.clone());
        tracing::trace!(
            effect = state.id().raw(),
            dep = dep.id().raw(),
            depth,
            "track"
        );
        state.emit(dep.id(), DebuggerEventKind::Track);
    }

    /// Notify every subscriber of `dep`.
    ///
    /// Effects owned by computed values are notified immediately. Plain
    /// effects are queued and run once each, in first-notified order, before
    /// the outermost `trigger` returns. Subscribers added or removed while
    /// notifying do not affect this round.
    pub fn trigger(&self, dep: &Dep) {
        let effects = dep.snapshot();
        if effects.is_empty() {
            return;
        }
        tracing::trace!(dep = dep.id().raw(), subscribers = effects.len(), "trigger");

        {
            let _round = TriggerRound::enter(self);
            let (computed, plain): (Vec<_>, Vec<_>) = effects
                .into_iter()
                .partition(|effect| effect.state().is_computed());
            for effect in computed {
                self.trigger_effect(effect, dep.id());
            }
            for effect in plain {
                self.enqueue(&effect, dep.id());
            }
        }

        if self.trigger_depth.get() == 0 {
            self.flush_pending();
        }
    }

    /// Notify the union of several deps, running each subscriber once.
    pub fn trigger_many(&self, deps: &[&Dep]) {
        match deps {
            [] => {}
            [dep] => self.trigger(dep),
            _ => {
                let merged = Dep::with_effects(
                    deps.iter()
                        .flat_map(|dep| dep.snapshot())
                        .map(|inner| EffectHandle { inner }),
                );
                self.trigger(&merged);
            }
        }
    }

    /// Whether a write made right now may notify `effect`.
    fn may_notify(&self, effect: &Rc<dyn Subscriber>) -> bool {
        let state = effect.state();
        self.active_effect() != Some(state.id()) || state.allow_recurse()
    }

    fn enqueue(&self, effect: &Rc<dyn Subscriber>, dep: DepId) {
        if !self.may_notify(effect) {
            return;
        }
        self.pending
            .borrow_mut()
            .entry(effect.state().id())
            .or_insert_with(|| (Rc::downgrade(effect), dep));
    }

    /// Run the queued plain effects. Effects dropped or stopped since they
    /// were queued are skipped.
    fn flush_pending(&self) {
        loop {
            let batch = std::mem::take(&mut *self.pending.borrow_mut());
            if batch.is_empty() {
                return;
            }
            for (_, (effect, dep)) in batch {
                let Some(effect) = effect.upgrade() else {
                    continue;
                };
                if effect.state().is_active() {
                    self.notify(effect, dep);
                }
            }
        }
    }

    fn trigger_effect(&self, effect: Rc<dyn Subscriber>, dep: DepId) {
        if self.may_notify(&effect) {
            self.notify(effect, dep);
        }
    }

    fn notify(&self, effect: Rc<dyn Subscriber>, dep: DepId) {
        let state = effect.state();
        state.emit(dep, DebuggerEventKind::Trigger);
        match state.scheduler() {
            Some(scheduler) => scheduler(self),
            None => Rc::clone(&effect).rerun(self),
        }
    }

    pub(crate) fn push_effect(&self, effect: Rc<dyn Subscriber>) {
        self.stack.borrow_mut().push(effect);
    }

    pub(crate) fn pop_effect(&self) -> Option<Rc<dyn Subscriber>> {
        self.stack.borrow_mut().pop()
    }

    pub(crate) fn set_depth(&self, depth: u32) {
        self.depth.set(depth);
    }

    pub(crate) fn replace_should_track(&self, should_track: bool) -> bool {
        self.should_track.replace(should_track)
    }
}

/// One level of `trigger` nesting. Decrements the depth even if a scheduler
/// panics, so later writes still flush.
struct TriggerRound<'rt> {
    rt: &'rt Runtime,
}

impl<'rt> TriggerRound<'rt> {
    fn enter(rt: &'rt Runtime) -> Self {
        rt.trigger_depth.set(rt.trigger_depth.get() + 1);
        Self { rt }
    }
}

impl Drop for TriggerRound<'_> {
    fn drop(&mut self) {
        self.rt.trigger_depth.set(self.rt.trigger_depth.get() - 1);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("depth", &self.depth.get())
            .field("active_effect", &self.active_effect())
            .field("should_track", &self.should_track.get())
            .finish()
    }
}
