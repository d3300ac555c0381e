//! Reactive Context
//!
//! The reactive context tracks which effect is currently running, so that
//! reads can be attributed to it.
//!
//! # Implementation
//!
//! Entering an effect run pushes the effect onto the [`Runtime`] stack and
//! bumps the nesting depth; the depth selects the marker bit the run uses in
//! every dep. [`ContextGuard`] undoes both when dropped, after reconciling the
//! effect's dependency list, so the enclosing run resumes exactly where it
//! left off. Because the guard does the unwinding, this holds even if the
//! effect's function panics.
//!
//! Nesting deeper than `max_track_depth` cannot be represented in the
//! markers. Debug builds panic before touching any state; release builds log
//! an error and rebuild the effect's dependencies from scratch for that run.

use std::rc::Rc;

use super::dep::{finalize_dep_markers, init_dep_markers};
use super::runtime::Runtime;
use super::subscriber::Subscriber;
use crate::error::ReactiveError;

/// Guard for one effect run. Restores the enclosing context when dropped.
pub(crate) struct ContextGuard<'rt> {
    rt: &'rt Runtime,
    effect: Rc<dyn Subscriber>,
    /// Marker bit for this run, `None` past the marker width.
    bit: Option<u32>,
    prev_should_track: bool,
}

impl<'rt> ContextGuard<'rt> {
    /// Enter a run of `effect`.
    ///
    /// Returns `None` if the effect is already running further up the stack.
    pub(crate) fn enter(rt: &'rt Runtime, effect: Rc<dyn Subscriber>) -> Option<Self> {
        let state = effect.state();
        if state.is_running() {
            tracing::debug!(effect = state.id().raw(), "skipping reentrant effect run");
            return None;
        }

        let depth = rt.depth() + 1;
        let max = rt.config().max_track_depth;
        let bit = if depth <= max {
            Some(1u32 << depth)
        } else {
            let err = ReactiveError::RecursionLimit { depth, max };
            tracing::error!(effect = state.id().raw(), "{err}; rebuilding dependencies without markers");
            if cfg!(debug_assertions) {
                panic!("{err}");
            }
            None
        };

        rt.push_effect(Rc::clone(&effect));
        rt.set_depth(depth);
        let prev_should_track = rt.replace_should_track(true);
        state.set_running(true);

        match bit {
            Some(bit) => init_dep_markers(&state.deps.borrow(), bit),
            None => state.cleanup(),
        }

        Some(Self {
            rt,
            effect,
            bit,
            prev_should_track,
        })
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let state = self.effect.state();
        if let Some(bit) = self.bit {
            finalize_dep_markers(state, bit);
        }
        state.set_running(false);

        let popped = self.rt.pop_effect();

        // Guards must be dropped in reverse order of entry.
        debug_assert_eq!(
            popped.map(|effect| effect.state().id()),
            Some(state.id()),
            "ContextGuard mismatch"
        );

        self.rt.set_depth(self.rt.depth() - 1);
        self.rt.replace_should_track(self.prev_should_track);

        if state.take_defer_stop() {
            state.stop();
        }
    }
}
