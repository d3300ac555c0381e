//! Subscriber identity for the reactive system.
//!
//! A subscriber is any evaluation context that can sit in a [`Dep`]: plain
//! effects and the effects owned by computed values. Deps only know
//! subscribers through the type-erased [`Subscriber`] trait, so effects with
//! different result types can share one set.
//!
//! [`Dep`]: super::Dep

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::effect::EffectState;
use super::runtime::Runtime;

/// Process-wide identity of one evaluation context.
///
/// Deps are keyed by it, so adding the same context twice is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    /// Allocate a fresh id. Ids are never reused.
    pub fn new() -> Self {
        Self(NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value, as emitted in log events.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of an evaluation context.
pub(crate) trait Subscriber {
    /// Bookkeeping shared by every effect regardless of result type.
    fn state(&self) -> &EffectState;

    /// Re-run the context, discarding its result.
    fn rerun(self: Rc<Self>, rt: &Runtime);
}
