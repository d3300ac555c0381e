//! Reactive Primitives
//!
//! This module implements dependency tracking and cached derived values.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A [`Dep`] is the set of effects interested in one source. Reading a source
//! inside a running effect adds the effect to the source's dep; writing the
//! source notifies every member.
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] is one evaluation context. Its dependency list is
//! re-derived on every run, so effects with conditional branches only stay
//! subscribed to what they actually read last time.
//!
//! ## Computed Values
//!
//! A [`Computed`] caches the result of a getter. It is both a consumer (its
//! effect reads sources) and a source (other effects read it), and it only
//! recomputes on read after something it depends on changed.
//!
//! # Implementation Notes
//!
//! All state flows through an explicit [`Runtime`] passed to every read and
//! write. The runtime keeps a stack of running effects; nested runs get their
//! own marker bit in each dep, which keeps reconciliation of an inner run from
//! corrupting the one enclosing it.

mod computed;
mod context;
mod dep;
mod effect;
mod runtime;
mod signal;
mod subscriber;

pub use computed::{computed, computed_debug, computed_with, Computed, ComputedOptions};
pub use dep::{Dep, DepId};
pub use effect::{
    effect, DebugHook, DebuggerEvent, DebuggerEventKind, DebuggerOptions, EffectHandle,
    EffectScheduler, ReactiveEffect,
};
pub use runtime::Runtime;
pub use signal::Signal;
pub use subscriber::SubscriberId;
