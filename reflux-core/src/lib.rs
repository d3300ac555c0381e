//! Reflux Core
//!
//! This crate provides the incremental-recomputation core of the Reflux
//! reactive runtime. It implements:
//!
//! - Subscriber sets with generational tracking markers
//! - Single-pass reconciliation of dynamic dependencies
//! - Lazily recomputed, cached derived values
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Deps, effects, computed values and the runtime tying them
//! - `config`: Runtime configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use reflux_core::reactive::{computed, Runtime, Signal};
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = Signal::new(1);
//!
//! // Create a derived value
//! let c = count.clone();
//! let double = computed(&rt, move |rt| c.get(rt) * 2);
//! assert_eq!(double.get(&rt), 2);
//!
//! // Update the signal; the next read recomputes
//! count.set(&rt, 5);
//! assert_eq!(double.get(&rt), 10);
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use error::{ReactiveError, Result};
