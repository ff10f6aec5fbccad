#![forbid(unsafe_code)]

//! Dependency-invalidation engine for Filament.
//!
//! This crate provides the change-tracking primitives the binding layer
//! builds on:
//!
//! - [`Source`]: an independent sentry marking one unit of mutable state.
//! - [`Tracked`]: a value coupled to a sentry, with equal-value set
//!   suppression.
//! - [`DependencyNode`]: a dependent unit that re-runs an action when
//!   anything it read changes.
//! - [`InvalidationSignal`]: the one cross-thread entry point, a latch plus
//!   wake callback for delivering invalidations from background threads.
//!
//! # Architecture
//!
//! The graph is single-threaded: sentries and nodes use `Rc<RefCell<..>>`
//! shared ownership and a thread-local update stack for edge recording.
//! Edges are directional (node depends on precedent) and are rebuilt from
//! scratch on every node re-run, so a node's dependency set always reflects
//! what its action actually read last time. Nodes are themselves readable,
//! so staleness chains upward through layered derivations.
//!
//! # Invariants
//!
//! 1. A node's action re-runs at most once per staleness episode and sees
//!    precedent state as of execution time.
//! 2. Invalidation hooks fire at most once per staleness episode.
//! 3. Setting a [`Tracked`] to an equal value notifies nobody.
//! 4. Disposed nodes never fire and never re-run. Disposal is idempotent.
//! 5. Only [`InvalidationSignal::signal`] may be called off-thread.

pub mod node;
pub mod signal;
pub mod source;

pub use node::DependencyNode;
pub use signal::InvalidationSignal;
pub use source::{Source, Tracked};
