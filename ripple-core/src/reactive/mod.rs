//! Reactive Primitives
//!
//! This module implements the effect engine: dependency sets, effects, the
//! track/trigger registry, refs, computed values and watchers. Reactive
//! objects built on top of it live in [`crate::proxy`].
//!
//! # Concepts
//!
//! ## Effects
//!
//! An Effect is a computation that re-runs whenever something it read
//! changes. A thread-local stack records which effect is running, so reads
//! can register it as a dependent automatically.
//!
//! ## Deps
//!
//! A Dep is the subscriber set of one observable location. The registry maps
//! `(target, key)` to a Dep; refs and computed values own one Dep each.
//!
//! ## Refs
//!
//! A Ref is a boxed single value with its own Dep, independent of the proxy
//! layer.
//!
//! ## Computed Values
//!
//! A Computed is a derived value that caches its result and recomputes only
//! when read after an input changed.
//!
//! ## Watchers
//!
//! A watcher calls back with new and old values when a source changes.
//!
//! # Implementation Notes
//!
//! Everything is single-threaded: shared state is `Rc`/`RefCell` and the
//! tracking context is thread-local. Notification is synchronous; a custom
//! scheduler is the hook for deferring or batching re-runs.

mod computed;
mod context;
mod dep;
mod effect;
mod refs;
mod runtime;
mod subscriber;
mod watch;

pub use computed::{computed, Computed};
pub(crate) use context::PauseTracking;
pub use context::{enable_tracking, pause_tracking, reset_tracking, untracked, ReactiveContext};
pub use dep::Dep;
pub use effect::{effect, effect_with, stop, EffectOptions, EffectRunner, ReactiveEffect, Scheduler};
pub use refs::{trigger_ref, Ref};
pub use runtime::{DepKey, Runtime, TrackOp, TriggerOp};
pub use subscriber::SubscriberId;
pub use watch::{traverse, watch, OnCleanup, WatchHandle, WatchOptions, WatchSource};
