//! Ripple Core
//!
//! This crate provides a fine-grained reactive dependency tracker. It
//! implements:
//!
//! - A dynamic value model with plain objects, arrays, maps and sets
//! - Reactive, shallow and readonly wrappers over those values
//! - Effects that re-run when something they read changes
//! - Refs, cached computed values and watchers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: Raw data ([`Value`], [`Target`]) and property keys
//! - `proxy`: Reactive wrappers and the per-variant wrapper cache
//! - `reactive`: Effects, dependency sets, the track/trigger registry, refs,
//!   computed values and watchers
//! - `error`: Crate error type
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use ripple_core::{computed, effect, reactive, Target, Value};
//!
//! let state = reactive(Target::object_from([("count", 1)])).proxy().unwrap();
//!
//! let s = state.clone();
//! let doubled = computed(move || s.get("count").as_number().unwrap_or(0.0) * 2.0);
//!
//! let seen = Rc::new(Cell::new(0.0));
//! let out = seen.clone();
//! let d = doubled.clone();
//! let _runner = effect(move || out.set(d.get()));
//! assert_eq!(seen.get(), 2.0);
//!
//! state.set("count", 5);
//! // The effect re-ran synchronously.
//! assert_eq!(seen.get(), 10.0);
//! assert_eq!(state.get("count"), Value::from(5));
//! ```
//!
//! Everything is single-threaded. Reactive handles are `!Send`, and each
//! thread has its own registry.

pub mod error;
pub mod proxy;
pub mod reactive;
pub mod value;

pub use error::{Error, Result};
pub use proxy::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, Reactive, Variant,
};
pub use reactive::{
    computed, effect, effect_with, enable_tracking, pause_tracking, reset_tracking, stop,
    trigger_ref, untracked, watch, Computed, EffectOptions, EffectRunner, OnCleanup, Ref,
    ReactiveEffect, WatchHandle, WatchOptions, WatchSource,
};
pub use value::{ObjectId, PropKey, Symbol, Target, TargetKind, Value};
