//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when read
//! after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The getter is wrapped in a lazy effect. Nothing runs at creation.
//!
//! 2. On read, if the cell is dirty the effect runs, the result is cached
//!    and the cell is marked clean.
//!
//! 3. When an input changes, the effect's scheduler marks the cell dirty and
//!    notifies the cell's own subscribers. The getter does not run until the
//!    next read.
//!
//! This gives a two-level graph: outer effects subscribe to the computed's
//! own [`Dep`]; the inner effect subscribes to the inputs.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::dep::Dep;
use super::effect::{ReactiveEffect, Scheduler};
use super::runtime::Runtime;

struct ComputedInner<T> {
    effect: ReactiveEffect<T>,
    value: RefCell<T>,
    dirty: Cell<bool>,
    dep: Dep,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

/// A lazily evaluated, cached derived value.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(1);
/// let c = count.clone();
/// let doubled = Computed::new(move || Value::from(c.get().as_number().unwrap_or(0.0) * 2.0));
///
/// assert_eq!(doubled.get(), Value::from(2));
/// count.set(5);
/// assert_eq!(doubled.get(), Value::from(10));
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + Default + 'static> Computed<T> {
    /// Create a computed value. The getter first runs on the first read.
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let scheduler: Scheduler = Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.dirty.set(true);
                    trace!(effect_id = ?inner.effect.id(), "computed invalidated");
                    Runtime::trigger_dep(&inner.dep);
                }
            });
            ComputedInner {
                effect: ReactiveEffect::with_scheduler(getter, scheduler),
                value: RefCell::new(T::default()),
                dirty: Cell::new(true),
                dep: Dep::new(),
            }
        });
        Self { inner }
    }

    /// Read the value, recomputing first if an input changed.
    ///
    /// Inside an effect, the effect subscribes to this computed.
    pub fn get(&self) -> T {
        let inner = &self.inner;
        if inner.dirty.get() {
            let value = inner.effect.run().unwrap_or_default();
            let old = inner.value.replace(value);
            drop(old);
            inner.dirty.set(false);
        }
        Runtime::track_dep(&inner.dep);
        inner.value.borrow().clone()
    }
}

impl<T> Computed<T> {
    /// Whether the next read will run the getter.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// The effect wrapping the getter.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }

    /// Number of effects subscribed to this computed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.len()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.inner.value.borrow())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Create a computed value.
pub fn computed<T: Clone + Default + 'static>(getter: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(getter)
}
