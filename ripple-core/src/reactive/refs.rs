//! Ref Implementation
//!
//! A Ref is a boxed single-value reactive cell. It does not go through the
//! proxy layer: it owns exactly one [`Dep`], created the first time an effect
//! reads it.
//!
//! # How Refs Work
//!
//! 1. Reading the value inside an effect subscribes that effect to the ref.
//!
//! 2. Writing a value that differs from the stored one (by `Object.is`, on
//!    the raw form) notifies every subscriber.
//!
//! 3. A deep ref stores objects as their reactive wrapper, so nested reads
//!    through the value are tracked too. A shallow ref stores values as given.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::dep::Dep;
use super::runtime::Runtime;
use crate::proxy::{is_readonly, is_shallow, to_raw, to_reactive};
use crate::value::{has_changed, Value};

struct RefInner {
    raw: RefCell<Value>,
    value: RefCell<Value>,
    dep: RefCell<Option<Dep>>,
    shallow: bool,
}

/// A reactive cell holding one [`Value`].
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
#[derive(Clone)]
pub struct Ref(Rc<RefInner>);

impl Ref {
    /// Create a deep ref. Objects are stored behind a reactive wrapper.
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::build(to_raw(&value), to_reactive(value), false)
    }

    /// Create a ref that stores its value untouched.
    pub fn shallow(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::build(value.clone(), value, true)
    }

    fn build(raw: Value, value: Value, shallow: bool) -> Self {
        Self(Rc::new(RefInner {
            raw: RefCell::new(raw),
            value: RefCell::new(value),
            dep: RefCell::new(None),
            shallow,
        }))
    }

    pub fn is_shallow(&self) -> bool {
        self.0.shallow
    }

    /// Get the current value.
    ///
    /// If called within a running effect, this also subscribes the effect.
    pub fn get(&self) -> Value {
        self.track();
        self.get_untracked()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> Value {
        self.0.value.borrow().clone()
    }

    /// Store a new value, notifying subscribers if it changed.
    ///
    /// Unless this ref is shallow, or the incoming value is itself a shallow
    /// or readonly wrapper, the value is compared and stored in raw form.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        let use_direct = self.0.shallow || is_shallow(&value) || is_readonly(&value);
        let raw = if use_direct { value.clone() } else { to_raw(&value) };
        if !has_changed(&raw, &self.0.raw.borrow()) {
            return;
        }
        let stored = if use_direct { value } else { to_reactive(raw.clone()) };
        trace!(old = ?self.0.raw.borrow(), new = ?raw, "ref changed");
        *self.0.raw.borrow_mut() = raw;
        // The old value may own the last handle to a target; drop it after
        // the borrow is released.
        let old = self.0.value.replace(stored);
        drop(old);
        self.trigger();
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    /// Number of effects subscribed to this ref.
    pub fn subscriber_count(&self) -> usize {
        self.0.dep.borrow().as_ref().map_or(0, Dep::len)
    }

    fn track(&self) {
        if !Runtime::is_tracking() {
            return;
        }
        let dep = self.0.dep.borrow_mut().get_or_insert_with(Dep::new).clone();
        Runtime::track_dep(&dep);
    }

    fn trigger(&self) {
        let dep = self.0.dep.borrow().clone();
        if let Some(dep) = dep {
            Runtime::trigger_dep(&dep);
        }
    }
}

/// Force-notify a ref's subscribers, typically after mutating a shallow
/// ref's inner object in place.
pub fn trigger_ref(r: &Ref) {
    r.trigger();
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &self.0.value.borrow())
            .field("shallow", &self.0.shallow)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{is_reactive, readonly, reactive};
    use crate::reactive::effect;
    use crate::value::Target;
    use std::cell::Cell;

    #[test]
    fn ref_get_set() {
        let count = Ref::new(0);
        assert_eq!(count.get(), Value::from(0));

        count.set(5);
        assert_eq!(count.get(), Value::from(5));
    }

    #[test]
    fn ref_update() {
        let count = Ref::new(10);
        count.update(|v| Value::from(v.as_number().unwrap_or(0.0) + 5.0));
        assert_eq!(count.get(), Value::from(15));
    }

    #[test]
    fn dep_is_created_on_first_subscription() {
        let count = Ref::new(1);
        count.get();
        assert!(count.0.dep.borrow().is_none());

        let c = count.clone();
        let _runner = effect(move || c.get());
        assert_eq!(count.subscriber_count(), 1);
    }

    #[test]
    fn same_value_does_not_trigger() {
        let count = Ref::new(f64::NAN);
        let runs = Rc::new(Cell::new(0));
        let (c, r) = (count.clone(), runs.clone());
        let _runner = effect(move || {
            c.get();
            r.set(r.get() + 1);
        });

        count.set(f64::NAN);
        assert_eq!(runs.get(), 1);
        count.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn deep_ref_wraps_objects() {
        let target = Target::object_from([("count", 1)]);
        let r = Ref::new(&target);
        assert!(is_reactive(&r.get()));

        let dummy = Rc::new(Cell::new(0.0));
        let (rr, d) = (r.clone(), dummy.clone());
        let _runner = effect(move || {
            let proxy = rr.get().proxy().unwrap();
            d.set(proxy.get("count").as_number().unwrap_or(0.0));
        });
        r.get().proxy().unwrap().set("count", 2);
        assert_eq!(dummy.get(), 2.0);
    }

    #[test]
    fn setting_wrapper_of_stored_raw_is_no_change() {
        let target = Target::object();
        let r = Ref::new(&target);
        let runs = Rc::new(Cell::new(0));
        let (rr, c) = (r.clone(), runs.clone());
        let _runner = effect(move || {
            rr.get();
            c.set(c.get() + 1);
        });

        r.set(reactive(&target));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn readonly_values_are_stored_directly() {
        let target = Target::object();
        let r = Ref::new(Value::Null);
        let ro = readonly(&target);
        r.set(ro.clone());
        assert_eq!(r.get(), ro);
    }

    #[test]
    fn shallow_ref_stores_untouched_and_can_be_forced() {
        let target = Target::object_from([("a", 1)]);
        let r = Ref::shallow(&target);
        assert_eq!(r.get(), Value::from(&target));
        assert!(r.is_shallow());

        let runs = Rc::new(Cell::new(0));
        let (rr, c) = (r.clone(), runs.clone());
        let _runner = effect(move || {
            rr.get();
            c.set(c.get() + 1);
        });
        target.set("a", 2);
        assert_eq!(runs.get(), 1);

        trigger_ref(&r);
        assert_eq!(runs.get(), 2);
    }
}
