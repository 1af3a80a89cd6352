//! Reactive object registry.
//!
//! Factories for the four wrapper variants plus the identity cache that
//! keeps them unique: one wrapper per `(variant, target)` for as long as the
//! wrapper is alive. The cache holds wrappers weakly; a wrapper removes its
//! own entry when dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::{ProxyInner, ProxyTarget, Reactive, Variant};
use crate::value::{ObjectId, Value};

thread_local! {
    static PROXY_MAP: RefCell<HashMap<(Variant, ObjectId), Weak<ProxyInner>>> =
        RefCell::new(HashMap::new());
}

/// Deep mutable wrapper. A readonly wrapper is returned unchanged.
pub fn reactive(value: impl Into<Value>) -> Value {
    let value = value.into();
    if is_readonly(&value) {
        return value;
    }
    create_reactive_object(value, Variant::Mutable)
}

/// Mutable wrapper that observes only the top level.
pub fn shallow_reactive(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), Variant::ShallowMutable)
}

/// Deep readonly wrapper.
pub fn readonly(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), Variant::Readonly)
}

/// Readonly wrapper that leaves nested values untouched.
pub fn shallow_readonly(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), Variant::ShallowReadonly)
}

fn create_reactive_object(value: Value, variant: Variant) -> Value {
    let (target, key) = match &value {
        Value::Object(target) => (ProxyTarget::Raw(target.clone()), (variant, target.id())),
        Value::Proxy(proxy) => {
            // Wrapping a wrapper returns it, except that a mutable wrapper can
            // be made readonly.
            if !(variant.is_readonly() && !proxy.is_readonly()) {
                return value;
            }
            (ProxyTarget::Proxy(proxy.clone()), (variant, proxy.id()))
        }
        _ => {
            debug!(value = ?value, "value cannot be made reactive");
            return value;
        }
    };

    if let Some(existing) = lookup(&key) {
        return Value::Proxy(existing);
    }
    if let ProxyTarget::Raw(raw) = &target {
        if raw.is_skipped() || !raw.is_extensible() {
            return value;
        }
    }

    let proxy = Reactive::new(variant, target);
    PROXY_MAP.with(|map| {
        map.borrow_mut().insert(key, Rc::downgrade(&proxy.0));
    });
    debug!(proxy_id = %proxy.id(), target_id = %key.1, ?variant, "created wrapper");
    Value::Proxy(proxy)
}

fn lookup(key: &(Variant, ObjectId)) -> Option<Reactive> {
    PROXY_MAP.with(|map| map.borrow().get(key)?.upgrade().map(Reactive))
}

pub(super) fn evict(variant: Variant, target_id: ObjectId) {
    let key = (variant, target_id);
    let _ = PROXY_MAP.try_with(|map| {
        if let Ok(mut map) = map.try_borrow_mut() {
            if map.get(&key).is_some_and(|weak| weak.strong_count() == 0) {
                map.remove(&key);
            }
        }
    });
}

/// Whether `value` is a wrapper whose writes are observed.
pub fn is_reactive(value: &Value) -> bool {
    value.as_proxy().is_some_and(Reactive::is_reactive)
}

pub fn is_readonly(value: &Value) -> bool {
    value.as_proxy().is_some_and(Reactive::is_readonly)
}

pub fn is_shallow(value: &Value) -> bool {
    value.as_proxy().is_some_and(Reactive::is_shallow)
}

/// Whether `value` is any kind of wrapper.
pub fn is_proxy(value: &Value) -> bool {
    matches!(value, Value::Proxy(_))
}

/// Strip every wrapper layer. Non-wrappers are returned as is.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(proxy) => Value::Object(proxy.to_raw()),
        other => other.clone(),
    }
}

/// Deep mutable wrapper for objects, identity for everything else.
pub fn to_reactive(value: Value) -> Value {
    if value.is_object() {
        reactive(value)
    } else {
        value
    }
}

/// Deep readonly wrapper for objects, identity for everything else.
pub fn to_readonly(value: Value) -> Value {
    if value.is_object() {
        readonly(value)
    } else {
        value
    }
}

/// Opt an object out of wrapping. Existing wrappers are unaffected.
pub fn mark_raw(value: Value) -> Value {
    match &value {
        Value::Object(target) => target.mark_raw(),
        Value::Proxy(proxy) => proxy.to_raw().mark_raw(),
        _ => {}
    }
    value
}

/// Number of live wrappers in the identity cache.
pub fn cached_count() -> usize {
    PROXY_MAP.with(|map| map.borrow().values().filter(|weak| weak.strong_count() > 0).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Target;

    #[test]
    fn wrapping_is_identity_stable() {
        let target = Target::object();
        let a = reactive(&target);
        let b = reactive(&target);
        assert_eq!(a, b);
        assert_ne!(a, Value::from(&target));
        assert_eq!(reactive(a.clone()), a);
    }

    #[test]
    fn variants_get_distinct_wrappers() {
        let target = Target::object();
        let wrappers = [
            reactive(&target),
            readonly(&target),
            shallow_reactive(&target),
            shallow_readonly(&target),
        ];
        for (i, a) in wrappers.iter().enumerate() {
            for b in &wrappers[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(is_shallow(&wrappers[2]) && !is_readonly(&wrappers[2]));
        assert!(is_shallow(&wrappers[3]) && is_readonly(&wrappers[3]));
    }

    #[test]
    fn readonly_is_sticky() {
        let target = Target::object();
        let ro = readonly(&target);
        assert_eq!(reactive(ro.clone()), ro);
        assert!(!is_reactive(&ro));
    }

    #[test]
    fn readonly_over_reactive_stays_reactive() {
        let target = Target::object();
        let observed = reactive(&target);
        let ro = readonly(observed.clone());
        assert!(is_readonly(&ro));
        assert!(is_reactive(&ro));
        assert_eq!(ro.as_proxy().unwrap().raw(), observed);
        assert_eq!(to_raw(&ro), Value::from(&target));
        assert_eq!(readonly(observed), ro);
    }

    #[test]
    fn primitives_pass_through() {
        assert_eq!(reactive(1), Value::from(1));
        assert_eq!(readonly("a"), Value::from("a"));
        assert!(!is_proxy(&Value::Null));
        assert_eq!(to_reactive(Value::from(true)), Value::from(true));
    }

    #[test]
    fn skipped_and_non_extensible_targets_pass_through() {
        let marked = mark_raw(Value::from(Target::object()));
        assert!(!is_proxy(&reactive(marked.clone())));

        let frozen = Target::object();
        frozen.freeze();
        assert!(!is_proxy(&readonly(&frozen)));
    }

    #[test]
    fn dropped_wrappers_leave_the_cache() {
        let target = Target::object();
        let before = cached_count();
        let proxy = reactive(&target);
        assert_eq!(cached_count(), before + 1);
        drop(proxy);
        assert_eq!(cached_count(), before);
        assert!(!PROXY_MAP.with(|map| map.borrow().contains_key(&(Variant::Mutable, target.id()))));
    }
}
