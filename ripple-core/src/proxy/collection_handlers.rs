//! Map, Set, WeakMap and WeakSet wrappers.
//!
//! Keys are looked up first as given and then in raw form, so a map keyed by
//! a raw object answers to its wrapper as well. Stored keys and values are
//! always raw; reads hand them back wrapped according to the variant.

use tracing::warn;

use super::registry::to_raw;
use super::{ProxyTarget, Reactive};
use crate::reactive::{DepKey, Runtime, TrackOp, TriggerOp};
use crate::value::{has_changed, Value};

impl Reactive {
    fn is_collection(&self) -> bool {
        self.kind().is_collection()
    }

    fn track_collection(&self, op: TrackOp, key: DepKey) {
        if !self.is_readonly() {
            Runtime::track(&self.to_raw(), op, key);
        }
    }

    fn reject_collection_write(&self, op: &str) {
        warn!(
            proxy_id = %self.id(),
            kind = ?self.kind(),
            "{op} operation failed: target is readonly"
        );
    }

    fn inner_entry(&self, key: &Value) -> Value {
        match self.target() {
            ProxyTarget::Raw(target) => target.entry(key).unwrap_or_default(),
            ProxyTarget::Proxy(proxy) => proxy.get_entry(key.clone()),
        }
    }

    fn inner_has_entry(&self, key: &Value) -> bool {
        match self.target() {
            ProxyTarget::Raw(target) => target.has_entry(key),
            ProxyTarget::Proxy(proxy) => proxy.has_entry(key.clone()),
        }
    }

    /// Entries as seen through the immediate target, wrapped per variant.
    fn wrapped_entries(&self, key_only: bool) -> Vec<(Value, Value)> {
        let entries = match self.target() {
            ProxyTarget::Raw(target) => {
                let key = if key_only && self.kind().is_map() {
                    DepKey::MapKeyIterate
                } else {
                    DepKey::Iterate
                };
                self.track_collection(TrackOp::Iterate, key);
                target.entries()
            }
            ProxyTarget::Proxy(proxy) => proxy.wrapped_entries(key_only),
        };
        let variant = self.variant();
        entries
            .into_iter()
            .map(|(k, v)| (variant.wrap(k), variant.wrap(v)))
            .collect()
    }

    /// Map lookup. Missing keys read as `Undefined`.
    pub fn get_entry(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        if !self.is_collection() {
            return Value::Undefined;
        }
        let raw_target = self.to_raw();
        let raw_key = to_raw(&key);
        if !self.is_readonly() {
            if has_changed(&key, &raw_key) {
                Runtime::track(&raw_target, TrackOp::Get, DepKey::Entry(key.clone()));
            }
            Runtime::track(&raw_target, TrackOp::Get, DepKey::Entry(raw_key.clone()));
        }

        let value = if raw_target.has_entry(&key) {
            self.inner_entry(&key)
        } else if raw_target.has_entry(&raw_key) {
            self.inner_entry(&raw_key)
        } else {
            if let ProxyTarget::Proxy(inner) = self.target() {
                // Let the inner wrapper subscribe to the missing key.
                inner.get_entry(key);
            }
            return Value::Undefined;
        };
        self.variant().wrap(value)
    }

    /// Membership check for maps and sets.
    pub fn has_entry(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        if !self.is_collection() {
            return false;
        }
        let raw_key = to_raw(&key);
        let changed = has_changed(&key, &raw_key);
        if changed {
            self.track_collection(TrackOp::Has, DepKey::Entry(key.clone()));
        }
        self.track_collection(TrackOp::Has, DepKey::Entry(raw_key.clone()));

        if changed {
            self.inner_has_entry(&key) || self.inner_has_entry(&raw_key)
        } else {
            self.inner_has_entry(&key)
        }
    }

    /// Number of entries. Subscribes to additions, deletions and clears.
    pub fn size(&self) -> usize {
        if !self.is_collection() {
            return 0;
        }
        match self.target() {
            ProxyTarget::Raw(target) => {
                self.track_collection(TrackOp::Iterate, DepKey::Iterate);
                target.size()
            }
            ProxyTarget::Proxy(proxy) => proxy.size(),
        }
    }

    /// Add a set member.
    pub fn add(&self, value: impl Into<Value>) -> &Self {
        if !self.is_collection() {
            return self;
        }
        if self.is_readonly() {
            self.reject_collection_write("add");
            return self;
        }
        let value = to_raw(&value.into());
        let target = self.to_raw();
        if !target.has_entry(&value) && target.add(value.clone()) {
            let key = Some(DepKey::Entry(value.clone()));
            Runtime::trigger(&target, TriggerOp::Add, key, &value, &Value::Undefined);
        }
        self
    }

    /// Insert or replace a map entry.
    pub fn set_entry(&self, key: impl Into<Value>, value: impl Into<Value>) -> &Self {
        if !self.is_collection() {
            return self;
        }
        if self.is_readonly() {
            self.reject_collection_write("set");
            return self;
        }
        let mut key = key.into();
        let value = to_raw(&value.into());
        let target = self.to_raw();

        let mut had_key = target.has_entry(&key);
        if !had_key {
            key = to_raw(&key);
            had_key = target.has_entry(&key);
        }
        let old_value = target.entry(&key).unwrap_or_default();
        if !target.set_entry(key.clone(), value.clone()) {
            return self;
        }
        if !had_key {
            let key = Some(DepKey::Entry(key));
            Runtime::trigger(&target, TriggerOp::Add, key, &value, &Value::Undefined);
        } else if has_changed(&value, &old_value) {
            Runtime::trigger(&target, TriggerOp::Set, Some(DepKey::Entry(key)), &value, &old_value);
        }
        self
    }

    /// Remove an entry, returning whether one was removed.
    pub fn delete_entry(&self, key: impl Into<Value>) -> bool {
        if !self.is_collection() {
            return false;
        }
        if self.is_readonly() {
            self.reject_collection_write("delete");
            return false;
        }
        let mut key = key.into();
        let target = self.to_raw();

        let mut had_key = target.has_entry(&key);
        if !had_key {
            key = to_raw(&key);
            had_key = target.has_entry(&key);
        }
        let old_value = target.entry(&key).unwrap_or_default();
        let result = target.delete_entry(&key);
        if had_key {
            let key = Some(DepKey::Entry(key));
            Runtime::trigger(&target, TriggerOp::Delete, key, &Value::Undefined, &old_value);
        }
        result
    }

    /// Remove every entry, notifying everything observed on the collection.
    pub fn clear(&self) {
        if !self.is_collection() {
            return;
        }
        if self.is_readonly() {
            self.reject_collection_write("clear");
            return;
        }
        let target = self.to_raw();
        let had_items = target.size() != 0;
        target.clear();
        if had_items {
            Runtime::trigger(&target, TriggerOp::Clear, None, &Value::Undefined, &Value::Undefined);
        }
    }

    /// Call `f(key, value)` for every entry. Set members are passed as both.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        if !self.is_collection() {
            return;
        }
        for (key, value) in self.wrapped_entries(false) {
            f(&key, &value);
        }
    }

    /// Map keys or set members. On a map, subscribes to key changes only.
    pub fn keys(&self) -> Vec<Value> {
        if !self.is_collection() {
            return Vec::new();
        }
        self.wrapped_entries(true).into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        if !self.is_collection() {
            return Vec::new();
        }
        self.wrapped_entries(false).into_iter().map(|(_, v)| v).collect()
    }

    /// `(key, value)` pairs. Set members appear as `(member, member)`.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        if !self.is_collection() {
            return Vec::new();
        }
        self.wrapped_entries(false)
    }
}

#[cfg(test)]
mod tests {
    use super::super::registry::{is_reactive, reactive, readonly, shallow_reactive};
    use crate::reactive::effect;
    use crate::value::Target;
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    fn observe(target: &Target) -> Reactive {
        reactive(target).proxy().unwrap()
    }

    fn count_runs(f: impl Fn() + 'static) -> Rc<Cell<usize>> {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let _runner = effect(move || {
            f();
            counter.set(counter.get() + 1);
        });
        runs
    }

    #[test]
    fn map_get_tracks_the_key() {
        let map = observe(&Target::map());
        let m = map.clone();
        let seen = Rc::new(Cell::new(0.0));
        let s = seen.clone();
        let _runner = effect(move || s.set(m.get_entry("a").as_number().unwrap_or(-1.0)));
        assert_eq!(seen.get(), -1.0);

        map.set_entry("a", 1);
        assert_eq!(seen.get(), 1.0);
        map.delete_entry("a");
        assert_eq!(seen.get(), -1.0);
    }

    #[test]
    fn map_set_notifies_iteration_but_not_keys() {
        let map = observe(&Target::map_from([("a", 1)]));
        let (m1, m2) = (map.clone(), map.clone());
        let value_runs = count_runs(move || {
            m1.values();
        });
        let key_runs = count_runs(move || {
            m2.keys();
        });

        map.set_entry("a", 2);
        assert_eq!(value_runs.get(), 2);
        assert_eq!(key_runs.get(), 1);

        map.set_entry("b", 3);
        assert_eq!(value_runs.get(), 3);
        assert_eq!(key_runs.get(), 2);
    }

    #[test]
    fn same_value_set_is_silent() {
        let map = observe(&Target::map_from([("a", 1)]));
        let m = map.clone();
        let runs = count_runs(move || {
            m.get_entry("a");
        });
        map.set_entry("a", 1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn size_tracks_adds_deletes_and_clear() {
        let set = observe(&Target::new_set());
        let s = set.clone();
        let size = Rc::new(Cell::new(0));
        let sz = size.clone();
        let _runner = effect(move || sz.set(s.size()));

        set.add(1).add(2);
        assert_eq!(size.get(), 2);
        set.add(2);
        assert_eq!(size.get(), 2);
        assert!(set.delete_entry(1));
        assert_eq!(size.get(), 1);
        set.clear();
        assert_eq!(size.get(), 0);
    }

    #[test]
    fn clear_on_empty_collection_is_silent() {
        let map = observe(&Target::map());
        let m = map.clone();
        let runs = count_runs(move || {
            m.size();
        });
        map.clear();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn wrapped_keys_find_raw_entries() {
        let key = Target::object();
        let map = observe(&Target::map());
        map.set_entry(reactive(&key), 1);

        assert!(map.has_entry(&key));
        assert!(map.has_entry(reactive(&key)));
        assert_eq!(map.get_entry(reactive(&key)), Value::from(1));
        assert_eq!(map.to_raw().entries()[0].0, Value::from(&key));
    }

    #[test]
    fn values_come_back_wrapped() {
        let child = Target::object();
        let map = observe(&Target::map_from([("child", &child)]));
        assert!(is_reactive(&map.get_entry("child")));

        let mut seen = Vec::new();
        map.for_each(|k, v| seen.push((k.clone(), is_reactive(v))));
        assert_eq!(seen, vec![(Value::from("child"), true)]);

        let shallow = shallow_reactive(Target::map_from([("child", &child)])).proxy().unwrap();
        assert_eq!(shallow.get_entry("child"), Value::from(&child));
    }

    #[test]
    fn readonly_collection_rejects_writes() {
        let original = Target::set_from([1]);
        let locked = readonly(&original).proxy().unwrap();
        locked.add(2);
        locked.clear();
        assert!(!locked.delete_entry(1));
        assert_eq!(original.size(), 1);
        assert!(locked.has_entry(1));
    }

    #[test]
    fn readonly_over_reactive_map_tracks_through_inner() {
        let original = Target::map();
        let observed = observe(&original);
        let locked = readonly(Value::from(&observed)).proxy().unwrap();
        let l = locked.clone();
        let runs = count_runs(move || {
            l.get_entry("a");
        });

        observed.set_entry("a", 1);
        assert_eq!(runs.get(), 2);
        assert_eq!(locked.get_entry("a"), Value::from(1));
    }

    #[test]
    fn property_methods_are_inert_on_collections() {
        let map = observe(&Target::map_from([("a", 1)]));
        assert_eq!(map.get("a"), Value::Undefined);
        assert!(!map.set("a", 2));
        assert_eq!(map.get_entry("a"), Value::from(1));

        let object = observe(&Target::object());
        assert_eq!(object.size(), 0);
        assert!(object.keys().is_empty());
    }

    #[test]
    fn weak_map_rejects_primitive_keys() {
        let weak = observe(&Target::weak_map());
        weak.set_entry("a", 1);
        assert!(!weak.has_entry("a"));

        let key = Target::object();
        weak.set_entry(&key, 1);
        assert_eq!(weak.get_entry(&key), Value::from(1));
        assert_eq!(weak.size(), 0);
    }
}
