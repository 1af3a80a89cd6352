//! Property access for object and array wrappers.

use tracing::warn;

use super::registry::{is_readonly, is_shallow, to_raw};
use super::{ProxyTarget, Reactive};
use crate::reactive::{DepKey, PauseTracking, Runtime, TrackOp, TriggerOp};
use crate::value::{has_changed, PropKey, Target, Value};

#[derive(Clone, Copy)]
enum Search {
    Includes,
    IndexOf,
    LastIndexOf,
}

impl ProxyTarget {
    fn get(&self, key: &PropKey) -> Value {
        match self {
            ProxyTarget::Raw(target) => target.get(key),
            ProxyTarget::Proxy(proxy) => proxy.get(key),
        }
    }

    fn has(&self, key: &PropKey) -> bool {
        match self {
            ProxyTarget::Raw(target) => target.has(key),
            ProxyTarget::Proxy(proxy) => proxy.has(key),
        }
    }

    fn has_own(&self, key: &PropKey) -> bool {
        match self {
            ProxyTarget::Raw(target) => target.has_own(key),
            ProxyTarget::Proxy(proxy) => proxy.has_own(key),
        }
    }

    fn own_keys(&self) -> Vec<PropKey> {
        match self {
            ProxyTarget::Raw(target) => target.own_keys(),
            ProxyTarget::Proxy(proxy) => proxy.own_keys(),
        }
    }
}

impl Reactive {
    fn is_property_bag(&self) -> bool {
        !self.kind().is_collection()
    }

    /// Track a read on the raw target. Readonly wrappers never track.
    fn track_prop(&self, op: TrackOp, key: DepKey) {
        if self.is_readonly() {
            return;
        }
        if let Some(target) = self.raw_target() {
            Runtime::track(target, op, key);
        }
    }

    fn reject_write(&self, op: &str, key: &dyn std::fmt::Display) {
        warn!(proxy_id = %self.id(), key = %key, "{op} operation failed: target is readonly");
    }

    /// Read a property.
    ///
    /// Object-valued results of deep wrappers come back wrapped in the same
    /// mutability.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        if !self.is_property_bag() {
            return Value::Undefined;
        }
        let result = self.target().get(&key);
        if !key.is_non_trackable() {
            self.track_prop(TrackOp::Get, DepKey::Prop(key));
        }
        self.variant().wrap(result)
    }

    /// Write a property, notifying readers if the value changed.
    ///
    /// Deep mutable wrappers store the raw form of the value, unless it is a
    /// shallow or readonly wrapper. On a readonly wrapper this logs a warning
    /// and reports success without writing.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let mut value = value.into();
        if !self.is_property_bag() {
            return false;
        }
        if self.is_readonly() {
            self.reject_write("set", &key);
            return true;
        }
        let Some(target) = self.raw_target() else {
            return false;
        };

        let mut old_value = target.get(&key);
        if !self.is_shallow() && !is_shallow(&value) && !is_readonly(&value) {
            old_value = to_raw(&old_value);
            value = to_raw(&value);
        }
        // An array index below the length counts as existing, holes included
        let had_key = match key.as_index() {
            Some(i) if target.is_array() => i < target.len(),
            _ => target.has_own(&key),
        };
        if !target.set(key.clone(), value.clone()) {
            return false;
        }
        let key = Some(DepKey::Prop(key));
        if !had_key {
            Runtime::trigger(target, TriggerOp::Add, key, &value, &Value::Undefined);
        } else if has_changed(&value, &old_value) {
            Runtime::trigger(target, TriggerOp::Set, key, &value, &old_value);
        }
        true
    }

    /// Delete a property, notifying readers if it existed.
    pub fn delete(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        if !self.is_property_bag() {
            return false;
        }
        if self.is_readonly() {
            self.reject_write("delete", &key);
            return true;
        }
        let Some(target) = self.raw_target() else {
            return false;
        };

        let had_key = target.has_own(&key);
        let old_value = target.get(&key);
        let result = target.delete(key.clone());
        if result && had_key {
            let key = Some(DepKey::Prop(key));
            Runtime::trigger(target, TriggerOp::Delete, key, &Value::Undefined, &old_value);
        }
        result
    }

    /// The `in` check.
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        if !self.is_property_bag() {
            return false;
        }
        let result = self.target().has(&key);
        if !matches!(&key, PropKey::Symbol(symbol) if symbol.is_builtin()) {
            self.track_prop(TrackOp::Has, DepKey::Prop(key));
        }
        result
    }

    pub fn has_own(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        if !self.is_property_bag() {
            return false;
        }
        let result = self.target().has_own(&key);
        self.track_prop(TrackOp::Has, DepKey::Prop(key));
        result
    }

    /// Enumerate own keys. Subscribes to additions and deletions, or to
    /// `length` for arrays.
    pub fn own_keys(&self) -> Vec<PropKey> {
        if !self.is_property_bag() {
            return Vec::new();
        }
        let key = if self.is_array() {
            DepKey::Prop(PropKey::length())
        } else {
            DepKey::Iterate
        };
        self.track_prop(TrackOp::Iterate, key);
        self.target().own_keys()
    }

    pub fn is_array(&self) -> bool {
        self.to_raw().is_array()
    }

    /// Array length (tracked), collection size, or the number of own keys.
    pub fn len(&self) -> usize {
        if self.kind().is_collection() {
            return self.size();
        }
        if self.is_array() {
            return self
                .get(PropKey::length())
                .as_number()
                .map_or(0, |n| n as usize);
        }
        self.own_keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------------
    // Identity-sensitive array searches
    // ------------------------------------------------------------------------

    /// SameValueZero membership. An element matches when given either its
    /// raw form or its wrapper.
    pub fn includes(&self, value: impl Into<Value>) -> bool {
        self.search(value.into(), Search::Includes).is_some()
    }

    pub fn index_of(&self, value: impl Into<Value>) -> Option<usize> {
        self.search(value.into(), Search::IndexOf)
    }

    pub fn last_index_of(&self, value: impl Into<Value>) -> Option<usize> {
        self.search(value.into(), Search::LastIndexOf)
    }

    fn search(&self, needle: Value, mode: Search) -> Option<usize> {
        if !self.is_array() {
            return None;
        }
        if let ProxyTarget::Proxy(inner) = self.target() {
            return inner.search(needle, mode);
        }
        let raw = self.to_raw();
        if !self.is_readonly() {
            Runtime::track(&raw, TrackOp::Get, DepKey::Prop(PropKey::length()));
            for i in 0..raw.len() {
                Runtime::track(&raw, TrackOp::Get, DepKey::Prop(PropKey::Index(i)));
            }
        }
        let items = raw.to_vec();
        let find = |needle: &Value| match mode {
            Search::Includes => items.iter().position(|item| item == needle),
            Search::IndexOf => items.iter().position(|item| Value::strict_equals(item, needle)),
            Search::LastIndexOf => items
                .iter()
                .rposition(|item| Value::strict_equals(item, needle)),
        };
        find(&needle).or_else(|| {
            let raw_needle = to_raw(&needle);
            if has_changed(&raw_needle, &needle) {
                find(&raw_needle)
            } else {
                None
            }
        })
    }

    // ------------------------------------------------------------------------
    // Length-changing array mutators
    // ------------------------------------------------------------------------
    //
    // These run element-wise through the wrapper so every write notifies as
    // usual, with tracking paused so their internal reads subscribe nothing.

    /// Copy element `from` to `to`, carrying a hole across as a delete.
    fn move_element(&self, from: usize, to: usize) {
        if self.has_own(from) {
            self.set(to, self.get(from));
        } else {
            self.delete(to);
        }
    }

    fn array_mutator(&self, method: &str) -> Option<(PauseTracking, Target)> {
        if !self.is_array() {
            return None;
        }
        if self.is_readonly() {
            self.reject_write(method, &"length");
            return None;
        }
        Some((PauseTracking::new(), self.to_raw()))
    }

    /// Append values, returning the new length.
    pub fn push<I, V>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let Some((_pause, raw)) = self.array_mutator("push") else {
            return self.to_raw().len();
        };
        let mut len = raw.len();
        for value in values {
            self.set(len, value);
            len += 1;
        }
        self.set(PropKey::length(), len);
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        let Some((_pause, raw)) = self.array_mutator("pop") else {
            return Value::Undefined;
        };
        let len = raw.len();
        if len == 0 {
            self.set(PropKey::length(), 0);
            return Value::Undefined;
        }
        let last = self.get(len - 1);
        self.delete(len - 1);
        self.set(PropKey::length(), len - 1);
        last
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        let Some((_pause, raw)) = self.array_mutator("shift") else {
            return Value::Undefined;
        };
        let len = raw.len();
        if len == 0 {
            self.set(PropKey::length(), 0);
            return Value::Undefined;
        }
        let first = self.get(0usize);
        for k in 1..len {
            self.move_element(k, k - 1);
        }
        self.delete(len - 1);
        self.set(PropKey::length(), len - 1);
        first
    }

    /// Prepend values, returning the new length.
    pub fn unshift<I, V>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let Some((_pause, raw)) = self.array_mutator("unshift") else {
            return self.to_raw().len();
        };
        let len = raw.len();
        let count = values.len();
        if count > 0 {
            for k in (0..len).rev() {
                self.move_element(k, k + count);
            }
            for (i, value) in values.into_iter().enumerate() {
                self.set(i, value);
            }
        }
        self.set(PropKey::length(), len + count);
        len + count
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    /// Returns the removed elements. Out-of-range arguments are clamped.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let Some((_pause, raw)) = self.array_mutator("splice") else {
            return Vec::new();
        };
        let len = raw.len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let item_count = items.len();

        let removed: Vec<Value> = (0..delete_count).map(|k| self.get(start + k)).collect();

        if item_count < delete_count {
            for k in start..len - delete_count {
                self.move_element(k + delete_count, k + item_count);
            }
            for k in (len - delete_count + item_count..len).rev() {
                self.delete(k);
            }
        } else if item_count > delete_count {
            for k in (start..len - delete_count).rev() {
                self.move_element(k + delete_count, k + item_count);
            }
        }
        for (i, item) in items.into_iter().enumerate() {
            self.set(start + i, item);
        }
        self.set(PropKey::length(), len - delete_count + item_count);
        removed
    }

    /// Snapshot of the elements, read through the wrapper.
    pub fn to_vec(&self) -> Vec<Value> {
        if !self.is_array() {
            return Vec::new();
        }
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}
