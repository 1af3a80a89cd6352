//! Raw Targets
//!
//! A [`Target`] is a plain heap object: a property bag, an array, or one of
//! the keyed collections. Everything here is untracked; reactive behavior is
//! layered on top by the proxy handlers.
//!
//! # Lifecycle
//!
//! Targets are reference counted. When the last handle goes away the
//! target's entries in the dependency registry are evicted, which stands in
//! for weak keying. A target captured by an effect that also observes it keeps
//! itself alive until that effect is stopped.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use super::{ObjectId, PropKey, Value};
use crate::reactive::Runtime;

/// Largest index an array element can live at. Higher indices are rejected.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// Largest value `length` can be set to.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Runtime shape of a raw target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Object,
    Array,
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl TargetKind {
    pub fn is_collection(self) -> bool {
        !matches!(self, TargetKind::Object | TargetKind::Array)
    }

    pub fn is_map(self) -> bool {
        matches!(self, TargetKind::Map | TargetKind::WeakMap)
    }

    /// Weak collections only accept object keys and cannot be enumerated.
    pub fn is_weak(self) -> bool {
        matches!(self, TargetKind::WeakMap | TargetKind::WeakSet)
    }
}

enum TargetData {
    Object(IndexMap<PropKey, Value>),
    /// Sparse elements. An index below `len` with no entry is a hole.
    Array { items: BTreeMap<usize, Value>, len: usize },
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

struct TargetInner {
    id: ObjectId,
    kind: TargetKind,
    data: RefCell<TargetData>,
    skip: Cell<bool>,
    extensible: Cell<bool>,
    frozen: Cell<bool>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        Runtime::forget_target(self.id);
    }
}

/// Shared handle to a raw object.
#[derive(Clone)]
pub struct Target(Rc<TargetInner>);

impl Target {
    fn with_data(kind: TargetKind, data: TargetData) -> Self {
        Self(Rc::new(TargetInner {
            id: ObjectId::next(),
            kind,
            data: RefCell::new(data),
            skip: Cell::new(false),
            extensible: Cell::new(true),
            frozen: Cell::new(false),
        }))
    }

    /// An empty property bag.
    pub fn object() -> Self {
        Self::with_data(TargetKind::Object, TargetData::Object(IndexMap::new()))
    }

    pub fn object_from<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<PropKey>,
        V: Into<Value>,
    {
        let fields = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::with_data(TargetKind::Object, TargetData::Object(fields))
    }

    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items: BTreeMap<usize, Value> = items
            .into_iter()
            .map(Into::into)
            .enumerate()
            .collect();
        let len = items.len();
        Self::with_data(TargetKind::Array, TargetData::Array { items, len })
    }

    pub fn map() -> Self {
        Self::with_data(TargetKind::Map, TargetData::Map(IndexMap::new()))
    }

    pub fn map_from<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::with_data(TargetKind::Map, TargetData::Map(entries))
    }

    pub fn new_set() -> Self {
        Self::with_data(TargetKind::Set, TargetData::Set(IndexSet::new()))
    }

    pub fn set_from<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items = items.into_iter().map(Into::into).collect();
        Self::with_data(TargetKind::Set, TargetData::Set(items))
    }

    pub fn weak_map() -> Self {
        Self::with_data(TargetKind::WeakMap, TargetData::Map(IndexMap::new()))
    }

    pub fn weak_set() -> Self {
        Self::with_data(TargetKind::WeakSet, TargetData::Set(IndexSet::new()))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> TargetKind {
        self.0.kind
    }

    pub fn is_array(&self) -> bool {
        self.0.kind == TargetKind::Array
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Opt this object out of reactive wrapping.
    pub fn mark_raw(&self) {
        self.0.skip.set(true);
    }

    pub fn is_skipped(&self) -> bool {
        self.0.skip.get()
    }

    /// Forbid adding new properties. Non-extensible objects are never wrapped.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    /// Forbid all writes.
    pub fn freeze(&self) {
        self.0.extensible.set(false);
        self.0.frozen.set(true);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    // ------------------------------------------------------------------------
    // Property access (objects and arrays)
    // ------------------------------------------------------------------------

    /// Read a property. Missing properties and array holes read as
    /// `Undefined`.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        match &*self.0.data.borrow() {
            TargetData::Object(fields) => fields.get(&key).cloned().unwrap_or_default(),
            TargetData::Array { items, len } => match key {
                PropKey::Index(i) => items.get(&i).cloned().unwrap_or_default(),
                ref k if k.is_length() => Value::from(*len),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    /// Write a property, returning whether the write was accepted.
    ///
    /// Writing an array index past the end grows the array, leaving holes
    /// in between. Writing `length` truncates or grows it. Indices above
    /// [`MAX_ARRAY_INDEX`] are rejected.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let value = value.into();
        if self.is_frozen() {
            return false;
        }
        let extensible = self.is_extensible();
        match &mut *self.0.data.borrow_mut() {
            TargetData::Object(fields) => {
                if !extensible && !fields.contains_key(&key) {
                    return false;
                }
                fields.insert(key, value);
                true
            }
            TargetData::Array { items, len } => match key {
                PropKey::Index(i) => {
                    if i > MAX_ARRAY_INDEX {
                        warn!(target_id = %self.0.id, index = i, "array index out of range");
                        return false;
                    }
                    if !extensible && !items.contains_key(&i) {
                        return false;
                    }
                    items.insert(i, value);
                    *len = (*len).max(i + 1);
                    true
                }
                ref k if k.is_length() => match value.as_number() {
                    Some(n)
                        if n >= 0.0 && n.fract() == 0.0 && n <= MAX_ARRAY_LENGTH as f64 =>
                    {
                        let new_len = n as usize;
                        if new_len > *len && !extensible {
                            return false;
                        }
                        let _ = items.split_off(&new_len);
                        *len = new_len;
                        true
                    }
                    _ => false,
                },
                _ => false,
            },
            _ => false,
        }
    }

    /// Delete a property. Deleting an array element leaves a hole and keeps
    /// the length.
    pub fn delete(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        if self.is_frozen() {
            return false;
        }
        match &mut *self.0.data.borrow_mut() {
            TargetData::Object(fields) => {
                fields.shift_remove(&key);
                true
            }
            TargetData::Array { items, .. } => match key {
                PropKey::Index(i) => {
                    items.remove(&i);
                    true
                }
                ref k if k.is_length() => false,
                _ => true,
            },
            _ => false,
        }
    }

    /// Whether the property exists. There is no prototype chain, so this is
    /// the same as [`Target::has_own`].
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        self.has_own(key)
    }

    pub fn has_own(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        match &*self.0.data.borrow() {
            TargetData::Object(fields) => fields.contains_key(&key),
            TargetData::Array { items, .. } => match key {
                PropKey::Index(i) => items.contains_key(&i),
                ref k => k.is_length(),
            },
            _ => false,
        }
    }

    /// All own property keys, in insertion order. Arrays list their present
    /// indices in ascending order followed by `length`.
    pub fn own_keys(&self) -> Vec<PropKey> {
        match &*self.0.data.borrow() {
            TargetData::Object(fields) => fields.keys().cloned().collect(),
            TargetData::Array { items, .. } => items
                .keys()
                .copied()
                .map(PropKey::Index)
                .chain(std::iter::once(PropKey::length()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Array length, or zero for anything else.
    pub fn len(&self) -> usize {
        match &*self.0.data.borrow() {
            TargetData::Array { len, .. } => *len,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of array elements. Holes come back as `Undefined`.
    pub fn to_vec(&self) -> Vec<Value> {
        match &*self.0.data.borrow() {
            TargetData::Array { items, len } => (0..*len)
                .map(|i| items.get(&i).cloned().unwrap_or_default())
                .collect(),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Collection access (Map, Set, WeakMap, WeakSet)
    // ------------------------------------------------------------------------

    /// Map value for `key`. Sets report the member itself.
    pub fn entry(&self, key: &Value) -> Option<Value> {
        match &*self.0.data.borrow() {
            TargetData::Map(entries) => entries.get(key).cloned(),
            TargetData::Set(items) => items.get(key).cloned(),
            _ => None,
        }
    }

    pub fn has_entry(&self, key: &Value) -> bool {
        match &*self.0.data.borrow() {
            TargetData::Map(entries) => entries.contains_key(key),
            TargetData::Set(items) => items.contains(key),
            _ => false,
        }
    }

    /// Insert or replace a map entry. Returns whether the entry was stored.
    pub fn set_entry(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if !self.accepts_key(&key) {
            return false;
        }
        match &mut *self.0.data.borrow_mut() {
            TargetData::Map(entries) => {
                entries.insert(key, value.into());
                true
            }
            _ => false,
        }
    }

    /// Add a set member. Returns whether the member was stored.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if !self.accepts_key(&value) {
            return false;
        }
        match &mut *self.0.data.borrow_mut() {
            TargetData::Set(items) => {
                items.insert(value);
                true
            }
            _ => false,
        }
    }

    /// Remove an entry, returning whether anything was removed.
    pub fn delete_entry(&self, key: &Value) -> bool {
        if self.is_frozen() {
            return false;
        }
        match &mut *self.0.data.borrow_mut() {
            TargetData::Map(entries) => entries.shift_remove(key).is_some(),
            TargetData::Set(items) => items.shift_remove(key),
            _ => false,
        }
    }

    /// Remove every entry. Weak collections cannot be cleared.
    pub fn clear(&self) {
        if self.is_frozen() || self.kind().is_weak() {
            return;
        }
        match &mut *self.0.data.borrow_mut() {
            TargetData::Map(entries) => entries.clear(),
            TargetData::Set(items) => items.clear(),
            _ => {}
        }
    }

    /// Number of entries. Weak collections report zero.
    pub fn size(&self) -> usize {
        if self.kind().is_weak() {
            return 0;
        }
        match &*self.0.data.borrow() {
            TargetData::Map(entries) => entries.len(),
            TargetData::Set(items) => items.len(),
            _ => 0,
        }
    }

    /// Snapshot of `(key, value)` pairs. Set members appear as `(v, v)`.
    /// Weak collections cannot be enumerated and yield nothing.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        if self.kind().is_weak() {
            return Vec::new();
        }
        match &*self.0.data.borrow() {
            TargetData::Map(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            TargetData::Set(items) => items.iter().map(|v| (v.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }

    fn accepts_key(&self, key: &Value) -> bool {
        if self.is_frozen() {
            return false;
        }
        if self.kind().is_weak() && !key.is_object() {
            warn!(target_id = %self.id(), key = ?key, "invalid value used as weak collection key");
            return false;
        }
        true
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("skip", &self.is_skipped())
            .field("extensible", &self.is_extensible())
            .finish()
    }
}
