//! Serde support for [`Value`].
//!
//! Serialization snapshots the raw data behind any wrapper without tracking.
//! Maps serialize as `[key, value]` pairs and sets as sequences; non-finite
//! numbers become `null`. Cyclic graphs fail with [`Error::Cyclic`].

use std::cell::RefCell;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ObjectId, Target, TargetKind, Value};
use crate::error::Error;

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let path = RefCell::new(Vec::new());
        Snapshot { value: self, path: &path }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

struct Snapshot<'a> {
    value: &'a Value,
    path: &'a RefCell<Vec<ObjectId>>,
}

impl Snapshot<'_> {
    fn child<'b>(&'b self, value: &'b Value) -> Snapshot<'b> {
        Snapshot { value, path: self.path }
    }

    fn serialize_target<S: Serializer>(
        &self,
        target: &Target,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        if self.path.borrow().contains(&target.id()) {
            return Err(S::Error::custom(Error::Cyclic(target.id())));
        }
        self.path.borrow_mut().push(target.id());
        let result = match target.kind() {
            TargetKind::Object => {
                let keys = target.own_keys();
                let mut map = serializer.serialize_map(Some(keys.len()))?;
                for key in keys {
                    let value = target.get(&key);
                    map.serialize_entry(&key.to_string(), &self.child(&value))?;
                }
                map.end()
            }
            TargetKind::Array => {
                let items = target.to_vec();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(&self.child(item))?;
                }
                seq.end()
            }
            TargetKind::Map | TargetKind::WeakMap => {
                let entries = target.entries();
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for (key, value) in &entries {
                    seq.serialize_element(&(self.child(key), self.child(value)))?;
                }
                seq.end()
            }
            TargetKind::Set | TargetKind::WeakSet => {
                let entries = target.entries();
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for (member, _) in &entries {
                    seq.serialize_element(&self.child(member))?;
                }
                seq.end()
            }
        };
        self.path.borrow_mut().pop();
        result
    }
}

impl Serialize for Snapshot<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if !n.is_finite() => serializer.serialize_unit(),
            Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(target) => self.serialize_target(target, serializer),
            Value::Proxy(proxy) => self.serialize_target(&proxy.to_raw(), serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_plain_json() {
        let source = json!({ "name": "erhang", "tags": ["a", "b"], "age": 10, "ratio": 0.5 });
        let value = Value::from(source.clone());
        assert_eq!(serde_json::to_value(&value).unwrap(), source);
    }

    #[test]
    fn collections_serialize_as_sequences() {
        let map = Target::map_from([("k", 1)]);
        let set = Target::set_from([1, 2]);
        assert_eq!(serde_json::to_value(Value::from(map)).unwrap(), json!([["k", 1]]));
        assert_eq!(serde_json::to_value(Value::from(set)).unwrap(), json!([1, 2]));
        assert_eq!(serde_json::to_value(Value::from(f64::NAN)).unwrap(), json!(null));
    }

    #[test]
    fn cycles_are_rejected() {
        let a = Target::object();
        let b = Target::object_from([("a", &a)]);
        a.set("b", &b);
        let err = serde_json::to_string(&Value::from(&a)).unwrap_err();
        assert!(err.to_string().contains("cyclic"));
        // Break the cycle so both targets can be freed.
        a.delete("b");
    }

    #[test]
    fn deserializes_into_fresh_targets() {
        let value: Value = serde_json::from_str(r#"{"nested":{"x":1}}"#).unwrap();
        let nested = value.as_target().unwrap().get("nested");
        assert_eq!(nested.as_target().unwrap().get("x"), Value::from(1));
    }
}
