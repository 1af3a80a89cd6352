//! Value Model
//!
//! Rust has no transparent property interception, so every observable value
//! lives in this small dynamic model instead. Reactive wrappers are explicit
//! accessor handles (see [`crate::proxy`]) layered over raw [`Target`]s.
//!
//! # Equality
//!
//! Three comparisons are exposed because the engine needs all three:
//!
//! - [`Value::is`] is identity in the `Object.is` sense. `NaN` equals `NaN`,
//!   `+0` differs from `-0`. All change detection goes through
//!   [`has_changed`].
//! - `PartialEq`/`Hash` use SameValueZero: `NaN` equals `NaN` and `+0`
//!   equals `-0`. This is what Map/Set keys and `includes` use.
//! - [`Value::strict_equals`] never equates `NaN`; `index_of` uses it.
//!
//! Objects always compare by identity. A reactive wrapper and its raw target
//! are different identities.

mod key;
mod target;
mod serialize;

pub use key::{PropKey, Symbol, WellKnownSymbol};
pub use target::{Target, TargetKind, MAX_ARRAY_INDEX, MAX_ARRAY_LENGTH};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Error;
use crate::proxy::Reactive;

/// Identity of a heap object: a raw target or a reactive wrapper.
///
/// Identities come from one counter and are never reused, so a stale id in a
/// registry can never alias a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// A raw, unobserved object.
    Object(Target),
    /// A reactive or readonly wrapper around an object.
    Proxy(Reactive),
}

impl Value {
    /// Build a string value.
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Whether this value is an object (raw or wrapped).
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Identity of the object, if this is one.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Object(target) => Some(target.id()),
            Value::Proxy(proxy) => Some(proxy.id()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(target) => Some(target),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Reactive> {
        match self {
            Value::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Clone out the reactive handle, if this value is one.
    pub fn proxy(&self) -> Option<Reactive> {
        self.as_proxy().cloned()
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Proxy(_) => "proxy",
        }
    }

    /// `Object.is` comparison.
    pub fn is(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                (x.is_nan() && y.is_nan()) || x.to_bits() == y.to_bits()
            }
            _ => a == b,
        }
    }

    /// `===` comparison.
    pub fn strict_equals(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x == y,
            _ => a == b,
        }
    }
}

/// Whether `new` differs from `old` for change-detection purposes.
pub fn has_changed(new: &Value, old: &Value) -> bool {
    !Value::is(new, old)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.id() == b.id(),
            (Value::Proxy(a), Value::Proxy(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                if n.is_nan() {
                    state.write_u64(f64::NAN.to_bits());
                } else if *n == 0.0 {
                    state.write_u64(0);
                } else {
                    state.write_u64(n.to_bits());
                }
            }
            Value::Str(s) => s.hash(state),
            Value::Object(target) => target.id().hash(state),
            Value::Proxy(proxy) => proxy.id().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(target) => write!(f, "{:?}({})", target.kind(), target.id()),
            Value::Proxy(proxy) => write!(
                f,
                "{:?}<{:?}>({})",
                proxy.variant(),
                proxy.kind(),
                proxy.id()
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        Value::Object(target)
    }
}

impl From<&Target> for Value {
    fn from(target: &Target) -> Self {
        Value::Object(target.clone())
    }
}

impl From<Reactive> for Value {
    fn from(proxy: Reactive) -> Self {
        Value::Proxy(proxy)
    }
}

impl From<&Reactive> for Value {
    fn from(proxy: &Reactive) -> Self {
        Value::Proxy(proxy.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Object(Target::array(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(fields) => Value::Object(Target::object_from(
                fields.into_iter().map(|(k, v)| (PropKey::from(k), Value::from(v))),
            )),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_number().ok_or(Error::TypeMismatch {
            expected: "number",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or(Error::TypeMismatch {
            expected: "boolean",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(Error::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}
