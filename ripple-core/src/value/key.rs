//! Property keys and symbols.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Builtin symbols. Reads keyed by these are never tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownSymbol {
    Iterator,
    AsyncIterator,
    HasInstance,
    ToPrimitive,
    ToStringTag,
}

/// A unique property key that is not a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    WellKnown(WellKnownSymbol),
    Unique {
        id: u64,
        description: Option<Rc<str>>,
    },
}

impl Symbol {
    /// Create a fresh symbol, distinct from every other.
    pub fn new(description: Option<&str>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Symbol::Unique {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            description: description.map(Rc::from),
        }
    }

    pub fn iterator() -> Self {
        Symbol::WellKnown(WellKnownSymbol::Iterator)
    }

    pub fn to_string_tag() -> Self {
        Symbol::WellKnown(WellKnownSymbol::ToStringTag)
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Symbol::WellKnown(_))
    }
}

/// Key of an object property.
///
/// Canonical non-negative integer strings are normalized to [`PropKey::Index`],
/// so `"3"` and `3` name the same property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Name(Rc<str>),
    Index(usize),
    Symbol(Symbol),
}

/// Names that are never tracked.
const NON_TRACKABLE: &[&str] = &["__proto__", "__v_isRef", "__isVue"];

impl PropKey {
    /// The array `length` key.
    pub fn length() -> Self {
        PropKey::Name(Rc::from("length"))
    }

    pub fn is_length(&self) -> bool {
        matches!(self, PropKey::Name(name) if &**name == "length")
    }

    pub fn is_integer_key(&self) -> bool {
        matches!(self, PropKey::Index(_))
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Builtin symbols and a few reserved names are read without tracking.
    pub(crate) fn is_non_trackable(&self) -> bool {
        match self {
            PropKey::Symbol(symbol) => symbol.is_builtin(),
            PropKey::Name(name) => NON_TRACKABLE.contains(&&**name),
            PropKey::Index(_) => false,
        }
    }
}

fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

impl From<&str> for PropKey {
    fn from(s: &str) -> Self {
        parse_index(s)
            .map(PropKey::Index)
            .unwrap_or_else(|| PropKey::Name(Rc::from(s)))
    }
}

impl From<String> for PropKey {
    fn from(s: String) -> Self {
        PropKey::from(s.as_str())
    }
}

impl From<&String> for PropKey {
    fn from(s: &String) -> Self {
        PropKey::from(s.as_str())
    }
}

impl From<usize> for PropKey {
    fn from(i: usize) -> Self {
        PropKey::Index(i)
    }
}

impl From<i32> for PropKey {
    fn from(i: i32) -> Self {
        usize::try_from(i)
            .map(PropKey::Index)
            .unwrap_or_else(|_| PropKey::Name(Rc::from(i.to_string())))
    }
}

impl From<Symbol> for PropKey {
    fn from(symbol: Symbol) -> Self {
        PropKey::Symbol(symbol)
    }
}

impl From<&PropKey> for PropKey {
    fn from(key: &PropKey) -> Self {
        key.clone()
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Name(name) => f.write_str(name),
            PropKey::Index(i) => write!(f, "{i}"),
            PropKey::Symbol(Symbol::WellKnown(known)) => write!(f, "Symbol({known:?})"),
            PropKey::Symbol(Symbol::Unique { description, .. }) => {
                write!(f, "Symbol({})", description.as_deref().unwrap_or(""))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_strings_normalize_to_index() {
        assert_eq!(PropKey::from("3"), PropKey::Index(3));
        assert_eq!(PropKey::from("0"), PropKey::Index(0));
        assert!(!PropKey::from("03").is_integer_key());
        assert!(!PropKey::from("-1").is_integer_key());
        assert!(!PropKey::from("NaN").is_integer_key());
        assert!(PropKey::from("length").is_length());
    }

    #[test]
    fn symbols_are_unique() {
        let a = Symbol::new(Some("a"));
        let b = Symbol::new(Some("a"));
        assert_ne!(a, b);
        assert_eq!(Symbol::iterator(), Symbol::iterator());
        assert!(Symbol::iterator().is_builtin());
        assert!(!a.is_builtin());
    }

    #[test]
    fn reserved_names_are_not_tracked() {
        assert!(PropKey::from("__proto__").is_non_trackable());
        assert!(PropKey::from(Symbol::to_string_tag()).is_non_trackable());
        assert!(!PropKey::from("name").is_non_trackable());
        assert!(!PropKey::from(Symbol::new(None)).is_non_trackable());
    }
}
