//! Reactive Proxies
//!
//! A [`Reactive`] is an explicit accessor handle over a raw [`Target`].
//! Every read and write goes through its methods, which record reads into
//! the dependency registry and notify on writes.
//!
//! # Variants
//!
//! Four variants exist, `{mutable, readonly} x {deep, shallow}`:
//!
//! - Deep variants wrap object-valued results on read, lazily, so only the
//!   paths actually visited ever get a wrapper.
//! - Readonly variants reject writes with a warning and record nothing.
//!
//! # Identity
//!
//! At most one wrapper of each variant exists per target at a time (see
//! [`registry`]). A readonly wrapper may sit on top of a mutable one, in which
//! case reads go through the mutable wrapper and are still tracked.
//!
//! # Surface
//!
//! - Objects and arrays: [`Reactive::get`], [`Reactive::set`],
//!   [`Reactive::delete`], [`Reactive::has`], [`Reactive::own_keys`] and the
//!   array methods (see `base_handlers`).
//! - Collections: [`Reactive::get_entry`], [`Reactive::add`],
//!   [`Reactive::set_entry`], [`Reactive::size`], iteration (see
//!   `collection_handlers`).
//!
//! Property methods on a collection wrapper, and collection methods on an
//! object wrapper, are inert.

mod base_handlers;
mod collection_handlers;
pub mod registry;

pub use registry::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, to_reactive, to_readonly,
};

use std::fmt;
use std::rc::Rc;

use crate::value::{ObjectId, Target, TargetKind, Value};

/// Wrapper variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Mutable,
    Readonly,
    ShallowMutable,
    ShallowReadonly,
}

impl Variant {
    pub fn is_readonly(self) -> bool {
        matches!(self, Variant::Readonly | Variant::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, Variant::ShallowMutable | Variant::ShallowReadonly)
    }

    /// Wrap a value read through a wrapper of this variant.
    pub(crate) fn wrap(self, value: Value) -> Value {
        match self {
            Variant::Mutable => to_reactive(value),
            Variant::Readonly => to_readonly(value),
            Variant::ShallowMutable | Variant::ShallowReadonly => value,
        }
    }
}

/// What a wrapper sits on.
#[derive(Clone)]
pub(crate) enum ProxyTarget {
    Raw(Target),
    /// Only readonly wrappers sit on another wrapper.
    Proxy(Reactive),
}

struct ProxyInner {
    id: ObjectId,
    variant: Variant,
    target: ProxyTarget,
    kind: TargetKind,
}

impl ProxyInner {
    fn target_id(&self) -> ObjectId {
        match &self.target {
            ProxyTarget::Raw(target) => target.id(),
            ProxyTarget::Proxy(proxy) => proxy.id(),
        }
    }
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        registry::evict(self.variant, self.target_id());
    }
}

/// A reactive, readonly or shallow wrapper around an object.
#[derive(Clone)]
pub struct Reactive(Rc<ProxyInner>);

impl Reactive {
    pub(crate) fn new(variant: Variant, target: ProxyTarget) -> Self {
        let kind = match &target {
            ProxyTarget::Raw(raw) => raw.kind(),
            ProxyTarget::Proxy(proxy) => proxy.kind(),
        };
        Self(Rc::new(ProxyInner {
            id: ObjectId::next(),
            variant,
            target,
            kind,
        }))
    }

    /// Identity of this wrapper. Distinct from the target's identity.
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn variant(&self) -> Variant {
        self.0.variant
    }

    /// Shape of the underlying raw target.
    pub fn kind(&self) -> TargetKind {
        self.0.kind
    }

    /// Whether writes through this wrapper are observed. A readonly wrapper
    /// over a mutable one reports the inner wrapper's answer.
    pub fn is_reactive(&self) -> bool {
        if self.0.variant.is_readonly() {
            return match &self.0.target {
                ProxyTarget::Proxy(inner) => inner.is_reactive(),
                ProxyTarget::Raw(_) => false,
            };
        }
        true
    }

    pub fn is_readonly(&self) -> bool {
        self.0.variant.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.0.variant.is_shallow()
    }

    /// The immediate wrapped value: a raw object, or the inner wrapper.
    pub fn raw(&self) -> Value {
        match &self.0.target {
            ProxyTarget::Raw(target) => Value::Object(target.clone()),
            ProxyTarget::Proxy(proxy) => Value::Proxy(proxy.clone()),
        }
    }

    /// The innermost raw target.
    pub fn to_raw(&self) -> Target {
        match &self.0.target {
            ProxyTarget::Raw(target) => target.clone(),
            ProxyTarget::Proxy(proxy) => proxy.to_raw(),
        }
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn target(&self) -> &ProxyTarget {
        &self.0.target
    }

    /// The raw target when this wrapper sits directly on one.
    pub(crate) fn raw_target(&self) -> Option<&Target> {
        match &self.0.target {
            ProxyTarget::Raw(target) => Some(target),
            ProxyTarget::Proxy(_) => None,
        }
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.id())
            .field("variant", &self.variant())
            .field("kind", &self.kind())
            .field("raw", &self.to_raw().id())
            .finish()
    }
}
