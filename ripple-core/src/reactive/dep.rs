//! Dependency sets.
//!
//! A [`Dep`] is the subscriber set of one observable location: a
//! `(target, key)` pair in the registry, a [`Ref`](super::Ref) or a
//! [`Computed`](super::Computed). The dep owns its subscribers; each
//! subscriber keeps a weak back-reference so it can detach itself before
//! re-running or when stopped.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::subscriber::{Subscriber, SubscriberId};

pub(crate) struct DepInner {
    subscribers: RefCell<IndexMap<SubscriberId, Rc<dyn Subscriber>>>,
}

/// The subscriber set for one observable location.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

impl Dep {
    pub fn new() -> Self {
        Self(Rc::new(DepInner {
            subscribers: RefCell::new(IndexMap::new()),
        }))
    }

    /// Number of subscribed computations.
    pub fn len(&self) -> usize {
        self.0.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.0.subscribers.borrow().contains_key(&id)
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub(crate) fn insert(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let id = subscriber.id();
        let mut subscribers = self.0.subscribers.borrow_mut();
        if subscribers.contains_key(&id) {
            return false;
        }
        subscribers.insert(id, subscriber);
        true
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        // Release the borrow before the subscriber is dropped; dropping it
        // may release targets that reach back into other deps.
        let removed = self.0.subscribers.borrow_mut().swap_remove(&id);
        drop(removed);
    }

    /// Copy of the current subscribers. Notification always iterates a
    /// snapshot, since re-running one subscriber may edit this set.
    pub(crate) fn snapshot(&self) -> Vec<Rc<dyn Subscriber>> {
        self.0.subscribers.borrow().values().cloned().collect()
    }

    pub(crate) fn downgrade(&self) -> Weak<DepInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_weak(weak: &Weak<DepInner>) -> Option<Dep> {
        weak.upgrade().map(Dep)
    }

    pub(crate) fn ptr_eq_weak(&self, weak: &Weak<DepInner>) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.0), weak.as_ptr())
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep").field("subscribers", &self.len()).finish()
    }
}
