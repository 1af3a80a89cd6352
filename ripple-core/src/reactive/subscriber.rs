//! Subscriber types for the reactive system.
//!
//! A Subscriber is any computation that depends on reactive values. Effects,
//! computed cells and watchers are all subscribers underneath: each owns an
//! [`EffectCore`] and knows how to re-run itself.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::effect::EffectCore;

/// Unique identifier for a subscriber.
///
/// Each subscriber gets a unique ID when created. This ID is used to
/// deduplicate fan-out and to recognize a computation on the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation that can be notified when its dependencies change.
///
/// Type-erased so that a [`Dep`](super::Dep) can hold effects of any return
/// type side by side.
pub(crate) trait Subscriber {
    /// Lifecycle and dependency bookkeeping shared by every effect.
    fn core(&self) -> &EffectCore;

    /// Re-run the computation, discarding its result.
    fn rerun(self: Rc<Self>);

    fn id(&self) -> SubscriberId {
        self.core().id()
    }

    /// React to a dependency change: defer to the scheduler when there is
    /// one, otherwise re-run inline.
    fn notify(self: Rc<Self>) {
        let scheduler = self.core().scheduler();
        match scheduler {
            Some(scheduler) => scheduler(),
            None => self.rerun(),
        }
    }
}
