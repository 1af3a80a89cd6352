//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a reactive location is
//! read, we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (running an effect), we push the
//! subscriber onto the stack. When the computation completes, the guard pops
//! it, which restores the enclosing computation rather than clearing the slot.
//!
//! The stack doubles as the parent chain: an effect that finds itself
//! anywhere on the stack is already running and must not re-enter.
//!
//! A second stack records whether tracking is enabled. Array mutators pause
//! tracking around their internal reads; pauses nest arbitrarily deep.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Rc<dyn Subscriber>>> = RefCell::new(Vec::new());
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
    static TRACK_STACK: RefCell<Vec<bool>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack and the tracking flag are restored even if
/// the computation panics. A stop requested while the computation was running
/// is applied here, once the computation has left the stack.
pub struct ReactiveContext {
    subscriber: Rc<dyn Subscriber>,
    last_should_track: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, reactive reads register the subscriber
    /// as a dependent. Tracking is enabled for the duration.
    pub(crate) fn enter(subscriber: Rc<dyn Subscriber>) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(subscriber.clone()));
        let last_should_track = SHOULD_TRACK.with(|flag| flag.replace(true));

        Self {
            subscriber,
            last_should_track,
        }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|sub| sub.id()))
    }

    pub(crate) fn current() -> Option<Rc<dyn Subscriber>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Whether the subscriber is anywhere on the stack.
    pub fn is_running(id: SubscriberId) -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().iter().any(|sub| sub.id() == id))
    }

    /// Number of computations currently executing.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Whether a read right now would be recorded.
    pub fn should_track() -> bool {
        SHOULD_TRACK.with(Cell::get) && Self::is_active()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        // This helps catch bugs where contexts are mismatched.
        if let Some(sub) = &popped {
            debug_assert_eq!(
                sub.id(),
                self.subscriber.id(),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber.id(),
                sub.id()
            );
        }
        SHOULD_TRACK.with(|flag| flag.set(self.last_should_track));

        let core = self.subscriber.core();
        if core.take_deferred_stop() {
            core.stop();
        }
    }
}

/// Suspend tracking until the matching [`reset_tracking`].
pub fn pause_tracking() {
    let last = SHOULD_TRACK.with(|flag| flag.replace(false));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(last));
}

/// Force tracking on until the matching [`reset_tracking`].
pub fn enable_tracking() {
    let last = SHOULD_TRACK.with(|flag| flag.replace(true));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(last));
}

/// Restore the tracking flag saved by the last pause or enable.
pub fn reset_tracking() {
    let last = TRACK_STACK.with(|stack| stack.borrow_mut().pop());
    SHOULD_TRACK.with(|flag| flag.set(last.unwrap_or(true)));
}

/// Guard that pauses tracking for its lifetime.
pub(crate) struct PauseTracking;

impl PauseTracking {
    pub(crate) fn new() -> Self {
        pause_tracking();
        Self
    }
}

impl Drop for PauseTracking {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Run `f` without recording any dependencies.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _pause = PauseTracking::new();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_and_enable_nest() {
        assert!(SHOULD_TRACK.with(Cell::get));

        pause_tracking();
        assert!(!SHOULD_TRACK.with(Cell::get));

        enable_tracking();
        assert!(SHOULD_TRACK.with(Cell::get));

        reset_tracking();
        assert!(!SHOULD_TRACK.with(Cell::get));

        reset_tracking();
        assert!(SHOULD_TRACK.with(Cell::get));
    }

    #[test]
    fn untracked_restores_after_panic() {
        let result = std::panic::catch_unwind(|| {
            untracked(|| panic!("boom"));
        });
        assert!(result.is_err());
        assert!(SHOULD_TRACK.with(Cell::get));
    }

    #[test]
    fn no_context_outside_effects() {
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
        assert!(!ReactiveContext::should_track());
        assert_eq!(ReactiveContext::depth(), 0);
    }
}
