//! Effect Implementation
//!
//! An Effect is a re-runnable computation that re-executes whenever one of
//! the reactive locations it read last time changes.
//!
//! # How Effects Work
//!
//! 1. Unless created lazy, the effect runs its function immediately to
//!    establish initial dependencies.
//!
//! 2. When any dependency changes, the effect is notified. With a scheduler
//!    the scheduler decides what happens; otherwise the effect re-runs inline.
//!
//! 3. Before re-running, the effect detaches from every dep it joined last
//!    time and tracks new ones during execution, so branches not taken stop
//!    notifying it.
//!
//! # Lifecycle
//!
//! `lazy-unstarted -> active -> stopped`. A stopped effect stays callable: it
//! runs its raw function without tracking anything.
//!
//! # Ownership
//!
//! Deps own their subscribers. Dropping the last [`EffectRunner`] does not
//! stop an effect that is still subscribed somewhere; call [`stop`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::dep::{Dep, DepInner};
use super::subscriber::{Subscriber, SubscriberId};

/// Hook invoked instead of re-running an effect when a dependency changes.
pub type Scheduler = Rc<dyn Fn()>;

/// Lifecycle and dependency bookkeeping shared by effects, computed cells and
/// watchers.
pub(crate) struct EffectCore {
    id: SubscriberId,
    active: Cell<bool>,
    deps: RefCell<Vec<Weak<DepInner>>>,
    scheduler: Option<Scheduler>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    defer_stop: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectCore {
    fn new(scheduler: Option<Scheduler>, on_stop: Option<Box<dyn FnOnce()>>) -> Self {
        Self {
            id: SubscriberId::new(),
            active: Cell::new(true),
            deps: RefCell::new(Vec::new()),
            scheduler,
            on_stop: RefCell::new(on_stop),
            defer_stop: Cell::new(false),
            run_count: Cell::new(0),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn scheduler(&self) -> Option<Scheduler> {
        self.scheduler.clone()
    }

    /// Remember `dep` so [`EffectCore::cleanup`] can detach from it.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let mut deps = self.deps.borrow_mut();
        if !deps.iter().any(|weak| dep.ptr_eq_weak(weak)) {
            deps.push(dep.downgrade());
        }
    }

    fn dep_count(&self) -> usize {
        self.deps
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Detach from every dep joined during the last run.
    pub(crate) fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for weak in &deps {
            if let Some(dep) = Dep::from_weak(weak) {
                dep.remove(self.id);
            }
        }
    }

    pub(crate) fn take_deferred_stop(&self) -> bool {
        self.defer_stop.replace(false)
    }

    /// Detach and deactivate. Deferred to the end of the run when the effect
    /// stops itself.
    pub(crate) fn stop(&self) {
        if ReactiveContext::current_subscriber() == Some(self.id) {
            self.defer_stop.set(true);
            return;
        }
        if !self.active.replace(false) {
            return;
        }
        self.cleanup();
        debug!(effect_id = ?self.id, "effect stopped");
        let on_stop = self.on_stop.borrow_mut().take();
        if let Some(on_stop) = on_stop {
            on_stop();
        }
    }
}

struct EffectInner<T> {
    core: EffectCore,
    func: Box<dyn Fn() -> T>,
}

impl<T: 'static> EffectInner<T> {
    fn run(self: &Rc<Self>) -> Option<T> {
        let core = &self.core;
        if !core.is_active() {
            return Some((self.func)());
        }
        if ReactiveContext::is_running(core.id()) {
            trace!(effect_id = ?core.id(), "skipping recursive run");
            return None;
        }
        core.cleanup();

        let _ctx = ReactiveContext::enter(self.clone());
        core.run_count.set(core.run_count.get() + 1);
        Some((self.func)())
    }
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn rerun(self: Rc<Self>) {
        self.run();
    }
}

/// A computation with tracked dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let counter = count.clone();
/// let effect = ReactiveEffect::new(move || counter.get());
/// effect.run();
///
/// count.set(5); // effect re-runs
/// ```
pub struct ReactiveEffect<T> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an effect. Nothing runs until [`ReactiveEffect::run`].
    pub fn new(func: impl Fn() -> T + 'static) -> Self {
        Self::build(func, None, None)
    }

    /// Create an effect that calls `scheduler` instead of re-running.
    pub fn with_scheduler(func: impl Fn() -> T + 'static, scheduler: Scheduler) -> Self {
        Self::build(func, Some(scheduler), None)
    }

    pub(crate) fn build(
        func: impl Fn() -> T + 'static,
        scheduler: Option<Scheduler>,
        on_stop: Option<Box<dyn FnOnce()>>,
    ) -> Self {
        let effect = Self {
            inner: Rc::new(EffectInner {
                core: EffectCore::new(scheduler, on_stop),
                func: Box::new(func),
            }),
        };
        debug!(effect_id = ?effect.id(), "effect created");
        effect
    }

    /// Run the function, tracking everything it reads.
    ///
    /// Returns `None` when the effect is already running further up the
    /// stack. A stopped effect runs untracked.
    pub fn run(&self) -> Option<T> {
        self.inner.run()
    }
}

impl<T> ReactiveEffect<T> {
    pub fn id(&self) -> SubscriberId {
        self.inner.core.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.core.is_active()
    }

    /// Detach from every dep and deactivate.
    ///
    /// The stop callback, if any, runs exactly once. Stopping an effect from
    /// inside its own run takes effect when that run returns.
    pub fn stop(&self) {
        self.inner.core.stop();
    }

    /// Number of live deps the effect is subscribed to.
    pub fn dep_count(&self) -> usize {
        self.inner.core.dep_count()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.core.run_count.get()
    }

    pub(crate) fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect(Rc::downgrade(&self.inner))
    }
}

impl<T> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("deps", &self.dep_count())
            .finish()
    }
}

/// Non-owning handle used by schedulers that must reach their own effect.
pub(crate) struct WeakEffect<T>(Weak<EffectInner<T>>);

impl<T> WeakEffect<T> {
    pub(crate) fn new() -> Self {
        Self(Weak::new())
    }

    pub(crate) fn upgrade(&self) -> Option<ReactiveEffect<T>> {
        self.0.upgrade().map(|inner| ReactiveEffect { inner })
    }
}

/// Options for [`effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    lazy: bool,
    scheduler: Option<Scheduler>,
    on_stop: Option<Box<dyn FnOnce()>>,
}

impl EffectOptions {
    /// Do not run on creation.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn scheduler(mut self, scheduler: impl Fn() + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Called once when the effect is stopped.
    pub fn on_stop(mut self, on_stop: impl FnOnce() + 'static) -> Self {
        self.on_stop = Some(Box::new(on_stop));
        self
    }
}

/// Callable handle returned by [`effect`].
pub struct EffectRunner<T = ()> {
    effect: ReactiveEffect<T>,
}

impl<T: 'static> EffectRunner<T> {
    /// Run the effect now, re-collecting its dependencies.
    pub fn run(&self) -> Option<T> {
        self.effect.run()
    }

    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.effect
    }
}

impl<T> Clone for EffectRunner<T> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

/// Create an effect and run it once.
pub fn effect<T: 'static>(func: impl Fn() -> T + 'static) -> EffectRunner<T> {
    effect_with(func, EffectOptions::default())
}

/// Create an effect with options. Runs immediately unless `lazy`.
pub fn effect_with<T: 'static>(
    func: impl Fn() -> T + 'static,
    options: EffectOptions,
) -> EffectRunner<T> {
    let EffectOptions {
        lazy,
        scheduler,
        on_stop,
    } = options;
    let runner = EffectRunner {
        effect: ReactiveEffect::build(func, scheduler, on_stop),
    };
    if !lazy {
        runner.run();
    }
    runner
}

/// Stop the effect behind `runner`.
pub fn stop<T>(runner: &EffectRunner<T>) {
    runner.effect.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Ref, Runtime};
    use crate::value::Value;

    fn counter() -> Rc<Cell<usize>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn runs_immediately_and_on_change() {
        let source = Ref::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (s, log) = (source.clone(), seen.clone());
        let _runner = effect(move || log.borrow_mut().push(s.get()));

        source.set(2);
        assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn lazy_effect_waits_for_run() {
        let runs = counter();
        let c = runs.clone();
        let runner = effect_with(move || c.set(c.get() + 1), EffectOptions::default().lazy());
        assert_eq!(runs.get(), 0);
        runner.run();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn runner_returns_the_function_result() {
        let runner = effect(|| 42);
        assert_eq!(runner.run(), Some(42));
    }

    #[test]
    fn scheduler_replaces_inline_rerun() {
        let source = Ref::new(1);
        let (runs, scheduled) = (counter(), counter());
        let (s, r, sc) = (source.clone(), runs.clone(), scheduled.clone());
        let runner = effect_with(
            move || {
                s.get();
                r.set(r.get() + 1);
            },
            EffectOptions::default().scheduler(move || sc.set(sc.get() + 1)),
        );
        assert_eq!(runs.get(), 1);

        source.set(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(scheduled.get(), 1);

        runner.run();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn nested_effect_restores_outer_context() {
        let (a, b) = (Ref::new(0), Ref::new(0));
        let (outer_runs, inner_runs) = (counter(), counter());
        let inner_handle = Rc::new(RefCell::new(None));

        let (oa, ob, or, ir, handle) = (
            a.clone(),
            b.clone(),
            outer_runs.clone(),
            inner_runs.clone(),
            inner_handle.clone(),
        );
        let _outer = effect(move || {
            or.set(or.get() + 1);
            let ia = oa.clone();
            let ir = ir.clone();
            if let Some(previous) = handle.borrow_mut().replace(effect(move || {
                ir.set(ir.get() + 1);
                ia.get();
            })) {
                stop(&previous);
            }
            ob.get();
        });
        assert_eq!((outer_runs.get(), inner_runs.get()), (1, 1));

        a.set(1);
        assert_eq!((outer_runs.get(), inner_runs.get()), (1, 2));

        b.set(1);
        assert_eq!(outer_runs.get(), 2);
    }

    #[test]
    fn self_trigger_does_not_recurse() {
        let source = Ref::new(0);
        let runs = counter();
        let (s, r) = (source.clone(), runs.clone());
        let _runner = effect(move || {
            r.set(r.get() + 1);
            let next = s.get().as_number().unwrap_or(0.0) + 1.0;
            s.set(next);
        });
        assert_eq!(runs.get(), 1);
        assert_eq!(source.get_untracked(), Value::from(1));
    }

    #[test]
    fn stopped_effect_ignores_changes_but_stays_callable() {
        let source = Ref::new(0);
        let runs = counter();
        let (s, r) = (source.clone(), runs.clone());
        let runner = effect(move || {
            s.get();
            r.set(r.get() + 1);
        });

        stop(&runner);
        assert!(!runner.effect().is_active());
        assert_eq!(runner.effect().dep_count(), 0);
        source.set(1);
        assert_eq!(runs.get(), 1);

        runner.run();
        assert_eq!(runs.get(), 2);
        source.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn on_stop_runs_once() {
        let stops = counter();
        let c = stops.clone();
        let runner = effect_with(
            || {},
            EffectOptions::default().on_stop(move || c.set(c.get() + 1)),
        );
        stop(&runner);
        stop(&runner);
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn self_stop_is_deferred_until_run_ends() {
        let source = Ref::new(0);
        let slot: Rc<RefCell<Option<ReactiveEffect<()>>>> = Rc::new(RefCell::new(None));
        let (s, own) = (source.clone(), slot.clone());
        let runner = effect_with(
            move || {
                s.get();
                if let Some(me) = own.borrow().as_ref() {
                    me.stop();
                    assert!(me.is_active());
                    s.get();
                }
            },
            EffectOptions::default().lazy(),
        );
        *slot.borrow_mut() = Some(runner.effect().clone());

        runner.run();
        assert!(!runner.effect().is_active());
        assert_eq!(runner.effect().dep_count(), 0);
        slot.borrow_mut().take();
    }

    #[test]
    fn panicking_effect_restores_context() {
        let runner = effect_with(|| panic!("boom"), EffectOptions::default().lazy());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runner.run()));
        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
        assert!(Runtime::current_subscriber().is_none());
    }
}
