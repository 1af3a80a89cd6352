//! Watchers.
//!
//! A watcher runs a callback with the new and previous value of a source
//! whenever the source changes. Underneath it is a lazy effect whose
//! scheduler is the watcher's job:
//!
//! 1. re-run the getter to get the new value,
//! 2. call the cleanup registered by the previous callback, if any,
//! 3. call the callback with `(new, old, on_cleanup)`,
//! 4. remember the new value as the next old value.
//!
//! Sources are a [`Ref`], a getter closure, or a reactive object. An object
//! source is traversed in full on every run, so any nested write notifies.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::computed::Computed;
use super::effect::{ReactiveEffect, Scheduler, WeakEffect};
use super::refs::Ref;
use crate::proxy::Reactive;
use crate::value::{ObjectId, Value};

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    Ref(Ref),
    Getter(Rc<dyn Fn() -> Value>),
    /// An object, observed in depth.
    Reactive(Value),
}

impl WatchSource {
    pub fn getter(f: impl Fn() -> Value + 'static) -> Self {
        WatchSource::Getter(Rc::new(f))
    }
}

impl From<Ref> for WatchSource {
    fn from(r: Ref) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<&Ref> for WatchSource {
    fn from(r: &Ref) -> Self {
        WatchSource::Ref(r.clone())
    }
}

impl From<Computed<Value>> for WatchSource {
    fn from(c: Computed<Value>) -> Self {
        WatchSource::getter(move || c.get())
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        WatchSource::Reactive(value)
    }
}

impl From<Reactive> for WatchSource {
    fn from(proxy: Reactive) -> Self {
        WatchSource::Reactive(Value::Proxy(proxy))
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
            WatchSource::Getter(_) => f.write_str("Getter"),
            WatchSource::Reactive(value) => f.debug_tuple("Reactive").field(value).finish(),
        }
    }
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    immediate: bool,
    deep: bool,
    once: bool,
}

impl WatchOptions {
    /// Run the callback once at setup, with `Undefined` as the old value.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Traverse whatever a ref or getter source returns.
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Stop after the first callback.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

type CleanupSlot = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

/// Lets a callback register work to undo before the next callback runs.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: CleanupSlot,
}

impl OnCleanup {
    /// Replace any previously registered cleanup with `f`.
    pub fn register(&self, f: impl FnOnce() + 'static) {
        let previous = self.slot.borrow_mut().replace(Box::new(f));
        drop(previous);
    }

    fn run_pending(slot: &CleanupSlot) {
        let pending = slot.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

type Callback = Box<dyn Fn(&Value, &Value, &OnCleanup)>;

struct WatchState {
    effect: RefCell<WeakEffect<Value>>,
    callback: Callback,
    old_value: RefCell<Value>,
    on_cleanup: OnCleanup,
    once: bool,
}

impl WatchState {
    fn job(&self) {
        let Some(effect) = self.effect.borrow().upgrade() else {
            return;
        };
        if !effect.is_active() {
            return;
        }
        let new_value = effect.run().unwrap_or_default();
        OnCleanup::run_pending(&self.on_cleanup.slot);

        let old_value = self.old_value.borrow().clone();
        (self.callback)(&new_value, &old_value, &self.on_cleanup);
        *self.old_value.borrow_mut() = new_value;

        if self.once {
            effect.stop();
        }
    }
}

/// Handle to a running watcher. Dropping it leaves the watcher running.
#[derive(Clone)]
pub struct WatchHandle {
    effect: ReactiveEffect<Value>,
}

impl WatchHandle {
    /// Detach the watcher. A pending cleanup runs now.
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").field("effect", &self.effect).finish()
    }
}

/// Call `callback(new, old, on_cleanup)` whenever `source` changes.
///
/// The callback runs on every notification, without comparing the values.
pub fn watch<F>(source: impl Into<WatchSource>, callback: F, options: WatchOptions) -> WatchHandle
where
    F: Fn(&Value, &Value, &OnCleanup) + 'static,
{
    let source = source.into();
    debug!(?source, ?options, "watch created");
    let getter = build_getter(source, options.deep);

    let on_cleanup = OnCleanup::default();
    let state = Rc::new(WatchState {
        effect: RefCell::new(WeakEffect::new()),
        callback: Box::new(callback),
        old_value: RefCell::new(Value::Undefined),
        on_cleanup: on_cleanup.clone(),
        once: options.once,
    });

    let job_state = state.clone();
    let scheduler: Scheduler = Rc::new(move || job_state.job());
    let slot = on_cleanup.slot.clone();
    let effect = ReactiveEffect::build(
        getter,
        Some(scheduler),
        Some(Box::new(move || OnCleanup::run_pending(&slot))),
    );
    *state.effect.borrow_mut() = effect.downgrade();

    if options.immediate {
        state.job();
    } else {
        let initial = effect.run().unwrap_or_default();
        *state.old_value.borrow_mut() = initial;
    }
    WatchHandle { effect }
}

fn build_getter(source: WatchSource, deep: bool) -> Box<dyn Fn() -> Value> {
    match source {
        WatchSource::Ref(r) if deep => Box::new(move || {
            let value = r.get();
            traverse(&value);
            value
        }),
        WatchSource::Ref(r) => Box::new(move || r.get()),
        WatchSource::Getter(f) if deep => Box::new(move || {
            let value = f();
            traverse(&value);
            value
        }),
        WatchSource::Getter(f) => Box::new(move || f()),
        WatchSource::Reactive(value) => Box::new(move || {
            traverse(&value);
            value.clone()
        }),
    }
}

/// Read every nested key of `value` so the running effect subscribes to the
/// whole object graph. Cycles are visited once.
pub fn traverse(value: &Value) {
    traverse_with(value, &mut HashSet::new());
}

fn traverse_with(value: &Value, seen: &mut HashSet<ObjectId>) {
    let Some(id) = value.object_id() else {
        return;
    };
    if !seen.insert(id) {
        return;
    }
    match value {
        Value::Proxy(proxy) if proxy.kind().is_collection() => {
            for (key, item) in proxy.entries() {
                traverse_with(&key, seen);
                traverse_with(&item, seen);
            }
        }
        Value::Proxy(proxy) => {
            for key in proxy.own_keys() {
                traverse_with(&proxy.get(key), seen);
            }
        }
        Value::Object(target) if target.kind().is_collection() => {
            for (key, item) in target.entries() {
                traverse_with(&key, seen);
                traverse_with(&item, seen);
            }
        }
        Value::Object(target) => {
            for key in target.own_keys() {
                traverse_with(&target.get(key), seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::reactive;
    use crate::value::Target;
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Log, impl Fn(&Value, &Value, &OnCleanup) + 'static) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |new: &Value, old: &Value, _: &OnCleanup| {
            sink.borrow_mut().push((new.clone(), old.clone()))
        })
    }

    #[test]
    fn getter_source_reports_new_and_old() {
        let obj = reactive(Target::object_from([("name", "erhang")])).proxy().unwrap();
        let (log, callback) = recorder();
        let o = obj.clone();
        let _handle = watch(
            WatchSource::getter(move || o.get("name")),
            callback,
            WatchOptions::default(),
        );
        assert!(log.borrow().is_empty());

        obj.set("name", "cch");
        assert_eq!(*log.borrow(), vec![(Value::from("cch"), Value::from("erhang"))]);
    }

    #[test]
    fn ref_source_with_immediate() {
        let count = Ref::new(1);
        let (log, callback) = recorder();
        let _handle = watch(&count, callback, WatchOptions::default().immediate());
        assert_eq!(*log.borrow(), vec![(Value::from(1), Value::Undefined)]);

        count.set(2);
        assert_eq!(log.borrow()[1], (Value::from(2), Value::from(1)));
    }

    #[test]
    fn object_source_observes_nested_writes() {
        let inner = Target::object_from([("x", 1)]);
        let obj = reactive(Target::object_from([("inner", &inner)]));
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let _handle = watch(
            obj.clone(),
            move |_, _, _| c.set(c.get() + 1),
            WatchOptions::default(),
        );

        let proxy = obj.proxy().unwrap();
        proxy.get("inner").proxy().unwrap().set("x", 2);
        assert_eq!(calls.get(), 1);
        proxy.set("added", true);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn traverse_survives_cycles() {
        let a = Target::object();
        let b = Target::object_from([("a", &a)]);
        a.set("b", &b);
        traverse(&reactive(&a));
        a.delete("b");
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let count = Ref::new(0);
        let events = Rc::new(RefCell::new(Vec::new()));
        let ev = events.clone();
        let handle = watch(
            &count,
            move |new, _, on_cleanup| {
                let n = new.as_number().unwrap_or(0.0);
                ev.borrow_mut().push(format!("run {n}"));
                let ev = ev.clone();
                on_cleanup.register(move || ev.borrow_mut().push(format!("cleanup {n}")));
            },
            WatchOptions::default(),
        );

        count.set(1);
        count.set(2);
        handle.stop();
        assert_eq!(
            *events.borrow(),
            vec!["run 1", "cleanup 1", "run 2", "cleanup 2"]
        );
    }

    #[test]
    fn stopped_watch_is_silent() {
        let count = Ref::new(0);
        let (log, callback) = recorder();
        let handle = watch(&count, callback, WatchOptions::default());
        handle.stop();
        assert!(!handle.is_active());
        count.set(1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn once_stops_after_first_callback() {
        let count = Ref::new(0);
        let (log, callback) = recorder();
        let handle = watch(&count, callback, WatchOptions::default().once());
        count.set(1);
        count.set(2);
        assert_eq!(log.borrow().len(), 1);
        assert!(!handle.is_active());
    }

    #[test]
    fn deep_getter_traverses_result() {
        let state = reactive(Target::object_from([("list", Target::array([1]))]))
            .proxy()
            .unwrap();
        let calls = Rc::new(Cell::new(0));
        let (s, c) = (state.clone(), calls.clone());
        let _handle = watch(
            WatchSource::getter(move || s.get("list")),
            move |_, _, _| c.set(c.get() + 1),
            WatchOptions::default().deep(),
        );

        state.get("list").proxy().unwrap().push([2]);
        assert_eq!(calls.get(), 1);
    }
}
