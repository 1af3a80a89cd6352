//! Reactive Runtime
//!
//! The runtime is the central coordinator between reactive reads and
//! writes. It owns the registry `target -> (key -> Dep)` and implements the
//! two halves of the protocol:
//!
//! 1. **Track**: when a reactive location is read inside a running effect,
//!    the effect joins that location's [`Dep`] and keeps a back-reference to
//!    it.
//!
//! 2. **Trigger**: when a location is written, the runtime resolves every
//!    affected dep for the kind of write, merges their subscribers into one
//!    deduplicated snapshot and notifies each subscriber at most once.
//!
//! # Registry lifetime
//!
//! Entries are keyed by [`ObjectId`] and evicted when the raw target is
//! dropped, so observing a target never keeps it alive by itself.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::subscriber::{Subscriber, SubscriberId};
use crate::value::{ObjectId, PropKey, Target, TargetKind, Value};

/// Kind of read being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of write being triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

/// Key of one observable location within a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named or indexed property.
    Prop(PropKey),
    /// A collection entry, keyed by the entry key itself.
    Entry(Value),
    /// Enumeration of the whole target: keys, size, iteration.
    Iterate,
    /// Key-only enumeration of a Map.
    MapKeyIterate,
}

impl DepKey {
    fn is_length(&self) -> bool {
        matches!(self, DepKey::Prop(key) if key.is_length())
    }
}

type KeyToDepMap = HashMap<DepKey, Dep>;

thread_local! {
    static TARGET_MAP: RefCell<HashMap<ObjectId, KeyToDepMap>> = RefCell::new(HashMap::new());
}

/// The track/trigger registry.
pub struct Runtime;

impl Runtime {
    /// Whether a read right now would be recorded.
    pub fn is_tracking() -> bool {
        ReactiveContext::should_track()
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Record that the running effect read `key` of `target`.
    ///
    /// No-op when tracking is paused or no effect is running.
    pub fn track(target: &Target, op: TrackOp, key: DepKey) {
        if !Self::is_tracking() {
            return;
        }
        let dep = TARGET_MAP.with(|map| {
            map.borrow_mut()
                .entry(target.id())
                .or_default()
                .entry(key.clone())
                .or_default()
                .clone()
        });
        trace!(target_id = %target.id(), ?op, ?key, "track");
        Self::track_dep(&dep);
    }

    /// Subscribe the running effect to `dep`, linking both directions.
    pub fn track_dep(dep: &Dep) {
        if !Self::is_tracking() {
            return;
        }
        if let Some(current) = ReactiveContext::current() {
            if current.core().is_active() && dep.insert(current.clone()) {
                current.core().add_dep(dep);
            }
        }
    }

    /// Notify every subscriber affected by a write to `target`.
    pub fn trigger(
        target: &Target,
        op: TriggerOp,
        key: Option<DepKey>,
        new_value: &Value,
        _old_value: &Value,
    ) {
        let kind = target.kind();
        let deps: SmallVec<[Dep; 4]> = TARGET_MAP.with(|map| {
            let map = map.borrow();
            let Some(deps_map) = map.get(&target.id()) else {
                // never been tracked
                return SmallVec::new();
            };
            let mut deps = SmallVec::new();

            if op == TriggerOp::Clear {
                deps.extend(deps_map.values().cloned());
            } else if kind == TargetKind::Array && key.as_ref().is_some_and(DepKey::is_length) {
                // Shrinking an array notifies readers of every removed index.
                let new_length = new_value.as_number().unwrap_or(0.0);
                for (dep_key, dep) in deps_map {
                    let affected = match dep_key {
                        DepKey::Prop(PropKey::Index(i)) => *i as f64 >= new_length,
                        other => other.is_length(),
                    };
                    if affected {
                        deps.push(dep.clone());
                    }
                }
            } else {
                let mut push = |key: &DepKey| {
                    if let Some(dep) = deps_map.get(key) {
                        deps.push(dep.clone());
                    }
                };
                if let Some(key) = &key {
                    push(key);
                }
                match op {
                    TriggerOp::Add => {
                        if kind != TargetKind::Array {
                            push(&DepKey::Iterate);
                            if kind.is_map() {
                                push(&DepKey::MapKeyIterate);
                            }
                        } else if matches!(&key, Some(DepKey::Prop(k)) if k.is_integer_key()) {
                            // new index added to array -> length changes
                            push(&DepKey::Prop(PropKey::length()));
                        }
                    }
                    TriggerOp::Delete => {
                        if kind != TargetKind::Array {
                            push(&DepKey::Iterate);
                            if kind.is_map() {
                                push(&DepKey::MapKeyIterate);
                            }
                        }
                    }
                    TriggerOp::Set => {
                        if kind.is_map() {
                            push(&DepKey::Iterate);
                        }
                    }
                    TriggerOp::Clear => {}
                }
            }
            deps
        });

        if deps.is_empty() {
            return;
        }

        // Merge before firing so a subscriber reached through several deps
        // runs once per write.
        let mut effects: IndexMap<SubscriberId, Rc<dyn Subscriber>> = IndexMap::new();
        for dep in &deps {
            for sub in dep.snapshot() {
                effects.entry(sub.id()).or_insert(sub);
            }
        }
        trace!(
            target_id = %target.id(),
            ?op,
            ?key,
            deps = deps.len(),
            effects = effects.len(),
            "trigger"
        );
        Self::trigger_effects(effects.into_values());
    }

    /// Notify every subscriber of a standalone dep (refs, computed cells).
    pub fn trigger_dep(dep: &Dep) {
        Self::trigger_effects(dep.snapshot());
    }

    fn trigger_effects(effects: impl IntoIterator<Item = Rc<dyn Subscriber>>) {
        for effect in effects {
            // An effect never retriggers itself.
            if ReactiveContext::current_subscriber() == Some(effect.id()) {
                continue;
            }
            effect.notify();
        }
    }

    /// Number of keys observed on `target`. Zero if it was never tracked.
    pub fn tracked_key_count(target: &Target) -> usize {
        TARGET_MAP.with(|map| map.borrow().get(&target.id()).map_or(0, HashMap::len))
    }

    /// The dep for `key` of `target`, if one was ever created.
    pub fn dep_for(target: &Target, key: &DepKey) -> Option<Dep> {
        TARGET_MAP.with(|map| map.borrow().get(&target.id())?.get(key).cloned())
    }

    /// Evict a dropped target's entry.
    pub(crate) fn forget_target(id: ObjectId) {
        // The entry is moved out before it drops: dropping it may release
        // effects that own other targets, which come back here.
        let removed = TARGET_MAP
            .try_with(|map| map.try_borrow_mut().ok().and_then(|mut map| map.remove(&id)))
            .ok()
            .flatten();
        drop(removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, effect_with, EffectOptions};
    use std::cell::Cell;

    fn key(name: &str) -> DepKey {
        DepKey::Prop(PropKey::from(name))
    }

    #[test]
    fn track_outside_effect_is_a_no_op() {
        let target = Target::object();
        Runtime::track(&target, TrackOp::Get, key("a"));
        assert_eq!(Runtime::tracked_key_count(&target), 0);
    }

    #[test]
    fn trigger_on_untracked_target_is_a_no_op() {
        let target = Target::object();
        Runtime::trigger(
            &target,
            TriggerOp::Set,
            Some(key("a")),
            &Value::from(1),
            &Value::Undefined,
        );
    }

    #[test]
    fn runtime_links_dep_and_effect() {
        let target = Target::object();
        let tracked = target.clone();
        let runner = effect(move || Runtime::track(&tracked, TrackOp::Get, key("a")));

        let dep = Runtime::dep_for(&target, &key("a")).unwrap();
        assert_eq!(dep.len(), 1);
        assert_eq!(runner.effect().dep_count(), 1);

        runner.effect().stop();
        assert!(dep.is_empty());
        assert_eq!(runner.effect().dep_count(), 0);
    }

    #[test]
    fn multi_path_subscription_fires_once() {
        let target = Target::map();
        let runs = Rc::new(Cell::new(0));
        let (tracked, counter) = (target.clone(), runs.clone());
        let _runner = effect(move || {
            Runtime::track(&tracked, TrackOp::Get, DepKey::Entry(Value::from("k")));
            Runtime::track(&tracked, TrackOp::Iterate, DepKey::Iterate);
            counter.set(counter.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        Runtime::trigger(
            &target,
            TriggerOp::Set,
            Some(DepKey::Entry(Value::from("k"))),
            &Value::from(2),
            &Value::from(1),
        );
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn array_length_shrink_notifies_removed_indices() {
        let target = Target::array([1, 2, 3]);
        let hits = Rc::new(Cell::new(0));
        let subscribe = |index: usize| {
            let (tracked, counter) = (target.clone(), hits.clone());
            effect_with(
                move || Runtime::track(&tracked, TrackOp::Get, DepKey::Prop(PropKey::Index(index))),
                EffectOptions::default().scheduler(move || counter.set(counter.get() + 1)),
            )
        };
        let _keep = subscribe(0);
        let _drop = subscribe(2);

        Runtime::trigger(
            &target,
            TriggerOp::Set,
            Some(DepKey::Prop(PropKey::length())),
            &Value::from(1),
            &Value::from(3),
        );
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_target_evicts_registry_entry() {
        let target = Target::object();
        let id = target.id();
        let tracked = target.clone();
        let runner = effect(move || Runtime::track(&tracked, TrackOp::Get, key("a")));
        assert!(TARGET_MAP.with(|map| map.borrow().contains_key(&id)));

        runner.effect().stop();
        drop(runner);
        drop(target);
        assert!(!TARGET_MAP.with(|map| map.borrow().contains_key(&id)));
    }
}
