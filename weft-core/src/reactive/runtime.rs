//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects proxies, effects,
//! computed nodes and watchers. It owns the dependency store and decides
//! which effects a mutation reaches.
//!
//! # How It Works
//!
//! 1. When an effect runs, it is pushed on the runtime's effect stack; the
//!    top of the stack is the "active" effect for tracking purposes.
//!
//! 2. When a proxy read happens while an effect is active, [`Runtime::track`]
//!    records the effect in the subscriber set for that `(target, key)` pair
//!    and remembers the membership on the effect for later cleanup.
//!
//! 3. When a proxy write happens, [`Runtime::trigger`] collects the affected
//!    subscriber sets for the mutated key plus the extra sets implied by the
//!    mutation kind, and runs (or schedules) each collected effect.
//!
//! # State Consolidation
//!
//! Everything that would be free-standing module state in a dynamic-language
//! rendition (the dependency store, the effect stack, the scheduler queue,
//! the suspend-tracking flag, the proxy identity cache) lives in one
//! `RuntimeInner` with interior mutability. `Runtime` is a cheap clonable
//! handle; independent runtimes never share state, which keeps tests
//! isolated. No `RefCell` borrow is ever held across a call into user code.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use tracing::trace;

use super::effect::{EffectId, RawEffect};
use super::proxy::Proxy;
use super::value::TargetId;

/// Internal dependency key: the real property keys plus the synthetic
/// markers. The markers are unreachable from the public [`super::Key`] type,
/// so they can never collide with application data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    Prop(Rc<str>),
    Index(usize),
    Length,
    /// Structure-of-keys marker, subscribed by enumeration.
    Iterate,
    /// A computed node's published output.
    Value,
}

/// Classification of a mutation, controlling trigger fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerKind {
    Set,
    Add,
    Delete,
}

pub(crate) type DepMap = IndexMap<DepKey, IndexSet<EffectId>>;
pub(crate) type JobFn = Rc<dyn Fn(&Runtime)>;

pub(crate) struct RuntimeInner {
    /// target -> key -> subscriber set.
    pub(crate) store: RefCell<HashMap<TargetId, DepMap>>,
    /// Every live (non-disposed) effect, keyed by id. The registry is the
    /// owner; handles are non-owning and disposal is the explicit
    /// unregister path.
    pub(crate) effects: RefCell<HashMap<EffectId, Rc<RawEffect>>>,
    /// Currently-executing effects; the top is the active one.
    pub(crate) stack: RefCell<Vec<Rc<RawEffect>>>,
    /// False while array mutators run, suspending dependency collection.
    pub(crate) tracking: Cell<bool>,
    /// Deduplicated, insertion-ordered pending jobs.
    pub(crate) queue: RefCell<IndexMap<u64, JobFn>>,
    /// True while a flush is draining the queue.
    pub(crate) flushing: Cell<bool>,
    /// Identity cache: one proxy per (target, shallow, readonly).
    pub(crate) proxies: RefCell<HashMap<(TargetId, bool, bool), Proxy>>,
}

/// Handle to a reactive runtime.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                store: RefCell::new(HashMap::new()),
                effects: RefCell::new(HashMap::new()),
                stack: RefCell::new(Vec::new()),
                tracking: Cell::new(true),
                queue: RefCell::new(IndexMap::new()),
                flushing: Cell::new(false),
                proxies: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Drop all runtime state: dependency entries, registered effects,
    /// pending jobs and cached proxies. Intended for test isolation.
    pub fn reset(&self) {
        self.inner.store.borrow_mut().clear();
        self.inner.effects.borrow_mut().clear();
        self.inner.stack.borrow_mut().clear();
        self.inner.queue.borrow_mut().clear();
        self.inner.proxies.borrow_mut().clear();
        self.inner.tracking.set(true);
        self.inner.flushing.set(false);
    }

    /// The effect on top of the stack, if any.
    pub(crate) fn active_effect(&self) -> Option<Rc<RawEffect>> {
        self.inner.stack.borrow().last().cloned()
    }

    /// Push an effect for the duration of its run. The returned scope pops
    /// it again on drop, so the stack stays balanced even across a panic in
    /// the effect body.
    pub(crate) fn enter_effect(&self, effect: Rc<RawEffect>) -> EffectScope {
        let id = effect.id();
        self.inner.stack.borrow_mut().push(effect);
        EffectScope {
            inner: Rc::clone(&self.inner),
            id,
        }
    }

    /// Suspend dependency collection until the returned guard drops.
    #[must_use]
    pub(crate) fn pause_tracking(&self) -> TrackGuard {
        self.set_tracking(false)
    }

    /// Re-enable dependency collection until the returned guard drops. An
    /// effect run opens its own tracking context even when it was triggered
    /// from inside a suspended array mutator.
    #[must_use]
    pub(crate) fn resume_tracking(&self) -> TrackGuard {
        self.set_tracking(true)
    }

    fn set_tracking(&self, on: bool) -> TrackGuard {
        TrackGuard {
            inner: Rc::clone(&self.inner),
            prev: self.inner.tracking.replace(on),
        }
    }

    pub(crate) fn register_effect(&self, effect: Rc<RawEffect>) {
        self.inner.effects.borrow_mut().insert(effect.id(), effect);
    }

    pub(crate) fn unregister_effect(&self, id: EffectId) {
        self.inner.effects.borrow_mut().remove(&id);
    }

    /// Record that the active effect depends on `(target, key)`.
    ///
    /// No-op when tracking is suspended or no effect is running.
    pub(crate) fn track(&self, target: TargetId, key: DepKey) {
        if !self.inner.tracking.get() {
            return;
        }
        let Some(active) = self.active_effect() else {
            return;
        };
        if active.is_disposed() {
            return;
        }
        let mut store = self.inner.store.borrow_mut();
        let deps = store
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_insert_with(IndexSet::new);
        if deps.insert(active.id()) {
            active.record_dep(target, key);
        }
    }

    /// Notify the effects affected by a mutation of `(target, key)`.
    ///
    /// The currently active effect is excluded so that an effect reading and
    /// writing the same key cannot loop on itself. Extra subscriber sets are
    /// included per mutation kind: key addition/removal on a map reaches the
    /// iterate subscribers, appending to an array reaches the length
    /// subscribers, and shrinking an array's length reaches every index at
    /// or beyond the new length.
    ///
    /// All store borrows are released before any effect or scheduler runs.
    pub(crate) fn trigger(
        &self,
        target: TargetId,
        key: &DepKey,
        kind: TriggerKind,
        is_array: bool,
        new_len: Option<usize>,
    ) {
        let active_id = self.active_effect().map(|e| e.id());
        let mut ids: IndexSet<EffectId> = IndexSet::new();
        {
            let store = self.inner.store.borrow();
            let Some(dep_map) = store.get(&target) else {
                return;
            };
            let mut collect = |set: &IndexSet<EffectId>| {
                for id in set {
                    if Some(*id) != active_id {
                        ids.insert(*id);
                    }
                }
            };
            if let Some(set) = dep_map.get(key) {
                collect(set);
            }
            if matches!(kind, TriggerKind::Add | TriggerKind::Delete) && !is_array {
                if let Some(set) = dep_map.get(&DepKey::Iterate) {
                    collect(set);
                }
            }
            if kind == TriggerKind::Add && is_array {
                if let Some(set) = dep_map.get(&DepKey::Length) {
                    collect(set);
                }
            }
            if is_array && *key == DepKey::Length {
                let new_len = new_len.unwrap_or(0);
                for (k, set) in dep_map.iter() {
                    if let DepKey::Index(i) = k {
                        if *i >= new_len {
                            collect(set);
                        }
                    }
                }
            }
        }
        if ids.is_empty() {
            return;
        }
        trace!(target_id = target.raw(), affected = ids.len(), "trigger");

        let mut to_run: SmallVec<[Rc<RawEffect>; 8]> = SmallVec::new();
        {
            let mut store = self.inner.store.borrow_mut();
            let effects = self.inner.effects.borrow();
            for id in &ids {
                match effects.get(id) {
                    Some(effect) if !effect.is_disposed() => to_run.push(Rc::clone(effect)),
                    // Disposed ids are pruned lazily so the sets stay small.
                    _ => {
                        if let Some(dep_map) = store.get_mut(&target) {
                            for set in dep_map.values_mut() {
                                set.shift_remove(id);
                            }
                        }
                    }
                }
            }
        }
        for effect in to_run {
            effect.dispatch(self);
        }
    }

    /// Remove the effect from every subscriber set it joined in its last
    /// run. Called before each re-run and on disposal, so dependencies from
    /// branches that are no longer reached do not survive.
    pub(crate) fn cleanup_effect(&self, effect: &RawEffect) {
        let deps = effect.take_deps();
        if deps.is_empty() {
            return;
        }
        let mut store = self.inner.store.borrow_mut();
        for (target, key) in deps {
            if let Some(dep_map) = store.get_mut(&target) {
                if let Some(set) = dep_map.get_mut(&key) {
                    set.shift_remove(&effect.id());
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, target: TargetId, key: &DepKey) -> usize {
        self.inner
            .store
            .borrow()
            .get(&target)
            .and_then(|m| m.get(key))
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that pops the effect stack when dropped.
pub(crate) struct EffectScope {
    inner: Rc<RuntimeInner>,
    id: EffectId,
}

impl Drop for EffectScope {
    fn drop(&mut self) {
        let popped = self.inner.stack.borrow_mut().pop();
        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.id,
                "effect stack mismatch: expected {:?}, got {:?}",
                self.id,
                effect.id()
            );
        }
    }
}

/// Guard restoring the previous tracking flag when dropped.
pub(crate) struct TrackGuard {
    inner: Rc<RuntimeInner>,
    prev: bool,
}

impl Drop for TrackGuard {
    fn drop(&mut self) {
        self.inner.tracking.set(self.prev);
    }
}
