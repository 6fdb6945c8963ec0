//! Computed Node
//!
//! A computed node is a lazy, cached derived value built from a lazy effect
//! and a dirty flag. It is a subscriber to whatever its getter reads, and a
//! publisher to its own consumers under a synthetic value key on its own
//! target identity.
//!
//! # How It Works
//!
//! 1. The getter never runs at creation. The first `value()` read runs it,
//!    caches the result and clears the dirty flag.
//!
//! 2. When an upstream dependency changes, the node's scheduler does not
//!    recompute. It flips the dirty flag and, only on the clean-to-dirty
//!    transition, triggers the node's value key, so downstream consumers
//!    are notified without any eager work. Repeated upstream changes while
//!    already dirty stay silent; recomputation is demand-driven.
//!
//! 3. Every `value()` read tracks the value key, making the reading context
//!    a transitive dependent of the getter's own dependencies.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::{Rc, Weak};

use super::effect::{Effect, RawEffect, SchedulerFn};
use super::runtime::{DepKey, Runtime, TriggerKind};
use super::value::{TargetId, Value};

struct ComputedInner {
    /// Identity under which the node publishes its value key.
    id: TargetId,
    effect: OnceCell<Rc<RawEffect>>,
    value: RefCell<Value>,
    dirty: Cell<bool>,
}

/// A lazily evaluated, cached derived value.
#[derive(Clone)]
pub struct Computed {
    inner: Rc<ComputedInner>,
}

impl Runtime {
    /// Build a computed node over `getter`.
    pub fn computed<F>(&self, getter: F) -> Computed
    where
        F: Fn(&Runtime) -> Value + 'static,
    {
        let inner = Rc::new(ComputedInner {
            id: TargetId::new(),
            effect: OnceCell::new(),
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(true),
        });

        let node: Weak<ComputedInner> = Rc::downgrade(&inner);
        let scheduler: SchedulerFn = Rc::new(move |rt: &Runtime, _effect: &Effect| {
            if let Some(node) = node.upgrade() {
                // Only the clean-to-dirty transition notifies consumers.
                if !node.dirty.replace(true) {
                    rt.trigger(node.id, &DepKey::Value, TriggerKind::Set, false, None);
                }
            }
        });

        let raw = RawEffect::new(Rc::new(getter), Some(scheduler));
        self.register_effect(Rc::clone(&raw));
        let _ = inner.effect.set(raw);

        Computed { inner }
    }
}

impl Computed {
    /// Current value, recomputing only when dirty. The read itself is
    /// tracked, so effects reading a computed re-run when it changes.
    pub fn value(&self, rt: &Runtime) -> Value {
        if self.inner.dirty.get() {
            if let Some(effect) = self.inner.effect.get() {
                let fresh = effect.run(rt);
                *self.inner.value.borrow_mut() = fresh;
                self.inner.dirty.set(false);
            }
        }
        rt.track(self.inner.id, DepKey::Value);
        self.inner.value.borrow().clone()
    }

    /// Whether the cache is stale. Mostly useful in tests.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::value::ObjRef;

    fn counter_obj(rt: &Runtime) -> crate::reactive::proxy::Proxy {
        rt.reactive(&ObjRef::from_pairs([("foo", Value::from(1))]))
    }

    #[test]
    fn computed_is_lazy() {
        let rt = Runtime::new();
        let calls = Rc::new(Cell::new(0));

        let calls_in = Rc::clone(&calls);
        let c = rt.computed(move |_| {
            calls_in.set(calls_in.get() + 1);
            Value::Int(42)
        });

        assert_eq!(calls.get(), 0);
        assert_eq!(c.value(&rt), Value::Int(42));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_caches_until_upstream_changes() {
        let rt = Runtime::new();
        let obj = counter_obj(&rt);
        let calls = Rc::new(Cell::new(0));

        let calls_in = Rc::clone(&calls);
        let obj_in = obj.clone();
        let c = rt.computed(move |rt| {
            calls_in.set(calls_in.get() + 1);
            Value::Int(obj_in.get(rt, "foo").as_int().unwrap_or(0) * 2)
        });

        assert_eq!(c.value(&rt), Value::Int(2));
        assert_eq!(c.value(&rt), Value::Int(2));
        assert_eq!(c.value(&rt), Value::Int(2));
        assert_eq!(calls.get(), 1);

        obj.set(&rt, "foo", Value::from(3));
        assert!(c.is_dirty());
        // Still no recomputation until the next read.
        assert_eq!(calls.get(), 1);

        assert_eq!(c.value(&rt), Value::Int(6));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn repeated_upstream_changes_recompute_once_per_read() {
        let rt = Runtime::new();
        let obj = counter_obj(&rt);
        let calls = Rc::new(Cell::new(0));

        let calls_in = Rc::clone(&calls);
        let obj_in = obj.clone();
        let c = rt.computed(move |rt| {
            calls_in.set(calls_in.get() + 1);
            obj_in.get(rt, "foo")
        });

        let _ = c.value(&rt);
        obj.set(&rt, "foo", Value::from(2));
        obj.set(&rt, "foo", Value::from(3));
        obj.set(&rt, "foo", Value::from(4));
        assert_eq!(calls.get(), 1);

        assert_eq!(c.value(&rt), Value::from(4));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn effects_reading_a_computed_rerun_on_upstream_change() {
        let rt = Runtime::new();
        let obj = counter_obj(&rt);
        let seen = Rc::new(Cell::new(0i64));
        let runs = Rc::new(Cell::new(0));

        let obj_in = obj.clone();
        let c = rt.computed(move |rt| {
            Value::Int(obj_in.get(rt, "foo").as_int().unwrap_or(0) * 2)
        });

        let seen_in = Rc::clone(&seen);
        let runs_in = Rc::clone(&runs);
        let c_in = c.clone();
        let _fx = rt.effect(move |rt| {
            runs_in.set(runs_in.get() + 1);
            seen_in.set(c_in.value(rt).as_int().unwrap_or(0));
        });
        assert_eq!(seen.get(), 2);
        assert_eq!(runs.get(), 1);

        obj.set(&rt, "foo", Value::from(5));
        assert_eq!(runs.get(), 2);
        assert_eq!(seen.get(), 10);
    }
}
