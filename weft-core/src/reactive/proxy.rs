//! Reactive Proxy Factory
//!
//! A [`Proxy`] binds one observable target to a pair of capability flags,
//! `{deep|shallow} x {mutable|readonly}`, and routes every read through
//! [`Runtime::track`] and every mutation through [`Runtime::trigger`].
//!
//! # How Wrapping Works
//!
//! Wrapping is identity-cached per variant: asking the runtime to wrap the
//! same target twice yields the same proxy, so elements read out of a deep
//! proxy compare equal across reads. Deep wrapping is lazy (nested objects
//! are wrapped when read, never eagerly at creation) and a readonly parent
//! hands out readonly children.
//!
//! # Mutation Classification
//!
//! Writes are classified before the store is touched: creating a map key or
//! writing an array index at or beyond the current length is an addition,
//! anything else is a plain set. The trigger fan-out depends on that
//! classification (additions and deletions reach enumeration subscribers,
//! array growth reaches length subscribers). A write whose new value equals
//! the old one, with `NaN` equal to itself, triggers nothing.

use std::rc::Rc;

use tracing::warn;

use super::runtime::{DepKey, Runtime, TriggerKind};
use super::value::{Key, ObjData, ObjRef, Value};

/// A reactive view of one target.
///
/// Cheap to clone; equality is target identity plus capability flags.
#[derive(Debug, Clone)]
pub struct Proxy {
    target: ObjRef,
    shallow: bool,
    readonly: bool,
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.target.id() == other.target.id()
            && self.shallow == other.shallow
            && self.readonly == other.readonly
    }
}

impl Runtime {
    pub(crate) fn wrap(&self, target: &ObjRef, shallow: bool, readonly: bool) -> Proxy {
        let cache_key = (target.id(), shallow, readonly);
        if let Some(existing) = self.inner.proxies.borrow().get(&cache_key) {
            return existing.clone();
        }
        let proxy = Proxy {
            target: target.clone(),
            shallow,
            readonly,
        };
        self.inner
            .proxies
            .borrow_mut()
            .insert(cache_key, proxy.clone());
        proxy
    }

    /// Deeply reactive, mutable view of `target`.
    pub fn reactive(&self, target: &ObjRef) -> Proxy {
        self.wrap(target, false, false)
    }

    /// Reactive view whose nested objects are returned raw.
    pub fn shallow_reactive(&self, target: &ObjRef) -> Proxy {
        self.wrap(target, true, false)
    }

    /// Deeply readonly view: writes are rejected with a diagnostic and reads
    /// are not tracked (a readonly view can never trigger).
    pub fn readonly(&self, target: &ObjRef) -> Proxy {
        self.wrap(target, false, true)
    }

    /// Readonly view whose nested objects are returned raw.
    pub fn shallow_readonly(&self, target: &ObjRef) -> Proxy {
        self.wrap(target, true, true)
    }
}

impl Proxy {
    /// The raw target behind this proxy. Raw reads are never tracked.
    pub fn target(&self) -> &ObjRef {
        &self.target
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    pub fn is_list(&self) -> bool {
        self.target.is_list()
    }

    /// Canonicalize a key for this target: lists fold numeric property names
    /// into indices, maps fold the index/length forms into property names.
    fn normalize(&self, key: Key) -> Key {
        if self.target.is_list() {
            match key {
                Key::Prop(p) => match p.parse::<usize>() {
                    Ok(i) => Key::Index(i),
                    Err(_) => Key::Prop(p),
                },
                k => k,
            }
        } else {
            match key {
                Key::Length => Key::Prop(Rc::from("length")),
                Key::Index(i) => Key::Prop(Rc::from(i.to_string())),
                k => k,
            }
        }
    }

    fn dep_key(key: &Key) -> DepKey {
        match key {
            Key::Prop(p) => DepKey::Prop(Rc::clone(p)),
            Key::Index(i) => DepKey::Index(*i),
            Key::Length => DepKey::Length,
        }
    }

    pub(crate) fn raw_len(&self) -> usize {
        match &*self.target.data() {
            ObjData::List(items) => items.len(),
            ObjData::Map(map) => map.len(),
        }
    }

    pub(crate) fn raw_index(&self, index: usize) -> Value {
        match &*self.target.data() {
            ObjData::List(items) => items.get(index).cloned().unwrap_or(Value::Undefined),
            ObjData::Map(_) => Value::Undefined,
        }
    }

    /// Read a property. Missing keys produce `Undefined`; `length` on an
    /// array produces its element count. Deep variants wrap object results
    /// in a child proxy of matching readonly-ness.
    pub fn get(&self, rt: &Runtime, key: impl Into<Key>) -> Value {
        let key = self.normalize(key.into());
        let raw = {
            let data = self.target.data();
            match (&*data, &key) {
                (ObjData::List(items), Key::Index(i)) => {
                    items.get(*i).cloned().unwrap_or(Value::Undefined)
                }
                (ObjData::List(items), Key::Length) => Value::Int(items.len() as i64),
                (ObjData::List(_), Key::Prop(_)) => Value::Undefined,
                (ObjData::Map(map), Key::Prop(p)) => {
                    map.get(&**p).cloned().unwrap_or(Value::Undefined)
                }
                (ObjData::Map(_), _) => Value::Undefined,
            }
        };
        if !self.readonly {
            rt.track(self.target.id(), Self::dep_key(&key));
        }
        if self.shallow {
            return raw;
        }
        match raw {
            Value::Obj(child) => Value::Proxy(rt.wrap(&child, false, self.readonly)),
            other => other,
        }
    }

    /// Write a property, classifying the mutation and triggering subscribers
    /// when the value actually changed. Readonly views reject the write with
    /// a diagnostic and leave control flow undisturbed.
    pub fn set(&self, rt: &Runtime, key: impl Into<Key>, value: Value) {
        let key = self.normalize(key.into());
        if self.readonly {
            warn!(key = %key, "write to readonly target ignored");
            return;
        }
        if self.target.is_list() {
            self.set_list(rt, key, value);
        } else {
            self.set_map(rt, key, value);
        }
    }

    fn set_list(&self, rt: &Runtime, key: Key, value: Value) {
        let id = self.target.id();
        match key {
            Key::Index(index) => {
                let (kind, old) = {
                    let data = self.target.data();
                    let len = match &*data {
                        ObjData::List(items) => items.len(),
                        ObjData::Map(_) => return,
                    };
                    if index < len {
                        (TriggerKind::Set, self.raw_index_in(&data, index))
                    } else {
                        (TriggerKind::Add, Value::Undefined)
                    }
                };
                {
                    let mut data = self.target.data_mut();
                    if let ObjData::List(items) = &mut *data {
                        if index >= items.len() {
                            items.resize(index + 1, Value::Undefined);
                        }
                        items[index] = value.clone();
                    }
                }
                if old != value {
                    rt.trigger(id, &DepKey::Index(index), kind, true, None);
                }
            }
            Key::Length => {
                let new_len = match &value {
                    Value::Int(n) if *n >= 0 => *n as usize,
                    _ => {
                        warn!("array length must be a non-negative integer");
                        return;
                    }
                };
                let old_len = self.raw_len();
                if new_len == old_len {
                    return;
                }
                {
                    let mut data = self.target.data_mut();
                    if let ObjData::List(items) = &mut *data {
                        items.resize(new_len, Value::Undefined);
                    }
                }
                rt.trigger(id, &DepKey::Length, TriggerKind::Set, true, Some(new_len));
            }
            Key::Prop(p) => {
                warn!(key = %p, "non-index property write on array ignored");
            }
        }
    }

    fn set_map(&self, rt: &Runtime, key: Key, value: Value) {
        let id = self.target.id();
        // normalize() folds every key form into Prop for map targets.
        let Key::Prop(p) = key else { return };
        let (kind, old) = {
            let data = self.target.data();
            match &*data {
                ObjData::Map(map) => match map.get(&*p) {
                    Some(existing) => (TriggerKind::Set, existing.clone()),
                    None => (TriggerKind::Add, Value::Undefined),
                },
                ObjData::List(_) => return,
            }
        };
        {
            let mut data = self.target.data_mut();
            if let ObjData::Map(map) = &mut *data {
                map.insert(Rc::clone(&p), value.clone());
            }
        }
        if old != value {
            rt.trigger(id, &DepKey::Prop(p), kind, false, None);
        }
    }

    fn raw_index_in(&self, data: &ObjData, index: usize) -> Value {
        match data {
            ObjData::List(items) => items.get(index).cloned().unwrap_or(Value::Undefined),
            ObjData::Map(_) => Value::Undefined,
        }
    }

    /// Membership test; tracks the key before answering.
    pub fn has(&self, rt: &Runtime, key: impl Into<Key>) -> bool {
        let key = self.normalize(key.into());
        rt.track(self.target.id(), Self::dep_key(&key));
        let data = self.target.data();
        match (&*data, &key) {
            (ObjData::List(items), Key::Index(i)) => *i < items.len(),
            (ObjData::List(_), Key::Length) => true,
            (ObjData::List(_), Key::Prop(_)) => false,
            (ObjData::Map(map), Key::Prop(p)) => map.contains_key(&**p),
            (ObjData::Map(_), _) => false,
        }
    }

    /// Enumerate keys in insertion order. Subscribes the active effect to
    /// the structure of the target: the iterate marker for maps, `length`
    /// for arrays.
    pub fn keys(&self, rt: &Runtime) -> Vec<Key> {
        let id = self.target.id();
        let data = self.target.data();
        match &*data {
            ObjData::List(items) => {
                rt.track(id, DepKey::Length);
                (0..items.len()).map(Key::Index).collect()
            }
            ObjData::Map(map) => {
                rt.track(id, DepKey::Iterate);
                map.keys().map(|k| Key::Prop(Rc::clone(k))).collect()
            }
        }
    }

    /// Tracked element count: length for arrays, entry count for maps.
    pub fn len(&self, rt: &Runtime) -> usize {
        let id = self.target.id();
        let data = self.target.data();
        match &*data {
            ObjData::List(items) => {
                rt.track(id, DepKey::Length);
                items.len()
            }
            ObjData::Map(map) => {
                rt.track(id, DepKey::Iterate);
                map.len()
            }
        }
    }

    pub fn is_empty(&self, rt: &Runtime) -> bool {
        self.len(rt) == 0
    }

    /// Remove a map entry, preserving the order of the remaining keys.
    /// Returns whether a key was actually removed; deletions reach the
    /// enumeration subscribers. The dense list model has no holes, so
    /// deletion on an array is rejected with a diagnostic.
    pub fn delete(&self, rt: &Runtime, key: impl Into<Key>) -> bool {
        let key = self.normalize(key.into());
        if self.readonly {
            warn!(key = %key, "delete on readonly target ignored");
            return false;
        }
        let id = self.target.id();
        match key {
            Key::Prop(p) if self.target.is_map() => {
                let existed = {
                    let mut data = self.target.data_mut();
                    match &mut *data {
                        ObjData::Map(map) => map.shift_remove(&*p).is_some(),
                        ObjData::List(_) => false,
                    }
                };
                if existed {
                    rt.trigger(id, &DepKey::Prop(p), TriggerKind::Delete, false, None);
                }
                existed
            }
            _ => {
                warn!(key = %key, "delete is only supported on plain-object targets");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sample_obj() -> ObjRef {
        ObjRef::from_pairs([("foo", Value::from(1)), ("bar", Value::from(2))])
    }

    #[test]
    fn wrapping_twice_returns_the_same_proxy() {
        let rt = Runtime::new();
        let obj = sample_obj();

        assert_eq!(rt.reactive(&obj), rt.reactive(&obj));
        assert_eq!(rt.readonly(&obj), rt.readonly(&obj));
        // Different capability flags are distinct proxies.
        assert_ne!(rt.reactive(&obj), rt.readonly(&obj));
    }

    #[test]
    fn effect_reruns_when_a_read_property_changes() {
        let rt = Runtime::new();
        let obj = rt.reactive(&sample_obj());
        let runs = Rc::new(Cell::new(0));

        let runs_in = Rc::clone(&runs);
        let obj_in = obj.clone();
        let _fx = rt.effect(move |rt| {
            let _ = obj_in.get(rt, "foo");
            runs_in.set(runs_in.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        obj.set(&rt, "foo", Value::from(2));
        assert_eq!(runs.get(), 2);

        // Untouched property: no re-run.
        obj.set(&rt, "bar", Value::from(9));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn writing_the_same_value_does_not_trigger() {
        let rt = Runtime::new();
        let obj = rt.reactive(&sample_obj());
        let runs = Rc::new(Cell::new(0));

        let runs_in = Rc::clone(&runs);
        let obj_in = obj.clone();
        let _fx = rt.effect(move |rt| {
            let _ = obj_in.get(rt, "foo");
            runs_in.set(runs_in.get() + 1);
        });

        obj.set(&rt, "foo", Value::from(1));
        assert_eq!(runs.get(), 1);

        obj.set(&rt, "nan", Value::Float(f64::NAN));
        let before = runs.get();
        obj.set(&rt, "nan", Value::Float(f64::NAN));
        assert_eq!(runs.get(), before);
    }

    #[test]
    fn deep_reads_wrap_nested_objects() {
        let rt = Runtime::new();
        let inner = sample_obj();
        let outer = ObjRef::from_pairs([("nested", Value::Obj(inner.clone()))]);
        let proxy = rt.reactive(&outer);

        let nested = proxy.get(&rt, "nested");
        let nested = nested.as_proxy().expect("deep read should wrap");
        assert!(!nested.is_readonly());
        assert_eq!(*nested, rt.reactive(&inner));

        // Mutations through the nested proxy re-run observers of it.
        let runs = Rc::new(Cell::new(0));
        let runs_in = Rc::clone(&runs);
        let proxy_in = proxy.clone();
        let _fx = rt.effect(move |rt| {
            if let Value::Proxy(n) = proxy_in.get(rt, "nested") {
                let _ = n.get(rt, "foo");
            }
            runs_in.set(runs_in.get() + 1);
        });
        nested.set(&rt, "foo", Value::from(5));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn shallow_reads_return_raw_objects() {
        let rt = Runtime::new();
        let inner = sample_obj();
        let outer = ObjRef::from_pairs([("nested", Value::Obj(inner.clone()))]);
        let proxy = rt.shallow_reactive(&outer);

        match proxy.get(&rt, "nested") {
            Value::Obj(o) => assert_eq!(o, inner),
            other => panic!("expected raw object, got {other:?}"),
        }
    }

    #[test]
    fn readonly_rejects_writes_without_triggering() {
        let rt = Runtime::new();
        let target = sample_obj();
        let ro = rt.readonly(&target);
        let rw = rt.reactive(&target);
        let runs = Rc::new(Cell::new(0));

        let runs_in = Rc::clone(&runs);
        let rw_in = rw.clone();
        let _fx = rt.effect(move |rt| {
            let _ = rw_in.get(rt, "foo");
            runs_in.set(runs_in.get() + 1);
        });

        ro.set(&rt, "foo", Value::from(99));
        assert_eq!(runs.get(), 1);
        assert_eq!(rw.get(&rt, "foo"), Value::from(1));

        assert!(!ro.delete(&rt, "foo"));
        assert!(rw.has(&rt, "foo"));

        // Readonly deep reads hand out readonly children.
        let nested_target = ObjRef::from_pairs([("x", Value::from(1))]);
        let outer = ObjRef::from_pairs([("n", Value::Obj(nested_target))]);
        let ro_outer = rt.readonly(&outer);
        let child = ro_outer.get(&rt, "n");
        assert!(child.as_proxy().expect("wrapped").is_readonly());
    }

    #[test]
    fn key_addition_and_removal_notify_enumerators() {
        let rt = Runtime::new();
        let obj = rt.reactive(&sample_obj());
        let seen = Rc::new(Cell::new(0));

        let seen_in = Rc::clone(&seen);
        let obj_in = obj.clone();
        let _fx = rt.effect(move |rt| {
            seen_in.set(obj_in.keys(rt).len() as i32);
        });
        assert_eq!(seen.get(), 2);

        obj.set(&rt, "baz", Value::from(3));
        assert_eq!(seen.get(), 3);

        obj.delete(&rt, "foo");
        assert_eq!(seen.get(), 2);

        // Plain sets of an existing key do not touch the enumerator.
        obj.set(&rt, "bar", Value::from(0));
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn array_index_and_length_semantics() {
        let rt = Runtime::new();
        let arr = rt.reactive(&ObjRef::list(vec![
            Value::from(10),
            Value::from(20),
            Value::from(30),
        ]));
        let len_seen = Rc::new(Cell::new(0usize));
        let elem_runs = Rc::new(Cell::new(0));

        let len_in = Rc::clone(&len_seen);
        let arr_len = arr.clone();
        let _len_fx = rt.effect(move |rt| {
            len_in.set(arr_len.len(rt));
        });

        let elem_in = Rc::clone(&elem_runs);
        let arr_elem = arr.clone();
        let _elem_fx = rt.effect(move |rt| {
            let _ = arr_elem.get(rt, 2usize);
            elem_in.set(elem_in.get() + 1);
        });
        assert_eq!(len_seen.get(), 3);
        assert_eq!(elem_runs.get(), 1);

        // Writing past the end is an addition: length observers re-run.
        arr.set(&rt, 3usize, Value::from(40));
        assert_eq!(len_seen.get(), 4);

        // Shrinking the length reaches observers of removed indices.
        arr.set(&rt, Key::Length, Value::from(2));
        assert_eq!(len_seen.get(), 2);
        assert_eq!(elem_runs.get(), 2);
        assert_eq!(arr.get(&rt, 2usize), Value::Undefined);

        // In-range writes are plain sets: length observers stay quiet.
        let len_before = len_seen.get();
        arr.set(&rt, 0usize, Value::from(11));
        assert_eq!(len_seen.get(), len_before);
    }

    #[test]
    fn numeric_string_props_address_array_indices() {
        let rt = Runtime::new();
        let arr = rt.reactive(&ObjRef::list(vec![Value::from(1)]));

        assert_eq!(arr.get(&rt, "0"), Value::from(1));
        arr.set(&rt, "0", Value::from(7));
        assert_eq!(arr.get(&rt, 0usize), Value::from(7));
        assert_eq!(arr.get(&rt, "length"), Value::from(1i64));
    }

    #[test]
    fn has_tracks_membership() {
        let rt = Runtime::new();
        let obj = rt.reactive(&ObjRef::map());
        let present = Rc::new(Cell::new(false));

        let present_in = Rc::clone(&present);
        let obj_in = obj.clone();
        let _fx = rt.effect(move |rt| {
            present_in.set(obj_in.has(rt, "flag"));
        });
        assert!(!present.get());

        obj.set(&rt, "flag", Value::from(true));
        assert!(present.get());
    }
}
