//! Observable Value Model
//!
//! Rust has no transparent proxies over arbitrary host objects, so the engine
//! defines its own observable data model. A target is a heap cell holding
//! either a key-ordered map or a list; applications address entries through
//! [`Key`] and store dynamically-typed [`Value`]s.
//!
//! # Identity
//!
//! Every target carries a [`TargetId`] minted from an atomic counter. The
//! dependency store is keyed by these ids rather than by addresses, so an
//! entry can never alias a later allocation that reuses the same memory.
//!
//! # Equality
//!
//! [`Value`] equality is by value for scalars and by target identity for
//! objects and proxies. `NaN` compares equal to itself: the change detection
//! in the write path relies on this to keep a `NaN` write from re-triggering
//! its own observers forever.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::proxy::Proxy;

/// Unique identifier for an observable target.
///
/// Computed nodes also allocate a `TargetId` so they can publish under their
/// own identity in the dependency store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage of an observable target: a key-ordered map or a list.
#[derive(Debug, Clone)]
pub enum ObjData {
    /// A plain object. Key order is insertion order.
    Map(IndexMap<Rc<str>, Value>),
    /// An array. Dense, no holes; growth fills with `Value::Undefined`.
    List(Vec<Value>),
}

struct ObjCell {
    id: TargetId,
    data: RefCell<ObjData>,
}

/// Shared handle to an observable target.
///
/// Cloning the handle shares the underlying cell; equality is identity.
#[derive(Clone)]
pub struct ObjRef(Rc<ObjCell>);

impl ObjRef {
    fn new(data: ObjData) -> Self {
        Self(Rc::new(ObjCell {
            id: TargetId::new(),
            data: RefCell::new(data),
        }))
    }

    /// Create an empty plain-object target.
    pub fn map() -> Self {
        Self::new(ObjData::Map(IndexMap::new()))
    }

    /// Create an array target from the given items.
    pub fn list(items: Vec<Value>) -> Self {
        Self::new(ObjData::List(items))
    }

    /// Create a plain-object target from key/value pairs, preserving order.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<Rc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(ObjData::Map(
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Get the target's unique ID.
    pub fn id(&self) -> TargetId {
        self.0.id
    }

    /// Whether this target is an array.
    pub fn is_list(&self) -> bool {
        matches!(&*self.data(), ObjData::List(_))
    }

    /// Whether this target is a plain object.
    pub fn is_map(&self) -> bool {
        !self.is_list()
    }

    pub(crate) fn data(&self) -> Ref<'_, ObjData> {
        self.0.data.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, ObjData> {
        self.0.data.borrow_mut()
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow on purpose: targets can be cyclic.
        let mut s = f.debug_struct("ObjRef");
        s.field("id", &self.id().raw());
        match self.0.data.try_borrow() {
            Ok(data) => match &*data {
                ObjData::Map(map) => s.field("kind", &"map").field("len", &map.len()),
                ObjData::List(items) => s.field("kind", &"list").field("len", &items.len()),
            },
            Err(_) => s.field("kind", &"<borrowed>"),
        };
        s.finish()
    }
}

/// A dynamically-typed observable value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value; reads of missing keys produce this.
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// A raw (unwrapped) target.
    Obj(ObjRef),
    /// A target seen through a reactive proxy.
    Proxy(Proxy),
}

impl Value {
    /// Build a string value.
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<&ObjRef> {
        match self {
            Value::Obj(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Loose truthiness for template conditionals: `Undefined`, `Null`,
    /// `false`, `0`, `NaN` and the empty string are falsy; every object is
    /// truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Obj(_) | Value::Proxy(_) => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // NaN is equal to itself here; see the module docs.
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => a == b,
            (Value::Proxy(a), Value::Proxy(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<ObjRef> for Value {
    fn from(v: ObjRef) -> Self {
        Value::Obj(v)
    }
}

impl From<Proxy> for Value {
    fn from(v: Proxy) -> Self {
        Value::Proxy(v)
    }
}

/// Public access key for proxy operations.
///
/// The synthetic iterate and computed-value markers are deliberately not
/// representable here; they live in the internal dependency-key type and can
/// never collide with application data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property.
    Prop(Rc<str>),
    /// An array index.
    Index(usize),
    /// The array length pseudo-property.
    Length,
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        if s == "length" {
            Key::Length
        } else {
            Key::Prop(Rc::from(s))
        }
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::from(s.as_str())
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(p) => write!(f, "{p}"),
            Key::Index(i) => write!(f, "{i}"),
            Key::Length => write!(f, "length"),
        }
    }
}

/// Convert a JSON document into an observable value tree.
///
/// Arrays and objects become fresh targets; numbers map to `Int` when they
/// fit in `i64` and `Float` otherwise.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::Str(Rc::from(s.as_str())),
        serde_json::Value::Array(items) => Value::Obj(ObjRef::list(items.iter().map(from_json).collect())),
        serde_json::Value::Object(map) => Value::Obj(ObjRef::from_pairs(
            map.iter().map(|(k, v)| (k.as_str(), from_json(v))),
        )),
    }
}

/// Snapshot a value tree as JSON, reading raw targets without tracking.
///
/// Proxies are unwrapped to their targets. `Undefined` and non-finite floats
/// become JSON null; a cyclic reference is cut with null at the revisit.
pub fn to_json(value: &Value) -> serde_json::Value {
    let mut seen = HashSet::new();
    snapshot(value, &mut seen)
}

fn snapshot(value: &Value, seen: &mut HashSet<TargetId>) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Obj(o) => snapshot_obj(o, seen),
        Value::Proxy(p) => snapshot_obj(p.target(), seen),
    }
}

fn snapshot_obj(target: &ObjRef, seen: &mut HashSet<TargetId>) -> serde_json::Value {
    if !seen.insert(target.id()) {
        return serde_json::Value::Null;
    }
    let out = {
        let data = target.data();
        match &*data {
            ObjData::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| snapshot(v, seen)).collect())
            }
            ObjData::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), snapshot(v, seen)))
                    .collect(),
            ),
        }
    };
    // Allow shared (non-cyclic) subtrees to appear more than once.
    seen.remove(&target.id());
    out
}
