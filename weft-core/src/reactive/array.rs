//! Array Mutation Instrumentation
//!
//! Two array-specific hazards are handled by dedicated proxy methods rather
//! than the generic get/set path:
//!
//! - **Search identity.** Elements read through a deep proxy come out
//!   wrapped, so searching a proxied array for a raw element can miss even
//!   though the value is logically present. Search methods scan through
//!   tracked proxy reads first and fall back to the raw target when nothing
//!   matched.
//!
//! - **Mutator recursion.** Structural mutators read the length and indices
//!   they are about to write. If those reads tracked the calling effect, the
//!   length write would immediately re-trigger it, and two effects pushing to
//!   the same array would recurse without bound. Tracking is suspended
//!   for the whole mutator call; triggers still fire normally.

use super::error::ReactiveError;
use super::proxy::Proxy;
use super::runtime::Runtime;
use super::value::{Key, ObjData, Value};

impl Proxy {
    fn require_list(&self) -> Result<(), ReactiveError> {
        if self.target().is_list() {
            Ok(())
        } else {
            Err(ReactiveError::NotAnArray)
        }
    }

    fn raw_list(&self) -> Vec<Value> {
        match &*self.target().data() {
            ObjData::List(items) => items.clone(),
            ObjData::Map(_) => Vec::new(),
        }
    }

    /// Whether the array contains `needle`. See [`Proxy::index_of`] for the
    /// two-pass search semantics.
    pub fn includes(&self, rt: &Runtime, needle: &Value) -> Result<bool, ReactiveError> {
        Ok(self.search(rt, needle, false)?.is_some())
    }

    /// First index of `needle`, searching through tracked proxy reads and
    /// falling back to the raw target when the wrapped scan finds nothing.
    pub fn index_of(&self, rt: &Runtime, needle: &Value) -> Result<Option<usize>, ReactiveError> {
        self.search(rt, needle, false)
    }

    /// Last index of `needle`, with the same fallback as [`Proxy::index_of`].
    pub fn last_index_of(
        &self,
        rt: &Runtime,
        needle: &Value,
    ) -> Result<Option<usize>, ReactiveError> {
        self.search(rt, needle, true)
    }

    fn search(
        &self,
        rt: &Runtime,
        needle: &Value,
        from_end: bool,
    ) -> Result<Option<usize>, ReactiveError> {
        self.require_list()?;
        // Pass 1: through the proxy, tracking length and every visited index.
        let len = self.len(rt);
        let indices: Box<dyn Iterator<Item = usize>> = if from_end {
            Box::new((0..len).rev())
        } else {
            Box::new(0..len)
        };
        for i in indices {
            if self.get(rt, i) == *needle {
                return Ok(Some(i));
            }
        }
        // Pass 2: the untouched raw target, so raw elements are still found
        // even though pass 1 handed out wrapped ones.
        let items = self.raw_list();
        let found = if from_end {
            items.iter().rposition(|v| v == needle)
        } else {
            items.iter().position(|v| v == needle)
        };
        Ok(found)
    }

    /// Append a value. Returns the new length.
    pub fn push(&self, rt: &Runtime, value: Value) -> Result<usize, ReactiveError> {
        self.require_list()?;
        let _pause = rt.pause_tracking();
        let len = self.raw_len();
        self.set(rt, Key::Index(len), value);
        Ok(self.raw_len())
    }

    /// Remove and return the last element, or `Undefined` when empty.
    pub fn pop(&self, rt: &Runtime) -> Result<Value, ReactiveError> {
        self.require_list()?;
        let _pause = rt.pause_tracking();
        let len = self.raw_len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let last = self.get(rt, len - 1);
        self.set(rt, Key::Length, Value::Int((len - 1) as i64));
        Ok(last)
    }

    /// Remove and return the first element, shifting the rest down.
    pub fn shift(&self, rt: &Runtime) -> Result<Value, ReactiveError> {
        self.require_list()?;
        let _pause = rt.pause_tracking();
        let len = self.raw_len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let first = self.get(rt, 0usize);
        for i in 1..len {
            let v = self.raw_index(i);
            self.set(rt, Key::Index(i - 1), v);
        }
        self.set(rt, Key::Length, Value::Int((len - 1) as i64));
        Ok(first)
    }

    /// Insert a value at the front. Returns the new length.
    pub fn unshift(&self, rt: &Runtime, value: Value) -> Result<usize, ReactiveError> {
        self.require_list()?;
        let _pause = rt.pause_tracking();
        let len = self.raw_len();
        let mut i = len;
        while i > 0 {
            let v = self.raw_index(i - 1);
            self.set(rt, Key::Index(i), v);
            i -= 1;
        }
        self.set(rt, Key::Index(0), value);
        Ok(self.raw_len())
    }

    /// Replace `delete_count` elements starting at `start` with `items`,
    /// returning the removed elements. Out-of-range arguments are clamped.
    pub fn splice(
        &self,
        rt: &Runtime,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, ReactiveError> {
        self.require_list()?;
        let _pause = rt.pause_tracking();
        let len = self.raw_len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);

        let removed: Vec<Value> = (start..start + delete_count)
            .map(|i| self.get(rt, i))
            .collect();

        let mut next = self.raw_list();
        next.splice(start..start + delete_count, items);

        // Replay the result index by index; value-equal writes stay silent,
        // index additions and the final length write fan out as usual.
        for (i, v) in next.iter().enumerate() {
            self.set(rt, Key::Index(i), v.clone());
        }
        if next.len() < len {
            self.set(rt, Key::Length, Value::Int(next.len() as i64));
        }
        Ok(removed)
    }
}
