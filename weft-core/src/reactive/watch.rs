//! Watcher
//!
//! A watcher runs a user callback with the new and old value of a watched
//! source whenever the source changes. Timing is configurable: the callback
//! can run synchronously on trigger or be deferred to the next flush, and it
//! can fire once immediately at registration.
//!
//! # Invalidation
//!
//! Each callback invocation receives a registrar for an invalidation hook.
//! When the watcher fires again before the previous invocation's asynchronous
//! work has settled, the previously registered hook runs first: the caller's
//! signal that the in-flight work is stale and should be abandoned. This is
//! the engine's only cooperative-cancellation mechanism.
//!
//! # Plain-value sources
//!
//! Watching a proxy (or any value) rather than a getter derives a getter
//! that traverses every reachable property through tracked reads, cycle-safe
//! via a seen-set, so any deep change fires the watcher.

use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use super::effect::{Effect, RawEffect, SchedulerFn};
use super::proxy::Proxy;
use super::runtime::Runtime;
use super::value::{TargetId, Value};

/// What a watcher observes: an explicit getter, or a value traversed deeply.
pub enum WatchSource {
    Getter(Rc<dyn Fn(&Runtime) -> Value>),
    Value(Value),
}

impl WatchSource {
    /// Watch the result of an arbitrary computation.
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn(&Runtime) -> Value + 'static,
    {
        WatchSource::Getter(Rc::new(f))
    }
}

impl From<Value> for WatchSource {
    fn from(v: Value) -> Self {
        WatchSource::Value(v)
    }
}

impl From<Proxy> for WatchSource {
    fn from(p: Proxy) -> Self {
        WatchSource::Value(Value::Proxy(p))
    }
}

/// When a watcher's callback runs relative to the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Run the callback synchronously inside the trigger.
    #[default]
    Sync,
    /// Defer the callback to the next queue flush, deduplicated per watcher.
    Post,
}

/// Configuration for [`Runtime::watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Fire the callback once at registration, with `Undefined` as the old
    /// value.
    pub immediate: bool,
    pub flush: FlushMode,
}

type CleanupSlot = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

/// Registrar handed to the callback for its invalidation hook.
pub struct OnInvalidate {
    slot: CleanupSlot,
}

impl OnInvalidate {
    /// Register a hook to run when this invocation is superseded. A second
    /// registration within the same invocation replaces the first.
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        *self.slot.borrow_mut() = Some(Box::new(f));
    }
}

type WatchCallback = Rc<dyn Fn(&Runtime, Value, Value, &OnInvalidate)>;

/// Handle to an active watcher.
pub struct Watcher {
    effect: Effect,
    cleanup: CleanupSlot,
}

impl Watcher {
    /// Stop watching: the underlying effect leaves every subscriber set and
    /// any pending invalidation hook is dropped unrun.
    pub fn stop(&self, rt: &Runtime) {
        self.effect.dispose(rt);
        self.cleanup.borrow_mut().take();
    }

    pub fn is_stopped(&self) -> bool {
        self.effect.is_disposed()
    }
}

impl Runtime {
    /// Watch `source`, invoking `callback(new, old, on_invalidate)` on
    /// change. See [`WatchOptions`] for timing control.
    pub fn watch<C>(
        &self,
        source: impl Into<WatchSource>,
        callback: C,
        options: WatchOptions,
    ) -> Watcher
    where
        C: Fn(&Runtime, Value, Value, &OnInvalidate) + 'static,
    {
        let getter: Rc<dyn Fn(&Runtime) -> Value> = match source.into() {
            WatchSource::Getter(g) => g,
            WatchSource::Value(v) => Rc::new(move |rt: &Runtime| {
                let mut seen = HashSet::new();
                traverse(rt, &v, &mut seen);
                v.clone()
            }),
        };
        let callback: WatchCallback = Rc::new(callback);
        let old_value = Rc::new(RefCell::new(Value::Undefined));
        let cleanup: CleanupSlot = Rc::new(RefCell::new(None));

        // The job re-reads the source through the effect, so the effect is
        // filled in behind a cell after construction.
        let effect_slot: Rc<OnceCell<Rc<RawEffect>>> = Rc::new(OnceCell::new());

        let job: Rc<dyn Fn(&Runtime)> = {
            let effect_slot = Rc::clone(&effect_slot);
            let old_value = Rc::clone(&old_value);
            let cleanup = Rc::clone(&cleanup);
            let callback = Rc::clone(&callback);
            Rc::new(move |rt: &Runtime| {
                let Some(effect) = effect_slot.get() else {
                    return;
                };
                if effect.is_disposed() {
                    return;
                }
                // The previous invocation's work is now superseded.
                if let Some(expire) = cleanup.borrow_mut().take() {
                    expire();
                }
                let new_value = effect.run(rt);
                let prev = old_value.borrow().clone();
                let registrar = OnInvalidate {
                    slot: Rc::clone(&cleanup),
                };
                callback(rt, new_value.clone(), prev, &registrar);
                *old_value.borrow_mut() = new_value;
            })
        };

        let scheduler: SchedulerFn = {
            let job = Rc::clone(&job);
            let flush = options.flush;
            Rc::new(move |rt: &Runtime, effect: &Effect| match flush {
                FlushMode::Post => rt.queue_job(effect.id().raw(), Rc::clone(&job)),
                FlushMode::Sync => job(rt),
            })
        };

        let raw = RawEffect::new(getter, Some(scheduler));
        self.register_effect(Rc::clone(&raw));
        let _ = effect_slot.set(Rc::clone(&raw));
        let effect = Effect::from_raw(raw);

        if options.immediate {
            job(self);
        } else {
            // Establish the old value and the initial dependency set without
            // invoking the callback.
            *old_value.borrow_mut() = effect.run(self);
        }

        Watcher { effect, cleanup }
    }
}

/// Visit every property reachable from `value` through tracked proxy reads.
fn traverse(rt: &Runtime, value: &Value, seen: &mut HashSet<TargetId>) {
    let proxy = match value {
        Value::Proxy(p) => p.clone(),
        // Raw targets are wrapped so their reads register dependencies too.
        Value::Obj(o) => rt.reactive(o),
        _ => return,
    };
    if !seen.insert(proxy.target().id()) {
        return;
    }
    for key in proxy.keys(rt) {
        let child = proxy.get(rt, key);
        traverse(rt, &child, seen);
    }
}
