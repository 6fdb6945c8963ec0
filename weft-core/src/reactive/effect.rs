//! Effect Runner
//!
//! An effect wraps a computation so that the properties it reads are
//! discovered dynamically on every run.
//!
//! # How Effects Work
//!
//! 1. Unless created lazy, the effect runs once at creation to establish its
//!    initial dependencies.
//!
//! 2. Before every run, the effect leaves all subscriber sets it joined in
//!    the previous run. Conditional branches therefore shrink the dependency
//!    set as soon as they stop being reached.
//!
//! 3. During the run the effect sits on the runtime's effect stack; reads
//!    performed by a nested effect track the nested effect, not this one.
//!
//! 4. When a dependency changes, the effect either runs directly or is
//!    handed to its configured scheduler, which decides how and when to
//!    re-run it (batching, laziness, deferral).
//!
//! # Disposal
//!
//! Effects are owned by the runtime until explicitly disposed. Disposal
//! removes the effect from every subscriber set and deregisters it; handles
//! are non-owning and may be cloned freely.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::runtime::{DepKey, Runtime};
use super::value::{TargetId, Value};

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

pub(crate) type EffectFn = Rc<dyn Fn(&Runtime) -> Value>;

/// Policy controlling how an effect re-runs on trigger. Receives the runtime
/// and a handle to the triggered effect.
pub type SchedulerFn = Rc<dyn Fn(&Runtime, &Effect)>;

pub(crate) struct RawEffect {
    id: EffectId,
    func: EffectFn,
    /// Subscriber sets joined during the last run, for cleanup.
    deps: RefCell<SmallVec<[(TargetId, DepKey); 4]>>,
    scheduler: RefCell<Option<SchedulerFn>>,
    disposed: Cell<bool>,
}

impl RawEffect {
    pub(crate) fn new(func: EffectFn, scheduler: Option<SchedulerFn>) -> Rc<Self> {
        Rc::new(Self {
            id: EffectId::new(),
            func,
            deps: RefCell::new(SmallVec::new()),
            scheduler: RefCell::new(scheduler),
            disposed: Cell::new(false),
        })
    }

    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn mark_disposed(&self) -> bool {
        self.disposed.replace(true)
    }

    pub(crate) fn record_dep(&self, target: TargetId, key: DepKey) {
        self.deps.borrow_mut().push((target, key));
    }

    pub(crate) fn take_deps(&self) -> SmallVec<[(TargetId, DepKey); 4]> {
        std::mem::take(&mut *self.deps.borrow_mut())
    }

    #[cfg(test)]
    pub(crate) fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    pub(crate) fn scheduler(&self) -> Option<SchedulerFn> {
        self.scheduler.borrow().clone()
    }

    /// Dropping the scheduler on disposal breaks the reference cycle formed
    /// by watcher jobs that capture their own effect.
    pub(crate) fn clear_scheduler(&self) {
        self.scheduler.borrow_mut().take();
    }

    /// Run the wrapped computation, re-collecting dependencies from scratch.
    pub(crate) fn run(self: &Rc<Self>, rt: &Runtime) -> Value {
        if self.disposed.get() {
            return Value::Undefined;
        }
        rt.cleanup_effect(self);
        let _scope = rt.enter_effect(Rc::clone(self));
        let _tracking = rt.resume_tracking();
        (self.func)(rt)
    }

    /// Hand the effect to its scheduler, or run it directly.
    pub(crate) fn dispatch(self: &Rc<Self>, rt: &Runtime) {
        match self.scheduler() {
            Some(scheduler) => {
                let handle = Effect::from_raw(Rc::clone(self));
                scheduler(rt, &handle);
            }
            None => {
                self.run(rt);
            }
        }
    }
}

/// Configuration for [`Runtime::effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Skip the initial run; the caller invokes the handle when needed.
    pub lazy: bool,
    /// Re-run policy invoked on trigger instead of running directly.
    pub scheduler: Option<SchedulerFn>,
}

/// Non-owning handle to a registered effect.
#[derive(Clone)]
pub struct Effect {
    raw: Rc<RawEffect>,
}

impl Effect {
    pub(crate) fn from_raw(raw: Rc<RawEffect>) -> Self {
        Self { raw }
    }

    pub(crate) fn raw(&self) -> &Rc<RawEffect> {
        &self.raw
    }

    pub fn id(&self) -> EffectId {
        self.raw.id()
    }

    /// Force a run, returning the computation's result. Used by lazy
    /// effects and by hosts that need manual recomputation.
    pub fn run(&self, rt: &Runtime) -> Value {
        self.raw.run(rt)
    }

    /// Permanently stop the effect: leave every subscriber set and
    /// deregister from the runtime. Safe to call more than once.
    pub fn dispose(&self, rt: &Runtime) {
        if self.raw.mark_disposed() {
            return;
        }
        rt.cleanup_effect(&self.raw);
        self.raw.clear_scheduler();
        rt.unregister_effect(self.raw.id());
    }

    pub fn is_disposed(&self) -> bool {
        self.raw.is_disposed()
    }
}

impl Runtime {
    /// Register a side-effecting computation and run it once to collect its
    /// initial dependencies.
    pub fn effect<F>(&self, f: F) -> Effect
    where
        F: Fn(&Runtime) + 'static,
    {
        self.effect_with(
            move |rt| {
                f(rt);
                Value::Undefined
            },
            EffectOptions::default(),
        )
    }

    /// Register a computation with explicit options. Non-lazy effects run
    /// once immediately; the handle can re-run the effect at any time.
    pub fn effect_with<F>(&self, f: F, options: EffectOptions) -> Effect
    where
        F: Fn(&Runtime) -> Value + 'static,
    {
        let EffectOptions { lazy, scheduler } = options;
        let raw = RawEffect::new(Rc::new(f), scheduler);
        self.register_effect(Rc::clone(&raw));
        let handle = Effect::from_raw(raw);
        if !lazy {
            handle.run(self);
        }
        handle
    }
}
