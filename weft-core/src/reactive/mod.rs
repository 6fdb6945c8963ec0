//! Reactive Primitives
//!
//! This module implements the core reactive system: observable values,
//! proxies, effects, computed nodes and watchers, coordinated by a
//! [`Runtime`] that owns the per-property dependency graph.
//!
//! # Concepts
//!
//! ## Proxies
//!
//! A [`Proxy`] is a reactive view of an observable target (a map or a
//! list). Reads performed while an effect is running register that effect
//! as a subscriber of the exact property read; mutations notify exactly the
//! subscribers of what changed, including the structural subscribers implied
//! by key additions, deletions and array growth.
//!
//! ## Effects
//!
//! An [`Effect`] is a re-runnable computation whose dependencies are
//! rediscovered on every run: conditional branches that stop being reached
//! stop being dependencies. Effects can delegate their re-run policy to a
//! scheduler, which is how batching, computed laziness and watcher timing
//! are all built.
//!
//! ## Computed and Watch
//!
//! [`Computed`] nodes cache a derived value behind a dirty flag and
//! recompute on demand. [`Runtime::watch`] turns changes of a source into
//! callback invocations with old/new values, deferred flushing and
//! cooperative invalidation.
//!
//! # Implementation Notes
//!
//! All engine state lives in the [`Runtime`]; there are no ambient globals,
//! so independent runtimes can coexist and tests stay isolated. The design
//! follows the automatic dependency tracking approach used by fine-grained
//! reactive UI frameworks: an effect stack provides the tracking context,
//! and a cleanup-before-run discipline keeps the dependency graph exact.

mod array;
mod computed;
mod effect;
mod error;
mod proxy;
mod runtime;
mod scheduler;
pub mod value;
mod watch;

pub use computed::Computed;
pub use effect::{Effect, EffectId, EffectOptions, SchedulerFn};
pub use error::ReactiveError;
pub use proxy::Proxy;
pub use runtime::Runtime;
pub use value::{Key, ObjData, ObjRef, TargetId, Value};
pub use watch::{FlushMode, OnInvalidate, WatchOptions, WatchSource, Watcher};
