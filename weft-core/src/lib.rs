//! Weft Core
//!
//! This crate provides the reactive engine at the heart of the Weft UI
//! framework: fine-grained dependency tracking over observable values,
//! effect scheduling with per-flush batching, cached computed nodes and
//! watchers with deferred timing and invalidation.
//!
//! The renderer and component layers consume this engine purely through the
//! `reactive` module; nothing here touches a host environment.
//!
//! # Example
//!
//! ```rust
//! use weft_core::reactive::{ObjRef, Runtime, Value};
//!
//! let rt = Runtime::new();
//! let state = rt.reactive(&ObjRef::from_pairs([("count", Value::from(0))]));
//!
//! // Runs once now, and again whenever `count` changes.
//! let state_in = state.clone();
//! rt.effect(move |rt| {
//!     let count = state_in.get(rt, "count");
//!     println!("count is {count:?}");
//! });
//!
//! state.set(&rt, "count", Value::from(1));
//! ```

pub mod reactive;

pub use reactive::{
    Computed, Effect, EffectId, EffectOptions, FlushMode, Key, ObjRef, OnInvalidate, Proxy,
    ReactiveError, Runtime, Value, WatchOptions, WatchSource, Watcher,
};
