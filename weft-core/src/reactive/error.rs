//! Error types for the reactive engine.
//!
//! The engine is deliberately quiet about recoverable conditions: readonly
//! writes and missing store entries are diagnostics or no-ops, and panics
//! from user computations propagate untouched. The only fallible surface is
//! the array instrumentation, which has nothing sensible to do on a map
//! target.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReactiveError {
    /// An array operation was invoked on a target that is not an array.
    #[error("target is not an array")]
    NotAnArray,
}
