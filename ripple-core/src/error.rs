//! Error types for ripple-core.
//!
//! The reactive engine itself never fails: writes to readonly wrappers are
//! ignored, wrapping a primitive returns it unchanged, and re-entrant effects
//! are short-circuited. Errors only arise at the edges, when converting
//! dynamic values into Rust types or serializing them.

use thiserror::Error;

use crate::value::ObjectId;

/// Result type for ripple-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ripple-core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A value did not have the expected dynamic type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The object graph refers back to an object already being serialized.
    #[error("cannot serialize a cyclic object graph (object {0} is its own ancestor)")]
    Cyclic(ObjectId),
}
