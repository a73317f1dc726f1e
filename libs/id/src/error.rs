//! Error types for identifier generation.

use thiserror::Error;

/// Errors that can occur when generating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The generator has no more identifiers to hand out.
    #[error("identifier generator exhausted")]
    Exhausted,

    /// The generator could not produce an identifier.
    #[error("identifier generator unavailable: {0}")]
    Unavailable(String),
}
