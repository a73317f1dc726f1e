//! Identifier generators.

use uuid::Uuid;

use crate::IdError;

/// Produces fresh, globally unique tokens on demand.
///
/// Failures are returned to the caller; generators never retry.
pub trait IdGenerator: Send + Sync {
    /// Generate a new identifier.
    fn generate(&self) -> Result<String, IdError>;
}

/// UUIDv4 generator backed by the OS random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl UuidGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> Result<String, IdError> {
        Ok(Uuid::new_v4().to_string())
    }
}
