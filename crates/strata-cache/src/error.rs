//! Cache error types.

use strata_ecs::{EcsError, Entity};
use thiserror::Error;

/// Cache error type.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Replaying a delta against the world failed.
    #[error("world error: {0}")]
    Ecs(#[from] EcsError),

    /// A delta addresses an entity that is neither alive nor buffered for creation.
    #[error("unknown entity: {0}")]
    UnknownEntity(Entity),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
