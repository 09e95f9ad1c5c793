//! Storage error types.

use thiserror::Error;

use crate::{archetype::ArchetypeId, entity::Entity, schema::SchemaId};

/// Errors raised by the storage core.
///
/// `EntityNotFound`, `CapacityExhausted` and `SchemaCollision` are the
/// recoverable conditions a caller is expected to handle. The remaining
/// variants report programming errors (bad types, data that does not match a
/// schema) and should abort whatever operation produced them.
#[derive(Debug, Error)]
pub enum EcsError {
    /// The entity is not alive, or has never been placed in a table.
    #[error("entity not found: {0}")]
    EntityNotFound(Entity),

    /// Every id in the configured entity capacity is in use.
    #[error("entity capacity exhausted: all {capacity} ids are in use")]
    CapacityExhausted { capacity: u32 },

    /// A schema was registered under an id that is already taken.
    #[error("schema id collision: {0:?} is already registered")]
    SchemaCollision(SchemaId),

    /// A type referenced a schema id that was never registered.
    #[error("schema not found: {0:?}")]
    SchemaNotFound(SchemaId),

    /// A reserved entity was placed twice.
    #[error("{0} is already placed in an archetype")]
    AlreadyPlaced(Entity),

    /// The entity does not carry the schema it was asked to write.
    #[error("{entity} does not have schema {schema:?}")]
    MissingSchema { entity: Entity, schema: SchemaId },

    /// A type was not strictly ascending.
    #[error("type is not normalized: {0:?}")]
    UnnormalizedType(Vec<u32>),

    /// A value does not fit the shape of its schema.
    #[error("value does not match the shape of schema {schema:?}")]
    ShapeMismatch { schema: SchemaId },

    /// Row data was supplied for the wrong number of schemas.
    #[error("expected data for {expected} schemas, got {got}")]
    DataLength { expected: usize, got: usize },

    /// The calling thread already borrows this table's data, for example
    /// through [`RecordView::with_columns`](crate::RecordView::with_columns).
    #[error("table of {0:?} is already borrowed on this thread")]
    TableBorrowed(ArchetypeId),

    /// A timed table lock acquisition gave up.
    #[error("timed out waiting for a table lock")]
    LockTimeout,
}

/// Result type for storage operations.
pub type EcsResult<T> = Result<T, EcsError>;
