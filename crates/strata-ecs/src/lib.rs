#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::float_cmp)]

//! Strata ECS - archetype table storage.
//!
//! Entities are grouped into dense columnar tables by their exact set of
//! schemas. Tables are linked into an archetype graph by single-schema
//! edges, created lazily the first time a type is needed.
//!
//! # Key Concepts
//!
//! - **Schema**: the shape and storage kind of one component
//! - **Type**: a strictly ascending set of schema ids
//! - **Archetype**: the table holding every entity of one exact type
//! - **Query**: a live list of archetypes whose type covers a requested type
//!
//! # Threads
//!
//! Structural changes take `&mut World`. Column data can be read and written
//! through `&World` from any number of threads: every table sits behind a
//! re-entrant lock, so a thread iterating a table may also mutate it.
//!
//! ```
//! use strata_ecs::{Format, SchemaKind, Type, Value, World};
//!
//! let mut world = World::with_capacity(128);
//! let position = world.register_schema(SchemaKind::binary_struct([
//!     ("x", Format::Float32),
//!     ("y", Format::Float32),
//! ]));
//!
//! let ty = Type::from([position]);
//! let entity = world.make(&ty, None).unwrap();
//! world.write(entity, position, Value::record([("x", 1.0)])).unwrap();
//!
//! let query = world.query(&ty);
//! assert_eq!(query.len(&world), 1);
//! ```

mod archetype;
mod entity;
mod error;
mod format;
mod lock;
mod query;
mod schema;
mod signal;
mod storage;
mod table;
mod types;
mod world;

pub use archetype::{Archetype, ArchetypeCreated, ArchetypeGraph, ArchetypeId, TableGrown};
pub use entity::{Entity, EntityAllocator, EntityId, Generation};
pub use error::{EcsError, EcsResult};
pub use format::{Format, NumericBuffer, Scalar};
pub use lock::{IterGuard, LockFuture, TableGuard, lock_pair};
pub use query::{Not, Query, QueryRecord, RecordView};
pub use schema::{Schema, SchemaId, SchemaKind, SchemaRegistry, Shape, Value};
pub use signal::{Signal, SubscriberId};
pub use storage::Column;
pub use table::{InsertOutcome, Table, TableData};
pub use types::{Type, is_normalized};
pub use world::{World, WorldConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Entity, Format, Query, SchemaId, SchemaKind, Shape, Type, Value, World};
}
