//! Deferred entity operations for strata-ecs.
//!
//! Worker threads that only hold `&World` cannot change an entity's type.
//! They record `set`, `unset`, `destroy` and `make` in a [`Cache`] instead;
//! whoever owns the world later calls [`Cache::apply`] to replay them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Cache                                                              │
//! │    - One delta buffer per thread, no locking on push                │
//! │    - Deltas stamped from a shared counter (issue order)             │
//! └─────────────────────────────────────────────────────────────────────┘
//!                              │ apply(&mut World)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  EntityDelta per entity                                             │
//! │    - Later set/unset of a schema replaces the earlier one           │
//! │    - Destroy wins                                                   │
//! │    - Replayed in ascending entity id order via the World API        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use strata_cache::Cache;
//! use strata_ecs::{SchemaKind, Type, World};
//!
//! let mut world = World::with_capacity(10);
//! let tag = world.register_schema(SchemaKind::Tag);
//! let ty = Type::from([tag]);
//!
//! let mut cache = Cache::new();
//! let entity = cache.make(&world, &ty, None).unwrap();
//! assert!(world.type_of(entity).is_err());
//!
//! cache.apply(&mut world).unwrap();
//! assert!(world.has(entity, &ty).unwrap());
//! ```

mod buffer;
mod delta;
mod error;

use std::collections::BTreeMap;

pub use buffer::{Delta, DeltaBuffers};
pub use delta::EntityDelta;
pub use error::{CacheError, CacheResult};
use strata_ecs::{EcsError, Entity, EntityId, Type, Value, World};

/// Buffered structural operations against one world.
///
/// Recording takes `&self` and is safe from any thread.
#[derive(Default)]
pub struct Cache {
    buffers: DeltaBuffers,
}

impl Cache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer adding the schemas of `ty` to `entity`.
    pub fn set(&self, entity: Entity, ty: &Type, data: Option<&[Option<Value>]>) -> CacheResult<()> {
        let data = owned_data(ty, data)?;
        self.buffers.push(Delta::Set {
            entity,
            ty: ty.clone(),
            data,
        });
        Ok(())
    }

    /// Buffer removing the schemas of `ty` from `entity`.
    pub fn unset(&self, entity: Entity, ty: &Type) {
        self.buffers.push(Delta::Unset {
            entity,
            ty: ty.clone(),
        });
    }

    /// Buffer destroying `entity`.
    pub fn destroy(&self, entity: Entity) {
        self.buffers.push(Delta::Destroy { entity });
    }

    /// Reserve an entity now and buffer placing it with the schemas of `ty`.
    ///
    /// The entity is alive immediately but has no type until applied.
    pub fn make(&self, world: &World, ty: &Type, data: Option<&[Option<Value>]>) -> CacheResult<Entity> {
        let data = owned_data(ty, data)?;
        let entity = world.reserve_entity()?;
        self.buffers.push(Delta::Make {
            entity,
            ty: ty.clone(),
            data,
        });
        Ok(entity)
    }

    /// Number of buffered deltas across all threads.
    pub fn pending(&mut self) -> usize {
        self.buffers.total_pending()
    }

    /// Drop every buffered delta without applying it.
    ///
    /// Entities reserved by [`Cache::make`] and not yet placed are destroyed,
    /// returning their ids to the world. Returns how many were released.
    pub fn clear(&mut self, world: &mut World) -> usize {
        let mut released = 0;
        for delta in self.buffers.collect_all() {
            let Delta::Make { entity, .. } = delta else {
                continue;
            };
            let unplaced = world.is_alive(entity) && world.location(entity).is_err();
            if unplaced && world.destroy(entity).is_ok() {
                released += 1;
            }
        }
        tracing::debug!(released, "cleared cache");
        released
    }

    /// Replay every buffered delta against `world` and clear the buffers.
    ///
    /// Deltas are merged per entity first, then replayed in ascending entity
    /// id order. Every merged delta is checked against the world (liveness,
    /// placement, schema ids, value shapes) before anything is replayed. On a
    /// failed check the world is untouched and every delta stays buffered.
    ///
    /// Returns the number of entities touched.
    pub fn apply(&mut self, world: &mut World) -> CacheResult<usize> {
        let deltas = self.buffers.collect_all();

        let mut merged: BTreeMap<EntityId, (Entity, EntityDelta)> = BTreeMap::new();
        for delta in &deltas {
            let entity = delta.entity();
            let (_, pending) = merged
                .entry(entity.id())
                .or_insert_with(|| (entity, EntityDelta::default()));
            pending.merge(delta.clone());
        }

        if let Err(err) = merged
            .values()
            .try_for_each(|(entity, pending)| check(world, *entity, pending))
        {
            tracing::debug!(%err, deltas = deltas.len(), "cache apply rejected");
            self.buffers.restore(deltas);
            return Err(err);
        }

        let touched = merged.len();
        for (entity, pending) in merged.into_values() {
            replay(world, entity, &pending)?;
        }

        tracing::debug!(entities = touched, "applied cache");
        Ok(touched)
    }
}

/// Everything `replay` could trip over, checked without mutating the world.
fn check(world: &World, entity: Entity, pending: &EntityDelta) -> CacheResult<()> {
    if !world.is_alive(entity) {
        return Err(CacheError::UnknownEntity(entity));
    }
    if pending.destroyed {
        return Ok(());
    }

    let placed = world.location(entity).is_ok();
    if pending.created && placed {
        return Err(EcsError::AlreadyPlaced(entity).into());
    }
    if !pending.created && !placed {
        return Err(CacheError::UnknownEntity(entity));
    }

    let schemas = world.schemas();
    for (&id, value) in &pending.sets {
        schemas.require(id)?.resolve(value.clone())?;
    }
    if !pending.created {
        for &id in &pending.unsets {
            schemas.require(id)?;
        }
    }
    Ok(())
}

fn owned_data(ty: &Type, data: Option<&[Option<Value>]>) -> CacheResult<Option<Vec<Option<Value>>>> {
    match data {
        Some(values) if values.len() != ty.len() => Err(EcsError::DataLength {
            expected: ty.len(),
            got: values.len(),
        }
        .into()),
        data => Ok(data.map(<[_]>::to_vec)),
    }
}

fn replay(world: &mut World, entity: Entity, pending: &EntityDelta) -> Result<(), EcsError> {
    if pending.destroyed {
        return world.destroy(entity);
    }

    let (set_ty, set_data) = pending.set_type();
    if pending.created {
        return world.make_reserved(entity, &set_ty, Some(set_data.as_slice()));
    }

    if !set_ty.is_empty() {
        world.set(entity, &set_ty, Some(set_data.as_slice()))?;
    }
    let unset_ty = pending.unset_type();
    if !unset_ty.is_empty() {
        world.unset(entity, &unset_ty)?;
    }
    Ok(())
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}
