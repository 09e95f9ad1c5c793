//! World - the main container for all storage state.
//!
//! The World owns the schema registry, the entity allocator, the archetype
//! graph and the entity location index. Structural changes (`make`, `set`,
//! `unset`, `destroy`) take `&mut self`; column reads and writes only need
//! `&self` and go through the table locks.

use crate::{
    archetype::{Archetype, ArchetypeGraph, ArchetypeId},
    entity::{Entity, EntityAllocator},
    error::{EcsError, EcsResult},
    lock::lock_pair,
    query::Query,
    schema::{Schema, SchemaId, SchemaKind, SchemaRegistry, Value},
    types::Type,
};

/// World configuration.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Maximum number of simultaneously alive entities. Also the row
    /// capacity of every binary column.
    pub entity_capacity: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 10_000,
        }
    }
}

/// The storage world.
pub struct World {
    config: WorldConfig,
    /// Schema registry.
    schemas: SchemaRegistry,
    /// Entity ID allocator.
    entities: EntityAllocator,
    /// Archetype of each placed entity, indexed by entity ID.
    locations: Vec<Option<ArchetypeId>>,
    /// Archetype graph.
    graph: ArchetypeGraph,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    /// Create an empty world. Every buffer is sized up front.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        let capacity = config.entity_capacity;
        tracing::debug!(capacity, "creating world");
        Self {
            schemas: SchemaRegistry::new(),
            entities: EntityAllocator::with_capacity(capacity),
            locations: vec![None; capacity as usize],
            graph: ArchetypeGraph::new(capacity as usize),
            config,
        }
    }

    /// Create an empty world holding at most `capacity` entities.
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        Self::new(WorldConfig {
            entity_capacity: capacity,
        })
    }

    /// The configuration this world was created with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Maximum number of simultaneously alive entities.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.config.entity_capacity
    }

    // ==================== Schema Operations ====================

    /// Register a schema under the next free id.
    pub fn register_schema(&mut self, kind: SchemaKind) -> SchemaId {
        self.schemas.register(kind)
    }

    /// Register a schema under a specific id.
    pub fn register_schema_with_id(&mut self, id: SchemaId, kind: SchemaKind) -> EcsResult<SchemaId> {
        self.schemas.register_with_id(id, kind)
    }

    /// Get a schema by ID.
    #[must_use]
    pub fn schema(&self, id: SchemaId) -> Option<&Schema> {
        self.schemas.get(id)
    }

    /// The schema registry.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    // ==================== Entity Operations ====================

    /// Create an entity with the schemas in `ty`.
    ///
    /// `data` holds one value per schema of `ty`, in type order; `None`
    /// entries (or no data at all) take the schema's zero value.
    pub fn make(&mut self, ty: &Type, data: Option<&[Option<Value>]>) -> EcsResult<Entity> {
        let values = self.resolve_data(ty, data)?;
        let archetype = self.graph.find_or_make(ty, &self.schemas)?;
        let entity = self.entities.allocate()?;
        self.place(entity, archetype, values);
        Ok(entity)
    }

    /// Reserve an entity id without placing it in any archetype.
    ///
    /// Callable from any thread. The entity counts as alive but has no type
    /// until [`World::make_reserved`] places it.
    pub fn reserve_entity(&self) -> EcsResult<Entity> {
        self.entities.allocate()
    }

    /// Place a reserved entity.
    pub fn make_reserved(
        &mut self,
        entity: Entity,
        ty: &Type,
        data: Option<&[Option<Value>]>,
    ) -> EcsResult<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        if self.locations[entity.id() as usize].is_some() {
            return Err(EcsError::AlreadyPlaced(entity));
        }
        let values = self.resolve_data(ty, data)?;
        let archetype = self.graph.find_or_make(ty, &self.schemas)?;
        self.place(entity, archetype, values);
        Ok(())
    }

    /// Add the schemas of `add` to an entity.
    ///
    /// `data` is parallel to `add`. Newly added schemas take their value (or
    /// zero); schemas the entity already has are overwritten only when a
    /// value is supplied, and keep their data otherwise.
    pub fn set(&mut self, entity: Entity, add: &Type, data: Option<&[Option<Value>]>) -> EcsResult<()> {
        let from = self.location(entity)?;
        let values = self.resolve_data(add, data)?;

        let prev = self.graph[from].ty();
        let mut added = Vec::new();
        let mut overwrite = Vec::new();
        for (i, (&id, value)) in add.iter().zip(values).enumerate() {
            if !prev.contains(id) {
                added.push(value);
            } else if data.is_some_and(|data| data[i].is_some()) {
                overwrite.push((id, value));
            }
        }

        if !added.is_empty() {
            let to = self.graph.traverse_set(from, add, &self.schemas)?;
            self.relocate(entity, from, to, added)?;
        }
        for (id, value) in overwrite {
            self.write_resolved(entity, id, value)?;
        }
        Ok(())
    }

    /// Remove the schemas of `remove` from an entity.
    ///
    /// Schemas the entity does not have are ignored.
    pub fn unset(&mut self, entity: Entity, remove: &Type) -> EcsResult<()> {
        let from = self.location(entity)?;
        let prev = self.graph[from].ty();
        if !remove.iter().any(|&id| prev.contains(id)) {
            return Ok(());
        }

        let to = self.graph.traverse_unset(from, remove, &self.schemas)?;
        self.relocate(entity, from, to, Vec::new())
    }

    /// Remove an entity from the world.
    ///
    /// The id's generation is bumped, so the handle is stale afterwards.
    pub fn destroy(&mut self, entity: Entity) -> EcsResult<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }

        if let Some(archetype) = self.locations[entity.id() as usize].take() {
            self.graph[archetype]
                .table()
                .lock()
                .data_mut()
                .remove(entity)?;
        }
        self.entities.deallocate(entity);

        tracing::trace!(%entity, "destroyed entity");
        Ok(())
    }

    /// Check if the entity's type covers every schema of `ty`.
    pub fn has(&self, entity: Entity, ty: &Type) -> EcsResult<bool> {
        Ok(self.type_of(entity)?.is_equal_or_superset_of(ty))
    }

    /// Read an entity's values for the schemas of `ty`, in type order.
    ///
    /// Tags, and schemas the entity does not have, read as `None`.
    pub fn get(&self, entity: Entity, ty: &Type) -> EcsResult<Vec<Option<Value>>> {
        let archetype = &self.graph[self.location(entity)?];
        let guard = archetype.table().lock();
        let data = guard.try_data()?;
        let row = data
            .row_of(entity)
            .ok_or(EcsError::EntityNotFound(entity))?;

        Ok(ty
            .iter()
            .map(|&id| {
                archetype
                    .ty()
                    .position(id)
                    .and_then(|column| data.columns()[column].read(row))
            })
            .collect())
    }

    /// Overwrite one value of an entity in place.
    ///
    /// Takes `&self`: safe to call while other threads iterate, and from
    /// inside a query pass over the entity's own table.
    pub fn write(&self, entity: Entity, schema: SchemaId, value: impl Into<Value>) -> EcsResult<()> {
        let value = self.schemas.require(schema)?.resolve(Some(value.into()))?;
        self.write_resolved(entity, schema, value)
    }

    /// The entity's current type.
    pub fn type_of(&self, entity: Entity) -> EcsResult<&Type> {
        Ok(self.graph[self.location(entity)?].ty())
    }

    /// Check if the entity is alive (reserved or placed).
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of alive entities, reserved ones included.
    #[must_use]
    pub fn entity_count(&self) -> u32 {
        self.entities.alive_count()
    }

    /// Archetype currently holding the entity.
    pub fn location(&self, entity: Entity) -> EcsResult<ArchetypeId> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        self.locations[entity.id() as usize].ok_or(EcsError::EntityNotFound(entity))
    }

    fn resolve_data(&self, ty: &Type, data: Option<&[Option<Value>]>) -> EcsResult<Vec<Option<Value>>> {
        match data {
            None => ty
                .iter()
                .map(|&id| Ok(self.schemas.require(id)?.default_value()))
                .collect(),
            Some(values) => {
                if values.len() != ty.len() {
                    return Err(EcsError::DataLength {
                        expected: ty.len(),
                        got: values.len(),
                    });
                }
                ty.iter()
                    .zip(values)
                    .map(|(&id, value)| self.schemas.require(id)?.resolve(value.clone()))
                    .collect()
            }
        }
    }

    fn place(&mut self, entity: Entity, archetype: ArchetypeId, values: Vec<Option<Value>>) {
        let target = &self.graph[archetype];
        let outcome = target.table().lock().data_mut().insert(entity, values);
        target.notify(outcome);

        self.locations[entity.id() as usize] = Some(archetype);
        tracing::trace!(%entity, ?archetype, row = outcome.row, "placed entity");
    }

    fn relocate(
        &mut self,
        entity: Entity,
        from: ArchetypeId,
        to: ArchetypeId,
        added: Vec<Option<Value>>,
    ) -> EcsResult<()> {
        let prev = &self.graph[from];
        let next = &self.graph[to];

        let (prev_guard, next_guard) = lock_pair(prev.table(), next.table());
        let outcome = prev_guard.data_mut().move_to(
            &mut next_guard.data_mut(),
            entity,
            prev.ty(),
            next.ty(),
            added,
        )?;
        drop((prev_guard, next_guard));
        next.notify(outcome);

        self.locations[entity.id() as usize] = Some(to);
        tracing::trace!(%entity, ?from, ?to, "moved entity");
        Ok(())
    }

    fn write_resolved(&self, entity: Entity, schema: SchemaId, value: Option<Value>) -> EcsResult<()> {
        let archetype = &self.graph[self.location(entity)?];
        let column = archetype
            .ty()
            .position(schema)
            .ok_or(EcsError::MissingSchema { entity, schema })?;

        let guard = archetype.table().lock();
        let mut data = guard.try_data_mut()?;
        let row = data
            .row_of(entity)
            .ok_or(EcsError::EntityNotFound(entity))?;
        data.columns_mut()[column].write(row, value);
        Ok(())
    }

    // ==================== Archetype Access ====================

    /// The archetype graph.
    #[must_use]
    pub const fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    /// The archetype graph, for subscribing to its signals.
    #[must_use]
    pub fn graph_mut(&mut self) -> &mut ArchetypeGraph {
        &mut self.graph
    }

    /// Get an archetype by ID.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.graph.get(id)
    }

    /// Get a mutable archetype by ID.
    #[must_use]
    pub fn archetype_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.graph.get_mut(id)
    }

    /// Iterate over all archetypes in creation order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.graph.iter()
    }

    /// Find the archetype for a type, if it exists.
    #[must_use]
    pub fn find_archetype(&self, ty: &Type) -> Option<ArchetypeId> {
        self.graph.find(ty)
    }

    /// Get the archetype for a type, creating it if needed.
    pub fn find_or_make_archetype(&mut self, ty: &Type) -> EcsResult<ArchetypeId> {
        self.graph.find_or_make(ty, &self.schemas)
    }

    // ==================== Query ====================

    /// Make a live query for every entity whose type covers `ty`.
    pub fn query(&mut self, ty: &Type) -> Query {
        Query::make(self, ty.clone())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("entities", &self.entities.alive_count())
            .field("schemas", &self.schemas.len())
            .field("archetypes", &self.graph.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{archetype::TableGrown, format::Format, schema::Shape};

    struct Schemas {
        squad: SchemaId,
        tag: SchemaId,
        scalar: SchemaId,
        vec2: SchemaId,
    }

    fn setup(capacity: u32) -> (World, Schemas) {
        let mut world = World::with_capacity(capacity);
        let squad = world.register_schema(SchemaKind::native_object([(
            "squad",
            Shape::Scalar(Format::Int32),
        )]));
        let tag = world.register_schema(SchemaKind::Tag);
        let scalar = world.register_schema(SchemaKind::BinaryScalar(Format::Uint8));
        let vec2 = world.register_schema(SchemaKind::binary_struct([
            ("x", Format::Float32),
            ("y", Format::Float32),
        ]));
        (
            world,
            Schemas {
                squad,
                tag,
                scalar,
                vec2,
            },
        )
    }

    #[test]
    fn test_make_defaults() {
        let (mut world, s) = setup(16);
        let ty = Type::from([s.squad, s.tag, s.scalar, s.vec2]);

        let e = world.make(&ty, None).unwrap();

        assert_eq!(
            world.get(e, &ty).unwrap(),
            [
                Some(Value::record([("squad", 0.0)])),
                None,
                Some(Value::Number(0.0)),
                Some(Value::record([("x", 0.0), ("y", 0.0)])),
            ]
        );
        assert!(world.has(e, &ty).unwrap());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_make_with_data() {
        let (mut world, s) = setup(16);
        let ty = Type::from([s.scalar, s.vec2]);

        let e = world
            .make(
                &ty,
                Some(&[
                    Some(Value::Number(7.0)),
                    Some(Value::record([("y", 2.5)])),
                ]),
            )
            .unwrap();

        assert_eq!(
            world.get(e, &ty).unwrap(),
            [
                Some(Value::Number(7.0)),
                Some(Value::record([("x", 0.0), ("y", 2.5)])),
            ]
        );
    }

    #[test]
    fn test_make_rejects_bad_data() {
        let (mut world, s) = setup(16);
        let ty = Type::from([s.scalar, s.vec2]);

        let err = world.make(&ty, Some(&[None])).unwrap_err();
        assert!(matches!(err, EcsError::DataLength { expected: 2, got: 1 }));

        let err = world
            .make(&ty, Some(&[Some(Value::record([("x", 1.0)])), None]))
            .unwrap_err();
        assert!(matches!(err, EcsError::ShapeMismatch { schema } if schema == s.scalar));

        let err = world
            .make(&Type::from([SchemaId::from_raw(77)]), None)
            .unwrap_err();
        assert!(matches!(err, EcsError::SchemaNotFound(_)));

        // Nothing was allocated by the failed calls.
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_set_preserves_existing_data() {
        let (mut world, s) = setup(16);
        let e = world
            .make(
                &Type::from([s.scalar, s.vec2]),
                Some(&[Some(Value::Number(3.0)), Some(Value::record([("x", 1.0), ("y", 2.0)]))]),
            )
            .unwrap();

        world
            .set(e, &Type::from([s.squad]), Some(&[Some(Value::record([("squad", 9.0)]))]))
            .unwrap();

        let full = Type::from([s.squad, s.scalar, s.vec2]);
        assert_eq!(world.type_of(e).unwrap(), &full);
        assert_eq!(
            world.get(e, &full).unwrap(),
            [
                Some(Value::record([("squad", 9.0)])),
                Some(Value::Number(3.0)),
                Some(Value::record([("x", 1.0), ("y", 2.0)])),
            ]
        );
    }

    #[test]
    fn test_set_existing_schema_overwrites_only_when_given() {
        let (mut world, s) = setup(16);
        let ty = Type::from([s.scalar]);
        let e = world.make(&ty, Some(&[Some(Value::Number(5.0))])).unwrap();
        let archetype = world.location(e).unwrap();

        world.set(e, &ty, None).unwrap();
        assert_eq!(world.get(e, &ty).unwrap(), [Some(Value::Number(5.0))]);

        world.set(e, &ty, Some(&[Some(Value::Number(6.0))])).unwrap();
        assert_eq!(world.get(e, &ty).unwrap(), [Some(Value::Number(6.0))]);
        assert_eq!(world.location(e).unwrap(), archetype);
    }

    #[test]
    fn test_unset_round_trip() {
        let (mut world, s) = setup(16);
        let base = Type::from([s.scalar]);
        let e = world.make(&base, Some(&[Some(Value::Number(4.0))])).unwrap();
        let origin = world.location(e).unwrap();

        world.set(e, &Type::from([s.tag, s.vec2]), None).unwrap();
        world.unset(e, &Type::from([s.tag, s.vec2])).unwrap();

        assert_eq!(world.location(e).unwrap(), origin);
        assert_eq!(world.get(e, &base).unwrap(), [Some(Value::Number(4.0))]);

        // Removing something the entity lacks is a no-op.
        world.unset(e, &Type::from([s.squad])).unwrap();
        assert_eq!(world.location(e).unwrap(), origin);

        world.unset(e, &base).unwrap();
        assert_eq!(world.location(e).unwrap(), ArchetypeId::ROOT);
    }

    #[test]
    fn test_moved_entity_index_stays_valid() {
        let (mut world, s) = setup(16);
        let ty = Type::from([s.scalar]);
        let entities: Vec<_> = (0..4)
            .map(|i| world.make(&ty, Some(&[Some(Value::from(i))])).unwrap())
            .collect();

        // Moving the first entity swaps the last one into its row.
        world.set(entities[0], &Type::from([s.tag]), None).unwrap();

        for (i, &e) in entities.iter().enumerate() {
            assert_eq!(world.get(e, &ty).unwrap(), [Some(Value::Number(i as f64))]);
        }
    }

    #[test]
    fn test_destroy_invalidates_handle() {
        let (mut world, s) = setup(16);
        let ty = Type::from([s.scalar]);
        let e = world.make(&ty, None).unwrap();

        world.destroy(e).unwrap();

        assert!(!world.is_alive(e));
        assert!(matches!(world.get(e, &ty), Err(EcsError::EntityNotFound(_))));
        assert!(matches!(world.set(e, &ty, None), Err(EcsError::EntityNotFound(_))));
        assert!(matches!(world.destroy(e), Err(EcsError::EntityNotFound(_))));

        // The id is reused with a new generation.
        let again = world.make(&ty, None).unwrap();
        assert_ne!(again, e);
        assert!(world.is_alive(again));
    }

    #[test]
    fn test_capacity_exhausted() {
        let (mut world, s) = setup(3);
        let ty = Type::from([s.tag]);
        for _ in 0..3 {
            world.make(&ty, None).unwrap();
        }

        let err = world.make(&ty, None).unwrap_err();
        assert!(matches!(err, EcsError::CapacityExhausted { capacity: 3 }));
    }

    #[test]
    fn test_write_in_place() {
        let (mut world, s) = setup(16);
        let e = world.make(&Type::from([s.vec2]), None).unwrap();

        world.write(e, s.vec2, Value::record([("x", 8.0)])).unwrap();
        assert_eq!(
            world.get(e, &Type::from([s.vec2])).unwrap(),
            [Some(Value::record([("x", 8.0), ("y", 0.0)]))]
        );

        let err = world.write(e, s.scalar, 1).unwrap_err();
        assert!(matches!(err, EcsError::MissingSchema { .. }));
    }

    #[test]
    fn test_reserved_entities() {
        let (mut world, s) = setup(16);
        let ty = Type::from([s.scalar]);

        let e = world.reserve_entity().unwrap();
        assert!(world.is_alive(e));
        assert!(world.type_of(e).is_err());

        world.make_reserved(e, &ty, None).unwrap();
        assert_eq!(world.type_of(e).unwrap(), &ty);
        assert!(matches!(
            world.make_reserved(e, &ty, None),
            Err(EcsError::AlreadyPlaced(_))
        ));
    }

    #[test]
    fn test_realize_and_grow_signals() {
        let (mut world, s) = setup(64);
        let ty = Type::from([s.scalar]);
        let archetype = world.find_or_make_archetype(&ty).unwrap();

        let realized = Arc::new(AtomicUsize::new(0));
        let grown = Arc::new(parking_lot::Mutex::new(Vec::<TableGrown>::new()));
        {
            let realized = Arc::clone(&realized);
            let grown = Arc::clone(&grown);
            let target = world.archetype_mut(archetype).unwrap();
            target.on_realize(move |_| {
                realized.fetch_add(1, Ordering::SeqCst);
            });
            target.on_grow(move |event| grown.lock().push(*event));
        }

        for _ in 0..10 {
            world.make(&ty, None).unwrap();
        }

        assert_eq!(realized.load(Ordering::SeqCst), 1);
        let grown = grown.lock();
        assert!(!grown.is_empty());
        assert!(grown.iter().all(|event| event.archetype == archetype));
        assert!(grown.windows(2).all(|pair| pair[0].capacity < pair[1].capacity));
    }
}
