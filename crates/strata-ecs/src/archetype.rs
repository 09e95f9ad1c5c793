//! Archetypes and the archetype graph.
//!
//! An archetype owns the table for one exact type. Archetypes are connected
//! by single-schema edges: `edges_set[id]` leads to the archetype with `id`
//! added, `edges_unset[id]` to the one with `id` removed. The graph only
//! grows: archetypes and edges are created the first time a type is needed
//! and are never removed, so edges and query caches never go stale.

use std::{fmt, ops::Index};

use rustc_hash::FxHashMap;

use crate::{
    error::EcsResult,
    schema::{SchemaId, SchemaRegistry},
    signal::{Signal, SubscriberId},
    table::{InsertOutcome, Table},
    types::Type,
};

/// Unique identifier for an archetype.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The root archetype (empty type).
    pub const ROOT: Self = Self(0);

    /// Create an archetype ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

/// Published when the graph creates an archetype.
#[derive(Debug, Clone)]
pub struct ArchetypeCreated {
    pub id: ArchetypeId,
    pub ty: Type,
}

/// Published when a table's entity array reallocates.
///
/// Anything caching pointers into the table must reload them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableGrown {
    pub archetype: ArchetypeId,
    pub capacity: usize,
}

/// An archetype - the table for one type plus its graph edges.
pub struct Archetype {
    id: ArchetypeId,
    table: Table,
    edges_set: FxHashMap<SchemaId, ArchetypeId>,
    edges_unset: FxHashMap<SchemaId, ArchetypeId>,
    on_realize: Signal<ArchetypeId>,
    on_grow: Signal<TableGrown>,
}

impl Archetype {
    fn new(id: ArchetypeId, table: Table) -> Self {
        Self {
            id,
            table,
            edges_set: FxHashMap::default(),
            edges_unset: FxHashMap::default(),
            on_realize: Signal::new(),
            on_grow: Signal::new(),
        }
    }

    /// Get the archetype ID.
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The archetype's type.
    #[must_use]
    pub const fn ty(&self) -> &Type {
        self.table.ty()
    }

    /// The archetype's table.
    #[must_use]
    pub const fn table(&self) -> &Table {
        &self.table
    }

    /// Archetype reached by adding `id`, if that edge exists yet.
    #[must_use]
    pub fn edge_set(&self, id: SchemaId) -> Option<ArchetypeId> {
        self.edges_set.get(&id).copied()
    }

    /// Archetype reached by removing `id`, if that edge exists yet.
    #[must_use]
    pub fn edge_unset(&self, id: SchemaId) -> Option<ArchetypeId> {
        self.edges_unset.get(&id).copied()
    }

    /// Number of entities in the archetype.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if the archetype holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the archetype has ever held an entity.
    pub fn is_real(&self) -> bool {
        self.table.lock().data().is_real()
    }

    /// Subscribe to the archetype's first insert.
    pub fn on_realize<F>(&mut self, callback: F) -> SubscriberId
    where
        F: Fn(&ArchetypeId) + Send + Sync + 'static,
    {
        self.on_realize.subscribe(callback)
    }

    /// Subscribe to reallocations of the archetype's entity array.
    pub fn on_grow<F>(&mut self, callback: F) -> SubscriberId
    where
        F: Fn(&TableGrown) + Send + Sync + 'static,
    {
        self.on_grow.subscribe(callback)
    }

    /// Publish whatever an insert into this archetype's table caused.
    pub(crate) fn notify(&self, outcome: InsertOutcome) {
        if outcome.realized {
            tracing::debug!(archetype = ?self.id, ty = ?self.ty(), "archetype realized");
            self.on_realize.dispatch(&self.id);
        }
        if let Some(capacity) = outcome.grown {
            tracing::trace!(archetype = ?self.id, capacity, "table grown");
            self.on_grow.dispatch(&TableGrown {
                archetype: self.id,
                capacity,
            });
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("type", self.ty())
            .field("edges_set", &self.edges_set.len())
            .field("edges_unset", &self.edges_unset.len())
            .finish()
    }
}

/// Every archetype of a world, linked by single-schema edges.
pub struct ArchetypeGraph {
    /// All archetypes, indexed by id; the root is at index 0.
    archetypes: Vec<Archetype>,
    /// Map from type to archetype ID.
    index: FxHashMap<Type, ArchetypeId>,
    /// Row capacity of binary columns.
    capacity: usize,
    on_archetype_created: Signal<ArchetypeCreated>,
}

impl ArchetypeGraph {
    /// Create a graph holding only the root archetype.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let root = Table::new(
            ArchetypeId::ROOT,
            Type::empty(),
            &SchemaRegistry::new(),
            capacity,
        )
        .expect("the root type has no schemas");

        let mut index = FxHashMap::default();
        index.insert(Type::empty(), ArchetypeId::ROOT);

        Self {
            archetypes: vec![Archetype::new(ArchetypeId::ROOT, root)],
            index,
            capacity,
            on_archetype_created: Signal::new(),
        }
    }

    /// The root archetype.
    #[must_use]
    pub fn root(&self) -> &Archetype {
        &self.archetypes[0]
    }

    /// Get an archetype by ID.
    #[must_use]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.as_raw() as usize)
    }

    /// Get a mutable archetype by ID.
    #[must_use]
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.as_raw() as usize)
    }

    /// Find the archetype for a type, if it exists.
    #[must_use]
    pub fn find(&self, ty: &Type) -> Option<ArchetypeId> {
        self.index.get(ty).copied()
    }

    /// Get the number of archetypes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Always false: the root archetype exists from the start.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Iterate over all archetypes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Subscribe to archetype creation.
    pub fn on_archetype_created<F>(&mut self, callback: F) -> SubscriberId
    where
        F: Fn(&ArchetypeCreated) + Send + Sync + 'static,
    {
        self.on_archetype_created.subscribe(callback)
    }

    /// Remove an archetype creation subscriber.
    pub fn unsubscribe_archetype_created(&mut self, id: SubscriberId) -> bool {
        self.on_archetype_created.unsubscribe(id)
    }

    /// Get the archetype for `ty`, creating it and any missing ancestors.
    ///
    /// Walks from the root, adding the type's schemas in ascending order and
    /// following (or creating) one `edges_set` edge per step.
    pub fn find_or_make(&mut self, ty: &Type, registry: &SchemaRegistry) -> EcsResult<ArchetypeId> {
        if let Some(id) = self.find(ty) {
            return Ok(id);
        }
        self.traverse_set(ArchetypeId::ROOT, ty, registry)
    }

    /// Follow `edges_set` from `from` for every schema in `add`.
    pub fn traverse_set(
        &mut self,
        from: ArchetypeId,
        add: &Type,
        registry: &SchemaRegistry,
    ) -> EcsResult<ArchetypeId> {
        for &id in add.iter() {
            registry.require(id)?;
        }

        let mut current = from;
        for &id in add.iter() {
            let archetype = &self[current];
            if archetype.ty().contains(id) {
                continue;
            }
            current = match archetype.edge_set(id) {
                Some(next) => next,
                None => {
                    let ty = archetype.ty().with(id);
                    self.make(ty, registry)?
                }
            };
        }
        Ok(current)
    }

    /// Follow `edges_unset` from `from` for every schema in `remove`.
    pub fn traverse_unset(
        &mut self,
        from: ArchetypeId,
        remove: &Type,
        registry: &SchemaRegistry,
    ) -> EcsResult<ArchetypeId> {
        let mut current = from;
        for &id in remove.iter() {
            let archetype = &self[current];
            if !archetype.ty().contains(id) {
                continue;
            }
            current = match archetype.edge_unset(id) {
                Some(next) => next,
                None => {
                    let ty = archetype.ty().without(id);
                    self.find_or_make(&ty, registry)?
                }
            };
        }
        Ok(current)
    }

    /// Create the archetype for `ty` and link it into the graph.
    fn make(&mut self, ty: Type, registry: &SchemaRegistry) -> EcsResult<ArchetypeId> {
        if let Some(id) = self.find(&ty) {
            return Ok(id);
        }

        let id = ArchetypeId::from_raw(self.archetypes.len() as u32);
        let table = Table::new(id, ty.clone(), registry, self.capacity)?;
        let mut archetype = Archetype::new(id, table);

        for other in &mut self.archetypes {
            link(other, &mut archetype);
        }

        self.archetypes.push(archetype);
        self.index.insert(ty.clone(), id);

        tracing::debug!(archetype = ?id, ?ty, "created archetype");
        self.on_archetype_created
            .dispatch(&ArchetypeCreated { id, ty });

        Ok(id)
    }
}

/// Connect two archetypes whose types differ by exactly one schema.
fn link(a: &mut Archetype, b: &mut Archetype) {
    if let Some(id) = b.ty().single_extra(a.ty()) {
        a.edges_set.insert(id, b.id);
        b.edges_unset.insert(id, a.id);
    } else if let Some(id) = a.ty().single_extra(b.ty()) {
        b.edges_set.insert(id, a.id);
        a.edges_unset.insert(id, b.id);
    }
}

impl Index<ArchetypeId> for ArchetypeGraph {
    type Output = Archetype;

    fn index(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.as_raw() as usize]
    }
}

impl fmt::Debug for ArchetypeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeGraph")
            .field("archetype_count", &self.archetypes.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
