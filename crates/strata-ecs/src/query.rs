//! Live queries over the archetype graph.
//!
//! A query keeps a record for every archetype whose type is a superset of
//! the requested type. It scans the graph once when made and then listens to
//! archetype creation, so the record list only ever grows.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::{RwLock, RwLockReadGuard};
use smallvec::SmallVec;

use crate::{
    archetype::{Archetype, ArchetypeId},
    entity::Entity,
    error::EcsResult,
    lock::IterGuard,
    schema::{SchemaId, SchemaRegistry, Value},
    signal::SubscriberId,
    storage::Column,
    types::Type,
    world::World,
};

/// One matching archetype and where each queried schema sits in its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    archetype: ArchetypeId,
    /// Column position of each queried schema, in query order.
    columns: SmallVec<[usize; 8]>,
}

impl QueryRecord {
    /// Build the record for `archetype` if its type covers the query.
    fn matching(query: &Type, archetype: ArchetypeId, ty: &Type) -> Option<Self> {
        let columns = query
            .iter()
            .map(|&id| ty.position(id))
            .collect::<Option<SmallVec<_>>>()?;
        Some(Self { archetype, columns })
    }

    /// The matching archetype.
    #[must_use]
    pub const fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// Column positions of the queried schemas within the archetype's table.
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }
}

type Records = Arc<RwLock<Vec<QueryRecord>>>;

/// A live list of every archetype matching a type.
///
/// The creation subscriber only holds a weak reference to the records, so a
/// dropped query stops collecting. [`Query::close`] also removes the
/// subscriber itself.
pub struct Query {
    ty: Type,
    records: Records,
    subscription: SubscriberId,
}

impl Query {
    /// Create a query for `ty` and keep it current as archetypes appear.
    pub fn make(world: &mut World, ty: Type) -> Self {
        let records: Vec<QueryRecord> = world
            .archetypes()
            .filter_map(|archetype| QueryRecord::matching(&ty, archetype.id(), archetype.ty()))
            .collect();
        let records = Arc::new(RwLock::new(records));

        let watched = ty.clone();
        let sink: Weak<_> = Arc::downgrade(&records);
        let subscription = world.graph_mut().on_archetype_created(move |event| {
            let Some(sink) = sink.upgrade() else {
                return;
            };
            if let Some(record) = QueryRecord::matching(&watched, event.id, &event.ty) {
                sink.write().push(record);
            }
        });

        tracing::debug!(?ty, archetypes = records.read().len(), "made query");

        Self {
            ty,
            records,
            subscription,
        }
    }

    /// The queried type.
    #[must_use]
    pub const fn ty(&self) -> &Type {
        &self.ty
    }

    /// The current records, in the order their archetypes were adopted.
    pub fn records(&self) -> RwLockReadGuard<'_, Vec<QueryRecord>> {
        self.records.read()
    }

    /// Number of matching archetypes, empty ones included.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.records.read().len()
    }

    /// Total number of entities in matching archetypes.
    #[must_use]
    pub fn len(&self, world: &World) -> usize {
        self.records
            .read()
            .iter()
            .map(|record| world.graph()[record.archetype].len())
            .sum()
    }

    /// Check if no matching archetype holds an entity.
    #[must_use]
    pub fn is_empty(&self, world: &World) -> bool {
        self.len(world) == 0
    }

    /// Visit every non-empty matching archetype.
    ///
    /// Each table stays locked while its view is alive. Archetypes cannot be
    /// created during the pass since that needs `&mut World`.
    pub fn for_each<F>(&self, world: &World, mut f: F)
    where
        F: FnMut(RecordView<'_>),
    {
        for record in self.records.read().iter() {
            if let Some(view) = RecordView::open(world, &self.ty, record) {
                f(view);
            }
        }
    }

    /// A view of this query that skips archetypes containing any of `exclude`.
    #[must_use]
    pub fn not(&self, exclude: impl IntoIterator<Item = SchemaId>) -> Not<'_> {
        Not {
            query: self,
            exclude: Type::normalize(exclude),
        }
    }

    /// Stop tracking new archetypes.
    pub fn close(self, world: &mut World) {
        world
            .graph_mut()
            .unsubscribe_archetype_created(self.subscription);
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("type", &self.ty)
            .field("archetypes", &self.archetype_count())
            .finish()
    }
}

/// A query with excluded schemas.
#[derive(Debug)]
pub struct Not<'q> {
    query: &'q Query,
    exclude: Type,
}

impl Not<'_> {
    /// The excluded schemas.
    #[must_use]
    pub const fn excluded(&self) -> &Type {
        &self.exclude
    }

    fn admits(&self, ty: &Type) -> bool {
        !self.exclude.iter().any(|&id| ty.contains(id))
    }

    /// Number of matching archetypes left after exclusion.
    #[must_use]
    pub fn archetype_count(&self, world: &World) -> usize {
        self.query
            .records
            .read()
            .iter()
            .filter(|record| self.admits(world.graph()[record.archetype].ty()))
            .count()
    }

    /// Total number of entities left after exclusion.
    #[must_use]
    pub fn len(&self, world: &World) -> usize {
        self.query
            .records
            .read()
            .iter()
            .map(|record| &world.graph()[record.archetype])
            .filter(|archetype| self.admits(archetype.ty()))
            .map(Archetype::len)
            .sum()
    }

    /// Check if nothing is left after exclusion.
    #[must_use]
    pub fn is_empty(&self, world: &World) -> bool {
        self.len(world) == 0
    }

    /// Like [`Query::for_each`], skipping excluded archetypes.
    pub fn for_each<F>(&self, world: &World, mut f: F)
    where
        F: FnMut(RecordView<'_>),
    {
        for record in self.query.records.read().iter() {
            if !self.admits(world.graph()[record.archetype].ty()) {
                continue;
            }
            if let Some(view) = RecordView::open(world, &self.query.ty, record) {
                f(view);
            }
        }
    }
}

/// One locked archetype during a query pass.
///
/// Terms are indices into the query's type: term `0` is the query's lowest
/// schema id, and so on.
pub struct RecordView<'a> {
    archetype: &'a Archetype,
    schemas: &'a SchemaRegistry,
    query: &'a Type,
    columns: &'a [usize],
    guard: IterGuard<'a>,
}

impl<'a> RecordView<'a> {
    /// Lock the record's table, skipping it if empty.
    fn open(world: &'a World, query: &'a Type, record: &'a QueryRecord) -> Option<Self> {
        let archetype = &world.graph()[record.archetype];
        let guard = archetype.table().iter_lock();
        if guard.data().is_empty() {
            return None;
        }
        Some(Self {
            archetype,
            schemas: world.schemas(),
            query,
            columns: &record.columns,
            guard,
        })
    }

    /// The archetype being visited.
    #[must_use]
    pub const fn archetype(&self) -> ArchetypeId {
        self.archetype.id()
    }

    /// The archetype's full type.
    #[must_use]
    pub const fn ty(&self) -> &Type {
        self.archetype.ty()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.data().len()
    }

    /// Check if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entity owning each row.
    ///
    /// Owned, so rows can be written while walking it.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.guard.data().entities().to_vec()
    }

    /// Entity owning `row`.
    #[must_use]
    pub fn entity(&self, row: usize) -> Option<Entity> {
        self.guard.data().entities().get(row).copied()
    }

    /// Read the value of query term `term` at `row`.
    ///
    /// `None` for tags, for rows past the end, and while the columns are
    /// borrowed by [`RecordView::with_columns`].
    #[must_use]
    pub fn get(&self, row: usize, term: usize) -> Option<Value> {
        let data = self.guard.try_data().ok()?;
        if row >= data.len() {
            return None;
        }
        data.column(self.columns[term])?.read(row)
    }

    /// Overwrite the value of query term `term` at `row`.
    ///
    /// Fails with [`EcsError::TableBorrowed`](crate::EcsError::TableBorrowed) inside
    /// [`RecordView::with_columns`] on the same table.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn set(&self, row: usize, term: usize, value: impl Into<Value>) -> EcsResult<()> {
        let schema = self.schemas.require(self.query[term])?;
        let value = schema.resolve(Some(value.into()))?;

        let mut data = self.guard.try_data_mut()?;
        assert!(row < data.len(), "row {row} out of bounds");
        data.columns_mut()[self.columns[term]].write(row, value);
        Ok(())
    }

    /// Bulk access to the queried columns, in query order.
    ///
    /// Binary column slices span the world capacity; only the first
    /// `entities.len()` rows are occupied.
    pub fn with_columns<R>(&self, f: impl FnOnce(&[Entity], &mut [&mut Column]) -> R) -> R {
        let mut data = self.guard.data_mut();
        let (entities, columns) = data.split_mut();
        // Positions ascend in query order because both types are sorted.
        let mut picked: SmallVec<[&mut Column; 8]> = columns
            .iter_mut()
            .enumerate()
            .filter(|(position, _)| self.columns.contains(position))
            .map(|(_, column)| column)
            .collect();
        f(entities, &mut picked[..])
    }
}

impl fmt::Debug for RecordView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordView")
            .field("archetype", &self.archetype.id())
            .field("len", &self.len())
            .finish()
    }
}
