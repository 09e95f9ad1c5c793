//! Tables - columnar storage for every entity of one exact type.
//!
//! Rows are dense: `entities[row]` owns row `row` of every column. Removal
//! moves the tail row into the hole so the table never has gaps, and the
//! per-table entity index is patched for whichever entity moved.

use std::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use parking_lot::ReentrantMutex;
use rustc_hash::FxHashMap;

use crate::{
    archetype::ArchetypeId,
    entity::{Entity, EntityId},
    error::{EcsError, EcsResult},
    lock::{IterGuard, LockFuture, TableGuard},
    schema::{SchemaRegistry, Value},
    storage::Column,
    types::Type,
};

/// What an insert did besides adding a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Row the entity now occupies.
    pub row: usize,
    /// The table held its first entity ever.
    pub realized: bool,
    /// The entity array reallocated; new capacity.
    pub grown: Option<usize>,
}

/// The contents of a table. Reached through a [`TableGuard`].
pub struct TableData {
    /// Entity owning each row.
    entities: Vec<Entity>,
    /// Row of each entity in this table.
    entity_index: FxHashMap<EntityId, usize>,
    /// One column per schema, in type order.
    columns: Vec<Column>,
    /// Has ever held an entity.
    real: bool,
}

impl TableData {
    /// Get the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity owning each row.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Row currently held by `entity`.
    #[must_use]
    pub fn row_of(&self, entity: Entity) -> Option<usize> {
        let row = *self.entity_index.get(&entity.id())?;
        (self.entities[row] == entity).then_some(row)
    }

    /// All columns, in type order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// All columns, mutably.
    #[must_use]
    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Entities and columns together, for bulk iteration.
    #[must_use]
    pub fn split_mut(&mut self) -> (&[Entity], &mut [Column]) {
        (&self.entities, &mut self.columns)
    }

    /// Column at position `index` of the table's type.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Check if the table has ever held an entity.
    #[must_use]
    pub const fn is_real(&self) -> bool {
        self.real
    }

    /// Append a row for `entity`.
    ///
    /// `values` holds one resolved value per column, in type order.
    pub fn insert(&mut self, entity: Entity, values: Vec<Option<Value>>) -> InsertOutcome {
        debug_assert_eq!(values.len(), self.columns.len());
        debug_assert!(!self.entity_index.contains_key(&entity.id()));

        let row = self.entities.len();
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(row, value);
        }
        self.finish_insert(entity, row)
    }

    fn finish_insert(&mut self, entity: Entity, row: usize) -> InsertOutcome {
        let capacity = self.entities.capacity();
        self.entities.push(entity);
        self.entity_index.insert(entity.id(), row);

        let realized = !self.real;
        self.real = true;
        let grown = (self.entities.capacity() != capacity).then(|| self.entities.capacity());

        InsertOutcome {
            row,
            realized,
            grown,
        }
    }

    /// Remove `entity`, moving the tail row into its place.
    ///
    /// Returns the entity that moved into the vacated row, if any.
    pub fn remove(&mut self, entity: Entity) -> EcsResult<Option<Entity>> {
        let row = self.row_of(entity).ok_or(EcsError::EntityNotFound(entity))?;
        Ok(self.remove_row(row))
    }

    fn remove_row(&mut self, row: usize) -> Option<Entity> {
        let last = self.entities.len() - 1;
        for column in &mut self.columns {
            column.swap_remove(row, last);
        }

        let removed = self.entities.swap_remove(row);
        self.entity_index.remove(&removed.id());

        if row == last {
            None
        } else {
            let moved = self.entities[row];
            self.entity_index.insert(moved.id(), row);
            Some(moved)
        }
    }

    /// Move `entity` from this table into `next`.
    ///
    /// Walks both sorted types with two cursors: columns whose schema appears
    /// in both are copied across, schemas only in `next_type` take the next
    /// value from `added` (in ascending schema order), and schemas only in
    /// `prev_type` are dropped. The source row is then swap-removed.
    pub fn move_to(
        &mut self,
        next: &mut Self,
        entity: Entity,
        prev_type: &Type,
        next_type: &Type,
        added: Vec<Option<Value>>,
    ) -> EcsResult<InsertOutcome> {
        let row = self.row_of(entity).ok_or(EcsError::EntityNotFound(entity))?;
        let new_row = next.entities.len();
        let mut added = added.into_iter();

        let mut i = 0;
        for (j, &id) in next_type.iter().enumerate() {
            while i < prev_type.len() && prev_type[i] < id {
                i += 1;
            }
            if i < prev_type.len() && prev_type[i] == id {
                next.columns[j].push_from(new_row, &self.columns[i], row);
                i += 1;
            } else {
                next.columns[j].push(new_row, added.next().flatten());
            }
        }
        debug_assert!(added.next().is_none(), "unused data in move_to");

        let outcome = next.finish_insert(entity, new_row);
        self.remove_row(row);
        Ok(outcome)
    }
}

impl fmt::Debug for TableData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableData")
            .field("len", &self.entities.len())
            .field("real", &self.real)
            .finish_non_exhaustive()
    }
}

/// A lockable table.
pub struct Table {
    archetype: ArchetypeId,
    ty: Type,
    data: ReentrantMutex<RefCell<TableData>>,
    /// Active iteration passes.
    pub(crate) iterators: AtomicU32,
}

impl Table {
    /// Create an empty table for `ty`.
    ///
    /// Binary columns are allocated for `capacity` rows up front.
    pub fn new(
        archetype: ArchetypeId,
        ty: Type,
        registry: &SchemaRegistry,
        capacity: usize,
    ) -> EcsResult<Self> {
        let columns = ty
            .iter()
            .map(|&id| Ok(Column::new(registry.require(id)?.kind(), capacity)))
            .collect::<EcsResult<Vec<_>>>()?;

        Ok(Self {
            archetype,
            ty,
            data: ReentrantMutex::new(RefCell::new(TableData {
                entities: Vec::new(),
                entity_index: FxHashMap::default(),
                columns,
                real: false,
            })),
            iterators: AtomicU32::new(0),
        })
    }

    /// Archetype this table belongs to.
    #[must_use]
    pub const fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// The table's type.
    #[must_use]
    pub const fn ty(&self) -> &Type {
        &self.ty
    }

    /// Lock the table, blocking until it is available.
    pub fn lock(&self) -> TableGuard<'_> {
        TableGuard::new(self, self.data.lock())
    }

    /// Lock the table if nobody else holds it.
    pub fn try_lock(&self) -> Option<TableGuard<'_>> {
        self.data.try_lock().map(|guard| TableGuard::new(self, guard))
    }

    /// Lock the table, giving up after `timeout`.
    pub fn try_lock_for(&self, timeout: Duration) -> EcsResult<TableGuard<'_>> {
        self.data
            .try_lock_for(timeout)
            .map(|guard| TableGuard::new(self, guard))
            .ok_or(EcsError::LockTimeout)
    }

    /// Lock the table from async code without blocking the thread.
    pub const fn lock_async(&self) -> LockFuture<'_> {
        LockFuture { table: self }
    }

    /// Lock the table for an iteration pass.
    pub fn iter_lock(&self) -> IterGuard<'_> {
        IterGuard::new(self.lock())
    }

    /// Number of iteration passes currently holding the table.
    #[must_use]
    pub fn active_iterators(&self) -> u32 {
        self.iterators.load(Ordering::Acquire)
    }

    /// Check if the calling thread holds this table's lock.
    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.data.is_owned_by_current_thread()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.lock().data().len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("archetype", &self.archetype)
            .field("type", &self.ty)
            .field("active_iterators", &self.active_iterators())
            .finish()
    }
}
