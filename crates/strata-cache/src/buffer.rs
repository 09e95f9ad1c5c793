//! Thread-local delta buffers.
//!
//! Worker threads record structural operations in their own buffer without
//! synchronization. Each delta is stamped from one shared counter so that
//! deltas from different threads can later be merged in issue order.

use std::{
    cell::RefCell,
    sync::atomic::{AtomicU64, Ordering},
};

use strata_ecs::{Entity, Type, Value};

/// A buffered structural operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Place a reserved entity.
    Make {
        entity: Entity,
        ty: Type,
        data: Option<Vec<Option<Value>>>,
    },
    /// Add schemas to an entity.
    Set {
        entity: Entity,
        ty: Type,
        data: Option<Vec<Option<Value>>>,
    },
    /// Remove schemas from an entity.
    Unset { entity: Entity, ty: Type },
    /// Remove an entity from the world.
    Destroy { entity: Entity },
}

impl Delta {
    /// The entity this delta addresses.
    #[inline]
    pub const fn entity(&self) -> Entity {
        match self {
            Self::Make { entity, .. }
            | Self::Set { entity, .. }
            | Self::Unset { entity, .. }
            | Self::Destroy { entity } => *entity,
        }
    }
}

/// A delta and its position in issue order.
pub type Stamped = (u64, Delta);

/// Thread-local delta buffers.
///
/// Each thread gets its own `Vec<Stamped>` the first time it pushes. Call
/// `collect_all()` after parallel work to gather every thread's deltas.
pub struct DeltaBuffers {
    inner: thread_local::ThreadLocal<RefCell<Vec<Stamped>>>,
    sequence: AtomicU64,
}

impl DeltaBuffers {
    /// Create a new empty buffer collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: thread_local::ThreadLocal::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Push a delta to the current thread's buffer.
    #[inline]
    pub fn push(&self, delta: Delta) {
        let stamp = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.inner.get_or_default().borrow_mut().push((stamp, delta));
    }

    /// Collect every thread's deltas in issue order, clearing the buffers.
    ///
    /// `&mut self` guarantees no thread is pushing concurrently.
    pub fn collect_all(&mut self) -> Vec<Delta> {
        let mut all: Vec<Stamped> = self
            .inner
            .iter_mut()
            .flat_map(|cell| cell.get_mut().drain(..))
            .collect();
        all.sort_unstable_by_key(|(stamp, _)| *stamp);
        all.into_iter().map(|(_, delta)| delta).collect()
    }

    /// Put collected deltas back, keeping their relative order.
    ///
    /// Lands in the calling thread's buffer with fresh stamps, so they stay
    /// ahead of anything pushed afterwards.
    pub fn restore(&mut self, deltas: impl IntoIterator<Item = Delta>) {
        for delta in deltas {
            self.push(delta);
        }
    }

    /// Total pending deltas across all threads.
    pub fn total_pending(&mut self) -> usize {
        self.inner.iter_mut().map(|cell| cell.get_mut().len()).sum()
    }

    /// Drop every pending delta.
    pub fn clear(&mut self) {
        for cell in self.inner.iter_mut() {
            cell.get_mut().clear();
        }
    }
}

impl Default for DeltaBuffers {
    fn default() -> Self {
        Self::new()
    }
}
