//! Entity identifiers with generational indices.
//!
//! Entities use a generational index pattern to safely reuse IDs
//! while detecting use-after-free scenarios. Ids are handed out from a
//! fixed capacity by an allocator that any thread may call into.

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::error::{EcsError, EcsResult};

/// Generation counter to detect stale entity references.
/// Incremented each time an entity slot is released.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Generation(u32);

impl Generation {
    /// Largest generation; slots pack the generation next to an alive bit.
    const MAX: u32 = u32::MAX >> 1;

    /// Create a new generation (starts at 0).
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Increment the generation counter, wrapping at 31 bits.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1) & Self::MAX)
    }

    /// Get the raw generation value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Raw entity index into the entity storage.
pub type EntityId = u32;

/// A unique identifier for an entity in the world.
///
/// Entities are represented as a combination of:
/// - `id`: Index into the world's location index
/// - `generation`: Version counter to detect stale references
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    /// Index into the entity array.
    id: EntityId,
    /// Generation counter for this slot.
    generation: Generation,
}

impl Entity {
    /// Create a new entity with the given ID and generation.
    #[must_use]
    pub const fn new(id: EntityId, generation: Generation) -> Self {
        Self { id, generation }
    }

    /// Get the entity's index.
    #[must_use]
    pub const fn id(self) -> EntityId {
        self.id
    }

    /// Get the entity's generation.
    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }

    /// Pack entity into a single u64 for efficient storage/transmission.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation.0 as u64) << 32) | (self.id as u64)
    }

    /// Unpack entity from a u64.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            id: bits as u32,
            generation: Generation((bits >> 32) as u32),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id, self.generation.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.generation.0)
    }
}

const ALIVE: u32 = 1;

const fn pack(generation: Generation, alive: bool) -> u32 {
    (generation.0 << 1) | alive as u32
}

/// Fixed-capacity allocator for entity IDs with generation tracking.
///
/// Each slot is one atomic word holding `generation << 1 | alive`. Allocation
/// bumps a shared cursor (wrapping) and probes linearly for a free slot, so
/// reservation only needs `&self`.
pub struct EntityAllocator {
    /// Packed generation and alive bit per slot.
    slots: Box<[AtomicU32]>,
    /// Next slot to probe.
    cursor: AtomicU32,
    /// Number of currently alive entities.
    alive_count: AtomicU32,
}

impl EntityAllocator {
    /// Create an allocator for `capacity` entities.
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            cursor: AtomicU32::new(0),
            alive_count: AtomicU32::new(0),
        }
    }

    /// Reserve a new entity.
    ///
    /// Fails once every slot is alive.
    pub fn allocate(&self) -> EcsResult<Entity> {
        let capacity = self.capacity();
        if capacity > 0 {
            for _ in 0..capacity {
                let id = self.cursor.fetch_add(1, Ordering::Relaxed) % capacity;
                let slot = &self.slots[id as usize];
                let current = slot.load(Ordering::Acquire);
                if current & ALIVE != 0 {
                    continue;
                }
                if slot
                    .compare_exchange(current, current | ALIVE, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.alive_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(Entity::new(id, Generation(current >> 1)));
                }
            }
        }

        tracing::warn!(capacity, "entity id space exhausted");
        Err(EcsError::CapacityExhausted { capacity })
    }

    /// Release an entity, making its slot available for reuse.
    ///
    /// Returns `true` if the entity was alive and is now released.
    pub fn deallocate(&self, entity: Entity) -> bool {
        let Some(slot) = self.slots.get(entity.id() as usize) else {
            return false;
        };

        let released = slot
            .compare_exchange(
                pack(entity.generation(), true),
                pack(entity.generation().next(), false),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if released {
            self.alive_count.fetch_sub(1, Ordering::Relaxed);
        }
        released
    }

    /// Check if an entity is currently alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.id() as usize)
            .is_some_and(|slot| slot.load(Ordering::Acquire) == pack(entity.generation(), true))
    }

    /// Get the number of currently alive entities.
    #[must_use]
    pub fn alive_count(&self) -> u32 {
        self.alive_count.load(Ordering::Relaxed)
    }

    /// Get the total number of slots.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }
}

impl fmt::Debug for EntityAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityAllocator")
            .field("capacity", &self.capacity())
            .field("alive_count", &self.alive_count())
            .finish()
    }
}
