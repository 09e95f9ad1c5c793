//! Table lock guards.
//!
//! Every table sits behind a re-entrant mutex. A thread that already holds a
//! table (for example while iterating it) can lock it again without blocking,
//! so code running inside an iteration may mutate the table it is visiting.
//!
//! Three ways to acquire:
//! - [`Table::lock`](crate::Table::lock) blocks the calling thread.
//! - [`Table::try_lock_for`](crate::Table::try_lock_for) blocks up to a timeout.
//! - [`Table::lock_async`](crate::Table::lock_async) returns a future that
//!   yields back to its executor while the lock is contended.

use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    future::Future,
    ops::Deref,
    pin::Pin,
    sync::atomic::Ordering,
    task::{Context, Poll},
};

use parking_lot::ReentrantMutexGuard;

use crate::{
    error::{EcsError, EcsResult},
    table::{Table, TableData},
};

/// Exclusive (re-entrant) access to one table.
pub struct TableGuard<'a> {
    table: &'a Table,
    guard: ReentrantMutexGuard<'a, RefCell<TableData>>,
}

impl<'a> TableGuard<'a> {
    pub(crate) fn new(
        table: &'a Table,
        guard: ReentrantMutexGuard<'a, RefCell<TableData>>,
    ) -> Self {
        Self { table, guard }
    }

    /// The locked table.
    #[must_use]
    pub const fn table(&self) -> &'a Table {
        self.table
    }

    /// Borrow the table contents.
    ///
    /// # Panics
    ///
    /// Panics if the same thread currently holds a mutable borrow.
    #[must_use]
    pub fn data(&self) -> Ref<'_, TableData> {
        self.guard.borrow()
    }

    /// Mutably borrow the table contents.
    ///
    /// # Panics
    ///
    /// Panics if the same thread currently holds any other borrow.
    #[must_use]
    pub fn data_mut(&self) -> RefMut<'_, TableData> {
        self.guard.borrow_mut()
    }

    /// Borrow the table contents, failing instead of panicking when this
    /// thread holds a mutable borrow.
    pub fn try_data(&self) -> EcsResult<Ref<'_, TableData>> {
        self.guard
            .try_borrow()
            .map_err(|_| EcsError::TableBorrowed(self.table.archetype()))
    }

    /// Mutably borrow the table contents, failing instead of panicking when
    /// this thread holds any other borrow.
    pub fn try_data_mut(&self) -> EcsResult<RefMut<'_, TableData>> {
        self.guard
            .try_borrow_mut()
            .map_err(|_| EcsError::TableBorrowed(self.table.archetype()))
    }
}

impl fmt::Debug for TableGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableGuard")
            .field("archetype", &self.table.archetype())
            .finish_non_exhaustive()
    }
}

/// A table lock held for the duration of an iteration pass.
///
/// Counts as one active iterator on the table until dropped, including when
/// the pass ends early or unwinds.
pub struct IterGuard<'a> {
    guard: TableGuard<'a>,
}

impl<'a> IterGuard<'a> {
    pub(crate) fn new(guard: TableGuard<'a>) -> Self {
        guard.table.iterators.fetch_add(1, Ordering::AcqRel);
        Self { guard }
    }
}

impl<'a> Deref for IterGuard<'a> {
    type Target = TableGuard<'a>;

    fn deref(&self) -> &TableGuard<'a> {
        &self.guard
    }
}

impl Drop for IterGuard<'_> {
    fn drop(&mut self) {
        self.guard.table.iterators.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Future returned by [`Table::lock_async`](crate::Table::lock_async).
///
/// Each poll tries the lock once. On contention it asks to be polled again
/// and returns `Pending`, letting the executor run other tasks.
#[must_use = "futures do nothing unless polled"]
pub struct LockFuture<'a> {
    pub(crate) table: &'a Table,
}

impl<'a> Future for LockFuture<'a> {
    type Output = TableGuard<'a>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TableGuard<'a>> {
        let table = self.table;
        match table.try_lock() {
            Some(guard) => Poll::Ready(guard),
            None => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

/// Lock two distinct tables without risking a lock-order deadlock.
///
/// Tables this thread already holds are taken first (they cannot block);
/// the rest are taken in ascending archetype order. Guards come back in
/// argument order.
pub fn lock_pair<'a>(a: &'a Table, b: &'a Table) -> (TableGuard<'a>, TableGuard<'a>) {
    debug_assert_ne!(a.archetype(), b.archetype(), "lock_pair on a single table");

    let a_first = match (a.is_held_by_current_thread(), b.is_held_by_current_thread()) {
        (true, false) => true,
        (false, true) => false,
        _ => a.archetype() < b.archetype(),
    };

    if a_first {
        let ga = a.lock();
        let gb = b.lock();
        (ga, gb)
    } else {
        let gb = b.lock();
        let ga = a.lock();
        (ga, gb)
    }
}
