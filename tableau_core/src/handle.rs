// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generational handles shared between the event, update, and render stages.
//!
//! Handles are allocated on the event side by a [`HandleAllocator`] so the
//! application can refer to an object immediately, while the object itself
//! only materializes when the matching message is applied by the update
//! stage. Slots are returned to the allocator once the object has left the
//! discard queue; the generation counter makes old handles detectably stale.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

/// Names a family of handles.
pub trait HandleKind: 'static {
    /// Type name used in diagnostics, e.g. `"NodeId"`.
    const NAME: &'static str;
}

/// A generational handle to an object of kind `K`.
pub struct Handle<K: HandleKind> {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind> Handle<K> {
    pub(crate) const fn from_parts(idx: u32, generation: u32) -> Self {
        Self {
            idx,
            generation,
            _kind: PhantomData,
        }
    }

    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl<K: HandleKind> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> Copy for Handle<K> {}

impl<K: HandleKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.idx == other.idx && self.generation == other.generation
    }
}

impl<K: HandleKind> Eq for Handle<K> {}

impl<K: HandleKind> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.idx.hash(state);
        self.generation.hash(state);
    }
}

impl<K: HandleKind> PartialOrd for Handle<K> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: HandleKind> Ord for Handle<K> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.idx, self.generation).cmp(&(other.idx, other.generation))
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}@gen{})", K::NAME, self.idx, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slots {
    generation: Vec<u32>,
    free: Vec<u32>,
}

/// Thread-safe slot allocator for one handle family.
///
/// Clones share the same slot table.
pub struct HandleAllocator<K: HandleKind> {
    slots: Arc<Mutex<Slots>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind> HandleAllocator<K> {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots::default())),
            _kind: PhantomData,
        }
    }

    /// Allocates a handle, reusing a released slot when one is available.
    #[must_use]
    pub fn allocate(&self) -> Handle<K> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(idx) = slots.free.pop() {
            Handle::from_parts(idx, slots.generation[idx as usize])
        } else {
            let idx = u32::try_from(slots.generation.len())
                .unwrap_or_else(|_| panic!("{} slot space exhausted", K::NAME));
            slots.generation.push(0);
            Handle::from_parts(idx, 0)
        }
    }

    /// Returns a slot for reuse and bumps its generation.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is stale.
    pub fn release(&self, handle: Handle<K>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = &mut slots.generation[handle.idx as usize];
        assert!(
            *generation == handle.generation,
            "stale {}: {handle:?} released twice",
            K::NAME
        );
        *generation += 1;
        slots.free.push(handle.idx);
    }

    /// Returns whether `handle` has not been released.
    #[must_use]
    pub fn is_current(&self, handle: Handle<K>) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .generation
            .get(handle.idx as usize)
            .is_some_and(|g| *g == handle.generation)
    }
}

impl<K: HandleKind> Default for HandleAllocator<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: HandleKind> Clone for HandleAllocator<K> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            _kind: PhantomData,
        }
    }
}

impl<K: HandleKind> fmt::Debug for HandleAllocator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleAllocator")
            .field("kind", &K::NAME)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum TestKind {}
    impl HandleKind for TestKind {
        const NAME: &'static str = "TestId";
    }

    #[test]
    fn released_slots_are_reused_with_new_generation() {
        let alloc = HandleAllocator::<TestKind>::new();
        let a = alloc.allocate();
        alloc.release(a);
        let b = alloc.allocate();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(!alloc.is_current(a));
        assert!(alloc.is_current(b));
    }

    #[test]
    fn clones_share_slot_table() {
        let alloc = HandleAllocator::<TestKind>::new();
        let other = alloc.clone();
        let a = alloc.allocate();
        let b = other.allocate();
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn debug_names_the_kind() {
        let h = Handle::<TestKind>::from_parts(3, 1);
        assert_eq!(format!("{h:?}"), "TestId(3@gen1)");
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn double_release_panics() {
        let alloc = HandleAllocator::<TestKind>::new();
        let a = alloc.allocate();
        alloc.release(a);
        alloc.release(a);
    }
}
