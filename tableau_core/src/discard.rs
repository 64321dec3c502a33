// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred release of objects that in-flight frames may still reference.
//!
//! An object removed while the update computes buffer `B` can still be named
//! by the instructions the render stage is drawing for `1 - B`. The object is
//! parked under `B` and handed back when `B` is computed again, two frames
//! later, when no instruction of either buffer can refer to it.

use crate::property::BufferIndex;

/// Two-slot queue of objects awaiting release.
#[derive(Debug)]
pub struct DiscardQueue<T> {
    slots: [Vec<T>; 2],
}

impl<T> Default for DiscardQueue<T> {
    fn default() -> Self {
        Self {
            slots: [Vec::new(), Vec::new()],
        }
    }
}

impl<T> DiscardQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `item` under the buffer currently being computed.
    pub fn add(&mut self, buffer: BufferIndex, item: T) {
        self.slots[buffer.get()].push(item);
    }

    /// Returns everything parked under `buffer`.
    ///
    /// Called at the start of the update for `buffer`.
    pub fn clear(&mut self, buffer: BufferIndex) -> Vec<T> {
        core::mem::take(&mut self.slots[buffer.get()])
    }

    /// Number of parked objects over both buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots[0].len() + self.slots[1].len()
    }

    /// Returns whether nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_come_back_when_their_buffer_is_computed_again() {
        let mut queue = DiscardQueue::new();
        let mut buffer = BufferIndex::ZERO;

        queue.add(buffer, "a");
        buffer = buffer.other();
        assert!(queue.clear(buffer).is_empty(), "one frame later, still in use");

        queue.add(buffer, "b");
        buffer = buffer.other();
        assert_eq!(queue.clear(buffer), vec!["a"]);
        assert_eq!(queue.len(), 1);

        buffer = buffer.other();
        assert_eq!(queue.clear(buffer), vec!["b"]);
        assert!(queue.is_empty());
    }
}
