// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Double-buffered derived property.

use super::BufferIndex;

/// A double-buffered value computed from other state every frame it is dirty.
///
/// When the owner is clean for a frame, [`copy_previous`](Self::copy_previous)
/// carries the other slot forward instead of recomputing. The copy only
/// happens once after each write; after that both slots already agree.
#[derive(Clone, Copy, Debug)]
pub struct InheritedProperty<T> {
    value: [T; 2],
    reinherited: bool,
}

impl<T: Copy> InheritedProperty<T> {
    /// Creates a property with both slots set to `initial`.
    #[must_use]
    pub const fn new(initial: T) -> Self {
        Self {
            value: [initial; 2],
            reinherited: false,
        }
    }

    /// Returns the value for `buffer`.
    #[inline]
    #[must_use]
    pub fn get(&self, buffer: BufferIndex) -> T {
        self.value[buffer.get()]
    }

    /// Writes `value` to `buffer` only.
    pub fn set(&mut self, buffer: BufferIndex, value: T) {
        self.value[buffer.get()] = value;
        self.reinherited = true;
    }

    /// Copies the other slot into `buffer` if it was written since the last
    /// copy.
    pub fn copy_previous(&mut self, buffer: BufferIndex) {
        if self.reinherited {
            self.value[buffer.get()] = self.value[buffer.other().get()];
            self.reinherited = false;
        }
    }

    /// Overwrites both slots.
    pub fn reset(&mut self, value: T) {
        self.value = [value; 2];
        self.reinherited = false;
    }
}
