// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Double-buffered local property with a base value.

use super::BufferIndex;

/// Both slots hold the base value.
const CLEAN: u8 = 0;
/// The base value changed; one slot still has to pick it up.
const BAKED: u8 = 1;
/// A slot was written without touching the base value.
const SET: u8 = 2;

/// A double-buffered value with a base ("baked") value.
///
/// The dirty state ages by one step every time a slot is reset to the base
/// value, so a property is reported clean only once both slots agree with
/// the base value again.
#[derive(Clone, Copy, Debug)]
pub struct AnimatableProperty<T> {
    value: [T; 2],
    base: T,
    dirty: u8,
}

impl<T: Copy + PartialEq> AnimatableProperty<T> {
    /// Creates a property with both slots and the base set to `initial`.
    #[must_use]
    pub const fn new(initial: T) -> Self {
        Self {
            value: [initial; 2],
            base: initial,
            dirty: CLEAN,
        }
    }

    /// Returns the value for `buffer`.
    #[inline]
    #[must_use]
    pub fn get(&self, buffer: BufferIndex) -> T {
        self.value[buffer.get()]
    }

    /// Returns the base value.
    #[inline]
    #[must_use]
    pub fn base_value(&self) -> T {
        self.base
    }

    /// Writes `value` to `buffer` only.
    ///
    /// The base value is untouched, so both slots revert to it over the next
    /// two resets unless the write is repeated.
    pub fn set(&mut self, buffer: BufferIndex, value: T) {
        if self.value[buffer.get()] != value {
            self.value[buffer.get()] = value;
            self.dirty = SET;
        }
    }

    /// Writes `value` to `buffer` and to the base value.
    ///
    /// The other buffer receives the value when it is next reset.
    pub fn bake(&mut self, buffer: BufferIndex, value: T) {
        self.value[buffer.get()] = value;
        self.base = value;
        self.dirty = BAKED;
    }

    /// Copies the base value into `buffer` if the property is not clean.
    pub fn reset_to_base_value(&mut self, buffer: BufferIndex) {
        if self.dirty != CLEAN {
            self.value[buffer.get()] = self.base;
            self.dirty >>= 1;
        }
    }

    /// Returns whether both slots hold the base value.
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dirty == CLEAN
    }
}

impl<T: Copy + PartialEq + Default> Default for AnimatableProperty<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
