// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Double-buffered property cells.
//!
//! Every piece of per-frame scene state lives in two slots selected by a
//! [`BufferIndex`]. The update stage writes slot `B` while the render stage
//! reads slot `1 - B`; the slots trade roles once per frame.
//!
//! - [`AnimatableProperty`] holds application-driven local values. A
//!   [`bake`](AnimatableProperty::bake) is a hard set that reaches both slots
//!   (the other one on its next computation), a
//!   [`set`](AnimatableProperty::set) touches only the slot being computed.
//! - [`InheritedProperty`] holds derived values (world transforms, world
//!   color) that are recomputed when dirty and otherwise copied forward from
//!   the previous frame with [`copy_previous`](InheritedProperty::copy_previous).
//! - [`PropertyOwner`] is implemented by everything that owns animatable
//!   properties; owners are reset to their base values at the start of each
//!   update.

mod animatable;
mod inherited;

pub use animatable::AnimatableProperty;
pub use inherited::InheritedProperty;

use core::fmt;

/// Selects one of the two slots of a double-buffered value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BufferIndex(u8);

impl BufferIndex {
    /// The first slot.
    pub const ZERO: Self = Self(0);
    /// The second slot.
    pub const ONE: Self = Self(1);

    /// Creates a buffer index from a raw value.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is not 0 or 1.
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        assert!(raw < 2, "buffer index must be 0 or 1");
        Self(raw)
    }

    /// Returns the other slot.
    #[inline]
    #[must_use]
    pub const fn other(self) -> Self {
        Self(1 - self.0)
    }

    /// Returns the slot as an array index.
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BufferIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer({})", self.0)
    }
}

/// An owner of animatable properties.
///
/// The update stage calls [`reset_default_properties`](Self::reset_default_properties)
/// for the buffer it is about to compute, before any queued messages are
/// applied. This is where a value baked into the other buffer last frame
/// reaches this buffer.
pub trait PropertyOwner {
    /// Resets every animatable property to its base value in `buffer`.
    fn reset_default_properties(&mut self, buffer: BufferIndex);
}
