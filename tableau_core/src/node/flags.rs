// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node dirty flags and inheritance policies.

use bitflags::bitflags;

bitflags! {
    /// Which derived state of a node needs recomputation this frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeDirtyFlags: u32 {
        /// Position, rotation, scale, size, parent origin, or anchor point changed.
        const TRANSFORM = 0x001;
        /// Visibility changed.
        const VISIBLE = 0x002;
        /// Color or color mode changed.
        const COLOR = 0x004;
        /// Size changed.
        const SIZE = 0x008;
        /// Applied shader changed.
        const SHADER = 0x010;
        /// Draw mode changed.
        const OVERLAY = 0x020;
        /// Sort modifier changed.
        const SORT_MODIFIER = 0x040;
        /// A child was disconnected.
        const CHILD_DELETED = 0x080;

        /// Flags whose change on a parent can change a child's derived values.
        const INHERITED = Self::TRANSFORM.bits()
            | Self::VISIBLE.bits()
            | Self::COLOR.bits()
            | Self::SHADER.bits()
            | Self::OVERLAY.bits();
    }
}

impl NodeDirtyFlags {
    /// No derived state is out of date.
    pub const NOTHING: Self = Self::empty();
}

/// How a node's world position is derived from its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PositionInheritanceMode {
    /// Full parent-origin and anchor-point placement relative to the parent,
    /// scaled and rotated by the parent's world transform.
    #[default]
    InheritParentPosition,
    /// The parent's world position plus the local position, unscaled and
    /// unrotated.
    UseParentPositionPlusLocalPosition,
    /// Exactly the parent's world position.
    UseParentPosition,
    /// The local position, ignoring the parent.
    DontInheritPosition,
}

/// How a node's world color is derived from its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorMode {
    /// The node's own color.
    UseOwnColor,
    /// The parent's world color.
    UseParentColor,
    /// Component-wise product of own color and parent world color.
    UseOwnMultiplyParentColor,
    /// Own RGB, alpha multiplied by the parent's world alpha.
    #[default]
    UseOwnMultiplyParentAlpha,
}

/// Where a node's renderables are drawn within its layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DrawMode {
    /// Drawn in sibling order with the rest of the layer.
    #[default]
    Normal,
    /// Drawn after all normal renderables of the layer.
    Overlay,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherited_flags_exclude_local_only_bits() {
        let inherited = NodeDirtyFlags::INHERITED;
        assert!(inherited.contains(NodeDirtyFlags::TRANSFORM));
        assert!(inherited.contains(NodeDirtyFlags::OVERLAY));
        assert!(!inherited.contains(NodeDirtyFlags::SIZE));
        assert!(!inherited.contains(NodeDirtyFlags::SORT_MODIFIER));
        assert!(!inherited.contains(NodeDirtyFlags::CHILD_DELETED));
    }

    #[test]
    fn defaults_match_new_node_policy() {
        assert_eq!(
            PositionInheritanceMode::default(),
            PositionInheritanceMode::InheritParentPosition
        );
        assert_eq!(ColorMode::default(), ColorMode::UseOwnMultiplyParentAlpha);
    }
}
