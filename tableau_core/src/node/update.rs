// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame node update.
//!
//! One depth-first, parent-before-child pass over the connected tree:
//!
//! 1. The effective flags of a node are its own requested flags, the flags
//!    implied by animatable properties that are not yet clean, and the
//!    [`INHERITED`](NodeDirtyFlags::INHERITED) part of its parent's effective
//!    flags.
//! 2. **TRANSFORM** recomputes world rotation, scale, position, and matrix.
//! 3. **COLOR** recomputes the world color from the node's [`ColorMode`].
//! 4. **SHADER** re-resolves the inherited shader.
//! 5. World values that were not recomputed are copied forward from the
//!    other buffer, and the consumed flags are cleared.

use glam::{Quat, Vec3, Vec4};

use crate::math::{is_identity, set_transform_components};
use crate::property::BufferIndex;

use super::flags::{ColorMode, NodeDirtyFlags, PositionInheritanceMode};
use super::id::{INVALID, NodeId};
use super::store::NodeStore;

/// Summary of one [`NodeStore::update_nodes`] pass.
#[derive(Clone, Debug, Default)]
pub struct NodeUpdate {
    /// Nodes that had at least one effective flag.
    pub updated: u32,
    /// Union of all effective flags.
    pub dirty: NodeDirtyFlags,
    /// Nodes whose size was animated, with the size for this buffer.
    pub size_animations: Vec<(NodeId, Vec3)>,
    /// Whether the traversal order was rebuilt.
    pub topology_changed: bool,
}

impl NodeStore {
    /// Updates every connected node for `buffer`.
    ///
    /// Expects [`reset_default_properties`](crate::property::PropertyOwner::reset_default_properties)
    /// to have run for `buffer` first.
    pub fn update_nodes(&mut self, buffer: BufferIndex) -> NodeUpdate {
        let mut result = NodeUpdate::default();

        if self.traversal_dirty {
            self.rebuild_traversal_order();
            result.topology_changed = true;
            self.traversal_dirty = false;
        }

        self.frame_dirty.fill(NodeDirtyFlags::NOTHING);

        let order = core::mem::take(&mut self.traversal_order);
        for &idx in &order {
            self.update_node(idx, buffer, &mut result);
        }
        self.traversal_order = order;
        result
    }

    /// Returns the current traversal order (depth-first pre-order from the
    /// root).
    ///
    /// Only valid after [`update_nodes`](Self::update_nodes) has run at least
    /// once since the last topology change.
    #[must_use]
    pub fn traversal_order(&self) -> &[u32] {
        &self.traversal_order
    }

    /// Recomputes the view and projection matrices of every connected
    /// camera for `buffer` from its node's world matrix.
    ///
    /// Runs after [`update_nodes`](Self::update_nodes) for the same buffer.
    /// Returns the number of cameras updated.
    pub fn update_cameras(&mut self, buffer: BufferIndex) -> u32 {
        let mut count = 0;
        for &idx in &self.traversal_order {
            let i = idx as usize;
            if let Some(camera) = self.camera[i].as_mut() {
                camera.update(buffer, self.world_matrix[i].get(buffer));
                count += 1;
            }
        }
        count
    }

    fn rebuild_traversal_order(&mut self) {
        self.traversal_order.clear();
        if self.root != INVALID {
            self.dfs_collect(self.root);
        }
    }

    fn dfs_collect(&mut self, idx: u32) {
        self.traversal_order.push(idx);
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            self.dfs_collect(child);
            child = self.next_sibling[child as usize];
        }
    }

    /// Flags implied by animatable properties that differ from their base.
    fn property_flags(&self, i: usize) -> NodeDirtyFlags {
        let mut flags = NodeDirtyFlags::NOTHING;
        if !self.size[i].is_clean()
            || !self.position[i].is_clean()
            || !self.rotation[i].is_clean()
            || !self.scale[i].is_clean()
            || !self.parent_origin[i].is_clean()
            || !self.anchor_point[i].is_clean()
        {
            flags |= NodeDirtyFlags::TRANSFORM;
        }
        if !self.visible[i].is_clean() {
            flags |= NodeDirtyFlags::VISIBLE;
        }
        if !self.color[i].is_clean() {
            flags |= NodeDirtyFlags::COLOR;
        }
        if !self.size[i].is_clean() {
            flags |= NodeDirtyFlags::SIZE;
        }
        flags
    }

    fn update_node(&mut self, idx: u32, buffer: BufferIndex, result: &mut NodeUpdate) {
        let i = idx as usize;
        let p = self.parent[i];
        let inherited = if p != INVALID {
            self.frame_dirty[p as usize] & NodeDirtyFlags::INHERITED
        } else {
            NodeDirtyFlags::NOTHING
        };
        let flags = self.dirty[i] | self.property_flags(i) | inherited;
        self.frame_dirty[i] = flags;

        if flags.contains(NodeDirtyFlags::TRANSFORM) {
            self.update_world_transform(i, p, buffer);
        } else {
            self.world_position[i].copy_previous(buffer);
            self.world_rotation[i].copy_previous(buffer);
            self.world_scale[i].copy_previous(buffer);
            self.world_matrix[i].copy_previous(buffer);
        }

        if flags.contains(NodeDirtyFlags::COLOR) {
            self.update_world_color(i, p, buffer);
        } else {
            self.world_color[i].copy_previous(buffer);
        }

        if flags.contains(NodeDirtyFlags::SHADER) {
            let parent_shader = if p != INVALID {
                self.inherited_shader[p as usize]
            } else {
                None
            };
            self.inherited_shader[i] = self.applied_shader[i].or(parent_shader);
        }

        if self.size_animated[i] {
            self.size_animated[i] = false;
            result
                .size_animations
                .push((self.handle_at(idx), self.size[i].get(buffer)));
        }

        self.dirty[i] = NodeDirtyFlags::NOTHING;
        if !flags.is_empty() {
            result.updated += 1;
            result.dirty |= flags;
        }
    }

    fn update_world_transform(&mut self, i: usize, p: u32, buffer: BufferIndex) {
        let position = self.position[i].get(buffer);
        let rotation = self.rotation[i].get(buffer);
        let scale = self.geometry_scale[i] * self.scale[i].get(buffer);

        if p == INVALID {
            self.world_position[i].set(buffer, position);
            self.world_rotation[i].set(buffer, rotation);
            self.world_scale[i].set(buffer, scale);
            self.world_matrix[i].set(buffer, set_transform_components(scale, rotation, position));
            return;
        }

        let pi = p as usize;
        let parent_position = self.world_position[pi].get(buffer);
        let parent_rotation = self.world_rotation[pi].get(buffer);
        let parent_scale = self.world_scale[pi].get(buffer);

        let world_rotation = if self.inherit_rotation[i] {
            inherit_rotation(parent_rotation, rotation)
        } else {
            rotation
        };
        let world_scale = if self.inherit_scale[i] {
            parent_scale * scale
        } else {
            scale
        };

        let world_position = match self.position_inheritance[i] {
            PositionInheritanceMode::InheritParentPosition => {
                let parent_size = self.size[pi].get(buffer);
                let origin = self.parent_origin[i].get(buffer) - Vec3::splat(0.5);
                let mut local = origin * parent_size + position;
                local *= parent_scale;
                local = parent_rotation * local;

                let half = Vec3::splat(0.5) - self.anchor_point[i].get(buffer);
                if half != Vec3::ZERO {
                    let offset = half * self.size[i].get(buffer) * world_scale;
                    let offset = Vec3::select(scale.cmplt(Vec3::ZERO), -offset, offset);
                    local += world_rotation * offset;
                }
                parent_position + local
            }
            PositionInheritanceMode::UseParentPositionPlusLocalPosition => {
                parent_position + position
            }
            PositionInheritanceMode::UseParentPosition => parent_position,
            PositionInheritanceMode::DontInheritPosition => position,
        };

        self.world_position[i].set(buffer, world_position);
        self.world_rotation[i].set(buffer, world_rotation);
        self.world_scale[i].set(buffer, world_scale);
        self.world_matrix[i].set(
            buffer,
            set_transform_components(world_scale, world_rotation, world_position),
        );
    }

    fn update_world_color(&mut self, i: usize, p: u32, buffer: BufferIndex) {
        let own = self.color[i].get(buffer);
        let color = if p == INVALID {
            own
        } else {
            let parent = self.world_color[p as usize].get(buffer);
            match self.color_mode[i] {
                ColorMode::UseOwnColor => own,
                ColorMode::UseParentColor => parent,
                ColorMode::UseOwnMultiplyParentColor => own * parent,
                ColorMode::UseOwnMultiplyParentAlpha => Vec4::new(own.x, own.y, own.z, own.w * parent.w),
            }
        };
        self.world_color[i].set(buffer, color);
    }
}

/// Parent rotation followed by local rotation; identities skip the multiply.
fn inherit_rotation(parent: Quat, local: Quat) -> Quat {
    if is_identity(local) {
        parent
    } else if is_identity(parent) {
        local
    } else {
        parent * local
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat4;

    use super::*;
    use crate::camera::Camera;
    use crate::handle::HandleAllocator;
    use crate::node::{DrawMode, NodeKind, NodeProperty};
    use crate::property::PropertyOwner;
    use crate::resource::ShaderId;

    struct Harness {
        store: NodeStore,
        alloc: HandleAllocator<NodeKind>,
        root: NodeId,
        buffer: BufferIndex,
        // Writes are applied after the reset of the next frame, like queued
        // messages.
        pending: Vec<(NodeId, NodeProperty, bool)>,
    }

    impl Harness {
        fn new() -> Self {
            let alloc = HandleAllocator::new();
            let mut store = NodeStore::new();
            let root = alloc.allocate();
            store.insert(root);
            store.install_root(root);
            Self {
                store,
                alloc,
                root,
                buffer: BufferIndex::ZERO,
                pending: Vec::new(),
            }
        }

        fn node(&mut self, parent: NodeId) -> NodeId {
            let id = self.alloc.allocate();
            self.store.insert(id);
            self.store.connect_child(parent, id);
            id
        }

        fn bake(&mut self, id: NodeId, property: NodeProperty) {
            self.pending.push((id, property, false));
        }

        fn animate(&mut self, id: NodeId, property: NodeProperty) {
            self.pending.push((id, property, true));
        }

        /// Runs one frame and returns the buffer it computed.
        fn frame(&mut self) -> (BufferIndex, NodeUpdate) {
            let b = self.buffer;
            self.store.reset_default_properties(b);
            for (id, property, animated) in self.pending.drain(..) {
                if animated {
                    self.store.set_property(id, b, property);
                } else {
                    self.store.bake_property(id, b, property);
                }
            }
            let update = self.store.update_nodes(b);
            self.buffer = b.other();
            (b, update)
        }
    }

    #[test]
    fn use_parent_position_matches_parent_in_every_buffer() {
        let mut h = Harness::new();
        let p = h.node(h.root);
        let n = h.node(p);
        h.store
            .set_position_inheritance_mode(n, PositionInheritanceMode::UseParentPosition);
        h.bake(p, NodeProperty::Position(Vec3::new(3.0, 4.0, 5.0)));
        h.bake(n, NodeProperty::Position(Vec3::new(100.0, 0.0, 0.0)));

        for _ in 0..3 {
            let (b, _) = h.frame();
            assert_eq!(
                h.store.world_position(n, b),
                h.store.world_position(p, b),
                "buffer {b:?}"
            );
        }
    }

    #[test]
    fn round_trip_plus_local_position() {
        let mut h = Harness::new();
        let a = h.node(h.root);
        let b = h.node(a);
        h.bake(a, NodeProperty::Position(Vec3::new(10.0, 0.0, 0.0)));
        h.bake(b, NodeProperty::Position(Vec3::new(0.0, 5.0, 0.0)));
        h.store.set_position_inheritance_mode(
            b,
            PositionInheritanceMode::UseParentPositionPlusLocalPosition,
        );
        let (buf, _) = h.frame();
        assert_eq!(h.store.world_position(b, buf), Vec3::new(10.0, 5.0, 0.0));
    }

    #[test]
    fn dont_inherit_position_uses_local_value() {
        let mut h = Harness::new();
        let a = h.node(h.root);
        let b = h.node(a);
        h.bake(a, NodeProperty::Position(Vec3::new(10.0, 0.0, 0.0)));
        h.bake(b, NodeProperty::Position(Vec3::new(1.0, 1.0, 0.0)));
        h.store
            .set_position_inheritance_mode(b, PositionInheritanceMode::DontInheritPosition);
        let (buf, _) = h.frame();
        assert_eq!(h.store.world_position(b, buf), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn parent_origin_and_anchor_point_place_child_at_corner() {
        let mut h = Harness::new();
        let parent = h.node(h.root);
        let child = h.node(parent);
        h.bake(parent, NodeProperty::Size(Vec3::new(100.0, 50.0, 0.0)));
        h.bake(child, NodeProperty::Size(Vec3::new(10.0, 10.0, 0.0)));
        h.bake(child, NodeProperty::AnchorPoint(Vec3::new(0.0, 0.0, 0.5)));
        // Default parent origin is the top-left corner.
        let (b, _) = h.frame();
        // Top-left corner of the parent is (-50, -25); a top-left anchor
        // moves the child's center by half its size.
        assert!(
            h.store
                .world_position(child, b)
                .abs_diff_eq(Vec3::new(-45.0, -20.0, 0.0), 1e-5),
            "got {}",
            h.store.world_position(child, b)
        );
    }

    #[test]
    fn parent_scale_and_rotation_apply_to_position() {
        let mut h = Harness::new();
        let parent = h.node(h.root);
        let child = h.node(parent);
        h.bake(parent, NodeProperty::Scale(Vec3::splat(2.0)));
        h.bake(
            parent,
            NodeProperty::Rotation(Quat::from_rotation_z(core::f32::consts::FRAC_PI_2)),
        );
        h.bake(child, NodeProperty::Position(Vec3::new(1.0, 0.0, 0.0)));
        h.bake(child, NodeProperty::ParentOrigin(Vec3::splat(0.5)));
        let (b, _) = h.frame();
        assert!(
            h.store
                .world_position(child, b)
                .abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5)
        );
        assert_eq!(h.store.world_scale(child, b), Vec3::splat(2.0));
    }

    #[test]
    fn inherit_flags_can_be_disabled() {
        let mut h = Harness::new();
        let parent = h.node(h.root);
        let child = h.node(parent);
        let rot = Quat::from_rotation_z(0.3);
        h.bake(parent, NodeProperty::Scale(Vec3::splat(3.0)));
        h.bake(parent, NodeProperty::Rotation(rot));
        h.store.set_inherit_scale(child, false);
        h.store.set_inherit_rotation(child, false);
        let (b, _) = h.frame();
        assert_eq!(h.store.world_scale(child, b), Vec3::ONE);
        assert_eq!(h.store.world_rotation(child, b), Quat::IDENTITY);
    }

    #[test]
    fn geometry_scale_sits_between_parent_and_local_scale() {
        let mut h = Harness::new();
        let parent = h.node(h.root);
        let child = h.node(parent);
        h.bake(parent, NodeProperty::Scale(Vec3::splat(2.0)));
        h.bake(child, NodeProperty::Scale(Vec3::new(1.0, 3.0, 1.0)));
        h.store.set_geometry_scale(child, Vec3::new(0.5, 1.0, 1.0));
        let (b, _) = h.frame();
        assert_eq!(h.store.world_scale(child, b), Vec3::new(1.0, 6.0, 2.0));

        h.store.set_geometry_scale(child, Vec3::ONE);
        let (b, _) = h.frame();
        assert_eq!(h.store.world_scale(child, b), Vec3::new(2.0, 6.0, 2.0));
    }

    #[test]
    fn world_matrix_matches_components() {
        let mut h = Harness::new();
        let n = h.node(h.root);
        h.bake(n, NodeProperty::Position(Vec3::new(1.0, 2.0, 3.0)));
        h.bake(n, NodeProperty::Scale(Vec3::new(2.0, 2.0, 1.0)));
        h.bake(n, NodeProperty::ParentOrigin(Vec3::splat(0.5)));
        let (b, _) = h.frame();
        let expected =
            Mat4::from_scale_rotation_translation(Vec3::new(2.0, 2.0, 1.0), Quat::IDENTITY, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(h.store.world_matrix(n, b), expected);
    }

    #[test]
    fn multiply_parent_alpha_is_exact() {
        let mut h = Harness::new();
        let p = h.node(h.root);
        let n = h.node(p);
        h.bake(p, NodeProperty::Color(Vec4::new(0.2, 0.4, 0.6, 0.5)));
        h.bake(n, NodeProperty::Color(Vec4::new(0.9, 0.8, 0.7, 0.6)));
        let (b, _) = h.frame();
        let c = h.store.world_color(n, b);
        assert_eq!(c.truncate(), Vec3::new(0.9, 0.8, 0.7));
        assert_eq!(c.w, 0.6 * 0.5);
    }

    #[test]
    fn color_modes() {
        let mut h = Harness::new();
        let p = h.node(h.root);
        let own = h.node(p);
        let parent = h.node(p);
        let mult = h.node(p);
        let pc = Vec4::new(0.5, 0.5, 0.5, 0.5);
        let oc = Vec4::new(1.0, 0.0, 1.0, 1.0);
        h.bake(p, NodeProperty::Color(pc));
        for n in [own, parent, mult] {
            h.bake(n, NodeProperty::Color(oc));
        }
        h.store.set_color_mode(own, ColorMode::UseOwnColor);
        h.store.set_color_mode(parent, ColorMode::UseParentColor);
        h.store
            .set_color_mode(mult, ColorMode::UseOwnMultiplyParentColor);
        let (b, _) = h.frame();
        assert_eq!(h.store.world_color(own, b), oc);
        assert_eq!(h.store.world_color(parent, b), pc);
        assert_eq!(h.store.world_color(mult, b), oc * pc);
    }

    #[test]
    fn dirty_flags_decay_after_a_quiet_frame() {
        let mut h = Harness::new();
        let a = h.node(h.root);
        let b = h.node(a);
        h.bake(b, NodeProperty::Position(Vec3::X));

        let (_, first) = h.frame();
        assert!(first.dirty.contains(NodeDirtyFlags::TRANSFORM));
        let (_, second) = h.frame();
        assert_eq!(h.store.frame_dirty_flags(a), NodeDirtyFlags::NOTHING);
        assert!(second.dirty.is_empty());
        let (_, third) = h.frame();
        assert_eq!(third.updated, 0);
        assert_eq!(h.store.frame_dirty_flags(b), NodeDirtyFlags::NOTHING);
    }

    #[test]
    fn inherited_flags_reach_clean_children() {
        let mut h = Harness::new();
        let a = h.node(h.root);
        let b = h.node(a);
        let _ = h.frame();
        let _ = h.frame();

        h.store.set_sort_modifier(a, 1.0);
        h.store.set_color_mode(a, ColorMode::UseOwnColor);
        let _ = h.frame();
        assert!(h.store.frame_dirty_flags(b).contains(NodeDirtyFlags::COLOR));
        assert!(
            !h.store
                .frame_dirty_flags(b)
                .contains(NodeDirtyFlags::SORT_MODIFIER),
            "sort modifier is local"
        );
    }

    #[test]
    fn clean_frames_copy_world_values_forward() {
        let mut h = Harness::new();
        let n = h.node(h.root);
        h.bake(n, NodeProperty::Position(Vec3::new(7.0, 0.0, 0.0)));
        h.bake(n, NodeProperty::ParentOrigin(Vec3::splat(0.5)));
        let (b0, _) = h.frame();
        let (b1, _) = h.frame();
        let (b0_again, _) = h.frame();
        assert_eq!(b0, b0_again);
        assert_eq!(h.store.world_position(n, b1), Vec3::new(7.0, 0.0, 0.0));
        assert_eq!(h.store.world_position(n, b0), Vec3::new(7.0, 0.0, 0.0));
    }

    #[test]
    fn animated_write_reverts_to_base() {
        let mut h = Harness::new();
        let n = h.node(h.root);
        h.bake(n, NodeProperty::ParentOrigin(Vec3::splat(0.5)));
        let _ = h.frame();
        let _ = h.frame();

        let b = h.buffer;
        h.animate(n, NodeProperty::Position(Vec3::new(3.0, 0.0, 0.0)));
        let (computed, _) = h.frame();
        assert_eq!(computed, b);
        assert_eq!(h.store.world_position(n, b), Vec3::new(3.0, 0.0, 0.0));
        let (other, _) = h.frame();
        assert_eq!(h.store.world_position(n, other), Vec3::ZERO);
        let _ = h.frame();
        assert_eq!(h.store.world_position(n, b), Vec3::ZERO);
    }

    #[test]
    fn shader_is_inherited_until_overridden() {
        let mut h = Harness::new();
        let a = h.node(h.root);
        let b = h.node(a);
        let c = h.node(b);
        let s1 = ShaderId::from_parts(1, 0);
        let s2 = ShaderId::from_parts(2, 0);
        h.store.apply_shader(a, s1);
        h.store.apply_shader(c, s2);
        let _ = h.frame();
        assert_eq!(h.store.inherited_shader(b), Some(s1));
        assert_eq!(h.store.inherited_shader(c), Some(s2));

        h.store.remove_shader(a);
        let _ = h.frame();
        assert_eq!(h.store.inherited_shader(b), None);
    }

    #[test]
    fn size_animation_is_reported_once() {
        let mut h = Harness::new();
        let n = h.node(h.root);
        let _ = h.frame();
        h.animate(n, NodeProperty::Size(Vec3::new(4.0, 4.0, 0.0)));
        let (_, first) = h.frame();
        assert_eq!(first.size_animations, vec![(n, Vec3::new(4.0, 4.0, 0.0))]);
        let (_, second) = h.frame();
        assert!(second.size_animations.is_empty());
    }

    #[test]
    fn traversal_order_is_depth_first_and_skips_disconnected() {
        let mut h = Harness::new();
        let a = h.node(h.root);
        let b = h.node(a);
        let c = h.node(h.root);
        let d = h.node(b);
        let orphan = h.alloc.allocate();
        h.store.insert(orphan);
        h.store.set_draw_mode(orphan, DrawMode::Overlay);

        let (_, update) = h.frame();
        assert!(update.topology_changed);
        let order = h.store.traversal_order();
        assert_eq!(
            order,
            &[h.root.index(), a.index(), b.index(), d.index(), c.index()]
        );

        let (_, update) = h.frame();
        assert!(!update.topology_changed);
    }

    #[test]
    fn cameras_follow_their_node() {
        let mut h = Harness::new();
        let cam = h.node(h.root);
        h.store
            .set_camera(cam, Some(Camera::for_surface(kurbo::Size::new(200.0, 100.0))));
        h.bake(cam, NodeProperty::Position(Vec3::new(0.0, 0.0, 50.0)));
        let detached = h.alloc.allocate();
        h.store.insert(detached);
        h.store
            .set_camera(detached, Some(Camera::for_surface(kurbo::Size::new(1.0, 1.0))));

        let (b, _) = h.frame();
        assert_eq!(h.store.update_cameras(b), 1);
        let view = h.store.camera(cam).map(|c| c.view_matrix(b));
        let expected = h.store.world_matrix(cam, b).inverse();
        assert!(
            view.is_some_and(|v| v.abs_diff_eq(expected, 1e-5)),
            "view is the inverse world matrix"
        );
        assert_eq!(
            h.store.camera(detached).map(|c| c.view_matrix(b)),
            Some(Mat4::IDENTITY),
            "disconnected cameras are not updated"
        );
    }
}
