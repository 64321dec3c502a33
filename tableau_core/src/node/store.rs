// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays node storage with topology and property management.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3, Vec4};
use smallvec::SmallVec;

use crate::camera::Camera;
use crate::math::{DEFAULT_ANCHOR_POINT, DEFAULT_PARENT_ORIGIN, WHITE};
use crate::property::{AnimatableProperty, BufferIndex, InheritedProperty, PropertyOwner};
use crate::render_task::RenderTaskId;
use crate::renderer::RendererId;
use crate::resource::ShaderId;
use crate::uniform::{UniformMap, UniformValue};

use super::flags::{ColorMode, DrawMode, NodeDirtyFlags, PositionInheritanceMode};
use super::id::{INVALID, NodeId};
use super::traverse::Children;

/// A write to one animatable property of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeProperty {
    /// Point of the parent the node is placed relative to, in `0..=1`.
    ParentOrigin(Vec3),
    /// Point of the node placed at its position, in `0..=1`.
    AnchorPoint(Vec3),
    /// Local position.
    Position(Vec3),
    /// Local rotation.
    Rotation(Quat),
    /// Local scale.
    Scale(Vec3),
    /// Size.
    Size(Vec3),
    /// Own visibility.
    Visible(bool),
    /// Own color.
    Color(Vec4),
}

/// Struct-of-arrays storage for all nodes.
///
/// Nodes are addressed by [`NodeId`] handles allocated on the event side.
/// A slot becomes live when the node is [inserted](Self::insert) and stops
/// being addressable when it is [removed](Self::remove); the slot index is
/// only reused after the handle is released to the allocator.
#[derive(Debug)]
pub struct NodeStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,
    pub(crate) root: u32,
    pub(crate) connected: Vec<bool>,
    pub(crate) layer: Vec<bool>,

    // -- Local properties --
    pub(crate) parent_origin: Vec<AnimatableProperty<Vec3>>,
    pub(crate) anchor_point: Vec<AnimatableProperty<Vec3>>,
    pub(crate) position: Vec<AnimatableProperty<Vec3>>,
    pub(crate) rotation: Vec<AnimatableProperty<Quat>>,
    pub(crate) scale: Vec<AnimatableProperty<Vec3>>,
    pub(crate) size: Vec<AnimatableProperty<Vec3>>,
    pub(crate) visible: Vec<AnimatableProperty<bool>>,
    pub(crate) color: Vec<AnimatableProperty<Vec4>>,

    // -- Inheritance policies --
    pub(crate) position_inheritance: Vec<PositionInheritanceMode>,
    pub(crate) color_mode: Vec<ColorMode>,
    pub(crate) inherit_rotation: Vec<bool>,
    pub(crate) inherit_scale: Vec<bool>,
    /// Extra scale between the parent and the local scale.
    pub(crate) geometry_scale: Vec<Vec3>,
    pub(crate) draw_mode: Vec<DrawMode>,
    pub(crate) sort_modifier: Vec<f32>,

    // -- World properties (written by the update traversal) --
    pub(crate) world_position: Vec<InheritedProperty<Vec3>>,
    pub(crate) world_rotation: Vec<InheritedProperty<Quat>>,
    pub(crate) world_scale: Vec<InheritedProperty<Vec3>>,
    pub(crate) world_color: Vec<InheritedProperty<Vec4>>,
    pub(crate) world_matrix: Vec<InheritedProperty<Mat4>>,

    // -- Attachments --
    pub(crate) renderers: Vec<SmallVec<[RendererId; 2]>>,
    pub(crate) camera: Vec<Option<Camera>>,
    pub(crate) applied_shader: Vec<Option<ShaderId>>,
    pub(crate) inherited_shader: Vec<Option<ShaderId>>,
    pub(crate) exclusive_task: Vec<Option<RenderTaskId>>,
    pub(crate) uniforms: Vec<Arc<UniformMap>>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,

    // -- Dirty tracking --
    pub(crate) dirty: Vec<NodeDirtyFlags>,
    pub(crate) frame_dirty: Vec<NodeDirtyFlags>,
    pub(crate) size_animated: Vec<bool>,

    // -- Traversal cache --
    pub(crate) traversal_order: Vec<u32>,
    pub(crate) traversal_dirty: bool,

    // -- Lifecycle tracking --
    pub(crate) pending_connected: Vec<NodeId>,
    pub(crate) pending_disconnected: Vec<NodeId>,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore {
    /// Creates an empty node store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            root: INVALID,
            connected: Vec::new(),
            layer: Vec::new(),
            parent_origin: Vec::new(),
            anchor_point: Vec::new(),
            position: Vec::new(),
            rotation: Vec::new(),
            scale: Vec::new(),
            size: Vec::new(),
            visible: Vec::new(),
            color: Vec::new(),
            position_inheritance: Vec::new(),
            color_mode: Vec::new(),
            inherit_rotation: Vec::new(),
            inherit_scale: Vec::new(),
            geometry_scale: Vec::new(),
            draw_mode: Vec::new(),
            sort_modifier: Vec::new(),
            world_position: Vec::new(),
            world_rotation: Vec::new(),
            world_scale: Vec::new(),
            world_color: Vec::new(),
            world_matrix: Vec::new(),
            renderers: Vec::new(),
            camera: Vec::new(),
            applied_shader: Vec::new(),
            inherited_shader: Vec::new(),
            exclusive_task: Vec::new(),
            uniforms: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            dirty: Vec::new(),
            frame_dirty: Vec::new(),
            size_animated: Vec::new(),
            traversal_order: Vec::new(),
            traversal_dirty: true,
            pending_connected: Vec::new(),
            pending_disconnected: Vec::new(),
        }
    }

    // -- Allocation API --

    /// Makes the slot of `id` live with default properties.
    ///
    /// The node starts disconnected, with no parent, and with every dirty
    /// flag set.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already live.
    pub fn insert(&mut self, id: NodeId) {
        let i = id.idx as usize;
        if i >= self.alive.len() {
            self.grow(i + 1);
        }
        assert!(!self.alive[i], "NodeId {id:?} inserted twice");

        self.parent[i] = INVALID;
        self.first_child[i] = INVALID;
        self.next_sibling[i] = INVALID;
        self.prev_sibling[i] = INVALID;
        self.connected[i] = false;
        self.layer[i] = false;
        self.parent_origin[i] = AnimatableProperty::new(DEFAULT_PARENT_ORIGIN);
        self.anchor_point[i] = AnimatableProperty::new(DEFAULT_ANCHOR_POINT);
        self.position[i] = AnimatableProperty::new(Vec3::ZERO);
        self.rotation[i] = AnimatableProperty::new(Quat::IDENTITY);
        self.scale[i] = AnimatableProperty::new(Vec3::ONE);
        self.size[i] = AnimatableProperty::new(Vec3::ZERO);
        self.visible[i] = AnimatableProperty::new(true);
        self.color[i] = AnimatableProperty::new(WHITE);
        self.position_inheritance[i] = PositionInheritanceMode::default();
        self.color_mode[i] = ColorMode::default();
        self.inherit_rotation[i] = true;
        self.inherit_scale[i] = true;
        self.geometry_scale[i] = Vec3::ONE;
        self.draw_mode[i] = DrawMode::default();
        self.sort_modifier[i] = 0.0;
        self.world_position[i] = InheritedProperty::new(Vec3::ZERO);
        self.world_rotation[i] = InheritedProperty::new(Quat::IDENTITY);
        self.world_scale[i] = InheritedProperty::new(Vec3::ONE);
        self.world_color[i] = InheritedProperty::new(WHITE);
        self.world_matrix[i] = InheritedProperty::new(Mat4::IDENTITY);
        self.renderers[i].clear();
        self.camera[i] = None;
        self.applied_shader[i] = None;
        self.inherited_shader[i] = None;
        self.exclusive_task[i] = None;
        self.uniforms[i] = Arc::default();
        self.generation[i] = id.generation;
        self.alive[i] = true;
        self.dirty[i] = NodeDirtyFlags::all();
        self.frame_dirty[i] = NodeDirtyFlags::NOTHING;
        self.size_animated[i] = false;
    }

    /// Removes a node from the store.
    ///
    /// Children of the node are orphaned; they stay live but disconnected.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the node is still connected.
    pub fn remove(&mut self, id: NodeId) {
        self.validate(id);
        let idx = id.idx;
        assert!(
            !self.connected[idx as usize],
            "cannot destroy connected node {id:?}"
        );
        if self.parent[idx as usize] != INVALID {
            self.unlink_from_parent(idx);
        }
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            let next = self.next_sibling[child as usize];
            self.parent[child as usize] = INVALID;
            self.prev_sibling[child as usize] = INVALID;
            self.next_sibling[child as usize] = INVALID;
            child = next;
        }
        self.first_child[idx as usize] = INVALID;
        if self.root == idx {
            self.root = INVALID;
        }
        self.camera[idx as usize] = None;
        self.alive[idx as usize] = false;
        self.traversal_dirty = true;
    }

    /// Returns whether the handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        let i = id.idx as usize;
        i < self.alive.len() && self.alive[i] && self.generation[i] == id.generation
    }

    // -- Topology API --

    /// Makes `id` the connected root of the scene.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale, a root is already installed, or the
    /// node has a parent.
    pub fn install_root(&mut self, id: NodeId) {
        self.validate(id);
        assert!(self.root == INVALID, "root node already installed");
        assert!(
            self.parent[id.idx as usize] == INVALID,
            "root node cannot have a parent"
        );
        self.root = id.idx;
        self.layer[id.idx as usize] = true;
        self.connect_subtree(id.idx);
        self.traversal_dirty = true;
    }

    /// Returns the root node, if one is installed.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        (self.root != INVALID).then(|| self.handle_at(self.root))
    }

    /// Adds `child` as the last child of `parent`.
    ///
    /// Every dirty flag of `child` is set. If `parent` is connected, the
    /// whole subtree of `child` becomes connected and is reported through
    /// [`drain_connected`](Self::drain_connected).
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale, `child` already has a parent, or
    /// `child` is the root.
    pub fn connect_child(&mut self, parent: NodeId, child: NodeId) {
        self.validate(parent);
        self.validate(child);
        let p = parent.idx;
        let c = child.idx;
        assert!(
            self.parent[c as usize] == INVALID,
            "child already has a parent"
        );
        assert!(c != self.root, "root node cannot have a parent");

        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }

        self.dirty[c as usize] = NodeDirtyFlags::all();
        if self.connected[p as usize] {
            self.connect_subtree(c);
        }
        self.traversal_dirty = true;
    }

    /// Removes `child` from `parent`.
    ///
    /// The parent is marked [`CHILD_DELETED`](NodeDirtyFlags::CHILD_DELETED)
    /// and the subtree of `child` is disconnected, each node being reported
    /// through [`drain_disconnected`](Self::drain_disconnected). The subtree
    /// itself stays intact.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale or `child` is not a child of
    /// `parent`.
    pub fn disconnect_child(&mut self, parent: NodeId, child: NodeId) {
        self.validate(parent);
        self.validate(child);
        let p = parent.idx;
        let c = child.idx;
        assert!(
            self.parent[c as usize] == p,
            "{child:?} is not a child of {parent:?}"
        );

        self.unlink_from_parent(c);
        self.dirty[p as usize] |= NodeDirtyFlags::CHILD_DELETED;
        if self.connected[c as usize] {
            self.disconnect_subtree(c);
        }
        self.traversal_dirty = true;
    }

    /// Returns the parent of a node, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        let p = self.parent[id.idx as usize];
        (p != INVALID).then(|| self.handle_at(p))
    }

    /// Returns an iterator over the direct children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Returns whether the node is part of the connected scene.
    #[must_use]
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.validate(id);
        self.connected[id.idx as usize]
    }

    /// Returns whether the node is the root.
    #[must_use]
    pub fn is_root(&self, id: NodeId) -> bool {
        self.validate(id);
        self.root == id.idx
    }

    /// Returns whether the node starts a new layer.
    #[must_use]
    pub fn is_layer(&self, id: NodeId) -> bool {
        self.validate(id);
        self.layer[id.idx as usize]
    }

    /// Marks a node as starting a new layer.
    pub fn set_layer(&mut self, id: NodeId, layer: bool) {
        self.validate(id);
        self.layer[id.idx as usize] = layer;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::OVERLAY;
    }

    /// Number of ancestors of a node.
    #[must_use]
    pub fn depth(&self, id: NodeId) -> u32 {
        self.validate(id);
        let mut depth = 0;
        let mut p = self.parent[id.idx as usize];
        while p != INVALID {
            depth += 1;
            p = self.parent[p as usize];
        }
        depth
    }

    /// Returns whether `ancestor` is a strict ancestor of `id`.
    #[must_use]
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.validate(id);
        self.validate(ancestor);
        let mut p = self.parent[id.idx as usize];
        while p != INVALID {
            if p == ancestor.idx {
                return true;
            }
            p = self.parent[p as usize];
        }
        false
    }

    /// Returns whether the node and every ancestor are visible in `buffer`.
    #[must_use]
    pub fn is_fully_visible(&self, id: NodeId, buffer: BufferIndex) -> bool {
        self.validate(id);
        let mut i = id.idx;
        while i != INVALID {
            if !self.visible[i as usize].get(buffer) {
                return false;
            }
            i = self.parent[i as usize];
        }
        true
    }

    // -- Property API --

    /// Writes `property` to `buffer` and its base value.
    pub fn bake_property(&mut self, id: NodeId, buffer: BufferIndex, property: NodeProperty) {
        self.validate(id);
        let i = id.idx as usize;
        match property {
            NodeProperty::ParentOrigin(v) => self.parent_origin[i].bake(buffer, v),
            NodeProperty::AnchorPoint(v) => self.anchor_point[i].bake(buffer, v),
            NodeProperty::Position(v) => self.position[i].bake(buffer, v),
            NodeProperty::Rotation(q) => self.rotation[i].bake(buffer, q),
            NodeProperty::Scale(v) => self.scale[i].bake(buffer, v),
            NodeProperty::Size(v) => self.size[i].bake(buffer, v),
            NodeProperty::Visible(v) => self.visible[i].bake(buffer, v),
            NodeProperty::Color(c) => self.color[i].bake(buffer, c),
        }
    }

    /// Writes `property` to `buffer` only.
    ///
    /// A size write is reported once as a size animation by the next update.
    pub fn set_property(&mut self, id: NodeId, buffer: BufferIndex, property: NodeProperty) {
        self.validate(id);
        let i = id.idx as usize;
        match property {
            NodeProperty::ParentOrigin(v) => self.parent_origin[i].set(buffer, v),
            NodeProperty::AnchorPoint(v) => self.anchor_point[i].set(buffer, v),
            NodeProperty::Position(v) => self.position[i].set(buffer, v),
            NodeProperty::Rotation(q) => self.rotation[i].set(buffer, q),
            NodeProperty::Scale(v) => self.scale[i].set(buffer, v),
            NodeProperty::Size(v) => {
                self.size[i].set(buffer, v);
                self.size_animated[i] = true;
            }
            NodeProperty::Visible(v) => self.visible[i].set(buffer, v),
            NodeProperty::Color(c) => self.color[i].set(buffer, c),
        }
    }

    /// Sets how the world position is derived.
    pub fn set_position_inheritance_mode(&mut self, id: NodeId, mode: PositionInheritanceMode) {
        self.validate(id);
        self.position_inheritance[id.idx as usize] = mode;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::TRANSFORM;
    }

    /// Sets how the world color is derived.
    pub fn set_color_mode(&mut self, id: NodeId, mode: ColorMode) {
        self.validate(id);
        self.color_mode[id.idx as usize] = mode;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::COLOR;
    }

    /// Sets whether the parent's world rotation is inherited.
    pub fn set_inherit_rotation(&mut self, id: NodeId, inherit: bool) {
        self.validate(id);
        self.inherit_rotation[id.idx as usize] = inherit;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::TRANSFORM;
    }

    /// Sets whether the parent's world scale is inherited.
    pub fn set_inherit_scale(&mut self, id: NodeId, inherit: bool) {
        self.validate(id);
        self.inherit_scale[id.idx as usize] = inherit;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::TRANSFORM;
    }

    /// Sets the scale applied between the parent's world scale and the
    /// node's local scale.
    pub fn set_geometry_scale(&mut self, id: NodeId, scale: Vec3) {
        self.validate(id);
        self.geometry_scale[id.idx as usize] = scale;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::TRANSFORM;
    }

    /// Sets the draw mode.
    pub fn set_draw_mode(&mut self, id: NodeId, mode: DrawMode) {
        self.validate(id);
        self.draw_mode[id.idx as usize] = mode;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::OVERLAY;
    }

    /// Sets the sort modifier.
    pub fn set_sort_modifier(&mut self, id: NodeId, modifier: f32) {
        self.validate(id);
        self.sort_modifier[id.idx as usize] = modifier;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::SORT_MODIFIER;
    }

    /// Applies a shader to the node and, through inheritance, its subtree.
    pub fn apply_shader(&mut self, id: NodeId, shader: ShaderId) {
        self.validate(id);
        self.applied_shader[id.idx as usize] = Some(shader);
        self.dirty[id.idx as usize] |= NodeDirtyFlags::SHADER;
    }

    /// Removes the applied shader.
    pub fn remove_shader(&mut self, id: NodeId) {
        self.validate(id);
        self.applied_shader[id.idx as usize] = None;
        self.dirty[id.idx as usize] |= NodeDirtyFlags::SHADER;
    }

    /// Appends a renderer.
    pub fn add_renderer(&mut self, id: NodeId, renderer: RendererId) {
        self.validate(id);
        let list = &mut self.renderers[id.idx as usize];
        if !list.contains(&renderer) {
            list.push(renderer);
        }
    }

    /// Detaches a renderer.
    pub fn remove_renderer(&mut self, id: NodeId, renderer: RendererId) {
        self.validate(id);
        self.renderers[id.idx as usize].retain(|r| *r != renderer);
    }

    /// Attaches or detaches a camera.
    pub fn set_camera(&mut self, id: NodeId, camera: Option<Camera>) {
        self.validate(id);
        self.camera[id.idx as usize] = camera;
    }

    /// Adds or updates a custom uniform of the node.
    pub fn register_uniform(&mut self, id: NodeId, name: &str, value: UniformValue) {
        self.validate(id);
        Arc::make_mut(&mut self.uniforms[id.idx as usize]).insert(name, value);
    }

    /// Removes a custom uniform of the node.
    pub fn remove_uniform(&mut self, id: NodeId, name: &str) {
        self.validate(id);
        Arc::make_mut(&mut self.uniforms[id.idx as usize]).remove(name);
    }

    // -- Property getters --

    /// Parent origin in `buffer`.
    #[must_use]
    pub fn parent_origin(&self, id: NodeId, buffer: BufferIndex) -> Vec3 {
        self.validate(id);
        self.parent_origin[id.idx as usize].get(buffer)
    }

    /// Anchor point in `buffer`.
    #[must_use]
    pub fn anchor_point(&self, id: NodeId, buffer: BufferIndex) -> Vec3 {
        self.validate(id);
        self.anchor_point[id.idx as usize].get(buffer)
    }

    /// Local position in `buffer`.
    #[must_use]
    pub fn position(&self, id: NodeId, buffer: BufferIndex) -> Vec3 {
        self.validate(id);
        self.position[id.idx as usize].get(buffer)
    }

    /// Local rotation in `buffer`.
    #[must_use]
    pub fn rotation(&self, id: NodeId, buffer: BufferIndex) -> Quat {
        self.validate(id);
        self.rotation[id.idx as usize].get(buffer)
    }

    /// Local scale in `buffer`.
    #[must_use]
    pub fn scale(&self, id: NodeId, buffer: BufferIndex) -> Vec3 {
        self.validate(id);
        self.scale[id.idx as usize].get(buffer)
    }

    /// Size in `buffer`.
    #[must_use]
    pub fn size(&self, id: NodeId, buffer: BufferIndex) -> Vec3 {
        self.validate(id);
        self.size[id.idx as usize].get(buffer)
    }

    /// Own visibility in `buffer`.
    #[must_use]
    pub fn visible(&self, id: NodeId, buffer: BufferIndex) -> bool {
        self.validate(id);
        self.visible[id.idx as usize].get(buffer)
    }

    /// Own color in `buffer`.
    #[must_use]
    pub fn color(&self, id: NodeId, buffer: BufferIndex) -> Vec4 {
        self.validate(id);
        self.color[id.idx as usize].get(buffer)
    }

    /// World position in `buffer`.
    ///
    /// Only valid after an update has computed `buffer`.
    #[must_use]
    pub fn world_position(&self, id: NodeId, buffer: BufferIndex) -> Vec3 {
        self.validate(id);
        self.world_position[id.idx as usize].get(buffer)
    }

    /// World rotation in `buffer`.
    #[must_use]
    pub fn world_rotation(&self, id: NodeId, buffer: BufferIndex) -> Quat {
        self.validate(id);
        self.world_rotation[id.idx as usize].get(buffer)
    }

    /// World scale in `buffer`.
    #[must_use]
    pub fn world_scale(&self, id: NodeId, buffer: BufferIndex) -> Vec3 {
        self.validate(id);
        self.world_scale[id.idx as usize].get(buffer)
    }

    /// World color in `buffer`.
    #[must_use]
    pub fn world_color(&self, id: NodeId, buffer: BufferIndex) -> Vec4 {
        self.validate(id);
        self.world_color[id.idx as usize].get(buffer)
    }

    /// World matrix in `buffer`.
    #[must_use]
    pub fn world_matrix(&self, id: NodeId, buffer: BufferIndex) -> Mat4 {
        self.validate(id);
        self.world_matrix[id.idx as usize].get(buffer)
    }

    /// Position inheritance mode.
    #[must_use]
    pub fn position_inheritance_mode(&self, id: NodeId) -> PositionInheritanceMode {
        self.validate(id);
        self.position_inheritance[id.idx as usize]
    }

    /// Color mode.
    #[must_use]
    pub fn color_mode(&self, id: NodeId) -> ColorMode {
        self.validate(id);
        self.color_mode[id.idx as usize]
    }

    /// Draw mode.
    #[must_use]
    pub fn draw_mode(&self, id: NodeId) -> DrawMode {
        self.validate(id);
        self.draw_mode[id.idx as usize]
    }

    /// Sort modifier.
    #[must_use]
    pub fn sort_modifier(&self, id: NodeId) -> f32 {
        self.validate(id);
        self.sort_modifier[id.idx as usize]
    }

    /// Shader inherited from the node or its ancestors.
    #[must_use]
    pub fn inherited_shader(&self, id: NodeId) -> Option<ShaderId> {
        self.validate(id);
        self.inherited_shader[id.idx as usize]
    }

    /// Attached renderers, in draw order.
    #[must_use]
    pub fn renderers(&self, id: NodeId) -> &[RendererId] {
        self.validate(id);
        &self.renderers[id.idx as usize]
    }

    /// Attached camera.
    #[must_use]
    pub fn camera(&self, id: NodeId) -> Option<&Camera> {
        self.validate(id);
        self.camera[id.idx as usize].as_ref()
    }

    /// Mutable access to the attached camera.
    pub fn camera_mut(&mut self, id: NodeId) -> Option<&mut Camera> {
        self.validate(id);
        self.camera[id.idx as usize].as_mut()
    }

    /// The render task that owns this node exclusively, if any.
    #[must_use]
    pub fn exclusive_task(&self, id: NodeId) -> Option<RenderTaskId> {
        self.validate(id);
        self.exclusive_task[id.idx as usize]
    }

    pub(crate) fn set_exclusive_task(&mut self, id: NodeId, task: Option<RenderTaskId>) {
        self.validate(id);
        self.exclusive_task[id.idx as usize] = task;
    }

    /// Custom uniforms of the node.
    #[must_use]
    pub fn uniforms(&self, id: NodeId) -> &Arc<UniformMap> {
        self.validate(id);
        &self.uniforms[id.idx as usize]
    }

    /// Flags requested for the next update, before inheritance.
    #[must_use]
    pub fn dirty_flags(&self, id: NodeId) -> NodeDirtyFlags {
        self.validate(id);
        self.dirty[id.idx as usize]
    }

    /// Effective flags consumed by the last update.
    #[must_use]
    pub fn frame_dirty_flags(&self, id: NodeId) -> NodeDirtyFlags {
        self.validate(id);
        self.frame_dirty[id.idx as usize]
    }

    // -- Lifecycle --

    /// Returns nodes connected since the last call.
    pub fn drain_connected(&mut self) -> Vec<NodeId> {
        core::mem::take(&mut self.pending_connected)
    }

    /// Returns nodes disconnected since the last call.
    pub fn drain_disconnected(&mut self) -> Vec<NodeId> {
        core::mem::take(&mut self.pending_disconnected)
    }

    // -- Raw-index accessors --

    /// Returns the live handle at raw slot `idx`.
    pub(crate) fn handle_at(&self, idx: u32) -> NodeId {
        NodeId::from_parts(idx, self.generation[idx as usize])
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: NodeId) {
        assert!(
            self.is_alive(id),
            "stale NodeId: {id:?} (current gen: {})",
            self.generation
                .get(id.idx as usize)
                .copied()
                .unwrap_or(u32::MAX)
        );
    }

    fn grow(&mut self, len: usize) {
        self.parent.resize(len, INVALID);
        self.first_child.resize(len, INVALID);
        self.next_sibling.resize(len, INVALID);
        self.prev_sibling.resize(len, INVALID);
        self.connected.resize(len, false);
        self.layer.resize(len, false);
        self.parent_origin
            .resize(len, AnimatableProperty::new(DEFAULT_PARENT_ORIGIN));
        self.anchor_point
            .resize(len, AnimatableProperty::new(DEFAULT_ANCHOR_POINT));
        self.position.resize(len, AnimatableProperty::new(Vec3::ZERO));
        self.rotation
            .resize(len, AnimatableProperty::new(Quat::IDENTITY));
        self.scale.resize(len, AnimatableProperty::new(Vec3::ONE));
        self.size.resize(len, AnimatableProperty::new(Vec3::ZERO));
        self.visible.resize(len, AnimatableProperty::new(true));
        self.color.resize(len, AnimatableProperty::new(WHITE));
        self.position_inheritance
            .resize(len, PositionInheritanceMode::default());
        self.color_mode.resize(len, ColorMode::default());
        self.inherit_rotation.resize(len, true);
        self.inherit_scale.resize(len, true);
        self.geometry_scale.resize(len, Vec3::ONE);
        self.draw_mode.resize(len, DrawMode::default());
        self.sort_modifier.resize(len, 0.0);
        self.world_position
            .resize(len, InheritedProperty::new(Vec3::ZERO));
        self.world_rotation
            .resize(len, InheritedProperty::new(Quat::IDENTITY));
        self.world_scale.resize(len, InheritedProperty::new(Vec3::ONE));
        self.world_color.resize(len, InheritedProperty::new(WHITE));
        self.world_matrix
            .resize(len, InheritedProperty::new(Mat4::IDENTITY));
        self.renderers.resize_with(len, SmallVec::new);
        self.camera.resize_with(len, || None);
        self.applied_shader.resize(len, None);
        self.inherited_shader.resize(len, None);
        self.exclusive_task.resize(len, None);
        self.uniforms.resize_with(len, Arc::default);
        self.generation.resize(len, 0);
        self.alive.resize(len, false);
        self.dirty.resize(len, NodeDirtyFlags::NOTHING);
        self.frame_dirty.resize(len, NodeDirtyFlags::NOTHING);
        self.size_animated.resize(len, false);
    }

    /// Removes `idx` from its parent's child list.
    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }

        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    fn connect_subtree(&mut self, idx: u32) {
        self.connected[idx as usize] = true;
        self.dirty[idx as usize] = NodeDirtyFlags::all();
        self.pending_connected.push(self.handle_at(idx));
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            self.connect_subtree(child);
            child = self.next_sibling[child as usize];
        }
    }

    fn disconnect_subtree(&mut self, idx: u32) {
        self.connected[idx as usize] = false;
        self.pending_disconnected.push(self.handle_at(idx));
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            self.disconnect_subtree(child);
            child = self.next_sibling[child as usize];
        }
    }
}

impl PropertyOwner for NodeStore {
    fn reset_default_properties(&mut self, buffer: BufferIndex) {
        for i in 0..self.alive.len() {
            if !self.alive[i] {
                continue;
            }
            self.parent_origin[i].reset_to_base_value(buffer);
            self.anchor_point[i].reset_to_base_value(buffer);
            self.position[i].reset_to_base_value(buffer);
            self.rotation[i].reset_to_base_value(buffer);
            self.scale[i].reset_to_base_value(buffer);
            self.size[i].reset_to_base_value(buffer);
            self.visible[i].reset_to_base_value(buffer);
            self.color[i].reset_to_base_value(buffer);
        }
    }
}
