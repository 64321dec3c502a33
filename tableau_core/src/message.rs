// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Messages from the event stage to the update stage, and notifications
//! back.
//!
//! The event side never touches scene state directly. It allocates handles
//! up front and queues [`Message`]s through [`EventToUpdate`]; the
//! [`UpdateManager`](crate::update::UpdateManager) applies them in order at
//! the start of its next update. Results flow back as [`Notification`]s.

use std::sync::mpsc::Sender;

use glam::{Vec3, Vec4};
use kurbo::{Rect, Size};

use crate::camera::{Camera, DEFAULT_FIELD_OF_VIEW};
use crate::handle::HandleAllocator;
use crate::node::{ColorMode, DrawMode, NodeId, NodeKind, NodeProperty, PositionInheritanceMode};
use crate::render_task::{RenderTaskId, RenderTaskKind, RenderTaskMessage};
use crate::renderer::{RendererDesc, RendererId, RendererKind, RendererMessage};
use crate::resource::{
    FrameBufferDesc, FrameBufferId, FrameBufferKind, GeometryDesc, GeometryId, GeometryKind,
    ResourceMessage, ShaderData, ShaderId, ShaderKind, TextureDesc, TextureId, TextureKind,
};
use crate::uniform::UniformValue;

/// A change to the update-side scene.
#[derive(Clone, Debug)]
pub enum Message {
    // -- Nodes --
    /// Creates a node with default properties.
    AddNode(NodeId),
    /// Destroys a disconnected node.
    DestroyNode(NodeId),
    /// Installs the scene root.
    InstallRoot(NodeId),
    /// Appends `child` to `parent`.
    ConnectChild {
        /// New parent.
        parent: NodeId,
        /// Node to attach.
        child: NodeId,
    },
    /// Removes `child` from `parent`.
    DisconnectChild {
        /// Current parent.
        parent: NodeId,
        /// Node to detach.
        child: NodeId,
    },
    /// Writes a property to the computed buffer and its base value.
    BakeProperty(NodeId, NodeProperty),
    /// Writes a property for one frame.
    SetProperty(NodeId, NodeProperty),
    /// Sets how the world position is derived.
    SetPositionInheritanceMode(NodeId, PositionInheritanceMode),
    /// Sets how the world color is derived.
    SetColorMode(NodeId, ColorMode),
    /// Sets whether the parent rotation is inherited.
    SetInheritRotation(NodeId, bool),
    /// Sets whether the parent scale is inherited.
    SetInheritScale(NodeId, bool),
    /// Sets the scale between the parent and local scale.
    SetGeometryScale(NodeId, Vec3),
    /// Sets the draw mode.
    SetDrawMode(NodeId, DrawMode),
    /// Sets the sort modifier.
    SetSortModifier(NodeId, f32),
    /// Marks a node as starting a layer.
    SetLayer(NodeId, bool),
    /// Applies a shader to a subtree.
    ApplyShader(NodeId, ShaderId),
    /// Removes the applied shader.
    RemoveShader(NodeId),
    /// Attaches or detaches a camera.
    SetCamera(NodeId, Option<Box<Camera>>),
    /// Adds or updates a custom uniform of a node.
    RegisterNodeUniform(NodeId, String, UniformValue),
    /// Removes a custom uniform of a node.
    RemoveNodeUniform(NodeId, String),

    // -- Renderers --
    /// Creates a renderer.
    AddRenderer(RendererId, Box<RendererDesc>),
    /// Changes a renderer.
    UpdateRenderer(RendererId, RendererMessage),
    /// Destroys a renderer.
    RemoveRenderer(RendererId),
    /// Appends a renderer to a node.
    AttachRenderer {
        /// Node drawn by the renderer.
        node: NodeId,
        /// Renderer to attach.
        renderer: RendererId,
    },
    /// Removes a renderer from a node.
    DetachRenderer {
        /// Node drawn by the renderer.
        node: NodeId,
        /// Renderer to detach.
        renderer: RendererId,
    },

    // -- Render tasks --
    /// Appends a render task.
    AddRenderTask(RenderTaskId),
    /// Changes a render task.
    RenderTask(RenderTaskId, RenderTaskMessage),
    /// Removes a render task.
    RemoveRenderTask(RenderTaskId),

    // -- Stage --
    /// Creates, updates, or releases a resource.
    Resource(ResourceMessage),
    /// Keeps rendering for at least this many seconds.
    KeepRendering(f32),
    /// Sets the surface clear color.
    SetBackgroundColor(Vec4),
    /// Resizes the surface.
    SetSurfaceRect(Rect),
}

/// A notification from the update stage to the event stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Notification {
    /// The node became part of the connected scene.
    StageConnection(NodeId),
    /// The node left the connected scene.
    StageDisconnection(NodeId),
    /// The node's size was animated this frame.
    SizeAnimation {
        /// Animated node.
        node: NodeId,
        /// Size in the computed buffer.
        size: Vec3,
    },
    /// A render-once task finished drawing.
    RenderTaskFinished(RenderTaskId),
}

/// Handle allocators shared by the event and update stages.
///
/// Clones share the same slots.
#[derive(Clone, Debug, Default)]
pub struct HandleAllocators {
    /// Nodes.
    pub nodes: HandleAllocator<NodeKind>,
    /// Renderers.
    pub renderers: HandleAllocator<RendererKind>,
    /// Render tasks.
    pub tasks: HandleAllocator<RenderTaskKind>,
    /// Shaders.
    pub shaders: HandleAllocator<ShaderKind>,
    /// Geometries.
    pub geometries: HandleAllocator<GeometryKind>,
    /// Textures.
    pub textures: HandleAllocator<TextureKind>,
    /// Render targets.
    pub frame_buffers: HandleAllocator<FrameBufferKind>,
}

/// The event side's entry point into the update stage.
///
/// Every method allocates what it needs and queues a [`Message`]; nothing
/// takes effect until the next update. Once the update stage is gone,
/// messages are dropped.
#[derive(Clone, Debug)]
pub struct EventToUpdate {
    sender: Sender<Message>,
    handles: HandleAllocators,
    root: NodeId,
    default_camera: NodeId,
    default_task: RenderTaskId,
}

impl EventToUpdate {
    /// Allocates the root node, the default camera, and the default task,
    /// and queues their setup for a surface of `surface` size.
    pub(crate) fn new(sender: Sender<Message>, handles: HandleAllocators, surface: Size) -> Self {
        let root = handles.nodes.allocate();
        let default_camera = handles.nodes.allocate();
        let default_task = handles.tasks.allocate();
        let this = Self {
            sender,
            handles,
            root,
            default_camera,
            default_task,
        };

        this.send(Message::AddNode(root));
        this.send(Message::InstallRoot(root));
        this.send(Message::AddNode(default_camera));
        this.send(Message::BakeProperty(
            default_camera,
            NodeProperty::ParentOrigin(Vec3::splat(0.5)),
        ));
        this.send(Message::ConnectChild {
            parent: root,
            child: default_camera,
        });
        this.set_surface_rect(surface.to_rect());
        this.send(Message::AddRenderTask(default_task));
        this.send(Message::RenderTask(
            default_task,
            RenderTaskMessage::SetSourceNode(Some(root)),
        ));
        this.send(Message::RenderTask(
            default_task,
            RenderTaskMessage::SetCameraNode(Some(default_camera)),
        ));
        this
    }

    /// Queues a raw message.
    pub fn send(&self, message: Message) {
        if self.sender.send(message).is_err() {
            log::debug!("update stage gone; message dropped");
        }
    }

    /// The scene root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The camera node of the default task.
    #[must_use]
    pub fn default_camera(&self) -> NodeId {
        self.default_camera
    }

    /// The task drawing the whole scene to the surface.
    #[must_use]
    pub fn default_task(&self) -> RenderTaskId {
        self.default_task
    }

    /// The shared handle allocators.
    #[must_use]
    pub fn handles(&self) -> &HandleAllocators {
        &self.handles
    }

    // -- Nodes --

    /// Creates a disconnected node.
    #[must_use]
    pub fn create_node(&self) -> NodeId {
        let id = self.handles.nodes.allocate();
        self.send(Message::AddNode(id));
        id
    }

    /// Destroys a node; it must be disconnected by then.
    pub fn destroy_node(&self, node: NodeId) {
        self.send(Message::DestroyNode(node));
    }

    /// Appends `child` to `parent`.
    pub fn connect(&self, parent: NodeId, child: NodeId) {
        self.send(Message::ConnectChild { parent, child });
    }

    /// Removes `child` from `parent`.
    pub fn disconnect(&self, parent: NodeId, child: NodeId) {
        self.send(Message::DisconnectChild { parent, child });
    }

    /// Bakes a property.
    pub fn bake(&self, node: NodeId, property: NodeProperty) {
        self.send(Message::BakeProperty(node, property));
    }

    /// Animates a property for one frame.
    pub fn set(&self, node: NodeId, property: NodeProperty) {
        self.send(Message::SetProperty(node, property));
    }

    /// Sets how the world position is derived.
    pub fn set_position_inheritance_mode(&self, node: NodeId, mode: PositionInheritanceMode) {
        self.send(Message::SetPositionInheritanceMode(node, mode));
    }

    /// Sets how the world color is derived.
    pub fn set_color_mode(&self, node: NodeId, mode: ColorMode) {
        self.send(Message::SetColorMode(node, mode));
    }

    /// Sets whether the parent rotation is inherited.
    pub fn set_inherit_rotation(&self, node: NodeId, inherit: bool) {
        self.send(Message::SetInheritRotation(node, inherit));
    }

    /// Sets whether the parent scale is inherited.
    pub fn set_inherit_scale(&self, node: NodeId, inherit: bool) {
        self.send(Message::SetInheritScale(node, inherit));
    }

    /// Sets the scale applied between the parent and local scale.
    pub fn set_geometry_scale(&self, node: NodeId, scale: Vec3) {
        self.send(Message::SetGeometryScale(node, scale));
    }

    /// Sets the draw mode.
    pub fn set_draw_mode(&self, node: NodeId, mode: DrawMode) {
        self.send(Message::SetDrawMode(node, mode));
    }

    /// Sets the sort modifier.
    pub fn set_sort_modifier(&self, node: NodeId, modifier: f32) {
        self.send(Message::SetSortModifier(node, modifier));
    }

    /// Marks a node as starting a layer.
    pub fn set_layer(&self, node: NodeId, layer: bool) {
        self.send(Message::SetLayer(node, layer));
    }

    /// Applies a shader to a subtree.
    pub fn apply_shader(&self, node: NodeId, shader: ShaderId) {
        self.send(Message::ApplyShader(node, shader));
    }

    /// Removes the applied shader.
    pub fn remove_shader(&self, node: NodeId) {
        self.send(Message::RemoveShader(node));
    }

    /// Attaches or detaches a camera.
    pub fn set_camera(&self, node: NodeId, camera: Option<Camera>) {
        self.send(Message::SetCamera(node, camera.map(Box::new)));
    }

    /// Adds or updates a custom uniform of a node.
    pub fn register_uniform(&self, node: NodeId, name: &str, value: UniformValue) {
        self.send(Message::RegisterNodeUniform(node, name.into(), value));
    }

    // -- Renderers --

    /// Creates a renderer.
    #[must_use]
    pub fn create_renderer(&self, desc: RendererDesc) -> RendererId {
        let id = self.handles.renderers.allocate();
        self.send(Message::AddRenderer(id, Box::new(desc)));
        id
    }

    /// Changes a renderer.
    pub fn update_renderer(&self, renderer: RendererId, message: RendererMessage) {
        self.send(Message::UpdateRenderer(renderer, message));
    }

    /// Destroys a renderer.
    pub fn remove_renderer(&self, renderer: RendererId) {
        self.send(Message::RemoveRenderer(renderer));
    }

    /// Appends a renderer to a node.
    pub fn attach_renderer(&self, node: NodeId, renderer: RendererId) {
        self.send(Message::AttachRenderer { node, renderer });
    }

    /// Removes a renderer from a node.
    pub fn detach_renderer(&self, node: NodeId, renderer: RendererId) {
        self.send(Message::DetachRenderer { node, renderer });
    }

    // -- Render tasks --

    /// Appends a render task drawing `source` through `camera`.
    #[must_use]
    pub fn create_render_task(&self, source: NodeId, camera: NodeId) -> RenderTaskId {
        let id = self.handles.tasks.allocate();
        self.send(Message::AddRenderTask(id));
        self.send(Message::RenderTask(
            id,
            RenderTaskMessage::SetSourceNode(Some(source)),
        ));
        self.send(Message::RenderTask(
            id,
            RenderTaskMessage::SetCameraNode(Some(camera)),
        ));
        id
    }

    /// Changes a render task.
    pub fn update_render_task(&self, task: RenderTaskId, message: RenderTaskMessage) {
        self.send(Message::RenderTask(task, message));
    }

    /// Removes a render task.
    pub fn remove_render_task(&self, task: RenderTaskId) {
        self.send(Message::RemoveRenderTask(task));
    }

    // -- Resources --

    /// Registers shader sources.
    #[must_use]
    pub fn create_shader(&self, data: ShaderData) -> ShaderId {
        let id = self.handles.shaders.allocate();
        self.send(Message::Resource(ResourceMessage::AddShader(id, data)));
        id
    }

    /// Registers a geometry.
    #[must_use]
    pub fn create_geometry(&self, desc: GeometryDesc) -> GeometryId {
        let id = self.handles.geometries.allocate();
        self.send(Message::Resource(ResourceMessage::AddGeometry(id, desc)));
        id
    }

    /// Registers a texture.
    #[must_use]
    pub fn create_texture(&self, desc: TextureDesc) -> TextureId {
        let id = self.handles.textures.allocate();
        self.send(Message::Resource(ResourceMessage::AddTexture(id, desc)));
        id
    }

    /// Registers an off-screen render target.
    #[must_use]
    pub fn create_frame_buffer(&self, desc: FrameBufferDesc) -> FrameBufferId {
        let id = self.handles.frame_buffers.allocate();
        self.send(Message::Resource(ResourceMessage::AddFrameBuffer(id, desc)));
        id
    }

    /// Creates, updates, or releases a resource.
    pub fn resource(&self, message: ResourceMessage) {
        self.send(Message::Resource(message));
    }

    // -- Stage --

    /// Keeps rendering for at least `seconds`.
    pub fn keep_rendering(&self, seconds: f32) {
        self.send(Message::KeepRendering(seconds));
    }

    /// Sets the surface clear color.
    pub fn set_background_color(&self, color: Vec4) {
        self.send(Message::SetBackgroundColor(color));
    }

    /// Resizes the surface.
    ///
    /// The root takes the surface size and the default camera is moved back
    /// so that one world unit still maps to one pixel.
    pub fn set_surface_rect(&self, rect: Rect) {
        let camera = Camera::for_surface(rect.size());
        #[expect(
            clippy::cast_possible_truncation,
            reason = "surface sizes fit in single precision"
        )]
        let height = rect.height() as f32;
        let distance = Camera::stage_distance(height, DEFAULT_FIELD_OF_VIEW);
        self.send(Message::SetSurfaceRect(rect));
        self.send(Message::BakeProperty(
            self.default_camera,
            NodeProperty::Position(Vec3::new(0.0, 0.0, distance)),
        ));
        self.send(Message::SetCamera(self.default_camera, Some(Box::new(camera))));
    }
}
