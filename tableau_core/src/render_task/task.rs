// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A single render task and its refresh state machine.

use core::fmt;
use std::sync::Arc;

use glam::{Vec2, Vec4};
use kurbo::{Point, Rect};

use crate::instruction::{RenderInstruction, RenderTracker};
use crate::node::{NodeId, NodeStore};
use crate::property::{AnimatableProperty, BufferIndex, PropertyOwner};
use crate::resource::FrameBufferId;

use super::{REFRESH_ALWAYS, REFRESH_ONCE, RenderTaskId};

/// Clear color used when none is set.
pub const DEFAULT_CLEAR_COLOR: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

/// Refresh state of a render task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTaskState {
    /// Rendering every `refresh_rate` frames.
    Continuous,
    /// A render-once task that has not rendered yet.
    WaitingToRender,
    /// A render-once task that rendered and waits to report it.
    RenderedOnce,
    /// A render-once task that reported completion.
    Notified,
}

/// Converts screen coordinates into the coordinate space of an off-screen
/// task, for hit testing.
#[derive(Clone, Default)]
pub enum CoordinateMapping {
    /// Off-screen tasks receive no input.
    #[default]
    None,
    /// The framebuffer is displayed on this node; screen points are mapped
    /// onto its local plane through the default task's camera.
    Node(NodeId),
    /// A callback rewrites the point in place and returns whether it lies
    /// inside the target.
    Function(Arc<dyn Fn(&mut Point) -> bool + Send + Sync>),
}

impl fmt::Debug for CoordinateMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Node(id) => f.debug_tuple("Node").field(id).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A change to one render task.
#[derive(Clone, Debug)]
pub enum RenderTaskMessage {
    /// Sets or clears the source node.
    SetSourceNode(Option<NodeId>),
    /// Sets or clears the camera node.
    SetCameraNode(Option<NodeId>),
    /// Sets or clears the render target.
    SetFrameBuffer(Option<FrameBufferId>),
    /// Bakes the viewport position.
    BakeViewportPosition(Vec2),
    /// Animates the viewport position for one frame.
    SetViewportPosition(Vec2),
    /// Bakes the viewport size.
    BakeViewportSize(Vec2),
    /// Animates the viewport size for one frame.
    SetViewportSize(Vec2),
    /// Bakes the clear color.
    BakeClearColor(Vec4),
    /// Animates the clear color for one frame.
    SetClearColor(Vec4),
    /// Enables or disables clearing.
    SetClearEnabled(bool),
    /// Enables or disables culling.
    SetCullMode(bool),
    /// Sets the refresh rate; see [`REFRESH_ONCE`] and [`REFRESH_ALWAYS`].
    SetRefreshRate(u32),
    /// Claims or releases the source subtree exclusively.
    SetExclusive(bool),
    /// Enables or disables hit testing through this task.
    SetInputEnabled(bool),
    /// Requires a render tracker for render-once tasks.
    SetSyncRequired(bool),
    /// Sets the render pass tag.
    SetRenderPassTag(u32),
    /// Stops rendering after this node.
    RenderUntil(Option<NodeId>),
    /// Sets how screen points map into the target.
    SetCoordinateMapping(CoordinateMapping),
}

/// One rendering pass.
#[derive(Debug)]
pub struct RenderTask {
    id: RenderTaskId,
    source: Option<NodeId>,
    camera_node: Option<NodeId>,
    frame_buffer: Option<FrameBufferId>,
    viewport_position: AnimatableProperty<Vec2>,
    viewport_size: AnimatableProperty<Vec2>,
    clear_color: AnimatableProperty<Vec4>,
    clear_enabled: bool,
    cull_mode: bool,
    exclusive: bool,
    input_enabled: bool,
    refresh_rate: u32,
    state: RenderTaskState,
    frame_counter: u32,
    rendered_once_counter: u32,
    waiting_to_render: bool,
    notify_trigger: bool,
    requires_sync: bool,
    tracker: Option<RenderTracker>,
    render_pass_tag: u32,
    stopper: Option<NodeId>,
    mapping: CoordinateMapping,
}

impl RenderTask {
    /// Creates a task rendering continuously to the surface, with no source
    /// or camera yet.
    #[must_use]
    pub fn new(id: RenderTaskId) -> Self {
        Self {
            id,
            source: None,
            camera_node: None,
            frame_buffer: None,
            viewport_position: AnimatableProperty::new(Vec2::ZERO),
            viewport_size: AnimatableProperty::new(Vec2::ZERO),
            clear_color: AnimatableProperty::new(DEFAULT_CLEAR_COLOR),
            clear_enabled: false,
            cull_mode: true,
            exclusive: false,
            input_enabled: true,
            refresh_rate: REFRESH_ALWAYS,
            state: RenderTaskState::Continuous,
            frame_counter: 0,
            rendered_once_counter: 0,
            waiting_to_render: false,
            notify_trigger: false,
            requires_sync: false,
            tracker: None,
            render_pass_tag: 0,
            stopper: None,
            mapping: CoordinateMapping::None,
        }
    }

    /// Returns the task's handle.
    #[must_use]
    pub fn id(&self) -> RenderTaskId {
        self.id
    }

    /// Applies a message.
    ///
    /// # Panics
    ///
    /// Panics if a [`RenderUntil`](RenderTaskMessage::RenderUntil) target is
    /// not a descendant of the source node.
    pub fn apply(&mut self, message: RenderTaskMessage, nodes: &mut NodeStore, buffer: BufferIndex) {
        match message {
            RenderTaskMessage::SetSourceNode(node) => self.set_source_node(node, nodes),
            RenderTaskMessage::SetCameraNode(node) => self.camera_node = node,
            RenderTaskMessage::SetFrameBuffer(fb) => self.frame_buffer = fb,
            RenderTaskMessage::BakeViewportPosition(v) => self.viewport_position.bake(buffer, v),
            RenderTaskMessage::SetViewportPosition(v) => self.viewport_position.set(buffer, v),
            RenderTaskMessage::BakeViewportSize(v) => self.viewport_size.bake(buffer, v),
            RenderTaskMessage::SetViewportSize(v) => self.viewport_size.set(buffer, v),
            RenderTaskMessage::BakeClearColor(c) => self.clear_color.bake(buffer, c),
            RenderTaskMessage::SetClearColor(c) => self.clear_color.set(buffer, c),
            RenderTaskMessage::SetClearEnabled(on) => self.clear_enabled = on,
            RenderTaskMessage::SetCullMode(on) => self.cull_mode = on,
            RenderTaskMessage::SetRefreshRate(rate) => self.set_refresh_rate(rate),
            RenderTaskMessage::SetExclusive(on) => self.set_exclusive(on, nodes),
            RenderTaskMessage::SetInputEnabled(on) => self.input_enabled = on,
            RenderTaskMessage::SetSyncRequired(on) => self.requires_sync = on,
            RenderTaskMessage::SetRenderPassTag(tag) => self.render_pass_tag = tag,
            RenderTaskMessage::RenderUntil(node) => self.render_until(node, nodes),
            RenderTaskMessage::SetCoordinateMapping(mapping) => self.mapping = mapping,
        }
    }

    // -- Source and exclusivity --

    /// Sets the source node, moving an exclusive claim along with it.
    pub fn set_source_node(&mut self, node: Option<NodeId>, nodes: &mut NodeStore) {
        self.release_claim(nodes);
        self.source = node;
        if self.exclusive {
            self.claim(nodes);
        }
    }

    /// Claims or releases the source subtree exclusively.
    pub fn set_exclusive(&mut self, exclusive: bool, nodes: &mut NodeStore) {
        self.exclusive = exclusive;
        if exclusive {
            self.claim(nodes);
        } else {
            self.release_claim(nodes);
        }
    }

    fn claim(&self, nodes: &mut NodeStore) {
        if let Some(source) = self.source.filter(|s| nodes.is_alive(*s)) {
            nodes.set_exclusive_task(source, Some(self.id));
        }
    }

    /// Clears the source's exclusive claim if this task holds it.
    pub(crate) fn release_claim(&self, nodes: &mut NodeStore) {
        if let Some(source) = self.source.filter(|s| nodes.is_alive(*s))
            && nodes.exclusive_task(source) == Some(self.id)
        {
            nodes.set_exclusive_task(source, None);
        }
    }

    /// Stops rendering after `stopper`.
    ///
    /// A stopper in a different layer than the source is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `stopper` is not a descendant of the source node.
    pub fn render_until(&mut self, stopper: Option<NodeId>, nodes: &NodeStore) {
        let Some(stopper) = stopper else {
            self.stopper = None;
            return;
        };
        let source = self
            .source
            .unwrap_or_else(|| panic!("render_until on {:?} without a source node", self.id));
        assert!(
            nodes.is_descendant_of(stopper, source),
            "render_until target must be a descendant of the source node"
        );
        let mut current = stopper;
        while current != source {
            if nodes.is_layer(current) {
                log::warn!(
                    "render_until target {stopper:?} is behind a layer boundary of {:?}; ignored",
                    self.id
                );
                return;
            }
            let Some(parent) = nodes.parent(current) else {
                return;
            };
            current = parent;
        }
        self.stopper = Some(stopper);
    }

    /// Drops every reference to `node`.
    pub(crate) fn forget_node(&mut self, node: NodeId) {
        if self.source == Some(node) {
            self.source = None;
        }
        if self.camera_node == Some(node) {
            self.camera_node = None;
        }
        if self.stopper == Some(node) {
            self.stopper = None;
        }
        if matches!(self.mapping, CoordinateMapping::Node(n) if n == node) {
            self.mapping = CoordinateMapping::None;
        }
    }

    // -- Accessors --

    /// Source node.
    #[must_use]
    pub fn source_node(&self) -> Option<NodeId> {
        self.source
    }

    /// Camera node.
    #[must_use]
    pub fn camera_node(&self) -> Option<NodeId> {
        self.camera_node
    }

    /// Render target.
    #[must_use]
    pub fn frame_buffer(&self) -> Option<FrameBufferId> {
        self.frame_buffer
    }

    /// Whether the task claims its source exclusively.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Whether hit testing goes through this task.
    #[must_use]
    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Refresh rate.
    #[must_use]
    pub fn refresh_rate(&self) -> u32 {
        self.refresh_rate
    }

    /// Current refresh state.
    #[must_use]
    pub fn state(&self) -> RenderTaskState {
        self.state
    }

    /// How many times a render-once task has reported completion.
    #[must_use]
    pub fn rendered_once_counter(&self) -> u32 {
        self.rendered_once_counter
    }

    /// Node rendering stops after.
    #[must_use]
    pub fn stopper(&self) -> Option<NodeId> {
        self.stopper
    }

    /// Screen mapping for hit testing.
    #[must_use]
    pub fn coordinate_mapping(&self) -> &CoordinateMapping {
        &self.mapping
    }

    /// Viewport position in `buffer`.
    #[must_use]
    pub fn viewport_position(&self, buffer: BufferIndex) -> Vec2 {
        self.viewport_position.get(buffer)
    }

    /// Viewport size in `buffer`.
    #[must_use]
    pub fn viewport_size(&self, buffer: BufferIndex) -> Vec2 {
        self.viewport_size.get(buffer)
    }

    /// Clear color in `buffer`.
    #[must_use]
    pub fn clear_color(&self, buffer: BufferIndex) -> Vec4 {
        self.clear_color.get(buffer)
    }

    /// Returns whether a viewport is set in `buffer`.
    ///
    /// An all-zero viewport means "the whole target".
    #[must_use]
    pub fn viewport_enabled(&self, buffer: BufferIndex) -> bool {
        let p = self.viewport_position.get(buffer);
        let s = self.viewport_size.get(buffer);
        p.x.abs() > f32::EPSILON
            || p.y.abs() > f32::EPSILON
            || s.x.abs() > f32::EPSILON
            || s.y.abs() > f32::EPSILON
    }

    /// Returns the viewport in `buffer`, if one is set.
    #[must_use]
    pub fn viewport(&self, buffer: BufferIndex) -> Option<Rect> {
        if !self.viewport_enabled(buffer) {
            return None;
        }
        let p = self.viewport_position.get(buffer);
        let s = self.viewport_size.get(buffer);
        Some(Rect::new(
            f64::from(p.x),
            f64::from(p.y),
            f64::from(p.x + s.x),
            f64::from(p.y + s.y),
        ))
    }

    // -- Refresh state machine --

    /// Sets the refresh rate and restarts the state machine.
    pub fn set_refresh_rate(&mut self, rate: u32) {
        self.refresh_rate = rate;
        if rate > REFRESH_ONCE {
            self.state = RenderTaskState::Continuous;
        } else {
            self.state = RenderTaskState::WaitingToRender;
            self.waiting_to_render = true;
            self.notify_trigger = false;
        }
        self.frame_counter = 0;
        log::debug!("{:?} refresh rate {rate}, state {:?}", self.id, self.state);
    }

    /// Returns whether the source and camera are attached to the scene.
    ///
    /// An invisible source still renders, so that clears happen and
    /// render-once tasks complete.
    #[must_use]
    pub fn ready_to_render(&self, nodes: &NodeStore) -> bool {
        let source_ok = self.source.is_some_and(|s| {
            nodes.is_alive(s) && (nodes.is_root(s) || nodes.parent(s).is_some())
        });
        if !source_ok {
            log::trace!("{:?} source not on stage", self.id);
            return false;
        }
        let camera_ok = self.camera_node.is_some_and(|c| {
            nodes.is_alive(c) && nodes.parent(c).is_some() && nodes.camera(c).is_some()
        });
        if !camera_ok {
            log::trace!("{:?} has no camera", self.id);
        }
        camera_ok
    }

    /// Returns whether instructions should be generated this frame.
    #[must_use]
    pub fn is_render_required(&self) -> bool {
        match self.state {
            RenderTaskState::Continuous => self.frame_counter == 0,
            RenderTaskState::WaitingToRender => true,
            RenderTaskState::RenderedOnce | RenderTaskState::Notified => false,
        }
    }

    /// Advances the state machine; called once per frame whether or not the
    /// task rendered.
    pub fn update_state(&mut self) {
        match self.state {
            RenderTaskState::Continuous => {
                if self.refresh_rate != REFRESH_ALWAYS {
                    self.frame_counter += 1;
                    if self.frame_counter > 1 && self.frame_counter >= self.refresh_rate {
                        self.frame_counter = 0;
                    }
                }
            }
            RenderTaskState::WaitingToRender => {
                self.state = RenderTaskState::RenderedOnce;
            }
            RenderTaskState::RenderedOnce => {
                self.waiting_to_render = true;
                self.notify_trigger = false;
                if self.frame_buffer.is_some() {
                    if self.tracker.as_ref().is_none_or(RenderTracker::is_synced) {
                        self.waiting_to_render = false;
                        self.notify_trigger = true;
                    }
                } else {
                    self.waiting_to_render = false;
                    self.notify_trigger = true;
                }
            }
            RenderTaskState::Notified => {}
        }
    }

    /// Returns whether a render-once task is still waiting for its frame.
    #[must_use]
    pub fn is_waiting_to_render(&self) -> bool {
        self.waiting_to_render
    }

    /// Consumes a pending completion; returns `true` once per render-once
    /// cycle.
    pub fn has_rendered(&mut self) -> bool {
        if !self.notify_trigger {
            return false;
        }
        self.rendered_once_counter += 1;
        self.state = RenderTaskState::Notified;
        self.notify_trigger = false;
        log::debug!("{:?} finished rendering once", self.id);
        true
    }

    /// Starts an instruction for `buffer` with camera matrices, target,
    /// viewport, clear color, and tracker filled in.
    ///
    /// Expects [`ready_to_render`](Self::ready_to_render) to hold.
    pub(crate) fn prepare_render_instruction(
        &mut self,
        nodes: &NodeStore,
        buffer: BufferIndex,
    ) -> Option<RenderInstruction> {
        let camera = nodes.camera(self.camera_node?)?;

        let tracker = if self.requires_sync && self.refresh_rate == REFRESH_ONCE {
            Some(self.tracker.get_or_insert_with(RenderTracker::new).clone())
        } else {
            None
        };

        Some(RenderInstruction {
            task: self.id,
            view: camera.view_matrix(buffer),
            projection: camera.projection_matrix(buffer),
            reflection: camera.is_reflection(),
            frame_buffer: self.frame_buffer,
            viewport: self.viewport(buffer),
            clear_color: self.clear_enabled.then(|| self.clear_color.get(buffer)),
            render_pass_tag: self.render_pass_tag,
            cull_mode: self.cull_mode,
            tracker,
            ignore_render_to_fbo: false,
            lists: Vec::new(),
        })
    }
}

impl PropertyOwner for RenderTask {
    fn reset_default_properties(&mut self, buffer: BufferIndex) {
        self.viewport_position.reset_to_base_value(buffer);
        self.viewport_size.reset_to_base_value(buffer);
        self.clear_color.reset_to_base_value(buffer);
    }
}
