// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The update stage.
//!
//! [`UpdateManager`] owns the update-side scene: nodes, renderers, and
//! render tasks. Each call to [`update`](UpdateManager::update) computes one
//! buffer:
//!
//! 1. Objects discarded two frames ago are released.
//! 2. Queued [`Message`]s are applied, after resetting animated properties
//!    of the buffer if the scene changed this frame or the previous one.
//! 3. Node world values and cameras are recomputed and the render tasks are
//!    turned into instructions, which are sent to the render stage.
//! 4. Render task state machines advance and finished tasks are reported.
//! 5. The buffer index is swapped.
//!
//! [`pipeline`] wires an [`UpdateManager`] to an [`EventToUpdate`] and to
//! the queues read by the render stage and by the application.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use bitflags::bitflags;
use glam::Vec3;
use kurbo::{Point, Rect, Size};

use crate::discard::DiscardQueue;
use crate::instruction::RenderMessage;
use crate::message::{EventToUpdate, HandleAllocators, Message, Notification};
use crate::node::{NodeId, NodeProperty, NodeStore};
use crate::property::{BufferIndex, PropertyOwner};
use crate::render_task::{FrameBufferPolicy, HitResult, RenderTaskId, RenderTaskList};
use crate::renderer::{RendererDesc, RendererId};
use crate::resource::ResourceMessage;
use crate::time::{Clock, HostTime, MonotonicClock};
use crate::trace::{
    FrameBeginEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind, Tracer, UpdateStatsEvent,
};

/// Default surface size when none is configured.
pub const DEFAULT_SURFACE_SIZE: Size = Size::new(800.0, 480.0);

/// Update stage configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateConfig {
    /// Initial surface size; the root node takes this size.
    pub surface_size: Size,
    /// The default task draws into its framebuffer every this many frames;
    /// zero treats it like any other task.
    pub render_to_frame_buffer_interval: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            surface_size: DEFAULT_SURFACE_SIZE,
            render_to_frame_buffer_interval: 0,
        }
    }
}

impl UpdateConfig {
    /// Configuration for a surface of `surface_size`.
    #[must_use]
    pub const fn new(surface_size: Size) -> Self {
        Self {
            surface_size,
            render_to_frame_buffer_interval: 0,
        }
    }

    /// Enables periodic drawing of the default task into its framebuffer.
    #[must_use]
    pub const fn with_render_to_frame_buffer_interval(mut self, interval: u32) -> Self {
        self.render_to_frame_buffer_interval = interval;
        self
    }
}

bitflags! {
    /// Reasons the host should schedule another update even with no
    /// pending messages.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct KeepUpdating: u32 {
        /// The stage asked to keep rendering, or a renderer draws
        /// continuously.
        const STAGE_KEEP_RENDERING = 1 << 1;
        /// A render-once task is waiting for its frame to be drawn.
        const RENDER_TASK_SYNC = 1 << 4;
    }
}

/// Result of one [`UpdateManager::update`].
#[derive(Clone, Copy, Debug)]
pub struct UpdateStatus {
    /// Frame counter of the update.
    pub frame_index: u64,
    /// Buffer that was computed.
    pub buffer: BufferIndex,
    /// Why another update is needed.
    pub keep_updating: KeepUpdating,
    /// Whether the scene was traversed and new instructions were sent.
    pub scene_updated: bool,
    /// Messages applied.
    pub messages: u32,
    /// Host time when the update began.
    pub begin: HostTime,
    /// Host time when the update ended.
    pub end: HostTime,
}

impl UpdateStatus {
    /// Returns whether the host should run another update.
    ///
    /// A frame that changed the scene is always followed by one more, so
    /// that the other buffer catches up.
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.scene_updated || !self.keep_updating.is_empty()
    }
}

/// Everything [`pipeline`] creates.
#[derive(Debug)]
pub struct Pipeline {
    /// The update stage.
    pub update: UpdateManager,
    /// The event side's entry point.
    pub events: EventToUpdate,
    /// Messages for the render stage.
    pub render_queue: Receiver<RenderMessage>,
    /// Notifications for the event side.
    pub notifications: Receiver<Notification>,
}

/// Creates an update stage and its queues.
///
/// The root node, the default camera, and the default render task are
/// allocated right away; their setup is applied by the first update.
#[must_use]
pub fn pipeline(config: UpdateConfig) -> Pipeline {
    let (message_tx, message_rx) = mpsc::channel();
    let (render_tx, render_rx) = mpsc::channel();
    let (notification_tx, notification_rx) = mpsc::channel();
    let handles = HandleAllocators::default();
    let events = EventToUpdate::new(message_tx, handles.clone(), config.surface_size);
    let update = UpdateManager::new(config, message_rx, render_tx, notification_tx, handles);
    Pipeline {
        update,
        events,
        render_queue: render_rx,
        notifications: notification_rx,
    }
}

/// The update stage.
pub struct UpdateManager {
    nodes: NodeStore,
    tasks: RenderTaskList,
    renderers: HashMap<RendererId, RendererDesc>,

    messages: Receiver<Message>,
    render: Sender<RenderMessage>,
    notifications: Sender<Notification>,
    handles: HandleAllocators,

    discarded_nodes: DiscardQueue<NodeId>,
    discarded_renderers: DiscardQueue<RendererId>,
    discarded_tasks: DiscardQueue<RenderTaskId>,
    discarded_resources: DiscardQueue<ResourceMessage>,

    buffer: BufferIndex,
    frame_index: u64,
    previous_update_scene: bool,
    renderers_keep_rendering: bool,
    keep_rendering_seconds: f32,
    surface: Rect,
    policy: FrameBufferPolicy,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for UpdateManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UpdateManager")
            .field("buffer", &self.buffer)
            .field("frame_index", &self.frame_index)
            .field("tasks", &self.tasks.len())
            .field("renderers", &self.renderers.len())
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl UpdateManager {
    fn new(
        config: UpdateConfig,
        messages: Receiver<Message>,
        render: Sender<RenderMessage>,
        notifications: Sender<Notification>,
        handles: HandleAllocators,
    ) -> Self {
        Self {
            nodes: NodeStore::new(),
            tasks: RenderTaskList::new(),
            renderers: HashMap::new(),
            messages,
            render,
            notifications,
            handles,
            discarded_nodes: DiscardQueue::new(),
            discarded_renderers: DiscardQueue::new(),
            discarded_tasks: DiscardQueue::new(),
            discarded_resources: DiscardQueue::new(),
            buffer: BufferIndex::ZERO,
            frame_index: 0,
            previous_update_scene: false,
            renderers_keep_rendering: false,
            keep_rendering_seconds: 0.0,
            surface: config.surface_size.to_rect(),
            policy: FrameBufferPolicy::every(config.render_to_frame_buffer_interval),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Replaces the clock used for status and trace timestamps.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Computes the next buffer.
    ///
    /// `elapsed_seconds` is the time since the previous update; it counts
    /// down a pending [`KeepRendering`](Message::KeepRendering) request.
    pub fn update(&mut self, elapsed_seconds: f32, tracer: &mut Tracer<'_>) -> UpdateStatus {
        let buffer = self.buffer;
        let frame_index = self.frame_index;
        let begin = self.clock.now();
        tracer.frame_begin(&FrameBeginEvent {
            frame_index,
            buffer,
            timestamp: begin,
        });
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index,
            phase: PhaseKind::Update,
            timestamp: begin,
        });

        self.release_discarded(buffer);

        let messages: Vec<Message> = self.messages.try_iter().collect();
        let update_scene = !messages.is_empty() || self.renderers_keep_rendering;
        let traverse = update_scene || self.previous_update_scene;

        if traverse {
            self.nodes.reset_default_properties(buffer);
            self.tasks.reset_default_properties(buffer);
        }

        let message_count = u32::try_from(messages.len()).unwrap_or(u32::MAX);
        for message in messages {
            self.apply(message, buffer);
        }
        for node in self.nodes.drain_connected() {
            self.notify(Notification::StageConnection(node));
        }
        for node in self.nodes.drain_disconnected() {
            self.notify(Notification::StageDisconnection(node));
        }

        let mut stats = UpdateStatsEvent {
            frame_index,
            messages: message_count,
            scene_updated: traverse,
            ..UpdateStatsEvent::default()
        };

        if traverse {
            let node_update = self.nodes.update_nodes(buffer);
            stats.nodes_updated = node_update.updated;
            stats.cameras = self.nodes.update_cameras(buffer);
            for (node, size) in node_update.size_animations {
                self.notify(Notification::SizeAnimation { node, size });
            }

            #[cfg(feature = "trace-rich")]
            self.trace_node_changes(frame_index, tracer);

            let processing =
                self.tasks
                    .process(&self.nodes, &self.renderers, buffer, self.policy, frame_index);
            self.renderers_keep_rendering = processing.keep_rendering;
            stats.instructions = u32::try_from(processing.instructions.len()).unwrap_or(u32::MAX);
            stats.items = u32::try_from(processing.items).unwrap_or(u32::MAX);
            self.send_to_render(RenderMessage::Instructions {
                buffer,
                instructions: processing.instructions,
            });
        }

        let mut render_task_waiting = false;
        let mut finished = Vec::new();
        for task in self.tasks.iter_mut() {
            task.update_state();
            if task.is_waiting_to_render() && task.ready_to_render(&self.nodes) {
                render_task_waiting = true;
            }
            if task.has_rendered() {
                finished.push(task.id());
            }
        }
        for task in finished {
            self.notify(Notification::RenderTaskFinished(task));
        }

        self.previous_update_scene = update_scene;

        let mut keep_updating = KeepUpdating::empty();
        if self.keep_rendering_seconds > 0.0 {
            self.keep_rendering_seconds -= elapsed_seconds;
            keep_updating |= KeepUpdating::STAGE_KEEP_RENDERING;
        }
        if self.renderers_keep_rendering {
            keep_updating |= KeepUpdating::STAGE_KEEP_RENDERING;
        }
        if render_task_waiting {
            keep_updating |= KeepUpdating::RENDER_TASK_SYNC;
        }

        tracer.update_stats(&stats);
        let end = self.clock.now();
        tracer.phase_end(&PhaseEndEvent {
            frame_index,
            phase: PhaseKind::Update,
            timestamp: end,
        });

        self.buffer = buffer.other();
        self.frame_index += 1;

        UpdateStatus {
            frame_index,
            buffer,
            keep_updating,
            scene_updated: traverse,
            messages: message_count,
            begin,
            end,
        }
    }

    /// Finds the topmost hittable node under `screen`, in surface pixels
    /// from the top-left corner, using the last computed buffer.
    #[must_use]
    pub fn hit_test(&self, screen: Point) -> Option<HitResult> {
        self.tasks
            .hit_test(&self.nodes, self.buffer.other(), self.surface, screen)
    }

    /// The update-side nodes.
    #[must_use]
    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    /// The render tasks.
    #[must_use]
    pub fn tasks(&self) -> &RenderTaskList {
        &self.tasks
    }

    /// The update-side state of a renderer.
    #[must_use]
    pub fn renderer(&self, id: RendererId) -> Option<&RendererDesc> {
        self.renderers.get(&id)
    }

    /// The buffer the next update computes.
    #[must_use]
    pub fn buffer(&self) -> BufferIndex {
        self.buffer
    }

    /// Frame counter of the next update.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The surface rectangle.
    #[must_use]
    pub fn surface(&self) -> Rect {
        self.surface
    }

    #[cfg(feature = "trace-rich")]
    fn trace_node_changes(&self, frame_index: u64, tracer: &mut Tracer<'_>) {
        if !tracer.is_active() {
            return;
        }
        let changes: Vec<_> = self
            .nodes
            .traversal_order()
            .iter()
            .filter_map(|&idx| {
                let flags = self.nodes.frame_dirty[idx as usize];
                (!flags.is_empty()).then_some(crate::trace::NodeChange {
                    node_index: idx,
                    flags,
                })
            })
            .collect();
        tracer.node_changes(frame_index, &changes);
    }

    fn release_discarded(&mut self, buffer: BufferIndex) {
        for node in self.discarded_nodes.clear(buffer) {
            self.send_to_render(RenderMessage::ReleaseNode(node));
            self.handles.nodes.release(node);
        }
        for renderer in self.discarded_renderers.clear(buffer) {
            self.send_to_render(RenderMessage::RemoveRenderer(renderer));
            self.handles.renderers.release(renderer);
        }
        for task in self.discarded_tasks.clear(buffer) {
            self.handles.tasks.release(task);
        }
        for resource in self.discarded_resources.clear(buffer) {
            match &resource {
                ResourceMessage::RemoveShader(id) => self.handles.shaders.release(*id),
                ResourceMessage::RemoveGeometry(id) => self.handles.geometries.release(*id),
                ResourceMessage::RemoveTexture(id) => self.handles.textures.release(*id),
                ResourceMessage::RemoveFrameBuffer(id) => {
                    self.handles.frame_buffers.release(*id);
                }
                _ => {}
            }
            self.send_to_render(RenderMessage::Resource(resource));
        }
    }

    fn apply(&mut self, message: Message, buffer: BufferIndex) {
        match message {
            Message::AddNode(id) => self.nodes.insert(id),
            Message::DestroyNode(id) => {
                self.nodes.remove(id);
                self.tasks.forget_node(id);
                self.discarded_nodes.add(buffer, id);
            }
            Message::InstallRoot(id) => {
                self.nodes.install_root(id);
                self.bake_root_size();
            }
            Message::ConnectChild { parent, child } => self.nodes.connect_child(parent, child),
            Message::DisconnectChild { parent, child } => {
                self.nodes.disconnect_child(parent, child);
            }
            Message::BakeProperty(id, property) => self.nodes.bake_property(id, buffer, property),
            Message::SetProperty(id, property) => self.nodes.set_property(id, buffer, property),
            Message::SetPositionInheritanceMode(id, mode) => {
                self.nodes.set_position_inheritance_mode(id, mode);
            }
            Message::SetColorMode(id, mode) => self.nodes.set_color_mode(id, mode),
            Message::SetInheritRotation(id, inherit) => {
                self.nodes.set_inherit_rotation(id, inherit);
            }
            Message::SetInheritScale(id, inherit) => self.nodes.set_inherit_scale(id, inherit),
            Message::SetGeometryScale(id, scale) => self.nodes.set_geometry_scale(id, scale),
            Message::SetDrawMode(id, mode) => self.nodes.set_draw_mode(id, mode),
            Message::SetSortModifier(id, modifier) => self.nodes.set_sort_modifier(id, modifier),
            Message::SetLayer(id, layer) => self.nodes.set_layer(id, layer),
            Message::ApplyShader(id, shader) => self.nodes.apply_shader(id, shader),
            Message::RemoveShader(id) => self.nodes.remove_shader(id),
            Message::SetCamera(id, camera) => self.nodes.set_camera(id, camera.map(|c| *c)),
            Message::RegisterNodeUniform(id, name, value) => {
                self.nodes.register_uniform(id, &name, value);
            }
            Message::RemoveNodeUniform(id, name) => self.nodes.remove_uniform(id, &name),

            Message::AddRenderer(id, desc) => {
                self.renderers.insert(id, (*desc).clone());
                self.send_to_render(RenderMessage::AddRenderer(id, desc));
            }
            Message::UpdateRenderer(id, message) => match self.renderers.get_mut(&id) {
                Some(desc) => {
                    desc.apply(message.clone());
                    self.send_to_render(RenderMessage::UpdateRenderer(id, message));
                }
                None => log::warn!("message {message:?} for unknown {id:?} dropped"),
            },
            Message::RemoveRenderer(id) => {
                if self.renderers.remove(&id).is_some() {
                    self.discarded_renderers.add(buffer, id);
                } else {
                    log::warn!("removing unknown {id:?}");
                }
            }
            Message::AttachRenderer { node, renderer } => {
                self.nodes.add_renderer(node, renderer);
            }
            Message::DetachRenderer { node, renderer } => {
                self.nodes.remove_renderer(node, renderer);
            }

            Message::AddRenderTask(id) => self.tasks.add(id),
            Message::RenderTask(id, message) => {
                self.tasks.apply(id, message, &mut self.nodes, buffer);
            }
            Message::RemoveRenderTask(id) => {
                if self.tasks.remove(id, &mut self.nodes) {
                    self.discarded_tasks.add(buffer, id);
                } else {
                    log::warn!("removing unknown {id:?}");
                }
            }

            Message::Resource(resource) => {
                if resource.is_removal() {
                    self.discarded_resources.add(buffer, resource);
                } else {
                    self.send_to_render(RenderMessage::Resource(resource));
                }
            }
            Message::KeepRendering(seconds) => {
                self.keep_rendering_seconds = self.keep_rendering_seconds.max(seconds);
            }
            Message::SetBackgroundColor(color) => {
                self.send_to_render(RenderMessage::SetBackgroundColor(color));
            }
            Message::SetSurfaceRect(rect) => {
                self.surface = rect;
                self.bake_root_size();
                self.send_to_render(RenderMessage::SetSurfaceRect(rect));
            }
        }
    }

    fn bake_root_size(&mut self) {
        let Some(root) = self.nodes.root() else {
            return;
        };
        #[expect(
            clippy::cast_possible_truncation,
            reason = "surface sizes fit in single precision"
        )]
        let size = Vec3::new(self.surface.width() as f32, self.surface.height() as f32, 0.0);
        self.nodes
            .bake_property(root, self.buffer, NodeProperty::Size(size));
    }

    fn send_to_render(&self, message: RenderMessage) {
        if self.render.send(message).is_err() {
            log::debug!("render stage gone; message dropped");
        }
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            log::debug!("event side gone; {notification:?} dropped");
        }
    }
}
