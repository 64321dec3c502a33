// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Turning render tasks into render instructions.

use core::ops::ControlFlow;
use std::collections::HashMap;

use crate::instruction::{RenderInstruction, RenderItem, RenderList, RenderListKind};
use crate::node::{DrawMode, NodeId, NodeStore};
use crate::property::BufferIndex;
use crate::renderer::{RendererDesc, RendererId, RenderingBehavior};

use super::{RenderTask, RenderTaskId, RenderTaskList};

/// When the default task draws into its framebuffer.
///
/// With the policy enabled, a default task that has a framebuffer draws into
/// it every `interval` frames and straight to the surface otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameBufferPolicy {
    interval: u32,
}

impl FrameBufferPolicy {
    /// The default task is treated like any other task.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { interval: 0 }
    }

    /// The default task draws into its framebuffer every `interval` frames.
    /// An interval of zero disables the policy.
    #[must_use]
    pub const fn every(interval: u32) -> Self {
        Self { interval }
    }

    /// Returns whether the policy is enabled.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.interval != 0
    }

    /// Returns whether frame `frame_index` draws into the framebuffer.
    #[must_use]
    pub fn renders_to_frame_buffer(self, frame_index: u64) -> bool {
        self.is_enabled() && frame_index % u64::from(self.interval) == 0
    }

    /// Returns whether a task is skipped in the given pass.
    fn skips(self, off_screen: bool, is_default: bool, has_fb: bool) -> bool {
        if self.is_enabled() {
            (off_screen && !has_fb)
                || (off_screen && is_default)
                || (!off_screen && !is_default && has_fb)
        } else {
            off_screen != has_fb
        }
    }
}

/// Output of [`RenderTaskList::process`].
#[derive(Debug, Default)]
pub struct TaskProcessing {
    /// Instructions in draw order.
    pub instructions: Vec<RenderInstruction>,
    /// Whether a renderer asked to be drawn continuously.
    pub keep_rendering: bool,
    /// Total number of render items.
    pub items: usize,
}

impl RenderTaskList {
    /// Builds the instructions for `buffer`.
    ///
    /// Off-screen tasks are processed first, then on-screen tasks, each in
    /// list order. Does not advance the task state machines.
    pub fn process(
        &mut self,
        nodes: &NodeStore,
        renderers: &HashMap<RendererId, RendererDesc>,
        buffer: BufferIndex,
        policy: FrameBufferPolicy,
        frame_index: u64,
    ) -> TaskProcessing {
        let mut out = TaskProcessing::default();
        let rendering_to_fbo = policy.renders_to_frame_buffer(frame_index);

        for off_screen in [true, false] {
            for (index, task) in self.tasks.iter_mut().enumerate() {
                let is_default = index == 0;
                let has_fb = task.frame_buffer().is_some();
                if policy.skips(off_screen, is_default, has_fb) || !task.ready_to_render(nodes) {
                    continue;
                }
                let Some(source) = task.source_node() else {
                    continue;
                };
                if !claims_allow(nodes, source, task.id()) {
                    log::trace!("{:?} skipped: source claimed by another task", task.id());
                    continue;
                }
                let Some(layer) = find_layer(nodes, source) else {
                    continue;
                };
                if !task.is_render_required() {
                    continue;
                }
                let Some(mut instruction) = task.prepare_render_instruction(nodes, buffer) else {
                    continue;
                };

                let mut collector = Collector::new(nodes, renderers, buffer, task);
                let _ = collector.add_renderables(source, layer, DrawMode::Normal);
                out.keep_rendering |= collector.keep_rendering;
                instruction.lists = collector.finish();
                out.items += instruction.item_count();

                if is_default && !off_screen && policy.is_enabled() && !rendering_to_fbo && has_fb {
                    instruction.ignore_render_to_fbo = true;
                }
                out.instructions.push(instruction);
            }
        }
        out
    }
}

/// Returns whether the nearest exclusive claim on or above `source`, if any,
/// belongs to `task`.
pub(super) fn claims_allow(nodes: &NodeStore, source: NodeId, task: RenderTaskId) -> bool {
    let mut current = Some(source);
    while let Some(node) = current {
        if let Some(owner) = nodes.exclusive_task(node) {
            return owner == task;
        }
        current = nodes.parent(node);
    }
    true
}

/// Nearest layer on or above `node`.
fn find_layer(nodes: &NodeStore, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(n) = current {
        if nodes.is_layer(n) {
            return Some(n);
        }
        current = nodes.parent(n);
    }
    None
}

struct LayerLists {
    layer: NodeId,
    color: Vec<RenderItem>,
    overlay: Vec<RenderItem>,
}

/// Gathers the renderables of one task's source subtree.
struct Collector<'a> {
    nodes: &'a NodeStore,
    renderers: &'a HashMap<RendererId, RendererDesc>,
    buffer: BufferIndex,
    task: RenderTaskId,
    stopper: Option<NodeId>,
    layers: Vec<LayerLists>,
    keep_rendering: bool,
}

impl<'a> Collector<'a> {
    fn new(
        nodes: &'a NodeStore,
        renderers: &'a HashMap<RendererId, RendererDesc>,
        buffer: BufferIndex,
        task: &RenderTask,
    ) -> Self {
        Self {
            nodes,
            renderers,
            buffer,
            task: task.id(),
            stopper: task.stopper(),
            layers: Vec::new(),
            keep_rendering: false,
        }
    }

    fn lists_for(&mut self, layer: NodeId) -> &mut LayerLists {
        let index = match self.layers.iter().position(|l| l.layer == layer) {
            Some(index) => index,
            None => {
                self.layers.push(LayerLists {
                    layer,
                    color: Vec::new(),
                    overlay: Vec::new(),
                });
                self.layers.len() - 1
            }
        };
        &mut self.layers[index]
    }

    /// Depth-first walk; breaks once the stopper's renderables are added.
    fn add_renderables(
        &mut self,
        node: NodeId,
        mut layer: NodeId,
        mut draw_mode: DrawMode,
    ) -> ControlFlow<()> {
        let nodes = self.nodes;
        if !nodes.visible(node, self.buffer) {
            return ControlFlow::Continue(());
        }
        if nodes.exclusive_task(node).is_some_and(|owner| owner != self.task) {
            return ControlFlow::Continue(());
        }

        if nodes.is_layer(node) {
            layer = node;
            draw_mode = DrawMode::Normal;
        } else if nodes.draw_mode(node) == DrawMode::Overlay {
            draw_mode = DrawMode::Overlay;
        }

        let renderers = nodes.renderers(node);
        if !renderers.is_empty() || nodes.is_layer(node) {
            let _ = self.lists_for(layer);
        }
        for &renderer in renderers {
            let Some(desc) = self.renderers.get(&renderer) else {
                log::warn!("{node:?} references unknown {renderer:?}");
                continue;
            };
            if desc.rendering_behavior == RenderingBehavior::Continuously {
                self.keep_rendering = true;
            }
            let item = RenderItem {
                node,
                renderer,
                model: nodes.world_matrix(node, self.buffer),
                color: nodes.world_color(node, self.buffer),
                size: nodes.size(node, self.buffer),
                scale: nodes.world_scale(node, self.buffer),
                shader: nodes.inherited_shader(node),
                uniforms: nodes.uniforms(node).clone(),
                depth_index: desc.depth_index,
                sort_modifier: nodes.sort_modifier(node),
            };
            let lists = self.lists_for(layer);
            match draw_mode {
                DrawMode::Normal => lists.color.push(item),
                DrawMode::Overlay => lists.overlay.push(item),
            }
        }

        if self.stopper == Some(node) {
            return ControlFlow::Break(());
        }
        for child in nodes.children(node) {
            self.add_renderables(child, layer, draw_mode)?;
        }
        ControlFlow::Continue(())
    }

    fn finish(self) -> Vec<RenderList> {
        let mut lists = Vec::with_capacity(self.layers.len());
        for LayerLists {
            layer,
            mut color,
            mut overlay,
        } in self.layers
        {
            color.sort_by(|a, b| a.sort_key().total_cmp(&b.sort_key()));
            lists.push(RenderList {
                layer,
                kind: RenderListKind::Color,
                items: color,
            });
            if !overlay.is_empty() {
                overlay.sort_by(|a, b| a.sort_key().total_cmp(&b.sort_key()));
                lists.push(RenderList {
                    layer,
                    kind: RenderListKind::Overlay,
                    items: overlay,
                });
            }
        }
        lists
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Size;

    use super::*;
    use crate::camera::Camera;
    use crate::handle::HandleAllocator;
    use crate::node::{NodeKind, NodeProperty};
    use crate::render_task::{REFRESH_ONCE, RenderTaskMessage};
    use crate::renderer::RendererKind;
    use crate::resource::{FrameBufferId, GeometryId, ShaderId};

    const B0: BufferIndex = BufferIndex::ZERO;

    struct Scene {
        nodes: NodeStore,
        node_alloc: HandleAllocator<NodeKind>,
        renderer_alloc: HandleAllocator<RendererKind>,
        renderers: HashMap<RendererId, RendererDesc>,
        tasks: RenderTaskList,
        root: NodeId,
        camera: NodeId,
    }

    impl Scene {
        fn new() -> Self {
            let node_alloc = HandleAllocator::new();
            let mut nodes = NodeStore::new();
            let root = node_alloc.allocate();
            nodes.insert(root);
            nodes.install_root(root);
            let camera = node_alloc.allocate();
            nodes.insert(camera);
            nodes.connect_child(root, camera);
            nodes.set_camera(camera, Some(Camera::for_surface(Size::new(64.0, 64.0))));
            let mut scene = Self {
                nodes,
                node_alloc,
                renderer_alloc: HandleAllocator::new(),
                renderers: HashMap::new(),
                tasks: RenderTaskList::new(),
                root,
                camera,
            };
            scene.task(0, root);
            scene
        }

        fn task(&mut self, idx: u32, source: NodeId) -> RenderTaskId {
            let id = RenderTaskId::from_parts(idx, 0);
            self.tasks.add(id);
            self.send(id, RenderTaskMessage::SetSourceNode(Some(source)));
            self.send(id, RenderTaskMessage::SetCameraNode(Some(self.camera)));
            id
        }

        fn send(&mut self, id: RenderTaskId, message: RenderTaskMessage) {
            self.tasks.apply(id, message, &mut self.nodes, B0);
        }

        fn node(&mut self, parent: NodeId) -> NodeId {
            let id = self.node_alloc.allocate();
            self.nodes.insert(id);
            self.nodes.connect_child(parent, id);
            id
        }

        fn drawable(&mut self, parent: NodeId, depth_index: i32) -> (NodeId, RendererId) {
            let node = self.node(parent);
            let renderer = self.renderer_alloc.allocate();
            let mut desc = RendererDesc::new(GeometryId::from_parts(0, 0), ShaderId::from_parts(0, 0));
            desc.depth_index = depth_index;
            self.renderers.insert(renderer, desc);
            self.nodes.add_renderer(node, renderer);
            (node, renderer)
        }

        fn process(&mut self, policy: FrameBufferPolicy, frame: u64) -> TaskProcessing {
            let _ = self.nodes.update_nodes(B0);
            let _ = self.nodes.update_cameras(B0);
            self.tasks
                .process(&self.nodes, &self.renderers, B0, policy, frame)
        }
    }

    fn renderers_of(list: &RenderList) -> Vec<RendererId> {
        list.items.iter().map(|i| i.renderer).collect()
    }

    #[test]
    fn default_task_draws_the_scene_in_traversal_order() {
        let mut s = Scene::new();
        let (_, a) = s.drawable(s.root, 0);
        let (_, b) = s.drawable(s.root, 0);
        let out = s.process(FrameBufferPolicy::disabled(), 0);
        assert_eq!(out.instructions.len(), 1);
        assert_eq!(out.items, 2);
        let lists = &out.instructions[0].lists;
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].layer, s.root);
        assert_eq!(renderers_of(&lists[0]), vec![a, b]);
    }

    #[test]
    fn depth_index_and_sort_modifier_order_items_stably() {
        let mut s = Scene::new();
        let (_, a) = s.drawable(s.root, 1);
        let (_, b) = s.drawable(s.root, 0);
        let (nc, c) = s.drawable(s.root, 0);
        let (_, d) = s.drawable(s.root, 0);
        s.nodes.set_sort_modifier(nc, 2.0);
        let out = s.process(FrameBufferPolicy::disabled(), 0);
        assert_eq!(renderers_of(&out.instructions[0].lists[0]), vec![b, d, a, c]);
    }

    #[test]
    fn overlay_and_layers_split_lists() {
        let mut s = Scene::new();
        let overlay = s.node(s.root);
        s.nodes.set_draw_mode(overlay, DrawMode::Overlay);
        let (_, o) = s.drawable(overlay, 0);
        let (_, n) = s.drawable(s.root, 0);
        let layer = s.node(overlay);
        s.nodes.set_layer(layer, true);
        let (_, l) = s.drawable(layer, 0);

        let out = s.process(FrameBufferPolicy::disabled(), 0);
        let lists = &out.instructions[0].lists;
        let shape: Vec<_> = lists.iter().map(|l| (l.layer, l.kind)).collect();
        assert_eq!(
            shape,
            vec![
                (s.root, RenderListKind::Color),
                (s.root, RenderListKind::Overlay),
                (layer, RenderListKind::Color),
            ]
        );
        assert_eq!(renderers_of(&lists[0]), vec![n]);
        assert_eq!(renderers_of(&lists[1]), vec![o]);
        assert_eq!(renderers_of(&lists[2]), vec![l], "layers reset overlay mode");
    }

    #[test]
    fn invisible_nodes_hide_their_subtree() {
        let mut s = Scene::new();
        let (hidden, _) = s.drawable(s.root, 0);
        let _ = s.drawable(hidden, 0);
        let (_, shown) = s.drawable(s.root, 0);
        s.nodes
            .bake_property(hidden, B0, NodeProperty::Visible(false));
        let out = s.process(FrameBufferPolicy::disabled(), 0);
        assert_eq!(renderers_of(&out.instructions[0].lists[0]), vec![shown]);
    }

    #[test]
    fn off_screen_tasks_come_first_and_exclusive_subtrees_leave_the_default() {
        let mut s = Scene::new();
        let (group, g) = s.drawable(s.root, 0);
        let (_, other) = s.drawable(s.root, 0);
        let off = s.task(1, group);
        s.send(
            off,
            RenderTaskMessage::SetFrameBuffer(Some(FrameBufferId::from_parts(0, 0))),
        );
        s.send(off, RenderTaskMessage::SetExclusive(true));

        let out = s.process(FrameBufferPolicy::disabled(), 0);
        assert_eq!(out.instructions.len(), 2);
        assert_eq!(out.instructions[0].task, off);
        assert_eq!(renderers_of(&out.instructions[0].lists[0]), vec![g]);
        assert_eq!(renderers_of(&out.instructions[1].lists[0]), vec![other]);
    }

    #[test]
    fn source_claimed_by_another_task_is_skipped() {
        let mut s = Scene::new();
        let (group, _) = s.drawable(s.root, 0);
        let first = s.task(1, group);
        let second = s.task(2, group);
        s.send(first, RenderTaskMessage::SetExclusive(true));
        let out = s.process(FrameBufferPolicy::disabled(), 0);
        let tasks: Vec<_> = out.instructions.iter().map(|i| i.task).collect();
        assert!(tasks.contains(&first));
        assert!(!tasks.contains(&second));
    }

    #[test]
    fn stopper_ends_the_walk_after_its_own_renderables() {
        let mut s = Scene::new();
        let (a, ra) = s.drawable(s.root, 0);
        let _ = s.drawable(a, 0);
        let _ = s.drawable(s.root, 0);
        let id = RenderTaskId::from_parts(0, 0);
        s.send(id, RenderTaskMessage::RenderUntil(Some(a)));
        let out = s.process(FrameBufferPolicy::disabled(), 0);
        assert_eq!(renderers_of(&out.instructions[0].lists[0]), vec![ra]);
    }

    #[test]
    fn render_once_task_stops_generating_instructions() {
        let mut s = Scene::new();
        let _ = s.drawable(s.root, 0);
        let id = RenderTaskId::from_parts(0, 0);
        s.send(id, RenderTaskMessage::SetRefreshRate(REFRESH_ONCE));
        assert_eq!(s.process(FrameBufferPolicy::disabled(), 0).instructions.len(), 1);
        for task in s.tasks.iter_mut() {
            task.update_state();
        }
        assert!(s.process(FrameBufferPolicy::disabled(), 1).instructions.is_empty());
    }

    #[test]
    fn continuous_renderer_keeps_rendering() {
        let mut s = Scene::new();
        let (_, r) = s.drawable(s.root, 0);
        if let Some(desc) = s.renderers.get_mut(&r) {
            desc.rendering_behavior = RenderingBehavior::Continuously;
        }
        assert!(s.process(FrameBufferPolicy::disabled(), 0).keep_rendering);
    }

    #[test]
    fn frame_buffer_policy_redirects_the_default_task() {
        let mut s = Scene::new();
        let _ = s.drawable(s.root, 0);
        let id = RenderTaskId::from_parts(0, 0);
        s.send(
            id,
            RenderTaskMessage::SetFrameBuffer(Some(FrameBufferId::from_parts(0, 0))),
        );
        let policy = FrameBufferPolicy::every(2);

        let to_fbo = s.process(policy, 0);
        assert_eq!(to_fbo.instructions.len(), 1);
        assert!(to_fbo.instructions[0].targets_frame_buffer());

        let to_surface = s.process(policy, 1);
        assert!(!to_surface.instructions[0].targets_frame_buffer());
        assert!(to_surface.instructions[0].ignore_render_to_fbo);
    }

    #[test]
    fn tasks_without_a_camera_are_skipped() {
        let mut s = Scene::new();
        let _ = s.drawable(s.root, 0);
        let id = RenderTaskId::from_parts(0, 0);
        s.send(id, RenderTaskMessage::SetCameraNode(None));
        assert!(s.process(FrameBufferPolicy::disabled(), 0).instructions.is_empty());
    }
}
