// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render instructions handed from the update stage to the render stage.
//!
//! One [`RenderInstruction`] is produced per render task that needed
//! rendering this frame. It carries everything the render stage needs for
//! the pass: camera matrices, target, viewport, clear color, and the
//! renderables grouped into [`RenderList`]s. Node state is captured by value
//! into each [`RenderItem`], so the render stage never reads the scene graph.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{Mat4, Vec3, Vec4};
use kurbo::Rect;

use crate::node::NodeId;
use crate::property::BufferIndex;
use crate::render_task::RenderTaskId;
use crate::renderer::{RendererDesc, RendererId, RendererMessage};
use crate::resource::{FrameBufferId, ResourceMessage, ShaderId};
use crate::uniform::UniformMap;

/// One renderer of one node, with the node state it is drawn with.
#[derive(Clone, Debug)]
pub struct RenderItem {
    /// Node the renderer is attached to.
    pub node: NodeId,
    /// Renderer to draw.
    pub renderer: RendererId,
    /// Node world matrix.
    pub model: Mat4,
    /// Node world color.
    pub color: Vec4,
    /// Node size.
    pub size: Vec3,
    /// Node world scale.
    pub scale: Vec3,
    /// Shader inherited from the node hierarchy, overriding the renderer's.
    pub shader: Option<ShaderId>,
    /// Custom uniforms of the node.
    pub uniforms: Arc<UniformMap>,
    /// Renderer depth index.
    pub depth_index: i32,
    /// Node sort modifier.
    pub sort_modifier: f32,
}

impl RenderItem {
    /// Key the items of a list are stably sorted by.
    #[must_use]
    pub fn sort_key(&self) -> f32 {
        #[expect(
            clippy::cast_precision_loss,
            reason = "depth indices are small"
        )]
        let depth = self.depth_index as f32;
        depth + self.sort_modifier
    }
}

/// Which renderables of a layer a list holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderListKind {
    /// Renderables in normal draw mode.
    Color,
    /// Renderables drawn on top of the layer.
    Overlay,
}

/// The renderables of one layer, in draw order.
#[derive(Clone, Debug)]
pub struct RenderList {
    /// Layer node the renderables belong to.
    pub layer: NodeId,
    /// Color or overlay.
    pub kind: RenderListKind,
    /// Items in draw order.
    pub items: Vec<RenderItem>,
}

/// Signals the update stage that a render-once task reached its target.
///
/// Clones share the same flag. The render stage marks the tracker after the
/// frame that drew into the task's framebuffer has been submitted.
#[derive(Clone, Debug, Default)]
pub struct RenderTracker {
    synced: Arc<AtomicBool>,
}

impl RenderTracker {
    /// Creates an unsynced tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the tracked frame as drawn.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }

    /// Returns whether the tracked frame has been drawn.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Clears the flag for a new render.
    pub fn reset(&self) {
        self.synced.store(false, Ordering::Release);
    }
}

/// Everything the render stage needs to draw one render task.
#[derive(Clone, Debug)]
pub struct RenderInstruction {
    /// Task that produced the instruction.
    pub task: RenderTaskId,
    /// Camera view matrix.
    pub view: Mat4,
    /// Camera projection matrix.
    pub projection: Mat4,
    /// Whether the camera mirrors the scene.
    pub reflection: bool,
    /// Render target; `None` is the surface.
    pub frame_buffer: Option<FrameBufferId>,
    /// Viewport in target pixels with a top-left origin; `None` covers the
    /// whole target.
    pub viewport: Option<Rect>,
    /// Clear color, when clearing is enabled.
    pub clear_color: Option<Vec4>,
    /// Render pass tag selecting shader variants.
    pub render_pass_tag: u32,
    /// Whether renderables outside the view may be culled.
    pub cull_mode: bool,
    /// Tracker to mark once drawn.
    pub tracker: Option<RenderTracker>,
    /// Draw to the surface even though a framebuffer is set.
    pub ignore_render_to_fbo: bool,
    /// Render lists in draw order.
    pub lists: Vec<RenderList>,
}

impl RenderInstruction {
    /// Total number of items over all lists.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.lists.iter().map(|l| l.items.len()).sum()
    }

    /// Returns whether the instruction draws into its framebuffer.
    #[must_use]
    pub fn targets_frame_buffer(&self) -> bool {
        self.frame_buffer.is_some() && !self.ignore_render_to_fbo
    }
}

/// A message from the update stage to the render stage.
#[derive(Clone, Debug)]
pub enum RenderMessage {
    /// A resource change.
    Resource(ResourceMessage),
    /// A new renderer.
    AddRenderer(RendererId, Box<RendererDesc>),
    /// A renderer change.
    UpdateRenderer(RendererId, RendererMessage),
    /// A renderer left the scene.
    RemoveRenderer(RendererId),
    /// A destroyed node's handle is about to be reused.
    ReleaseNode(NodeId),
    /// Surface clear color.
    SetBackgroundColor(Vec4),
    /// Surface rectangle in pixels.
    SetSurfaceRect(Rect),
    /// Instructions computed for `buffer`, replacing the previous ones.
    Instructions {
        /// Buffer the instructions were computed for.
        buffer: BufferIndex,
        /// Instructions in draw order.
        instructions: Vec<RenderInstruction>,
    },
}
