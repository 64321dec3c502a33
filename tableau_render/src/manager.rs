// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render stage.
//!
//! [`RenderManager::render`] runs once per frame after the update stage:
//!
//! 1. **PreRender**: queued [`RenderMessage`]s are applied, renderers whose
//!    resources went away are invalidated, and uniform memory is recycled.
//! 2. **RenderScene**: the surface is cleared with the background color,
//!    then each instruction of the render buffer becomes one render pass.
//! 3. **PostRender**: uniform memory is flushed, the command buffer is
//!    submitted, trackers of drawn render-once tasks are marked, and the
//!    render buffer index is swapped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use glam::Vec4;
use kurbo::{Rect, Size};

use tableau_core::instruction::{RenderInstruction, RenderMessage, RenderTracker};
use tableau_core::property::BufferIndex;
use tableau_core::renderer::{BlendMode, DRAW_QUEUE_OPAQUE, RendererId};
use tableau_core::resource::ShaderHints;
use tableau_core::time::{Clock, MonotonicClock};
use tableau_core::trace::{
    FrameSummaryBuilder, PhaseBeginEvent, PhaseEndEvent, PhaseKind, RenderStatsEvent, Tracer,
};
use tableau_core::update::{DEFAULT_SURFACE_SIZE, UpdateStatus};

use crate::graphics::{CommandBuffer, Controller, RenderTarget};
use crate::lifecycle::{Lifecycle, Subject};
use crate::pipeline_cache::PipelineCache;
use crate::program::ProgramCache;
use crate::renderer::{DrawContext, DrawOutcome, Renderer};
use crate::resources::{Released, ResourceTable};
use crate::uniform_buffer::{DEFAULT_ALIGNMENT, DEFAULT_PAGE_SIZE, UniformBufferManager};

/// Render stage configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    /// Initial surface rectangle in pixels.
    pub surface: Rect,
    /// Initial background color.
    pub background_color: Vec4,
    /// Size of one uniform page in bytes.
    pub uniform_page_size: u32,
    /// Alignment of uniform blocks in bytes.
    pub uniform_alignment: u32,
    /// Whether the surface expects premultiplied colors.
    pub premultiplied_alpha: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            surface: DEFAULT_SURFACE_SIZE.to_rect(),
            background_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            uniform_page_size: DEFAULT_PAGE_SIZE,
            uniform_alignment: DEFAULT_ALIGNMENT,
            premultiplied_alpha: false,
        }
    }
}

impl RenderConfig {
    /// Configuration for a surface of `surface`.
    #[must_use]
    pub fn new(surface: Rect) -> Self {
        Self {
            surface,
            ..Self::default()
        }
    }
}

/// Result of one [`RenderManager::render`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStatus {
    /// Frame counter of the update this render followed.
    pub frame_index: u64,
    /// Buffer that was drawn.
    pub buffer: BufferIndex,
    /// Instructions drawn.
    pub instructions: u32,
    /// Draw commands recorded.
    pub draws: u32,
    /// Items that drew nothing.
    pub skipped: u32,
    /// Whether anything was submitted.
    pub rendered: bool,
}

/// The render stage.
pub struct RenderManager<C: Controller> {
    controller: C,
    messages: Receiver<RenderMessage>,
    resources: ResourceTable,
    renderers: HashMap<RendererId, Renderer>,
    programs: ProgramCache,
    pipelines: PipelineCache,
    uniforms: UniformBufferManager,
    lifecycle: Lifecycle,
    instructions: [Vec<RenderInstruction>; 2],
    render_buffer: BufferIndex,
    surface: Rect,
    background_color: Vec4,
    premultiplied_alpha: bool,
    last_frame_was_rendered: bool,
    clock: Arc<dyn Clock>,
}

impl<C: Controller> core::fmt::Debug for RenderManager<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderManager")
            .field("render_buffer", &self.render_buffer)
            .field("renderers", &self.renderers.len())
            .field("programs", &self.programs.len())
            .field("pipelines", &self.pipelines.len())
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct SceneStats {
    instructions: u32,
    draws: u32,
    skipped: u32,
}

impl<C: Controller> RenderManager<C> {
    /// Creates a render stage reading `messages` and drawing with
    /// `controller`.
    pub fn new(controller: C, messages: Receiver<RenderMessage>, config: RenderConfig) -> Self {
        Self {
            controller,
            messages,
            resources: ResourceTable::new(),
            renderers: HashMap::new(),
            programs: ProgramCache::new(),
            pipelines: PipelineCache::new(),
            uniforms: UniformBufferManager::new(config.uniform_page_size, config.uniform_alignment),
            lifecycle: Lifecycle::new(),
            instructions: [Vec::new(), Vec::new()],
            render_buffer: BufferIndex::ZERO,
            surface: config.surface,
            background_color: config.background_color,
            premultiplied_alpha: config.premultiplied_alpha,
            last_frame_was_rendered: false,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Replaces the clock used for trace timestamps.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Renders one frame after the update that produced `status`.
    pub fn render(&mut self, status: &UpdateStatus, tracer: &mut Tracer<'_>) -> RenderStatus {
        let frame_index = status.frame_index;
        let buffer = self.render_buffer;
        if buffer != status.buffer {
            log::warn!("rendering {buffer:?} after update of {:?}", status.buffer);
        }
        let mut summary = FrameSummaryBuilder::new(frame_index, status.buffer, status.begin);
        summary.phase_begin(PhaseKind::Update, status.begin);
        summary.phase_end(PhaseKind::Update, status.end);
        summary.set_scene_updated(status.scene_updated);

        self.phase_begin(tracer, &mut summary, frame_index, PhaseKind::PreRender);
        self.process_messages();
        for renderer in self.lifecycle.drain() {
            if let Some(r) = self.renderers.get_mut(&renderer) {
                r.invalidate();
            }
        }
        self.uniforms.reset();
        self.phase_end(tracer, &mut summary, frame_index, PhaseKind::PreRender);

        self.phase_begin(tracer, &mut summary, frame_index, PhaseKind::RenderScene);
        let have_instructions = !self.instructions[buffer.get()].is_empty();
        let mut commands = CommandBuffer::new();
        let mut trackers = Vec::new();
        let mut stats = SceneStats::default();
        if have_instructions || self.last_frame_was_rendered {
            self.clear_surface(&mut commands);
            stats = self.render_scene(buffer, &mut commands, &mut trackers);
        }
        self.phase_end(tracer, &mut summary, frame_index, PhaseKind::RenderScene);

        self.phase_begin(tracer, &mut summary, frame_index, PhaseKind::PostRender);
        let rendered = !commands.is_empty();
        if rendered {
            if let Err(err) = self.uniforms.flush(&mut self.controller) {
                log::error!("failed to upload uniforms: {err}");
            }
            match self.controller.submit(commands) {
                Ok(()) => trackers.iter().for_each(RenderTracker::mark_synced),
                Err(err) => log::error!("submit failed: {err}"),
            }
        }
        self.last_frame_was_rendered = have_instructions;
        self.render_buffer = buffer.other();
        self.phase_end(tracer, &mut summary, frame_index, PhaseKind::PostRender);

        tracer.render_stats(&RenderStatsEvent {
            frame_index,
            instructions: stats.instructions,
            draws: stats.draws,
            skipped: stats.skipped,
            pipelines_created: self.pipelines.take_created(),
            programs_created: self.programs.take_created(),
            uniform_bytes: self.uniforms.bytes_written(),
        });
        summary.set_draws(stats.draws);
        tracer.frame_summary(&summary.finish());

        RenderStatus {
            frame_index,
            buffer,
            instructions: stats.instructions,
            draws: stats.draws,
            skipped: stats.skipped,
            rendered,
        }
    }

    /// The backend.
    #[must_use]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// The backend, mutably.
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Render-side state of a renderer.
    #[must_use]
    pub fn renderer(&self, id: RendererId) -> Option<&Renderer> {
        self.renderers.get(&id)
    }

    /// Resources known to the render stage.
    #[must_use]
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// Instructions last received for `buffer`.
    #[must_use]
    pub fn instructions(&self, buffer: BufferIndex) -> &[RenderInstruction] {
        &self.instructions[buffer.get()]
    }

    /// Buffer the next render draws.
    #[must_use]
    pub fn render_buffer(&self) -> BufferIndex {
        self.render_buffer
    }

    /// Current surface rectangle.
    #[must_use]
    pub fn surface(&self) -> Rect {
        self.surface
    }

    /// Current background color.
    #[must_use]
    pub fn background_color(&self) -> Vec4 {
        self.background_color
    }

    fn process_messages(&mut self) {
        let messages: Vec<RenderMessage> = self.messages.try_iter().collect();
        for message in messages {
            match message {
                RenderMessage::Resource(resource) => {
                    match self.resources.apply(&mut self.controller, resource) {
                        Some(Released::Shader(shader)) => {
                            let released = self.programs.release_shader(
                                &mut self.controller,
                                &mut self.pipelines,
                                shader,
                            );
                            for program in released {
                                self.lifecycle.destroyed(Subject::Program(program));
                            }
                        }
                        Some(Released::Geometry(geometry)) => {
                            self.pipelines
                                .invalidate_geometry(&mut self.controller, geometry);
                            self.lifecycle.destroyed(Subject::Geometry(geometry));
                        }
                        None => {}
                    }
                }
                RenderMessage::AddRenderer(id, desc) => {
                    self.renderers.insert(id, Renderer::new(id, *desc));
                }
                RenderMessage::UpdateRenderer(id, change) => match self.renderers.get_mut(&id) {
                    Some(renderer) => renderer.apply(change),
                    None => log::warn!("update for unknown {id:?}"),
                },
                RenderMessage::RemoveRenderer(id) => {
                    self.renderers.remove(&id);
                    self.lifecycle.forget(id);
                }
                RenderMessage::ReleaseNode(node) => {
                    for renderer in self.renderers.values_mut() {
                        renderer.forget_node(node);
                    }
                }
                RenderMessage::SetBackgroundColor(color) => self.background_color = color,
                RenderMessage::SetSurfaceRect(rect) => self.surface = rect,
                RenderMessage::Instructions {
                    buffer,
                    instructions,
                } => self.instructions[buffer.get()] = instructions,
            }
        }
    }

    fn clear_surface(&self, commands: &mut CommandBuffer) {
        let mut color = self.background_color;
        if self.premultiplied_alpha {
            color = (color.truncate() * color.w).extend(color.w);
        }
        commands.begin_render_pass(RenderTarget::Surface, Some(color), None);
        commands.set_viewport(Rect::from_origin_size((0.0, 0.0), self.surface.size()));
        commands.end_render_pass();
    }

    fn render_scene(
        &mut self,
        buffer: BufferIndex,
        commands: &mut CommandBuffer,
        trackers: &mut Vec<RenderTracker>,
    ) -> SceneStats {
        let Self {
            controller,
            resources,
            renderers,
            programs,
            pipelines,
            uniforms,
            lifecycle,
            instructions,
            surface,
            ..
        } = self;
        let mut stats = SceneStats::default();

        for instruction in &instructions[buffer.get()] {
            let (target, target_size) = if instruction.targets_frame_buffer() {
                let Some(fb) = instruction
                    .frame_buffer
                    .and_then(|id| resources.frame_buffer(id))
                else {
                    log::warn!("{:?} targets a missing framebuffer", instruction.task);
                    continue;
                };
                let size = Size::new(f64::from(fb.width), f64::from(fb.height));
                (RenderTarget::FrameBuffer(fb.handle), size)
            } else {
                (RenderTarget::Surface, surface.size())
            };

            let target_height = target_size.height;
            let viewport = instruction
                .viewport
                .unwrap_or_else(|| target_size.to_rect());
            let flipped = Rect::new(
                viewport.x0,
                target_height - viewport.y1,
                viewport.x1,
                target_height - viewport.y0,
            );
            commands.begin_render_pass(target, instruction.clear_color, Some(flipped));
            commands.set_viewport(flipped);

            let mut ctx = DrawContext {
                controller: &mut *controller,
                commands: &mut *commands,
                resources,
                programs: &mut *programs,
                pipelines: &mut *pipelines,
                uniforms: &mut *uniforms,
                lifecycle: &mut *lifecycle,
                target,
                bound_geometry: None,
            };
            for item in instruction.lists.iter().flat_map(|l| l.items.iter()) {
                let Some(renderer) = renderers.get_mut(&item.renderer) else {
                    log::warn!("{:?} is not known to the render stage", item.renderer);
                    stats.skipped += 1;
                    continue;
                };
                let desc = renderer.desc();
                let uses_commands = !desc.draw_commands.is_empty();
                let transparent_shader = resources
                    .shader(item.shader.unwrap_or(desc.shader))
                    .is_some_and(|s| s.hints().contains(ShaderHints::OUTPUT_IS_TRANSPARENT));
                let auto_blend = desc.wants_blend(item.color.w)
                    || (desc.blend_mode == BlendMode::Auto && transparent_shader);

                let mut drawn = false;
                for queue in 0..renderer.queue_count() {
                    let blend = if uses_commands {
                        queue != DRAW_QUEUE_OPAQUE
                    } else {
                        auto_blend
                    };
                    match renderer.draw(&mut ctx, item, instruction, blend, queue) {
                        DrawOutcome::Drawn => {
                            drawn = true;
                            stats.draws += 1;
                        }
                        DrawOutcome::NothingForQueue => {}
                        outcome => log::trace!("{:?} skipped: {outcome:?}", item.renderer),
                    }
                }
                if !drawn {
                    stats.skipped += 1;
                }
            }
            commands.end_render_pass();

            stats.instructions += 1;
            if let Some(tracker) = &instruction.tracker {
                trackers.push(tracker.clone());
            }
        }
        stats
    }

    fn phase_begin(
        &self,
        tracer: &mut Tracer<'_>,
        summary: &mut FrameSummaryBuilder,
        frame_index: u64,
        phase: PhaseKind,
    ) {
        let timestamp = self.clock.now();
        summary.phase_begin(phase, timestamp);
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index,
            phase,
            timestamp,
        });
    }

    fn phase_end(
        &self,
        tracer: &mut Tracer<'_>,
        summary: &mut FrameSummaryBuilder,
        frame_index: u64,
        phase: PhaseKind,
    ) {
        let timestamp = self.clock.now();
        summary.phase_end(phase, timestamp);
        tracer.phase_end(&PhaseEndEvent {
            frame_index,
            phase,
            timestamp,
        });
    }
}
