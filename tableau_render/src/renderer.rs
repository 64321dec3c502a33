// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render-side renderer and its draw path.
//!
//! A [`Renderer`] mirrors the update stage's [`RendererDesc`] and owns the
//! caches that make repeated draws cheap: the last pipeline it resolved
//! and one [`UniformIndexMap`] per node and program it was drawn with.
//! [`Renderer::draw`] records the commands for one item in one queue, or
//! reports why it drew nothing.

use core::fmt;
use std::collections::HashMap;

use glam::{Mat3, Mat4, Vec3, Vec4};
use smallvec::SmallVec;

use tableau_core::instruction::{RenderInstruction, RenderItem};
use tableau_core::node::NodeId;
use tableau_core::renderer::{
    DrawCommand, DrawKind, RenderCallbackInput, RendererDesc, RendererId, RendererMessage,
};
use tableau_core::resource::{GeometryId, ShaderHints};
use tableau_core::uniform::UniformValue;

use crate::graphics::{
    ColorBlendState, CommandBuffer, Controller, PipelineHandle, ProgramHandle, RenderTarget,
    TextureHandle, UniformBufferBinding,
};
use crate::lifecycle::{Lifecycle, Subject};
use crate::pipeline_cache::{PipelineCache, PipelineKey, reflected_cull_mode};
use crate::program::{Program, ProgramCache};
use crate::resources::ResourceTable;
use crate::uniform_buffer::{UniformBufferManager, UniformBufferView};
use crate::uniform_map::UniformIndexMap;

/// What a call to [`Renderer::draw`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Commands were recorded.
    Drawn,
    /// The item lies outside the view.
    Culled,
    /// A texture is missing or has no pixels yet.
    TexturesNotReady,
    /// No program could be resolved for the render pass.
    NoProgram,
    /// The geometry is not uploaded.
    NoGeometry,
    /// The backend rejected the pipeline.
    PipelineFailed,
    /// Uniform memory could not be allocated.
    NoUniformMemory,
    /// The renderer has nothing to draw in this queue.
    NothingForQueue,
}

impl DrawOutcome {
    /// Returns whether commands were recorded.
    #[must_use]
    pub fn is_drawn(self) -> bool {
        self == Self::Drawn
    }
}

/// Everything a draw reads or records into.
pub struct DrawContext<'a> {
    /// Backend.
    pub controller: &'a mut dyn Controller,
    /// Commands of the current frame.
    pub commands: &'a mut CommandBuffer,
    /// Resource table.
    pub resources: &'a ResourceTable,
    /// Program cache.
    pub programs: &'a mut ProgramCache,
    /// Pipeline cache.
    pub pipelines: &'a mut PipelineCache,
    /// Uniform memory of the frame.
    pub uniforms: &'a mut UniformBufferManager,
    /// Dependency graph for invalidation.
    pub lifecycle: &'a mut Lifecycle,
    /// Target of the current pass.
    pub target: RenderTarget,
    /// Geometry bound by the previous draw of the pass.
    pub bound_geometry: Option<GeometryId>,
}

impl fmt::Debug for DrawContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawContext")
            .field("target", &self.target)
            .field("bound_geometry", &self.bound_geometry)
            .finish_non_exhaustive()
    }
}

/// Render-side state of one renderer.
#[derive(Debug)]
pub struct Renderer {
    id: RendererId,
    desc: RendererDesc,
    pipeline: Option<(PipelineKey, PipelineHandle)>,
    uniform_maps: HashMap<(NodeId, ProgramHandle), UniformIndexMap>,
}

impl Renderer {
    /// Creates the render-side copy of a renderer.
    #[must_use]
    pub fn new(id: RendererId, desc: RendererDesc) -> Self {
        Self {
            id,
            desc,
            pipeline: None,
            uniform_maps: HashMap::new(),
        }
    }

    /// The renderer's handle.
    #[must_use]
    pub fn id(&self) -> RendererId {
        self.id
    }

    /// Current description.
    #[must_use]
    pub fn desc(&self) -> &RendererDesc {
        &self.desc
    }

    /// Applies a change forwarded by the update stage.
    pub fn apply(&mut self, message: RendererMessage) {
        self.desc.apply(message);
    }

    /// Drops the cached pipeline and uniform maps.
    pub fn invalidate(&mut self) {
        log::trace!("invalidating caches of {:?}", self.id);
        self.pipeline = None;
        self.uniform_maps.clear();
    }

    /// Drops the uniform maps built for `node`.
    pub fn forget_node(&mut self, node: NodeId) {
        self.uniform_maps.retain(|(n, _), _| *n != node);
    }

    /// Number of `(node, program)` uniform maps held.
    #[must_use]
    pub fn uniform_map_count(&self) -> usize {
        self.uniform_maps.len()
    }

    /// Number of queues the renderer is drawn in.
    #[must_use]
    pub fn queue_count(&self) -> u32 {
        if self.desc.draw_commands.is_empty() && self.desc.render_callback.is_none() {
            1
        } else {
            tableau_core::renderer::DRAW_QUEUE_COUNT
        }
    }

    /// Records the commands drawing `item` in `queue`.
    pub fn draw(
        &mut self,
        ctx: &mut DrawContext<'_>,
        item: &RenderItem,
        instruction: &RenderInstruction,
        blend: bool,
        queue: u32,
    ) -> DrawOutcome {
        let commands: SmallVec<[DrawCommand; 2]> = self
            .desc
            .draw_commands
            .iter()
            .filter(|c| c.queue == queue)
            .copied()
            .collect();
        let color = final_color(item.color, &self.desc);
        let resources = ctx.resources;

        if let Some(callback) = &self.desc.render_callback {
            if callback.queue != queue {
                return DrawOutcome::NothingForQueue;
            }
            let view_model = instruction.view * item.model;
            let input = RenderCallbackInput {
                model: item.model,
                view: instruction.view,
                projection: instruction.projection,
                mvp: instruction.projection * view_model,
                size: item.size,
                color,
            };
            ctx.commands.draw_native(callback.clone(), input);
            return DrawOutcome::Drawn;
        }
        if !self.desc.draw_commands.is_empty() && commands.is_empty() {
            return DrawOutcome::NothingForQueue;
        }

        let Some(textures) = self.textures(resources) else {
            log::trace!("{:?} waits for textures", self.id);
            return DrawOutcome::TexturesNotReady;
        };

        let shader_id = item.shader.unwrap_or(self.desc.shader);
        let Some(shader) = resources.shader(shader_id) else {
            log::error!("{:?} has no shader data for {shader_id:?}", self.id);
            return DrawOutcome::NoProgram;
        };
        if instruction.cull_mode
            && !shader.hints().contains(ShaderHints::MODIFIES_GEOMETRY)
            && is_outside_view(instruction.projection * instruction.view * item.model, item.size)
        {
            return DrawOutcome::Culled;
        }
        let program = match ctx.programs.get_or_create(
            ctx.controller,
            shader_id,
            shader,
            instruction.render_pass_tag,
        ) {
            Ok(Some(program)) => program,
            Ok(None) => {
                log::error!(
                    "{shader_id:?} has no source for render pass {}",
                    instruction.render_pass_tag
                );
                return DrawOutcome::NoProgram;
            }
            Err(err) => {
                log::error!("failed to build program for {shader_id:?}: {err}");
                return DrawOutcome::NoProgram;
            }
        };

        let Some(geometry) = resources.geometry(self.desc.geometry) else {
            log::warn!("{:?} draws missing {:?}", self.id, self.desc.geometry);
            return DrawOutcome::NoGeometry;
        };

        let key = PipelineKey {
            program: program.handle,
            geometry: self.desc.geometry,
            blend: blend.then_some(ColorBlendState {
                options: self.desc.blend_options,
                premultiplied_alpha: self.desc.premultiplied_alpha,
            }),
            cull_mode: reflected_cull_mode(self.desc.face_cull, instruction.reflection),
            target: ctx.target,
        };
        let pipeline = match self.pipeline {
            Some((cached, handle)) if cached == key => handle,
            _ => match ctx
                .pipelines
                .get_or_create(ctx.controller, key, &geometry.desc)
            {
                Ok(handle) => {
                    self.pipeline = Some((key, handle));
                    ctx.lifecycle
                        .observe(self.id, Subject::Geometry(self.desc.geometry));
                    ctx.lifecycle
                        .observe(self.id, Subject::Program(program.handle));
                    handle
                }
                Err(err) => {
                    log::error!("failed to build pipeline for {:?}: {err}", self.id);
                    return DrawOutcome::PipelineFailed;
                }
            },
        };

        let Some(bindings) = self.write_uniforms(ctx, item, instruction, &program, color) else {
            return DrawOutcome::NoUniformMemory;
        };

        ctx.commands.bind_pipeline(pipeline);
        if !textures.is_empty() {
            ctx.commands.bind_textures(textures);
        }
        if !bindings.is_empty() {
            ctx.commands.bind_uniform_buffers(bindings);
        }
        if ctx.bound_geometry != Some(self.desc.geometry) {
            ctx.commands
                .bind_vertex_buffers(geometry.vertex_buffers.clone());
            if let Some(index) = geometry.index_buffer {
                ctx.commands.bind_index_buffer(index);
            }
            ctx.bound_geometry = Some(self.desc.geometry);
        }

        if commands.is_empty() {
            let count = geometry.desc.element_count();
            if geometry.desc.is_indexed() {
                let (first, count) = self.desc.index_range.unwrap_or((0, count));
                ctx.commands.draw_indexed(first, count, 1);
            } else {
                ctx.commands.draw(0, count, 1);
            }
        } else {
            for command in commands {
                match command.kind {
                    DrawKind::Indexed if geometry.desc.is_indexed() => {
                        ctx.commands
                            .draw_indexed(command.first, command.count, command.instances);
                    }
                    _ => ctx
                        .commands
                        .draw(command.first, command.count, command.instances),
                }
            }
        }
        DrawOutcome::Drawn
    }

    /// Backend handles of every texture, or `None` while one is not ready.
    fn textures(&self, resources: &ResourceTable) -> Option<Vec<TextureHandle>> {
        self.desc
            .textures
            .iter()
            .map(|&id| {
                resources
                    .texture(id)
                    .filter(|t| t.ready)
                    .map(|t| t.handle)
            })
            .collect()
    }

    fn write_uniforms(
        &mut self,
        ctx: &mut DrawContext<'_>,
        item: &RenderItem,
        instruction: &RenderInstruction,
        program: &Program,
        color: Vec4,
    ) -> Option<Vec<UniformBufferBinding>> {
        let reflection = &program.reflection;
        let mut views: Vec<UniformBufferView> = Vec::with_capacity(reflection.blocks.len());
        for block in &reflection.blocks {
            match ctx.uniforms.allocate(ctx.controller, block.size) {
                Ok(view) => views.push(view),
                Err(err) => {
                    log::error!("uniform allocation for {:?} failed: {err}", self.id);
                    return None;
                }
            }
        }

        let model_view = instruction.view * item.model;
        let builtins = [
            ("uModelMatrix", UniformValue::Mat4(item.model)),
            ("uViewMatrix", UniformValue::Mat4(instruction.view)),
            ("uProjection", UniformValue::Mat4(instruction.projection)),
            ("uModelView", UniformValue::Mat4(model_view)),
            (
                "uMvpMatrix",
                UniformValue::Mat4(instruction.projection * model_view),
            ),
            (
                "uNormalMatrix",
                UniformValue::Mat3(Mat3::from_mat4(model_view).inverse().transpose()),
            ),
            ("uScale", UniformValue::Vec3(item.scale)),
            ("uSize", UniformValue::Vec3(item.size)),
            ("uColor", UniformValue::Vec4(color)),
        ];
        for (name, value) in &builtins {
            if let Some(location) = reflection.find(name)
                && !ctx
                    .uniforms
                    .write_member(views[location.block as usize], location, value)
            {
                log::warn!("{name} does not fit {} bytes", location.size);
            }
        }

        let map = self
            .uniform_maps
            .entry((item.node, program.handle))
            .or_default();
        map.update(reflection, &self.desc.uniforms, &item.uniforms);
        for (location, value) in map.resolve(&self.desc.uniforms, &item.uniforms) {
            if !ctx
                .uniforms
                .write_member(views[location.block as usize], location, &value)
            {
                log::warn!(
                    "uniform value {value:?} does not fit {} bytes",
                    location.size
                );
            }
        }

        Some(
            reflection
                .blocks
                .iter()
                .zip(views)
                .map(|(block, view)| UniformBufferBinding {
                    binding: block.binding,
                    buffer: view.buffer,
                    offset: view.offset,
                    size: view.size,
                })
                .collect(),
        )
    }
}

/// `world_color * mix_color`, premultiplied when the renderer asks for it.
fn final_color(world: Vec4, desc: &RendererDesc) -> Vec4 {
    let color = world * desc.mix_color;
    if desc.premultiplied_alpha {
        (color.truncate() * color.w).extend(color.w)
    } else {
        color
    }
}

/// Returns whether a box of `size` centered on the origin projects
/// entirely outside one clip plane.
fn is_outside_view(mvp: Mat4, size: Vec3) -> bool {
    let half = size * 0.5;
    let corners = [
        Vec3::new(-half.x, -half.y, -half.z),
        Vec3::new(half.x, -half.y, -half.z),
        Vec3::new(-half.x, half.y, -half.z),
        Vec3::new(half.x, half.y, -half.z),
        Vec3::new(-half.x, -half.y, half.z),
        Vec3::new(half.x, -half.y, half.z),
        Vec3::new(-half.x, half.y, half.z),
        Vec3::new(half.x, half.y, half.z),
    ]
    .map(|c| mvp * c.extend(1.0));
    let all = |test: fn(Vec4) -> bool| corners.iter().all(|&c| test(c));
    all(|c| c.x < -c.w) || all(|c| c.x > c.w) || all(|c| c.y < -c.w) || all(|c| c.y > c.w)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use glam::{Mat4, Vec3, Vec4};
    use tableau_core::renderer::{BlendMode, ExecutionMode, FaceCullMode, RenderCallback};
    use tableau_core::resource::{
        GeometryDesc, ResourceMessage, ShaderData, ShaderId, TextureDesc, TextureFormat,
        TextureId, VertexBufferDesc, VertexFormat,
    };

    use super::*;
    use crate::graphics::{Command, ProgramReflection, UniformBlock, UniformMember};
    use crate::testing::{RecordingController, handle};

    struct Fixture {
        gpu: RecordingController,
        resources: ResourceTable,
        programs: ProgramCache,
        pipelines: PipelineCache,
        uniforms: UniformBufferManager,
        lifecycle: Lifecycle,
        commands: CommandBuffer,
    }

    impl Fixture {
        fn new() -> Self {
            let mut gpu = RecordingController::new();
            let mut resources = ResourceTable::new();
            let shader: ShaderId = handle(0);
            let geometry: GeometryId = handle(0);
            resources.apply(
                &mut gpu,
                ResourceMessage::AddShader(shader, ShaderData::new("vs", "fs", ShaderHints::empty())),
            );
            resources.apply(
                &mut gpu,
                ResourceMessage::AddGeometry(
                    geometry,
                    GeometryDesc {
                        vertex_buffers: vec![VertexBufferDesc::packed(
                            &[("aPosition", VertexFormat::Vec2)],
                            4,
                            Arc::from(vec![0_u8; 32]),
                        )],
                        indices: Arc::from(vec![0_u16, 1, 2, 2, 1, 3]),
                        ..GeometryDesc::default()
                    },
                ),
            );
            Self {
                gpu,
                resources,
                programs: ProgramCache::new(),
                pipelines: PipelineCache::new(),
                uniforms: UniformBufferManager::new(4096, 256),
                lifecycle: Lifecycle::new(),
                commands: CommandBuffer::new(),
            }
        }

        fn draw(
            &mut self,
            renderer: &mut Renderer,
            item: &RenderItem,
            instruction: &RenderInstruction,
            blend: bool,
            queue: u32,
        ) -> DrawOutcome {
            let mut ctx = DrawContext {
                controller: &mut self.gpu,
                commands: &mut self.commands,
                resources: &self.resources,
                programs: &mut self.programs,
                pipelines: &mut self.pipelines,
                uniforms: &mut self.uniforms,
                lifecycle: &mut self.lifecycle,
                target: RenderTarget::Surface,
                bound_geometry: None,
            };
            renderer.draw(&mut ctx, item, instruction, blend, queue)
        }
    }

    fn renderer() -> Renderer {
        Renderer::new(handle(0), RendererDesc::new(handle(0), handle(0)))
    }

    fn item() -> RenderItem {
        RenderItem {
            node: handle(1),
            renderer: handle(0),
            model: Mat4::IDENTITY,
            color: Vec4::new(1.0, 1.0, 1.0, 0.5),
            size: Vec3::new(10.0, 10.0, 0.0),
            scale: Vec3::ONE,
            shader: None,
            uniforms: Arc::default(),
            depth_index: 0,
            sort_modifier: 0.0,
        }
    }

    fn instruction() -> RenderInstruction {
        RenderInstruction {
            task: handle(0),
            view: Mat4::IDENTITY,
            projection: Mat4::orthographic_rh(-100.0, 100.0, -100.0, 100.0, -1.0, 1.0),
            reflection: false,
            frame_buffer: None,
            viewport: None,
            clear_color: None,
            render_pass_tag: 0,
            cull_mode: false,
            tracker: None,
            ignore_render_to_fbo: false,
            lists: Vec::new(),
        }
    }

    fn draws(commands: &CommandBuffer) -> Vec<&Command> {
        commands
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. } | Command::DrawIndexed { .. }))
            .collect()
    }

    /// Flushes uniform memory and reads back `name` from the first bound
    /// block.
    fn uniform_bytes(f: &mut Fixture, name: &str, len: usize) -> Vec<u8> {
        f.uniforms.flush(&mut f.gpu).unwrap();
        let binding = f
            .commands
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::BindUniformBuffers(b) => b.first().copied(),
                _ => None,
            })
            .expect("uniforms bound");
        let location = f.gpu.reflection.find(name).expect("declared");
        f.gpu
            .written(binding.buffer, u64::from(binding.offset + location.offset), len)
            .expect("written")
            .to_vec()
    }

    #[test]
    fn indexed_geometry_draws_every_index() {
        let mut f = Fixture::new();
        let mut r = renderer();
        assert_eq!(f.draw(&mut r, &item(), &instruction(), false, 0), DrawOutcome::Drawn);
        assert!(matches!(
            draws(&f.commands)[..],
            [Command::DrawIndexed {
                first: 0,
                count: 6,
                instances: 1
            }]
        ));
    }

    #[test]
    fn index_range_limits_the_draw() {
        let mut f = Fixture::new();
        let mut r = renderer();
        r.apply(RendererMessage::SetIndexRange(Some((3, 3))));
        f.draw(&mut r, &item(), &instruction(), false, 0);
        assert!(matches!(
            draws(&f.commands)[..],
            [Command::DrawIndexed { first: 3, count: 3, .. }]
        ));
    }

    #[test]
    fn repeated_draws_reuse_the_pipeline() {
        let mut f = Fixture::new();
        let mut r = renderer();
        f.draw(&mut r, &item(), &instruction(), false, 0);
        f.draw(&mut r, &item(), &instruction(), false, 0);
        assert_eq!(f.gpu.pipelines_created, 1);
        f.draw(&mut r, &item(), &instruction(), true, 0);
        assert_eq!(f.gpu.pipelines_created, 2, "blend is part of the key");
    }

    #[test]
    fn unready_textures_skip_the_draw() {
        let mut f = Fixture::new();
        let texture: TextureId = handle(0);
        f.resources.apply(
            &mut f.gpu,
            ResourceMessage::AddTexture(
                texture,
                TextureDesc {
                    width: 1,
                    height: 1,
                    format: TextureFormat::Rgba8,
                    data: None,
                },
            ),
        );
        let mut r = renderer();
        r.apply(RendererMessage::SetTextures(SmallVec::from_slice(&[texture])));
        assert_eq!(
            f.draw(&mut r, &item(), &instruction(), false, 0),
            DrawOutcome::TexturesNotReady
        );
        assert!(f.commands.is_empty());

        f.resources.apply(
            &mut f.gpu,
            ResourceMessage::UploadTexture(texture, Arc::from(vec![0_u8; 4])),
        );
        assert!(f.draw(&mut r, &item(), &instruction(), false, 0).is_drawn());
    }

    #[test]
    fn missing_shader_source_is_no_program() {
        let mut f = Fixture::new();
        let empty: ShaderId = handle(1);
        f.resources.apply(
            &mut f.gpu,
            ResourceMessage::AddShader(empty, ShaderData::empty(ShaderHints::empty())),
        );
        let mut r = renderer();
        r.apply(RendererMessage::SetShader(empty));
        assert_eq!(
            f.draw(&mut r, &item(), &instruction(), false, 0),
            DrawOutcome::NoProgram
        );
    }

    #[test]
    fn inherited_shader_overrides_the_renderers() {
        let mut f = Fixture::new();
        let missing: ShaderId = handle(5);
        let mut r = renderer();
        let mut overridden = item();
        overridden.shader = Some(missing);
        assert_eq!(
            f.draw(&mut r, &overridden, &instruction(), false, 0),
            DrawOutcome::NoProgram
        );
    }

    #[test]
    fn color_is_mixed_and_premultiplied() {
        let mut desc = RendererDesc::new(handle(0), handle(0));
        desc.mix_color = Vec4::new(0.5, 1.0, 1.0, 1.0);
        assert_eq!(
            final_color(Vec4::new(1.0, 1.0, 1.0, 0.5), &desc),
            Vec4::new(0.5, 1.0, 1.0, 0.5)
        );
        desc.premultiplied_alpha = true;
        assert_eq!(
            final_color(Vec4::new(1.0, 1.0, 1.0, 0.5), &desc),
            Vec4::new(0.25, 0.5, 0.5, 0.5)
        );
    }

    #[test]
    fn builtin_color_reaches_uniform_memory() {
        let mut f = Fixture::new();
        let mut r = renderer();
        f.draw(&mut r, &item(), &instruction(), false, 0);
        assert_eq!(
            uniform_bytes(&mut f, "uColor", 16),
            bytemuck::bytes_of(&Vec4::new(1.0, 1.0, 1.0, 0.5))
        );
    }

    #[test]
    fn node_uniforms_override_renderer_uniforms() {
        let mut f = Fixture::new();
        let mut r = renderer();
        r.apply(RendererMessage::RegisterUniform(
            "uCustom".into(),
            UniformValue::Vec4(Vec4::ZERO),
        ));
        let mut node_item = item();
        let mut node_uniforms = tableau_core::uniform::UniformMap::new();
        node_uniforms.insert("uCustom", UniformValue::Vec4(Vec4::ONE));
        node_item.uniforms = Arc::new(node_uniforms);

        f.draw(&mut r, &node_item, &instruction(), false, 0);
        assert_eq!(
            uniform_bytes(&mut f, "uCustom", 16),
            bytemuck::bytes_of(&Vec4::ONE)
        );
    }

    #[test]
    fn culling_skips_items_outside_the_view() {
        let mut f = Fixture::new();
        let mut r = renderer();
        let mut far = item();
        far.model = Mat4::from_translation(Vec3::new(500.0, 0.0, 0.0));
        let mut culled = instruction();
        culled.cull_mode = true;
        assert_eq!(f.draw(&mut r, &far, &culled, false, 0), DrawOutcome::Culled);
        assert!(f.draw(&mut r, &item(), &culled, false, 0).is_drawn());
        assert!(f.draw(&mut r, &far, &instruction(), false, 0).is_drawn());
    }

    #[test]
    fn draw_commands_are_issued_per_queue() {
        let mut f = Fixture::new();
        let mut r = renderer();
        r.apply(RendererMessage::SetDrawCommands(vec![DrawCommand {
            queue: 1,
            kind: DrawKind::Array,
            first: 0,
            count: 4,
            instances: 2,
        }]));
        assert_eq!(r.queue_count(), 2);
        assert_eq!(
            f.draw(&mut r, &item(), &instruction(), false, 0),
            DrawOutcome::NothingForQueue
        );
        assert!(f.draw(&mut r, &item(), &instruction(), true, 1).is_drawn());
        assert!(matches!(
            draws(&f.commands)[..],
            [Command::Draw {
                first: 0,
                count: 4,
                instances: 2
            }]
        ));
    }

    #[test]
    fn render_callbacks_draw_natively_in_their_queue() {
        let mut f = Fixture::new();
        let mut r = renderer();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        r.apply(RendererMessage::SetRenderCallback(Some(RenderCallback::new(
            ExecutionMode::Direct,
            0,
            move |_| {
                seen.fetch_add(1, Ordering::Relaxed);
            },
        ))));
        assert!(f.draw(&mut r, &item(), &instruction(), false, 0).is_drawn());
        assert_eq!(
            f.draw(&mut r, &item(), &instruction(), false, 1),
            DrawOutcome::NothingForQueue
        );
        let Some(Command::DrawNative { callback, input }) = f.commands.commands().first() else {
            panic!("expected a native draw");
        };
        callback.invoke(input);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(input.color, item().color);
    }

    #[test]
    fn identical_geometry_is_bound_once_per_pass() {
        let mut f = Fixture::new();
        let mut r = renderer();
        let mut ctx = DrawContext {
            controller: &mut f.gpu,
            commands: &mut f.commands,
            resources: &f.resources,
            programs: &mut f.programs,
            pipelines: &mut f.pipelines,
            uniforms: &mut f.uniforms,
            lifecycle: &mut f.lifecycle,
            target: RenderTarget::Surface,
            bound_geometry: None,
        };
        r.draw(&mut ctx, &item(), &instruction(), false, 0);
        r.draw(&mut ctx, &item(), &instruction(), false, 0);
        let binds = f
            .commands
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BindVertexBuffers(_)))
            .count();
        assert_eq!(binds, 1);
    }

    #[test]
    fn destroyed_geometry_invalidates_the_cached_pipeline() {
        let mut f = Fixture::new();
        let mut r = renderer();
        f.draw(&mut r, &item(), &instruction(), false, 0);
        f.lifecycle.destroyed(Subject::Geometry(handle(0)));
        assert_eq!(f.lifecycle.drain(), vec![r.id()]);
        r.invalidate();
        assert!(r.pipeline.is_none());
    }

    #[test]
    fn reflection_flips_culled_faces_in_the_key() {
        let mut f = Fixture::new();
        let mut r = renderer();
        r.apply(RendererMessage::SetFaceCullMode(FaceCullMode::Back));
        r.apply(RendererMessage::SetBlendMode(BlendMode::Off));
        let mut mirrored = instruction();
        mirrored.reflection = true;
        f.draw(&mut r, &item(), &mirrored, false, 0);
        let (key, _) = r.pipeline.expect("cached");
        assert_eq!(key.cull_mode, FaceCullMode::Front);
    }

    #[test]
    fn packed_normal_matrix_leaves_the_next_member_alone() {
        let mut f = Fixture::new();
        f.gpu.reflection = ProgramReflection {
            blocks: vec![UniformBlock {
                name: "VertBlock".into(),
                binding: 0,
                size: 48,
                members: vec![
                    UniformMember {
                        name: "uNormalMatrix".into(),
                        offset: 0,
                        size: 36,
                    },
                    UniformMember {
                        name: "uSize".into(),
                        offset: 36,
                        size: 12,
                    },
                ],
            }],
            samplers: Vec::new(),
        };
        let mut r = renderer();
        assert!(f.draw(&mut r, &item(), &instruction(), false, 0).is_drawn());
        assert_eq!(
            uniform_bytes(&mut f, "uSize", 12),
            bytemuck::bytes_of(&item().size)
        );
        assert_eq!(
            uniform_bytes(&mut f, "uNormalMatrix", 36),
            bytemuck::bytes_of(&Mat3::IDENTITY)
        );
    }

    #[test]
    fn forgetting_a_node_drops_its_uniform_maps() {
        let mut f = Fixture::new();
        let mut r = renderer();
        let mut other = item();
        other.node = handle(2);
        f.draw(&mut r, &item(), &instruction(), false, 0);
        f.draw(&mut r, &other, &instruction(), false, 0);
        assert_eq!(r.uniform_map_count(), 2);

        r.forget_node(item().node);
        assert_eq!(r.uniform_map_count(), 1);
        r.forget_node(other.node);
        assert_eq!(r.uniform_map_count(), 0);
    }
}
