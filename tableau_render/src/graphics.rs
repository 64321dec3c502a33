// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Graphics backend abstraction.
//!
//! The render stage talks to the GPU only through a [`Controller`], which
//! creates backend objects, and a recorded [`CommandBuffer`], which the
//! controller executes on [`submit`](Controller::submit). Backend objects
//! are addressed by small opaque handles assigned by the controller.

use glam::Vec4;
use kurbo::Rect;
use thiserror::Error;

use tableau_core::renderer::{BlendOptions, FaceCullMode, RenderCallback, RenderCallbackInput};
use tableau_core::resource::{FrameBufferDesc, TextureDesc, Topology, VertexBufferDesc};

macro_rules! backend_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);
    };
}

backend_handle!(
    /// A compiled shader stage.
    ShaderHandle
);
backend_handle!(
    /// A linked program.
    ProgramHandle
);
backend_handle!(
    /// A pipeline state object.
    PipelineHandle
);
backend_handle!(
    /// A GPU buffer.
    BufferHandle
);
backend_handle!(
    /// A GPU texture.
    TextureHandle
);
backend_handle!(
    /// An off-screen render target.
    FrameBufferHandle
);

/// Errors reported by a [`Controller`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphicsError {
    /// A shader stage failed to compile.
    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),
    /// Program stages failed to link.
    #[error("program link failed: {0}")]
    ProgramLink(String),
    /// The backend rejected a pipeline description.
    #[error("pipeline creation failed: {0}")]
    PipelineCreation(String),
    /// The backend ran out of memory.
    #[error("out of device memory")]
    OutOfMemory,
    /// A handle does not name a live backend object.
    #[error("unknown {kind} {index}")]
    UnknownHandle {
        /// Object family.
        kind: &'static str,
        /// Handle value.
        index: u32,
    },
    /// A write fell outside a buffer.
    #[error("write of {len} bytes at {offset} exceeds buffer of {size} bytes")]
    OutOfBounds {
        /// Write offset.
        offset: u64,
        /// Write length.
        len: u64,
        /// Buffer size.
        size: u64,
    },
}

/// A shader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex data.
    Vertex,
    /// 16-bit indices.
    Index,
    /// Uniform blocks.
    Uniform,
}

/// One member of a uniform block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformMember {
    /// Name as declared in the shader.
    pub name: String,
    /// Byte offset inside the block.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

/// A uniform block of a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformBlock {
    /// Block name.
    pub name: String,
    /// Binding slot.
    pub binding: u32,
    /// Size of the block in bytes.
    pub size: u32,
    /// Members in declaration order.
    pub members: Vec<UniformMember>,
}

/// Where a uniform lives inside a program's blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    /// Index of the block in [`ProgramReflection::blocks`].
    pub block: u32,
    /// Byte offset inside the block.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

/// Uniform and sampler layout of a linked program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgramReflection {
    /// Uniform blocks.
    pub blocks: Vec<UniformBlock>,
    /// Sampler names in binding order.
    pub samplers: Vec<String>,
}

impl ProgramReflection {
    /// Finds a uniform by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<UniformLocation> {
        self.blocks.iter().enumerate().find_map(|(block, b)| {
            b.members
                .iter()
                .find(|m| m.name == name)
                .map(|m| UniformLocation {
                    block: u32::try_from(block).unwrap_or(u32::MAX),
                    offset: m.offset,
                    size: m.size,
                })
        })
    }
}

/// Target of a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The window surface.
    Surface,
    /// An off-screen target.
    FrameBuffer(FrameBufferHandle),
}

/// Color blending of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorBlendState {
    /// Factors and equations.
    pub options: BlendOptions,
    /// Whether source colors are premultiplied.
    pub premultiplied_alpha: bool,
}

/// Description of a pipeline.
#[derive(Clone, Debug)]
pub struct PipelineCreateInfo<'a> {
    /// Linked program.
    pub program: ProgramHandle,
    /// Vertex buffer layouts.
    pub vertex_buffers: &'a [VertexBufferDesc],
    /// Primitive assembly.
    pub topology: Topology,
    /// Blending; `None` disables it.
    pub blend: Option<ColorBlendState>,
    /// Faces culled after taking camera reflection into account.
    pub cull_mode: FaceCullMode,
    /// Target the pipeline renders into.
    pub target: RenderTarget,
}

/// A uniform buffer range bound to a block slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformBufferBinding {
    /// Block binding slot.
    pub binding: u32,
    /// Buffer holding the data.
    pub buffer: BufferHandle,
    /// Byte offset of the block.
    pub offset: u32,
    /// Size of the block.
    pub size: u32,
}

/// A recorded command.
#[derive(Clone, Debug)]
pub enum Command {
    /// Starts a render pass.
    BeginRenderPass {
        /// Target drawn into.
        target: RenderTarget,
        /// Clear color; `None` loads the previous contents.
        clear_color: Option<Vec4>,
        /// Region the clear is limited to.
        scissor: Option<Rect>,
    },
    /// Ends the current render pass.
    EndRenderPass,
    /// Sets the viewport, in target pixels with a bottom-left origin.
    SetViewport(Rect),
    /// Binds a pipeline.
    BindPipeline(PipelineHandle),
    /// Binds textures to consecutive sampler slots.
    BindTextures(Vec<TextureHandle>),
    /// Binds uniform block ranges.
    BindUniformBuffers(Vec<UniformBufferBinding>),
    /// Binds vertex buffers to consecutive slots.
    BindVertexBuffers(Vec<BufferHandle>),
    /// Binds an index buffer.
    BindIndexBuffer(BufferHandle),
    /// Non-indexed draw.
    Draw {
        /// First vertex.
        first: u32,
        /// Vertex count.
        count: u32,
        /// Instance count.
        instances: u32,
    },
    /// Indexed draw.
    DrawIndexed {
        /// First index.
        first: u32,
        /// Index count.
        count: u32,
        /// Instance count.
        instances: u32,
    },
    /// Runs a native callback.
    DrawNative {
        /// Callback to run.
        callback: RenderCallback,
        /// Matrices and node state handed to it.
        input: RenderCallbackInput,
    },
}

/// A list of commands recorded for one frame.
#[derive(Clone, Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Creates an empty command buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a render pass.
    pub fn begin_render_pass(
        &mut self,
        target: RenderTarget,
        clear_color: Option<Vec4>,
        scissor: Option<Rect>,
    ) {
        self.commands.push(Command::BeginRenderPass {
            target,
            clear_color,
            scissor,
        });
    }

    /// Ends the current render pass.
    pub fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    /// Sets the viewport.
    pub fn set_viewport(&mut self, viewport: Rect) {
        self.commands.push(Command::SetViewport(viewport));
    }

    /// Binds a pipeline.
    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(Command::BindPipeline(pipeline));
    }

    /// Binds textures.
    pub fn bind_textures(&mut self, textures: Vec<TextureHandle>) {
        self.commands.push(Command::BindTextures(textures));
    }

    /// Binds uniform buffers.
    pub fn bind_uniform_buffers(&mut self, bindings: Vec<UniformBufferBinding>) {
        self.commands.push(Command::BindUniformBuffers(bindings));
    }

    /// Binds vertex buffers.
    pub fn bind_vertex_buffers(&mut self, buffers: Vec<BufferHandle>) {
        self.commands.push(Command::BindVertexBuffers(buffers));
    }

    /// Binds an index buffer.
    pub fn bind_index_buffer(&mut self, buffer: BufferHandle) {
        self.commands.push(Command::BindIndexBuffer(buffer));
    }

    /// Records a non-indexed draw.
    pub fn draw(&mut self, first: u32, count: u32, instances: u32) {
        self.commands.push(Command::Draw {
            first,
            count,
            instances,
        });
    }

    /// Records an indexed draw.
    pub fn draw_indexed(&mut self, first: u32, count: u32, instances: u32) {
        self.commands.push(Command::DrawIndexed {
            first,
            count,
            instances,
        });
    }

    /// Records a native draw.
    pub fn draw_native(&mut self, callback: RenderCallback, input: RenderCallbackInput) {
        self.commands.push(Command::DrawNative { callback, input });
    }

    /// Recorded commands in order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of draw commands of any kind.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Command::Draw { .. } | Command::DrawIndexed { .. } | Command::DrawNative { .. }
                )
            })
            .count()
    }

    /// Returns whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A graphics backend.
///
/// Creation methods return a handle or a [`GraphicsError`]; destruction is
/// infallible. Recorded work only reaches the GPU on [`submit`](Self::submit).
pub trait Controller {
    /// Compiles one shader stage.
    fn create_shader(&mut self, stage: ShaderStage, source: &str)
    -> Result<ShaderHandle, GraphicsError>;

    /// Frees a compiled stage.
    fn destroy_shader(&mut self, shader: ShaderHandle);

    /// Links a vertex and a fragment stage.
    fn create_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, GraphicsError>;

    /// Returns the uniform layout of a linked program.
    fn program_reflection(&self, program: ProgramHandle) -> Result<ProgramReflection, GraphicsError>;

    /// Frees a linked program.
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Creates a pipeline.
    fn create_pipeline(
        &mut self,
        info: &PipelineCreateInfo<'_>,
    ) -> Result<PipelineHandle, GraphicsError>;

    /// Destroys a pipeline.
    fn destroy_pipeline(&mut self, pipeline: PipelineHandle);

    /// Allocates a buffer of `size` bytes.
    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> Result<BufferHandle, GraphicsError>;

    /// Writes `data` at `offset`.
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError>;

    /// Frees a buffer.
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Creates a texture.
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, GraphicsError>;

    /// Uploads pixels to a texture.
    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8]) -> Result<(), GraphicsError>;

    /// Destroys a texture.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Creates an off-screen target, optionally rendering into `color`.
    fn create_frame_buffer(
        &mut self,
        desc: &FrameBufferDesc,
        color: Option<TextureHandle>,
    ) -> Result<FrameBufferHandle, GraphicsError>;

    /// Destroys an off-screen target.
    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle);

    /// Executes recorded commands.
    fn submit(&mut self, commands: CommandBuffer) -> Result<(), GraphicsError>;
}
