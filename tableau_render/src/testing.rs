// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A [`Controller`] that records what the render stage asks of it.

use std::collections::HashMap;

use tableau_core::handle::{Handle, HandleAllocator, HandleKind};
use tableau_core::resource::{FrameBufferDesc, TextureDesc};

use crate::graphics::{
    BufferHandle, BufferUsage, CommandBuffer, Controller, FrameBufferHandle, GraphicsError,
    PipelineCreateInfo, PipelineHandle, ProgramHandle, ProgramReflection, ShaderHandle,
    ShaderStage, TextureHandle, UniformBlock, UniformMember,
};

/// Returns the handle of slot `idx` from a fresh allocator.
pub(crate) fn handle<K: HandleKind>(idx: u32) -> Handle<K> {
    let alloc = HandleAllocator::<K>::new();
    let mut last = alloc.allocate();
    for _ in 0..idx {
        last = alloc.allocate();
    }
    last
}

/// A block with every built-in the renderer writes, plus `uCustom`.
pub(crate) fn standard_reflection() -> ProgramReflection {
    let members = [
        ("uModelMatrix", 64),
        ("uViewMatrix", 64),
        ("uProjection", 64),
        ("uModelView", 64),
        ("uMvpMatrix", 64),
        ("uNormalMatrix", 48),
        ("uScale", 12),
        ("uSize", 12),
        ("uColor", 16),
        ("uCustom", 16),
    ];
    let mut offset = 0;
    let members = members
        .iter()
        .map(|&(name, size)| {
            let m = UniformMember {
                name: name.into(),
                offset,
                size,
            };
            offset += size.next_multiple_of(16);
            m
        })
        .collect();
    ProgramReflection {
        blocks: vec![UniformBlock {
            name: "VertBlock".into(),
            binding: 0,
            size: offset,
            members,
        }],
        samplers: vec!["sTexture".into()],
    }
}

#[derive(Debug)]
pub(crate) struct RecordingController {
    next: u32,
    buffers: HashMap<BufferHandle, (BufferUsage, u64)>,
    pub(crate) reflection: ProgramReflection,
    pub(crate) shaders_created: u32,
    pub(crate) shaders_destroyed: Vec<ShaderHandle>,
    pub(crate) programs_created: u32,
    pub(crate) programs_destroyed: Vec<ProgramHandle>,
    pub(crate) pipelines_created: u32,
    pub(crate) pipelines_destroyed: Vec<PipelineHandle>,
    pub(crate) textures_created: u32,
    pub(crate) uploads: u32,
    pub(crate) frame_buffers_created: u32,
    pub(crate) writes: Vec<(BufferHandle, u64, Vec<u8>)>,
    pub(crate) submitted: Vec<CommandBuffer>,
    pub(crate) fail_shaders: bool,
    pub(crate) fail_pipelines: bool,
}

impl RecordingController {
    pub(crate) fn new() -> Self {
        Self {
            next: 0,
            buffers: HashMap::new(),
            reflection: standard_reflection(),
            shaders_created: 0,
            shaders_destroyed: Vec::new(),
            programs_created: 0,
            programs_destroyed: Vec::new(),
            pipelines_created: 0,
            pipelines_destroyed: Vec::new(),
            textures_created: 0,
            uploads: 0,
            frame_buffers_created: 0,
            writes: Vec::new(),
            submitted: Vec::new(),
            fail_shaders: false,
            fail_pipelines: false,
        }
    }

    pub(crate) fn buffers_created(&self, usage: BufferUsage) -> usize {
        self.buffers.values().filter(|(u, _)| *u == usage).count()
    }

    /// Bytes last written at `offset` of `buffer`.
    pub(crate) fn written(&self, buffer: BufferHandle, offset: u64, len: usize) -> Option<&[u8]> {
        self.writes.iter().rev().find_map(|(b, o, data)| {
            let start = usize::try_from(offset.checked_sub(*o)?).ok()?;
            (*b == buffer && start + len <= data.len()).then(|| &data[start..start + len])
        })
    }

    fn next(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
}

impl Controller for RecordingController {
    fn create_shader(
        &mut self,
        _stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderHandle, GraphicsError> {
        if self.fail_shaders {
            return Err(GraphicsError::ShaderCompilation(source.into()));
        }
        self.shaders_created += 1;
        Ok(ShaderHandle(self.next()))
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shaders_destroyed.push(shader);
    }

    fn create_program(
        &mut self,
        _vertex: ShaderHandle,
        _fragment: ShaderHandle,
    ) -> Result<ProgramHandle, GraphicsError> {
        self.programs_created += 1;
        Ok(ProgramHandle(self.next()))
    }

    fn program_reflection(&self, _program: ProgramHandle) -> Result<ProgramReflection, GraphicsError> {
        Ok(self.reflection.clone())
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs_destroyed.push(program);
    }

    fn create_pipeline(
        &mut self,
        _info: &PipelineCreateInfo<'_>,
    ) -> Result<PipelineHandle, GraphicsError> {
        if self.fail_pipelines {
            return Err(GraphicsError::PipelineCreation("rejected".into()));
        }
        self.pipelines_created += 1;
        Ok(PipelineHandle(self.next()))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        self.pipelines_destroyed.push(pipeline);
    }

    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> Result<BufferHandle, GraphicsError> {
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, (usage, size));
        Ok(handle)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let &(_, size) = self.buffers.get(&buffer).ok_or(GraphicsError::UnknownHandle {
            kind: "buffer",
            index: buffer.0,
        })?;
        let len = data.len() as u64;
        if offset + len > size {
            return Err(GraphicsError::OutOfBounds { offset, len, size });
        }
        self.writes.push((buffer, offset, data.to_vec()));
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn create_texture(&mut self, _desc: &TextureDesc) -> Result<TextureHandle, GraphicsError> {
        self.textures_created += 1;
        Ok(TextureHandle(self.next()))
    }

    fn upload_texture(&mut self, _texture: TextureHandle, _data: &[u8]) -> Result<(), GraphicsError> {
        self.uploads += 1;
        Ok(())
    }

    fn destroy_texture(&mut self, _texture: TextureHandle) {}

    fn create_frame_buffer(
        &mut self,
        _desc: &FrameBufferDesc,
        _color: Option<TextureHandle>,
    ) -> Result<FrameBufferHandle, GraphicsError> {
        self.frame_buffers_created += 1;
        Ok(FrameBufferHandle(self.next()))
    }

    fn destroy_frame_buffer(&mut self, _frame_buffer: FrameBufferHandle) {}

    fn submit(&mut self, commands: CommandBuffer) -> Result<(), GraphicsError> {
        self.submitted.push(commands);
        Ok(())
    }
}
