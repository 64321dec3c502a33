// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-side resource table.
//!
//! Applies [`ResourceMessage`]s forwarded by the update stage, creating and
//! destroying the backing GPU objects. Creation failures are logged and
//! leave the resource absent; draws using it are skipped.

use std::collections::HashMap;

use tableau_core::resource::{
    FrameBufferDesc, FrameBufferId, GeometryDesc, GeometryId, ResourceMessage, ShaderData,
    ShaderId, TextureDesc, TextureId,
};

use crate::graphics::{
    BufferHandle, BufferUsage, Controller, FrameBufferHandle, GraphicsError, TextureHandle,
};

/// A geometry uploaded to the GPU.
#[derive(Clone, Debug)]
pub struct GpuGeometry {
    /// Layout and topology.
    pub desc: GeometryDesc,
    /// One buffer per vertex buffer description.
    pub vertex_buffers: Vec<BufferHandle>,
    /// Index buffer of indexed geometry.
    pub index_buffer: Option<BufferHandle>,
}

/// A texture and whether its pixels have arrived.
#[derive(Clone, Copy, Debug)]
pub struct GpuTexture {
    /// Backend handle.
    pub handle: TextureHandle,
    /// Whether pixels were uploaded.
    pub ready: bool,
}

/// An off-screen render target.
#[derive(Clone, Copy, Debug)]
pub struct GpuFrameBuffer {
    /// Backend handle.
    pub handle: FrameBufferHandle,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// A resource the table let go of, for cache invalidation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Released {
    /// Shader data removed.
    Shader(ShaderId),
    /// Geometry destroyed.
    Geometry(GeometryId),
}

/// Every resource known to the render stage.
#[derive(Debug, Default)]
pub struct ResourceTable {
    shaders: HashMap<ShaderId, ShaderData>,
    geometries: HashMap<GeometryId, GpuGeometry>,
    textures: HashMap<TextureId, GpuTexture>,
    frame_buffers: HashMap<FrameBufferId, GpuFrameBuffer>,
}

impl ResourceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one message.
    pub fn apply(
        &mut self,
        controller: &mut dyn Controller,
        message: ResourceMessage,
    ) -> Option<Released> {
        match message {
            ResourceMessage::AddShader(id, data) => {
                self.shaders.insert(id, data);
            }
            ResourceMessage::RemoveShader(id) => {
                self.shaders.remove(&id);
                return Some(Released::Shader(id));
            }
            ResourceMessage::AddGeometry(id, desc) => match upload_geometry(controller, desc) {
                Ok(geometry) => {
                    if let Some(old) = self.geometries.insert(id, geometry) {
                        destroy_geometry(controller, old);
                    }
                }
                Err(err) => log::error!("failed to upload {id:?}: {err}"),
            },
            ResourceMessage::RemoveGeometry(id) => {
                if let Some(geometry) = self.geometries.remove(&id) {
                    destroy_geometry(controller, geometry);
                }
                return Some(Released::Geometry(id));
            }
            ResourceMessage::AddTexture(id, desc) => match create_texture(controller, &desc) {
                Ok(texture) => {
                    if let Some(old) = self.textures.insert(id, texture) {
                        controller.destroy_texture(old.handle);
                    }
                }
                Err(err) => log::error!("failed to create {id:?}: {err}"),
            },
            ResourceMessage::UploadTexture(id, data) => match self.textures.get_mut(&id) {
                Some(texture) => match controller.upload_texture(texture.handle, &data) {
                    Ok(()) => texture.ready = true,
                    Err(err) => log::error!("failed to upload {id:?}: {err}"),
                },
                None => log::warn!("upload to unknown {id:?}"),
            },
            ResourceMessage::RemoveTexture(id) => {
                if let Some(texture) = self.textures.remove(&id) {
                    controller.destroy_texture(texture.handle);
                }
            }
            ResourceMessage::AddFrameBuffer(id, desc) => {
                match self.create_frame_buffer(controller, &desc) {
                    Ok(frame_buffer) => {
                        if let Some(old) = self.frame_buffers.insert(id, frame_buffer) {
                            controller.destroy_frame_buffer(old.handle);
                        }
                    }
                    Err(err) => log::error!("failed to create {id:?}: {err}"),
                }
            }
            ResourceMessage::RemoveFrameBuffer(id) => {
                if let Some(frame_buffer) = self.frame_buffers.remove(&id) {
                    controller.destroy_frame_buffer(frame_buffer.handle);
                }
            }
        }
        None
    }

    /// Shader data by id.
    #[must_use]
    pub fn shader(&self, id: ShaderId) -> Option<&ShaderData> {
        self.shaders.get(&id)
    }

    /// Geometry by id.
    #[must_use]
    pub fn geometry(&self, id: GeometryId) -> Option<&GpuGeometry> {
        self.geometries.get(&id)
    }

    /// Texture by id.
    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(&id)
    }

    /// Render target by id.
    #[must_use]
    pub fn frame_buffer(&self, id: FrameBufferId) -> Option<&GpuFrameBuffer> {
        self.frame_buffers.get(&id)
    }

    fn create_frame_buffer(
        &self,
        controller: &mut dyn Controller,
        desc: &FrameBufferDesc,
    ) -> Result<GpuFrameBuffer, GraphicsError> {
        let color = match desc.color {
            Some(id) => Some(
                self.textures
                    .get(&id)
                    .ok_or(GraphicsError::UnknownHandle {
                        kind: "texture",
                        index: id.index(),
                    })?
                    .handle,
            ),
            None => None,
        };
        let handle = controller.create_frame_buffer(desc, color)?;
        Ok(GpuFrameBuffer {
            handle,
            width: desc.width,
            height: desc.height,
        })
    }
}

fn create_texture(
    controller: &mut dyn Controller,
    desc: &TextureDesc,
) -> Result<GpuTexture, GraphicsError> {
    let handle = controller.create_texture(desc)?;
    let ready = match &desc.data {
        Some(data) => {
            controller.upload_texture(handle, data)?;
            true
        }
        None => false,
    };
    Ok(GpuTexture { handle, ready })
}

fn upload_geometry(
    controller: &mut dyn Controller,
    desc: GeometryDesc,
) -> Result<GpuGeometry, GraphicsError> {
    let mut vertex_buffers = Vec::with_capacity(desc.vertex_buffers.len());
    for vb in &desc.vertex_buffers {
        let buffer = controller.create_buffer(BufferUsage::Vertex, vb.data.len() as u64)?;
        controller.write_buffer(buffer, 0, &vb.data)?;
        vertex_buffers.push(buffer);
    }
    let index_buffer = if desc.is_indexed() {
        let bytes: &[u8] = bytemuck::cast_slice(&desc.indices[..]);
        let buffer = controller.create_buffer(BufferUsage::Index, bytes.len() as u64)?;
        controller.write_buffer(buffer, 0, bytes)?;
        Some(buffer)
    } else {
        None
    };
    Ok(GpuGeometry {
        desc,
        vertex_buffers,
        index_buffer,
    })
}

fn destroy_geometry(controller: &mut dyn Controller, geometry: GpuGeometry) {
    for buffer in geometry.vertex_buffers {
        controller.destroy_buffer(buffer);
    }
    if let Some(buffer) = geometry.index_buffer {
        controller.destroy_buffer(buffer);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tableau_core::resource::{ShaderHints, TextureFormat, VertexBufferDesc, VertexFormat};

    use super::*;
    use crate::testing::{RecordingController, handle};

    fn quad() -> GeometryDesc {
        GeometryDesc {
            vertex_buffers: vec![VertexBufferDesc::packed(
                &[("aPosition", VertexFormat::Vec2)],
                4,
                Arc::from(vec![0_u8; 32]),
            )],
            indices: Arc::from(vec![0_u16, 1, 2, 2, 1, 3]),
            ..GeometryDesc::default()
        }
    }

    fn texture(data: Option<Arc<[u8]>>) -> TextureDesc {
        TextureDesc {
            width: 2,
            height: 2,
            format: TextureFormat::Rgba8,
            data,
        }
    }

    #[test]
    fn geometry_upload_creates_vertex_and_index_buffers() {
        let mut gpu = RecordingController::new();
        let mut table = ResourceTable::new();
        let id: GeometryId = handle(0);
        assert!(table.apply(&mut gpu, ResourceMessage::AddGeometry(id, quad())).is_none());

        let geometry = table.geometry(id).expect("uploaded");
        assert_eq!(geometry.vertex_buffers.len(), 1);
        let index = geometry.index_buffer.expect("indexed");
        assert_eq!(gpu.written(index, 0, 12), Some(bytemuck::cast_slice(&[0_u16, 1, 2, 2, 1, 3][..])));
        assert_eq!(gpu.buffers_created(BufferUsage::Vertex), 1);
    }

    #[test]
    fn geometry_removal_frees_buffers_and_reports() {
        let mut gpu = RecordingController::new();
        let mut table = ResourceTable::new();
        let id: GeometryId = handle(0);
        table.apply(&mut gpu, ResourceMessage::AddGeometry(id, quad()));
        let released = table.apply(&mut gpu, ResourceMessage::RemoveGeometry(id));
        assert_eq!(released, Some(Released::Geometry(id)));
        assert!(table.geometry(id).is_none());
        assert_eq!(gpu.buffers_created(BufferUsage::Index), 0);
    }

    #[test]
    fn textures_become_ready_on_upload() {
        let mut gpu = RecordingController::new();
        let mut table = ResourceTable::new();
        let pending: TextureId = handle(0);
        let loaded: TextureId = handle(1);
        table.apply(&mut gpu, ResourceMessage::AddTexture(pending, texture(None)));
        table.apply(
            &mut gpu,
            ResourceMessage::AddTexture(loaded, texture(Some(Arc::from(vec![0_u8; 16])))),
        );
        assert!(!table.texture(pending).expect("pending").ready);
        assert!(table.texture(loaded).expect("loaded").ready);

        table.apply(
            &mut gpu,
            ResourceMessage::UploadTexture(pending, Arc::from(vec![0_u8; 16])),
        );
        assert!(table.texture(pending).expect("pending").ready);
        assert_eq!(gpu.uploads, 2);
    }

    #[test]
    fn frame_buffers_resolve_their_color_texture() {
        let mut gpu = RecordingController::new();
        let mut table = ResourceTable::new();
        let color: TextureId = handle(0);
        let target: FrameBufferId = handle(0);
        let desc = FrameBufferDesc {
            width: 64,
            height: 32,
            color: Some(color),
            depth_stencil: false,
        };

        table.apply(&mut gpu, ResourceMessage::AddFrameBuffer(target, desc.clone()));
        assert!(table.frame_buffer(target).is_none(), "color texture missing");

        table.apply(&mut gpu, ResourceMessage::AddTexture(color, texture(None)));
        table.apply(&mut gpu, ResourceMessage::AddFrameBuffer(target, desc));
        let fb = table.frame_buffer(target).expect("created");
        assert_eq!((fb.width, fb.height), (64, 32));
        assert_eq!(gpu.frame_buffers_created, 1);
    }

    #[test]
    fn shader_removal_is_reported() {
        let mut gpu = RecordingController::new();
        let mut table = ResourceTable::new();
        let id: ShaderId = handle(0);
        table.apply(
            &mut gpu,
            ResourceMessage::AddShader(id, ShaderData::new("v", "f", ShaderHints::empty())),
        );
        assert!(table.shader(id).is_some());
        assert_eq!(
            table.apply(&mut gpu, ResourceMessage::RemoveShader(id)),
            Some(Released::Shader(id))
        );
        assert!(table.shader(id).is_none());
    }
}
