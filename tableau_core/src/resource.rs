// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Descriptions of GPU-backed resources.
//!
//! The event side creates resources by allocating a handle and sending a
//! [`ResourceMessage`] through the update stage. The update stage forwards
//! them in order to the render stage, deferring removals by two frames so
//! that instructions still in flight never reference a destroyed resource.

use std::sync::Arc;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::handle::{Handle, HandleKind};

/// Handle family for shaders.
#[derive(Debug)]
pub enum ShaderKind {}

impl HandleKind for ShaderKind {
    const NAME: &'static str = "ShaderId";
}

/// A handle to shader data.
pub type ShaderId = Handle<ShaderKind>;

/// Handle family for geometries.
#[derive(Debug)]
pub enum GeometryKind {}

impl HandleKind for GeometryKind {
    const NAME: &'static str = "GeometryId";
}

/// A handle to a geometry.
pub type GeometryId = Handle<GeometryKind>;

/// Handle family for textures.
#[derive(Debug)]
pub enum TextureKind {}

impl HandleKind for TextureKind {
    const NAME: &'static str = "TextureId";
}

/// A handle to a texture.
pub type TextureId = Handle<TextureKind>;

/// Handle family for off-screen render targets.
#[derive(Debug)]
pub enum FrameBufferKind {}

impl HandleKind for FrameBufferKind {
    const NAME: &'static str = "FrameBufferId";
}

/// A handle to an off-screen render target.
pub type FrameBufferId = Handle<FrameBufferKind>;

/// Primitive assembly mode of a geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Independent points.
    Points,
    /// Independent line segments.
    Lines,
    /// A closed line strip.
    LineLoop,
    /// A connected line strip.
    LineStrip,
    /// Independent triangles.
    #[default]
    Triangles,
    /// A connected triangle strip.
    TriangleStrip,
    /// A triangle fan around the first vertex.
    TriangleFan,
}

/// Format of one vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// One `f32`.
    Float,
    /// Two `f32`.
    Vec2,
    /// Three `f32`.
    Vec3,
    /// Four `f32`.
    Vec4,
    /// One `i32`.
    Int,
    /// Two `i32`.
    IVec2,
    /// Three `i32`.
    IVec3,
    /// Four `i32`.
    IVec4,
}

impl VertexFormat {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int => 4,
            Self::Vec2 | Self::IVec2 => 8,
            Self::Vec3 | Self::IVec3 => 12,
            Self::Vec4 | Self::IVec4 => 16,
        }
    }
}

/// One named attribute inside a vertex buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Attribute name as declared in the vertex shader.
    pub name: Arc<str>,
    /// Element format.
    pub format: VertexFormat,
    /// Byte offset within one vertex.
    pub offset: u32,
}

/// An interleaved vertex buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexBufferDesc {
    /// Attributes stored in each vertex.
    pub attributes: SmallVec<[VertexAttribute; 4]>,
    /// Distance between consecutive vertices in bytes.
    pub stride: u32,
    /// Number of vertices.
    pub vertex_count: u32,
    /// Raw vertex data.
    pub data: Arc<[u8]>,
}

impl VertexBufferDesc {
    /// Builds a tightly packed buffer layout from `(name, format)` pairs.
    #[must_use]
    pub fn packed(attributes: &[(&str, VertexFormat)], vertex_count: u32, data: Arc<[u8]>) -> Self {
        let mut offset = 0;
        let attributes = attributes
            .iter()
            .map(|&(name, format)| {
                let attr = VertexAttribute {
                    name: Arc::from(name),
                    format,
                    offset,
                };
                offset += format.size();
                attr
            })
            .collect();
        Self {
            attributes,
            stride: offset,
            vertex_count,
            data,
        }
    }
}

/// Vertex and index data of a drawable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryDesc {
    /// How vertices are assembled into primitives.
    pub topology: Topology,
    /// Vertex buffers, bound to consecutive binding slots.
    pub vertex_buffers: Vec<VertexBufferDesc>,
    /// 16-bit indices. Empty for non-indexed geometry.
    pub indices: Arc<[u16]>,
}

impl GeometryDesc {
    /// Returns whether the geometry is drawn with an index buffer.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Number of elements a full draw covers.
    #[must_use]
    pub fn element_count(&self) -> u32 {
        if self.is_indexed() {
            u32::try_from(self.indices.len()).unwrap_or(u32::MAX)
        } else {
            self.vertex_buffers
                .first()
                .map_or(0, |vb| vb.vertex_count)
        }
    }
}

bitflags! {
    /// Hints that let the pipeline skip work for a shader.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ShaderHints: u32 {
        /// Output may be translucent even with an opaque input color.
        const OUTPUT_IS_TRANSPARENT = 0x1;
        /// The vertex shader moves vertices outside the node's bounds.
        const MODIFIES_GEOMETRY = 0x2;
    }
}

/// Vertex and fragment source for one render pass.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// Render pass tag the source applies to.
    pub render_pass_tag: u32,
    /// Vertex stage source.
    pub vertex: Arc<str>,
    /// Fragment stage source.
    pub fragment: Arc<str>,
}

/// All sources of a shader, one per render pass tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderData {
    sources: SmallVec<[ShaderSource; 1]>,
    hints: ShaderHints,
}

impl ShaderData {
    /// The render pass tag every shader falls back to.
    pub const DEFAULT_RENDER_PASS_TAG: u32 = 0;

    /// Creates shader data with a source for the default pass.
    #[must_use]
    pub fn new(vertex: &str, fragment: &str, hints: ShaderHints) -> Self {
        Self {
            sources: SmallVec::new(),
            hints,
        }
        .with_pass(Self::DEFAULT_RENDER_PASS_TAG, vertex, fragment)
    }

    /// Creates shader data without any source.
    #[must_use]
    pub fn empty(hints: ShaderHints) -> Self {
        Self {
            sources: SmallVec::new(),
            hints,
        }
    }

    /// Adds or replaces the source for `render_pass_tag`.
    #[must_use]
    pub fn with_pass(mut self, render_pass_tag: u32, vertex: &str, fragment: &str) -> Self {
        let source = ShaderSource {
            render_pass_tag,
            vertex: Arc::from(vertex),
            fragment: Arc::from(fragment),
        };
        match self
            .sources
            .iter_mut()
            .find(|s| s.render_pass_tag == render_pass_tag)
        {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
        self
    }

    /// Returns the source for `render_pass_tag`, falling back to the default
    /// pass.
    #[must_use]
    pub fn source_for(&self, render_pass_tag: u32) -> Option<&ShaderSource> {
        self.sources
            .iter()
            .find(|s| s.render_pass_tag == render_pass_tag)
            .or_else(|| {
                self.sources
                    .iter()
                    .find(|s| s.render_pass_tag == Self::DEFAULT_RENDER_PASS_TAG)
            })
    }

    /// Returns the shader hints.
    #[must_use]
    pub fn hints(&self) -> ShaderHints {
        self.hints
    }
}

/// Pixel format of a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA.
    #[default]
    Rgba8,
    /// 8-bit BGRA.
    Bgra8,
    /// 8-bit RGB.
    Rgb8,
    /// 8-bit alpha only.
    Alpha8,
    /// Packed depth and stencil.
    Depth24Stencil8,
}

/// A 2D texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: TextureFormat,
    /// Initial pixels; `None` until an upload arrives.
    pub data: Option<Arc<[u8]>>,
}

/// An off-screen render target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBufferDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Color attachment.
    pub color: Option<TextureId>,
    /// Whether a depth-stencil attachment is created.
    pub depth_stencil: bool,
}

/// Creation, update, and removal of resources.
#[derive(Clone, Debug)]
pub enum ResourceMessage {
    /// Registers shader sources.
    AddShader(ShaderId, ShaderData),
    /// Releases a shader.
    RemoveShader(ShaderId),
    /// Registers a geometry.
    AddGeometry(GeometryId, GeometryDesc),
    /// Releases a geometry.
    RemoveGeometry(GeometryId),
    /// Registers a texture, possibly without pixels yet.
    AddTexture(TextureId, TextureDesc),
    /// Supplies the pixels of a texture.
    UploadTexture(TextureId, Arc<[u8]>),
    /// Releases a texture.
    RemoveTexture(TextureId),
    /// Registers a render target.
    AddFrameBuffer(FrameBufferId, FrameBufferDesc),
    /// Releases a render target.
    RemoveFrameBuffer(FrameBufferId),
}

impl ResourceMessage {
    /// Returns whether this message releases a resource.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Self::RemoveShader(_)
                | Self::RemoveGeometry(_)
                | Self::RemoveTexture(_)
                | Self::RemoveFrameBuffer(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_source_falls_back_to_default_pass() {
        let data = ShaderData::new("v0", "f0", ShaderHints::empty()).with_pass(3, "v3", "f3");
        assert_eq!(&*data.source_for(3).expect("tag 3").vertex, "v3");
        assert_eq!(&*data.source_for(7).expect("fallback").vertex, "v0");
    }

    #[test]
    fn shader_without_default_pass_has_no_fallback() {
        let data = ShaderData::empty(ShaderHints::empty()).with_pass(2, "v", "f");
        assert!(data.source_for(2).is_some());
        assert!(data.source_for(0).is_none());
        assert!(ShaderData::empty(ShaderHints::empty()).source_for(0).is_none());
    }

    #[test]
    fn with_pass_replaces_existing_tag() {
        let data = ShaderData::new("a", "b", ShaderHints::empty()).with_pass(0, "c", "d");
        assert_eq!(&*data.source_for(0).expect("tag 0").vertex, "c");
    }

    #[test]
    fn packed_layout_accumulates_offsets() {
        let vb = VertexBufferDesc::packed(
            &[("aPosition", VertexFormat::Vec2), ("aTexCoord", VertexFormat::Vec2)],
            4,
            Arc::from(vec![0_u8; 64]),
        );
        assert_eq!(vb.stride, 16);
        assert_eq!(vb.attributes[1].offset, 8);
    }

    #[test]
    fn element_count_prefers_indices() {
        let mut g = GeometryDesc {
            vertex_buffers: vec![VertexBufferDesc::packed(
                &[("aPosition", VertexFormat::Vec2)],
                4,
                Arc::from(vec![0_u8; 32]),
            )],
            ..GeometryDesc::default()
        };
        assert_eq!(g.element_count(), 4);
        g.indices = Arc::from(vec![0_u16, 1, 2, 2, 1, 3]);
        assert_eq!(g.element_count(), 6);
    }
}
