// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renderer descriptions shared by the update and render stages.
//!
//! A renderer is one drawable attached to a node: geometry, shader,
//! textures, and fixed-function state. The update stage keeps a
//! [`RendererDesc`] to decide blending and draw order; the render stage keeps
//! its own copy, kept in sync by forwarding every [`RendererMessage`].

use core::fmt;
use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use smallvec::SmallVec;

use crate::handle::{Handle, HandleKind};
use crate::resource::{GeometryId, ShaderId, TextureId};
use crate::uniform::{UniformMap, UniformValue};

/// Handle family for renderers.
#[derive(Debug)]
pub enum RendererKind {}

impl HandleKind for RendererKind {
    const NAME: &'static str = "RendererId";
}

/// A handle to a renderer.
pub type RendererId = Handle<RendererKind>;

/// Whether a renderer blends with the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Never blend.
    Off,
    /// Blend when the color is translucent or the shader says so.
    #[default]
    Auto,
    /// Always blend.
    On,
}

/// Source or destination blend factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendFactor {
    /// `0`.
    Zero = 0,
    /// `1`.
    One,
    /// Source color.
    SrcColor,
    /// `1 - source color`.
    OneMinusSrcColor,
    /// Source alpha.
    SrcAlpha,
    /// `1 - source alpha`.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// `1 - destination alpha`.
    OneMinusDstAlpha,
    /// Destination color.
    DstColor,
    /// `1 - destination color`.
    OneMinusDstColor,
    /// `min(source alpha, 1 - destination alpha)`.
    SrcAlphaSaturate,
    /// Constant blend color.
    ConstantColor,
    /// `1 - constant blend color`.
    OneMinusConstantColor,
    /// Constant blend alpha.
    ConstantAlpha,
    /// `1 - constant blend alpha`.
    OneMinusConstantAlpha,
}

impl BlendFactor {
    const ALL: [Self; 15] = [
        Self::Zero,
        Self::One,
        Self::SrcColor,
        Self::OneMinusSrcColor,
        Self::SrcAlpha,
        Self::OneMinusSrcAlpha,
        Self::DstAlpha,
        Self::OneMinusDstAlpha,
        Self::DstColor,
        Self::OneMinusDstColor,
        Self::SrcAlphaSaturate,
        Self::ConstantColor,
        Self::OneMinusConstantColor,
        Self::ConstantAlpha,
        Self::OneMinusConstantAlpha,
    ];

    fn from_bits(bits: u32) -> Self {
        Self::ALL
            .get(bits as usize)
            .copied()
            .unwrap_or(Self::Zero)
    }
}

/// Blend equation.
///
/// Variants from [`Multiply`](Self::Multiply) on are advanced equations that
/// need backend support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendEquation {
    /// `src + dst`.
    Add = 0,
    /// `src - dst`.
    Subtract,
    /// `dst - src`.
    ReverseSubtract,
    /// Component-wise minimum.
    Min,
    /// Component-wise maximum.
    Max,
    /// Advanced multiply.
    Multiply,
    /// Advanced screen.
    Screen,
    /// Advanced overlay.
    Overlay,
    /// Advanced darken.
    Darken,
    /// Advanced lighten.
    Lighten,
    /// Advanced color dodge.
    ColorDodge,
    /// Advanced color burn.
    ColorBurn,
    /// Advanced hard light.
    HardLight,
    /// Advanced soft light.
    SoftLight,
    /// Advanced difference.
    Difference,
    /// Advanced exclusion.
    Exclusion,
    /// Advanced hue.
    Hue,
    /// Advanced saturation.
    Saturation,
    /// Advanced color.
    Color,
    /// Advanced luminosity.
    Luminosity,
}

impl BlendEquation {
    const ALL: [Self; 20] = [
        Self::Add,
        Self::Subtract,
        Self::ReverseSubtract,
        Self::Min,
        Self::Max,
        Self::Multiply,
        Self::Screen,
        Self::Overlay,
        Self::Darken,
        Self::Lighten,
        Self::ColorDodge,
        Self::ColorBurn,
        Self::HardLight,
        Self::SoftLight,
        Self::Difference,
        Self::Exclusion,
        Self::Hue,
        Self::Saturation,
        Self::Color,
        Self::Luminosity,
    ];

    fn from_bits(bits: u32) -> Self {
        Self::ALL.get(bits as usize).copied().unwrap_or(Self::Add)
    }

    /// Returns whether this is an advanced equation.
    #[must_use]
    pub const fn is_advanced(self) -> bool {
        self as u8 >= Self::Multiply as u8
    }
}

const SRC_RGB_SHIFT: u32 = 0;
const DST_RGB_SHIFT: u32 = 4;
const SRC_ALPHA_SHIFT: u32 = 8;
const DST_ALPHA_SHIFT: u32 = 12;
const EQ_RGB_SHIFT: u32 = 16;
const EQ_ALPHA_SHIFT: u32 = 21;
const FACTOR_MASK: u32 = 0xf;
const EQ_MASK: u32 = 0x1f;

/// Blend factors and equations packed into one bitmask, plus an optional
/// constant blend color.
#[derive(Clone, Copy, PartialEq)]
pub struct BlendOptions {
    bitmask: u32,
    blend_color: Option<Vec4>,
}

impl BlendOptions {
    /// Builds options from explicit factors and equations.
    #[must_use]
    pub fn new(
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
        eq_rgb: BlendEquation,
        eq_alpha: BlendEquation,
    ) -> Self {
        let bitmask = (u32::from(src_rgb as u8) << SRC_RGB_SHIFT)
            | (u32::from(dst_rgb as u8) << DST_RGB_SHIFT)
            | (u32::from(src_alpha as u8) << SRC_ALPHA_SHIFT)
            | (u32::from(dst_alpha as u8) << DST_ALPHA_SHIFT)
            | (u32::from(eq_rgb as u8) << EQ_RGB_SHIFT)
            | (u32::from(eq_alpha as u8) << EQ_ALPHA_SHIFT);
        Self {
            bitmask,
            blend_color: None,
        }
    }

    /// Returns a copy with a constant blend color.
    #[must_use]
    pub fn with_blend_color(mut self, color: Option<Vec4>) -> Self {
        self.blend_color = color;
        self
    }

    /// Packed factors and equations.
    #[must_use]
    pub const fn bitmask(&self) -> u32 {
        self.bitmask
    }

    /// Constant blend color, if any.
    #[must_use]
    pub const fn blend_color(&self) -> Option<Vec4> {
        self.blend_color
    }

    /// Source RGB factor.
    #[must_use]
    pub fn src_rgb(&self) -> BlendFactor {
        BlendFactor::from_bits((self.bitmask >> SRC_RGB_SHIFT) & FACTOR_MASK)
    }

    /// Destination RGB factor.
    #[must_use]
    pub fn dst_rgb(&self) -> BlendFactor {
        BlendFactor::from_bits((self.bitmask >> DST_RGB_SHIFT) & FACTOR_MASK)
    }

    /// Source alpha factor.
    #[must_use]
    pub fn src_alpha(&self) -> BlendFactor {
        BlendFactor::from_bits((self.bitmask >> SRC_ALPHA_SHIFT) & FACTOR_MASK)
    }

    /// Destination alpha factor.
    #[must_use]
    pub fn dst_alpha(&self) -> BlendFactor {
        BlendFactor::from_bits((self.bitmask >> DST_ALPHA_SHIFT) & FACTOR_MASK)
    }

    /// RGB equation.
    #[must_use]
    pub fn equation_rgb(&self) -> BlendEquation {
        BlendEquation::from_bits((self.bitmask >> EQ_RGB_SHIFT) & EQ_MASK)
    }

    /// Alpha equation.
    #[must_use]
    pub fn equation_alpha(&self) -> BlendEquation {
        BlendEquation::from_bits((self.bitmask >> EQ_ALPHA_SHIFT) & EQ_MASK)
    }

    /// Returns the same options with the alpha equation replaced by the RGB
    /// equation.
    #[must_use]
    pub fn with_alpha_equation_from_rgb(self) -> Self {
        let eq = self.equation_rgb();
        let bitmask =
            (self.bitmask & !(EQ_MASK << EQ_ALPHA_SHIFT)) | (u32::from(eq as u8) << EQ_ALPHA_SHIFT);
        Self { bitmask, ..self }
    }
}

impl Default for BlendOptions {
    fn default() -> Self {
        Self::new(
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
            BlendFactor::One,
            BlendFactor::OneMinusSrcAlpha,
            BlendEquation::Add,
            BlendEquation::Add,
        )
    }
}

impl fmt::Debug for BlendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlendOptions")
            .field("src_rgb", &self.src_rgb())
            .field("dst_rgb", &self.dst_rgb())
            .field("src_alpha", &self.src_alpha())
            .field("dst_alpha", &self.dst_alpha())
            .field("equation_rgb", &self.equation_rgb())
            .field("equation_alpha", &self.equation_alpha())
            .field("blend_color", &self.blend_color)
            .finish()
    }
}

/// Which faces are culled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaceCullMode {
    /// Draw both faces.
    #[default]
    None = 0,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
    /// Cull everything.
    FrontAndBack,
}

/// Whether a draw command uses the index buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DrawKind {
    /// Indexed draw.
    #[default]
    Indexed,
    /// Non-indexed draw.
    Array,
}

/// One extra draw issued for a specific render queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DrawCommand {
    /// Queue the command is issued in.
    pub queue: u32,
    /// Indexed or array draw.
    pub kind: DrawKind,
    /// First element.
    pub first: u32,
    /// Number of elements.
    pub count: u32,
    /// Number of instances.
    pub instances: u32,
}

/// Queue for opaque draws.
pub const DRAW_QUEUE_OPAQUE: u32 = 0;
/// Queue for transparent draws.
pub const DRAW_QUEUE_TRANSPARENT: u32 = 1;
/// Number of draw queues a renderer with draw commands is drawn in.
pub const DRAW_QUEUE_COUNT: u32 = 2;

/// When a [`RenderCallback`] runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Runs with backend state saved and restored around it.
    #[default]
    Isolated,
    /// Runs inline with the renderer's own state.
    Direct,
}

/// Data handed to a [`RenderCallback`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderCallbackInput {
    /// Node world matrix.
    pub model: Mat4,
    /// Camera view matrix.
    pub view: Mat4,
    /// Camera projection matrix.
    pub projection: Mat4,
    /// `projection * view * model`.
    pub mvp: Mat4,
    /// Node size.
    pub size: Vec3,
    /// Final node color.
    pub color: Vec4,
}

/// A native draw installed on a renderer.
#[derive(Clone)]
pub struct RenderCallback {
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Queue the callback runs in.
    pub queue: u32,
    callback: Arc<dyn Fn(&RenderCallbackInput) + Send + Sync>,
}

impl RenderCallback {
    /// Wraps `callback`.
    pub fn new(
        mode: ExecutionMode,
        queue: u32,
        callback: impl Fn(&RenderCallbackInput) + Send + Sync + 'static,
    ) -> Self {
        Self {
            mode,
            queue,
            callback: Arc::new(callback),
        }
    }

    /// Invokes the callback.
    pub fn invoke(&self, input: &RenderCallbackInput) {
        (self.callback)(input);
    }
}

impl fmt::Debug for RenderCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCallback")
            .field("mode", &self.mode)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Whether a renderer forces frames even when nothing changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderingBehavior {
    /// Render only when something changed.
    #[default]
    IfRequired,
    /// Render every frame.
    Continuously,
}

/// Full state of one renderer.
#[derive(Clone, Debug)]
pub struct RendererDesc {
    /// Geometry drawn.
    pub geometry: GeometryId,
    /// Shader used unless the node carries an inherited shader.
    pub shader: ShaderId,
    /// Bound textures in sampler order.
    pub textures: SmallVec<[TextureId; 4]>,
    /// Blend enable policy.
    pub blend_mode: BlendMode,
    /// Blend factors and equations.
    pub blend_options: BlendOptions,
    /// Whether colors are premultiplied by alpha.
    pub premultiplied_alpha: bool,
    /// Face culling.
    pub face_cull: FaceCullMode,
    /// Indexed draw range as `(first, count)`; `None` draws everything.
    pub index_range: Option<(u32, u32)>,
    /// Draw order within a layer.
    pub depth_index: i32,
    /// Color multiplied with the node's world color.
    pub mix_color: Vec4,
    /// Extra per-queue draws.
    pub draw_commands: Vec<DrawCommand>,
    /// Native draw callback.
    pub render_callback: Option<RenderCallback>,
    /// Continuous rendering policy.
    pub rendering_behavior: RenderingBehavior,
    /// Custom uniforms.
    pub uniforms: UniformMap,
}

impl RendererDesc {
    /// Creates a renderer drawing `geometry` with `shader`.
    #[must_use]
    pub fn new(geometry: GeometryId, shader: ShaderId) -> Self {
        Self {
            geometry,
            shader,
            textures: SmallVec::new(),
            blend_mode: BlendMode::default(),
            blend_options: BlendOptions::default(),
            premultiplied_alpha: false,
            face_cull: FaceCullMode::default(),
            index_range: None,
            depth_index: 0,
            mix_color: Vec4::ONE,
            draw_commands: Vec::new(),
            render_callback: None,
            rendering_behavior: RenderingBehavior::default(),
            uniforms: UniformMap::new(),
        }
    }

    /// Applies a message.
    pub fn apply(&mut self, message: RendererMessage) {
        match message {
            RendererMessage::SetGeometry(g) => self.geometry = g,
            RendererMessage::SetShader(s) => self.shader = s,
            RendererMessage::SetTextures(t) => self.textures = t,
            RendererMessage::SetBlendMode(m) => self.blend_mode = m,
            RendererMessage::SetBlendOptions(o) => self.blend_options = o,
            RendererMessage::SetBlendColor(c) => {
                self.blend_options = self.blend_options.with_blend_color(c);
            }
            RendererMessage::SetPremultipliedAlpha(p) => self.premultiplied_alpha = p,
            RendererMessage::SetFaceCullMode(m) => self.face_cull = m,
            RendererMessage::SetIndexRange(r) => self.index_range = r,
            RendererMessage::SetDepthIndex(d) => self.depth_index = d,
            RendererMessage::SetMixColor(c) => self.mix_color = c,
            RendererMessage::SetDrawCommands(c) => self.draw_commands = c,
            RendererMessage::SetRenderCallback(c) => self.render_callback = c,
            RendererMessage::SetRenderingBehavior(b) => self.rendering_behavior = b,
            RendererMessage::RegisterUniform(name, value) => self.uniforms.insert(&name, value),
            RendererMessage::RemoveUniform(name) => {
                self.uniforms.remove(&name);
            }
        }
    }

    /// Resolves [`BlendMode::Auto`] against the final color alpha.
    #[must_use]
    pub fn wants_blend(&self, world_alpha: f32) -> bool {
        match self.blend_mode {
            BlendMode::Off => false,
            BlendMode::On => true,
            BlendMode::Auto => world_alpha * self.mix_color.w < 1.0,
        }
    }
}

/// A change to one renderer.
#[derive(Clone, Debug)]
pub enum RendererMessage {
    /// Replaces the geometry.
    SetGeometry(GeometryId),
    /// Replaces the shader.
    SetShader(ShaderId),
    /// Replaces the texture set.
    SetTextures(SmallVec<[TextureId; 4]>),
    /// Sets the blend enable policy.
    SetBlendMode(BlendMode),
    /// Sets blend factors and equations.
    SetBlendOptions(BlendOptions),
    /// Sets or clears the constant blend color.
    SetBlendColor(Option<Vec4>),
    /// Sets whether colors are premultiplied.
    SetPremultipliedAlpha(bool),
    /// Sets face culling.
    SetFaceCullMode(FaceCullMode),
    /// Sets the indexed draw range.
    SetIndexRange(Option<(u32, u32)>),
    /// Sets the depth index.
    SetDepthIndex(i32),
    /// Sets the mix color.
    SetMixColor(Vec4),
    /// Replaces the per-queue draw commands.
    SetDrawCommands(Vec<DrawCommand>),
    /// Installs or removes a native draw.
    SetRenderCallback(Option<RenderCallback>),
    /// Sets the continuous rendering policy.
    SetRenderingBehavior(RenderingBehavior),
    /// Adds or updates a custom uniform.
    RegisterUniform(String, UniformValue),
    /// Removes a custom uniform.
    RemoveUniform(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    #[test]
    fn blend_options_round_trip_through_bitmask() {
        let o = BlendOptions::new(
            BlendFactor::OneMinusConstantAlpha,
            BlendFactor::DstColor,
            BlendFactor::Zero,
            BlendFactor::SrcAlphaSaturate,
            BlendEquation::Luminosity,
            BlendEquation::ReverseSubtract,
        );
        assert_eq!(o.src_rgb(), BlendFactor::OneMinusConstantAlpha);
        assert_eq!(o.dst_rgb(), BlendFactor::DstColor);
        assert_eq!(o.src_alpha(), BlendFactor::Zero);
        assert_eq!(o.dst_alpha(), BlendFactor::SrcAlphaSaturate);
        assert_eq!(o.equation_rgb(), BlendEquation::Luminosity);
        assert_eq!(o.equation_alpha(), BlendEquation::ReverseSubtract);
    }

    #[test]
    fn alpha_equation_can_follow_rgb() {
        let o = BlendOptions::new(
            BlendFactor::One,
            BlendFactor::Zero,
            BlendFactor::One,
            BlendFactor::Zero,
            BlendEquation::Screen,
            BlendEquation::Add,
        )
        .with_alpha_equation_from_rgb();
        assert_eq!(o.equation_alpha(), BlendEquation::Screen);
        assert_eq!(o.src_rgb(), BlendFactor::One);
    }

    #[test]
    fn advanced_equations_start_at_multiply() {
        assert!(!BlendEquation::Max.is_advanced());
        assert!(BlendEquation::Multiply.is_advanced());
        assert!(BlendEquation::Luminosity.is_advanced());
    }

    #[test]
    fn auto_blend_follows_alpha() {
        let mut desc = RendererDesc::new(Handle::from_parts(0, 0), Handle::from_parts(0, 0));
        assert!(!desc.wants_blend(1.0));
        assert!(desc.wants_blend(0.5));
        desc.apply(RendererMessage::SetMixColor(Vec4::new(1.0, 1.0, 1.0, 0.5)));
        assert!(desc.wants_blend(1.0));
        desc.apply(RendererMessage::SetBlendMode(BlendMode::Off));
        assert!(!desc.wants_blend(0.0));
    }

    #[test]
    fn uniform_messages_edit_the_map() {
        let mut desc = RendererDesc::new(Handle::from_parts(0, 0), Handle::from_parts(0, 0));
        desc.apply(RendererMessage::RegisterUniform(
            "uBlur".into(),
            UniformValue::Float(2.0),
        ));
        assert_eq!(desc.uniforms.get("uBlur"), Some(UniformValue::Float(2.0)));
        desc.apply(RendererMessage::RemoveUniform("uBlur".into()));
        assert!(desc.uniforms.is_empty());
    }
}
