use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};

use crate::coords::{ColorRgba, Matrix};

use super::blend::BlendMode;
use super::uniforms::{UniformSlot, UniformValue};

// ── handles ───────────────────────────────────────────────────────────────

macro_rules! device_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Wraps a backend-specific id. Only backends should mint handles.
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

device_handle!(
    /// Device-side texture object.
    TextureHandle
);
device_handle!(
    /// Device-side framebuffer (color texture + optional stencil attachment).
    FramebufferHandle
);
device_handle!(
    /// Linked vertex + fragment program.
    ProgramHandle
);

// ── fixed-function state ──────────────────────────────────────────────────

/// Device toggles that are switched on and off as a whole.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    CullFace,
    ScissorTest,
    StencilTest,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StencilCompare {
    Always,
    Equal,
    NotEqual,
}

/// Operation applied to the stencil value when both stencil and depth pass.
/// Failing fragments always keep the stored value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Increment,
    Decrement,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StencilFunc {
    pub compare: StencilCompare,
    pub reference: u32,
    pub mask: u32,
}

impl StencilFunc {
    #[inline]
    pub const fn new(compare: StencilCompare, reference: u32, mask: u32) -> Self {
        Self { compare, reference, mask }
    }
}

impl Default for StencilFunc {
    fn default() -> Self {
        Self::new(StencilCompare::Always, 0, 0xFF)
    }
}

/// Integer rectangle in framebuffer pixels.
///
/// Origin is the bottom-left corner of the bound framebuffer, +Y up. Offscreen
/// framebuffers store rows bottom-up in the same convention, so a rectangle
/// means the same pixels whichever target is bound.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeviceRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DeviceRect {
    #[inline]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ── sampling ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ScaleMode {
    #[default]
    Linear,
    Nearest,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    pub wrap: WrapMode,
    pub scale: ScaleMode,
    pub mipmap: bool,
}

// ── geometry ──────────────────────────────────────────────────────────────

/// Interleaved vertex shared by every built-in program.
///
/// Shader inputs: `@location(0) position`, `@location(1) uv`, `@location(2) color`
/// (premultiplied RGBA).
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex {
    #[inline]
    pub const fn new(position: [f32; 2], uv: [f32; 2], color: [f32; 4]) -> Self {
        Self { position, uv, color }
    }
}

// ── programs ──────────────────────────────────────────────────────────────

/// Source for a device program.
///
/// Both stages are WGSL with entry points `vs_main` / `fs_main`, sharing bind
/// group 0:
/// - binding 0: `Globals { projection_matrix: mat3x3<f32> }`
/// - binding 1: per-program uniform struct, fields in `uniforms` order
/// - bindings 2 + 2u / 3 + 2u: texture / sampler for unit `u`
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub label: Cow<'static, str>,
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
    pub uniforms: Vec<UniformSlot>,
}

// ── backend ───────────────────────────────────────────────────────────────

/// The graphics-device seam.
///
/// Calls mirror an immediate-mode state machine: state setters affect every
/// following draw on the bound framebuffer until changed. Implementations must
/// tolerate every call while the context is lost and treat it as a no-op.
pub trait Backend {
    /// Short human-readable name used in logs.
    fn name(&self) -> &str;

    /// True between a context loss and a successful [`restore_context`](Self::restore_context).
    fn is_context_lost(&self) -> bool;

    /// Recreates the device after a loss. Every previously minted handle is dead.
    fn restore_context(&mut self) -> anyhow::Result<()>;

    fn max_texture_units(&self) -> usize;

    /// Size of the on-screen drawing buffer in device pixels.
    fn drawing_buffer_size(&self) -> (u32, u32);

    fn resize_drawing_buffer(&mut self, width: u32, height: u32);

    // textures

    fn create_texture(&mut self) -> TextureHandle;

    /// Uploads tightly packed RGBA8 rows (top row first), reallocating storage if
    /// the size changed.
    fn upload_texture(&mut self, texture: TextureHandle, width: u32, height: u32, pixels: &[u8]);

    fn set_sampler(&mut self, texture: TextureHandle, params: SamplerParams);

    fn delete_texture(&mut self, texture: TextureHandle);

    fn bind_texture(&mut self, unit: usize, texture: TextureHandle);

    // framebuffers

    fn create_framebuffer(&mut self, width: u32, height: u32) -> FramebufferHandle;

    /// Color texture backing `framebuffer`; stays valid across resizes.
    fn framebuffer_texture(&self, framebuffer: FramebufferHandle) -> Option<TextureHandle>;

    fn resize_framebuffer(&mut self, framebuffer: FramebufferHandle, width: u32, height: u32);

    /// Attaches a stencil buffer if the framebuffer does not have one yet.
    fn enable_stencil(&mut self, framebuffer: FramebufferHandle);

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// `None` binds the on-screen drawing buffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    // programs

    fn create_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramHandle>;

    fn delete_program(&mut self, program: ProgramHandle);

    fn use_program(&mut self, program: ProgramHandle);

    /// Stores a uniform value for `program`. Names the program never declared are ignored.
    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: &UniformValue);

    /// Projection shared by every program (`Globals.projection_matrix`).
    fn set_projection(&mut self, projection: &Matrix);

    // fixed-function state

    fn set_enabled(&mut self, capability: Capability, enabled: bool);

    fn set_front_face(&mut self, clockwise: bool);

    fn set_blend_mode(&mut self, mode: BlendMode);

    fn set_viewport(&mut self, rect: DeviceRect);

    fn set_scissor(&mut self, rect: DeviceRect);

    fn set_color_mask(&mut self, enabled: bool);

    fn set_stencil_func(&mut self, func: StencilFunc);

    fn set_stencil_op(&mut self, op: StencilOp);

    // commands

    /// Clears the color attachment of the bound framebuffer.
    fn clear(&mut self, color: ColorRgba);

    /// Resets the stencil attachment of the bound framebuffer to zero.
    fn clear_stencil(&mut self);

    fn draw(&mut self, vertices: &[Vertex], indices: &[u16]);

    /// Submits recorded work; `present` also shows the drawing buffer.
    fn submit(&mut self, present: bool);
}
