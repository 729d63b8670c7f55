//! Graphics-device layer.
//!
//! This module is responsible for:
//! - the [`Backend`] seam every manager talks to
//! - the wgpu implementation (device, surface, pipeline cache)
//! - a recording implementation used by tests and headless tools
//! - shared device vocabulary: handles, blend modes, uniforms, context options

mod backend;
mod blend;
mod context;
mod error;
mod gpu;
mod options;
mod recording;
mod surface;
mod uniforms;

pub use backend::{
    Backend, Capability, DeviceRect, FramebufferHandle, ProgramHandle, ProgramSource,
    SamplerParams, ScaleMode, StencilCompare, StencilFunc, StencilOp, TextureHandle, Vertex,
    WrapMode,
};
pub use blend::{BlendFactor, BlendFactors, BlendMode};
pub use context::ContextId;
pub use error::SurfaceErrorAction;
pub use gpu::{TEXTURE_UNITS, WgpuBackend};
pub use options::{ContextOptions, PowerPreference};
pub use recording::{DeviceCall, FramebufferInfo, RecordingBackend, RecordingLog};
pub use uniforms::{UniformBlockLayout, UniformSlot, UniformType, UniformValue, UnknownUniformType};
