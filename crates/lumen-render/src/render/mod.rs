//! Rendering subsystem.
//!
//! This module is responsible for:
//! - render targets and the projection from world space into each of them
//! - texture handles per graphics context, unit binding and garbage collection
//! - filters and masks with their offscreen target pool
//! - object renderers batching draw commands
//! - the [`Renderer`] tying the above to one [`Backend`](crate::device::Backend)
//!
//! Convention:
//! - geometry arrives in world pixels (top-left origin, +Y down)
//! - every device call goes through a [`GpuContext`] passed down per call

mod context;
mod options;
mod renderer;
mod state;
mod target;
mod texture;
mod texture_gc;
mod texture_manager;

pub mod filter;
pub mod mask;
pub mod objects;

pub use context::{DeviceContext, GpuContext, ScissorMask};
pub use objects::RendererKind;
pub use options::RendererOptions;
pub use renderer::{Pluggable, Renderer};
pub use state::{StateSnapshot, StateTracker};
pub use target::{RenderTarget, RenderTargetKey, TargetArena};
pub use texture::{GpuTexture, TextureKey, TextureResource, TextureSource};
pub use texture_gc::{GcMode, GcOptions, TextureGc};
pub use texture_manager::TextureManager;
