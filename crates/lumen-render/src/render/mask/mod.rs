//! Clipping of subtrees by masks.
//!
//! This module is responsible for:
//! - choosing a strategy per mask (alpha filter, scissor or stencil)
//! - the nested stencil protocol kept on each render target

mod manager;
mod stencil;

pub use manager::{MaskManager, MaskStrategy};
pub use stencil::{MaskDrawer, StencilManager};
