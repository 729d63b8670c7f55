use crate::coords::ColorRgba;

use super::texture_gc::GcOptions;

/// Renderer configuration.
///
/// Device creation options live in [`ContextOptions`](crate::device::ContextOptions);
/// these only shape how frames are drawn.
#[derive(Debug, Clone)]
pub struct RendererOptions {
    /// Clear color of the screen target.
    pub background_color: ColorRgba,

    /// Clear the target at the start of every `render` unless the call says otherwise.
    pub clear_before_render: bool,

    /// Device pixels per world pixel.
    pub resolution: f32,

    /// Allow axis-aligned rectangle masks to use the scissor test.
    pub enable_scissor: bool,

    pub gc: GcOptions,

    /// Upper bound on texture units used, on top of the device limit.
    pub max_texture_units: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            background_color: ColorRgba::black(),
            clear_before_render: true,
            resolution: 1.0,
            enable_scissor: true,
            gc: GcOptions::default(),
            max_texture_units: 16,
        }
    }
}
