/// Adapter selection hint.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PowerPreference {
    #[default]
    Default,
    LowPower,
    HighPerformance,
}

/// Options recognized when the graphics context is created.
///
/// Backends that cannot honor an option log it once and carry on.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Request multisampled edges on the drawing buffer.
    pub antialias: bool,

    /// Keep an alpha channel in the drawing buffer so the page/compositor behind
    /// the surface shows through transparent pixels.
    pub use_alpha_channel: bool,

    /// Keep the drawing buffer contents after presenting instead of leaving them
    /// undefined. Costs one copy per frame.
    pub preserve_buffer_after_present: bool,

    /// Give the drawing buffer a stencil attachment. Stencil masks on the root
    /// target need this; offscreen targets attach stencil lazily either way.
    pub stencil_buffer_enabled: bool,

    pub power_preference: PowerPreference,

    /// Present mode (swap behavior). FIFO is broadly supported.
    pub present_mode: wgpu::PresentMode,

    /// Desired maximum frame latency for the surface. This value is a hint.
    pub desired_maximum_frame_latency: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            antialias: false,
            use_alpha_channel: true,
            preserve_buffer_after_present: false,
            stencil_buffer_enabled: true,
            power_preference: PowerPreference::Default,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
        }
    }
}
