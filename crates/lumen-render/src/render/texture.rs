use std::collections::HashMap;

use slotmap::new_key_type;

use crate::device::{ContextId, SamplerParams, ScaleMode, TextureHandle, WrapMode};

use super::target::RenderTargetKey;

new_key_type! {
    /// Stable id of a [`TextureResource`] owned by the renderer.
    pub struct TextureKey;
}

/// Where a texture's image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    /// Tightly packed RGBA8 rows, top row first.
    Pixels(Vec<u8>),
    /// Rendered into; backed by a framebuffer.
    RenderTarget,
}

/// Device objects of one texture under one context.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    /// Backing render target for [`TextureSource::RenderTarget`] textures.
    pub target: Option<RenderTargetKey>,
}

/// A logical texture and its per-context device handles.
#[derive(Debug, Clone)]
pub struct TextureResource {
    pub(crate) width: f32,
    pub(crate) height: f32,
    pub(crate) resolution: f32,
    pub wrap: WrapMode,
    pub scale: ScaleMode,
    pub mipmap: bool,
    pub(crate) source: TextureSource,
    pub(crate) gpu: HashMap<ContextId, GpuTexture>,
    /// GC frame at which the texture was last bound.
    pub(crate) touched: u64,
    pub(crate) has_loaded: bool,
    pub(crate) dirty: bool,
}

impl TextureResource {
    /// Texture from RGBA8 pixels. A zero-sized image becomes a transparent 1x1.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        let (width, height, pixels) = if width == 0 || height == 0 {
            (1, 1, vec![0; 4])
        } else {
            (width, height, pixels)
        };
        Self::with_source(width as f32, height as f32, 1.0, TextureSource::Pixels(pixels))
    }

    /// Single-color 1x1 texture.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::from_pixels(1, 1, rgba.to_vec())
    }

    /// Texture that can be rendered into. `width`/`height` are in world pixels.
    pub fn render_target(width: f32, height: f32, resolution: f32) -> Self {
        Self::with_source(width.max(1.0), height.max(1.0), resolution, TextureSource::RenderTarget)
    }

    fn with_source(width: f32, height: f32, resolution: f32, source: TextureSource) -> Self {
        Self {
            width,
            height,
            resolution: if resolution > 0.0 { resolution } else { 1.0 },
            wrap: WrapMode::Clamp,
            scale: ScaleMode::Linear,
            mipmap: false,
            source,
            gpu: HashMap::new(),
            touched: 0,
            has_loaded: true,
            dirty: false,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[inline]
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Size of the device image in pixels.
    #[inline]
    pub fn real_size(&self) -> (u32, u32) {
        (
            (self.width * self.resolution).ceil().max(1.0) as u32,
            (self.height * self.resolution).ceil().max(1.0) as u32,
        )
    }

    pub fn is_power_of_two(&self) -> bool {
        let (w, h) = self.real_size();
        w.is_power_of_two() && h.is_power_of_two()
    }

    #[inline]
    pub fn is_render_target(&self) -> bool {
        matches!(self.source, TextureSource::RenderTarget)
    }

    #[inline]
    pub fn has_loaded(&self) -> bool {
        self.has_loaded
    }

    #[inline]
    pub fn touched(&self) -> u64 {
        self.touched
    }

    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    pub fn gpu(&self, context: ContextId) -> Option<&GpuTexture> {
        self.gpu.get(&context)
    }

    /// Replaces the image. The device copy is refreshed on next bind.
    pub fn set_pixels(&mut self, width: u32, height: u32, pixels: Vec<u8>) {
        self.width = width.max(1) as f32;
        self.height = height.max(1) as f32;
        self.source = TextureSource::Pixels(pixels);
        self.dirty = true;
    }

    /// Resizes a render-target texture; the framebuffer follows on next bind.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width.max(1.0);
        self.height = height.max(1.0);
        self.dirty = true;
    }

    /// Marks the image as pending (still decoding, still downloading...).
    /// Binding an unloaded texture is a no-op.
    pub fn set_loaded(&mut self, loaded: bool) {
        self.has_loaded = loaded;
    }

    /// Sampler state for a newly created handle.
    ///
    /// Only power-of-two images honor mipmapping and repeat wrapping; everything
    /// else is clamped.
    pub(crate) fn sampler_params(&self) -> SamplerParams {
        if self.is_power_of_two() {
            SamplerParams { wrap: self.wrap, scale: self.scale, mipmap: self.mipmap }
        } else {
            SamplerParams { wrap: WrapMode::Clamp, scale: self.scale, mipmap: false }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_pixels_clamp_to_one_by_one() {
        let tex = TextureResource::from_pixels(0, 10, Vec::new());
        assert_eq!(tex.real_size(), (1, 1));
        assert_eq!(tex.source(), &TextureSource::Pixels(vec![0; 4]));
    }

    #[test]
    fn non_power_of_two_textures_are_clamped() {
        let mut tex = TextureResource::from_pixels(3, 4, vec![0; 48]);
        tex.wrap = WrapMode::Repeat;
        tex.mipmap = true;
        assert!(!tex.is_power_of_two());
        assert_eq!(tex.sampler_params().wrap, WrapMode::Clamp);
        assert!(!tex.sampler_params().mipmap);

        let mut pot = TextureResource::from_pixels(4, 4, vec![0; 64]);
        pot.wrap = WrapMode::Repeat;
        assert_eq!(pot.sampler_params().wrap, WrapMode::Repeat);
    }

    #[test]
    fn render_target_size_scales_with_resolution() {
        let tex = TextureResource::render_target(100.0, 50.5, 2.0);
        assert_eq!(tex.real_size(), (200, 101));
        assert!(tex.is_render_target());
    }
}
