use std::borrow::Cow;
use std::cell::{Cell, RefCell};

use crate::coords::Matrix;
use crate::device::UniformValue;
use crate::render::target::RenderTargetKey;
use crate::scene::SpriteDraw;

use super::filter::{Filter, FilterProgram, FilterUniform, UniformEntry, UniformMap};
use super::manager::FilterPass;
use super::state::FilterState;

const VERTEX: &str = include_str!("../shaders/alpha_mask.vert.wgsl");
const FRAGMENT: &str = include_str!("../shaders/alpha_mask.frag.wgsl");

/// Masks its input by a sprite: output = input * mask.r * mask.a * alpha.
///
/// Instances are pooled per mask depth and re-pointed at a new sprite on every
/// push, hence the interior mutability.
#[derive(Debug)]
pub struct AlphaMaskFilter {
    sprite: RefCell<Option<SpriteDraw>>,
    mask_matrix: RefCell<Matrix>,
    resolution: Cell<f32>,
}

impl Default for AlphaMaskFilter {
    fn default() -> Self {
        Self { sprite: RefCell::new(None), mask_matrix: RefCell::new(Matrix::IDENTITY), resolution: Cell::new(1.0) }
    }
}

impl AlphaMaskFilter {
    pub fn new(sprite: SpriteDraw) -> Self {
        let filter = Self::default();
        filter.set_sprite(Some(sprite));
        filter
    }

    /// Captures at the renderer's resolution.
    pub fn set_resolution(&self, resolution: f32) {
        self.resolution.set(resolution);
    }

    pub fn set_sprite(&self, sprite: Option<SpriteDraw>) {
        *self.sprite.borrow_mut() = sprite;
    }

    pub fn sprite(&self) -> Option<SpriteDraw> {
        self.sprite.borrow().clone()
    }
}

impl Filter for AlphaMaskFilter {
    fn program(&self) -> FilterProgram {
        FilterProgram {
            label: Cow::Borrowed("alpha mask"),
            vertex: Cow::Borrowed(VERTEX),
            fragment: Cow::Borrowed(FRAGMENT),
        }
    }

    fn uniforms(&self) -> UniformMap {
        let sprite = self.sprite.borrow();
        let Some(sprite) = sprite.as_ref() else { return Vec::new() };

        // Texture frame of the sprite within its texture.
        let frame = sprite.frame;
        let mut other = *self.mask_matrix.borrow();
        other.prepend(&Matrix::new(frame.width(), 0.0, 0.0, frame.height(), frame.x(), frame.y()));

        vec![
            UniformEntry::value("other_matrix", "mat3", UniformValue::Mat3(other)),
            UniformEntry::value("alpha", "float", UniformValue::Float(sprite.alpha)),
            UniformEntry::value(
                "mask_clamp",
                "vec4",
                UniformValue::Vec4([frame.x(), frame.y(), frame.x() + frame.width(), frame.y() + frame.height()]),
            ),
            UniformEntry::new("mask", "sampler2d", FilterUniform::Texture(sprite.texture)),
        ]
    }

    fn padding(&self) -> f32 {
        0.0
    }

    fn resolution(&self) -> f32 {
        self.resolution.get()
    }

    fn apply(&self, pass: &mut FilterPass<'_>, input: RenderTargetKey, output: RenderTargetKey, clear: bool, _state: &FilterState) {
        let Some(sprite) = self.sprite() else { return };
        let loaded = pass.ctx().textures.get(sprite.texture).is_some_and(|t| t.has_loaded());
        if !loaded {
            return;
        }
        *self.mask_matrix.borrow_mut() = pass.calculate_sprite_matrix(&sprite);
        pass.apply_filter(&self.program(), &self.uniforms(), self.blend_mode(), input, output, clear);
    }
}
