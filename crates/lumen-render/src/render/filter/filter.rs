use std::borrow::Cow;

use crate::device::{BlendMode, UniformValue};
use crate::render::target::RenderTargetKey;
use crate::render::texture::TextureKey;

use super::manager::FilterPass;
use super::state::FilterState;

pub(crate) const DEFAULT_VERTEX: &str = include_str!("../shaders/filter.vert.wgsl");
pub(crate) const DEFAULT_FRAGMENT: &str = include_str!("../shaders/filter.frag.wgsl");

/// WGSL stages of a filter.
///
/// The uniform block at binding 1 starts with `filter_area: vec4<f32>` and
/// `filter_clamp: vec4<f32>`, followed by the filter's non-sampler uniforms in
/// declaration order. The input is bound to unit 0; sampler uniforms take units
/// 1 and up in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterProgram {
    pub label: Cow<'static, str>,
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl FilterProgram {
    /// Default vertex stage with a custom fragment stage.
    pub fn fragment(label: impl Into<Cow<'static, str>>, fragment: impl Into<Cow<'static, str>>) -> Self {
        Self { label: label.into(), vertex: Cow::Borrowed(DEFAULT_VERTEX), fragment: fragment.into() }
    }
}

impl Default for FilterProgram {
    fn default() -> Self {
        Self::fragment("default filter", DEFAULT_FRAGMENT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterUniform {
    Value(UniformValue),
    Texture(TextureKey),
    /// Color texture of a render target, e.g. a scratch target from
    /// [`FilterPass::get_render_target`].
    Target(RenderTargetKey),
}

/// One declared filter uniform.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformEntry {
    pub name: Cow<'static, str>,
    /// Declared type name (`float`, `vec2`, `vec4`, `mat3`, `int`, `sampler2d`...).
    pub ty: Cow<'static, str>,
    pub value: FilterUniform,
}

impl UniformEntry {
    pub fn new(name: impl Into<Cow<'static, str>>, ty: impl Into<Cow<'static, str>>, value: FilterUniform) -> Self {
        Self { name: name.into(), ty: ty.into(), value }
    }

    pub fn value(name: impl Into<Cow<'static, str>>, ty: impl Into<Cow<'static, str>>, value: UniformValue) -> Self {
        Self::new(name, ty, FilterUniform::Value(value))
    }
}

/// Uniforms of a filter, in declaration order.
pub type UniformMap = Vec<UniformEntry>;

/// A post-processing pass applied to a captured subtree.
pub trait Filter {
    fn program(&self) -> FilterProgram {
        FilterProgram::default()
    }

    fn uniforms(&self) -> UniformMap {
        Vec::new()
    }

    /// Extra world pixels captured around the node on every side.
    fn padding(&self) -> f32 {
        4.0
    }

    fn resolution(&self) -> f32 {
        1.0
    }

    /// Clamp the capture to the target being drawn into.
    fn auto_fit(&self) -> bool {
        true
    }

    fn blend_mode(&self) -> BlendMode {
        BlendMode::Normal
    }

    /// Renders `input` into `output` through this filter.
    ///
    /// Multi-pass filters override this and chain [`FilterPass::apply_filter`]
    /// calls through scratch targets.
    fn apply(
        &self,
        pass: &mut FilterPass<'_>,
        input: RenderTargetKey,
        output: RenderTargetKey,
        clear: bool,
        _state: &FilterState,
    ) {
        pass.apply_filter(&self.program(), &self.uniforms(), self.blend_mode(), input, output, clear);
    }
}

/// Copies its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughFilter;

impl Filter for PassThroughFilter {
    fn padding(&self) -> f32 {
        0.0
    }
}
