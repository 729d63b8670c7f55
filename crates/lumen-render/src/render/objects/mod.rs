//! Object renderers.
//!
//! Each draw-command kind has one renderer that turns commands into vertex
//! batches. The [`Renderer`](super::Renderer) keeps at most one of them
//! current and stops it before switching.

mod shape;
mod sprite;

pub use shape::ShapeRenderer;
pub use sprite::{SpriteRenderer, MAX_SPRITES_PER_BATCH};

use crate::coords::ColorRgba;
use crate::render::context::GpuContext;
use crate::scene::DrawCmd;

/// Draw-command families, one renderer each.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RendererKind {
    Shape,
    Sprite,
}

/// Batches draw commands of one [`RendererKind`].
pub trait ObjectRenderer {
    fn kind(&self) -> RendererKind;

    /// (Re)creates device objects for the current context.
    fn context_change(&mut self, ctx: &mut GpuContext) -> anyhow::Result<()>;

    /// Called when this renderer becomes current.
    fn start(&mut self, _ctx: &mut GpuContext) {}

    /// Called when another renderer becomes current.
    fn stop(&mut self, ctx: &mut GpuContext) {
        self.flush(ctx);
    }

    /// Queues `cmd`. Commands of another kind are ignored.
    fn render(&mut self, ctx: &mut GpuContext, cmd: &DrawCmd);

    /// Draws everything queued.
    fn flush(&mut self, ctx: &mut GpuContext);

    /// Releases device objects. With `context_lost` they are only forgotten.
    fn destroy(&mut self, ctx: &mut GpuContext, context_lost: bool);
}

/// Premultiplied vertex color for `color` drawn at `alpha`.
#[inline]
pub(crate) fn vertex_color(color: ColorRgba, alpha: f32) -> [f32; 4] {
    ColorRgba { a: color.a * alpha, ..color }.premultiplied()
}
