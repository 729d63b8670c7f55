use std::borrow::Cow;

use anyhow::Context;

use crate::coords::Vec2;
use crate::device::{BlendMode, ContextId, ProgramHandle, ProgramSource, Vertex};
use crate::render::context::GpuContext;
use crate::scene::{DrawCmd, ShapeDraw};

use super::{vertex_color, ObjectRenderer, RendererKind};

const SHAPE_WGSL: &str = include_str!("../shaders/shape.wgsl");

/// Headroom kept below the `u16` index limit before a batch is flushed.
const MAX_BATCH_VERTICES: usize = u16::MAX as usize - 1024;

/// Solid vector shapes, batched until the blend mode changes.
#[derive(Debug, Default)]
pub struct ShapeRenderer {
    program: Option<(ContextId, ProgramHandle)>,
    blend_mode: BlendMode,

    positions: Vec<Vec2>,
    colors: Vec<[f32; 4]>,
    indices: Vec<u16>,
    vertices: Vec<Vertex>,

    warned_missing_program: bool,
}

impl ShapeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertices waiting for the next flush.
    pub fn pending_vertices(&self) -> usize {
        self.positions.len()
    }

    fn append(&mut self, ctx: &mut GpuContext, draw: &ShapeDraw) {
        for shape in &draw.shapes {
            let edges = shape.outline().len();
            let needed = if shape.line_width > 0.0 { edges * 5 } else { edges };
            if self.positions.len() + needed > MAX_BATCH_VERTICES {
                self.flush(ctx);
            }

            shape.fill_geometry(&draw.world_transform, &mut self.positions, &mut self.indices);
            let fill = vertex_color(shape.fill, draw.alpha);
            self.colors.resize(self.positions.len(), fill);

            shape.stroke_geometry(&draw.world_transform, &mut self.positions, &mut self.indices);
            let line = vertex_color(shape.line_color, draw.alpha);
            self.colors.resize(self.positions.len(), line);
        }
    }

    fn clear_batch(&mut self) {
        self.positions.clear();
        self.colors.clear();
        self.indices.clear();
    }
}

impl ObjectRenderer for ShapeRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Shape
    }

    fn context_change(&mut self, ctx: &mut GpuContext) -> anyhow::Result<()> {
        let source = ProgramSource {
            label: Cow::Borrowed("shape"),
            vertex: Cow::Borrowed(SHAPE_WGSL),
            fragment: Cow::Borrowed(SHAPE_WGSL),
            uniforms: Vec::new(),
        };
        let handle = ctx.backend().create_program(&source).context("create shape program")?;
        self.program = Some((ctx.context_id(), handle));
        self.warned_missing_program = false;
        Ok(())
    }

    fn render(&mut self, ctx: &mut GpuContext, cmd: &DrawCmd) {
        let DrawCmd::Shape(draw) = cmd else { return };
        if draw.blend_mode != self.blend_mode {
            self.flush(ctx);
            self.blend_mode = draw.blend_mode;
        }
        self.append(ctx, draw);
    }

    fn flush(&mut self, ctx: &mut GpuContext) {
        if self.indices.is_empty() {
            self.clear_batch();
            return;
        }

        let program = match self.program {
            Some((context, handle)) if context == ctx.context_id() => handle,
            _ => {
                if !self.warned_missing_program {
                    log::debug!("ShapeRenderer: no program for the current context; batch dropped");
                    self.warned_missing_program = true;
                }
                self.clear_batch();
                return;
            }
        };

        self.vertices.clear();
        self.vertices.extend(
            self.positions
                .iter()
                .zip(&self.colors)
                .map(|(p, c)| Vertex::new([p.x, p.y], [0.0, 0.0], *c)),
        );

        let device = &mut ctx.device;
        device.backend.use_program(program);
        device.state.set_blend_mode(device.backend.as_mut(), self.blend_mode);
        device.backend.draw(&self.vertices, &self.indices);
        self.clear_batch();
    }

    fn destroy(&mut self, ctx: &mut GpuContext, context_lost: bool) {
        self.clear_batch();
        if let Some((context, handle)) = self.program.take()
            && !context_lost
            && context == ctx.context_id()
        {
            ctx.backend().delete_program(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{ColorRgba, Matrix, Rect};
    use crate::device::{DeviceCall, RecordingBackend, RecordingLog};
    use crate::render::context::DeviceContext;
    use crate::render::texture_gc::TextureGc;
    use crate::render::texture_manager::TextureManager;
    use crate::scene::Shape;

    fn ctx() -> (GpuContext, RecordingLog) {
        let backend = RecordingBackend::new(100, 100);
        let log = backend.log();
        let device = DeviceContext::new(Box::new(backend), 1.0);
        (GpuContext::new(device, TextureManager::new(), TextureGc::default()), log)
    }

    fn square(alpha: f32) -> DrawCmd {
        let mut draw = ShapeDraw::new(vec![Shape::rect(Rect::sized(10.0, 10.0), ColorRgba::white())], Matrix::IDENTITY);
        draw.alpha = alpha;
        DrawCmd::Shape(draw)
    }

    #[test]
    fn batches_until_flush() {
        let (mut ctx, log) = ctx();
        let mut shapes = ShapeRenderer::new();
        shapes.context_change(&mut ctx).unwrap();
        log.clear();

        shapes.render(&mut ctx, &square(1.0));
        shapes.render(&mut ctx, &square(0.5));
        assert_eq!(shapes.pending_vertices(), 8);
        assert_eq!(log.count(|c| matches!(c, DeviceCall::Draw { .. })), 0);

        shapes.flush(&mut ctx);
        assert!(log.calls().contains(&DeviceCall::Draw { vertices: 8, indices: 12 }));
        assert_eq!(shapes.pending_vertices(), 0);
    }

    #[test]
    fn blend_change_splits_batch() {
        let (mut ctx, log) = ctx();
        let mut shapes = ShapeRenderer::new();
        shapes.context_change(&mut ctx).unwrap();

        shapes.render(&mut ctx, &square(1.0));
        let DrawCmd::Shape(mut additive) = square(1.0) else { unreachable!() };
        additive.blend_mode = BlendMode::Add;
        shapes.render(&mut ctx, &DrawCmd::Shape(additive));
        shapes.flush(&mut ctx);

        assert_eq!(log.count(|c| matches!(c, DeviceCall::Draw { .. })), 2);
    }

    #[test]
    fn vertex_colors_are_premultiplied_by_alpha() {
        assert_eq!(vertex_color(ColorRgba::new(1.0, 0.5, 0.0, 1.0), 0.5), [0.5, 0.25, 0.0, 0.5]);
    }

    #[test]
    fn stale_program_drops_batch() {
        let (mut ctx, log) = ctx();
        let mut shapes = ShapeRenderer::new();
        shapes.render(&mut ctx, &square(1.0));
        shapes.flush(&mut ctx);
        assert_eq!(log.count(|c| matches!(c, DeviceCall::Draw { .. })), 0);
        assert_eq!(shapes.pending_vertices(), 0);
    }

    #[test]
    fn sprite_commands_are_ignored() {
        let (mut ctx, _) = ctx();
        let mut shapes = ShapeRenderer::new();
        let sprite = crate::scene::SpriteDraw::new(Default::default(), Vec2::new(4.0, 4.0), Matrix::IDENTITY);
        shapes.render(&mut ctx, &DrawCmd::Sprite(sprite));
        assert_eq!(shapes.pending_vertices(), 0);
    }
}
