use std::borrow::Cow;

use anyhow::Context;

use crate::device::{BlendMode, ContextId, ProgramHandle, ProgramSource, Vertex};
use crate::render::context::GpuContext;
use crate::render::texture::TextureKey;
use crate::scene::DrawCmd;

use super::{vertex_color, ObjectRenderer, RendererKind};

const SPRITE_WGSL: &str = include_str!("../shaders/sprite.wgsl");

/// Quads per draw call; keeps indices within `u16`.
pub const MAX_SPRITES_PER_BATCH: usize = 4096;

/// Textured quads, batched while they share a texture and blend mode.
///
/// The batch texture is bound to unit 0 at flush time.
#[derive(Debug, Default)]
pub struct SpriteRenderer {
    program: Option<(ContextId, ProgramHandle)>,
    texture: Option<TextureKey>,
    blend_mode: BlendMode,

    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    count: usize,

    warned_missing_program: bool,
}

impl SpriteRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sprites waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.count
    }

    fn clear_batch(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.count = 0;
    }
}

impl ObjectRenderer for SpriteRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Sprite
    }

    fn context_change(&mut self, ctx: &mut GpuContext) -> anyhow::Result<()> {
        let source = ProgramSource {
            label: Cow::Borrowed("sprite"),
            vertex: Cow::Borrowed(SPRITE_WGSL),
            fragment: Cow::Borrowed(SPRITE_WGSL),
            uniforms: Vec::new(),
        };
        let handle = ctx.backend().create_program(&source).context("create sprite program")?;
        self.program = Some((ctx.context_id(), handle));
        self.warned_missing_program = false;
        Ok(())
    }

    fn render(&mut self, ctx: &mut GpuContext, cmd: &DrawCmd) {
        let DrawCmd::Sprite(sprite) = cmd else { return };
        let loaded = ctx.textures.get(sprite.texture).is_some_and(|t| t.has_loaded());
        if !loaded {
            return;
        }

        let breaks_batch = self.texture != Some(sprite.texture)
            || self.blend_mode != sprite.blend_mode
            || self.count >= MAX_SPRITES_PER_BATCH;
        if breaks_batch {
            self.flush(ctx);
            self.texture = Some(sprite.texture);
            self.blend_mode = sprite.blend_mode;
        }

        let color = vertex_color(sprite.tint, sprite.alpha);
        let f = sprite.frame;
        let uvs = [
            [f.x(), f.y()],
            [f.x() + f.width(), f.y()],
            [f.x() + f.width(), f.y() + f.height()],
            [f.x(), f.y() + f.height()],
        ];
        let base = self.vertices.len() as u16;
        for (p, uv) in sprite.corners().into_iter().zip(uvs) {
            self.vertices.push(Vertex::new([p.x, p.y], uv, color));
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        self.count += 1;
    }

    fn flush(&mut self, ctx: &mut GpuContext) {
        if self.count == 0 {
            return;
        }
        let Some(texture) = self.texture else {
            self.clear_batch();
            return;
        };

        let program = match self.program {
            Some((context, handle)) if context == ctx.context_id() => handle,
            _ => {
                if !self.warned_missing_program {
                    log::debug!("SpriteRenderer: no program for the current context; batch dropped");
                    self.warned_missing_program = true;
                }
                self.clear_batch();
                return;
            }
        };

        if ctx.bind_texture(texture, Some(0), true).is_none() {
            self.clear_batch();
            return;
        }

        let device = &mut ctx.device;
        device.backend.use_program(program);
        device.state.set_blend_mode(device.backend.as_mut(), self.blend_mode);
        device.backend.draw(&self.vertices, &self.indices);
        self.clear_batch();
    }

    fn destroy(&mut self, ctx: &mut GpuContext, context_lost: bool) {
        self.clear_batch();
        self.texture = None;
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
    use crate::coords::{Matrix, Vec2};
    use crate::device::{DeviceCall, RecordingBackend, RecordingLog};
    use crate::render::context::DeviceContext;
    use crate::render::texture::TextureResource;
    use crate::render::texture_gc::TextureGc;
    use crate::render::texture_manager::TextureManager;
    use crate::scene::SpriteDraw;

    fn ctx() -> (GpuContext, RecordingLog) {
        let backend = RecordingBackend::new(100, 100);
        let log = backend.log();
        let device = DeviceContext::new(Box::new(backend), 1.0);
        let mut ctx = GpuContext::new(device, TextureManager::new(), TextureGc::default());
        ctx.textures.init_units(&mut ctx.device, 4);
        (ctx, log)
    }

    fn sprite(texture: TextureKey) -> DrawCmd {
        DrawCmd::Sprite(SpriteDraw::new(texture, Vec2::new(16.0, 16.0), Matrix::IDENTITY))
    }

    fn draws(log: &RecordingLog) -> usize {
        log.count(|c| matches!(c, DeviceCall::Draw { .. }))
    }

    #[test]
    fn same_texture_shares_a_draw() {
        let (mut ctx, log) = ctx();
        let texture = ctx.textures.insert(TextureResource::solid([255, 0, 0, 255]));
        let mut sprites = SpriteRenderer::new();
        sprites.context_change(&mut ctx).unwrap();

        for _ in 0..3 {
            sprites.render(&mut ctx, &sprite(texture));
        }
        sprites.flush(&mut ctx);

        assert_eq!(draws(&log), 1);
        assert!(log.calls().contains(&DeviceCall::Draw { vertices: 12, indices: 18 }));
        assert_eq!(ctx.textures.bound_units()[0], Some(texture));
    }

    #[test]
    fn texture_switch_flushes() {
        let (mut ctx, log) = ctx();
        let a = ctx.textures.insert(TextureResource::solid([255, 0, 0, 255]));
        let b = ctx.textures.insert(TextureResource::solid([0, 255, 0, 255]));
        let mut sprites = SpriteRenderer::new();
        sprites.context_change(&mut ctx).unwrap();

        sprites.render(&mut ctx, &sprite(a));
        sprites.render(&mut ctx, &sprite(b));
        sprites.flush(&mut ctx);
        assert_eq!(draws(&log), 2);
    }

    #[test]
    fn full_batch_flushes() {
        let (mut ctx, log) = ctx();
        let texture = ctx.textures.insert(TextureResource::solid([255, 255, 255, 255]));
        let mut sprites = SpriteRenderer::new();
        sprites.context_change(&mut ctx).unwrap();

        for _ in 0..MAX_SPRITES_PER_BATCH + 1 {
            sprites.render(&mut ctx, &sprite(texture));
        }
        assert_eq!(draws(&log), 1);
        assert_eq!(sprites.pending(), 1);
    }

    #[test]
    fn unloaded_texture_is_skipped() {
        let (mut ctx, _) = ctx();
        let mut pending = TextureResource::solid([0, 0, 0, 0]);
        pending.set_loaded(false);
        let texture = ctx.textures.insert(pending);
        let mut sprites = SpriteRenderer::new();
        sprites.context_change(&mut ctx).unwrap();

        sprites.render(&mut ctx, &sprite(texture));
        assert_eq!(sprites.pending(), 0);
    }
}
