use std::rc::Rc;

use crate::coords::Rect;
use crate::device::{Capability, DeviceRect};
use crate::render::context::{GpuContext, ScissorMask};
use crate::render::filter::{AlphaMaskFilter, Filter, FilterManager};
use crate::scene::MaskShape;

use super::stencil::{MaskDrawer, StencilManager};

/// How a pushed mask clips.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MaskStrategy {
    /// Alpha-mask filter over a captured subtree.
    Sprite,
    /// Axis-aligned rectangle through the scissor test.
    Scissor,
    /// Arbitrary shapes through the stencil buffer.
    Stencil,
}

/// Routes mask requests to the cheapest strategy that can express them.
///
/// Responsibilities:
/// - textured masks become an alpha-mask filter, pooled per nesting depth
/// - axis-aligned rectangles become a scissor rectangle (at most one at a time)
/// - everything else goes through the stencil buffer
#[derive(Debug)]
pub struct MaskManager {
    pub enable_scissor: bool,
    alpha_mask_pool: Vec<Rc<AlphaMaskFilter>>,
    alpha_mask_index: usize,
    strategies: Vec<MaskStrategy>,
}

impl Default for MaskManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MaskManager {
    pub fn new(enable_scissor: bool) -> Self {
        Self { enable_scissor, alpha_mask_pool: Vec::new(), alpha_mask_index: 0, strategies: Vec::new() }
    }

    /// Number of masks currently pushed.
    pub fn depth(&self) -> usize {
        self.strategies.len()
    }

    pub fn push_mask(
        &mut self,
        ctx: &mut GpuContext,
        filters: &mut FilterManager,
        mask: MaskShape,
        draw: &mut MaskDrawer<'_>,
    ) -> MaskStrategy {
        let strategy = self.choose(ctx, &mask);
        match strategy {
            MaskStrategy::Sprite => self.push_sprite_mask(ctx, filters, &mask),
            MaskStrategy::Scissor => self.push_scissor_mask(ctx, &mask),
            MaskStrategy::Stencil => StencilManager::push_stencil(ctx, mask, draw),
        }
        self.strategies.push(strategy);
        strategy
    }

    /// Undoes the innermost push with the strategy it was pushed with.
    pub fn pop_mask(&mut self, ctx: &mut GpuContext, filters: &mut FilterManager, mask: &MaskShape, draw: &mut MaskDrawer<'_>) {
        let Some(strategy) = self.strategies.pop() else {
            debug_assert!(false, "pop_mask without matching push_mask");
            log::warn!("lumen-render: pop_mask without matching push ignored");
            return;
        };
        debug_assert_eq!(mask.texture().is_some(), strategy == MaskStrategy::Sprite, "mask popped out of order");

        match strategy {
            MaskStrategy::Sprite => {
                filters.pop_filter(ctx);
                self.alpha_mask_index = self.alpha_mask_index.saturating_sub(1);
            }
            MaskStrategy::Scissor => {
                ctx.device.scissor = None;
                ctx.device.backend.set_enabled(Capability::ScissorTest, false);
            }
            MaskStrategy::Stencil => StencilManager::pop_stencil(ctx, draw),
        }
    }

    /// Forgets recorded strategies, e.g. after a context loss.
    pub fn reset(&mut self) {
        self.strategies.clear();
        self.alpha_mask_index = 0;
    }

    fn choose(&self, ctx: &GpuContext, mask: &MaskShape) -> MaskStrategy {
        if mask.texture().is_some() {
            return MaskStrategy::Sprite;
        }
        let stencil_empty = ctx.device.active().is_none_or(|t| t.stencil_depth() == 0);
        let m = mask.world_transform;
        if self.enable_scissor
            && ctx.device.scissor.is_none()
            && stencil_empty
            && mask.is_fast_rect()
            && m.rotation_degrees() % 90 == 0
            && m.is_unskewed()
        {
            MaskStrategy::Scissor
        } else {
            MaskStrategy::Stencil
        }
    }

    fn push_sprite_mask(&mut self, ctx: &mut GpuContext, filters: &mut FilterManager, mask: &MaskShape) {
        let Some(sprite) = mask.sprite_draw() else { return };
        if self.alpha_mask_pool.len() <= self.alpha_mask_index {
            self.alpha_mask_pool.push(Rc::new(AlphaMaskFilter::default()));
        }
        let filter = Rc::clone(&self.alpha_mask_pool[self.alpha_mask_index]);
        filter.set_resolution(ctx.device.resolution);
        filter.set_sprite(Some(sprite));

        filters.push_filter_area(ctx, mask.bounds(), vec![filter as Rc<dyn Filter>]);
        self.alpha_mask_index += 1;
    }

    fn push_scissor_mask(&mut self, ctx: &mut GpuContext, mask: &MaskShape) {
        let device = &mut ctx.device;
        let key = device.active_target;
        let Some(target) = device.targets.get(key) else { return };

        let size = target.size();
        let bounds = mask.bounds().fit(Rect::sized(size.x, size.y));
        let y = if target.is_root() { size.y - bounds.y() - bounds.height() } else { bounds.y() };
        let resolution = device.resolution;
        let rect = DeviceRect {
            x: (bounds.x() * resolution).round() as i32,
            y: (y * resolution).round() as i32,
            width: (bounds.width() * resolution).round().max(0.0) as u32,
            height: (bounds.height() * resolution).round().max(0.0) as u32,
        };

        device.backend.set_enabled(Capability::ScissorTest, true);
        device.backend.set_scissor(rect);
        device.scissor = Some(ScissorMask { target: key, rect });
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

    fn ctx() -> (GpuContext, RecordingLog) {
        let backend = RecordingBackend::new(200, 100);
        let log = backend.log();
        let device = DeviceContext::new(Box::new(backend), 1.0);
        let mut ctx = GpuContext::new(device, TextureManager::new(), TextureGc::default());
        ctx.textures.init_units(&mut ctx.device, 4);
        log.clear();
        (ctx, log)
    }

    fn rect_mask(world: Matrix) -> MaskShape {
        MaskShape::rect(Rect::new(10.0, 20.0, 50.0, 30.0), world)
    }

    // ── routing ──────────────────────────────────────────────────────────

    #[test]
    fn axis_aligned_rect_uses_scissor() {
        let (mut ctx, log) = ctx();
        let mut masks = MaskManager::default();
        let mut filters = FilterManager::new();
        let strategy = masks.push_mask(&mut ctx, &mut filters, rect_mask(Matrix::IDENTITY), &mut |_, _| {});

        assert_eq!(strategy, MaskStrategy::Scissor);
        // Root target: y flipped against the 100px height.
        let rect = DeviceRect { x: 10, y: 50, width: 50, height: 30 };
        assert_eq!(log.calls(), vec![DeviceCall::SetEnabled(Capability::ScissorTest, true), DeviceCall::SetScissor(rect)]);
        assert_eq!(ctx.device.scissor.map(|s| s.rect), Some(rect));
    }

    #[test]
    fn right_angle_rotation_still_uses_scissor() {
        let (mut ctx, _) = ctx();
        let mut masks = MaskManager::default();
        let mut filters = FilterManager::new();
        let world = Matrix::rotation(std::f32::consts::FRAC_PI_2);
        let strategy = masks.push_mask(&mut ctx, &mut filters, rect_mask(world), &mut |_, _| {});
        assert_eq!(strategy, MaskStrategy::Scissor);
    }

    #[test]
    fn rotated_rect_uses_stencil() {
        let (mut ctx, log) = ctx();
        let mut masks = MaskManager::default();
        let mut filters = FilterManager::new();
        let world = Matrix::rotation(std::f32::consts::FRAC_PI_4);
        let mut draws = 0;
        let strategy = masks.push_mask(&mut ctx, &mut filters, rect_mask(world), &mut |_, _| draws += 1);

        assert_eq!(strategy, MaskStrategy::Stencil);
        assert_eq!(draws, 1);
        assert!(log.calls().contains(&DeviceCall::SetEnabled(Capability::StencilTest, true)));
        assert!(ctx.device.scissor.is_none());
    }

    #[test]
    fn scissor_does_not_stack() {
        let (mut ctx, _) = ctx();
        let mut masks = MaskManager::default();
        let mut filters = FilterManager::new();
        masks.push_mask(&mut ctx, &mut filters, rect_mask(Matrix::IDENTITY), &mut |_, _| {});
        let second = masks.push_mask(&mut ctx, &mut filters, rect_mask(Matrix::IDENTITY), &mut |_, _| {});
        assert_eq!(second, MaskStrategy::Stencil);
    }

    #[test]
    fn disabled_scissor_falls_back_to_stencil() {
        let (mut ctx, _) = ctx();
        let mut masks = MaskManager::new(false);
        let mut filters = FilterManager::new();
        let strategy = masks.push_mask(&mut ctx, &mut filters, rect_mask(Matrix::IDENTITY), &mut |_, _| {});
        assert_eq!(strategy, MaskStrategy::Stencil);
    }

    #[test]
    fn textured_mask_pushes_alpha_filter() {
        let (mut ctx, _) = ctx();
        let texture = ctx.textures.insert(TextureResource::from_pixels(8, 8, vec![255; 8 * 8 * 4]));
        let mut masks = MaskManager::default();
        let mut filters = FilterManager::new();
        let mask = MaskShape::sprite(texture, Vec2::new(40.0, 40.0), Vec2::zero(), Matrix::translation(10.0, 10.0));

        let strategy = masks.push_mask(&mut ctx, &mut filters, mask.clone(), &mut |_, _| {});
        assert_eq!(strategy, MaskStrategy::Sprite);
        assert_eq!(filters.depth(&ctx), 1);
        assert_ne!(ctx.device.active_target, ctx.device.root);

        masks.pop_mask(&mut ctx, &mut filters, &mask, &mut |_, _| {});
        assert_eq!(filters.depth(&ctx), 0);
        assert_eq!(ctx.device.active_target, ctx.device.root);
        assert_eq!(masks.alpha_mask_pool.len(), 1);
    }

    // ── unwinding ────────────────────────────────────────────────────────

    #[test]
    fn pop_uses_strategy_recorded_at_push() {
        let (mut ctx, log) = ctx();
        let mut masks = MaskManager::default();
        let mut filters = FilterManager::new();
        let outer = rect_mask(Matrix::IDENTITY);
        let inner = rect_mask(Matrix::IDENTITY);
        masks.push_mask(&mut ctx, &mut filters, outer.clone(), &mut |_, _| {});
        masks.push_mask(&mut ctx, &mut filters, inner.clone(), &mut |_, _| {});
        assert_eq!(masks.depth(), 2);

        log.clear();
        masks.pop_mask(&mut ctx, &mut filters, &inner, &mut |_, _| {});
        assert!(log.calls().contains(&DeviceCall::ClearStencil));
        assert!(ctx.device.scissor.is_some());

        log.clear();
        masks.pop_mask(&mut ctx, &mut filters, &outer, &mut |_, _| {});
        assert_eq!(log.calls(), vec![DeviceCall::SetEnabled(Capability::ScissorTest, false)]);
        assert!(ctx.device.scissor.is_none());
        assert_eq!(masks.depth(), 0);
    }
}
