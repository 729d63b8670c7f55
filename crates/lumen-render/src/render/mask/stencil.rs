use crate::device::{Backend, Capability, StencilCompare, StencilFunc, StencilOp};
use crate::render::context::GpuContext;
use crate::scene::{MaskShape, ShapeDraw};

/// Draws a mask's shapes into the bound target.
pub type MaskDrawer<'a> = dyn FnMut(&mut GpuContext, &ShapeDraw) + 'a;

/// Nested clipping through the stencil buffer.
///
/// The stack lives on the active render target. Inside `n` masks the stencil
/// value of visible pixels is `n`; each push increments it where the new mask
/// overlaps the previous ones, each pop decrements it back.
#[derive(Debug, Default, Clone, Copy)]
pub struct StencilManager;

impl StencilManager {
    pub fn push_stencil(ctx: &mut GpuContext, mask: MaskShape, draw: &mut MaskDrawer<'_>) {
        let device = &mut ctx.device;
        let Some(target) = device.targets.get_mut(device.active_target) else { return };
        let backend = device.backend.as_mut();

        target.attach_stencil(backend);
        let previous = target.stencil_mask_stack.len();
        if previous == 0 {
            backend.set_enabled(Capability::StencilTest, true);
        }
        let shape = mask.shape_draw();
        target.stencil_mask_stack.push(mask);
        let depth = target.stencil_mask_stack.len();

        backend.set_color_mask(false);
        backend.set_stencil_func(StencilFunc::new(StencilCompare::Equal, previous as u32, bitwise_mask(depth)));
        backend.set_stencil_op(StencilOp::Increment);
        if let Some(shape) = shape {
            draw(ctx, &shape);
        }
        Self::use_current(ctx.device.backend.as_mut(), depth);
    }

    pub fn pop_stencil(ctx: &mut GpuContext, draw: &mut MaskDrawer<'_>) {
        let device = &mut ctx.device;
        let Some(target) = device.targets.get_mut(device.active_target) else { return };
        let Some(mask) = target.stencil_mask_stack.pop() else {
            debug_assert!(false, "pop_stencil on an empty stencil stack");
            log::warn!("lumen-render: pop_stencil on an empty stack ignored");
            return;
        };
        let depth = target.stencil_mask_stack.len();
        let backend = device.backend.as_mut();

        if depth == 0 {
            backend.set_enabled(Capability::StencilTest, false);
            backend.clear_stencil();
            return;
        }

        backend.set_color_mask(false);
        backend.set_stencil_op(StencilOp::Decrement);
        if let Some(shape) = mask.shape_draw() {
            draw(ctx, &shape);
        }
        Self::use_current(ctx.device.backend.as_mut(), depth);
    }

    /// Installs a stack of `depth` masks, as found on a freshly bound target.
    pub fn set_mask_stack(backend: &mut dyn Backend, depth: usize) {
        if depth == 0 {
            backend.set_enabled(Capability::StencilTest, false);
        } else {
            backend.set_enabled(Capability::StencilTest, true);
            Self::use_current(backend, depth);
        }
    }

    /// Draw only where all `depth` masks overlap.
    fn use_current(backend: &mut dyn Backend, depth: usize) {
        backend.set_color_mask(true);
        backend.set_stencil_func(StencilFunc::new(StencilCompare::Equal, depth as u32, bitwise_mask(depth)));
        backend.set_stencil_op(StencilOp::Keep);
    }
}

#[inline]
fn bitwise_mask(depth: usize) -> u32 {
    (1u32 << depth.min(31)) - 1
}
