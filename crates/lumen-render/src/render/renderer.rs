use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Context;

use crate::coords::{ColorRgba, Matrix, Rect};
use crate::device::{Backend, ContextId};
use crate::scene::{DrawCmd, MaskShape, SceneNode, ShapeDraw};

use super::context::{DeviceContext, GpuContext};
use super::filter::{Filter, FilterManager};
use super::mask::{MaskManager, MaskStrategy};
use super::objects::{ObjectRenderer, RendererKind, ShapeRenderer, SpriteRenderer};
use super::options::RendererOptions;
use super::target::RenderTargetKey;
use super::texture::{TextureKey, TextureResource};
use super::texture_gc::TextureGc;
use super::texture_manager::TextureManager;

/// Lifecycle of the object renderers registered on a [`Renderer`].
pub trait Pluggable {
    /// Creates device objects of every object renderer for the current context.
    fn init_plugins(&mut self);

    fn destroy_plugins(&mut self);
}

type RendererMap = HashMap<RendererKind, Box<dyn ObjectRenderer>>;

/// Entry point of the crate.
///
/// Responsibilities:
/// - binding render targets (screen or render-target textures) for a frame
/// - dispatching draw commands to the object renderer of their kind
/// - filter and mask pushes on behalf of scene nodes
/// - advancing the texture collector once per frame
/// - suspending on context loss and rebuilding on restore
pub struct Renderer {
    ctx: GpuContext,
    filters: FilterManager,
    masks: MaskManager,
    object_renderers: RendererMap,
    current: Option<RendererKind>,
    options: RendererOptions,
    context_lost: bool,
}

impl Renderer {
    pub fn new(backend: Box<dyn Backend>, options: RendererOptions) -> Self {
        let device = DeviceContext::new(backend, options.resolution);
        let ctx = GpuContext::new(device, TextureManager::new(), TextureGc::new(options.gc));

        let mut object_renderers: RendererMap = HashMap::new();
        object_renderers.insert(RendererKind::Shape, Box::new(ShapeRenderer::new()));
        object_renderers.insert(RendererKind::Sprite, Box::new(SpriteRenderer::new()));

        let mut renderer = Self {
            ctx,
            filters: FilterManager::new(),
            masks: MaskManager::new(options.enable_scissor),
            object_renderers,
            current: None,
            options,
            context_lost: false,
        };
        let device = &mut renderer.ctx.device;
        device.state.reset_to_default(device.backend.as_mut());
        renderer.init_context();
        log::debug!("lumen-render: renderer created on `{}` backend", renderer.ctx.device.backend.name());
        renderer
    }

    fn init_context(&mut self) {
        let device = &mut self.ctx.device;
        let units = device.backend.max_texture_units().min(self.options.max_texture_units).max(1);
        let root = device.root;
        if let Some(target) = device.targets.get_mut(root) {
            target.clear_color = self.options.background_color;
        }
        device.bind_render_target(root);
        self.ctx.textures.init_units(&mut self.ctx.device, units);
        self.init_plugins();
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn ctx(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut GpuContext {
        &mut self.ctx
    }

    pub fn filter_manager(&self) -> &FilterManager {
        &self.filters
    }

    pub fn mask_manager(&self) -> &MaskManager {
        &self.masks
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    pub fn context_id(&self) -> ContextId {
        self.ctx.context_id()
    }

    pub fn resolution(&self) -> f32 {
        self.ctx.device.resolution
    }

    /// Screen rectangle in world pixels.
    pub fn screen(&self) -> Rect {
        self.ctx.device.screen()
    }

    pub fn active_target(&self) -> RenderTargetKey {
        self.ctx.device.active_target
    }

    pub fn root_target(&self) -> RenderTargetKey {
        self.ctx.device.root
    }

    /// True from the first frame that saw the context lost until a successful
    /// [`restore_context`](Self::restore_context).
    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    // ── frame ─────────────────────────────────────────────────────────────

    /// Draws `node` into `target` (a render-target texture) or the screen.
    ///
    /// `clear` defaults to [`RendererOptions::clear_before_render`];
    /// `transform` is appended to the target's projection for this frame.
    pub fn render(
        &mut self,
        node: &mut dyn SceneNode,
        target: Option<TextureKey>,
        clear: Option<bool>,
        transform: Option<Matrix>,
    ) {
        if self.check_context_lost() {
            return;
        }

        self.ctx.textures.reset_location();
        node.update_transform();
        if !self.bind_render_texture(target, transform) {
            return;
        }

        if let Some(current) = self.current.and_then(|k| self.object_renderers.get_mut(&k)) {
            current.start(&mut self.ctx);
        }
        if clear.unwrap_or(self.options.clear_before_render) {
            self.clear(None);
        }

        node.render(self);
        if self.check_context_lost() {
            return;
        }

        self.flush();
        self.ctx.tick_gc();
        self.ctx.backend().submit(target.is_none());
    }

    fn bind_render_texture(&mut self, texture: Option<TextureKey>, transform: Option<Matrix>) -> bool {
        let key = match texture {
            Some(texture) => {
                let Some(key) = self.ctx.texture_target(texture) else {
                    log::warn!("lumen-render: render target texture is not available; frame skipped");
                    return false;
                };
                // A texture cannot be sampled while it is drawn into.
                self.ctx.unbind_texture(texture);
                key
            }
            None => self.ctx.device.root,
        };
        if let Some(target) = self.ctx.device.targets.get_mut(key) {
            target.transform = transform;
        }
        self.ctx.bind_render_target(key);
        true
    }

    /// Queues `cmd` on the object renderer of its kind.
    pub fn draw(&mut self, cmd: &DrawCmd) {
        if self.check_context_lost() {
            return;
        }
        let kind = cmd.kind();
        self.set_object_renderer(kind);
        if let Some(renderer) = self.object_renderers.get_mut(&kind) {
            renderer.render(&mut self.ctx, cmd);
        }
    }

    /// Makes `kind` the current object renderer, stopping the previous one.
    pub fn set_object_renderer(&mut self, kind: RendererKind) {
        if self.current == Some(kind) {
            return;
        }
        if let Some(previous) = self.current.and_then(|k| self.object_renderers.get_mut(&k)) {
            previous.stop(&mut self.ctx);
        }
        self.current = Some(kind);
        if let Some(next) = self.object_renderers.get_mut(&kind) {
            next.start(&mut self.ctx);
        }
    }

    /// Draws everything the current object renderer has queued.
    pub fn flush(&mut self) {
        if self.check_context_lost() {
            return;
        }
        if let Some(current) = self.current.and_then(|k| self.object_renderers.get_mut(&k)) {
            current.flush(&mut self.ctx);
        }
    }

    // ── filters / masks ───────────────────────────────────────────────────

    pub fn push_filter(&mut self, node: &dyn SceneNode, filters: Vec<Rc<dyn Filter>>) {
        if self.check_context_lost() {
            return;
        }
        self.flush();
        self.filters.push_filter(&mut self.ctx, node, filters);
    }

    pub fn pop_filter(&mut self) {
        if self.check_context_lost() {
            return;
        }
        self.flush();
        self.filters.pop_filter(&mut self.ctx);
    }

    /// Clips following draws by `mask`. Returns the strategy chosen, or None
    /// while the context is lost.
    pub fn push_mask(&mut self, mask: MaskShape) -> Option<MaskStrategy> {
        if self.check_context_lost() {
            return None;
        }
        self.flush();
        let renderers = &mut self.object_renderers;
        Some(self.masks.push_mask(&mut self.ctx, &mut self.filters, mask, &mut |ctx, shape| {
            draw_mask_shape(renderers, ctx, shape)
        }))
    }

    pub fn pop_mask(&mut self, mask: &MaskShape) {
        if self.check_context_lost() {
            return;
        }
        self.flush();
        let renderers = &mut self.object_renderers;
        self.masks.pop_mask(&mut self.ctx, &mut self.filters, mask, &mut |ctx, shape| {
            draw_mask_shape(renderers, ctx, shape)
        });
    }

    // ── textures ──────────────────────────────────────────────────────────

    pub fn create_texture(&mut self, texture: TextureResource) -> TextureKey {
        self.ctx.textures.insert(texture)
    }

    pub fn texture(&self, key: TextureKey) -> Option<&TextureResource> {
        self.ctx.textures.get(key)
    }

    /// Mutable access, e.g. to replace pixels; the next bind re-uploads.
    pub fn texture_mut(&mut self, key: TextureKey) -> Option<&mut TextureResource> {
        self.ctx.textures.get_mut(key)
    }

    /// Destroys the texture's device handle and forgets the texture.
    pub fn destroy_texture(&mut self, key: TextureKey) -> Option<TextureResource> {
        self.ctx.textures.remove(&mut self.ctx.device, key)
    }

    /// Binds `texture` and returns its unit. `force` binds to `unit` (or 0)
    /// even when the texture already sits on another unit.
    pub fn bind_texture(&mut self, texture: TextureKey, unit: Option<usize>, force: bool) -> Option<usize> {
        self.ctx.bind_texture(texture, unit, force)
    }

    pub fn unbind_texture(&mut self, texture: TextureKey) {
        self.ctx.unbind_texture(texture);
    }

    /// Destroys every render-target texture drawn by `node`'s subtree.
    pub fn unload(&mut self, node: &dyn SceneNode) {
        let ctx = &mut self.ctx;
        ctx.gc.unload(node, &mut ctx.textures, &mut ctx.device);
    }

    // ── targets ───────────────────────────────────────────────────────────

    /// Resizes the screen to `width` x `height` world pixels.
    pub fn resize(&mut self, width: f32, height: f32) {
        let device = &mut self.ctx.device;
        let resolution = device.resolution;
        device
            .backend
            .resize_drawing_buffer((width * resolution).round() as u32, (height * resolution).round() as u32);

        let root = device.root;
        if let Some(target) = device.targets.get_mut(root) {
            target.resize(device.backend.as_mut(), width, height);
        }
        if device.active_target == root {
            device.bind_render_target(root);
        }
        self.filters.on_resize(&mut self.ctx);
    }

    /// Clears the active target with `color`, or with its own clear color.
    pub fn clear(&mut self, color: Option<ColorRgba>) {
        let device = &mut self.ctx.device;
        if let Some(target) = device.targets.get(device.active_target) {
            target.clear(device.backend.as_mut(), color);
        }
    }

    /// Clears a render-target texture that already has a framebuffer.
    pub fn clear_render_texture(&mut self, texture: TextureKey, color: Option<ColorRgba>) {
        let context = self.ctx.context_id();
        let Some(key) = self.ctx.textures.get(texture).and_then(|t| t.gpu(context)).and_then(|g| g.target) else {
            return;
        };
        let device = &mut self.ctx.device;
        if let Some(target) = device.targets.get(key) {
            target.clear(device.backend.as_mut(), color);
        }
        let active = device.active().and_then(|t| t.framebuffer());
        device.backend.bind_framebuffer(active);
    }

    /// Extra transform applied from the next activation of the active target.
    pub fn set_transform(&mut self, transform: Matrix) {
        if let Some(target) = self.ctx.device.active_mut() {
            target.transform = Some(transform);
        }
    }

    /// Drops the current object renderer, empties every texture unit and puts
    /// the device back into its default state on the screen target.
    pub fn reset(&mut self) {
        if let Some(previous) = self.current.take().and_then(|k| self.object_renderers.get_mut(&k)) {
            previous.stop(&mut self.ctx);
        }
        for unit in 0..self.ctx.textures.unit_count() {
            self.ctx.textures.reset_unit(&mut self.ctx.device, unit);
        }
        let root = self.ctx.device.root;
        self.ctx.bind_render_target(root);
        let device = &mut self.ctx.device;
        device.state.reset_to_default(device.backend.as_mut());
    }

    // ── context ───────────────────────────────────────────────────────────

    fn check_context_lost(&mut self) -> bool {
        if !self.context_lost && self.ctx.device.backend.is_context_lost() {
            log::warn!("lumen-render: graphics context lost; drawing suspended until restore");
            self.context_lost = true;
        }
        self.context_lost
    }

    /// Recreates the device and every per-context object after a loss.
    ///
    /// Textures keep their data and upload again on their next bind.
    pub fn restore_context(&mut self) -> anyhow::Result<()> {
        self.ctx.backend().restore_context().context("restore graphics context")?;

        let next = self.ctx.context_id().next();
        self.ctx.textures.remove_all(&mut self.ctx.device);
        self.filters.destroy(&mut self.ctx, true);
        self.masks.reset();
        for renderer in self.object_renderers.values_mut() {
            renderer.destroy(&mut self.ctx, true);
        }
        self.current = None;

        self.ctx.device.reset_for_context(next);
        self.context_lost = false;
        self.init_context();
        log::debug!("lumen-render: context restored as #{}", next.get());
        Ok(())
    }

    /// Releases every device object owned by the renderer.
    pub fn destroy(mut self) {
        self.destroy_plugins();
        self.filters.destroy(&mut self.ctx, self.context_lost);
        self.ctx.textures.destroy_all(&mut self.ctx.device);
        log::debug!("lumen-render: renderer destroyed");
    }
}

impl Pluggable for Renderer {
    fn init_plugins(&mut self) {
        for renderer in self.object_renderers.values_mut() {
            if let Err(err) = renderer.context_change(&mut self.ctx) {
                log::error!("lumen-render: {:?} renderer unavailable: {err:#}", renderer.kind());
            }
        }
    }

    fn destroy_plugins(&mut self) {
        let lost = self.context_lost;
        for renderer in self.object_renderers.values_mut() {
            renderer.destroy(&mut self.ctx, lost);
        }
        self.current = None;
    }
}

/// Draws a stencil mask through the shape renderer, outside its batch.
fn draw_mask_shape(renderers: &mut RendererMap, ctx: &mut GpuContext, shape: &ShapeDraw) {
    if let Some(shapes) = renderers.get_mut(&RendererKind::Shape) {
        shapes.render(ctx, &DrawCmd::Shape(shape.clone()));
        shapes.flush(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Vec2;
    use crate::device::{DeviceCall, RecordingBackend, RecordingLog};
    use crate::render::filter::PassThroughFilter;
    use crate::render::texture_gc::GcOptions;
    use crate::scene::{Shape, SpriteDraw};

    fn renderer_with(options: RendererOptions) -> (Renderer, RecordingLog) {
        let backend = RecordingBackend::new(800, 600).with_texture_units(4);
        let log = backend.log();
        let renderer = Renderer::new(Box::new(backend), options);
        log.clear();
        (renderer, log)
    }

    fn renderer() -> (Renderer, RecordingLog) {
        renderer_with(RendererOptions::default())
    }

    struct FnNode<F> {
        bounds: Rect,
        draw: F,
    }

    impl<F: Fn(&mut Renderer)> SceneNode for FnNode<F> {
        fn render(&self, renderer: &mut Renderer) {
            (self.draw)(renderer)
        }

        fn bounds(&self) -> Rect {
            self.bounds
        }
    }

    fn node(draw: impl Fn(&mut Renderer)) -> FnNode<impl Fn(&mut Renderer)> {
        FnNode { bounds: Rect::sized(100.0, 100.0), draw }
    }

    /// A filtered region without content of its own.
    struct Area(Rect);

    impl SceneNode for Area {
        fn render(&self, _renderer: &mut Renderer) {}

        fn bounds(&self) -> Rect {
            self.0
        }
    }

    struct Padded(f32);

    impl Filter for Padded {
        fn padding(&self) -> f32 {
            self.0
        }
    }

    fn square() -> DrawCmd {
        DrawCmd::Shape(ShapeDraw::new(vec![Shape::rect(Rect::sized(10.0, 10.0), ColorRgba::white())], Matrix::IDENTITY))
    }

    fn draws(log: &RecordingLog) -> usize {
        log.count(|c| matches!(c, DeviceCall::Draw { .. }))
    }

    fn framebuffers(log: &RecordingLog) -> Vec<(u32, u32)> {
        log.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::CreateFramebuffer { width, height, .. } => Some((width, height)),
                _ => None,
            })
            .collect()
    }

    // ── frame ─────────────────────────────────────────────────────────────

    #[test]
    fn screen_frame_clears_draws_and_presents() {
        let (mut r, log) = renderer();
        r.render(&mut node(|r| r.draw(&square())), None, None, None);

        let calls = log.calls();
        assert!(calls.contains(&DeviceCall::Clear(ColorRgba::black())));
        assert_eq!(draws(&log), 1);
        assert_eq!(calls.last(), Some(&DeviceCall::Submit { present: true }));
    }

    #[test]
    fn clear_can_be_skipped_per_frame() {
        let (mut r, log) = renderer();
        r.render(&mut node(|_| {}), None, Some(false), None);
        assert_eq!(log.count(|c| matches!(c, DeviceCall::Clear(_))), 0);
    }

    #[test]
    fn switching_object_renderer_flushes() {
        let (mut r, log) = renderer();
        let texture = r.create_texture(TextureResource::solid([255, 255, 255, 255]));
        r.render(
            &mut node(move |r| {
                r.draw(&square());
                r.draw(&DrawCmd::Sprite(SpriteDraw::new(texture, Vec2::new(8.0, 8.0), Matrix::IDENTITY)));
                r.draw(&square());
            }),
            None,
            None,
            None,
        );
        assert_eq!(draws(&log), 3);
    }

    #[test]
    fn render_to_texture_uses_its_framebuffer() {
        let (mut r, log) = renderer();
        let texture = r.create_texture(TextureResource::render_target(64.0, 32.0, 1.0));
        r.render(&mut node(|r| r.draw(&square())), Some(texture), None, None);

        assert_eq!(framebuffers(&log), vec![(64, 32)]);
        assert_ne!(r.active_target(), r.root_target());
        assert_eq!(log.calls().last(), Some(&DeviceCall::Submit { present: false }));

        r.clear_render_texture(texture, Some(ColorRgba::white()));
        assert!(log.calls().contains(&DeviceCall::Clear(ColorRgba::white())));
    }

    // ── stacks ────────────────────────────────────────────────────────────

    #[test]
    fn nested_filters_and_masks_unwind_to_root() {
        let (mut r, _log) = renderer();
        r.render(
            &mut node(|r| {
                let rect = MaskShape::rect(Rect::new(0.0, 0.0, 50.0, 50.0), Matrix::IDENTITY);
                let rotated = MaskShape::rect(Rect::new(0.0, 0.0, 20.0, 20.0), Matrix::rotation(0.3));

                r.push_filter(&Area(Rect::new(10.0, 10.0, 100.0, 100.0)), vec![Rc::new(Padded(4.0))]);
                r.push_mask(rect.clone());
                r.push_mask(rotated.clone());
                r.draw(&square());
                r.pop_mask(&rotated);
                r.pop_mask(&rect);
                r.pop_filter();
            }),
            None,
            None,
            None,
        );

        assert_eq!(r.filter_manager().depth(r.ctx()), 0);
        assert_eq!(r.mask_manager().depth(), 0);
        assert_eq!(r.active_target(), r.root_target());
        assert!(r.ctx().device.scissor.is_none());
        assert_eq!(r.ctx().device.active().map(|t| t.stencil_depth()), Some(0));
        assert_eq!(r.ctx().device.state.depth(), 0);
        assert!(!r.filter_manager().pool().is_empty());
    }

    #[test]
    fn mask_routing_follows_shape_and_rotation() {
        let (mut r, _log) = renderer();
        let aligned = MaskShape::rect(Rect::new(0.0, 0.0, 40.0, 40.0), Matrix::translation(5.0, 5.0));
        assert_eq!(r.push_mask(aligned.clone()), Some(MaskStrategy::Scissor));
        r.pop_mask(&aligned);

        let rotated = MaskShape::rect(Rect::new(0.0, 0.0, 40.0, 40.0), Matrix::rotation(std::f32::consts::FRAC_PI_4));
        assert_eq!(r.push_mask(rotated.clone()), Some(MaskStrategy::Stencil));
        r.pop_mask(&rotated);
    }

    #[test]
    fn scissor_option_disables_rect_masks() {
        let (mut r, _log) = renderer_with(RendererOptions { enable_scissor: false, ..RendererOptions::default() });
        let aligned = MaskShape::rect(Rect::new(0.0, 0.0, 40.0, 40.0), Matrix::IDENTITY);
        assert_eq!(r.push_mask(aligned.clone()), Some(MaskStrategy::Stencil));
        r.pop_mask(&aligned);
    }

    #[test]
    fn projection_sign_differs_between_screen_and_offscreen() {
        let (mut r, _log) = renderer();
        let root_d = r.ctx().device.active().map(|t| t.projection().d).unwrap_or_default();
        assert!(root_d < 0.0);

        r.push_filter(&Area(Rect::sized(64.0, 64.0)), vec![Rc::new(PassThroughFilter)]);
        let offscreen_d = r.ctx().device.active().map(|t| t.projection().d).unwrap_or_default();
        assert!(offscreen_d > 0.0);
        r.pop_filter();
    }

    // ── filters ───────────────────────────────────────────────────────────

    #[test]
    fn padded_filter_on_100px_node_uses_128px_target() {
        let (mut r, log) = renderer();
        r.render(
            &mut node(|r| {
                r.push_filter(&Area(Rect::new(50.0, 50.0, 100.0, 100.0)), vec![Rc::new(Padded(4.0))]);
                r.draw(&square());
                r.pop_filter();
            }),
            None,
            None,
            None,
        );
        assert_eq!(framebuffers(&log), vec![(128, 128)]);
        // Content, then the filter quad into the screen.
        assert_eq!(draws(&log), 2);
    }

    #[test]
    fn pooled_target_is_reused_across_frames() {
        let (mut r, log) = renderer();
        let mut scene = node(|r| {
            r.push_filter(&Area(Rect::sized(256.0, 256.0)), vec![Rc::new(PassThroughFilter)]);
            r.pop_filter();
        });
        r.render(&mut scene, None, None, None);
        r.render(&mut scene, None, None, None);

        assert_eq!(framebuffers(&log), vec![(256, 256)]);
        assert_eq!(r.filter_manager().pool().len(), 1);
    }

    #[test]
    fn filter_chain_ping_pongs_through_a_second_target() {
        let (mut r, log) = renderer();
        r.push_filter(
            &Area(Rect::sized(60.0, 60.0)),
            vec![Rc::new(PassThroughFilter), Rc::new(PassThroughFilter), Rc::new(PassThroughFilter)],
        );
        r.pop_filter();

        assert_eq!(framebuffers(&log), vec![(64, 64), (64, 64)]);
        assert_eq!(draws(&log), 3);
        assert_eq!(r.filter_manager().pool().len(), 2);
        assert_eq!(r.active_target(), r.root_target());
    }

    #[test]
    fn failed_filter_program_skips_the_pass() {
        let (mut r, log) = renderer();
        log.fail_programs(true);
        let mut scene = node(|r| {
            r.push_filter(&Area(Rect::sized(32.0, 32.0)), vec![Rc::new(PassThroughFilter)]);
            r.pop_filter();
        });
        r.render(&mut scene, None, None, None);
        r.render(&mut scene, None, None, None);

        assert_eq!(draws(&log), 0);
        assert_eq!(r.active_target(), r.root_target());
        assert_eq!(r.filter_manager().depth(r.ctx()), 0);
    }

    // ── textures ──────────────────────────────────────────────────────────

    #[test]
    fn idle_textures_are_collected() {
        let gc = GcOptions { idle_threshold: 2, scan_interval: 1, ..GcOptions::default() };
        let (mut r, log) = renderer_with(RendererOptions { gc, ..RendererOptions::default() });
        let texture = r.create_texture(TextureResource::solid([255, 0, 0, 255]));
        let sprite = DrawCmd::Sprite(SpriteDraw::new(texture, Vec2::new(8.0, 8.0), Matrix::IDENTITY));

        r.render(&mut node(|r| r.draw(&sprite)), None, None, None);
        assert_eq!(r.ctx().textures.managed(), &[texture]);

        for _ in 0..4 {
            r.render(&mut node(|_| {}), None, None, None);
            let frame = r.ctx().gc.frame_count();
            for key in r.ctx().textures.managed() {
                let touched = r.texture(*key).map(|t| t.touched()).unwrap_or_default();
                assert!(frame - touched <= 2);
            }
        }
        assert!(r.ctx().textures.managed().is_empty());
        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteTexture(_))), 1);
        assert!(r.texture(texture).is_some());
    }

    #[test]
    fn destroyed_texture_is_forgotten() {
        let (mut r, log) = renderer();
        let texture = r.create_texture(TextureResource::solid([0, 0, 255, 255]));
        assert!(r.bind_texture(texture, None, false).is_some());
        assert!(r.destroy_texture(texture).is_some());
        assert!(r.texture(texture).is_none());
        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteTexture(_))), 1);
    }

    // ── context loss ──────────────────────────────────────────────────────

    #[test]
    fn lost_context_suspends_until_restore() {
        let (mut r, log) = renderer();
        let texture = r.create_texture(TextureResource::from_pixels(2, 2, vec![255; 16]));
        let sprite = DrawCmd::Sprite(SpriteDraw::new(texture, Vec2::new(8.0, 8.0), Matrix::IDENTITY));
        r.render(&mut node(|r| r.draw(&sprite)), None, None, None);
        let uploads = || log.count(|c| matches!(c, DeviceCall::UploadTexture { width: 2, .. }));
        assert_eq!(uploads(), 1);

        log.lose_context();
        log.clear();
        r.render(&mut node(|r| r.draw(&sprite)), None, None, None);
        assert!(r.is_context_lost());
        assert!(log.calls().is_empty());

        r.restore_context().unwrap();
        assert!(!r.is_context_lost());
        assert_eq!(r.context_id(), ContextId::FIRST.next());
        assert!(log.count(|c| matches!(c, DeviceCall::CreateProgram(_))) >= 2);

        r.render(&mut node(|r| r.draw(&sprite)), None, None, None);
        assert_eq!(uploads(), 1);
        assert_eq!(draws(&log), 1);
    }

    #[test]
    fn context_lost_mid_frame_stops_the_frame() {
        let gc = GcOptions { idle_threshold: 0, scan_interval: 1, ..GcOptions::default() };
        let (mut r, log) = renderer_with(RendererOptions { gc, ..RendererOptions::default() });
        let texture = r.create_texture(TextureResource::solid([255, 255, 255, 255]));
        let sprite = DrawCmd::Sprite(SpriteDraw::new(texture, Vec2::new(8.0, 8.0), Matrix::IDENTITY));
        let frames = r.ctx().gc.frame_count();

        r.render(
            &mut node(|r| {
                r.draw(&sprite);
                log.lose_context();
                log.clear();
            }),
            None,
            None,
            None,
        );

        assert!(r.is_context_lost());
        assert!(log.calls().is_empty());
        assert_eq!(r.ctx().gc.frame_count(), frames);
    }

    #[test]
    fn restore_rebuilds_filter_pool() {
        let (mut r, log) = renderer();
        r.push_filter(&Area(Rect::sized(30.0, 30.0)), vec![Rc::new(PassThroughFilter)]);
        r.pop_filter();
        assert_eq!(r.filter_manager().pool().len(), 1);

        log.lose_context();
        r.restore_context().unwrap();
        assert!(r.filter_manager().pool().is_empty());
        assert_eq!(r.ctx().device.targets.len(), 1);
    }

    // ── resize / reset ────────────────────────────────────────────────────

    #[test]
    fn resize_updates_screen() {
        let (mut r, log) = renderer();
        r.resize(400.0, 300.0);
        assert_eq!(r.screen(), Rect::sized(400.0, 300.0));
        assert!(log.calls().contains(&DeviceCall::ResizeDrawingBuffer { width: 400, height: 300 }));
    }

    #[test]
    fn reset_returns_to_screen_with_empty_units() {
        let (mut r, _log) = renderer();
        let texture = r.create_texture(TextureResource::solid([1, 2, 3, 4]));
        r.bind_texture(texture, Some(2), true);
        r.push_filter(&Area(Rect::sized(16.0, 16.0)), vec![Rc::new(PassThroughFilter)]);
        r.pop_filter();

        r.reset();
        assert!(r.ctx().textures.bound_units().iter().all(Option::is_none));
        assert_eq!(r.active_target(), r.root_target());
    }
}
