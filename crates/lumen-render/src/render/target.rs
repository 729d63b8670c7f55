use slotmap::{new_key_type, SlotMap};

use crate::coords::{ColorRgba, Matrix, Rect, Vec2};
use crate::device::{Backend, Capability, DeviceRect, FramebufferHandle, TextureHandle};
use crate::scene::MaskShape;

use super::filter::{FilterState, PoolKey};

new_key_type! {
    /// Stable id of a [`RenderTarget`]. Pool identity is key identity.
    pub struct RenderTargetKey;
}

pub type TargetArena = SlotMap<RenderTargetKey, RenderTarget>;

/// A destination for draw calls: an offscreen framebuffer or the root surface.
///
/// Frames are in world pixels. `destination_frame` is the area of the target
/// being drawn into, `source_frame` the world-space area mapped onto it.
#[derive(Debug)]
pub struct RenderTarget {
    framebuffer: Option<FramebufferHandle>,
    size: Vec2,
    resolution: f32,
    default_frame: Rect,
    destination: Option<Rect>,
    source: Option<Rect>,
    projection: Matrix,
    /// Extra transform appended to the projection on activation.
    pub transform: Option<Matrix>,
    pub clear_color: ColorRgba,
    root: bool,
    stencil_attached: bool,

    pub(crate) stencil_mask_stack: Vec<MaskShape>,
    pub(crate) filter_stack: Vec<FilterState>,
    pub(crate) pool_key: Option<PoolKey>,
}

impl RenderTarget {
    /// Creates a target of `width` x `height` world pixels.
    ///
    /// Offscreen targets allocate a framebuffer of the size scaled by
    /// `resolution`; the root target draws into the drawing buffer.
    pub fn new(backend: &mut dyn Backend, width: f32, height: f32, resolution: f32, root: bool) -> Self {
        let width = width.trunc().max(1.0);
        let height = height.trunc().max(1.0);
        let resolution = if resolution > 0.0 { resolution } else { 1.0 };

        let framebuffer = (!root).then(|| {
            let (w, h) = scaled_size(width, height, resolution);
            backend.create_framebuffer(w, h)
        });

        let mut target = Self {
            framebuffer,
            size: Vec2::new(width, height),
            resolution,
            default_frame: Rect::sized(width, height),
            destination: None,
            source: None,
            projection: Matrix::IDENTITY,
            transform: None,
            clear_color: ColorRgba::transparent(),
            root,
            stencil_attached: false,
            stencil_mask_stack: Vec::new(),
            filter_stack: Vec::new(),
            pool_key: None,
        };
        target.projection = target.calculate_projection(target.default_frame, None);
        target
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.root
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    #[inline]
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    #[inline]
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    #[inline]
    pub fn default_frame(&self) -> Rect {
        self.default_frame
    }

    pub fn destination_frame(&self) -> Rect {
        self.destination.unwrap_or(self.default_frame)
    }

    pub fn source_frame(&self) -> Rect {
        self.source.unwrap_or_else(|| self.destination_frame())
    }

    #[inline]
    pub fn projection(&self) -> Matrix {
        self.projection
    }

    #[inline]
    pub fn pool_key(&self) -> Option<PoolKey> {
        self.pool_key
    }

    pub fn stencil_depth(&self) -> usize {
        self.stencil_mask_stack.len()
    }

    pub fn filter_depth(&self) -> usize {
        self.filter_stack.len()
    }

    /// Color texture of an offscreen target.
    pub fn texture(&self, backend: &dyn Backend) -> Option<TextureHandle> {
        self.framebuffer.and_then(|fb| backend.framebuffer_texture(fb))
    }

    /// Sets the frames. A missing destination keeps the current one; a missing
    /// source keeps the current one or follows the destination.
    pub fn set_frame(&mut self, destination: Option<Rect>, source: Option<Rect>) {
        if destination.is_some() {
            self.destination = destination;
        }
        if source.is_some() {
            self.source = source;
        }
    }

    /// Makes this target the destination of following draws.
    pub fn activate(&mut self, backend: &mut dyn Backend) {
        backend.bind_framebuffer(self.framebuffer);

        let destination = self.destination_frame();
        let source = self.source_frame();
        self.projection = self.calculate_projection(destination, Some(source));
        if let Some(transform) = self.transform {
            self.projection.append(&transform);
        }
        backend.set_projection(&self.projection);

        let rect = self.device_rect(destination);
        if destination != source {
            backend.set_enabled(Capability::ScissorTest, true);
            backend.set_scissor(rect);
        } else {
            backend.set_enabled(Capability::ScissorTest, false);
        }
        backend.set_viewport(rect);
    }

    /// Projection mapping `source` onto clip space for a target of `destination` size.
    ///
    /// The root target flips the vertical axis since the drawing buffer's origin
    /// is at the bottom-left while world space grows downward.
    pub fn calculate_projection(&self, destination: Rect, source: Option<Rect>) -> Matrix {
        let source = source.unwrap_or(destination);
        let a = 2.0 / destination.width();
        if self.root {
            let d = -2.0 / destination.height();
            Matrix::new(a, 0.0, 0.0, d, -1.0 - source.x() * a, 1.0 - source.y() * d)
        } else {
            let d = 2.0 / destination.height();
            Matrix::new(a, 0.0, 0.0, d, -1.0 - source.x() * a, -1.0 - source.y() * d)
        }
    }

    /// Resizes the target to `width` x `height` world pixels.
    pub fn resize(&mut self, backend: &mut dyn Backend, width: f32, height: f32) {
        let width = width.trunc().max(1.0);
        let height = height.trunc().max(1.0);
        if self.size.x == width && self.size.y == height {
            return;
        }

        self.size = Vec2::new(width, height);
        self.default_frame.size = self.size;
        if let Some(fb) = self.framebuffer {
            let (w, h) = scaled_size(width, height, self.resolution);
            backend.resize_framebuffer(fb, w, h);
        }
        self.projection = self.calculate_projection(self.destination_frame(), None);
    }

    /// Overwrites the logical size and resolution of a pooled target whose
    /// framebuffer is already large enough. Frames fall back to the default.
    pub(crate) fn reuse_as(&mut self, width: f32, height: f32, resolution: f32) {
        self.resolution = resolution;
        self.size = Vec2::new(width, height);
        self.default_frame = Rect::sized(width, height);
        self.destination = None;
        self.source = None;
        self.transform = None;
    }

    /// Clears the target with `color`, or with its own clear color.
    pub fn clear(&self, backend: &mut dyn Backend, color: Option<ColorRgba>) {
        backend.bind_framebuffer(self.framebuffer);
        backend.clear(color.unwrap_or(self.clear_color));
    }

    /// Lazily gives an offscreen target a stencil attachment.
    pub fn attach_stencil(&mut self, backend: &mut dyn Backend) {
        if self.stencil_attached {
            return;
        }
        if let Some(fb) = self.framebuffer {
            backend.enable_stencil(fb);
            self.stencil_attached = true;
        }
    }

    pub fn destroy(self, backend: &mut dyn Backend) {
        if let Some(fb) = self.framebuffer {
            backend.delete_framebuffer(fb);
        }
    }

    /// World rectangle scaled into device pixels of this target.
    pub(crate) fn device_rect(&self, r: Rect) -> DeviceRect {
        let res = self.resolution;
        DeviceRect::new(
            (r.x() * res) as i32,
            (r.y() * res) as i32,
            (r.width() * res).max(0.0) as u32,
            (r.height() * res).max(0.0) as u32,
        )
    }
}

fn scaled_size(width: f32, height: f32, resolution: f32) -> (u32, u32) {
    (
        (width * resolution).max(1.0) as u32,
        (height * resolution).max(1.0) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, RecordingBackend};

    // ── projection ────────────────────────────────────────────────────────

    #[test]
    fn root_and_offscreen_projections_flip_vertical_sign() {
        let mut backend = RecordingBackend::new(800, 600);
        let root = RenderTarget::new(&mut backend, 800.0, 600.0, 1.0, true);
        let offscreen = RenderTarget::new(&mut backend, 800.0, 600.0, 1.0, false);

        let frame = Rect::sized(800.0, 600.0);
        let r = root.calculate_projection(frame, None);
        let o = offscreen.calculate_projection(frame, None);

        assert!(r.d < 0.0 && o.d > 0.0);
        assert_eq!(r.d, -o.d);
        assert_eq!(r.a, o.a);
    }

    #[test]
    fn offscreen_projection_maps_source_to_clip_corners() {
        let mut backend = RecordingBackend::new(64, 64);
        let target = RenderTarget::new(&mut backend, 100.0, 100.0, 1.0, false);
        let m = target.calculate_projection(Rect::sized(100.0, 50.0), Some(Rect::new(20.0, 30.0, 100.0, 50.0)));

        let close = |p: Vec2, x: f32, y: f32| (p.x - x).abs() < 1e-5 && (p.y - y).abs() < 1e-5;
        assert!(close(m.apply(Vec2::new(20.0, 30.0)), -1.0, -1.0));
        assert!(close(m.apply(Vec2::new(120.0, 80.0)), 1.0, 1.0));
    }

    // ── frames ────────────────────────────────────────────────────────────

    #[test]
    fn set_frame_falls_back_to_current_then_default() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut target = RenderTarget::new(&mut backend, 64.0, 64.0, 1.0, false);
        assert_eq!(target.destination_frame(), Rect::sized(64.0, 64.0));
        assert_eq!(target.source_frame(), Rect::sized(64.0, 64.0));

        let dest = Rect::sized(32.0, 32.0);
        target.set_frame(Some(dest), None);
        assert_eq!(target.destination_frame(), dest);
        assert_eq!(target.source_frame(), dest);

        let src = Rect::new(5.0, 5.0, 32.0, 32.0);
        target.set_frame(None, Some(src));
        assert_eq!(target.destination_frame(), dest);
        assert_eq!(target.source_frame(), src);
    }

    #[test]
    fn activate_scissors_when_frames_differ() {
        let mut backend = RecordingBackend::new(64, 64);
        let log = backend.log();
        let mut target = RenderTarget::new(&mut backend, 128.0, 128.0, 2.0, false);
        target.set_frame(Some(Rect::sized(50.0, 40.0)), Some(Rect::new(10.0, 10.0, 50.0, 40.0)));
        log.clear();

        target.activate(&mut backend);
        let calls = log.calls();
        assert!(calls.contains(&DeviceCall::SetEnabled(Capability::ScissorTest, true)));
        assert!(calls.contains(&DeviceCall::SetViewport(DeviceRect::new(0, 0, 100, 80))));
    }

    #[test]
    fn activate_without_frames_disables_scissor() {
        let mut backend = RecordingBackend::new(64, 64);
        let log = backend.log();
        let mut root = RenderTarget::new(&mut backend, 64.0, 64.0, 1.0, true);
        root.activate(&mut backend);
        assert!(log.calls().contains(&DeviceCall::SetEnabled(Capability::ScissorTest, false)));
        assert!(log.calls().contains(&DeviceCall::BindFramebuffer(None)));
    }

    // ── resize / stencil ──────────────────────────────────────────────────

    #[test]
    fn resize_is_noop_when_unchanged_and_scales_framebuffer() {
        let mut backend = RecordingBackend::new(64, 64);
        let log = backend.log();
        let mut target = RenderTarget::new(&mut backend, 10.0, 10.0, 2.0, false);
        let fb = target.framebuffer().unwrap();
        assert_eq!(log.framebuffer(fb).map(|f| (f.width, f.height)), Some((20, 20)));

        log.clear();
        target.resize(&mut backend, 10.0, 10.0);
        assert!(log.calls().is_empty());

        target.resize(&mut backend, 30.0, 15.0);
        assert_eq!(log.framebuffer(fb).map(|f| (f.width, f.height)), Some((60, 30)));
        assert_eq!(target.default_frame(), Rect::sized(30.0, 15.0));
    }

    #[test]
    fn root_never_attaches_stencil() {
        let mut backend = RecordingBackend::new(64, 64);
        let log = backend.log();
        let mut root = RenderTarget::new(&mut backend, 64.0, 64.0, 1.0, true);
        root.attach_stencil(&mut backend);

        let mut offscreen = RenderTarget::new(&mut backend, 64.0, 64.0, 1.0, false);
        offscreen.attach_stencil(&mut backend);
        offscreen.attach_stencil(&mut backend);

        assert_eq!(log.count(|c| matches!(c, DeviceCall::EnableStencil(_))), 1);
    }
}
