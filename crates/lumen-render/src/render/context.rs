use crate::coords::Rect;
use crate::device::{Backend, Capability, ContextId, DeviceRect};

use super::mask::StencilManager;
use super::state::StateTracker;
use super::target::{RenderTarget, RenderTargetKey, TargetArena};
use super::texture::TextureKey;
use super::texture_gc::TextureGc;
use super::texture_manager::TextureManager;

/// Scissor rectangle installed by a mask.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScissorMask {
    pub target: RenderTargetKey,
    pub rect: DeviceRect,
}

/// The device and every per-context object drawn through it.
pub struct DeviceContext {
    pub backend: Box<dyn Backend>,
    pub context_id: ContextId,
    pub state: StateTracker,
    pub targets: TargetArena,
    pub root: RenderTargetKey,
    pub active_target: RenderTargetKey,
    pub scissor: Option<ScissorMask>,
    pub resolution: f32,
}

impl DeviceContext {
    /// Wraps `backend` and creates the root target over its drawing buffer.
    pub fn new(mut backend: Box<dyn Backend>, resolution: f32) -> Self {
        let resolution = if resolution > 0.0 { resolution } else { 1.0 };
        let mut targets = TargetArena::with_key();
        let root = targets.insert(root_target(backend.as_mut(), resolution));
        Self {
            backend,
            context_id: ContextId::FIRST,
            state: StateTracker::new(),
            targets,
            root,
            active_target: root,
            scissor: None,
            resolution,
        }
    }

    #[inline]
    pub fn backend(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    pub fn active(&self) -> Option<&RenderTarget> {
        self.targets.get(self.active_target)
    }

    pub fn active_mut(&mut self) -> Option<&mut RenderTarget> {
        self.targets.get_mut(self.active_target)
    }

    pub fn root_target(&self) -> Option<&RenderTarget> {
        self.targets.get(self.root)
    }

    /// Makes `key` the active target and installs its stencil mask stack.
    pub fn bind_render_target(&mut self, key: RenderTargetKey) {
        let Some(target) = self.targets.get_mut(key) else {
            log::warn!("lumen-render: bind of unknown render target ignored");
            return;
        };
        let backend = self.backend.as_mut();
        target.activate(backend);
        StencilManager::set_mask_stack(backend, target.stencil_depth());
        self.active_target = key;
    }

    /// Restores the mask scissor after a target switch disabled it.
    pub(crate) fn reapply_scissor(&mut self, key: RenderTargetKey) {
        if let Some(scissor) = self.scissor
            && scissor.target == key
        {
            self.backend.set_enabled(Capability::ScissorTest, true);
            self.backend.set_scissor(scissor.rect);
        }
    }

    /// Screen rectangle in world pixels.
    pub fn screen(&self) -> Rect {
        self.root_target().map(|t| t.default_frame()).unwrap_or_default()
    }

    /// Forgets every device object after a context loss and rebuilds the root
    /// for `context`.
    pub(crate) fn reset_for_context(&mut self, context: ContextId) {
        self.context_id = context;
        self.targets.clear();
        self.root = self.targets.insert(root_target(self.backend.as_mut(), self.resolution));
        self.active_target = self.root;
        self.scissor = None;
        self.state = StateTracker::new();
        self.state.reset_to_default(self.backend.as_mut());
    }
}

fn root_target(backend: &mut dyn Backend, resolution: f32) -> RenderTarget {
    let (w, h) = backend.drawing_buffer_size();
    RenderTarget::new(backend, w as f32 / resolution, h as f32 / resolution, resolution, true)
}

/// Everything a manager needs to issue device work: the device context, the
/// texture manager and the garbage collector's clock.
pub struct GpuContext {
    pub device: DeviceContext,
    pub textures: TextureManager,
    pub gc: TextureGc,
}

impl GpuContext {
    pub fn new(device: DeviceContext, textures: TextureManager, gc: TextureGc) -> Self {
        Self { device, textures, gc }
    }

    #[inline]
    pub fn backend(&mut self) -> &mut dyn Backend {
        self.device.backend()
    }

    #[inline]
    pub fn context_id(&self) -> ContextId {
        self.device.context_id
    }

    #[inline]
    pub fn bind_render_target(&mut self, key: RenderTargetKey) {
        self.device.bind_render_target(key);
    }

    pub fn bind_texture(&mut self, key: TextureKey, unit: Option<usize>, force: bool) -> Option<usize> {
        let frame = self.gc.frame_count();
        self.textures.bind(&mut self.device, frame, key, unit, force)
    }

    pub fn unbind_texture(&mut self, key: TextureKey) {
        self.textures.unbind(&mut self.device, key);
    }

    pub fn update_texture(&mut self, key: TextureKey) {
        self.textures.update(&mut self.device, key, None);
    }

    pub fn destroy_texture(&mut self, key: TextureKey, skip_remove: bool) {
        self.textures.destroy(&mut self.device, key, skip_remove);
    }

    /// Backing render target of a render-target texture, created on demand.
    pub fn texture_target(&mut self, key: TextureKey) -> Option<RenderTargetKey> {
        let context = self.device.context_id;
        let backing = |textures: &TextureManager| textures.get(key)?.gpu(context)?.target;
        if let Some(target) = backing(&self.textures) {
            return Some(target);
        }
        self.textures.update(&mut self.device, key, None)?;
        backing(&self.textures)
    }

    /// Advances the collector one frame, sweeping when due.
    pub fn tick_gc(&mut self) {
        if self.gc.tick() {
            self.gc.sweep(&mut self.textures, &mut self.device);
        }
    }
}
