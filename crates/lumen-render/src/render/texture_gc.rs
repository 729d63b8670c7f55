use crate::scene::SceneNode;

use super::context::DeviceContext;
use super::texture_manager::TextureManager;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum GcMode {
    /// Sweeps on its own every `scan_interval` frames.
    #[default]
    Automatic,
    /// Only sweeps when asked to.
    Manual,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GcOptions {
    pub mode: GcMode,
    /// Frames a texture may stay unbound before its handle is evicted.
    pub idle_threshold: u64,
    pub scan_interval: u64,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self { mode: GcMode::Automatic, idle_threshold: 3600, scan_interval: 600 }
    }
}

/// Evicts device handles of textures that have not been bound for a while.
///
/// Only handles are released; the [`TextureResource`](super::TextureResource)
/// stays and is uploaded again on its next bind.
#[derive(Debug, Clone)]
pub struct TextureGc {
    count: u64,
    check_count: u64,
    pub mode: GcMode,
    pub idle_threshold: u64,
    pub scan_interval: u64,
}

impl Default for TextureGc {
    fn default() -> Self {
        Self::new(GcOptions::default())
    }
}

impl TextureGc {
    pub fn new(options: GcOptions) -> Self {
        Self {
            count: 0,
            check_count: 0,
            mode: options.mode,
            idle_threshold: options.idle_threshold,
            scan_interval: options.scan_interval.max(1),
        }
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.count
    }

    /// Advances one frame. Returns true when an automatic sweep is due.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.mode == GcMode::Manual {
            return false;
        }
        self.check_count += 1;
        if self.check_count >= self.scan_interval {
            self.check_count = 0;
            return true;
        }
        false
    }

    /// Destroys every idle plain texture. Render-target textures are never
    /// collected here; see [`unload`](Self::unload).
    pub fn sweep(&self, textures: &mut TextureManager, device: &mut DeviceContext) {
        let evicted = textures.evict_managed(device, |t| {
            !t.is_render_target() && self.count.saturating_sub(t.touched()) > self.idle_threshold
        });
        if evicted > 0 {
            log::debug!("lumen-render: texture gc evicted {evicted} handle(s)");
        }
    }

    /// Destroys the render-target textures drawn by `node` and its descendants.
    pub fn unload(&self, node: &dyn SceneNode, textures: &mut TextureManager, device: &mut DeviceContext) {
        if let Some(key) = node.texture()
            && textures.get(key).is_some_and(|t| t.is_render_target())
        {
            textures.destroy(device, key, false);
        }
        node.visit_children(&mut |child| self.unload(child, textures, device));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Rect;
    use crate::device::{DeviceCall, RecordingBackend, RecordingLog};
    use crate::render::texture::{TextureKey, TextureResource};

    fn setup() -> (TextureManager, DeviceContext, RecordingLog) {
        let backend = RecordingBackend::new(32, 32);
        let log = backend.log();
        let mut device = DeviceContext::new(Box::new(backend), 1.0);
        let mut textures = TextureManager::new();
        textures.init_units(&mut device, 4);
        (textures, device, log)
    }

    fn pixels() -> TextureResource {
        TextureResource::from_pixels(1, 1, vec![255; 4])
    }

    // ── tick ──────────────────────────────────────────────────────────────

    #[test]
    fn automatic_mode_sweeps_every_interval() {
        let mut gc = TextureGc::new(GcOptions { scan_interval: 3, ..GcOptions::default() });
        let due: Vec<bool> = (0..7).map(|_| gc.tick()).collect();
        assert_eq!(due, vec![false, false, true, false, false, true, false]);
        assert_eq!(gc.frame_count(), 7);
    }

    #[test]
    fn manual_mode_only_counts() {
        let mut gc = TextureGc::new(GcOptions { mode: GcMode::Manual, scan_interval: 1, ..GcOptions::default() });
        assert!(!(0..10).any(|_| gc.tick()));
        assert_eq!(gc.frame_count(), 10);
    }

    // ── sweep ─────────────────────────────────────────────────────────────

    #[test]
    fn sweep_evicts_only_textures_idle_past_threshold() {
        let (mut textures, mut device, log) = setup();
        let mut gc = TextureGc::new(GcOptions { idle_threshold: 10, scan_interval: 1000, ..GcOptions::default() });

        let stale = textures.insert(pixels());
        let fresh = textures.insert(pixels());
        let target = textures.insert(TextureResource::render_target(4.0, 4.0, 1.0));
        textures.bind(&mut device, gc.frame_count(), stale, None, false);
        textures.bind(&mut device, gc.frame_count(), target, None, false);

        for _ in 0..11 {
            gc.tick();
        }
        textures.bind(&mut device, gc.frame_count(), fresh, None, false);
        log.clear();

        gc.sweep(&mut textures, &mut device);

        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteTexture(_))), 1);
        assert!(!textures.managed().contains(&stale));
        assert!(textures.managed().contains(&fresh));
        assert!(textures.managed().contains(&target));

        let context = device.context_id;
        for key in textures.managed() {
            let t = textures.get(*key).unwrap();
            assert!(t.gpu(context).is_some());
            assert!(t.is_render_target() || gc.frame_count() - t.touched() <= gc.idle_threshold);
        }
        // Evicted textures keep their data and upload again on demand.
        assert!(textures.contains(stale));
    }

    #[test]
    fn sweep_compacts_interleaved_idle_textures() {
        let (mut textures, mut device, log) = setup();
        let mut gc = TextureGc::new(GcOptions { idle_threshold: 1, ..GcOptions::default() });
        let keys: Vec<TextureKey> = (0..4).map(|_| textures.insert(pixels())).collect();
        for key in &keys {
            textures.bind(&mut device, 0, *key, None, false);
        }
        for _ in 0..3 {
            gc.tick();
        }
        textures.bind(&mut device, gc.frame_count(), keys[1], None, false);
        textures.bind(&mut device, gc.frame_count(), keys[3], None, false);
        log.clear();

        gc.sweep(&mut textures, &mut device);

        let mut kept = textures.managed().to_vec();
        kept.sort();
        let mut expected = vec![keys[1], keys[3]];
        expected.sort();
        assert_eq!(kept, expected);
        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteTexture(_))), 2);
    }

    #[test]
    fn sweep_at_threshold_keeps_the_texture() {
        let (mut textures, mut device, _log) = setup();
        let mut gc = TextureGc::new(GcOptions { idle_threshold: 5, ..GcOptions::default() });
        let key = textures.insert(pixels());
        textures.bind(&mut device, 0, key, None, false);
        for _ in 0..5 {
            gc.tick();
        }
        gc.sweep(&mut textures, &mut device);
        assert_eq!(textures.managed(), &[key]);
    }

    // ── unload ────────────────────────────────────────────────────────────

    struct Node {
        texture: Option<TextureKey>,
        children: Vec<Node>,
    }

    impl SceneNode for Node {
        fn render(&self, _renderer: &mut crate::render::Renderer) {}

        fn bounds(&self) -> Rect {
            Rect::default()
        }

        fn texture(&self) -> Option<TextureKey> {
            self.texture
        }

        fn visit_children(&self, visit: &mut dyn FnMut(&dyn SceneNode)) {
            for child in &self.children {
                visit(child);
            }
        }
    }

    #[test]
    fn unload_destroys_render_targets_in_the_subtree() {
        let (mut textures, mut device, _log) = setup();
        let gc = TextureGc::default();
        let plain = textures.insert(pixels());
        let rt = textures.insert(TextureResource::render_target(8.0, 8.0, 1.0));
        textures.bind(&mut device, 0, plain, None, false);
        textures.bind(&mut device, 0, rt, None, false);

        let tree = Node {
            texture: Some(plain),
            children: vec![Node { texture: Some(rt), children: Vec::new() }],
        };
        gc.unload(&tree, &mut textures, &mut device);

        assert_eq!(textures.managed(), &[plain]);
        assert!(textures.get(rt).and_then(|t| t.gpu(device.context_id)).is_none());
        assert_eq!(device.targets.len(), 1);
    }
}
