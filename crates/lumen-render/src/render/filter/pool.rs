use std::collections::HashMap;

use crate::render::context::DeviceContext;
use crate::render::target::{RenderTarget, RenderTargetKey};

/// Bucket of interchangeable pooled targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PoolKey {
    /// Power-of-two device size packed as `w << 16 | h`.
    Sized(u32),
    /// Exactly the drawing-buffer size; dropped whenever the screen resizes.
    Screen,
}

impl PoolKey {
    /// Key and framebuffer size for a request of `width` x `height` device pixels.
    pub fn for_request(width: u32, height: u32, screen: (u32, u32)) -> (PoolKey, u32, u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == screen {
            return (PoolKey::Screen, width, height);
        }
        let (w, h) = (width.next_power_of_two(), height.next_power_of_two());
        (PoolKey::Sized(((w & 0xFFFF) << 16) | (h & 0xFFFF)), w, h)
    }
}

/// Offscreen targets kept around between filter passes.
///
/// A target handed out is in no list; it goes back with [`release`](Self::release)
/// once no filter state refers to it.
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    lists: HashMap<PoolKey, Vec<RenderTargetKey>>,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets currently waiting in the pool.
    pub fn len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands out a target at least `min_width` x `min_height` world pixels at
    /// `resolution`. Its size and default frame are set to the framebuffer size
    /// divided by `resolution`.
    pub fn acquire(&mut self, device: &mut DeviceContext, min_width: f32, min_height: f32, resolution: f32) -> RenderTargetKey {
        let resolution = if resolution > 0.0 { resolution } else { 1.0 };
        let width = (min_width * resolution).ceil().max(1.0) as u32;
        let height = (min_height * resolution).ceil().max(1.0) as u32;
        let (key, width, height) = PoolKey::for_request(width, height, device.backend.drawing_buffer_size());

        let reused = self
            .lists
            .get_mut(&key)
            .and_then(|list| std::iter::from_fn(|| list.pop()).find(|k| device.targets.contains_key(*k)));

        let target_key = match reused {
            Some(k) => k,
            None => {
                log::debug!("lumen-render: pool miss {key:?}, allocating {width}x{height}");
                let target = RenderTarget::new(device.backend.as_mut(), width as f32, height as f32, 1.0, false);
                device.targets.insert(target)
            }
        };

        if let Some(target) = device.targets.get_mut(target_key) {
            target.reuse_as(width as f32 / resolution, height as f32 / resolution, resolution);
            target.pool_key = Some(key);
        }
        target_key
    }

    /// Returns a target obtained from [`acquire`](Self::acquire).
    ///
    /// A screen-sized target whose size no longer matches the drawing buffer
    /// is destroyed instead.
    pub fn release(&mut self, device: &mut DeviceContext, target: RenderTargetKey) {
        let Some((key, size, resolution)) = device
            .targets
            .get(target)
            .and_then(|t| t.pool_key().map(|key| (key, t.size(), t.resolution())))
        else {
            debug_assert!(false, "released a target the pool never handed out");
            log::warn!("lumen-render: release of a non-pooled render target ignored");
            return;
        };
        let pixels = ((size.x * resolution).round() as u32, (size.y * resolution).round() as u32);
        if key == PoolKey::Screen && pixels != device.backend.drawing_buffer_size() {
            if let Some(stale) = device.targets.remove(target) {
                stale.destroy(device.backend.as_mut());
            }
            return;
        }
        let list = self.lists.entry(key).or_default();
        if list.contains(&target) {
            debug_assert!(false, "render target released twice");
            log::warn!("lumen-render: render target released twice; ignored");
            return;
        }
        list.push(target);
    }

    /// Destroys every screen-sized target.
    pub fn invalidate_screen(&mut self, device: &mut DeviceContext) {
        if let Some(list) = self.lists.remove(&PoolKey::Screen) {
            for key in list {
                if let Some(target) = device.targets.remove(key) {
                    target.destroy(device.backend.as_mut());
                }
            }
        }
    }

    /// Empties the pool. Framebuffers are deleted unless the context that
    /// owned them is already gone.
    pub fn clear(&mut self, device: &mut DeviceContext, context_lost: bool) {
        for key in self.lists.drain().flat_map(|(_, list)| list) {
            if let Some(target) = device.targets.remove(key)
                && !context_lost
            {
                target.destroy(device.backend.as_mut());
            }
        }
    }
}
