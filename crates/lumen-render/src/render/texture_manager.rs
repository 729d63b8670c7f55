use slotmap::SlotMap;

use crate::device::{ContextId, SamplerParams, TextureHandle};

use super::context::DeviceContext;
use super::target::RenderTarget;
use super::texture::{GpuTexture, TextureKey, TextureResource, TextureSource};

/// Owns every [`TextureResource`] and their device handles.
///
/// Keeps the set of textures with live handles ("managed") for the garbage
/// collector, and mirrors which texture sits on which device unit so binding an
/// already bound texture costs nothing.
#[derive(Debug, Default)]
pub struct TextureManager {
    textures: SlotMap<TextureKey, TextureResource>,
    managed: Vec<TextureKey>,
    /// `None` means the unit holds the empty texture.
    bound: Vec<Option<TextureKey>>,
    next_location: usize,
    empty: Option<(ContextId, TextureHandle)>,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, texture: TextureResource) -> TextureKey {
        self.textures.insert(texture)
    }

    pub fn get(&self, key: TextureKey) -> Option<&TextureResource> {
        self.textures.get(key)
    }

    pub fn get_mut(&mut self, key: TextureKey) -> Option<&mut TextureResource> {
        self.textures.get_mut(key)
    }

    pub fn contains(&self, key: TextureKey) -> bool {
        self.textures.contains_key(key)
    }

    /// Textures that currently own a device handle.
    pub fn managed(&self) -> &[TextureKey] {
        &self.managed
    }

    pub fn bound_units(&self) -> &[Option<TextureKey>] {
        &self.bound
    }

    pub fn unit_count(&self) -> usize {
        self.bound.len()
    }

    /// Restarts round-robin unit allocation; called at the start of every frame.
    pub fn reset_location(&mut self) {
        self.next_location = 0;
    }

    /// Sizes the unit table and puts the empty texture on every unit.
    pub fn init_units(&mut self, device: &mut DeviceContext, units: usize) {
        self.bound = vec![None; units.max(1)];
        self.next_location = 0;
        let empty = self.empty_handle(device);
        for unit in 0..self.bound.len() {
            device.backend.bind_texture(unit, empty);
        }
    }

    /// Forgets which texture sits on `unit` so the next bind re-issues it.
    pub(crate) fn invalidate_unit(&mut self, unit: usize) {
        if let Some(slot) = self.bound.get_mut(unit) {
            *slot = None;
        }
    }

    /// Puts the empty texture back on `unit`.
    pub(crate) fn reset_unit(&mut self, device: &mut DeviceContext, unit: usize) {
        if unit >= self.bound.len() {
            return;
        }
        let empty = self.empty_handle(device);
        self.bound[unit] = None;
        device.backend.bind_texture(unit, empty);
    }

    fn empty_handle(&mut self, device: &mut DeviceContext) -> TextureHandle {
        if let Some((context, handle)) = self.empty
            && context == device.context_id
        {
            return handle;
        }
        let backend = device.backend.as_mut();
        let handle = backend.create_texture();
        backend.upload_texture(handle, 1, 1, &[0, 0, 0, 0]);
        backend.set_sampler(handle, SamplerParams::default());
        self.empty = Some((device.context_id, handle));
        handle
    }

    /// Binds `key` and returns the unit it landed on.
    ///
    /// Stamps the texture with `frame` for the garbage collector. Unless `force`
    /// is set, a texture already sitting on a unit is reused as is; otherwise
    /// `unit` (or the next round-robin unit, counting down from the top) is used.
    /// `force` binds to `unit`, defaulting to 0.
    pub fn bind(
        &mut self,
        device: &mut DeviceContext,
        frame: u64,
        key: TextureKey,
        unit: Option<usize>,
        force: bool,
    ) -> Option<usize> {
        let texture = self.textures.get_mut(key)?;
        texture.touched = frame;
        let needs_update = texture.dirty || !texture.gpu.contains_key(&device.context_id);
        if self.bound.is_empty() {
            self.bound.push(None);
        }

        let location = if force {
            unit.unwrap_or(0).min(self.bound.len() - 1)
        } else if let Some(existing) = self.bound.iter().position(|b| *b == Some(key)) {
            if needs_update {
                self.update(device, key, Some(existing));
            }
            return Some(existing);
        } else {
            match unit {
                Some(unit) => unit.min(self.bound.len() - 1),
                None => {
                    self.next_location = (self.next_location + 1) % self.bound.len();
                    self.bound.len() - self.next_location - 1
                }
            }
        };

        if needs_update {
            self.update(device, key, Some(location));
        } else if let Some(handle) = self.textures.get(key).and_then(|t| t.gpu.get(&device.context_id)).map(|g| g.handle) {
            self.claim_unit(device, key, location);
            device.backend.bind_texture(location, handle);
        }
        Some(location)
    }

    /// Records `key` on `location`; any other unit still holding it gets the
    /// empty texture back.
    fn claim_unit(&mut self, device: &mut DeviceContext, key: TextureKey, location: usize) {
        let stale: Vec<usize> = (0..self.bound.len())
            .filter(|u| *u != location && self.bound[*u] == Some(key))
            .collect();
        if !stale.is_empty() {
            let empty = self.empty_handle(device);
            for unit in stale {
                self.bound[unit] = None;
                device.backend.bind_texture(unit, empty);
            }
        }
        self.bound[location] = Some(key);
    }

    /// Replaces `key` with the empty texture on every unit holding it.
    pub fn unbind(&mut self, device: &mut DeviceContext, key: TextureKey) {
        if !self.bound.contains(&Some(key)) {
            return;
        }
        let empty = self.empty_handle(device);
        for (unit, slot) in self.bound.iter_mut().enumerate() {
            if *slot == Some(key) {
                *slot = None;
                device.backend.bind_texture(unit, empty);
            }
        }
    }

    /// Creates or refreshes the device copy of `key` and leaves it bound.
    ///
    /// Returns `None` while the texture has not loaded. It lands on `unit` when
    /// given, else on the unit already holding it, else on 0. Other units still
    /// holding it get the empty texture back.
    pub fn update(&mut self, device: &mut DeviceContext, key: TextureKey, unit: Option<usize>) -> Option<TextureHandle> {
        if !self.textures.get(key)?.has_loaded {
            return None;
        }
        if self.bound.is_empty() {
            self.bound.push(None);
        }

        let location = unit
            .or_else(|| self.bound.iter().position(|b| *b == Some(key)))
            .unwrap_or(0)
            .min(self.bound.len() - 1);
        self.claim_unit(device, key, location);

        let texture = self.textures.get_mut(key)?;
        let context = device.context_id;
        let (width, height) = texture.real_size();
        let backend = device.backend.as_mut();

        let handle = match texture.gpu.get(&context).copied() {
            None => {
                let gpu = match &texture.source {
                    TextureSource::RenderTarget => {
                        let target = RenderTarget::new(
                            backend,
                            texture.width,
                            texture.height,
                            texture.resolution,
                            false,
                        );
                        let handle = target.texture(backend).unwrap_or_else(|| backend.create_texture());
                        let target_key = device.targets.insert(target);
                        GpuTexture { handle, target: Some(target_key) }
                    }
                    TextureSource::Pixels(pixels) => {
                        let handle = backend.create_texture();
                        backend.upload_texture(handle, width, height, pixels);
                        GpuTexture { handle, target: None }
                    }
                };
                backend.set_sampler(gpu.handle, texture.sampler_params());
                texture.gpu.insert(context, gpu);
                self.managed.push(key);
                log::debug!("lumen-render: texture {key:?} created ({width}x{height})");
                gpu.handle
            }
            Some(gpu) => {
                match (&texture.source, gpu.target) {
                    (TextureSource::RenderTarget, Some(target)) => {
                        if let Some(target) = device.targets.get_mut(target) {
                            target.resize(backend, texture.width, texture.height);
                        }
                    }
                    (TextureSource::Pixels(pixels), _) => {
                        backend.upload_texture(gpu.handle, width, height, pixels);
                    }
                    _ => {}
                }
                gpu.handle
            }
        };
        texture.dirty = false;

        device.backend.bind_texture(location, handle);
        Some(handle)
    }

    /// Deletes the device objects of `key` for the current context.
    ///
    /// No-op for unloaded textures. The texture leaves the managed set unless
    /// `skip_remove` is set (the collector compacts the set itself). Destroying
    /// the active render target falls back to the root.
    pub fn destroy(&mut self, device: &mut DeviceContext, key: TextureKey, skip_remove: bool) {
        let Some(texture) = self.textures.get(key) else { return };
        if !texture.has_loaded {
            return;
        }
        let Some(gpu) = texture.gpu.get(&device.context_id).copied() else { return };

        self.unbind(device, key);
        if let Some(texture) = self.textures.get_mut(key) {
            texture.gpu.remove(&device.context_id);
        }

        match gpu.target.and_then(|t| device.targets.remove(t).map(|target| (t, target))) {
            Some((target_key, target)) => {
                if device.active_target == target_key {
                    let root = device.root;
                    device.bind_render_target(root);
                }
                target.destroy(device.backend.as_mut());
            }
            None => device.backend.delete_texture(gpu.handle),
        }

        if !skip_remove {
            self.managed.retain(|k| *k != key);
        }
        log::debug!("lumen-render: texture {key:?} destroyed");
    }

    /// Destroys the device copy and forgets the texture entirely.
    pub fn remove(&mut self, device: &mut DeviceContext, key: TextureKey) -> Option<TextureResource> {
        self.destroy(device, key, false);
        self.textures.remove(key)
    }

    /// Destroys every managed texture matching `evict` and swap-removes it from
    /// the managed set in the same pass. Returns how many were evicted.
    pub(crate) fn evict_managed(&mut self, device: &mut DeviceContext, mut evict: impl FnMut(&TextureResource) -> bool) -> usize {
        let mut evicted = 0;
        let mut i = 0;
        while i < self.managed.len() {
            let key = self.managed[i];
            if self.textures.get(key).is_some_and(&mut evict) {
                self.destroy(device, key, true);
                self.managed.swap_remove(i);
                evicted += 1;
            } else {
                i += 1;
            }
        }
        evicted
    }

    /// Drops every handle of the current context without touching the device,
    /// which is already gone.
    pub fn remove_all(&mut self, device: &mut DeviceContext) {
        let context = device.context_id;
        for key in self.managed.drain(..) {
            let Some(texture) = self.textures.get_mut(key) else { continue };
            if let Some(gpu) = texture.gpu.remove(&context)
                && let Some(target) = gpu.target
            {
                device.targets.remove(target);
            }
        }
        self.bound.iter_mut().for_each(|b| *b = None);
        self.empty = None;
    }

    /// Destroys every managed texture; used on teardown.
    pub fn destroy_all(&mut self, device: &mut DeviceContext) {
        let managed = std::mem::take(&mut self.managed);
        for key in managed {
            self.destroy(device, key, true);
        }
        if let Some((context, handle)) = self.empty.take()
            && context == device.context_id
        {
            device.backend.delete_texture(handle);
        }
    }
}
