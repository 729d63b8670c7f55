use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::coords::{Matrix, Rect};
use crate::device::{
    Backend, BlendMode, Capability, ProgramHandle, ProgramSource, UniformSlot, UniformType,
    UniformValue,
};
use crate::render::context::GpuContext;
use crate::render::target::RenderTargetKey;
use crate::scene::{SceneNode, SpriteDraw};

use super::filter::{Filter, FilterProgram, FilterUniform, PassThroughFilter, UniformMap};
use super::pool::RenderTargetPool;
use super::quad::{Quad, QUAD_INDICES};
use super::state::FilterState;
use super::transforms;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProgramKey {
    vertex: String,
    fragment: String,
    slots: Vec<UniformSlot>,
}

/// Runs filter chains over captured subtrees.
///
/// `push_filter` redirects drawing into a pooled offscreen target;
/// `pop_filter` runs the filters from that target back into the one below.
/// Filter states live on the target that was active at the first push.
#[derive(Debug, Default)]
pub struct FilterManager {
    base: Option<RenderTargetKey>,
    pool: RenderTargetPool,
    programs: HashMap<ProgramKey, Option<ProgramHandle>>,
    quad: Quad,
    unknown_uniforms: HashSet<String>,
}

impl FilterManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    /// Number of filter states above the base, zero when idle.
    pub fn depth(&self, ctx: &GpuContext) -> usize {
        self.base
            .and_then(|b| ctx.device.targets.get(b))
            .map(|t| t.filter_depth().saturating_sub(1))
            .unwrap_or(0)
    }

    /// Starts capturing `node` for `filters`.
    ///
    /// The capture covers the node's filter area (or bounds), snapped to the
    /// first filter's resolution, clamped to the base target when the filter
    /// auto-fits, and grown by its padding. A full-screen filter area is used
    /// as is.
    pub fn push_filter(&mut self, ctx: &mut GpuContext, node: &dyn SceneNode, filters: Vec<Rc<dyn Filter>>) {
        let area = node.filter_area();
        let bounds = area.unwrap_or_else(|| node.bounds());
        self.push(ctx, area, bounds, filters);
    }

    /// Starts capturing an explicit world-space `area` for `filters`.
    pub fn push_filter_area(&mut self, ctx: &mut GpuContext, area: Rect, filters: Vec<Rc<dyn Filter>>) {
        self.push(ctx, Some(area), area, filters);
    }

    fn push(&mut self, ctx: &mut GpuContext, area: Option<Rect>, bounds: Rect, filters: Vec<Rc<dyn Filter>>) {
        let filters = if filters.is_empty() {
            log::debug!("lumen-render: empty filter list, capturing as pass-through");
            vec![Rc::new(PassThroughFilter) as Rc<dyn Filter>]
        } else {
            filters
        };

        let device = &mut ctx.device;
        let base = match self.base {
            Some(base) if device.targets.contains_key(base) => base,
            _ => {
                let active = device.active_target;
                let Some(target) = device.targets.get_mut(active) else { return };
                let frame = Rect::sized(target.size().x, target.size().y);
                target.filter_stack.clear();
                target.filter_stack.push(FilterState::base(active, frame));
                self.base = Some(active);
                active
            }
        };
        let Some(base_target) = device.targets.get(base) else { return };
        let base_frame = base_target.filter_stack.first().map(|s| s.destination_frame).unwrap_or_default();
        let base_transformed = base_target.transform.is_some();

        let screen = device.screen();
        let first = &filters[0];
        let resolution = if first.resolution() > 0.0 { first.resolution() } else { 1.0 };
        let padding = first.padding().trunc();

        let full_screen = area == Some(screen);
        let target_area = if full_screen { screen } else { bounds };

        let mut source = target_area.floor_to_resolution(resolution);
        if !full_screen {
            if !base_transformed && first.auto_fit() {
                source = source.fit(base_frame);
            }
            source = source.pad(padding);
        }
        let destination = Rect::sized(source.width(), source.height());

        let key = self.pool.acquire(device, source.width(), source.height(), resolution);
        if let Some(target) = device.targets.get_mut(key) {
            target.set_frame(Some(destination), Some(source));
        }
        device.bind_render_target(key);
        if let Some(target) = device.targets.get(key) {
            target.clear(device.backend.as_mut(), None);
        }

        if let Some(base_target) = device.targets.get_mut(base) {
            base_target.filter_stack.push(FilterState {
                render_target: key,
                source_frame: source,
                destination_frame: destination,
                target_area,
                resolution,
                padding,
                filters,
            });
        }
    }

    /// Applies the filters of the innermost capture into the target below it.
    pub fn pop_filter(&mut self, ctx: &mut GpuContext) {
        let popped = self.base.and_then(|base| {
            let target = ctx.device.targets.get_mut(base)?;
            if target.filter_stack.len() < 2 {
                return None;
            }
            let state = target.filter_stack.pop()?;
            let below = target.filter_stack.last()?.render_target;
            Some((base, state, below))
        });
        let Some((base, state, below)) = popped else {
            debug_assert!(false, "pop_filter without matching push_filter");
            log::warn!("lumen-render: pop_filter without matching push ignored");
            return;
        };

        let Some(size) = ctx.device.targets.get(state.render_target).map(|t| t.size()) else { return };
        self.quad.map(size, state.source_frame);

        let mut pass = FilterPass { manager: &mut *self, ctx: &mut *ctx, state: &state };
        let (last, chain) = match state.filters.split_last() {
            Some(split) => split,
            None => return,
        };
        if chain.is_empty() {
            last.apply(&mut pass, state.render_target, below, false, &state);
            pass.manager.pool.release(&mut pass.ctx.device, state.render_target);
        } else {
            let mut flip = state.render_target;
            let mut flop = pass.manager.pool.acquire(
                &mut pass.ctx.device,
                state.source_frame.width(),
                state.source_frame.height(),
                state.resolution,
            );
            if let Some(target) = pass.ctx.device.targets.get_mut(flop) {
                target.set_frame(Some(state.destination_frame), Some(state.source_frame));
            }
            for filter in chain {
                filter.apply(&mut pass, flip, flop, true, &state);
                std::mem::swap(&mut flip, &mut flop);
            }
            last.apply(&mut pass, flip, below, false, &state);
            pass.manager.pool.release(&mut pass.ctx.device, flip);
            pass.manager.pool.release(&mut pass.ctx.device, flop);
        }

        // A skipped pass must not leave drawing redirected into a pooled target.
        if ctx.device.active_target != below {
            ctx.device.bind_render_target(below);
        }
        if let Some(target) = ctx.device.targets.get_mut(base)
            && target.filter_stack.len() <= 1
        {
            target.filter_stack.clear();
            self.base = None;
        }
    }

    /// Drops the screen-sized pool after the drawing buffer changed size.
    pub fn on_resize(&mut self, ctx: &mut GpuContext) {
        self.pool.invalidate_screen(&mut ctx.device);
    }

    /// Releases programs and pooled targets. With `context_lost` the device
    /// objects are only forgotten.
    pub fn destroy(&mut self, ctx: &mut GpuContext, context_lost: bool) {
        for handle in self.programs.drain().filter_map(|(_, h)| h) {
            if !context_lost {
                ctx.device.backend.delete_program(handle);
            }
        }
        self.pool.clear(&mut ctx.device, context_lost);
        self.base = None;
    }

    fn program(&mut self, backend: &mut dyn Backend, program: &FilterProgram, slots: Vec<UniformSlot>) -> Option<ProgramHandle> {
        let key = ProgramKey {
            vertex: program.vertex.to_string(),
            fragment: program.fragment.to_string(),
            slots,
        };
        if let Some(cached) = self.programs.get(&key) {
            return *cached;
        }

        let source = ProgramSource {
            label: program.label.clone(),
            vertex: program.vertex.clone(),
            fragment: program.fragment.clone(),
            uniforms: key.slots.clone(),
        };
        let handle = match backend.create_program(&source) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("lumen-render: filter program `{}` failed: {err:#}", program.label);
                None
            }
        };
        self.programs.insert(key, handle);
        handle
    }

    /// Uniform block layout: built-ins first, then the declared uniforms whose
    /// type is known.
    fn uniform_slots(&mut self, uniforms: &UniformMap) -> Vec<(UniformSlot, usize)> {
        let mut slots = vec![
            (UniformSlot::new("filter_area", UniformType::Vec4), usize::MAX),
            (UniformSlot::new("filter_clamp", UniformType::Vec4), usize::MAX),
        ];
        for (index, entry) in uniforms.iter().enumerate() {
            match entry.ty.parse::<UniformType>() {
                Ok(ty) => slots.push((UniformSlot::new(entry.name.as_ref(), ty), index)),
                Err(err) => {
                    if self.unknown_uniforms.insert(entry.name.to_string()) {
                        log::debug!("lumen-render: skipping uniform `{}`: {err}", entry.name);
                    }
                }
            }
        }
        slots
    }
}

/// What a [`Filter`] sees while it is being applied.
pub struct FilterPass<'a> {
    manager: &'a mut FilterManager,
    ctx: &'a mut GpuContext,
    state: &'a FilterState,
}

impl FilterPass<'_> {
    pub fn ctx(&mut self) -> &mut GpuContext {
        &mut *self.ctx
    }

    /// The filter state being popped.
    pub fn state(&self) -> &FilterState {
        self.state
    }

    /// Draws `input` into `output` through `program`.
    ///
    /// `clear` wipes the output first, ignoring any scissor. A scissor mask set
    /// on the output is re-applied before drawing.
    pub fn apply_filter(
        &mut self,
        program: &FilterProgram,
        uniforms: &UniformMap,
        blend_mode: BlendMode,
        input: RenderTargetKey,
        output: RenderTargetKey,
        clear: bool,
    ) {
        let slots = self.manager.uniform_slots(uniforms);
        let handle = self.manager.program(
            self.ctx.device.backend.as_mut(),
            program,
            slots.iter().map(|(slot, _)| slot.clone()).collect(),
        );
        let Some(handle) = handle else { return };

        let device = &mut self.ctx.device;
        device.bind_render_target(output);
        if clear && let Some(target) = device.targets.get(output) {
            let scissored = target.destination_frame() != target.source_frame();
            let backend = device.backend.as_mut();
            backend.set_enabled(Capability::ScissorTest, false);
            target.clear(backend, None);
            if scissored {
                backend.set_enabled(Capability::ScissorTest, true);
            }
        }
        device.reapply_scissor(output);
        device.backend.use_program(handle);

        // Unit 0 belongs to the input for this draw.
        self.ctx.textures.invalidate_unit(0);
        self.sync_uniforms(handle, uniforms, &slots);
        self.ctx.device.state.set_blend_mode(self.ctx.device.backend.as_mut(), blend_mode);

        let device = &mut self.ctx.device;
        let Some(input_texture) = device.targets.get(input).and_then(|t| t.texture(device.backend.as_ref())) else {
            return;
        };
        device.backend.bind_texture(0, input_texture);
        device.backend.draw(self.manager.quad.vertices(), &QUAD_INDICES);
        self.ctx.textures.reset_unit(&mut self.ctx.device, 0);
    }

    fn sync_uniforms(&mut self, program: ProgramHandle, uniforms: &UniformMap, slots: &[(UniformSlot, usize)]) {
        let size = self
            .ctx
            .device
            .targets
            .get(self.state.render_target)
            .map(|t| t.size())
            .unwrap_or_default();
        let frame = self.state.source_frame;
        let backend = self.ctx.device.backend.as_mut();
        backend.set_uniform(program, "filter_area", &UniformValue::Vec4([size.x, size.y, frame.x(), frame.y()]));
        backend.set_uniform(
            program,
            "filter_clamp",
            &UniformValue::Vec4([0.0, 0.0, (frame.width() - 1.0) / size.x, (frame.height() - 1.0) / size.y]),
        );

        let units = self.ctx.textures.unit_count();
        let mut unit = 1;
        for (slot, index) in slots.iter().skip(2) {
            let Some(entry) = uniforms.get(*index) else { continue };
            match &entry.value {
                FilterUniform::Value(value) => {
                    self.ctx.device.backend.set_uniform(program, &slot.name, value);
                }
                FilterUniform::Texture(_) | FilterUniform::Target(_) if unit >= units => {
                    log::warn!("lumen-render: no texture unit left for `{}`", slot.name);
                }
                FilterUniform::Texture(key) => {
                    self.ctx.bind_texture(*key, Some(unit), true);
                    self.ctx.device.backend.set_uniform(program, &slot.name, &UniformValue::Sampler(unit as u32));
                    unit += 1;
                }
                FilterUniform::Target(target) => {
                    let device = &mut self.ctx.device;
                    if let Some(texture) = device.targets.get(*target).and_then(|t| t.texture(device.backend.as_ref())) {
                        device.backend.bind_texture(unit, texture);
                    }
                    self.ctx.textures.invalidate_unit(unit);
                    self.ctx.device.backend.set_uniform(program, &slot.name, &UniformValue::Sampler(unit as u32));
                    unit += 1;
                }
            }
        }
    }

    /// Scratch target matching the current state's frames.
    pub fn get_render_target(&mut self, clear: bool, resolution: Option<f32>) -> RenderTargetKey {
        let state = self.state;
        let key = self.manager.pool.acquire(
            &mut self.ctx.device,
            state.source_frame.width(),
            state.source_frame.height(),
            resolution.unwrap_or(state.resolution),
        );
        let device = &mut self.ctx.device;
        if let Some(target) = device.targets.get_mut(key) {
            target.set_frame(Some(state.destination_frame), Some(state.source_frame));
            if clear {
                target.clear(device.backend.as_mut(), None);
            }
        }
        key
    }

    pub fn return_render_target(&mut self, target: RenderTargetKey) {
        self.manager.pool.release(&mut self.ctx.device, target);
    }

    fn texture_size(&self) -> crate::coords::Vec2 {
        self.ctx
            .device
            .targets
            .get(self.state.render_target)
            .map(|t| t.size())
            .unwrap_or_default()
    }

    pub fn calculate_screen_space_matrix(&self) -> Matrix {
        transforms::calculate_screen_space_matrix(self.state.source_frame, self.texture_size())
    }

    pub fn calculate_normalized_screen_space_matrix(&self) -> Matrix {
        transforms::calculate_normalized_screen_space_matrix(self.state.source_frame, self.texture_size())
    }

    pub fn calculate_sprite_matrix(&self, sprite: &SpriteDraw) -> Matrix {
        transforms::calculate_sprite_matrix(self.state.source_frame, self.texture_size(), sprite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, RecordingBackend, RecordingLog};
    use crate::render::context::DeviceContext;
    use crate::render::filter::UniformEntry;
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

    fn draws(log: &RecordingLog) -> usize {
        log.count(|c| matches!(c, DeviceCall::Draw { .. }))
    }

    fn pass_through() -> Vec<Rc<dyn Filter>> {
        vec![Rc::new(PassThroughFilter)]
    }

    // ── push / pop ───────────────────────────────────────────────────────

    #[test]
    fn push_redirects_and_pop_restores() {
        let (mut ctx, log) = ctx();
        let root = ctx.device.root;
        let mut filters = FilterManager::new();

        filters.push_filter_area(&mut ctx, Rect::new(10.0, 10.0, 40.0, 40.0), pass_through());
        assert_eq!(filters.depth(&ctx), 1);
        assert_ne!(ctx.device.active_target, root);

        filters.pop_filter(&mut ctx);
        assert_eq!(filters.depth(&ctx), 0);
        assert_eq!(ctx.device.active_target, root);
        assert_eq!(draws(&log), 1);
        assert_eq!(filters.pool().len(), 1);
    }

    #[test]
    fn empty_filter_list_still_captures() {
        let (mut ctx, log) = ctx();
        let mut filters = FilterManager::new();

        filters.push_filter_area(&mut ctx, Rect::new(0.0, 0.0, 20.0, 20.0), Vec::new());
        assert_eq!(filters.depth(&ctx), 1);
        filters.pop_filter(&mut ctx);
        assert_eq!(draws(&log), 1);
    }

    #[test]
    fn nested_pushes_unwind_in_order() {
        let (mut ctx, _) = ctx();
        let root = ctx.device.root;
        let mut filters = FilterManager::new();

        filters.push_filter_area(&mut ctx, Rect::new(0.0, 0.0, 60.0, 60.0), pass_through());
        let outer = ctx.device.active_target;
        filters.push_filter_area(&mut ctx, Rect::new(5.0, 5.0, 20.0, 20.0), pass_through());
        assert_eq!(filters.depth(&ctx), 2);

        filters.pop_filter(&mut ctx);
        assert_eq!(ctx.device.active_target, outer);
        filters.pop_filter(&mut ctx);
        assert_eq!(ctx.device.active_target, root);
    }

    // ── programs ─────────────────────────────────────────────────────────

    #[test]
    fn programs_are_cached_per_source() {
        let (mut ctx, log) = ctx();
        let mut filters = FilterManager::new();

        for _ in 0..3 {
            filters.push_filter_area(&mut ctx, Rect::new(0.0, 0.0, 16.0, 16.0), pass_through());
            filters.pop_filter(&mut ctx);
        }
        assert_eq!(log.count(|c| matches!(c, DeviceCall::CreateProgram(_))), 1);
    }

    #[test]
    fn unknown_uniform_types_are_skipped() {
        struct Tinted;
        impl Filter for Tinted {
            fn uniforms(&self) -> UniformMap {
                vec![
                    UniformEntry::value("weights", "dmat4", UniformValue::Float(0.0)),
                    UniformEntry::value("strength", "float", UniformValue::Float(0.5)),
                ]
            }
        }

        let (mut ctx, log) = ctx();
        let mut filters = FilterManager::new();
        filters.push_filter_area(&mut ctx, Rect::new(0.0, 0.0, 16.0, 16.0), vec![Rc::new(Tinted) as Rc<dyn Filter>]);
        filters.pop_filter(&mut ctx);

        let uniform = |name: &str| {
            log.count(|c| matches!(c, DeviceCall::SetUniform { name: n, .. } if n == name))
        };
        assert_eq!(draws(&log), 1);
        assert_eq!(uniform("weights"), 0);
        assert!(log.calls().iter().any(|c| matches!(
            c,
            DeviceCall::SetUniform { name, value: UniformValue::Float(v), .. } if name == "strength" && *v == 0.5
        )));
        assert_eq!(uniform("strength"), 1);
    }

    #[test]
    fn destroy_releases_programs_and_pool() {
        let (mut ctx, log) = ctx();
        let mut filters = FilterManager::new();
        filters.push_filter_area(&mut ctx, Rect::new(0.0, 0.0, 16.0, 16.0), pass_through());
        filters.pop_filter(&mut ctx);

        filters.destroy(&mut ctx, false);
        assert!(log.calls().iter().any(|c| matches!(c, DeviceCall::DeleteProgram(_))));
        assert_eq!(filters.pool().len(), 0);
    }
}
