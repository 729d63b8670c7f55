//! A backend that talks to no GPU at all.
//!
//! Every call is appended to a shared log so tests (and headless tools) can
//! assert on the exact device traffic the managers produce. Resource handles are
//! minted from counters and their sizes tracked, which is enough to observe
//! pooling, resizing and leaks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::coords::{ColorRgba, Matrix};

use super::backend::{
    Backend, Capability, DeviceRect, FramebufferHandle, ProgramHandle, ProgramSource,
    SamplerParams, StencilFunc, StencilOp, TextureHandle, Vertex,
};
use super::blend::BlendMode;
use super::uniforms::UniformValue;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateTexture(TextureHandle),
    UploadTexture { texture: TextureHandle, width: u32, height: u32 },
    SetSampler(TextureHandle, SamplerParams),
    DeleteTexture(TextureHandle),
    BindTexture { unit: usize, texture: TextureHandle },
    CreateFramebuffer { framebuffer: FramebufferHandle, width: u32, height: u32 },
    ResizeFramebuffer { framebuffer: FramebufferHandle, width: u32, height: u32 },
    EnableStencil(FramebufferHandle),
    DeleteFramebuffer(FramebufferHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    CreateProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    SetUniform { program: ProgramHandle, name: String, value: UniformValue },
    SetProjection(Matrix),
    SetEnabled(Capability, bool),
    SetFrontFace { clockwise: bool },
    SetBlendMode(BlendMode),
    SetViewport(DeviceRect),
    SetScissor(DeviceRect),
    SetColorMask(bool),
    SetStencilFunc(StencilFunc),
    SetStencilOp(StencilOp),
    Clear(ColorRgba),
    ClearStencil,
    Draw { vertices: usize, indices: usize },
    Submit { present: bool },
    ResizeDrawingBuffer { width: u32, height: u32 },
    RestoreContext,
}

impl DeviceCall {
    /// True for calls that change fixed-function state.
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            DeviceCall::SetEnabled(..)
                | DeviceCall::SetFrontFace { .. }
                | DeviceCall::SetBlendMode(_)
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FramebufferInfo {
    pub width: u32,
    pub height: u32,
    pub stencil: bool,
    pub texture: TextureHandle,
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<DeviceCall>,
    next_id: u32,
    textures: HashMap<TextureHandle, (u32, u32)>,
    framebuffers: HashMap<FramebufferHandle, FramebufferInfo>,
    programs: HashMap<ProgramHandle, ProgramSource>,
    bound_framebuffer: Option<FramebufferHandle>,
    lost: bool,
    fail_programs: bool,
}

impl RecordingState {
    fn mint(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared view of the recording, kept by tests after the backend moves into a renderer.
#[derive(Debug, Clone, Default)]
pub struct RecordingLog {
    state: Rc<RefCell<RecordingState>>,
}

impl RecordingLog {
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    /// Returns and forgets everything recorded so far.
    pub fn take_calls(&self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    pub fn clear(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn framebuffer(&self, framebuffer: FramebufferHandle) -> Option<FramebufferInfo> {
        self.state.borrow().framebuffers.get(&framebuffer).copied()
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.state.borrow().bound_framebuffer
    }

    /// Simulates the device dropping the context. All handles die with it.
    pub fn lose_context(&self) {
        let mut state = self.state.borrow_mut();
        state.lost = true;
        state.textures.clear();
        state.framebuffers.clear();
        state.programs.clear();
        state.bound_framebuffer = None;
    }

    /// Makes every following `create_program` fail.
    pub fn fail_programs(&self, fail: bool) {
        self.state.borrow_mut().fail_programs = fail;
    }
}

/// Backend recording calls instead of executing them.
#[derive(Debug)]
pub struct RecordingBackend {
    log: RecordingLog,
    drawing_buffer: (u32, u32),
    texture_units: usize,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            log: RecordingLog::default(),
            drawing_buffer: (width.max(1), height.max(1)),
            texture_units: 8,
        }
    }

    pub fn with_texture_units(mut self, units: usize) -> Self {
        self.texture_units = units.max(1);
        self
    }

    pub fn log(&self) -> RecordingLog {
        self.log.clone()
    }

    fn record(&self, call: DeviceCall) {
        self.log.state.borrow_mut().calls.push(call);
    }

    fn lost(&self) -> bool {
        self.log.state.borrow().lost
    }
}

impl Backend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_context_lost(&self) -> bool {
        self.lost()
    }

    fn restore_context(&mut self) -> anyhow::Result<()> {
        self.log.state.borrow_mut().lost = false;
        self.record(DeviceCall::RestoreContext);
        Ok(())
    }

    fn max_texture_units(&self) -> usize {
        self.texture_units
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.drawing_buffer
    }

    fn resize_drawing_buffer(&mut self, width: u32, height: u32) {
        self.drawing_buffer = (width.max(1), height.max(1));
        self.record(DeviceCall::ResizeDrawingBuffer { width, height });
    }

    fn create_texture(&mut self) -> TextureHandle {
        let mut state = self.log.state.borrow_mut();
        let handle = TextureHandle::from_raw(state.mint());
        if !state.lost {
            state.textures.insert(handle, (0, 0));
        }
        state.calls.push(DeviceCall::CreateTexture(handle));
        handle
    }

    fn upload_texture(&mut self, texture: TextureHandle, width: u32, height: u32, _pixels: &[u8]) {
        if let Some(size) = self.log.state.borrow_mut().textures.get_mut(&texture) {
            *size = (width, height);
        }
        self.record(DeviceCall::UploadTexture { texture, width, height });
    }

    fn set_sampler(&mut self, texture: TextureHandle, params: SamplerParams) {
        self.record(DeviceCall::SetSampler(texture, params));
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.log.state.borrow_mut().textures.remove(&texture);
        self.record(DeviceCall::DeleteTexture(texture));
    }

    fn bind_texture(&mut self, unit: usize, texture: TextureHandle) {
        self.record(DeviceCall::BindTexture { unit, texture });
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> FramebufferHandle {
        let mut state = self.log.state.borrow_mut();
        let framebuffer = FramebufferHandle::from_raw(state.mint());
        let texture = TextureHandle::from_raw(state.mint());
        if !state.lost {
            state.framebuffers.insert(
                framebuffer,
                FramebufferInfo { width, height, stencil: false, texture },
            );
        }
        state.calls.push(DeviceCall::CreateFramebuffer { framebuffer, width, height });
        framebuffer
    }

    fn framebuffer_texture(&self, framebuffer: FramebufferHandle) -> Option<TextureHandle> {
        self.log.state.borrow().framebuffers.get(&framebuffer).map(|fb| fb.texture)
    }

    fn resize_framebuffer(&mut self, framebuffer: FramebufferHandle, width: u32, height: u32) {
        if let Some(fb) = self.log.state.borrow_mut().framebuffers.get_mut(&framebuffer) {
            fb.width = width;
            fb.height = height;
        }
        self.record(DeviceCall::ResizeFramebuffer { framebuffer, width, height });
    }

    fn enable_stencil(&mut self, framebuffer: FramebufferHandle) {
        let newly = match self.log.state.borrow_mut().framebuffers.get_mut(&framebuffer) {
            Some(fb) if !fb.stencil => {
                fb.stencil = true;
                true
            }
            _ => false,
        };
        if newly {
            self.record(DeviceCall::EnableStencil(framebuffer));
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.log.state.borrow_mut().framebuffers.remove(&framebuffer);
        self.record(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.log.state.borrow_mut().bound_framebuffer = framebuffer;
        self.record(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn create_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramHandle> {
        let mut state = self.log.state.borrow_mut();
        anyhow::ensure!(!state.fail_programs, "program `{}` rejected by device", source.label);
        anyhow::ensure!(!state.lost, "context lost");

        let program = ProgramHandle::from_raw(state.mint());
        state.programs.insert(program, source.clone());
        state.calls.push(DeviceCall::CreateProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.log.state.borrow_mut().programs.remove(&program);
        self.record(DeviceCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.record(DeviceCall::UseProgram(program));
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: &UniformValue) {
        self.record(DeviceCall::SetUniform { program, name: name.to_string(), value: *value });
    }

    fn set_projection(&mut self, projection: &Matrix) {
        self.record(DeviceCall::SetProjection(*projection));
    }

    fn set_enabled(&mut self, capability: Capability, enabled: bool) {
        self.record(DeviceCall::SetEnabled(capability, enabled));
    }

    fn set_front_face(&mut self, clockwise: bool) {
        self.record(DeviceCall::SetFrontFace { clockwise });
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.record(DeviceCall::SetBlendMode(mode));
    }

    fn set_viewport(&mut self, rect: DeviceRect) {
        self.record(DeviceCall::SetViewport(rect));
    }

    fn set_scissor(&mut self, rect: DeviceRect) {
        self.record(DeviceCall::SetScissor(rect));
    }

    fn set_color_mask(&mut self, enabled: bool) {
        self.record(DeviceCall::SetColorMask(enabled));
    }

    fn set_stencil_func(&mut self, func: StencilFunc) {
        self.record(DeviceCall::SetStencilFunc(func));
    }

    fn set_stencil_op(&mut self, op: StencilOp) {
        self.record(DeviceCall::SetStencilOp(op));
    }

    fn clear(&mut self, color: ColorRgba) {
        self.record(DeviceCall::Clear(color));
    }

    fn clear_stencil(&mut self) {
        self.record(DeviceCall::ClearStencil);
    }

    fn draw(&mut self, vertices: &[Vertex], indices: &[u16]) {
        if self.lost() {
            return;
        }
        self.record(DeviceCall::Draw { vertices: vertices.len(), indices: indices.len() });
    }

    fn submit(&mut self, present: bool) {
        self.record(DeviceCall::Submit { present });
    }
}
