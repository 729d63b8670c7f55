use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::coords::{ColorRgba, Matrix};

use super::backend::{
    Backend, Capability, DeviceRect, FramebufferHandle, ProgramHandle, ProgramSource,
    SamplerParams, ScaleMode, StencilCompare, StencilFunc, StencilOp, TextureHandle, Vertex,
    WrapMode,
};
use super::blend::{BlendFactor, BlendMode};
use super::surface::{apply_resize, choose_alpha_mode, choose_surface_format, map_surface_error};
use super::uniforms::{UniformBlockLayout, UniformValue};
use super::{ContextOptions, PowerPreference, SurfaceErrorAction};

/// Color format of every render target, the root included.
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Texture units exposed to programs (bindings `2 + 2u` / `3 + 2u`).
pub const TEXTURE_UNITS: usize = 4;

// ── uniforms / vertex layout ──────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct GlobalsUniform {
    projection: [[f32; 4]; 3],
}

const VERTEX_ATTRS: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x4];

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRS,
    }
}

// ── conversions ───────────────────────────────────────────────────────────

fn wgpu_blend_factor(f: BlendFactor) -> wgpu::BlendFactor {
    match f {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
    }
}

fn wgpu_blend_state(mode: BlendMode) -> wgpu::BlendState {
    let f = mode.factors();
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu_blend_factor(f.src_color),
            dst_factor: wgpu_blend_factor(f.dst_color),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu_blend_factor(f.src_alpha),
            dst_factor: wgpu_blend_factor(f.dst_alpha),
            operation: wgpu::BlendOperation::Add,
        },
    }
}

fn wgpu_compare(c: StencilCompare) -> wgpu::CompareFunction {
    match c {
        StencilCompare::Always => wgpu::CompareFunction::Always,
        StencilCompare::Equal => wgpu::CompareFunction::Equal,
        StencilCompare::NotEqual => wgpu::CompareFunction::NotEqual,
    }
}

fn wgpu_stencil_op(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Increment => wgpu::StencilOperation::IncrementClamp,
        StencilOp::Decrement => wgpu::StencilOperation::DecrementClamp,
    }
}

fn wgpu_address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn wgpu_filter(scale: ScaleMode) -> wgpu::FilterMode {
    match scale {
        ScaleMode::Linear => wgpu::FilterMode::Linear,
        ScaleMode::Nearest => wgpu::FilterMode::Nearest,
    }
}

fn wgpu_color(c: ColorRgba) -> wgpu::Color {
    wgpu::Color { r: c.r as f64, g: c.g as f64, b: c.b as f64, a: c.a as f64 }
}

// ── coordinate helpers ────────────────────────────────────────────────────

/// Pixel rectangle in wgpu's top-left framebuffer space.
#[derive(Debug, Copy, Clone, PartialEq)]
struct PixelRect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

/// Converts a bottom-left [`DeviceRect`] into top-left pixels.
///
/// The root texture is presented as-is, so its rows run top-down and need the
/// flip. Offscreen targets are rendered with a y-flipped projection so row 0 is
/// the bottom edge of the rectangle space and no conversion is needed.
fn to_pixel_rect(rect: DeviceRect, target_height: u32, offscreen: bool) -> PixelRect {
    let y = if offscreen {
        rect.y as f32
    } else {
        target_height as f32 - rect.y as f32 - rect.height as f32
    };
    PixelRect { x: rect.x as f32, y, w: rect.width as f32, h: rect.height as f32 }
}

/// Clips `r` to the `width` x `height` target; `None` when nothing is left.
fn clamp_to_target(r: PixelRect, width: u32, height: u32) -> Option<PixelRect> {
    let x0 = r.x.max(0.0);
    let y0 = r.y.max(0.0);
    let x1 = (r.x + r.w).min(width as f32);
    let y1 = (r.y + r.h).min(height as f32);
    (x1 > x0 && y1 > y0).then(|| PixelRect { x: x0, y: y0, w: x1 - x0, h: y1 - y0 })
}

/// Clip-space correction that keeps geometry where the requested viewport put it
/// after the viewport was clipped to `clamped`.
fn viewport_correction(requested: PixelRect, clamped: PixelRect) -> Matrix {
    let sx = requested.w / clamped.w;
    let sy = requested.h / clamped.h;
    let tx = sx - 1.0 + 2.0 * (requested.x - clamped.x) / clamped.w;
    let ty = 1.0 - sy - 2.0 * (requested.y - clamped.y) / clamped.h;
    Matrix::new(sx, 0.0, 0.0, sy, tx, ty)
}

// ── resources ─────────────────────────────────────────────────────────────

struct ColorTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn create_color_texture(device: &wgpu::Device, width: u32, height: u32, label: &str) -> ColorTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    ColorTexture { texture, view }
}

fn create_stencil_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("lumen stencil"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: STENCIL_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

struct GpuTexture {
    storage: Option<ColorTexture>,
    width: u32,
    height: u32,
    sampler: SamplerParams,
}

struct GpuFramebuffer {
    color: TextureHandle,
    width: u32,
    height: u32,
    stencil: Option<wgpu::TextureView>,
}

struct GpuProgram {
    label: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    layout: UniformBlockLayout,
    block: Vec<u8>,
}

/// Root drawing buffer. Always offscreen so it can outlive a present.
struct RootTarget {
    color: ColorTexture,
    stencil: Option<wgpu::TextureView>,
    width: u32,
    height: u32,
}

struct Presenter {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

/// wgpu objects of one context incarnation.
struct GpuCore {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    clear_shader: wgpu::ShaderModule,
    empty: ColorTexture,
    presenter: Option<Presenter>,
    encoder: Option<wgpu::CommandEncoder>,
}

// ── pipeline cache ────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StencilKey {
    compare: StencilCompare,
    mask: u32,
    op: StencilOp,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    blend: Option<BlendMode>,
    color_write: bool,
    /// `Some(front_ccw)` when back faces are culled.
    cull: Option<bool>,
    has_stencil: bool,
    stencil: Option<StencilKey>,
}

// ── immediate state ───────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone)]
struct DrawState {
    framebuffer: Option<FramebufferHandle>,
    program: Option<ProgramHandle>,
    projection: Matrix,
    units: [Option<TextureHandle>; TEXTURE_UNITS],
    blend: bool,
    blend_mode: BlendMode,
    cull: bool,
    clockwise: bool,
    scissor_test: bool,
    scissor: DeviceRect,
    viewport: Option<DeviceRect>,
    color_mask: bool,
    stencil_test: bool,
    stencil_func: StencilFunc,
    stencil_op: StencilOp,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            framebuffer: None,
            program: None,
            projection: Matrix::IDENTITY,
            units: [None; TEXTURE_UNITS],
            blend: false,
            blend_mode: BlendMode::Normal,
            cull: false,
            clockwise: false,
            scissor_test: false,
            scissor: DeviceRect::default(),
            viewport: None,
            color_mask: true,
            stencil_test: false,
            stencil_func: StencilFunc::default(),
            stencil_op: StencilOp::Keep,
        }
    }
}

/// Attachments of the currently bound framebuffer.
struct BoundTarget {
    color: wgpu::TextureView,
    stencil: Option<wgpu::TextureView>,
    width: u32,
    height: u32,
    offscreen: bool,
}

// ── backend ───────────────────────────────────────────────────────────────

/// [`Backend`] implemented on wgpu.
///
/// Every draw records its own render pass against the bound framebuffer with
/// load/store ops, which keeps the immediate-mode contract without tracking pass
/// boundaries. Pipelines are cached per (program, blend, stencil, cull, mask)
/// combination.
pub struct WgpuBackend {
    window: Option<Arc<Window>>,
    options: ContextOptions,
    core: Option<GpuCore>,
    lost: Arc<AtomicBool>,

    root: Option<RootTarget>,
    drawing_buffer: (u32, u32),

    next_id: u32,
    textures: HashMap<TextureHandle, GpuTexture>,
    framebuffers: HashMap<FramebufferHandle, GpuFramebuffer>,
    programs: HashMap<ProgramHandle, GpuProgram>,
    samplers: HashMap<SamplerParams, wgpu::Sampler>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    clear_pipelines: HashMap<bool, wgpu::RenderPipeline>,

    state: DrawState,
    last_surface_error: Option<SurfaceErrorAction>,
}

impl WgpuBackend {
    /// Creates a backend presenting into `window`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: Arc<Window>, options: ContextOptions) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let lost = Arc::new(AtomicBool::new(false));
        let core = GpuCore::new(Some(window.clone()), (size.width, size.height), &options, lost.clone()).await?;
        Ok(Self::from_core(Some(window), options, core, lost, (size.width, size.height)))
    }

    /// Creates a backend without a surface. `submit(true)` only submits.
    pub async fn headless(width: u32, height: u32, options: ContextOptions) -> Result<Self> {
        let lost = Arc::new(AtomicBool::new(false));
        let size = (width.max(1), height.max(1));
        let core = GpuCore::new(None, size, &options, lost.clone()).await?;
        Ok(Self::from_core(None, options, core, lost, size))
    }

    fn from_core(
        window: Option<Arc<Window>>,
        options: ContextOptions,
        core: GpuCore,
        lost: Arc<AtomicBool>,
        size: (u32, u32),
    ) -> Self {
        if options.antialias {
            log::info!("lumen-render: antialias requested but not supported by the wgpu backend; ignored");
        }

        let mut backend = Self {
            window,
            options,
            core: Some(core),
            lost,
            root: None,
            drawing_buffer: size,
            next_id: 0,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            samplers: HashMap::new(),
            pipelines: HashMap::new(),
            clear_pipelines: HashMap::new(),
            state: DrawState::default(),
            last_surface_error: None,
        };
        backend.rebuild_root();
        backend
    }

    /// Action taken after the most recent failed surface acquisition, if any.
    pub fn last_surface_error(&self) -> Option<SurfaceErrorAction> {
        self.last_surface_error
    }

    pub fn device(&self) -> Option<&wgpu::Device> {
        self.core.as_ref().map(|c| &c.device)
    }

    fn mint(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn live(&self) -> Option<&GpuCore> {
        if self.lost.load(Ordering::Acquire) {
            return None;
        }
        self.core.as_ref()
    }

    fn rebuild_root(&mut self) {
        let Some(core) = self.core.as_ref() else { return };
        let (width, height) = self.drawing_buffer;
        self.root = Some(RootTarget {
            color: create_color_texture(&core.device, width, height, "lumen root"),
            stencil: self
                .options
                .stencil_buffer_enabled
                .then(|| create_stencil_view(&core.device, width, height)),
            width,
            height,
        });
    }

    fn bound_target(&self) -> Option<BoundTarget> {
        match self.state.framebuffer {
            None => {
                let root = self.root.as_ref()?;
                Some(BoundTarget {
                    color: root.color.view.clone(),
                    stencil: root.stencil.clone(),
                    width: root.width,
                    height: root.height,
                    offscreen: false,
                })
            }
            Some(handle) => {
                let fb = self.framebuffers.get(&handle)?;
                let color = self.textures.get(&fb.color)?.storage.as_ref()?;
                Some(BoundTarget {
                    color: color.view.clone(),
                    stencil: fb.stencil.clone(),
                    width: fb.width,
                    height: fb.height,
                    offscreen: true,
                })
            }
        }
    }

    fn encoder(&mut self) -> Option<&mut wgpu::CommandEncoder> {
        if self.lost.load(Ordering::Acquire) {
            return None;
        }
        let core = self.core.as_mut()?;
        if core.encoder.is_none() {
            core.encoder = Some(core.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen encoder"),
            }));
        }
        core.encoder.as_mut()
    }

    fn sampler(&mut self, params: SamplerParams) -> Option<wgpu::Sampler> {
        if let Some(s) = self.samplers.get(&params) {
            return Some(s.clone());
        }
        let core = self.live()?;
        let filter = wgpu_filter(params.scale);
        let address = wgpu_address_mode(params.wrap);
        let sampler = core.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lumen sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            ..Default::default()
        });
        self.samplers.insert(params, sampler.clone());
        Some(sampler)
    }

    fn pipeline(&mut self, key: PipelineKey) -> Option<wgpu::RenderPipeline> {
        if let Some(p) = self.pipelines.get(&key) {
            return Some(p.clone());
        }

        let core = self.live()?;
        let program = self.programs.get(&key.program)?;

        let stencil_face = match key.stencil {
            Some(s) => wgpu::StencilFaceState {
                compare: wgpu_compare(s.compare),
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu_stencil_op(s.op),
            },
            None => wgpu::StencilFaceState::IGNORE,
        };

        let pipeline = core.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&program.label),
            layout: Some(&core.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: key.blend.map(wgpu_blend_state),
                    write_mask: if key.color_write {
                        wgpu::ColorWrites::ALL
                    } else {
                        wgpu::ColorWrites::empty()
                    },
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: match key.cull {
                    Some(false) => wgpu::FrontFace::Cw,
                    _ => wgpu::FrontFace::Ccw,
                },
                cull_mode: key.cull.map(|_| wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: key.has_stencil.then(|| wgpu::DepthStencilState {
                format: STENCIL_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState {
                    front: stencil_face,
                    back: stencil_face,
                    read_mask: key.stencil.map(|s| s.mask).unwrap_or(0),
                    write_mask: if key.stencil.is_some() { 0xFF } else { 0 },
                },
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipelines.insert(key, pipeline.clone());
        Some(pipeline)
    }

    fn clear_pipeline(&mut self, has_stencil: bool) -> Option<wgpu::RenderPipeline> {
        if let Some(p) = self.clear_pipelines.get(&has_stencil) {
            return Some(p.clone());
        }
        let core = self.live()?;

        let layout = core.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lumen clear pipeline layout"),
            bind_group_layouts: &[],
            immediate_size: 0,
        });
        let pipeline = core.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lumen clear pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &core.clear_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &core.clear_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: has_stencil.then(|| wgpu::DepthStencilState {
                format: STENCIL_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.clear_pipelines.insert(has_stencil, pipeline.clone());
        Some(pipeline)
    }

    /// Scissor rectangle in target pixels; `None` means nothing may be drawn.
    fn effective_scissor(&self, target: &BoundTarget) -> Option<PixelRect> {
        let full = PixelRect { x: 0.0, y: 0.0, w: target.width as f32, h: target.height as f32 };
        if !self.state.scissor_test {
            return Some(full);
        }
        let rect = to_pixel_rect(self.state.scissor, target.height, target.offscreen);
        clamp_to_target(rect, target.width, target.height)
    }

    fn clear_with_quad(&mut self, target: &BoundTarget, scissor: PixelRect, color: ColorRgba) {
        let Some(pipeline) = self.clear_pipeline(target.stencil.is_some()) else { return };
        let Some(core) = self.live() else { return };

        let c = color.to_array();
        let quad = [
            Vertex::new([-1.0, -1.0], [0.0, 0.0], c),
            Vertex::new([1.0, -1.0], [0.0, 0.0], c),
            Vertex::new([1.0, 1.0], [0.0, 0.0], c),
            Vertex::new([-1.0, 1.0], [0.0, 0.0], c),
        ];
        let vertices = core.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen clear vertices"),
            contents: bytemuck::cast_slice(&quad),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = core.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen clear indices"),
            contents: bytemuck::cast_slice(&[0u16, 1, 2, 0, 2, 3]),
            usage: wgpu::BufferUsages::INDEX,
        });

        let Some(encoder) = self.encoder() else { return };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lumen scissored clear"),
            color_attachments: &[Some(load_attachment(&target.color))],
            depth_stencil_attachment: target.stencil.as_ref().map(load_stencil_attachment),
            ..Default::default()
        });
        pass.set_pipeline(&pipeline);
        pass.set_scissor_rect(scissor.x as u32, scissor.y as u32, scissor.w as u32, scissor.h as u32);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..6, 0, 0..1);
    }

    fn present(&mut self) {
        let Some(core) = self.core.as_ref() else { return };
        let Some(presenter) = core.presenter.as_ref() else { return };
        let Some(root) = self.root.as_ref() else { return };

        let frame = match presenter.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                let action = map_surface_error(&presenter.surface, &core.device, &presenter.config, err.clone());
                match action {
                    SurfaceErrorAction::Fatal => log::error!("lumen-render: surface error {err:?} is fatal"),
                    _ => log::debug!("lumen-render: surface error {err:?}; {action:?}"),
                }
                self.last_surface_error = Some(action);
                return;
            }
        };
        self.last_surface_error = None;

        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen present bind group"),
            layout: &presenter.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&root.color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&presenter.sampler),
                },
            ],
        });

        let mut encoder = core.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lumen present encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen present pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            pass.set_pipeline(&presenter.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        if !self.options.preserve_buffer_after_present {
            // Discard: the next frame starts from a transparent root.
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen root discard"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &root.color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
        }

        core.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }
}

fn load_attachment(view: &wgpu::TextureView) -> wgpu::RenderPassColorAttachment<'_> {
    wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
        depth_slice: None,
    }
}

fn load_stencil_attachment(view: &wgpu::TextureView) -> wgpu::RenderPassDepthStencilAttachment<'_> {
    wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store }),
        stencil_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store }),
    }
}

impl GpuCore {
    async fn new(
        window: Option<Arc<Window>>,
        size: (u32, u32),
        options: &ContextOptions,
        lost: Arc<AtomicBool>,
    ) -> Result<Self> {
        // Use all backends to allow wgpu to select the optimal platform backend.
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = match window {
            Some(window) => Some(
                instance
                    .create_surface(window)
                    .context("failed to create wgpu surface")?,
            ),
            None => None,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: match options.power_preference {
                    PowerPreference::Default => wgpu::PowerPreference::default(),
                    PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
                    PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
                },
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumen-render device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        device.set_device_lost_callback(move |reason, message| {
            log::warn!("lumen-render: device lost ({reason:?}): {message}");
            lost.store(true, Ordering::Release);
        });

        let mut entries = vec![uniform_entry(0), uniform_entry(1)];
        for unit in 0..TEXTURE_UNITS as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + unit * 2,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 3 + unit * 2,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen program bgl"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lumen program pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let clear_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lumen clear shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/clear.wgsl").into()),
        });

        let empty = create_color_texture(&device, 1, 1, "lumen empty texture");
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &empty.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[0, 0, 0, 0],
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4), rows_per_image: Some(1) },
            wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        );

        let presenter = match surface {
            Some(surface) => Some(Presenter::new(surface, &adapter, &device, size, options)?),
            None => None,
        };

        Ok(Self {
            device,
            queue,
            bind_group_layout,
            pipeline_layout,
            clear_shader,
            empty,
            presenter,
            encoder: None,
        })
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Presenter {
    fn new(
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        size: (u32, u32),
        options: &ContextOptions,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(adapter);
        let format = choose_surface_format(&caps).context("no supported surface formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.0.max(1),
            height: size.1.max(1),
            present_mode: options.present_mode,
            alpha_mode: choose_alpha_mode(&caps, options),
            view_formats: vec![],
            desired_maximum_frame_latency: options.desired_maximum_frame_latency,
        };
        surface.configure(device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lumen present shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/present.wgsl").into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen present bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lumen present pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lumen present pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lumen present sampler"),
            ..Default::default()
        });

        Ok(Self { surface, config, pipeline, bind_group_layout, sampler })
    }
}

impl Backend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn is_context_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire) || self.core.is_none()
    }

    fn restore_context(&mut self) -> anyhow::Result<()> {
        self.core = None;
        self.root = None;
        self.textures.clear();
        self.framebuffers.clear();
        self.programs.clear();
        self.samplers.clear();
        self.pipelines.clear();
        self.clear_pipelines.clear();
        self.state = DrawState::default();

        self.lost.store(false, Ordering::Release);
        let core = pollster::block_on(GpuCore::new(
            self.window.clone(),
            self.drawing_buffer,
            &self.options,
            self.lost.clone(),
        ))
        .context("failed to restore the graphics context")?;
        self.core = Some(core);
        self.rebuild_root();

        log::info!("lumen-render: graphics context restored");
        Ok(())
    }

    fn max_texture_units(&self) -> usize {
        TEXTURE_UNITS
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.drawing_buffer
    }

    fn resize_drawing_buffer(&mut self, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        if size == self.drawing_buffer {
            return;
        }
        self.drawing_buffer = size;

        if let Some(core) = self.core.as_mut()
            && let Some(presenter) = core.presenter.as_mut()
        {
            apply_resize(&presenter.surface, &core.device, &mut presenter.config, width, height);
        }
        self.rebuild_root();
    }

    fn create_texture(&mut self) -> TextureHandle {
        let handle = TextureHandle::from_raw(self.mint());
        self.textures.insert(
            handle,
            GpuTexture { storage: None, width: 0, height: 0, sampler: SamplerParams::default() },
        );
        handle
    }

    fn upload_texture(&mut self, texture: TextureHandle, width: u32, height: u32, pixels: &[u8]) {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() < expected {
            log::warn!(
                "lumen-render: upload of {width}x{height} texture with {} bytes ignored",
                pixels.len()
            );
            return;
        }
        if self.lost.load(Ordering::Acquire) {
            return;
        }
        let Some(core) = self.core.as_ref() else { return };
        let Some(entry) = self.textures.get_mut(&texture) else { return };

        if entry.storage.is_none() || entry.width != width || entry.height != height {
            entry.storage = Some(create_color_texture(&core.device, width, height, "lumen texture"));
            entry.width = width;
            entry.height = height;
        }
        let Some(storage) = entry.storage.as_ref() else { return };

        core.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels[..expected],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
    }

    fn set_sampler(&mut self, texture: TextureHandle, params: SamplerParams) {
        if let Some(entry) = self.textures.get_mut(&texture) {
            entry.sampler = params;
        }
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(&texture)
            && let Some(storage) = entry.storage
        {
            storage.texture.destroy();
        }
        for unit in self.state.units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
    }

    fn bind_texture(&mut self, unit: usize, texture: TextureHandle) {
        if let Some(slot) = self.state.units.get_mut(unit) {
            *slot = Some(texture);
        }
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> FramebufferHandle {
        let color = self.create_texture();
        let handle = FramebufferHandle::from_raw(self.mint());
        if let Some(core) = self.live() {
            let storage = create_color_texture(&core.device, width, height, "lumen framebuffer");
            if let Some(entry) = self.textures.get_mut(&color) {
                entry.storage = Some(storage);
                entry.width = width.max(1);
                entry.height = height.max(1);
            }
        }
        self.framebuffers.insert(
            handle,
            GpuFramebuffer { color, width: width.max(1), height: height.max(1), stencil: None },
        );
        handle
    }

    fn framebuffer_texture(&self, framebuffer: FramebufferHandle) -> Option<TextureHandle> {
        self.framebuffers.get(&framebuffer).map(|fb| fb.color)
    }

    fn resize_framebuffer(&mut self, framebuffer: FramebufferHandle, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        let Some(core) = self.core.as_ref() else { return };
        let Some(fb) = self.framebuffers.get_mut(&framebuffer) else { return };
        if fb.width == width && fb.height == height {
            return;
        }

        fb.width = width;
        fb.height = height;
        if fb.stencil.is_some() {
            fb.stencil = Some(create_stencil_view(&core.device, width, height));
        }
        if let Some(entry) = self.textures.get_mut(&fb.color) {
            if let Some(old) = entry.storage.take() {
                old.texture.destroy();
            }
            entry.storage = Some(create_color_texture(&core.device, width, height, "lumen framebuffer"));
            entry.width = width;
            entry.height = height;
        }
    }

    fn enable_stencil(&mut self, framebuffer: FramebufferHandle) {
        let Some(core) = self.core.as_ref() else { return };
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer)
            && fb.stencil.is_none()
        {
            fb.stencil = Some(create_stencil_view(&core.device, fb.width, fb.height));
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if let Some(fb) = self.framebuffers.remove(&framebuffer) {
            self.delete_texture(fb.color);
        }
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.state.framebuffer = framebuffer;
    }

    fn create_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramHandle> {
        for (stage, text) in [("vertex", &source.vertex), ("fragment", &source.fragment)] {
            wgpu::naga::front::wgsl::parse_str(text)
                .map_err(|e| anyhow::anyhow!("{} stage of `{}`: {}", stage, source.label, e.emit_to_string(text)))?;
        }

        let core = self.live().context("graphics context is lost")?;
        let make = |label: &str, text: &str| {
            core.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(text.to_owned().into()),
            })
        };
        let vertex = make(&format!("{} vs", source.label), &source.vertex);
        let fragment = make(&format!("{} fs", source.label), &source.fragment);

        let layout = UniformBlockLayout::new(&source.uniforms);
        let block = vec![0u8; layout.size()];

        let handle = ProgramHandle::from_raw(self.mint());
        self.programs.insert(
            handle,
            GpuProgram { label: source.label.to_string(), vertex, fragment, layout, block },
        );
        log::debug!("lumen-render: program `{}` created", source.label);
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.state.program = Some(program);
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: &UniformValue) {
        // Samplers are fixed to their unit bindings; nothing to store.
        if let Some(p) = self.programs.get_mut(&program) {
            let GpuProgram { layout, block, .. } = p;
            layout.write(block, name, value);
        }
    }

    fn set_projection(&mut self, projection: &Matrix) {
        self.state.projection = *projection;
    }

    fn set_enabled(&mut self, capability: Capability, enabled: bool) {
        match capability {
            Capability::Blend => self.state.blend = enabled,
            Capability::CullFace => self.state.cull = enabled,
            Capability::ScissorTest => self.state.scissor_test = enabled,
            Capability::StencilTest => self.state.stencil_test = enabled,
            // No depth attachment is ever read.
            Capability::DepthTest => {}
        }
    }

    fn set_front_face(&mut self, clockwise: bool) {
        self.state.clockwise = clockwise;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend_mode = mode;
    }

    fn set_viewport(&mut self, rect: DeviceRect) {
        self.state.viewport = Some(rect);
    }

    fn set_scissor(&mut self, rect: DeviceRect) {
        self.state.scissor = rect;
    }

    fn set_color_mask(&mut self, enabled: bool) {
        self.state.color_mask = enabled;
    }

    fn set_stencil_func(&mut self, func: StencilFunc) {
        self.state.stencil_func = func;
    }

    fn set_stencil_op(&mut self, op: StencilOp) {
        self.state.stencil_op = op;
    }

    fn clear(&mut self, color: ColorRgba) {
        let Some(target) = self.bound_target() else { return };
        let Some(scissor) = self.effective_scissor(&target) else { return };

        let full = scissor.x == 0.0
            && scissor.y == 0.0
            && scissor.w == target.width as f32
            && scissor.h == target.height as f32;
        if !full {
            self.clear_with_quad(&target, scissor, color);
            return;
        }

        let Some(encoder) = self.encoder() else { return };
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lumen clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu_color(color)),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
    }

    fn clear_stencil(&mut self) {
        let Some(target) = self.bound_target() else { return };
        let Some(stencil) = target.stencil.as_ref() else { return };
        let Some(encoder) = self.encoder() else { return };

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lumen clear stencil"),
            color_attachments: &[Some(load_attachment(&target.color))],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: stencil,
                depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store }),
                stencil_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(0), store: wgpu::StoreOp::Store }),
            }),
            ..Default::default()
        });
    }

    fn draw(&mut self, vertices: &[Vertex], indices: &[u16]) {
        if vertices.is_empty() || indices.is_empty() || self.is_context_lost() {
            return;
        }
        let Some(program) = self.state.program else { return };
        let Some(target) = self.bound_target() else { return };
        let Some(scissor) = self.effective_scissor(&target) else { return };

        let requested = self
            .state
            .viewport
            .map(|v| to_pixel_rect(v, target.height, target.offscreen))
            .unwrap_or(PixelRect { x: 0.0, y: 0.0, w: target.width as f32, h: target.height as f32 });
        let Some(viewport) = clamp_to_target(requested, target.width, target.height) else { return };

        // Offscreen rows are stored bottom-up; flip clip space so they land there.
        let mut projection = self.state.projection;
        if target.offscreen {
            projection.prepend(&Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, 0.0));
        }
        if viewport != requested {
            projection.prepend(&viewport_correction(requested, viewport));
        }

        let has_stencil = target.stencil.is_some();
        let stencil = (self.state.stencil_test && has_stencil).then_some(StencilKey {
            compare: self.state.stencil_func.compare,
            mask: self.state.stencil_func.mask,
            op: self.state.stencil_op,
        });
        let key = PipelineKey {
            program,
            blend: self.state.blend.then_some(self.state.blend_mode),
            color_write: self.state.color_mask,
            // The y flip mirrors winding on offscreen targets.
            cull: self.state.cull.then_some(self.state.clockwise == target.offscreen),
            has_stencil,
            stencil,
        };
        let Some(pipeline) = self.pipeline(key) else { return };

        let units = self.state.units;
        let mut bound = Vec::with_capacity(TEXTURE_UNITS);
        for unit in units {
            let entry = unit.and_then(|h| self.textures.get(&h));
            let view = entry.and_then(|t| t.storage.as_ref()).map(|s| s.view.clone());
            let params = entry.map(|t| t.sampler).unwrap_or_default();
            let Some(sampler) = self.sampler(params) else { return };
            bound.push((view, sampler));
        }

        let Some(core) = self.live() else { return };
        let Some(gpu_program) = self.programs.get(&program) else { return };

        let globals = core.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen globals"),
            contents: bytemuck::bytes_of(&GlobalsUniform { projection: projection.to_mat3_columns() }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let params = core.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen program uniforms"),
            contents: &gpu_program.block,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let vertex_buffer = core.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen vertices"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = core.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen indices"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let mut entries = vec![
            wgpu::BindGroupEntry { binding: 0, resource: globals.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: params.as_entire_binding() },
        ];
        for (unit, (view, sampler)) in bound.iter().enumerate() {
            let view = view.as_ref().unwrap_or(&core.empty.view);
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + unit as u32 * 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 3 + unit as u32 * 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen draw bind group"),
            layout: &core.bind_group_layout,
            entries: &entries,
        });

        let reference = self.state.stencil_func.reference;
        let Some(encoder) = self.encoder() else { return };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lumen draw pass"),
            color_attachments: &[Some(load_attachment(&target.color))],
            depth_stencil_attachment: target.stencil.as_ref().map(load_stencil_attachment),
            ..Default::default()
        });

        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_viewport(viewport.x, viewport.y, viewport.w, viewport.h, 0.0, 1.0);
        pass.set_scissor_rect(scissor.x as u32, scissor.y as u32, scissor.w as u32, scissor.h as u32);
        if has_stencil {
            pass.set_stencil_reference(reference);
        }
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..indices.len() as u32, 0, 0..1);
    }

    fn submit(&mut self, present: bool) {
        if self.lost.load(Ordering::Acquire) {
            return;
        }
        if let Some(core) = self.core.as_mut()
            && let Some(encoder) = core.encoder.take()
        {
            core.queue.submit(std::iter::once(encoder.finish()));
        }
        if present {
            self.present();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_rects_flip_to_top_left() {
        let r = to_pixel_rect(DeviceRect::new(10, 20, 30, 40), 100, false);
        assert_eq!(r, PixelRect { x: 10.0, y: 40.0, w: 30.0, h: 40.0 });
    }

    #[test]
    fn offscreen_rects_keep_their_rows() {
        let r = to_pixel_rect(DeviceRect::new(10, 20, 30, 40), 100, true);
        assert_eq!(r, PixelRect { x: 10.0, y: 20.0, w: 30.0, h: 40.0 });
    }

    #[test]
    fn clamp_drops_rects_outside_the_target() {
        let outside = PixelRect { x: 120.0, y: 0.0, w: 10.0, h: 10.0 };
        assert_eq!(clamp_to_target(outside, 100, 100), None);

        let partial = PixelRect { x: -10.0, y: 90.0, w: 30.0, h: 30.0 };
        assert_eq!(
            clamp_to_target(partial, 100, 100),
            Some(PixelRect { x: 0.0, y: 90.0, w: 20.0, h: 10.0 })
        );
    }

    #[test]
    fn viewport_correction_preserves_pixel_positions() {
        let requested = PixelRect { x: -50.0, y: 0.0, w: 200.0, h: 100.0 };
        let clamped = PixelRect { x: 0.0, y: 0.0, w: 100.0, h: 100.0 };
        let m = viewport_correction(requested, clamped);

        // Requested NDC x = 0 sits at pixel 50, which is NDC 0 of the clamped viewport.
        let p = m.apply(crate::coords::Vec2::new(0.0, 0.0));
        assert!((p.x - 0.0).abs() < 1e-5);
        // Requested NDC x = 1 sits at pixel 150, NDC 2 of the clamped viewport.
        let p = m.apply(crate::coords::Vec2::new(1.0, 1.0));
        assert!((p.x - 2.0).abs() < 1e-5);
        assert!((p.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blend_states_follow_mode_factors() {
        let state = wgpu_blend_state(BlendMode::Normal);
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);

        let npm = wgpu_blend_state(BlendMode::NormalNpm);
        assert_eq!(npm.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(npm.alpha.src_factor, wgpu::BlendFactor::One);
    }
}
