//! wgpu implementation of [`RenderDevice`]
//!
//! Owns the instance, surface, device and queue, and maps opaque `u64`
//! handles to live wgpu objects. Render pass commands are buffered in a
//! [`PendingRenderPass`] and flushed as one wgpu pass on `end_render_pass`,
//! which keeps the trait object-safe and lifetime-free.
//!
//! The swapchain is exposed through sentinel handles: `begin_frame` hands out
//! a texture and view whose ids stand for "the current surface frame", and
//! every method that consumes handles resolves the sentinel against the frame
//! in flight.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Sentinel id for the current swapchain texture and its view.
const SWAPCHAIN_ID: u64 = u64::MAX;

/// Handles for the frame acquired by [`WgpuDevice::begin_frame`]
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub swapchain_texture: TextureHandle,
    pub swapchain_view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

enum RenderCommand {
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    SetPipeline(u64),
    SetBindGroup {
        index: u32,
        bind_group: u64,
    },
    BindTextureSampler {
        group: u32,
        view: u64,
        sampler: u64,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: u64,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: u64,
        offset: u64,
        format: IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

struct PendingRenderPass {
    desc: RenderPassDescriptor,
    commands: Vec<RenderCommand>,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    _window: Arc<winit::window::Window>,

    next_id: u64,
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, wgpu::Texture>,
    views: HashMap<u64, wgpu::TextureView>,
    samplers: HashMap<u64, wgpu::Sampler>,
    pipelines: HashMap<u64, wgpu::RenderPipeline>,
    bind_groups: HashMap<u64, wgpu::BindGroup>,
    bind_group_layouts: HashMap<u64, wgpu::BindGroupLayout>,

    /// Layout for the transient texture + sampler groups behind
    /// `bind_texture_sampler`: texture at binding 0, sampler at binding 1,
    /// fragment visibility.
    texture_sampler_layout: BindGroupLayoutHandle,
    texture_sampler_groups: HashMap<(u64, u64), wgpu::BindGroup>,

    encoder: Option<wgpu::CommandEncoder>,
    pending_pass: Option<PendingRenderPass>,
    current_frame: Option<wgpu::SurfaceTexture>,
    current_frame_view: Option<wgpu::TextureView>,
}

impl WgpuDevice {
    /// Create the device for a window, blocking on async setup.
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> RenderResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| RenderError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
        {
            Some(adapter) => adapter,
            None => instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: Some(&surface),
                    force_fallback_adapter: true,
                })
                .await
                .ok_or_else(|| {
                    RenderError::InitializationFailed("no compatible adapter found".into())
                })?,
        };
        log::info!("using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("scene renderer device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| {
                matches!(
                    f,
                    wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Rgba8Unorm
                )
            })
            .unwrap_or(caps.formats[0]);

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            // COPY_DST because finished frames are copied onto the surface
            // rather than rendered to it directly.
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture sampler layout"),
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

        let mut device = Self {
            device,
            queue,
            surface,
            surface_config,
            _window: window,
            next_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            samplers: HashMap::new(),
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            texture_sampler_layout: BindGroupLayoutHandle(0),
            texture_sampler_groups: HashMap::new(),
            encoder: None,
            pending_pass: None,
            current_frame: None,
            current_frame_view: None,
        };
        let handle = BindGroupLayoutHandle(device.mint());
        device.bind_group_layouts.insert(handle.0, layout);
        device.texture_sampler_layout = handle;
        Ok(device)
    }

    fn mint(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// The layout used by `bind_texture_sampler`. Pipelines whose draws rely
    /// on late texture binding must include it at the matching group index.
    pub fn texture_sampler_layout(&self) -> BindGroupLayoutHandle {
        self.texture_sampler_layout
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    pub fn swapchain_format(&self) -> TextureFormat {
        match self.surface_config.format {
            wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
            wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
            _ => TextureFormat::Bgra8Unorm,
        }
    }

    /// Reconfigure the surface for a new window size. Zero dimensions are
    /// clamped to 1, oversized ones to the adapter limit.
    pub fn resize(&mut self, width: u32, height: u32) {
        let max = self.device.limits().max_texture_dimension_2d;
        self.surface_config.width = width.clamp(1, max);
        self.surface_config.height = height.clamp(1, max);
        self.surface.configure(&self.device, &self.surface_config);
        log::debug!(
            "surface resized to {}x{}",
            self.surface_config.width,
            self.surface_config.height
        );
    }

    /// Acquire the next swapchain frame and open the frame encoder.
    pub fn begin_frame(&mut self) -> RenderResult<FrameContext> {
        assert!(self.current_frame.is_none(), "frame already in flight");
        let frame = self.surface.get_current_texture().map_err(|e| match e {
            wgpu::SurfaceError::OutOfMemory => RenderError::OutOfMemory,
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => RenderError::SurfaceLost,
            other => RenderError::AcquireImageFailed(other.to_string()),
        })?;
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.current_frame = Some(frame);
        self.current_frame_view = Some(view);
        self.encoder = Some(self.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            },
        ));
        Ok(FrameContext {
            swapchain_texture: TextureHandle(SWAPCHAIN_ID),
            swapchain_view: TextureViewHandle(SWAPCHAIN_ID),
            width: self.surface_config.width,
            height: self.surface_config.height,
        })
    }

    /// Submit the frame encoder and present the swapchain frame.
    pub fn end_frame(&mut self) {
        assert!(
            self.pending_pass.is_none(),
            "frame ended with an open render pass"
        );
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.current_frame_view = None;
        if let Some(frame) = self.current_frame.take() {
            frame.present();
        }
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("out of frame encoder"),
                }),
        }
    }

    fn view_ref(&self, handle: TextureViewHandle) -> &wgpu::TextureView {
        if handle.0 == SWAPCHAIN_ID {
            self.current_frame_view
                .as_ref()
                .expect("swapchain view used outside begin_frame/end_frame")
        } else {
            self.views
                .get(&handle.0)
                .unwrap_or_else(|| panic!("unknown texture view {handle:?}"))
        }
    }

    fn texture_ref(&self, handle: TextureHandle) -> &wgpu::Texture {
        if handle.0 == SWAPCHAIN_ID {
            &self
                .current_frame
                .as_ref()
                .expect("swapchain texture used outside begin_frame/end_frame")
                .texture
        } else {
            self.textures
                .get(&handle.0)
                .unwrap_or_else(|| panic!("unknown texture {handle:?}"))
        }
    }

    fn pending_mut(&mut self) -> &mut PendingRenderPass {
        self.pending_pass
            .as_mut()
            .expect("render pass command recorded outside a render pass")
    }
}

fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    out
}

fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::COPY_SRC) {
        out |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        out |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    out
}

fn convert_filter(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn convert_address(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn convert_index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32 => wgpu::VertexFormat::Float32,
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

fn convert_color(color: Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r as f64,
        g: color.g as f64,
        b: color.b as f64,
        a: color.a as f64,
    }
}

impl RenderDevice for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });
        let handle = BufferHandle(self.mint());
        self.buffers.insert(handle.0, buffer);
        Ok(handle)
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> RenderResult<BufferHandle> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label.as_deref(),
                contents: data,
                usage: convert_buffer_usage(desc.usage),
            });
        let handle = BufferHandle(self.mint());
        self.buffers.insert(handle.0, buffer);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let buffer = self
            .buffers
            .get(&buffer.0)
            .unwrap_or_else(|| panic!("unknown buffer {buffer:?}"));
        self.queue.write_buffer(buffer, offset, data);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::TextureCreationFailed(format!(
                "zero-sized texture {}x{}",
                desc.width, desc.height
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: convert_texture_format(desc.format),
            usage: convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let handle = TextureHandle(self.mint());
        self.textures.insert(handle.0, texture);
        Ok(handle)
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> RenderResult<TextureViewHandle> {
        if texture.0 == SWAPCHAIN_ID {
            return Ok(TextureViewHandle(SWAPCHAIN_ID));
        }
        let texture = self.textures.get(&texture.0).ok_or_else(|| {
            RenderError::TextureViewCreationFailed(format!("unknown texture {texture:?}"))
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = TextureViewHandle(self.mint());
        self.views.insert(handle.0, view);
        Ok(handle)
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> RenderResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: convert_address(desc.address_mode_u),
            address_mode_v: convert_address(desc.address_mode_v),
            address_mode_w: convert_address(desc.address_mode_w),
            mag_filter: convert_filter(desc.mag_filter),
            min_filter: convert_filter(desc.min_filter),
            mipmap_filter: convert_filter(desc.mipmap_filter),
            ..Default::default()
        });
        let handle = SamplerHandle(self.mint());
        self.samplers.insert(handle.0, sampler);
        Ok(handle)
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> RenderResult<BindGroupLayoutHandle> {
        let entries: Vec<_> = entries
            .iter()
            .map(|entry| {
                let mut visibility = wgpu::ShaderStages::empty();
                if entry.visibility.contains(ShaderStageFlags::VERTEX) {
                    visibility |= wgpu::ShaderStages::VERTEX;
                }
                if entry.visibility.contains(ShaderStageFlags::FRAGMENT) {
                    visibility |= wgpu::ShaderStages::FRAGMENT;
                }
                wgpu::BindGroupLayoutEntry {
                    binding: entry.binding,
                    visibility,
                    ty: match entry.ty {
                        BindingType::UniformBuffer => wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        BindingType::Texture => wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        BindingType::Sampler => {
                            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                        }
                    },
                    count: None,
                }
            })
            .collect();
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &entries,
            });
        let handle = BindGroupLayoutHandle(self.mint());
        self.bind_group_layouts.insert(handle.0, layout);
        Ok(handle)
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> RenderResult<BindGroupHandle> {
        let layout = self.bind_group_layouts.get(&layout.0).ok_or_else(|| {
            RenderError::PipelineCreationFailed(format!("unknown bind group layout {layout:?}"))
        })?;
        let entries: Vec<_> = entries
            .iter()
            .map(|(binding, entry)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match entry {
                    BindGroupEntry::Buffer {
                        buffer,
                        offset,
                        size,
                    } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: self
                            .buffers
                            .get(&buffer.0)
                            .unwrap_or_else(|| panic!("unknown buffer {buffer:?}")),
                        offset: *offset,
                        size: size.and_then(NonZeroU64::new),
                    }),
                    BindGroupEntry::Texture(view) => wgpu::BindingResource::TextureView(
                        self.views
                            .get(&view.0)
                            .unwrap_or_else(|| panic!("unknown texture view {view:?}")),
                    ),
                    BindGroupEntry::Sampler(sampler) => wgpu::BindingResource::Sampler(
                        self.samplers
                            .get(&sampler.0)
                            .unwrap_or_else(|| panic!("unknown sampler {sampler:?}")),
                    ),
                },
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &entries,
        });
        let handle = BindGroupHandle(self.mint());
        self.bind_groups.insert(handle.0, bind_group);
        Ok(handle)
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> RenderResult<RenderPipelineHandle> {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.shader.as_str().into()),
            });

        let layouts: Vec<&wgpu::BindGroupLayout> = desc
            .bind_group_layouts
            .iter()
            .map(|handle| {
                self.bind_group_layouts
                    .get(&handle.0)
                    .unwrap_or_else(|| panic!("unknown bind group layout {handle:?}"))
            })
            .collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: desc.label.as_deref(),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attr| wgpu::VertexAttribute {
                        format: convert_vertex_format(attr.format),
                        offset: attr.offset,
                        shader_location: attr.location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attrs)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    compilation_options: Default::default(),
                    buffers: &vertex_buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: convert_texture_format(desc.color_format),
                        blend: if desc.blend_enabled {
                            Some(wgpu::BlendState::ALPHA_BLENDING)
                        } else {
                            None
                        },
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: desc.depth_format.map(|format| wgpu::DepthStencilState {
                    format: convert_texture_format(format),
                    depth_write_enabled: !desc.blend_enabled,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: desc.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            });
        let handle = RenderPipelineHandle(self.mint());
        self.pipelines.insert(handle.0, pipeline);
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            panic!("destroy of unknown or already-destroyed buffer {buffer:?}");
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture.0) {
            Some(t) => t.destroy(),
            None => panic!("destroy of unknown or already-destroyed texture {texture:?}"),
        }
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        if view.0 == SWAPCHAIN_ID {
            return;
        }
        if self.views.remove(&view.0).is_none() {
            panic!("destroy of unknown or already-destroyed texture view {view:?}");
        }
        self.texture_sampler_groups.retain(|(v, _), _| *v != view.0);
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if self.samplers.remove(&sampler.0).is_none() {
            panic!("destroy of unknown or already-destroyed sampler {sampler:?}");
        }
        self.texture_sampler_groups
            .retain(|(_, s), _| *s != sampler.0);
    }

    fn copy_texture_to_texture(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        width: u32,
        height: u32,
    ) {
        assert!(
            self.pending_pass.is_none(),
            "texture copy issued inside a render pass"
        );
        let mut encoder = self.take_encoder();
        encoder.copy_texture_to_texture(
            self.texture_ref(src).as_image_copy(),
            self.texture_ref(dst).as_image_copy(),
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.encoder = Some(encoder);
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        assert!(
            self.pending_pass.is_none(),
            "render pass begun while another is open"
        );
        self.pending_pass = Some(PendingRenderPass {
            desc: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let pending = self
            .pending_pass
            .take()
            .expect("render pass ended without a matching begin");

        // Transient texture + sampler groups have to exist before the pass
        // borrows the maps immutably.
        let layout_id = self.texture_sampler_layout.0;
        for command in &pending.commands {
            if let RenderCommand::BindTextureSampler { view, sampler, .. } = command {
                assert!(
                    *view != SWAPCHAIN_ID,
                    "swapchain view cannot be bound for sampling"
                );
                if !self.texture_sampler_groups.contains_key(&(*view, *sampler)) {
                    let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("late texture sampler group"),
                        layout: &self.bind_group_layouts[&layout_id],
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(
                                    self.views
                                        .get(view)
                                        .unwrap_or_else(|| panic!("unknown texture view {view}")),
                                ),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::Sampler(
                                    self.samplers
                                        .get(sampler)
                                        .unwrap_or_else(|| panic!("unknown sampler {sampler}")),
                                ),
                            },
                        ],
                    });
                    self.texture_sampler_groups
                        .insert((*view, *sampler), bind_group);
                }
            }
        }

        let mut encoder = self.take_encoder();
        {
            let color_attachment = pending.desc.color_attachment.as_ref().map(|attachment| {
                Some(wgpu::RenderPassColorAttachment {
                    view: self.view_ref(attachment.view),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match attachment.load_op {
                            LoadOp::Clear(color) => wgpu::LoadOp::Clear(convert_color(color)),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: match attachment.store_op {
                            StoreOp::Store => wgpu::StoreOp::Store,
                            StoreOp::Discard => wgpu::StoreOp::Discard,
                        },
                    },
                })
            });
            let depth_attachment = pending.desc.depth_attachment.as_ref().map(|attachment| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: self.view_ref(attachment.view),
                    depth_ops: Some(wgpu::Operations {
                        load: match attachment.clear_depth {
                            Some(depth) => wgpu::LoadOp::Clear(depth),
                            None => wgpu::LoadOp::Load,
                        },
                        store: match attachment.store_op {
                            StoreOp::Store => wgpu::StoreOp::Store,
                            StoreOp::Discard => wgpu::StoreOp::Discard,
                        },
                    }),
                    stencil_ops: None,
                }
            });

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pending.desc.label.as_deref(),
                color_attachments: match &color_attachment {
                    Some(attachment) => std::slice::from_ref(attachment),
                    None => &[],
                },
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for command in &pending.commands {
                match command {
                    RenderCommand::SetViewport {
                        x,
                        y,
                        width,
                        height,
                        min_depth,
                        max_depth,
                    } => rpass.set_viewport(*x, *y, *width, *height, *min_depth, *max_depth),
                    RenderCommand::SetPipeline(pipeline) => rpass.set_pipeline(
                        self.pipelines
                            .get(pipeline)
                            .unwrap_or_else(|| panic!("unknown pipeline {pipeline}")),
                    ),
                    RenderCommand::SetBindGroup { index, bind_group } => rpass.set_bind_group(
                        *index,
                        self.bind_groups
                            .get(bind_group)
                            .unwrap_or_else(|| panic!("unknown bind group {bind_group}")),
                        &[],
                    ),
                    RenderCommand::BindTextureSampler {
                        group,
                        view,
                        sampler,
                    } => rpass.set_bind_group(
                        *group,
                        &self.texture_sampler_groups[&(*view, *sampler)],
                        &[],
                    ),
                    RenderCommand::SetVertexBuffer {
                        slot,
                        buffer,
                        offset,
                    } => rpass.set_vertex_buffer(
                        *slot,
                        self.buffers
                            .get(buffer)
                            .unwrap_or_else(|| panic!("unknown buffer {buffer}"))
                            .slice(*offset..),
                    ),
                    RenderCommand::SetIndexBuffer {
                        buffer,
                        offset,
                        format,
                    } => rpass.set_index_buffer(
                        self.buffers
                            .get(buffer)
                            .unwrap_or_else(|| panic!("unknown buffer {buffer}"))
                            .slice(*offset..),
                        convert_index_format(*format),
                    ),
                    RenderCommand::Draw {
                        vertices,
                        instances,
                    } => rpass.draw(vertices.clone(), instances.clone()),
                    RenderCommand::DrawIndexed {
                        indices,
                        base_vertex,
                        instances,
                    } => rpass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
                }
            }
        }
        self.encoder = Some(encoder);
    }

    fn set_viewport(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) {
        self.pending_mut().commands.push(RenderCommand::SetViewport {
            x,
            y,
            width,
            height,
            min_depth,
            max_depth,
        });
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.pending_mut()
            .commands
            .push(RenderCommand::SetPipeline(pipeline.0));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.pending_mut().commands.push(RenderCommand::SetBindGroup {
            index,
            bind_group: bind_group.0,
        });
    }

    fn bind_texture_sampler(
        &mut self,
        group: u32,
        view: TextureViewHandle,
        sampler: SamplerHandle,
    ) {
        self.pending_mut()
            .commands
            .push(RenderCommand::BindTextureSampler {
                group,
                view: view.0,
                sampler: sampler.0,
            });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.pending_mut()
            .commands
            .push(RenderCommand::SetVertexBuffer {
                slot,
                buffer: buffer.0,
                offset,
            });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.pending_mut()
            .commands
            .push(RenderCommand::SetIndexBuffer {
                buffer: buffer.0,
                offset,
                format,
            });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.pending_mut().commands.push(RenderCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pending_mut().commands.push(RenderCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
