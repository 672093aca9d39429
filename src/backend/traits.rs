//! The graphics-device abstraction the orchestration core renders against
//!
//! The core never talks to a concrete GPU API. Everything goes through
//! [`RenderDevice`]: resource creation from declarative descriptors, render
//! pass recording, draw submission, and the texture-to-texture copy that
//! backs render target resolves. Two implementations ship with the crate:
//! [`WgpuDevice`](crate::backend::wgpu_device::WgpuDevice) for real output
//! and [`RecordingDevice`](crate::backend::recording::RecordingDevice) for
//! headless runs and tests.
//!
//! Swapchain acquisition and presentation are deliberately not part of the
//! trait: the frame loop owns the concrete device and hands the core an
//! externally supplied texture handle as the presentation sink.

use crate::backend::types::*;
use std::any::Any;
use std::ops::Range;
use thiserror::Error;

/// Device error type
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("failed to create texture view: {0}")]
    TextureViewCreationFailed(String),
    #[error("failed to create sampler: {0}")]
    SamplerCreationFailed(String),
    #[error("failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("failed to initialize device: {0}")]
    InitializationFailed(String),
    #[error("failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("surface lost")]
    SurfaceLost,
    #[error("out of memory")]
    OutOfMemory,
    #[error("device lost")]
    DeviceLost,
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub(crate) u64);

/// Handle to a render pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineHandle(pub(crate) u64);

/// Handle to a bind group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(pub(crate) u64);

/// Handle to a bind group layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutHandle(pub(crate) u64);

/// Abstract graphics device
///
/// Object safe so that orchestration code, pass closures, and populator
/// hooks can all share one `&mut dyn RenderDevice` borrow.
pub trait RenderDevice {
    // Resource creation

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle>;

    /// Create a buffer with initial data
    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> RenderResult<BufferHandle>;

    /// Write data to a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<TextureHandle>;

    /// Create a view over a texture
    fn create_texture_view(&mut self, texture: TextureHandle) -> RenderResult<TextureViewHandle>;

    /// Create a sampler
    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> RenderResult<SamplerHandle>;

    /// Create a bind group layout
    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> RenderResult<BindGroupLayoutHandle>;

    /// Create a bind group
    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> RenderResult<BindGroupHandle>;

    /// Create a render pipeline
    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> RenderResult<RenderPipelineHandle>;

    // Resource destruction

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Destroy a texture view
    fn destroy_texture_view(&mut self, view: TextureViewHandle);

    /// Destroy a sampler
    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    // Copies

    /// Copy the full contents of one texture into another. This is the
    /// resolve primitive: render targets are copied into read-optimized or
    /// caller-owned textures with it. Must be called outside a render pass.
    fn copy_texture_to_texture(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        width: u32,
        height: u32,
    );

    // Render pass recording

    /// Open a render pass with the given attachments
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// Close the current render pass
    fn end_render_pass(&mut self);

    /// Set the viewport for the current pass
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32);

    /// Set the render pipeline
    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    /// Set a bind group
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle);

    /// Bind a combined texture + sampler at the given group index. Devices
    /// realize this as a transient bind group; it exists so that resources
    /// resolved mid-frame can be attached to already-recorded draws.
    fn bind_texture_sampler(&mut self, group: u32, view: TextureViewHandle, sampler: SamplerHandle);

    /// Set a vertex buffer
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    /// Set the index buffer
    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    /// Draw primitives
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Draw indexed primitives
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    // Downcasting, for device-specific work inside pass closures

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
