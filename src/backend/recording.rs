//! Headless recording device
//!
//! [`RecordingDevice`] implements [`RenderDevice`] without a GPU: it mints
//! handles, keeps every descriptor, and logs each call as a [`DeviceEvent`].
//! It also tracks a simple content model: a texture "contains" the solid
//! color it was last cleared to, and copies propagate that color. That is
//! enough to observe resolve ordering and the one-frame feedback lag from
//! tests or dry runs.
//!
//! Protocol misuse (destroying an unknown handle, drawing outside a pass,
//! nesting passes) panics immediately rather than being tolerated, since it
//! always indicates an orchestration bug.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::any::Any;
use std::collections::HashMap;
use std::ops::Range;

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    TextureCreated(TextureHandle),
    TextureDestroyed(TextureHandle),
    SamplerCreated(SamplerHandle),
    SamplerDestroyed(SamplerHandle),
    BufferCreated(BufferHandle),
    BufferDestroyed(BufferHandle),
    PassBegun { label: Option<String> },
    PassEnded,
    PipelineSet(RenderPipelineHandle),
    TextureSamplerBound {
        group: u32,
        view: TextureViewHandle,
        sampler: SamplerHandle,
    },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    TextureCopied { src: TextureHandle, dst: TextureHandle },
}

struct TextureRecord {
    desc: TextureDescriptor,
    /// Solid-color content model: the color the texture was last cleared or
    /// copied to, if any.
    content: Option<Color>,
}

/// A GPU-less [`RenderDevice`] that records everything it is asked to do
#[derive(Default)]
pub struct RecordingDevice {
    next_handle: u64,
    events: Vec<DeviceEvent>,

    textures: HashMap<u64, TextureRecord>,
    views: HashMap<u64, u64>,
    samplers: HashMap<u64, SamplerDescriptor>,
    buffers: HashMap<u64, BufferDescriptor>,

    texture_allocations: usize,
    sampler_allocations: usize,

    in_pass: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Every call recorded so far, in order
    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    /// Labels of all passes begun so far, in order
    pub fn pass_labels(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::PassBegun { label } => Some(label.clone().unwrap_or_default()),
                _ => None,
            })
            .collect()
    }

    /// Number of draw calls recorded inside the pass with the given label.
    /// Counts every pass instance with that label.
    pub fn draws_in_pass(&self, label: &str) -> usize {
        let mut draws = 0;
        let mut counting = false;
        for event in &self.events {
            match event {
                DeviceEvent::PassBegun { label: l } => {
                    counting = l.as_deref() == Some(label);
                }
                DeviceEvent::PassEnded => counting = false,
                DeviceEvent::Draw { .. } | DeviceEvent::DrawIndexed { .. } if counting => {
                    draws += 1;
                }
                _ => {}
            }
        }
        draws
    }

    /// Total draw calls recorded so far
    pub fn total_draws(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Draw { .. } | DeviceEvent::DrawIndexed { .. }))
            .count()
    }

    /// Number of currently live textures
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Number of currently live samplers
    pub fn live_samplers(&self) -> usize {
        self.samplers.len()
    }

    /// Total texture allocations since creation (never decremented)
    pub fn texture_allocations(&self) -> usize {
        self.texture_allocations
    }

    /// Total sampler allocations since creation (never decremented)
    pub fn sampler_allocations(&self) -> usize {
        self.sampler_allocations
    }

    /// The descriptor a live texture was created with
    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0).map(|r| &r.desc)
    }

    /// Solid-color content of a live texture, per the content model
    pub fn texture_content(&self, texture: TextureHandle) -> Option<Color> {
        self.textures.get(&texture.0).and_then(|r| r.content)
    }

    /// Solid-color content of the texture behind a view
    pub fn view_content(&self, view: TextureViewHandle) -> Option<Color> {
        let texture = self.views.get(&view.0)?;
        self.textures.get(texture).and_then(|r| r.content)
    }

    fn texture_of_view(&self, view: TextureViewHandle) -> u64 {
        *self
            .views
            .get(&view.0)
            .unwrap_or_else(|| panic!("unknown texture view {view:?}"))
    }
}

impl RenderDevice for RecordingDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle> {
        let handle = BufferHandle(self.mint());
        self.buffers.insert(handle.0, desc.clone());
        self.events.push(DeviceEvent::BufferCreated(handle));
        Ok(handle)
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        _data: &[u8],
    ) -> RenderResult<BufferHandle> {
        self.create_buffer(desc)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, _offset: u64, _data: &[u8]) {
        assert!(
            self.buffers.contains_key(&buffer.0),
            "write to unknown buffer {buffer:?}"
        );
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::TextureCreationFailed(format!(
                "zero-sized texture {}x{}",
                desc.width, desc.height
            )));
        }
        let handle = TextureHandle(self.mint());
        self.textures.insert(
            handle.0,
            TextureRecord {
                desc: desc.clone(),
                content: None,
            },
        );
        self.texture_allocations += 1;
        self.events.push(DeviceEvent::TextureCreated(handle));
        log::trace!("recording: created texture {handle:?} ({desc:?})");
        Ok(handle)
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> RenderResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(RenderError::TextureViewCreationFailed(format!(
                "unknown texture {texture:?}"
            )));
        }
        let handle = TextureViewHandle(self.mint());
        self.views.insert(handle.0, texture.0);
        Ok(handle)
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> RenderResult<SamplerHandle> {
        let handle = SamplerHandle(self.mint());
        self.samplers.insert(handle.0, desc.clone());
        self.sampler_allocations += 1;
        self.events.push(DeviceEvent::SamplerCreated(handle));
        Ok(handle)
    }

    fn create_bind_group_layout(
        &mut self,
        _entries: &[BindGroupLayoutEntry],
    ) -> RenderResult<BindGroupLayoutHandle> {
        Ok(BindGroupLayoutHandle(self.mint()))
    }

    fn create_bind_group(
        &mut self,
        _layout: BindGroupLayoutHandle,
        _entries: &[(u32, BindGroupEntry)],
    ) -> RenderResult<BindGroupHandle> {
        Ok(BindGroupHandle(self.mint()))
    }

    fn create_render_pipeline(
        &mut self,
        _desc: &RenderPipelineDescriptor,
    ) -> RenderResult<RenderPipelineHandle> {
        Ok(RenderPipelineHandle(self.mint()))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        assert!(
            self.buffers.remove(&buffer.0).is_some(),
            "destroy of unknown or already-destroyed buffer {buffer:?}"
        );
        self.events.push(DeviceEvent::BufferDestroyed(buffer));
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        assert!(
            self.textures.remove(&texture.0).is_some(),
            "destroy of unknown or already-destroyed texture {texture:?}"
        );
        self.events.push(DeviceEvent::TextureDestroyed(texture));
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        assert!(
            self.views.remove(&view.0).is_some(),
            "destroy of unknown or already-destroyed texture view {view:?}"
        );
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        assert!(
            self.samplers.remove(&sampler.0).is_some(),
            "destroy of unknown or already-destroyed sampler {sampler:?}"
        );
        self.events.push(DeviceEvent::SamplerDestroyed(sampler));
    }

    fn copy_texture_to_texture(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        _width: u32,
        _height: u32,
    ) {
        assert!(!self.in_pass, "texture copy issued inside a render pass");
        let content = self
            .textures
            .get(&src.0)
            .unwrap_or_else(|| panic!("copy from unknown texture {src:?}"))
            .content;
        let dst_record = self
            .textures
            .get_mut(&dst.0)
            .unwrap_or_else(|| panic!("copy into unknown texture {dst:?}"));
        dst_record.content = content;
        self.events.push(DeviceEvent::TextureCopied { src, dst });
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        assert!(!self.in_pass, "render pass begun while another is open");
        self.in_pass = true;

        if let Some(color) = &desc.color_attachment {
            let texture = self.texture_of_view(color.view);
            if let LoadOp::Clear(clear) = color.load_op {
                if let Some(record) = self.textures.get_mut(&texture) {
                    record.content = Some(clear);
                }
            }
        }
        if let Some(depth) = &desc.depth_attachment {
            // Validate the view; depth content is not modeled.
            let _ = self.texture_of_view(depth.view);
        }

        self.events.push(DeviceEvent::PassBegun {
            label: desc.label.clone(),
        });
    }

    fn end_render_pass(&mut self) {
        assert!(self.in_pass, "render pass ended without a matching begin");
        self.in_pass = false;
        self.events.push(DeviceEvent::PassEnded);
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, _w: f32, _h: f32, _min: f32, _max: f32) {
        assert!(self.in_pass, "viewport set outside a render pass");
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        assert!(self.in_pass, "pipeline set outside a render pass");
        self.events.push(DeviceEvent::PipelineSet(pipeline));
    }

    fn set_bind_group(&mut self, _index: u32, _bind_group: BindGroupHandle) {
        assert!(self.in_pass, "bind group set outside a render pass");
    }

    fn bind_texture_sampler(&mut self, group: u32, view: TextureViewHandle, sampler: SamplerHandle) {
        assert!(self.in_pass, "texture binding outside a render pass");
        self.events.push(DeviceEvent::TextureSamplerBound { group, view, sampler });
    }

    fn set_vertex_buffer(&mut self, _slot: u32, buffer: BufferHandle, _offset: u64) {
        assert!(self.in_pass, "vertex buffer set outside a render pass");
        assert!(
            self.buffers.contains_key(&buffer.0),
            "unknown vertex buffer {buffer:?}"
        );
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, _format: IndexFormat) {
        assert!(self.in_pass, "index buffer set outside a render pass");
        assert!(
            self.buffers.contains_key(&buffer.0),
            "unknown index buffer {buffer:?}"
        );
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        assert!(self.in_pass, "draw outside a render pass");
        self.events.push(DeviceEvent::Draw {
            vertex_count: vertices.end - vertices.start,
            instance_count: instances.end - instances.start,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, instances: Range<u32>) {
        assert!(self.in_pass, "draw outside a render pass");
        self.events.push(DeviceEvent::DrawIndexed {
            index_count: indices.end - indices.start,
            instance_count: instances.end - instances.start,
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_sets_content_and_copy_propagates_it() {
        let mut device = RecordingDevice::new();
        let src = device.create_texture(&TextureDescriptor::default()).unwrap();
        let src_view = device.create_texture_view(src).unwrap();
        let dst = device.create_texture(&TextureDescriptor::default()).unwrap();

        let red = Color::new(1.0, 0.0, 0.0, 1.0);
        device.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear".into()),
            color_attachment: Some(ColorAttachment {
                view: src_view,
                load_op: LoadOp::Clear(red),
                store_op: StoreOp::Store,
            }),
            depth_attachment: None,
        });
        device.end_render_pass();
        device.copy_texture_to_texture(src, dst, 1, 1);

        assert_eq!(device.texture_content(src), Some(red));
        assert_eq!(device.texture_content(dst), Some(red));
    }

    #[test]
    #[should_panic(expected = "already-destroyed texture")]
    fn double_destroy_panics() {
        let mut device = RecordingDevice::new();
        let texture = device.create_texture(&TextureDescriptor::default()).unwrap();
        device.destroy_texture(texture);
        device.destroy_texture(texture);
    }

    #[test]
    #[should_panic(expected = "outside a render pass")]
    fn draw_outside_pass_panics() {
        let mut device = RecordingDevice::new();
        device.draw(0..3, 0..1);
    }

    #[test]
    fn zero_sized_texture_is_rejected() {
        let mut device = RecordingDevice::new();
        let result = device.create_texture(&TextureDescriptor {
            width: 0,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
