//! Previous-frame color texture

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::cache::SamplerCache;

/// Persistent texture holding the previous frame's resolved color
///
/// The frame schedule copies the finished scene color into this texture as
/// its last step, so within any frame it holds the frame before it. Sized
/// lazily against the backbuffer; reallocation only happens when the size
/// actually changes.
pub struct TemporalFeedbackTexture {
    format: TextureFormat,
    width: u32,
    height: u32,
    texture: Option<TextureHandle>,
    view: Option<TextureViewHandle>,
    sampler: Option<SamplerHandle>,
}

impl TemporalFeedbackTexture {
    pub fn new(format: TextureFormat) -> Self {
        Self {
            format,
            width: 0,
            height: 0,
            texture: None,
            view: None,
            sampler: None,
        }
    }

    /// Match the texture to the given dimensions, reallocating only on
    /// change. Zero dimensions are clamped to 1. The sampler (bilinear,
    /// clamp to edge, no mip filtering) is created once and survives
    /// reallocation.
    pub fn ensure_size(
        &mut self,
        device: &mut dyn RenderDevice,
        samplers: &mut SamplerCache,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let width = width.max(1);
        let height = height.max(1);
        if self.texture.is_some() && self.width == width && self.height == height {
            return Ok(());
        }

        if let Some(view) = self.view.take() {
            device.destroy_texture_view(view);
        }
        if let Some(texture) = self.texture.take() {
            device.destroy_texture(texture);
        }

        let texture = device.create_texture(&TextureDescriptor {
            label: Some("scene feedback".into()),
            width,
            height,
            sample_count: 1,
            format: self.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let view = device.create_texture_view(texture)?;
        log::debug!("feedback texture reallocated at {width}x{height}");

        if self.sampler.is_none() {
            self.sampler = Some(samplers.get_or_create(
                device,
                &SamplerDescriptor {
                    label: Some("scene feedback sampler".into()),
                    mag_filter: FilterMode::Linear,
                    min_filter: FilterMode::Linear,
                    mipmap_filter: FilterMode::Nearest,
                    address_mode_u: AddressMode::ClampToEdge,
                    address_mode_v: AddressMode::ClampToEdge,
                    address_mode_w: AddressMode::ClampToEdge,
                },
            )?);
        }

        self.texture = Some(texture);
        self.view = Some(view);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// View and sampler for reading the previous frame.
    ///
    /// Panics if called before the first `ensure_size`.
    pub fn as_readable(&self) -> (TextureViewHandle, SamplerHandle) {
        match (self.view, self.sampler) {
            (Some(view), Some(sampler)) => (view, sampler),
            _ => panic!("feedback texture read before it was allocated"),
        }
    }

    /// The copy destination for the end-of-frame resolve.
    pub fn texture_handle(&self) -> TextureHandle {
        self.texture
            .expect("feedback texture used before it was allocated")
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Release the texture. The sampler belongs to the cache and is not
    /// destroyed here. Safe to call more than once.
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        if let Some(view) = self.view.take() {
            device.destroy_texture_view(view);
        }
        if let Some(texture) = self.texture.take() {
            device.destroy_texture(texture);
        }
        self.sampler = None;
        self.width = 0;
        self.height = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingDevice;

    #[test]
    fn same_size_does_not_reallocate() {
        let mut device = RecordingDevice::new();
        let mut samplers = SamplerCache::new();
        let mut feedback = TemporalFeedbackTexture::new(TextureFormat::Rgba8Unorm);

        feedback.ensure_size(&mut device, &mut samplers, 640, 480).unwrap();
        let after_first = device.texture_allocations();
        feedback.ensure_size(&mut device, &mut samplers, 640, 480).unwrap();
        assert_eq!(device.texture_allocations(), after_first);
    }

    #[test]
    fn resize_reallocates_but_keeps_sampler() {
        let mut device = RecordingDevice::new();
        let mut samplers = SamplerCache::new();
        let mut feedback = TemporalFeedbackTexture::new(TextureFormat::Rgba8Unorm);

        feedback.ensure_size(&mut device, &mut samplers, 640, 480).unwrap();
        let (_, sampler_before) = feedback.as_readable();
        feedback.ensure_size(&mut device, &mut samplers, 1366, 768).unwrap();
        let (_, sampler_after) = feedback.as_readable();

        assert_eq!(device.texture_allocations(), 2);
        assert_eq!(device.live_textures(), 1);
        assert_eq!(sampler_before, sampler_after);
        assert_eq!(feedback.size(), (1366, 768));
    }

    #[test]
    fn zero_size_clamps_to_one() {
        let mut device = RecordingDevice::new();
        let mut samplers = SamplerCache::new();
        let mut feedback = TemporalFeedbackTexture::new(TextureFormat::Rgba8Unorm);
        feedback.ensure_size(&mut device, &mut samplers, 0, 0).unwrap();
        assert_eq!(feedback.size(), (1, 1));
    }

    #[test]
    fn destroy_twice_is_a_no_op() {
        let mut device = RecordingDevice::new();
        let mut samplers = SamplerCache::new();
        let mut feedback = TemporalFeedbackTexture::new(TextureFormat::Rgba8Unorm);
        feedback.ensure_size(&mut device, &mut samplers, 64, 64).unwrap();

        feedback.destroy(&mut device);
        assert_eq!(device.live_textures(), 0);
        feedback.destroy(&mut device);
    }

    #[test]
    #[should_panic(expected = "before it was allocated")]
    fn read_before_allocation_panics() {
        let feedback = TemporalFeedbackTexture::new(TextureFormat::Rgba8Unorm);
        feedback.as_readable();
    }
}
