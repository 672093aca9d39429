//! Sampler deduplication

use crate::backend::traits::{RenderDevice, RenderResult, SamplerHandle};
use crate::backend::types::SamplerDescriptor;

/// Deduplicating sampler store
///
/// Sampler descriptors repeat heavily across a scene, so creation goes
/// through this cache: equal descriptors share one device sampler. The cache
/// owns its samplers and releases them all in `destroy`.
#[derive(Default)]
pub struct SamplerCache {
    samplers: Vec<(SamplerDescriptor, SamplerHandle)>,
}

impl SamplerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the sampler for this descriptor, creating it on first use.
    pub fn get_or_create(
        &mut self,
        device: &mut dyn RenderDevice,
        desc: &SamplerDescriptor,
    ) -> RenderResult<SamplerHandle> {
        if let Some((_, handle)) = self.samplers.iter().find(|(d, _)| d == desc) {
            return Ok(*handle);
        }
        let handle = device.create_sampler(desc)?;
        self.samplers.push((desc.clone(), handle));
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    /// Destroy every cached sampler. The cache is empty afterwards, so a
    /// second call is a no-op.
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        for (_, handle) in self.samplers.drain(..) {
            device.destroy_sampler(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingDevice;
    use crate::backend::types::FilterMode;

    #[test]
    fn equal_descriptors_share_a_sampler() {
        let mut device = RecordingDevice::new();
        let mut cache = SamplerCache::new();

        let a = cache
            .get_or_create(&mut device, &SamplerDescriptor::default())
            .unwrap();
        let b = cache
            .get_or_create(&mut device, &SamplerDescriptor::default())
            .unwrap();
        let other = cache
            .get_or_create(
                &mut device,
                &SamplerDescriptor {
                    mag_filter: FilterMode::Nearest,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_eq!(device.sampler_allocations(), 2);

        cache.destroy(&mut device);
        assert_eq!(device.live_samplers(), 0);
        cache.destroy(&mut device);
    }
}
