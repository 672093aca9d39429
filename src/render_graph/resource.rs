//! Virtual render-graph resources

use crate::backend::types::{Color, TextureFormat};

/// Frame-scoped id of a declared render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub(crate) usize);

/// Frame-scoped id of a texture produced by resolving a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolveTextureId(pub(crate) usize);

/// Reusable description of a render target
///
/// Holds format, dimensions, sample count and clear values. The same
/// descriptor value is typically kept across frames and re-dimensioned when
/// the backbuffer changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetDescriptor {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub clear_color: Option<Color>,
    pub clear_depth: Option<f32>,
}

impl RenderTargetDescriptor {
    pub fn new(format: TextureFormat) -> Self {
        Self {
            format,
            width: 1,
            height: 1,
            sample_count: 1,
            clear_color: None,
            clear_depth: None,
        }
    }

    /// Set dimensions and sample count. Zero dimensions are clamped to 1.
    pub fn set_dimensions(&mut self, width: u32, height: u32, sample_count: u32) {
        if width == 0 || height == 0 {
            log::warn!("degenerate render target size {width}x{height}, clamping to 1");
        }
        self.width = width.max(1);
        self.height = height.max(1);
        self.sample_count = sample_count.max(1);
    }

    /// Copy width, height and sample count from another descriptor, leaving
    /// format and clear values untouched. Keeps a depth descriptor's
    /// dimensions mirroring its color counterpart.
    pub fn copy_dimensions(&mut self, other: &RenderTargetDescriptor) {
        self.width = other.width;
        self.height = other.height;
        self.sample_count = other.sample_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimensions_clamp_to_one() {
        let mut desc = RenderTargetDescriptor::new(TextureFormat::Rgba8Unorm);
        desc.set_dimensions(0, 0, 0);
        assert_eq!((desc.width, desc.height, desc.sample_count), (1, 1, 1));
    }

    #[test]
    fn copy_dimensions_preserves_format_and_clears() {
        let mut color = RenderTargetDescriptor::new(TextureFormat::Rgba8Unorm);
        color.set_dimensions(1366, 768, 1);
        let mut depth = RenderTargetDescriptor::new(TextureFormat::Depth32Float);
        depth.clear_depth = Some(1.0);
        depth.copy_dimensions(&color);
        assert_eq!((depth.width, depth.height), (1366, 768));
        assert_eq!(depth.format, TextureFormat::Depth32Float);
        assert_eq!(depth.clear_depth, Some(1.0));
    }
}
