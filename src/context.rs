//! Frame input and the read-only context handed to populators

use crate::backend::traits::{SamplerHandle, TextureHandle, TextureViewHandle};
use crate::backend::types::Viewport;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Frame timing
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTiming {
    pub delta_seconds: f32,
    pub total_seconds: f64,
}

/// Advances time-driven scene state once per frame
pub trait AnimationDriver {
    fn advance(&mut self, timing: &FrameTiming);
}

/// Driver for static scenes
#[derive(Default)]
pub struct NullAnimation;

impl AnimationDriver for NullAnimation {
    fn advance(&mut self, _timing: &FrameTiming) {}
}

/// Camera matrices for the frame
#[derive(Debug, Clone, Copy)]
pub struct CameraSnapshot {
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for CameraSnapshot {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

impl CameraSnapshot {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// GPU-ready uniform block for this camera.
    pub fn uniform_data(&self) -> CameraUniform {
        let inverse_view = self.view.inverse();
        CameraUniform {
            view: self.view,
            projection: self.projection,
            view_projection: self.view_projection(),
            position: inverse_view.col(3),
        }
    }
}

/// std140-compatible camera uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub position: Vec4,
}

/// Everything the caller supplies for one frame
#[derive(Debug, Clone, Copy)]
pub struct ViewerInput {
    pub backbuffer_width: u32,
    pub backbuffer_height: u32,
    pub sample_count: u32,
    pub viewport: Viewport,
    pub timing: FrameTiming,
    /// Where the finished frame is copied for presentation.
    pub onscreen_texture: TextureHandle,
    pub camera: CameraSnapshot,
}

/// Read-only bundle populators receive while filling lists and passes
pub struct SceneRenderContext<'frame> {
    viewer: &'frame ViewerInput,
    previous_frame: TextureViewHandle,
    previous_frame_sampler: SamplerHandle,
}

impl<'frame> SceneRenderContext<'frame> {
    pub(crate) fn new(
        viewer: &'frame ViewerInput,
        previous_frame: TextureViewHandle,
        previous_frame_sampler: SamplerHandle,
    ) -> Self {
        Self {
            viewer,
            previous_frame,
            previous_frame_sampler,
        }
    }

    pub fn viewer(&self) -> &ViewerInput {
        self.viewer
    }

    /// Color of the previous frame. One frame of lag: during frame N this
    /// view holds frame N minus 1.
    pub fn previous_frame_texture(&self) -> TextureViewHandle {
        self.previous_frame
    }

    pub fn previous_frame_sampler(&self) -> SamplerHandle {
        self.previous_frame_sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn camera_uniform_carries_position() {
        let camera = CameraSnapshot {
            view: Mat4::from_translation(Vec3::new(-3.0, -4.0, -5.0)),
            projection: Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0),
        };
        let uniform = camera.uniform_data();
        assert!((uniform.position.x - 3.0).abs() < 1e-5);
        assert!((uniform.position.y - 4.0).abs() < 1e-5);
        assert!((uniform.position.z - 5.0).abs() < 1e-5);
        let expected = camera.projection * camera.view;
        assert_eq!(uniform.view_projection, expected);
    }
}
