//! The per-frame rendering cycle
//!
//! [`FrameOrchestrator`] owns the render list set, the main color and depth
//! target descriptors, the temporal feedback texture and the sampler cache,
//! and drives one frame at a time through a fixed sequence: advance
//! animation, collect draw commands through the populator, build the pass
//! schedule, execute it. Scene content is supplied by a [`ScenePopulator`];
//! the orchestrator itself wires the world passes and the resolves.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::cache::SamplerCache;
use crate::context::{AnimationDriver, SceneRenderContext, ViewerInput};
use crate::feedback::TemporalFeedbackTexture;
use crate::render_graph::{PassGraphBuilder, RenderTargetDescriptor, RenderTargetId};
use crate::render_list::{RenderInstructionList, RenderListSet};

/// Late texture slot filled with the scene color resolved between the opaque
/// and transparent world passes.
pub const OPAQUE_SCENE_TEXTURE: &str = "opaque-scene-texture";

/// Default clear color when none is set.
const BACKGROUND: Color = Color {
    r: 0.8,
    g: 0.8,
    b: 0.8,
    a: 1.0,
};

const DEPTH_CLEAR: f32 = 1.0;

/// Where the orchestrator currently is in the frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Updating,
    Collecting,
    Building,
    Executing,
}

/// Mutable access to the sky lists, handed to the sky-pass hook so its pass
/// bodies can submit them.
pub struct SkyLists<'frame> {
    pub atmosphere: &'frame mut RenderInstructionList,
    pub skyscape: &'frame mut RenderInstructionList,
}

/// Supplies scene content for a frame
///
/// Every hook defaults to a no-op, so a populator implements only the parts
/// of the frame it contributes to. List hooks run during collection; the
/// pass hook runs during building, before any world pass is declared, so sky
/// passes always precede world geometry.
pub trait ScenePopulator {
    fn populate_sky_lists(
        &mut self,
        device: &mut dyn RenderDevice,
        lists: &mut RenderListSet,
        ctx: &SceneRenderContext<'_>,
    ) {
        let _ = (device, lists, ctx);
    }

    fn populate_world_lists(
        &mut self,
        device: &mut dyn RenderDevice,
        lists: &mut RenderListSet,
        ctx: &SceneRenderContext<'_>,
    ) {
        let _ = (device, lists, ctx);
    }

    fn populate_sky_passes<'frame>(
        &mut self,
        device: &mut dyn RenderDevice,
        builder: &mut PassGraphBuilder<'frame>,
        sky: SkyLists<'frame>,
        main_color: RenderTargetId,
        main_depth: RenderTargetId,
        ctx: &SceneRenderContext<'_>,
    ) {
        let _ = (device, builder, sky, main_color, main_depth, ctx);
    }
}

/// Populator that contributes nothing
#[derive(Default)]
pub struct NullPopulator;

impl ScenePopulator for NullPopulator {}

/// Owns frame-persistent rendering state and runs the frame cycle
pub struct FrameOrchestrator {
    populator: Box<dyn ScenePopulator>,
    animation: Box<dyn AnimationDriver>,
    render_lists: RenderListSet,
    feedback: TemporalFeedbackTexture,
    sampler_cache: SamplerCache,
    main_color_desc: RenderTargetDescriptor,
    main_depth_desc: RenderTargetDescriptor,
    clear_color: Color,
    phase: FramePhase,
}

impl FrameOrchestrator {
    pub fn new(populator: Box<dyn ScenePopulator>, animation: Box<dyn AnimationDriver>) -> Self {
        let mut main_color_desc = RenderTargetDescriptor::new(TextureFormat::Rgba8Unorm);
        main_color_desc.clear_color = Some(BACKGROUND);
        let mut main_depth_desc = RenderTargetDescriptor::new(TextureFormat::Depth32Float);
        main_depth_desc.clear_depth = Some(DEPTH_CLEAR);

        Self {
            populator,
            animation,
            render_lists: RenderListSet::new(),
            feedback: TemporalFeedbackTexture::new(TextureFormat::Rgba8Unorm),
            sampler_cache: SamplerCache::new(),
            main_color_desc,
            main_depth_desc,
            clear_color: BACKGROUND,
            phase: FramePhase::Idle,
        }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    /// Change the main color format, usually to match the swapchain so the
    /// onscreen copy is format-compatible. Replaces the feedback texture,
    /// which must share the format.
    pub fn set_color_format(&mut self, device: &mut dyn RenderDevice, format: TextureFormat) {
        assert!(
            self.phase == FramePhase::Idle,
            "color format changed mid-frame"
        );
        self.feedback.destroy(device);
        self.feedback = TemporalFeedbackTexture::new(format);
        self.main_color_desc.format = format;
    }

    pub fn main_color_descriptor(&self) -> &RenderTargetDescriptor {
        &self.main_color_desc
    }

    pub fn main_depth_descriptor(&self) -> &RenderTargetDescriptor {
        &self.main_depth_desc
    }

    /// Render one frame.
    ///
    /// Panics if called while a frame is already in progress. Device
    /// failures propagate; the orchestrator returns to idle either way.
    pub fn render_frame(
        &mut self,
        device: &mut dyn RenderDevice,
        viewer: &ViewerInput,
    ) -> RenderResult<()> {
        assert!(
            self.phase == FramePhase::Idle,
            "render_frame re-entered during {:?}",
            self.phase
        );

        let Self {
            populator,
            animation,
            render_lists,
            feedback,
            sampler_cache,
            main_color_desc,
            main_depth_desc,
            clear_color,
            phase,
        } = self;

        *phase = FramePhase::Updating;
        animation.advance(&viewer.timing);

        *phase = FramePhase::Collecting;
        if let Err(e) = feedback.ensure_size(
            device,
            sampler_cache,
            viewer.backbuffer_width,
            viewer.backbuffer_height,
        ) {
            *phase = FramePhase::Idle;
            return Err(e);
        }
        let (previous_frame, previous_sampler) = feedback.as_readable();
        let ctx = SceneRenderContext::new(viewer, previous_frame, previous_sampler);
        render_lists.reset_all();
        populator.populate_sky_lists(device, render_lists, &ctx);
        populator.populate_world_lists(device, render_lists, &ctx);

        *phase = FramePhase::Building;
        main_color_desc.set_dimensions(
            viewer.backbuffer_width,
            viewer.backbuffer_height,
            viewer.sample_count,
        );
        main_color_desc.clear_color = Some(*clear_color);
        main_depth_desc.copy_dimensions(main_color_desc);
        main_depth_desc.clear_depth = Some(DEPTH_CLEAR);

        let mut builder = PassGraphBuilder::new();
        let main_color = builder.create_render_target(*main_color_desc, "main color");
        let main_depth = builder.create_render_target(*main_depth_desc, "main depth");

        let RenderListSet {
            atmosphere,
            skyscape,
            world,
            waters,
            furs,
        } = render_lists;
        let [world_opaque, world_mid, world_far] = world;

        populator.populate_sky_passes(
            device,
            &mut builder,
            SkyLists {
                atmosphere,
                skyscape,
            },
            main_color,
            main_depth,
            &ctx,
        );

        let viewport = viewer.viewport;
        builder.push_pass(|pass| {
            pass.set_debug_name("world opaque");
            pass.set_viewport(viewport);
            pass.attach_color_target(main_color);
            pass.attach_depth_target(main_depth);
            pass.exec(move |device, _| {
                world_opaque.submit(device);
                furs.submit(device);
            });
        });

        let scene_color = builder.resolve_render_target(main_color);

        builder.push_pass(|pass| {
            pass.set_debug_name("world transparent");
            pass.set_viewport(viewport);
            pass.attach_color_target(main_color);
            pass.attach_depth_target(main_depth);
            pass.attach_resolve_texture(scene_color);
            pass.exec(move |device, scope| {
                let scene_view = scope.resolved_texture(scene_color);
                waters.bind_late_sampler(OPAQUE_SCENE_TEXTURE, scene_view, previous_sampler);
                world_mid.bind_late_sampler(OPAQUE_SCENE_TEXTURE, scene_view, previous_sampler);
                world_far.bind_late_sampler(OPAQUE_SCENE_TEXTURE, scene_view, previous_sampler);
                waters.submit(device);
                world_mid.submit(device);
                world_far.submit(device);
            });
        });

        builder.resolve_to_external(main_color, viewer.onscreen_texture);
        // Last on purpose: the feedback copy must see the finished frame.
        builder.resolve_to_external(main_color, feedback.texture_handle());

        *phase = FramePhase::Executing;
        let result = builder.execute(device);
        *phase = FramePhase::Idle;
        result
    }

    /// Release everything the orchestrator allocated on the device.
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        self.feedback.destroy(device);
        self.sampler_cache.destroy(device);
    }
}
