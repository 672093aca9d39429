//! Frame-level scenarios driven through a recording device.

use scene_renderer::*;
use std::cell::RefCell;
use std::rc::Rc;

fn viewer_for(device: &mut RecordingDevice, width: u32, height: u32) -> ViewerInput {
    let onscreen = device
        .create_texture(&TextureDescriptor {
            label: Some("onscreen".into()),
            width: width.max(1),
            height: height.max(1),
            ..Default::default()
        })
        .unwrap();
    ViewerInput {
        backbuffer_width: width,
        backbuffer_height: height,
        sample_count: 1,
        viewport: Viewport::full(width.max(1), height.max(1)),
        timing: FrameTiming {
            delta_seconds: 1.0 / 60.0,
            total_seconds: 0.0,
        },
        onscreen_texture: onscreen,
        camera: CameraSnapshot::default(),
    }
}

fn plain_draw(device: &mut dyn RenderDevice) -> DrawCommand {
    let pipeline = device
        .create_render_pipeline(&RenderPipelineDescriptor {
            label: None,
            shader: String::new(),
            vertex_layouts: vec![],
            bind_group_layouts: vec![],
            color_format: TextureFormat::Rgba8Unorm,
            depth_format: Some(TextureFormat::Depth32Float),
            sample_count: 1,
            blend_enabled: false,
        })
        .unwrap();
    DrawCommand::new(
        pipeline,
        DrawCall::Arrays {
            vertices: 0..3,
            instances: 0..1,
        },
    )
}

/// Fills the world lists with a fixed set of draws and records what the
/// previous-frame texture held at collection time.
#[derive(Default)]
struct ProbeState {
    previous_contents: Vec<Option<Color>>,
    previous_views: Vec<TextureViewHandle>,
}

struct WorldProbe {
    state: Rc<RefCell<ProbeState>>,
}

impl ScenePopulator for WorldProbe {
    fn populate_world_lists(
        &mut self,
        device: &mut dyn RenderDevice,
        lists: &mut RenderListSet,
        ctx: &SceneRenderContext<'_>,
    ) {
        {
            let recording = device
                .as_any()
                .downcast_ref::<RecordingDevice>()
                .expect("tests run against the recording device");
            let mut state = self.state.borrow_mut();
            state
                .previous_contents
                .push(recording.view_content(ctx.previous_frame_texture()));
            state.previous_views.push(ctx.previous_frame_texture());
        }

        lists.world_layer(WorldLayer::Opaque).push(plain_draw(device));
        lists.world_layer(WorldLayer::Opaque).push(plain_draw(device));
        lists.furs.push(plain_draw(device));

        let mut water = plain_draw(device);
        water
            .textures
            .push(TextureBinding::late(1, OPAQUE_SCENE_TEXTURE));
        lists.waters.push(water);
        lists.waters.push(plain_draw(device));
        lists.waters.push(plain_draw(device));
        lists
            .world_layer(WorldLayer::MidTransparent)
            .push(plain_draw(device));
        lists
            .world_layer(WorldLayer::FarTransparent)
            .push(plain_draw(device));
    }
}

fn probe_orchestrator() -> (FrameOrchestrator, Rc<RefCell<ProbeState>>) {
    let state = Rc::new(RefCell::new(ProbeState::default()));
    let orchestrator = FrameOrchestrator::new(
        Box::new(WorldProbe {
            state: state.clone(),
        }),
        Box::new(NullAnimation),
    );
    (orchestrator, state)
}

#[test]
fn opaque_world_precedes_transparent_world() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 640, 480);
    let (mut orchestrator, _) = probe_orchestrator();

    orchestrator.render_frame(&mut device, &viewer).unwrap();

    let labels = device.pass_labels();
    assert_eq!(labels, vec!["world opaque", "world transparent"]);
    // Opaque world geometry and furs in the first pass, waters and the two
    // transparent world layers in the second.
    assert_eq!(device.draws_in_pass("world opaque"), 3);
    assert_eq!(device.draws_in_pass("world transparent"), 5);
}

#[test]
fn late_scene_texture_slot_is_bound_in_the_transparent_pass() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 640, 480);
    let (mut orchestrator, _) = probe_orchestrator();

    orchestrator.render_frame(&mut device, &viewer).unwrap();

    let mut in_transparent = false;
    let mut bound = 0;
    for event in device.events() {
        match event {
            DeviceEvent::PassBegun { label } => {
                in_transparent = label.as_deref() == Some("world transparent");
            }
            DeviceEvent::PassEnded => in_transparent = false,
            DeviceEvent::TextureSamplerBound { .. } => {
                assert!(in_transparent, "scene texture bound outside transparent pass");
                bound += 1;
            }
            _ => {}
        }
    }
    assert_eq!(bound, 1);
}

#[test]
fn previous_frame_texture_lags_by_one_frame() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 320, 240);
    let (mut orchestrator, state) = probe_orchestrator();

    let first = Color::new(1.0, 0.0, 0.0, 1.0);
    let second = Color::new(0.0, 1.0, 0.0, 1.0);

    orchestrator.set_clear_color(first);
    orchestrator.render_frame(&mut device, &viewer).unwrap();
    orchestrator.set_clear_color(second);
    orchestrator.render_frame(&mut device, &viewer).unwrap();
    orchestrator.render_frame(&mut device, &viewer).unwrap();

    let state = state.borrow();
    // Nothing has been fed back before the first frame finishes.
    assert_eq!(state.previous_contents[0], None);
    assert_eq!(state.previous_contents[1], Some(first));
    assert_eq!(state.previous_contents[2], Some(second));
}

#[test]
fn onscreen_copy_happens_before_the_feedback_copy() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 320, 240);
    let (mut orchestrator, _) = probe_orchestrator();

    orchestrator.render_frame(&mut device, &viewer).unwrap();

    let copies: Vec<_> = device
        .events()
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::TextureCopied { dst, .. } => Some(*dst),
            _ => None,
        })
        .collect();
    // Mid-frame scene resolve, then onscreen, then feedback last.
    assert_eq!(copies.len(), 3);
    assert_eq!(copies[1], viewer.onscreen_texture);
    assert_ne!(copies[2], viewer.onscreen_texture);
}

#[test]
fn feedback_texture_is_stable_while_the_size_holds() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 640, 480);
    let (mut orchestrator, state) = probe_orchestrator();

    orchestrator.render_frame(&mut device, &viewer).unwrap();
    orchestrator.render_frame(&mut device, &viewer).unwrap();
    orchestrator.render_frame(&mut device, &viewer).unwrap();

    let state = state.borrow();
    assert_eq!(state.previous_views[0], state.previous_views[1]);
    assert_eq!(state.previous_views[1], state.previous_views[2]);
}

#[test]
fn resize_reallocates_the_feedback_texture() {
    let mut device = RecordingDevice::new();
    let (mut orchestrator, state) = probe_orchestrator();

    let small = viewer_for(&mut device, 640, 480);
    orchestrator.render_frame(&mut device, &small).unwrap();
    let large = viewer_for(&mut device, 1366, 768);
    orchestrator.render_frame(&mut device, &large).unwrap();

    let state = state.borrow();
    assert_ne!(state.previous_views[0], state.previous_views[1]);
}

#[test]
fn depth_target_mirrors_color_dimensions() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 1366, 768);
    let (mut orchestrator, _) = probe_orchestrator();

    orchestrator.render_frame(&mut device, &viewer).unwrap();

    let color = orchestrator.main_color_descriptor();
    let depth = orchestrator.main_depth_descriptor();
    assert_eq!((color.width, color.height), (1366, 768));
    assert_eq!((depth.width, depth.height), (color.width, color.height));
    assert_eq!(depth.sample_count, color.sample_count);
    assert!(depth.format.is_depth());
}

#[test]
fn zero_sized_backbuffer_still_renders() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 0, 0);
    let (mut orchestrator, _) = probe_orchestrator();

    orchestrator.render_frame(&mut device, &viewer).unwrap();

    let color = orchestrator.main_color_descriptor();
    assert_eq!((color.width, color.height), (1, 1));
    assert_eq!(device.pass_labels().len(), 2);
}

#[test]
fn transient_targets_do_not_accumulate_across_frames() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 640, 480);
    let (mut orchestrator, _) = probe_orchestrator();

    orchestrator.render_frame(&mut device, &viewer).unwrap();
    let after_first = device.live_textures();
    orchestrator.render_frame(&mut device, &viewer).unwrap();
    orchestrator.render_frame(&mut device, &viewer).unwrap();
    assert_eq!(device.live_textures(), after_first);
}

#[test]
fn destroy_releases_device_resources_once() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 640, 480);
    let (mut orchestrator, _) = probe_orchestrator();

    orchestrator.render_frame(&mut device, &viewer).unwrap();
    assert!(device.live_samplers() > 0);

    orchestrator.destroy(&mut device);
    assert_eq!(device.live_samplers(), 0);
    // Only the caller-owned onscreen texture remains.
    assert_eq!(device.live_textures(), 1);

    orchestrator.destroy(&mut device);
}

struct SkyProbe;

impl ScenePopulator for SkyProbe {
    fn populate_sky_lists(
        &mut self,
        device: &mut dyn RenderDevice,
        lists: &mut RenderListSet,
        _ctx: &SceneRenderContext<'_>,
    ) {
        lists.atmosphere.push(plain_draw(device));
        lists.skyscape.push(plain_draw(device));
    }

    fn populate_sky_passes<'frame>(
        &mut self,
        _device: &mut dyn RenderDevice,
        builder: &mut PassGraphBuilder<'frame>,
        sky: SkyLists<'frame>,
        main_color: RenderTargetId,
        main_depth: RenderTargetId,
        _ctx: &SceneRenderContext<'_>,
    ) {
        let SkyLists {
            atmosphere,
            skyscape,
        } = sky;
        builder.push_pass(|pass| {
            pass.set_debug_name("sky");
            pass.attach_color_target(main_color);
            pass.attach_depth_target(main_depth);
            pass.exec(move |device, _| {
                atmosphere.submit(device);
                skyscape.submit(device);
            });
        });
    }
}

#[test]
fn sky_passes_run_before_world_passes() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 640, 480);
    let mut orchestrator = FrameOrchestrator::new(Box::new(SkyProbe), Box::new(NullAnimation));

    orchestrator.render_frame(&mut device, &viewer).unwrap();

    assert_eq!(
        device.pass_labels(),
        vec!["sky", "world opaque", "world transparent"]
    );
    assert_eq!(device.draws_in_pass("sky"), 2);
}

struct CountingAnimation {
    frames: Rc<RefCell<u32>>,
}

impl AnimationDriver for CountingAnimation {
    fn advance(&mut self, _timing: &FrameTiming) {
        *self.frames.borrow_mut() += 1;
    }
}

#[test]
fn animation_advances_exactly_once_per_frame() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 64, 64);
    let frames = Rc::new(RefCell::new(0));
    let mut orchestrator = FrameOrchestrator::new(
        Box::new(NullPopulator),
        Box::new(CountingAnimation {
            frames: frames.clone(),
        }),
    );

    orchestrator.render_frame(&mut device, &viewer).unwrap();
    orchestrator.render_frame(&mut device, &viewer).unwrap();
    assert_eq!(*frames.borrow(), 2);
}

struct GreedySkyPopulator;

impl ScenePopulator for GreedySkyPopulator {
    fn populate_sky_passes<'frame>(
        &mut self,
        _device: &mut dyn RenderDevice,
        builder: &mut PassGraphBuilder<'frame>,
        _sky: SkyLists<'frame>,
        main_color: RenderTargetId,
        main_depth: RenderTargetId,
        _ctx: &SceneRenderContext<'_>,
    ) {
        let resolved = builder.resolve_render_target(main_color);
        builder.push_pass(move |pass| {
            pass.set_debug_name("greedy sky");
            pass.attach_color_target(main_color);
            pass.attach_depth_target(main_depth);
            pass.exec(move |_, scope| {
                // Redeemed without attach_resolve_texture.
                scope.resolved_texture(resolved);
            });
        });
    }
}

#[test]
#[should_panic(expected = "without attaching")]
fn redeeming_an_unattached_resolve_texture_panics() {
    let mut device = RecordingDevice::new();
    let viewer = viewer_for(&mut device, 64, 64);
    let mut orchestrator =
        FrameOrchestrator::new(Box::new(GreedySkyPopulator), Box::new(NullAnimation));
    let _ = orchestrator.render_frame(&mut device, &viewer);
}
