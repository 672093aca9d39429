//! Minimal windowed frame loop: an empty scene rendered through the
//! orchestrator, presented with vsync. Run with `RUST_LOG=debug` to watch
//! target allocation and pass execution.

use scene_renderer::*;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    event::{Event, WindowEvent},
    event_loop::EventLoop,
    window::WindowBuilder,
};

fn main() {
    env_logger::init();

    let event_loop = EventLoop::new().expect("event loop");
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("scene-renderer viewer")
            .build(&event_loop)
            .expect("window"),
    );

    let mut device = WgpuDevice::new(window.clone(), true).expect("device");
    let mut orchestrator = FrameOrchestrator::new(Box::new(NullPopulator), Box::new(NullAnimation));
    let format = device.swapchain_format();
    orchestrator.set_color_format(&mut device, format);
    orchestrator.set_clear_color(Color::from_rgba8(0xCC, 0xCC, 0xCC, 0xFF));

    let start = Instant::now();
    let mut last_frame = start;

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    orchestrator.destroy(&mut device);
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    device.resize(size.width, size.height);
                }
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    let timing = FrameTiming {
                        delta_seconds: now.duration_since(last_frame).as_secs_f32(),
                        total_seconds: now.duration_since(start).as_secs_f64(),
                    };
                    last_frame = now;

                    let frame = match device.begin_frame() {
                        Ok(frame) => frame,
                        Err(RenderError::SurfaceLost) => {
                            let (width, height) = device.surface_size();
                            device.resize(width, height);
                            return;
                        }
                        Err(e) => {
                            log::error!("frame skipped: {e}");
                            return;
                        }
                    };
                    let viewer = ViewerInput {
                        backbuffer_width: frame.width,
                        backbuffer_height: frame.height,
                        sample_count: 1,
                        viewport: Viewport::full(frame.width, frame.height),
                        timing,
                        onscreen_texture: frame.swapchain_texture,
                        camera: CameraSnapshot::default(),
                    };
                    if let Err(e) = orchestrator.render_frame(&mut device, &viewer) {
                        log::error!("frame failed: {e}");
                    }
                    device.end_frame();
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        })
        .expect("event loop run");
}
