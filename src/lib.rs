//! Per-frame render orchestration for 3D scene viewers.
//!
//! The crate covers the frame plumbing between scene content and a graphics
//! device:
//!
//! - ordered draw-command lists with late texture binding and a strict
//!   reset/submit protocol ([`render_list`])
//! - a linear pass graph with render targets, mid-frame resolves and
//!   resolves into caller-owned textures ([`render_graph`])
//! - a previous-frame color texture for temporal effects ([`feedback`])
//! - the frame cycle tying it together ([`orchestrator`])
//!
//! Scene content stays outside: a [`ScenePopulator`] fills the lists and
//! declares extra passes, the orchestrator does the rest. Devices implement
//! [`RenderDevice`]; a wgpu device and a headless recording device are
//! provided.

pub mod backend;
pub mod cache;
pub mod context;
pub mod feedback;
pub mod orchestrator;
pub mod render_graph;
pub mod render_list;

pub use backend::{
    recording::{DeviceEvent, RecordingDevice},
    traits::*,
    types::*,
    wgpu_device::{FrameContext, WgpuDevice},
};
pub use cache::SamplerCache;
pub use context::{
    AnimationDriver, CameraSnapshot, CameraUniform, FrameTiming, NullAnimation,
    SceneRenderContext, ViewerInput,
};
pub use feedback::TemporalFeedbackTexture;
pub use orchestrator::{
    FrameOrchestrator, FramePhase, NullPopulator, ScenePopulator, SkyLists, OPAQUE_SCENE_TEXTURE,
};
pub use render_graph::{
    Pass, PassGraphBuilder, RenderTargetDescriptor, RenderTargetId, ResolveScope, ResolveTextureId,
};
pub use render_list::{
    DrawCall, DrawCommand, RenderInstructionList, RenderListSet, TextureBinding, WorldLayer,
};
