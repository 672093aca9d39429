pub mod graph;
pub mod pass;
pub mod resource;

pub use graph::PassGraphBuilder;
pub use pass::{Pass, PassExec, ResolveScope};
pub use resource::{RenderTargetDescriptor, RenderTargetId, ResolveTextureId};
