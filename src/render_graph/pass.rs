//! Pass declaration and the resolve scope handed to pass bodies

use crate::backend::traits::{RenderDevice, TextureViewHandle};
use crate::backend::types::Viewport;
use crate::render_graph::resource::{RenderTargetId, ResolveTextureId};

pub type PassExec<'frame> = Box<dyn FnOnce(&mut dyn RenderDevice, &ResolveScope) + 'frame>;

/// A declared render pass
///
/// Configured inside the closure given to `PassGraphBuilder::push_pass`. The
/// body set with [`Pass::exec`] runs later, during graph execution, inside an
/// open device render pass.
pub struct Pass<'frame> {
    pub(crate) debug_name: String,
    pub(crate) viewport: Option<Viewport>,
    pub(crate) color_target: Option<RenderTargetId>,
    pub(crate) depth_target: Option<RenderTargetId>,
    pub(crate) resolve_inputs: Vec<ResolveTextureId>,
    pub(crate) exec: Option<PassExec<'frame>>,
}

impl<'frame> Pass<'frame> {
    pub(crate) fn new() -> Self {
        Self {
            debug_name: String::new(),
            viewport: None,
            color_target: None,
            depth_target: None,
            resolve_inputs: Vec::new(),
            exec: None,
        }
    }

    pub fn set_debug_name(&mut self, name: impl Into<String>) {
        self.debug_name = name.into();
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    pub fn attach_color_target(&mut self, target: RenderTargetId) {
        self.color_target = Some(target);
    }

    pub fn attach_depth_target(&mut self, target: RenderTargetId) {
        self.depth_target = Some(target);
    }

    /// Declare that the pass body will read this resolve texture. Redeeming
    /// an id in the body without attaching it here is a contract violation.
    pub fn attach_resolve_texture(&mut self, resolve: ResolveTextureId) {
        self.resolve_inputs.push(resolve);
    }

    /// Set the pass body. May only be called once per pass.
    pub fn exec(&mut self, body: impl FnOnce(&mut dyn RenderDevice, &ResolveScope) + 'frame) {
        assert!(
            self.exec.is_none(),
            "pass '{}' given two exec bodies",
            self.debug_name
        );
        self.exec = Some(Box::new(body));
    }
}

/// Resolve textures visible to one executing pass body
pub struct ResolveScope {
    pub(crate) pass_name: String,
    pub(crate) declared: Vec<ResolveTextureId>,
    pub(crate) available: Vec<Option<TextureViewHandle>>,
}

impl ResolveScope {
    /// Redeem a resolve id for the view of the produced texture.
    ///
    /// Panics if the id was not attached to this pass, or if the resolve is
    /// scheduled after the pass and so has not produced a texture yet.
    pub fn resolved_texture(&self, id: ResolveTextureId) -> TextureViewHandle {
        if !self.declared.contains(&id) {
            panic!(
                "pass '{}' redeemed resolve texture {:?} without attaching it",
                self.pass_name, id
            );
        }
        match self.available.get(id.0).copied().flatten() {
            Some(view) => view,
            None => panic!(
                "pass '{}' redeemed resolve texture {:?} before it was produced",
                self.pass_name, id
            ),
        }
    }
}
