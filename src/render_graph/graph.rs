//! Linear pass graph: declaration, scheduling and execution
//!
//! [`PassGraphBuilder`] collects render targets, passes and resolves for one
//! frame. There is no dependency inference: the schedule is the declaration
//! order, and the caller is responsible for declaring producers before
//! consumers. `execute` allocates the physical textures, runs every item in
//! order, and frees all transients before returning.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::pass::{Pass, ResolveScope};
use crate::render_graph::resource::{RenderTargetDescriptor, RenderTargetId, ResolveTextureId};

struct TargetSlot {
    desc: RenderTargetDescriptor,
    label: String,
}

enum ScheduleItem {
    Pass(usize),
    Resolve {
        target: RenderTargetId,
        resolve: ResolveTextureId,
    },
    ResolveExternal {
        target: RenderTargetId,
        destination: TextureHandle,
    },
}

/// Builder for one frame's pass schedule
///
/// Created fresh each frame, consumed by [`PassGraphBuilder::execute`].
#[derive(Default)]
pub struct PassGraphBuilder<'frame> {
    targets: Vec<TargetSlot>,
    passes: Vec<Option<Pass<'frame>>>,
    resolve_targets: Vec<RenderTargetId>,
    schedule: Vec<ScheduleItem>,
}

impl<'frame> PassGraphBuilder<'frame> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a render target for this frame.
    pub fn create_render_target(
        &mut self,
        desc: RenderTargetDescriptor,
        label: impl Into<String>,
    ) -> RenderTargetId {
        assert!(
            desc.width > 0 && desc.height > 0,
            "render target with zero dimensions"
        );
        let id = RenderTargetId(self.targets.len());
        self.targets.push(TargetSlot {
            desc,
            label: label.into(),
        });
        id
    }

    /// Declare a pass. The closure configures attachments, inputs and the
    /// pass body; the body itself runs during `execute`.
    pub fn push_pass(&mut self, configure: impl FnOnce(&mut Pass<'frame>)) {
        let mut pass = Pass::new();
        configure(&mut pass);
        let index = self.passes.len();
        self.passes.push(Some(pass));
        self.schedule.push(ScheduleItem::Pass(index));
    }

    /// Schedule a snapshot of the target's current contents into a new
    /// sampleable texture. Passes declared after this point may attach and
    /// redeem the returned id.
    pub fn resolve_render_target(&mut self, target: RenderTargetId) -> ResolveTextureId {
        assert!(target.0 < self.targets.len(), "unknown render target");
        let id = ResolveTextureId(self.resolve_targets.len());
        self.resolve_targets.push(target);
        self.schedule.push(ScheduleItem::Resolve {
            target,
            resolve: id,
        });
        id
    }

    /// Schedule a copy of the target's contents into a caller-owned texture.
    /// Used for the presentation sink and the temporal feedback texture.
    pub fn resolve_to_external(&mut self, target: RenderTargetId, destination: TextureHandle) {
        assert!(target.0 < self.targets.len(), "unknown render target");
        self.schedule.push(ScheduleItem::ResolveExternal {
            target,
            destination,
        });
    }

    /// Run the schedule. Allocates physical targets, executes each item in
    /// declaration order, then destroys every transient resource.
    pub fn execute(mut self, device: &mut dyn RenderDevice) -> RenderResult<()> {
        // TODO: multisampled targets need a resolve attachment rather than a
        // plain copy; all current callers use sample_count 1.

        let mut physical: Vec<(TextureHandle, TextureViewHandle)> =
            Vec::with_capacity(self.targets.len());
        for slot in &self.targets {
            let texture = device.create_texture(&TextureDescriptor {
                label: Some(slot.label.clone()),
                width: slot.desc.width,
                height: slot.desc.height,
                sample_count: slot.desc.sample_count,
                format: slot.desc.format,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
            })?;
            let view = device.create_texture_view(texture)?;
            log::debug!(
                "allocated render target '{}' {}x{} {:?}",
                slot.label,
                slot.desc.width,
                slot.desc.height,
                slot.desc.format
            );
            physical.push((texture, view));
        }

        let mut cleared = vec![false; self.targets.len()];
        let mut produced: Vec<Option<(TextureHandle, TextureViewHandle)>> =
            vec![None; self.resolve_targets.len()];

        let mut result = Ok(());
        for item in std::mem::take(&mut self.schedule) {
            match item {
                ScheduleItem::Pass(index) => {
                    let pass = self.passes[index].take().expect("pass executed twice");
                    assert!(
                        pass.color_target.is_some() || pass.depth_target.is_some(),
                        "pass '{}' has no attachments",
                        pass.debug_name
                    );

                    let color_attachment = pass.color_target.map(|target| {
                        let load_op = if cleared[target.0] {
                            LoadOp::Load
                        } else {
                            cleared[target.0] = true;
                            LoadOp::Clear(
                                self.targets[target.0]
                                    .desc
                                    .clear_color
                                    .unwrap_or(Color::TRANSPARENT_BLACK),
                            )
                        };
                        ColorAttachment {
                            view: physical[target.0].1,
                            load_op,
                            store_op: StoreOp::Store,
                        }
                    });
                    let depth_attachment = pass.depth_target.map(|target| {
                        let clear_depth = if cleared[target.0] {
                            None
                        } else {
                            cleared[target.0] = true;
                            Some(self.targets[target.0].desc.clear_depth.unwrap_or(1.0))
                        };
                        DepthAttachment {
                            view: physical[target.0].1,
                            clear_depth,
                            store_op: StoreOp::Store,
                        }
                    });

                    log::trace!("executing pass '{}'", pass.debug_name);
                    device.begin_render_pass(&RenderPassDescriptor {
                        label: Some(pass.debug_name.clone()),
                        color_attachment,
                        depth_attachment,
                    });
                    if let Some(viewport) = pass.viewport {
                        device.set_viewport(
                            viewport.x,
                            viewport.y,
                            viewport.width,
                            viewport.height,
                            0.0,
                            1.0,
                        );
                    }
                    if let Some(body) = pass.exec {
                        let scope = ResolveScope {
                            pass_name: pass.debug_name.clone(),
                            declared: pass.resolve_inputs.clone(),
                            available: produced.iter().map(|p| p.map(|(_, v)| v)).collect(),
                        };
                        body(device, &scope);
                    }
                    device.end_render_pass();
                }
                ScheduleItem::Resolve { target, resolve } => {
                    let desc = &self.targets[target.0].desc;
                    let texture = match device.create_texture(&TextureDescriptor {
                        label: Some(format!("{} resolve", self.targets[target.0].label)),
                        width: desc.width,
                        height: desc.height,
                        sample_count: 1,
                        format: desc.format,
                        usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
                    }) {
                        Ok(texture) => texture,
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    };
                    let view = match device.create_texture_view(texture) {
                        Ok(view) => view,
                        Err(e) => {
                            device.destroy_texture(texture);
                            result = Err(e);
                            break;
                        }
                    };
                    device.copy_texture_to_texture(
                        physical[target.0].0,
                        texture,
                        desc.width,
                        desc.height,
                    );
                    produced[resolve.0] = Some((texture, view));
                }
                ScheduleItem::ResolveExternal {
                    target,
                    destination,
                } => {
                    let desc = &self.targets[target.0].desc;
                    device.copy_texture_to_texture(
                        physical[target.0].0,
                        destination,
                        desc.width,
                        desc.height,
                    );
                }
            }
        }

        for (texture, view) in physical {
            device.destroy_texture_view(view);
            device.destroy_texture(texture);
        }
        for slot in produced.into_iter().flatten() {
            device.destroy_texture_view(slot.1);
            device.destroy_texture(slot.0);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{DeviceEvent, RecordingDevice};

    fn color_desc(width: u32, height: u32, clear: Option<Color>) -> RenderTargetDescriptor {
        let mut desc = RenderTargetDescriptor::new(TextureFormat::Rgba8Unorm);
        desc.set_dimensions(width, height, 1);
        desc.clear_color = clear;
        desc
    }

    #[test]
    fn schedule_runs_in_declaration_order() {
        let mut device = RecordingDevice::new();
        let external = device.create_texture(&TextureDescriptor::default()).unwrap();

        let mut builder = PassGraphBuilder::new();
        let target = builder.create_render_target(color_desc(4, 4, None), "main color");
        builder.push_pass(|pass| {
            pass.set_debug_name("first");
            pass.attach_color_target(target);
        });
        let resolved = builder.resolve_render_target(target);
        builder.push_pass(move |pass| {
            pass.set_debug_name("second");
            pass.attach_color_target(target);
            pass.attach_resolve_texture(resolved);
            pass.exec(move |_, scope| {
                scope.resolved_texture(resolved);
            });
        });
        builder.resolve_to_external(target, external);
        builder.execute(&mut device).unwrap();

        assert_eq!(device.pass_labels(), vec!["first", "second"]);
        let copies = device
            .events()
            .iter()
            .filter(|e| matches!(e, DeviceEvent::TextureCopied { .. }))
            .count();
        assert_eq!(copies, 2);
        // Last copy is the external one.
        let last_copy = device
            .events()
            .iter()
            .rev()
            .find(|e| matches!(e, DeviceEvent::TextureCopied { .. }))
            .unwrap();
        assert!(matches!(
            last_copy,
            DeviceEvent::TextureCopied { dst, .. } if *dst == external
        ));
    }

    #[test]
    fn target_is_cleared_once_then_loaded() {
        let mut device = RecordingDevice::new();
        let external = device.create_texture(&TextureDescriptor::default()).unwrap();
        let clear = Color::new(0.25, 0.5, 0.75, 1.0);

        let mut builder = PassGraphBuilder::new();
        let target = builder.create_render_target(color_desc(4, 4, Some(clear)), "main color");
        builder.push_pass(|pass| {
            pass.set_debug_name("opaque");
            pass.attach_color_target(target);
        });
        builder.push_pass(|pass| {
            pass.set_debug_name("transparent");
            pass.attach_color_target(target);
        });
        builder.resolve_to_external(target, external);
        builder.execute(&mut device).unwrap();

        // The second pass loaded instead of clearing, so the content set by
        // the first clear survives into the external copy.
        assert_eq!(device.texture_content(external), Some(clear));
    }

    #[test]
    fn transients_are_freed_after_execution() {
        let mut device = RecordingDevice::new();
        let mut builder = PassGraphBuilder::new();
        let target = builder.create_render_target(color_desc(4, 4, None), "main color");
        builder.push_pass(|pass| {
            pass.set_debug_name("only");
            pass.attach_color_target(target);
        });
        builder.resolve_render_target(target);
        builder.execute(&mut device).unwrap();

        assert_eq!(device.live_textures(), 0);
        assert!(device.texture_allocations() >= 2);
    }

    #[test]
    #[should_panic(expected = "without attaching")]
    fn redeeming_unattached_resolve_panics() {
        let mut device = RecordingDevice::new();
        let mut builder = PassGraphBuilder::new();
        let target = builder.create_render_target(color_desc(4, 4, None), "main color");
        let resolved = builder.resolve_render_target(target);
        builder.push_pass(move |pass| {
            pass.set_debug_name("greedy");
            pass.attach_color_target(target);
            pass.exec(move |_, scope| {
                scope.resolved_texture(resolved);
            });
        });
        let _ = builder.execute(&mut device);
    }
}
