//! Ordered draw-command lists and their category partition
//!
//! Scene content reaches the frame as [`DrawCommand`]s pushed into
//! [`RenderInstructionList`]s. A list preserves push order exactly, supports
//! named texture slots that are bound after recording (for resources that
//! only exist once an earlier pass has resolved), and enforces a
//! reset-once-submit-once protocol per frame.

use crate::backend::traits::*;
use crate::backend::types::IndexFormat;
use std::borrow::Cow;

/// The draw primitive of a command
#[derive(Debug, Clone)]
pub enum DrawCall {
    Arrays {
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    },
    Indexed {
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    },
}

/// A texture + sampler binding on a draw command. Either bound up front or
/// late, through a named slot filled in by `bind_late_sampler`.
#[derive(Debug, Clone)]
pub struct TextureBinding {
    pub group: u32,
    pub view: Option<TextureViewHandle>,
    pub sampler: Option<SamplerHandle>,
    pub late_name: Option<Cow<'static, str>>,
}

impl TextureBinding {
    /// A binding resolved at record time.
    pub fn bound(group: u32, view: TextureViewHandle, sampler: SamplerHandle) -> Self {
        Self {
            group,
            view: Some(view),
            sampler: Some(sampler),
            late_name: None,
        }
    }

    /// A named slot to be filled by `bind_late_sampler` before submission.
    pub fn late(group: u32, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            group,
            view: None,
            sampler: None,
            late_name: Some(name.into()),
        }
    }

    fn is_unresolved(&self) -> bool {
        self.late_name.is_some() && (self.view.is_none() || self.sampler.is_none())
    }
}

/// One recorded draw with all the state it needs
#[derive(Debug, Clone)]
pub struct DrawCommand {
    pub pipeline: RenderPipelineHandle,
    pub bind_groups: Vec<(u32, BindGroupHandle)>,
    pub textures: Vec<TextureBinding>,
    pub vertex_buffers: Vec<(u32, BufferHandle, u64)>,
    pub index_buffer: Option<(BufferHandle, u64, IndexFormat)>,
    pub call: DrawCall,
}

impl DrawCommand {
    pub fn new(pipeline: RenderPipelineHandle, call: DrawCall) -> Self {
        Self {
            pipeline,
            bind_groups: Vec::new(),
            textures: Vec::new(),
            vertex_buffers: Vec::new(),
            index_buffer: None,
            call,
        }
    }
}

/// An ordered list of draw commands with single-submission semantics
///
/// Commands are replayed in exactly the order they were pushed. `reset`
/// rearms the list for a new frame; submitting twice without a reset in
/// between panics, as does submitting with a late slot still unbound.
#[derive(Default)]
pub struct RenderInstructionList {
    commands: Vec<DrawCommand>,
    late_bindings: Vec<(Cow<'static, str>, TextureViewHandle, SamplerHandle)>,
    submitted: bool,
}

impl RenderInstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Clear all commands and late bindings and rearm for submission.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.late_bindings.clear();
        self.submitted = false;
    }

    /// Append a draw command. Late slots already bound on this list are
    /// applied to it immediately.
    pub fn push(&mut self, mut command: DrawCommand) {
        for binding in &mut command.textures {
            if let Some(name) = &binding.late_name {
                if let Some((_, view, sampler)) =
                    self.late_bindings.iter().find(|(n, _, _)| n == name)
                {
                    binding.view = Some(*view);
                    binding.sampler = Some(*sampler);
                }
            }
        }
        self.commands.push(command);
    }

    /// Fill the named late slot on every recorded command and on commands
    /// pushed from now until the next reset.
    pub fn bind_late_sampler(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        view: TextureViewHandle,
        sampler: SamplerHandle,
    ) {
        let name = name.into();
        for command in &mut self.commands {
            for binding in &mut command.textures {
                if binding.late_name.as_ref() == Some(&name) {
                    binding.view = Some(view);
                    binding.sampler = Some(sampler);
                }
            }
        }
        self.late_bindings.retain(|(n, _, _)| *n != name);
        self.late_bindings.push((name, view, sampler));
    }

    /// Replay every command into the open render pass, in push order.
    ///
    /// Panics if the list was already submitted since its last reset or if
    /// any late slot is still unbound.
    pub fn submit(&mut self, device: &mut dyn RenderDevice) {
        assert!(
            !self.submitted,
            "render instruction list submitted twice without a reset"
        );
        self.submitted = true;
        log::trace!("submitting {} draw commands", self.commands.len());

        for command in &self.commands {
            device.set_render_pipeline(command.pipeline);
            for (index, bind_group) in &command.bind_groups {
                device.set_bind_group(*index, *bind_group);
            }
            for binding in &command.textures {
                if binding.is_unresolved() {
                    panic!(
                        "late texture slot '{}' never bound",
                        binding.late_name.as_deref().unwrap_or("")
                    );
                }
                match (binding.view, binding.sampler) {
                    (Some(view), Some(sampler)) => {
                        device.bind_texture_sampler(binding.group, view, sampler)
                    }
                    _ => panic!("texture binding missing view or sampler"),
                }
            }
            for (slot, buffer, offset) in &command.vertex_buffers {
                device.set_vertex_buffer(*slot, *buffer, *offset);
            }
            if let Some((buffer, offset, format)) = command.index_buffer {
                device.set_index_buffer(buffer, offset, format);
            }
            match &command.call {
                DrawCall::Arrays {
                    vertices,
                    instances,
                } => device.draw(vertices.clone(), instances.clone()),
                DrawCall::Indexed {
                    indices,
                    base_vertex,
                    instances,
                } => device.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
            }
        }
    }
}

/// Which of the three world sublists a command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldLayer {
    /// Drawn before the scene color is resolved.
    Opaque = 0,
    /// Drawn after the resolve, before the far layer.
    MidTransparent = 1,
    /// Drawn last.
    FarTransparent = 2,
}

/// The fixed per-frame partition of render instruction lists
#[derive(Default)]
pub struct RenderListSet {
    pub atmosphere: RenderInstructionList,
    pub skyscape: RenderInstructionList,
    pub world: [RenderInstructionList; 3],
    pub waters: RenderInstructionList,
    pub furs: RenderInstructionList,
}

impl RenderListSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world_layer(&mut self, layer: WorldLayer) -> &mut RenderInstructionList {
        &mut self.world[layer as usize]
    }

    /// Reset every list in the set.
    pub fn reset_all(&mut self) {
        self.atmosphere.reset();
        self.skyscape.reset();
        for list in &mut self.world {
            list.reset();
        }
        self.waters.reset();
        self.furs.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingDevice;
    use crate::backend::types::*;

    fn test_command(device: &mut RecordingDevice) -> DrawCommand {
        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: None,
                shader: String::new(),
                vertex_layouts: vec![],
                bind_group_layouts: vec![],
                color_format: TextureFormat::Rgba8Unorm,
                depth_format: None,
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

    fn open_pass(device: &mut RecordingDevice) {
        let texture = device.create_texture(&TextureDescriptor::default()).unwrap();
        let view = device.create_texture_view(texture).unwrap();
        device.begin_render_pass(&RenderPassDescriptor {
            label: Some("test".into()),
            color_attachment: Some(ColorAttachment {
                view,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }),
            depth_attachment: None,
        });
    }

    #[test]
    fn reset_then_submit_draws_nothing() {
        let mut device = RecordingDevice::new();
        let mut list = RenderInstructionList::new();
        let command = test_command(&mut device);
        list.push(command);
        list.reset();

        open_pass(&mut device);
        list.submit(&mut device);
        device.end_render_pass();
        assert_eq!(device.total_draws(), 0);
    }

    #[test]
    fn late_binding_applies_to_recorded_and_future_commands() {
        let mut device = RecordingDevice::new();
        let texture = device.create_texture(&TextureDescriptor::default()).unwrap();
        let view = device.create_texture_view(texture).unwrap();
        let sampler = device.create_sampler(&SamplerDescriptor::default()).unwrap();

        let mut list = RenderInstructionList::new();
        let mut before = test_command(&mut device);
        before.textures.push(TextureBinding::late(1, "scene-color"));
        list.push(before);

        list.bind_late_sampler("scene-color", view, sampler);

        let mut after = test_command(&mut device);
        after.textures.push(TextureBinding::late(1, "scene-color"));
        list.push(after);

        open_pass(&mut device);
        list.submit(&mut device);
        device.end_render_pass();

        let bound = device
            .events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    crate::backend::recording::DeviceEvent::TextureSamplerBound { .. }
                )
            })
            .count();
        assert_eq!(bound, 2);
        assert_eq!(device.total_draws(), 2);
    }

    #[test]
    #[should_panic(expected = "submitted twice")]
    fn double_submit_panics() {
        let mut device = RecordingDevice::new();
        let mut list = RenderInstructionList::new();
        open_pass(&mut device);
        list.submit(&mut device);
        list.submit(&mut device);
    }

    #[test]
    #[should_panic(expected = "never bound")]
    fn unbound_late_slot_panics() {
        let mut device = RecordingDevice::new();
        let mut list = RenderInstructionList::new();
        let mut command = test_command(&mut device);
        command.textures.push(TextureBinding::late(1, "scene-color"));
        list.push(command);
        open_pass(&mut device);
        list.submit(&mut device);
    }
}
