use std::sync::Arc;

use ash::vk;

use super::common::PassState;
use super::fullscreen::{
    build_fullscreen_pass, record_fullscreen_pass, FullscreenInput, FullscreenPassDesc,
    FullscreenResources,
};
use super::RenderPass;
use crate::error::Result;
use crate::renderer::frame::Frame;
use crate::renderer::resources::ImageBlock;
use crate::renderer::runtime::Runtime;

const NAME: &str = "Ambient Occlusion Pass";

/// Screen-space ambient occlusion from the G-buffer.
///
/// Descriptor bindings, all read in the fragment stage:
/// 0. position/depth attachment
/// 1. normal attachment
/// 2. tiled rotation noise, sampled with repeat addressing
/// 3. per-frame uniforms (projection for sample reprojection)
pub struct AmbientOcclusionPass {
    runtime: Runtime,
    normal: ImageBlock,
    position: ImageBlock,
    noise: ImageBlock,
    output: ImageBlock,
    state: PassState<FullscreenResources>,
}

impl AmbientOcclusionPass {
    pub fn new(
        runtime: Runtime,
        normal: ImageBlock,
        position: ImageBlock,
        noise: ImageBlock,
        output: ImageBlock,
    ) -> Self {
        let state = PassState::new(NAME, Arc::clone(&runtime.device));
        Self {
            runtime,
            normal,
            position,
            noise,
            output,
            state,
        }
    }

    /// The occlusion target this pass renders into.
    pub fn output(&self) -> ImageBlock {
        self.output
    }
}

impl RenderPass for AmbientOcclusionPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn initialize(&mut self) -> Result<()> {
        let inputs = [
            FullscreenInput::Image {
                view: self.position.view,
                address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            },
            FullscreenInput::Image {
                view: self.normal.view,
                address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            },
            FullscreenInput::Image {
                view: self.noise.view,
                address_mode: vk::SamplerAddressMode::REPEAT,
            },
            FullscreenInput::PerFrameUniform,
        ];
        let runtime = &self.runtime;
        let desc = FullscreenPassDesc {
            name: NAME,
            fragment_shader: &runtime.shader_paths.ssao_fragment,
            inputs: &inputs,
            output: self.output,
            // Unoccluded.
            clear_color: [1.0; 4],
        };
        self.state
            .initialize(|objects| build_fullscreen_pass(objects, runtime, &desc))
    }

    fn shutdown(&mut self) {
        self.state.shutdown();
    }

    fn draw(&mut self, frame: &Frame) -> Result<vk::CommandBuffer> {
        let resources = self.state.resources()?;
        record_fullscreen_pass(&self.runtime, NAME, resources, frame)
    }

    fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AshError;
    use crate::renderer::frame::FrameSlot;
    use crate::renderer::passes::test_support::*;
    use crate::vulkan::{ObjectKind, RecordedCommand};

    const NORMAL: u64 = 10;
    const POSITION: u64 = 11;
    const NOISE: u64 = 12;
    const OUTPUT: u64 = 13;

    fn ao_pass(fixture: &Fixture) -> AmbientOcclusionPass {
        AmbientOcclusionPass::new(
            fixture.runtime.clone(),
            image(NORMAL, vk::Format::R16G16B16A16_SFLOAT),
            image(POSITION, vk::Format::R16G16B16A16_SFLOAT),
            image(NOISE, vk::Format::R16G16_SFLOAT),
            image(OUTPUT, vk::Format::R8_UNORM),
        )
    }

    #[test]
    fn initialize_wires_gbuffer_bindings() {
        let fixture = Fixture::new();
        let mut pass = ao_pass(&fixture);
        pass.initialize().unwrap();

        let device = &fixture.device;
        assert_eq!(device.live_count(ObjectKind::Framebuffer), 3);
        assert_eq!(device.live_count(ObjectKind::CommandBuffer), 3);
        assert_eq!(device.live_count(ObjectKind::DescriptorSet), 3);
        assert_eq!(device.live_count(ObjectKind::Pipeline), 1);
        // Clamp for the G-buffer, repeat for the noise tile.
        assert_eq!(device.live_count(ObjectKind::Sampler), 2);

        let writes = device.descriptor_writes();
        assert_eq!(writes.len(), 4 * 3);
        let view_at = |binding: u32| {
            writes
                .iter()
                .find(|w| w.binding == binding)
                .and_then(|w| w.image_view)
        };
        assert_eq!(view_at(0), Some(image(POSITION, vk::Format::UNDEFINED).view));
        assert_eq!(view_at(1), Some(image(NORMAL, vk::Format::UNDEFINED).view));
        assert_eq!(view_at(2), Some(image(NOISE, vk::Format::UNDEFINED).view));

        for slot in FrameSlot::all() {
            let uniform = fixture.runtime.per_frame_buffers[slot];
            assert!(writes.iter().any(|w| w.binding == 3
                && w.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER
                && w.buffer.map(|(b, _)| b) == Some(uniform)));
        }
    }

    #[test]
    fn renders_into_output_for_sampling() {
        let fixture = Fixture::new();
        let mut pass = ao_pass(&fixture);
        pass.initialize().unwrap();

        let render_pass = &fixture.device.render_passes()[0];
        assert_eq!(render_pass.formats, vec![vk::Format::R8_UNORM]);
        assert_eq!(
            render_pass.final_layouts,
            vec![vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL]
        );
        assert_eq!(render_pass.color_attachment_count, 1);
        assert!(!render_pass.has_depth_attachment);

        let output_view = pass.output().view;
        assert!(fixture
            .device
            .framebuffers()
            .iter()
            .all(|fb| fb.attachments == vec![output_view] && fb.layers == 1));

        let pipeline = &fixture.device.pipelines()[0];
        assert_eq!(
            pipeline.stages,
            vec![vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::FRAGMENT]
        );
        assert_eq!(pipeline.color_attachment_count, 1);
        assert!(!pipeline.depth_test);
    }

    #[test]
    fn draw_records_one_fullscreen_plane() {
        let fixture = Fixture::new();
        let mut pass = ao_pass(&fixture);
        pass.initialize().unwrap();

        let command_buffer = pass.draw(&Frame::first()).unwrap();
        let commands = fixture.device.commands(command_buffer);
        let structure = skeleton(&commands);
        assert_eq!(structure.len(), 4);
        assert_eq!(structure[0], RecordedCommand::Begin);
        assert_eq!(structure[3], RecordedCommand::End);
        assert_eq!(drawn_objects(&commands), vec![plane_mesh().object_index]);
        assert!(commands.iter().any(|c| matches!(
            c,
            RecordedCommand::BindDescriptorSets { first_set: 0, sets, .. } if sets.len() == 1
        )));
        assert!(fixture.device.validation_errors().is_empty());
    }

    #[test]
    fn lifecycle_is_balanced() {
        let fixture = Fixture::new();
        let mut pass = ao_pass(&fixture);
        pass.shutdown();
        assert_eq!(fixture.device.total_destroyed(), 0);

        assert!(matches!(
            pass.draw(&Frame::first()),
            Err(AshError::NotInitialized(NAME))
        ));

        pass.initialize().unwrap();
        assert!(matches!(
            pass.initialize(),
            Err(AshError::AlreadyInitialized(NAME))
        ));
        let mut frame = Frame::first();
        for _ in 0..4 {
            pass.draw(&frame).unwrap();
            frame = frame.next();
        }
        pass.shutdown();
        assert_released(&fixture.device);
    }

    #[test]
    fn sampler_failure_rolls_back() {
        let fixture = Fixture::new();
        let mut pass = ao_pass(&fixture);
        fixture.device.fail_next(ObjectKind::Sampler);

        assert!(matches!(pass.initialize(), Err(AshError::VulkanError(_))));
        assert!(fixture.device.created(ObjectKind::Pipeline) == 1);
        assert_released(&fixture.device);
    }
}
