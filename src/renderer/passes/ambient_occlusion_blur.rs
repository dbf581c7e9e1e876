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

const NAME: &str = "Ambient Occlusion Blur Pass";

/// Removes the noise-tile pattern from the raw occlusion term.
/// Binding 0 is the raw SSAO result.
pub struct AmbientOcclusionBlurPass {
    runtime: Runtime,
    input: ImageBlock,
    output: ImageBlock,
    state: PassState<FullscreenResources>,
}

impl AmbientOcclusionBlurPass {
    pub fn new(runtime: Runtime, ssao_input: ImageBlock, blur_output: ImageBlock) -> Self {
        let state = PassState::new(NAME, Arc::clone(&runtime.device));
        Self {
            runtime,
            input: ssao_input,
            output: blur_output,
            state,
        }
    }

    pub fn output(&self) -> ImageBlock {
        self.output
    }
}

impl RenderPass for AmbientOcclusionBlurPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn initialize(&mut self) -> Result<()> {
        let inputs = [FullscreenInput::Image {
            view: self.input.view,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }];
        let runtime = &self.runtime;
        let desc = FullscreenPassDesc {
            name: NAME,
            fragment_shader: &runtime.shader_paths.ssao_blur_fragment,
            inputs: &inputs,
            output: self.output,
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
    use crate::renderer::passes::test_support::*;
    use crate::vulkan::ObjectKind;

    fn blur_pass(fixture: &Fixture) -> AmbientOcclusionBlurPass {
        AmbientOcclusionBlurPass::new(
            fixture.runtime.clone(),
            image(20, vk::Format::R8_UNORM),
            image(21, vk::Format::R8_UNORM),
        )
    }

    #[test]
    fn samples_ssao_result_at_binding_zero() {
        let fixture = Fixture::new();
        let mut pass = blur_pass(&fixture);
        pass.initialize().unwrap();

        let writes = fixture.device.descriptor_writes();
        assert_eq!(writes.len(), 3);
        let input_view = image(20, vk::Format::R8_UNORM).view;
        assert!(writes.iter().all(|w| w.binding == 0
            && w.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            && w.image_view == Some(input_view)));

        assert_eq!(fixture.device.live_count(ObjectKind::Sampler), 1);
        assert!(fixture
            .device
            .framebuffers()
            .iter()
            .all(|fb| fb.attachments == vec![pass.output().view]));

        let loaded = fixture.shaders.loaded();
        assert!(loaded[1].0.ends_with("ssao_blur.frag.spv"));
    }

    #[test]
    fn shutdown_releases_everything() {
        let fixture = Fixture::new();
        let mut pass = blur_pass(&fixture);
        pass.initialize().unwrap();
        pass.draw(&Frame::first()).unwrap();
        pass.shutdown();
        pass.shutdown();
        assert!(!pass.is_initialized());
        assert_released(&fixture.device);
    }

    #[test]
    fn missing_fragment_shader_fails_cleanly() {
        let fixture = Fixture::new();
        fixture.shaders.make_missing("ssao_blur.frag.spv");
        let mut pass = blur_pass(&fixture);

        assert!(matches!(
            pass.initialize(),
            Err(AshError::ShaderLoad { .. })
        ));
        // Render pass and layouts were created before the shader was needed.
        assert!(fixture.device.total_destroyed() > 0);
        assert_released(&fixture.device);
    }
}
