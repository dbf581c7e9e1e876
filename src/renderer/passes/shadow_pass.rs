use std::sync::Arc;

use ash::vk;

use super::common::PassState;
use super::geometry::{build_geometry_pass, record_geometry_pass, GeometryPassDesc, GeometryResources};
use super::{GeometryPass, RenderPass};
use crate::error::Result;
use crate::renderer::config::ShadowSettings;
use crate::renderer::entity::{Entity, EntityLists};
use crate::renderer::frame::Frame;
use crate::renderer::resources::ImageBlock;
use crate::renderer::runtime::Runtime;

const NAME: &str = "Shadow Pass";

/// Renders scene depth into every layer of a shadow-map array in one pass.
///
/// The geometry shader routes each triangle to the layers it covers using
/// the light matrices in [`crate::renderer::PerFrameData`]; the framebuffer
/// therefore has one layer per shadow map.
pub struct ShadowPass {
    runtime: Runtime,
    shadow_depth_buffer: ImageBlock,
    settings: ShadowSettings,
    entities: EntityLists,
    state: PassState<GeometryResources>,
}

impl ShadowPass {
    pub fn new(
        runtime: Runtime,
        shadow_depth_buffer: ImageBlock,
        settings: ShadowSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let state = PassState::new(NAME, Arc::clone(&runtime.device));
        Ok(Self {
            runtime,
            shadow_depth_buffer,
            settings,
            entities: EntityLists::new(),
            state,
        })
    }

    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.settings.resolution,
            height: self.settings.resolution,
        }
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn initialize(&mut self) -> Result<()> {
        let runtime = &self.runtime;
        let paths = &runtime.shader_paths;
        let shaders = [
            (paths.shadow_vertex.as_str(), vk::ShaderStageFlags::VERTEX),
            (paths.shadow_geometry.as_str(), vk::ShaderStageFlags::GEOMETRY),
        ];
        let desc = GeometryPassDesc {
            name: NAME,
            shaders: &shaders,
            descriptor_stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::GEOMETRY,
            depth_view: self.shadow_depth_buffer.view,
            depth_format: self.shadow_depth_buffer.format,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            extent: self.extent(),
            layers: self.settings.num_shadow_maps,
            // Both faces cast: closed meshes stay shadowed from inside.
            cull_mode: vk::CullModeFlags::NONE,
            depth_bias: Some((
                self.settings.depth_bias_constant,
                self.settings.depth_bias_slope,
            )),
        };
        self.state
            .initialize(|objects| build_geometry_pass(objects, runtime, &desc))
    }

    fn shutdown(&mut self) {
        self.state.shutdown();
    }

    fn draw(&mut self, frame: &Frame) -> Result<vk::CommandBuffer> {
        let pruned = self.entities.prune();
        if pruned > 0 {
            log::debug!("{NAME}: forgot {pruned} dropped entities");
        }
        let resources = self.state.resources()?;
        record_geometry_pass(&self.runtime, NAME, resources, &self.entities, frame)
    }

    fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }
}

impl GeometryPass for ShadowPass {
    fn add_entity_to_draw(&mut self, entity: &Arc<dyn Entity>) {
        self.entities.push(entity);
    }

    fn clear_entities(&mut self) {
        self.entities.clear();
    }

    fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AshError;
    use crate::renderer::material::MaterialKind;
    use crate::renderer::passes::test_support::*;
    use crate::renderer::resources::MAX_SHADOW_MAPS;
    use crate::vulkan::{ObjectKind, RecordedCommand};

    fn shadow_pass(fixture: &Fixture, settings: ShadowSettings) -> ShadowPass {
        ShadowPass::new(
            fixture.runtime.clone(),
            image(2, vk::Format::D32_SFLOAT),
            settings,
        )
        .unwrap()
    }

    #[test]
    fn framebuffer_layers_follow_shadow_map_count() {
        for (resolution, maps) in [(512, 1), (2048, 4), (4096, 3)] {
            let fixture = Fixture::new();
            let mut pass = shadow_pass(&fixture, ShadowSettings::new(resolution, maps));
            pass.initialize().unwrap();

            let framebuffers = fixture.device.framebuffers();
            assert_eq!(framebuffers.len(), 3);
            for fb in framebuffers {
                assert_eq!(fb.layers, maps);
                assert_eq!((fb.width, fb.height), (resolution, resolution));
            }
            pass.shutdown();
            assert_released(&fixture.device);
        }
    }

    #[test]
    fn pipelines_use_geometry_stage_and_depth_bias() {
        let fixture = Fixture::new();
        let mut pass = shadow_pass(&fixture, ShadowSettings::default());
        pass.initialize().unwrap();

        let pipelines = fixture.device.pipelines();
        assert_eq!(pipelines.len(), MaterialKind::COUNT);
        for pipeline in pipelines {
            assert_eq!(
                pipeline.stages,
                vec![vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::GEOMETRY]
            );
            assert_eq!(pipeline.depth_bias, Some((1.25, 1.75)));
            assert_eq!(pipeline.color_attachment_count, 0);
            assert!(pipeline.depth_test);
        }

        let render_pass = &fixture.device.render_passes()[0];
        assert_eq!(
            render_pass.final_layouts,
            vec![vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL]
        );
        assert_eq!(render_pass.formats, vec![vk::Format::D32_SFLOAT]);

        let loaded: Vec<_> = fixture
            .shaders
            .loaded()
            .into_iter()
            .map(|(_, stage)| stage)
            .collect();
        assert_eq!(
            loaded,
            vec![vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::GEOMETRY]
        );
    }

    #[test]
    fn render_area_is_shadow_resolution() {
        let fixture = Fixture::new();
        let mut pass = shadow_pass(&fixture, ShadowSettings::new(1024, 2));
        pass.initialize().unwrap();

        let command_buffer = pass.draw(&Frame::first()).unwrap();
        let commands = fixture.device.commands(command_buffer);
        assert!(commands.iter().any(|c| matches!(
            c,
            RecordedCommand::BeginRenderPass {
                width: 1024,
                height: 1024,
                ..
            }
        )));
    }

    #[test]
    fn invalid_settings_rejected_at_construction() {
        let fixture = Fixture::new();
        let too_many = MAX_SHADOW_MAPS as u32 + 2;
        for settings in [
            ShadowSettings::new(2048, 0),
            ShadowSettings::new(0, 4),
            ShadowSettings::new(2048, too_many),
        ] {
            let result = ShadowPass::new(
                fixture.runtime.clone(),
                image(2, vk::Format::D32_SFLOAT),
                settings,
            );
            assert!(matches!(result, Err(AshError::InvalidConfig(_))));
        }
        assert_eq!(fixture.device.live_objects(), 0);
    }

    #[test]
    fn missing_geometry_shader_leaves_nothing_alive() {
        let fixture = Fixture::new();
        fixture.shaders.make_missing("shadows.geom.spv");
        let mut pass = shadow_pass(&fixture, ShadowSettings::default());

        assert!(matches!(
            pass.initialize(),
            Err(AshError::ShaderLoad { .. })
        ));
        assert!(!pass.is_initialized());
        assert_released(&fixture.device);
    }

    #[test]
    fn failure_midway_rolls_back() {
        for kind in [
            ObjectKind::RenderPass,
            ObjectKind::DescriptorSetLayout,
            ObjectKind::Pipeline,
            ObjectKind::DescriptorPool,
            ObjectKind::CommandBuffer,
        ] {
            let fixture = Fixture::new();
            let mut pass = shadow_pass(&fixture, ShadowSettings::default());
            fixture.device.fail_next(kind);

            assert!(
                matches!(pass.initialize(), Err(AshError::VulkanError(_))),
                "{kind:?} failure not reported"
            );
            assert_released(&fixture.device);
        }
    }

    #[test]
    fn records_entities_by_material() {
        let fixture = Fixture::new();
        let mut pass = shadow_pass(&fixture, ShadowSettings::default());
        pass.initialize().unwrap();

        let entities = [
            entity(10, MaterialKind::Microfacets),
            entity(11, MaterialKind::Microfacets),
            entity(12, MaterialKind::Diffuse),
        ];
        for e in &entities {
            pass.add_entity_to_draw(e);
        }

        let command_buffer = pass.draw(&Frame::first()).unwrap();
        let commands = fixture.device.commands(command_buffer);
        assert_eq!(drawn_objects(&commands), vec![12, 10, 11]);

        let labels: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::BeginLabel(label) => Some(label.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            labels,
            vec![
                "Shadow Pass",
                "Shadow Pass - Diffuse",
                "Shadow Pass - Microfacets"
            ]
        );

        let begins = commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::BeginLabel(_)))
            .count();
        let ends = commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::EndLabel))
            .count();
        assert_eq!(begins, ends);

        pass.shutdown();
        assert_released(&fixture.device);
    }
}
