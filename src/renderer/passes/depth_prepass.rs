use std::sync::Arc;

use ash::vk;

use super::common::PassState;
use super::geometry::{build_geometry_pass, record_geometry_pass, GeometryPassDesc, GeometryResources};
use super::{GeometryPass, RenderPass};
use crate::error::Result;
use crate::renderer::entity::{Entity, EntityLists};
use crate::renderer::frame::Frame;
use crate::renderer::resources::ImageBlock;
use crate::renderer::runtime::Runtime;

const NAME: &str = "Depth Pre-Pass";

/// Fills the screen depth buffer ahead of shading so later passes only
/// shade visible fragments.
pub struct DepthPrePass {
    runtime: Runtime,
    depth_buffer: ImageBlock,
    entities: EntityLists,
    state: PassState<GeometryResources>,
}

impl DepthPrePass {
    pub fn new(runtime: Runtime, depth_buffer: ImageBlock) -> Self {
        let state = PassState::new(NAME, Arc::clone(&runtime.device));
        Self {
            runtime,
            depth_buffer,
            entities: EntityLists::new(),
            state,
        }
    }
}

impl RenderPass for DepthPrePass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn initialize(&mut self) -> Result<()> {
        let runtime = &self.runtime;
        let shaders = [(
            runtime.shader_paths.depth_prepass_vertex.as_str(),
            vk::ShaderStageFlags::VERTEX,
        )];
        let desc = GeometryPassDesc {
            name: NAME,
            shaders: &shaders,
            descriptor_stages: vk::ShaderStageFlags::VERTEX,
            depth_view: self.depth_buffer.view,
            depth_format: self.depth_buffer.format,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            extent: runtime.extent,
            layers: 1,
            cull_mode: vk::CullModeFlags::BACK,
            depth_bias: None,
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

impl GeometryPass for DepthPrePass {
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
