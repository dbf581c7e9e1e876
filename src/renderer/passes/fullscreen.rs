//! Post-process passes that shade a full-screen plane into one color target.

use ash::vk;
use glam::Vec4;

use super::common::{
    allocate_per_frame_sets, begin_recording, end_recording, shader_stage, viewport_state_parts,
    FrameTargets, OwnedObjects,
};
use crate::error::{AshError, Result};
use crate::renderer::frame::{Frame, PerFrame, FRAMES_IN_FLIGHT};
use crate::renderer::resources::{ImageBlock, PerFrameData, Vertex};
use crate::renderer::runtime::Runtime;
use crate::vulkan::descriptor_layout::DescriptorSetLayoutBuilder;
use crate::vulkan::descriptor_set::{self, DescriptorPoolPlan};

/// What a descriptor binding reads. Bindings are numbered by position.
#[derive(Clone, Copy, Debug)]
pub(crate) enum FullscreenInput {
    /// Sampled image in `SHADER_READ_ONLY_OPTIMAL`.
    Image {
        view: vk::ImageView,
        address_mode: vk::SamplerAddressMode,
    },
    /// The slot's per-frame uniform buffer.
    PerFrameUniform,
}

impl FullscreenInput {
    fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            FullscreenInput::Image { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            FullscreenInput::PerFrameUniform => vk::DescriptorType::UNIFORM_BUFFER,
        }
    }
}

pub(crate) struct FullscreenPassDesc<'a> {
    pub name: &'static str,
    pub fragment_shader: &'a str,
    pub inputs: &'a [FullscreenInput],
    pub output: ImageBlock,
    pub clear_color: [f32; 4],
}

pub(crate) struct FullscreenResources {
    pub targets: FrameTargets,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_sets: PerFrame<vk::DescriptorSet>,
    pub clear_color: [f32; 4],
}

fn set_layout(inputs: &[FullscreenInput]) -> DescriptorSetLayoutBuilder {
    inputs
        .iter()
        .enumerate()
        .fold(DescriptorSetLayoutBuilder::new(), |builder, (binding, input)| {
            builder.add_binding(
                binding as u32,
                input.descriptor_type(),
                vk::ShaderStageFlags::FRAGMENT,
            )
        })
}

fn create_color_render_pass(
    objects: &mut OwnedObjects,
    runtime: &Runtime,
    desc: &FullscreenPassDesc<'_>,
) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(desc.output.format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

    let color_references = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_references)];

    let dependencies = [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::SHADER_READ)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    objects.render_pass(runtime.device(), &render_pass_info, desc.name)
}

fn create_pipeline(
    objects: &mut OwnedObjects,
    runtime: &Runtime,
    desc: &FullscreenPassDesc<'_>,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline> {
    let stages = [
        shader_stage(
            runtime,
            &runtime.shader_paths.fullscreen_vertex,
            vk::ShaderStageFlags::VERTEX,
        )?,
        shader_stage(runtime, desc.fragment_shader, vk::ShaderStageFlags::FRAGMENT)?,
    ];

    let bindings = [Vertex::binding_description()];
    let attributes = Vertex::attribute_descriptions();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    let (viewports, scissors) = viewport_state_parts(runtime.extent);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op(vk::LogicOp::COPY)
        .attachments(&blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .base_pipeline_index(-1);

    objects.pipeline(runtime.device(), &pipeline_info, desc.name)
}

/// One sampler per distinct address mode, in first-use order.
fn create_samplers(
    objects: &mut OwnedObjects,
    runtime: &Runtime,
    desc: &FullscreenPassDesc<'_>,
) -> Result<Vec<(vk::SamplerAddressMode, vk::Sampler)>> {
    let mut samplers: Vec<(vk::SamplerAddressMode, vk::Sampler)> = Vec::new();
    for input in desc.inputs {
        if let FullscreenInput::Image { address_mode, .. } = *input {
            if samplers.iter().all(|(mode, _)| *mode != address_mode) {
                let sampler = objects.sampler(runtime.device(), address_mode, desc.name)?;
                samplers.push((address_mode, sampler));
            }
        }
    }
    Ok(samplers)
}

fn sampler_for(
    samplers: &[(vk::SamplerAddressMode, vk::Sampler)],
    address_mode: vk::SamplerAddressMode,
    binding: u32,
    pass: &str,
) -> Result<vk::Sampler> {
    samplers
        .iter()
        .find(|(mode, _)| *mode == address_mode)
        .map(|(_, sampler)| *sampler)
        .ok_or_else(|| {
            AshError::VulkanError(format!(
                "No {address_mode:?} sampler for binding {binding} of {pass}"
            ))
        })
}

pub(crate) fn build_fullscreen_pass(
    objects: &mut OwnedObjects,
    runtime: &Runtime,
    desc: &FullscreenPassDesc<'_>,
) -> Result<FullscreenResources> {
    runtime.validate_image_count()?;
    let device = runtime.device();

    let render_pass = create_color_render_pass(objects, runtime, desc)?;
    let layout_builder = set_layout(desc.inputs);
    let set_layout = objects.set_layout(device, &layout_builder, desc.name)?;
    let layout = objects.pipeline_layout(device, &[set_layout], desc.name)?;
    let pipeline = create_pipeline(objects, runtime, desc, render_pass, layout)?;
    let samplers = create_samplers(objects, runtime, desc)?;

    let mut plan = DescriptorPoolPlan::new();
    plan.reserve(&layout_builder, FRAMES_IN_FLIGHT as u32);
    let pool = objects.descriptor_pool(device, &plan, desc.name)?;
    let descriptor_sets = allocate_per_frame_sets(device, pool, set_layout)?;

    for (slot, set) in descriptor_sets.iter() {
        for (binding, input) in desc.inputs.iter().enumerate() {
            let binding = binding as u32;
            match *input {
                FullscreenInput::Image { view, address_mode } => {
                    let sampler = sampler_for(&samplers, address_mode, binding, desc.name)?;
                    descriptor_set::write_image(
                        device,
                        *set,
                        binding,
                        view,
                        sampler,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    );
                }
                FullscreenInput::PerFrameUniform => descriptor_set::write_buffer(
                    device,
                    *set,
                    binding,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    runtime.per_frame_buffers[slot],
                    PerFrameData::SIZE,
                ),
            }
        }
    }

    let targets = FrameTargets::create(
        objects,
        runtime,
        render_pass,
        &[desc.output.view],
        runtime.extent,
        1,
        desc.name,
    )?;

    Ok(FullscreenResources {
        targets,
        pipeline,
        layout,
        descriptor_sets,
        clear_color: desc.clear_color,
    })
}

pub(crate) fn record_fullscreen_pass(
    runtime: &Runtime,
    name: &str,
    resources: &FullscreenResources,
    frame: &Frame,
) -> Result<vk::CommandBuffer> {
    let device = runtime.device();
    let targets = &resources.targets;
    let command_buffer = targets.command_buffers[frame.slot];

    begin_recording(device, command_buffer, name)?;

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: resources.clear_color,
        },
    }];
    let render_pass_begin = vk::RenderPassBeginInfo::default()
        .render_pass(targets.render_pass)
        .framebuffer(targets.framebuffers[frame.slot])
        .render_area(targets.render_area())
        .clear_values(&clear_values);

    device.cmd_begin_label(command_buffer, name, Vec4::new(0.3, 0.3, 0.6, 1.0));
    device.cmd_begin_render_pass(command_buffer, &render_pass_begin);
    device.cmd_bind_pipeline(command_buffer, resources.pipeline);
    device.cmd_bind_descriptor_sets(
        command_buffer,
        resources.layout,
        0,
        &[resources.descriptor_sets[frame.slot]],
    );
    runtime.fullscreen_plane.draw(device, command_buffer, frame)?;
    device.cmd_end_render_pass(command_buffer);
    device.cmd_end_label(command_buffer);

    end_recording(device, command_buffer, name)?;
    log::trace!("{name}: recorded frame {} in slot {}", frame.number, frame.slot.index());
    Ok(command_buffer)
}
