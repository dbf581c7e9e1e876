//! Shared machinery of the depth-only geometry passes (depth pre-pass and
//! shadow pass): one pipeline per material, two descriptor sets per slot
//! (per-frame uniforms at set 0, per-object storage at set 1), and a draw
//! loop over the material buckets in ordinal order.

use ash::vk;
use glam::Vec4;

use super::common::{
    allocate_per_frame_sets, begin_recording, end_recording, shader_stage, viewport_state_parts,
    FrameTargets, OwnedObjects,
};
use crate::error::Result;
use crate::renderer::entity::EntityLists;
use crate::renderer::frame::{Frame, PerFrame, FRAMES_IN_FLIGHT};
use crate::renderer::material::{MaterialKind, PerMaterial};
use crate::renderer::resources::{PerFrameData, PerObjectData, Vertex};
use crate::renderer::runtime::Runtime;
use crate::vulkan::descriptor_layout::DescriptorSetLayoutBuilder;
use crate::vulkan::descriptor_set::{self, DescriptorPoolPlan};

/// How a geometry pass differs from its sibling.
pub(crate) struct GeometryPassDesc<'a> {
    pub name: &'static str,
    pub shaders: &'a [(&'a str, vk::ShaderStageFlags)],
    /// Stages that read the per-frame and per-object buffers.
    pub descriptor_stages: vk::ShaderStageFlags,
    pub depth_view: vk::ImageView,
    pub depth_format: vk::Format,
    pub final_layout: vk::ImageLayout,
    pub extent: vk::Extent2D,
    pub layers: u32,
    pub cull_mode: vk::CullModeFlags,
    /// `(constant, slope)` factors; `None` disables depth bias.
    pub depth_bias: Option<(f32, f32)>,
}

/// Pipeline and bindings for one material kind.
pub(crate) struct MaterialPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub set_layouts: [vk::DescriptorSetLayout; 2],
    /// `[per_frame, per_object]` for each slot.
    pub descriptor_sets: PerFrame<[vk::DescriptorSet; 2]>,
}

pub(crate) struct GeometryResources {
    pub targets: FrameTargets,
    pub pipelines: PerMaterial<MaterialPipeline>,
}

fn per_frame_layout(stages: vk::ShaderStageFlags) -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, stages)
}

fn per_object_layout(stages: vk::ShaderStageFlags) -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_binding(0, vk::DescriptorType::STORAGE_BUFFER, stages)
}

fn create_depth_render_pass(
    objects: &mut OwnedObjects,
    runtime: &Runtime,
    desc: &GeometryPassDesc<'_>,
) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(desc.depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(desc.final_layout)];

    let depth_reference = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .depth_stencil_attachment(&depth_reference)];

    // Previous readers must finish before the clear; later passes wait for the write.
    let dependencies = [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_stage_mask(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
            .src_access_mask(vk::AccessFlags::SHADER_READ)
            .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    objects.render_pass(runtime.device(), &render_pass_info, desc.name)
}

fn create_material_pipeline(
    objects: &mut OwnedObjects,
    runtime: &Runtime,
    desc: &GeometryPassDesc<'_>,
    render_pass: vk::RenderPass,
    stages: &[vk::PipelineShaderStageCreateInfo<'_>],
    kind: MaterialKind,
) -> Result<MaterialPipeline> {
    let device = runtime.device();
    let set_layouts = [
        objects.set_layout(
            device,
            &per_frame_layout(desc.descriptor_stages),
            &format!("{} {} per-frame", desc.name, kind.name()),
        )?,
        objects.set_layout(
            device,
            &per_object_layout(desc.descriptor_stages),
            &format!("{} {} per-object", desc.name, kind.name()),
        )?,
    ];
    let layout = objects.pipeline_layout(device, &set_layouts, desc.name)?;

    let bindings = [Vertex::binding_description()];
    let attributes = Vertex::attribute_descriptions();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let (viewports, scissors) = viewport_state_parts(desc.extent);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let mut rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(desc.cull_mode)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);
    if let Some((constant, slope)) = desc.depth_bias {
        rasterization = rasterization
            .depth_bias_enable(true)
            .depth_bias_constant_factor(constant)
            .depth_bias_clamp(0.0)
            .depth_bias_slope_factor(slope);
    }

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    // Depth only: no color attachments to blend.
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .base_pipeline_index(-1);

    let pipeline = objects.pipeline(device, &pipeline_info, desc.name)?;
    log::debug!("{} pipeline ready for {} materials", desc.name, kind.name());

    Ok(MaterialPipeline {
        pipeline,
        layout,
        set_layouts,
        descriptor_sets: PerFrame::default(),
    })
}

/// Pool sized for two sets per slot per material, then each set pointed at
/// that slot's per-frame and per-object buffers.
fn create_descriptors(
    objects: &mut OwnedObjects,
    runtime: &Runtime,
    desc: &GeometryPassDesc<'_>,
    pipelines: &mut PerMaterial<MaterialPipeline>,
) -> Result<()> {
    let device = runtime.device();
    let mut plan = DescriptorPoolPlan::new();
    for _ in MaterialKind::ALL {
        plan.reserve(&per_frame_layout(desc.descriptor_stages), FRAMES_IN_FLIGHT as u32)
            .reserve(&per_object_layout(desc.descriptor_stages), FRAMES_IN_FLIGHT as u32);
    }
    let pool = objects.descriptor_pool(device, &plan, desc.name)?;

    for (_, pipeline) in pipelines.iter_mut() {
        let per_frame_sets = allocate_per_frame_sets(device, pool, pipeline.set_layouts[0])?;
        let per_object_sets = allocate_per_frame_sets(device, pool, pipeline.set_layouts[1])?;

        for (slot, per_frame_set) in per_frame_sets.iter() {
            let per_object_set = per_object_sets[slot];
            descriptor_set::write_buffer(
                device,
                *per_frame_set,
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                runtime.per_frame_buffers[slot],
                PerFrameData::SIZE,
            );
            descriptor_set::write_buffer(
                device,
                per_object_set,
                0,
                vk::DescriptorType::STORAGE_BUFFER,
                runtime.per_object_buffers[slot],
                PerObjectData::BUFFER_RANGE,
            );
            pipeline.descriptor_sets[slot] = [*per_frame_set, per_object_set];
        }
    }
    Ok(())
}

pub(crate) fn build_geometry_pass(
    objects: &mut OwnedObjects,
    runtime: &Runtime,
    desc: &GeometryPassDesc<'_>,
) -> Result<GeometryResources> {
    runtime.validate_image_count()?;

    let stages = desc
        .shaders
        .iter()
        .map(|(file, stage)| shader_stage(runtime, file, *stage))
        .collect::<Result<Vec<_>>>()?;

    let render_pass = create_depth_render_pass(objects, runtime, desc)?;

    let mut pipelines = PerMaterial::try_from_fn(|kind| {
        create_material_pipeline(objects, runtime, desc, render_pass, &stages, kind)
    })?;

    create_descriptors(objects, runtime, desc, &mut pipelines)?;

    let targets = FrameTargets::create(
        objects,
        runtime,
        render_pass,
        &[desc.depth_view],
        desc.extent,
        desc.layers,
        desc.name,
    )?;

    Ok(GeometryResources { targets, pipelines })
}

/// Records one frame: every material bucket in ordinal order, entities in
/// insertion order.
pub(crate) fn record_geometry_pass(
    runtime: &Runtime,
    name: &str,
    resources: &GeometryResources,
    entities: &EntityLists,
    frame: &Frame,
) -> Result<vk::CommandBuffer> {
    let device = runtime.device();
    let targets = &resources.targets;
    let command_buffer = targets.command_buffers[frame.slot];

    begin_recording(device, command_buffer, name)?;

    let clear_values = [vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.0,
            stencil: 0,
        },
    }];
    let render_pass_begin = vk::RenderPassBeginInfo::default()
        .render_pass(targets.render_pass)
        .framebuffer(targets.framebuffers[frame.slot])
        .render_area(targets.render_area())
        .clear_values(&clear_values);

    device.cmd_begin_label(command_buffer, name, Vec4::new(0.1, 0.1, 0.1, 1.0));
    device.cmd_begin_render_pass(command_buffer, &render_pass_begin);

    let mut drawn = 0usize;
    for (kind, pipeline) in resources.pipelines.iter() {
        device.cmd_begin_label(
            command_buffer,
            &format!("{name} - {}", kind.name()),
            Vec4::new(0.2, 0.2, 0.2, 1.0),
        );
        device.cmd_bind_pipeline(command_buffer, pipeline.pipeline);
        device.cmd_bind_descriptor_sets(
            command_buffer,
            pipeline.layout,
            0,
            &pipeline.descriptor_sets[frame.slot],
        );
        for entity in entities.live(kind) {
            entity.draw(device, command_buffer, frame)?;
            drawn += 1;
        }
        device.cmd_end_label(command_buffer);
    }

    device.cmd_end_render_pass(command_buffer);
    device.cmd_end_label(command_buffer);

    end_recording(device, command_buffer, name)?;
    log::trace!(
        "{name}: recorded frame {} in slot {} ({drawn} entities)",
        frame.number,
        frame.slot.index()
    );
    Ok(command_buffer)
}
