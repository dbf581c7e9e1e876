use std::sync::Arc;

use ash::vk;

use crate::error::{vk_context, AshError, Result};
use crate::renderer::frame::{PerFrame, FRAMES_IN_FLIGHT};
use crate::renderer::runtime::Runtime;
use crate::vulkan::descriptor_layout::DescriptorSetLayoutBuilder;
use crate::vulkan::descriptor_set::{self, DescriptorPoolPlan};
use crate::vulkan::GpuDevice;

enum Owned {
    RenderPass(vk::RenderPass),
    Framebuffer(vk::Framebuffer),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    DescriptorPool(vk::DescriptorPool),
    Sampler(vk::Sampler),
    CommandBuffers(vk::CommandPool, Vec<vk::CommandBuffer>),
}

/// Native objects created by one pass, in creation order.
///
/// Releasing walks the list backwards, so anything created later (command
/// buffers, framebuffers, the descriptor pool) goes before what it was built
/// from (pipelines, layouts, the render pass).
#[derive(Default)]
pub(crate) struct OwnedObjects {
    objects: Vec<Owned>,
}

impl OwnedObjects {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn render_pass(
        &mut self,
        device: &dyn GpuDevice,
        info: &vk::RenderPassCreateInfo<'_>,
        pass: &str,
    ) -> Result<vk::RenderPass> {
        let handle = device
            .create_render_pass(info)
            .map_err(vk_context(&format!("Failed to create render pass for {pass}")))?;
        self.objects.push(Owned::RenderPass(handle));
        Ok(handle)
    }

    pub fn framebuffer(
        &mut self,
        device: &dyn GpuDevice,
        info: &vk::FramebufferCreateInfo<'_>,
        pass: &str,
    ) -> Result<vk::Framebuffer> {
        let handle = device
            .create_framebuffer(info)
            .map_err(vk_context(&format!("Failed to create framebuffer for {pass}")))?;
        self.objects.push(Owned::Framebuffer(handle));
        Ok(handle)
    }

    pub fn set_layout(
        &mut self,
        device: &dyn GpuDevice,
        builder: &DescriptorSetLayoutBuilder,
        label: &str,
    ) -> Result<vk::DescriptorSetLayout> {
        let handle = builder.build(device, label)?;
        self.objects.push(Owned::DescriptorSetLayout(handle));
        Ok(handle)
    }

    pub fn pipeline_layout(
        &mut self,
        device: &dyn GpuDevice,
        set_layouts: &[vk::DescriptorSetLayout],
        pass: &str,
    ) -> Result<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        let handle = device
            .create_pipeline_layout(&info)
            .map_err(vk_context(&format!("Failed to create pipeline layout for {pass}")))?;
        self.objects.push(Owned::PipelineLayout(handle));
        Ok(handle)
    }

    pub fn pipeline(
        &mut self,
        device: &dyn GpuDevice,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
        pass: &str,
    ) -> Result<vk::Pipeline> {
        let handle = device
            .create_graphics_pipeline(info)
            .map_err(vk_context(&format!("Failed to create pipeline for {pass}")))?;
        self.objects.push(Owned::Pipeline(handle));
        Ok(handle)
    }

    pub fn descriptor_pool(
        &mut self,
        device: &dyn GpuDevice,
        plan: &DescriptorPoolPlan,
        pass: &str,
    ) -> Result<vk::DescriptorPool> {
        let handle = plan.create(device, pass)?;
        self.objects.push(Owned::DescriptorPool(handle));
        Ok(handle)
    }

    pub fn sampler(
        &mut self,
        device: &dyn GpuDevice,
        address_mode: vk::SamplerAddressMode,
        pass: &str,
    ) -> Result<vk::Sampler> {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .max_lod(1.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);
        let handle = device
            .create_sampler(&info)
            .map_err(vk_context(&format!("Failed to create sampler for {pass}")))?;
        self.objects.push(Owned::Sampler(handle));
        Ok(handle)
    }

    /// Allocates one primary command buffer per frame slot.
    pub fn command_buffers(
        &mut self,
        device: &dyn GpuDevice,
        pool: vk::CommandPool,
        pass: &str,
    ) -> Result<PerFrame<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(FRAMES_IN_FLIGHT as u32);
        let buffers = device
            .allocate_command_buffers(&info)
            .map_err(vk_context(&format!("Failed to allocate command buffers for {pass}")))?;
        self.objects
            .push(Owned::CommandBuffers(pool, buffers.clone()));
        PerFrame::try_from_vec(buffers)
    }

    /// Destroys everything in reverse creation order and empties the list.
    pub fn release(&mut self, device: &dyn GpuDevice) {
        while let Some(object) = self.objects.pop() {
            match object {
                Owned::RenderPass(handle) => device.destroy_render_pass(handle),
                Owned::Framebuffer(handle) => device.destroy_framebuffer(handle),
                Owned::DescriptorSetLayout(handle) => device.destroy_descriptor_set_layout(handle),
                Owned::PipelineLayout(handle) => device.destroy_pipeline_layout(handle),
                Owned::Pipeline(handle) => device.destroy_pipeline(handle),
                Owned::DescriptorPool(handle) => device.destroy_descriptor_pool(handle),
                Owned::Sampler(handle) => device.destroy_sampler(handle),
                Owned::CommandBuffers(pool, buffers) => device.free_command_buffers(pool, &buffers),
            }
        }
    }
}

/// Lifecycle shared by every pass: nothing allocated until `initialize`,
/// everything released on `shutdown` or drop.
pub(crate) struct PassState<T> {
    name: &'static str,
    device: Arc<dyn GpuDevice>,
    live: Option<(OwnedObjects, T)>,
}

impl<T> PassState<T> {
    pub fn new(name: &'static str, device: Arc<dyn GpuDevice>) -> Self {
        Self {
            name,
            device,
            live: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    /// Runs `build`; on failure everything it created is destroyed before the
    /// error is returned.
    pub fn initialize(
        &mut self,
        build: impl FnOnce(&mut OwnedObjects) -> Result<T>,
    ) -> Result<()> {
        if self.live.is_some() {
            return Err(AshError::AlreadyInitialized(self.name));
        }

        let mut objects = OwnedObjects::default();
        match build(&mut objects) {
            Ok(resources) => {
                log::info!(
                    "{} initialized ({} native objects)",
                    self.name,
                    objects.len()
                );
                self.live = Some((objects, resources));
                Ok(())
            }
            Err(e) => {
                log::error!("{} initialization failed: {e}", self.name);
                objects.release(self.device.as_ref());
                Err(e)
            }
        }
    }

    pub fn shutdown(&mut self) {
        match self.live.take() {
            Some((mut objects, _)) => {
                objects.release(self.device.as_ref());
                log::info!("{} shut down", self.name);
            }
            None => log::debug!("{} shutdown skipped: not initialized", self.name),
        }
    }

    pub fn resources(&self) -> Result<&T> {
        self.live
            .as_ref()
            .map(|(_, resources)| resources)
            .ok_or(AshError::NotInitialized(self.name))
    }
}

impl<T> Drop for PassState<T> {
    fn drop(&mut self) {
        if self.live.is_some() {
            log::warn!("{} dropped without shutdown, releasing", self.name);
            self.shutdown();
        }
    }
}

/// Per-slot command buffers and framebuffers of one render pass.
pub(crate) struct FrameTargets {
    pub render_pass: vk::RenderPass,
    pub framebuffers: PerFrame<vk::Framebuffer>,
    pub command_buffers: PerFrame<vk::CommandBuffer>,
    pub extent: vk::Extent2D,
}

impl FrameTargets {
    /// One framebuffer per slot over the same attachments.
    pub fn create(
        objects: &mut OwnedObjects,
        runtime: &Runtime,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        layers: u32,
        pass: &str,
    ) -> Result<Self> {
        let device = runtime.device();
        let framebuffers = PerFrame::try_from_fn(|_| {
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(layers);
            objects.framebuffer(device, &info, pass)
        })?;
        let command_buffers = objects.command_buffers(device, runtime.command_pool, pass)?;
        Ok(Self {
            render_pass,
            framebuffers,
            command_buffers,
            extent,
        })
    }

    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

pub(crate) fn shader_stage(
    runtime: &Runtime,
    file: &str,
    stage: vk::ShaderStageFlags,
) -> Result<vk::PipelineShaderStageCreateInfo<'static>> {
    let path = runtime.shader_paths.resolve(file);
    let module = runtime
        .shader_registry
        .load_shader(&path, stage)?;
    Ok(vk::PipelineShaderStageCreateInfo::default()
        .stage(stage)
        .module(module)
        .name(c"main"))
}

/// Resets the slot's command buffer and opens it for recording.
pub(crate) fn begin_recording(
    device: &dyn GpuDevice,
    command_buffer: vk::CommandBuffer,
    pass: &str,
) -> Result<()> {
    device
        .reset_command_buffer(command_buffer)
        .map_err(vk_context(&format!("Failed to reset command buffer in {pass}")))?;
    let begin_info = vk::CommandBufferBeginInfo::default();
    device
        .begin_command_buffer(command_buffer, &begin_info)
        .map_err(vk_context(&format!("Failed to begin command buffer in {pass}")))
}

pub(crate) fn end_recording(
    device: &dyn GpuDevice,
    command_buffer: vk::CommandBuffer,
    pass: &str,
) -> Result<()> {
    device
        .end_command_buffer(command_buffer)
        .map_err(vk_context(&format!("Failed to end command buffer in {pass}")))
}

pub(crate) fn viewport_state_parts(extent: vk::Extent2D) -> ([vk::Viewport; 1], [vk::Rect2D; 1]) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    ([viewport], [scissor])
}

/// Allocates one set per slot from `pool`.
pub(crate) fn allocate_per_frame_sets(
    device: &dyn GpuDevice,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<PerFrame<vk::DescriptorSet>> {
    PerFrame::try_from_fn(|_| descriptor_set::allocate_set(device, pool, layout))
}
