//! Headless [`GpuDevice`] that records every call instead of reaching a driver.
//!
//! This enables:
//! - Testing pass lifecycles without a GPU
//! - Checking recorded command streams for ordering
//! - Benchmarking CPU-side recording cost in CI

use std::collections::{HashMap, HashSet};

use ash::{prelude::VkResult, vk, vk::Handle};
use glam::Vec4;
use parking_lot::Mutex;

use super::GpuDevice;

/// Kinds of native objects tracked by [`RecordingDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    RenderPass,
    Framebuffer,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    DescriptorPool,
    DescriptorSet,
    Sampler,
    ShaderModule,
    CommandBuffer,
}

/// One command recorded into a command buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    Begin,
    End,
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
        clear_value_count: u32,
    },
    EndRenderPass,
    BindPipeline(vk::Pipeline),
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    BeginLabel(String),
    EndLabel,
}

#[derive(Clone, Debug)]
pub struct RenderPassRecord {
    pub handle: vk::RenderPass,
    pub formats: Vec<vk::Format>,
    pub final_layouts: Vec<vk::ImageLayout>,
    pub has_depth_attachment: bool,
    pub color_attachment_count: u32,
}

#[derive(Clone, Debug)]
pub struct FramebufferRecord {
    pub handle: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub attachments: Vec<vk::ImageView>,
}

#[derive(Clone, Debug)]
pub struct PipelineRecord {
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub stages: Vec<vk::ShaderStageFlags>,
    pub depth_bias: Option<(f32, f32)>,
    pub cull_mode: vk::CullModeFlags,
    pub depth_test: bool,
    pub color_attachment_count: u32,
}

#[derive(Clone, Debug)]
pub struct DescriptorWriteRecord {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub buffer: Option<(vk::Buffer, vk::DeviceSize)>,
    pub image_view: Option<vk::ImageView>,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    live: HashMap<u64, ObjectKind>,
    created: HashMap<ObjectKind, usize>,
    destroyed: HashMap<ObjectKind, usize>,
    pool_capacity: HashMap<u64, u32>,
    pool_sets: HashMap<u64, Vec<u64>>,
    recording: HashSet<u64>,
    commands: HashMap<u64, Vec<RecordedCommand>>,
    render_passes: Vec<RenderPassRecord>,
    framebuffers: Vec<FramebufferRecord>,
    pipelines: Vec<PipelineRecord>,
    descriptor_writes: Vec<DescriptorWriteRecord>,
    fail_next: Option<ObjectKind>,
    validation_errors: Vec<String>,
}

impl State {
    fn create(&mut self, kind: ObjectKind) -> VkResult<u64> {
        if self.fail_next == Some(kind) {
            self.fail_next = None;
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.insert(raw, kind);
        *self.created.entry(kind).or_default() += 1;
        Ok(raw)
    }

    fn destroy(&mut self, kind: ObjectKind, raw: u64) {
        match self.live.get(&raw) {
            Some(live_kind) if *live_kind == kind => {
                self.live.remove(&raw);
                *self.destroyed.entry(kind).or_default() += 1;
            }
            Some(live_kind) => self
                .validation_errors
                .push(format!("destroy {kind:?} called on a live {live_kind:?} ({raw})")),
            None => self
                .validation_errors
                .push(format!("destroy {kind:?} called on unknown handle {raw}")),
        }
    }

    fn record(&mut self, command_buffer: vk::CommandBuffer, command: RecordedCommand) {
        let raw = command_buffer.as_raw();
        if !self.recording.contains(&raw) {
            self.validation_errors
                .push(format!("{command:?} recorded outside begin/end on {raw}"));
        }
        self.commands.entry(raw).or_default().push(command);
    }
}

/// A [`GpuDevice`] that hands out fake handles and records what it was asked
/// to do. Every created object is tracked until destroyed, so a balanced
/// lifecycle ends with [`RecordingDevice::live_objects`] at zero.
#[derive(Default)]
pub struct RecordingDevice {
    state: Mutex<State>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next creation of `kind` fail with `ERROR_OUT_OF_DEVICE_MEMORY`.
    pub fn fail_next(&self, kind: ObjectKind) {
        self.state.lock().fail_next = Some(kind);
    }

    pub fn live_objects(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state.lock().live.values().filter(|k| **k == kind).count()
    }

    pub fn created(&self, kind: ObjectKind) -> usize {
        self.state.lock().created.get(&kind).copied().unwrap_or(0)
    }

    pub fn destroyed(&self, kind: ObjectKind) -> usize {
        self.state.lock().destroyed.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_destroyed(&self) -> usize {
        self.state.lock().destroyed.values().sum()
    }

    pub fn commands(&self, command_buffer: vk::CommandBuffer) -> Vec<RecordedCommand> {
        self.state
            .lock()
            .commands
            .get(&command_buffer.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn render_passes(&self) -> Vec<RenderPassRecord> {
        self.state.lock().render_passes.clone()
    }

    pub fn framebuffers(&self) -> Vec<FramebufferRecord> {
        self.state.lock().framebuffers.clone()
    }

    pub fn pipelines(&self) -> Vec<PipelineRecord> {
        self.state.lock().pipelines.clone()
    }

    pub fn descriptor_writes(&self) -> Vec<DescriptorWriteRecord> {
        self.state.lock().descriptor_writes.clone()
    }

    /// Misuse detected so far: unknown handles destroyed, commands recorded
    /// outside begin/end, pools overrun.
    pub fn validation_errors(&self) -> Vec<String> {
        self.state.lock().validation_errors.clone()
    }
}

impl GpuDevice for RecordingDevice {
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        let mut state = self.state.lock();
        let handle = vk::RenderPass::from_raw(state.create(ObjectKind::RenderPass)?);
        let attachments = unsafe { slice_or_empty(info.p_attachments, info.attachment_count) };
        let subpasses = unsafe { slice_or_empty(info.p_subpasses, info.subpass_count) };
        state.render_passes.push(RenderPassRecord {
            handle,
            formats: attachments.iter().map(|a| a.format).collect(),
            final_layouts: attachments.iter().map(|a| a.final_layout).collect(),
            has_depth_attachment: subpasses
                .iter()
                .any(|s| !s.p_depth_stencil_attachment.is_null()),
            color_attachment_count: subpasses.iter().map(|s| s.color_attachment_count).sum(),
        });
        Ok(handle)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state
            .lock()
            .destroy(ObjectKind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.lock();
        let handle = vk::Framebuffer::from_raw(state.create(ObjectKind::Framebuffer)?);
        let attachments = unsafe { slice_or_empty(info.p_attachments, info.attachment_count) };
        state.framebuffers.push(FramebufferRecord {
            handle,
            render_pass: info.render_pass,
            width: info.width,
            height: info.height,
            layers: info.layers,
            attachments: attachments.to_vec(),
        });
        Ok(handle)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state
            .lock()
            .destroy(ObjectKind::Framebuffer, framebuffer.as_raw());
    }

    fn create_descriptor_set_layout(
        &self,
        _info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let raw = self.state.lock().create(ObjectKind::DescriptorSetLayout)?;
        Ok(vk::DescriptorSetLayout::from_raw(raw))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state
            .lock()
            .destroy(ObjectKind::DescriptorSetLayout, layout.as_raw());
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        let raw = self.state.lock().create(ObjectKind::PipelineLayout)?;
        Ok(vk::PipelineLayout::from_raw(raw))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state
            .lock()
            .destroy(ObjectKind::PipelineLayout, layout.as_raw());
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let mut state = self.state.lock();
        let handle = vk::Pipeline::from_raw(state.create(ObjectKind::Pipeline)?);
        let stages = unsafe { slice_or_empty(info.p_stages, info.stage_count) };
        let raster = unsafe { info.p_rasterization_state.as_ref() };
        let depth_stencil = unsafe { info.p_depth_stencil_state.as_ref() };
        let blend = unsafe { info.p_color_blend_state.as_ref() };
        state.pipelines.push(PipelineRecord {
            handle,
            layout: info.layout,
            render_pass: info.render_pass,
            stages: stages.iter().map(|s| s.stage).collect(),
            depth_bias: raster
                .filter(|r| r.depth_bias_enable == vk::TRUE)
                .map(|r| (r.depth_bias_constant_factor, r.depth_bias_slope_factor)),
            cull_mode: raster.map(|r| r.cull_mode).unwrap_or_default(),
            depth_test: depth_stencil.is_some_and(|d| d.depth_test_enable == vk::TRUE),
            color_attachment_count: blend.map_or(0, |b| b.attachment_count),
        });
        Ok(handle)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state
            .lock()
            .destroy(ObjectKind::Pipeline, pipeline.as_raw());
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        let mut state = self.state.lock();
        let raw = state.create(ObjectKind::DescriptorPool)?;
        state.pool_capacity.insert(raw, info.max_sets);
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock();
        let raw = pool.as_raw();
        for set in state.pool_sets.remove(&raw).unwrap_or_default() {
            state.destroy(ObjectKind::DescriptorSet, set);
        }
        state.pool_capacity.remove(&raw);
        state.destroy(ObjectKind::DescriptorPool, raw);
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut state = self.state.lock();
        let pool = info.descriptor_pool.as_raw();
        let capacity = state.pool_capacity.get(&pool).copied().unwrap_or(0);
        let used = state.pool_sets.get(&pool).map_or(0, Vec::len) as u32;
        if used + info.descriptor_set_count > capacity {
            state
                .validation_errors
                .push(format!("descriptor pool {pool} exhausted ({capacity} sets)"));
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        let mut sets = Vec::with_capacity(info.descriptor_set_count as usize);
        for _ in 0..info.descriptor_set_count {
            let raw = state.create(ObjectKind::DescriptorSet)?;
            state.pool_sets.entry(pool).or_default().push(raw);
            sets.push(vk::DescriptorSet::from_raw(raw));
        }
        Ok(sets)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        let mut state = self.state.lock();
        for write in writes {
            let buffers = unsafe { slice_or_empty(write.p_buffer_info, write.descriptor_count) };
            let images = unsafe { slice_or_empty(write.p_image_info, write.descriptor_count) };
            state.descriptor_writes.push(DescriptorWriteRecord {
                set: write.dst_set,
                binding: write.dst_binding,
                descriptor_type: write.descriptor_type,
                buffer: buffers.first().map(|b| (b.buffer, b.range)),
                image_view: images.first().map(|i| i.image_view),
            });
        }
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        let raw = self.state.lock().create(ObjectKind::Sampler)?;
        Ok(vk::Sampler::from_raw(raw))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state
            .lock()
            .destroy(ObjectKind::Sampler, sampler.as_raw());
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        if code.is_empty() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let raw = self.state.lock().create(ObjectKind::ShaderModule)?;
        Ok(vk::ShaderModule::from_raw(raw))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state
            .lock()
            .destroy(ObjectKind::ShaderModule, module.as_raw());
    }

    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        (0..info.command_buffer_count)
            .map(|_| {
                state
                    .create(ObjectKind::CommandBuffer)
                    .map(vk::CommandBuffer::from_raw)
            })
            .collect()
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        for buffer in buffers {
            let raw = buffer.as_raw();
            state.recording.remove(&raw);
            state.commands.remove(&raw);
            state.destroy(ObjectKind::CommandBuffer, raw);
        }
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.lock();
        let raw = command_buffer.as_raw();
        state.recording.remove(&raw);
        state.commands.remove(&raw);
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        _info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        let mut state = self.state.lock();
        let raw = command_buffer.as_raw();
        if state.live.get(&raw) != Some(&ObjectKind::CommandBuffer) {
            state
                .validation_errors
                .push(format!("begin on unknown command buffer {raw}"));
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        if !state.recording.insert(raw) {
            state
                .validation_errors
                .push(format!("begin on command buffer {raw} already recording"));
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        state.commands.insert(raw, vec![RecordedCommand::Begin]);
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.lock();
        state.record(command_buffer, RecordedCommand::End);
        state.recording.remove(&command_buffer.as_raw());
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
    ) {
        self.state.lock().record(
            command_buffer,
            RecordedCommand::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                width: info.render_area.extent.width,
                height: info.render_area.extent.height,
                clear_value_count: info.clear_value_count,
            },
        );
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.state.lock().record(
            command_buffer,
            RecordedCommand::BindDescriptorSets {
                layout,
                first_set,
                sets: sets.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        _offsets: &[vk::DeviceSize],
    ) {
        self.state.lock().record(
            command_buffer,
            RecordedCommand::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
            },
        );
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        _offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.state.lock().record(
            command_buffer,
            RecordedCommand::BindIndexBuffer { buffer, index_type },
        );
    }

    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.state.lock().record(
            command_buffer,
            RecordedCommand::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            },
        );
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.state.lock().record(
            command_buffer,
            RecordedCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            },
        );
    }

    fn cmd_begin_label(&self, command_buffer: vk::CommandBuffer, name: &str, _color: Vec4) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::BeginLabel(name.to_owned()));
    }

    fn cmd_end_label(&self, command_buffer: vk::CommandBuffer) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::EndLabel);
    }
}

/// Views a Vulkan `(pointer, count)` pair as a slice.
///
/// # Safety
/// `ptr` must be null or point to `count` initialized values that outlive the
/// returned slice.
unsafe fn slice_or_empty<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, count as usize)
    }
}
