use std::sync::Arc;

use ash::vk;

use super::config::ShaderPaths;
use super::entity::Drawable;
use super::frame::{PerFrame, FRAMES_IN_FLIGHT};
use crate::error::{AshError, Result};
use crate::vulkan::{GpuDevice, ShaderRegistry};

/// Everything a pass borrows from the engine that owns it.
///
/// Handles here are owned elsewhere (device, command pool, uniform buffers,
/// the full-screen plane); passes only reference them.
#[derive(Clone)]
pub struct Runtime {
    pub device: Arc<dyn GpuDevice>,
    pub command_pool: vk::CommandPool,
    /// Swapchain extent used by screen-sized passes.
    pub extent: vk::Extent2D,
    pub swapchain_image_count: usize,
    pub shader_registry: Arc<dyn ShaderRegistry>,
    pub shader_paths: ShaderPaths,
    /// Uniform buffer holding one [`super::PerFrameData`] per slot.
    pub per_frame_buffers: PerFrame<vk::Buffer>,
    /// Storage buffer holding [`super::MAX_OBJECTS`] [`super::PerObjectData`] per slot.
    pub per_object_buffers: PerFrame<vk::Buffer>,
    /// Screen-covering quad drawn by post-process passes.
    pub fullscreen_plane: Arc<dyn Drawable>,
}

impl Runtime {
    pub fn device(&self) -> &dyn GpuDevice {
        self.device.as_ref()
    }

    /// Per-frame resources are sized to the swapchain image count, so both
    /// must agree before anything is allocated.
    pub fn validate_image_count(&self) -> Result<()> {
        if self.swapchain_image_count != FRAMES_IN_FLIGHT {
            return Err(AshError::FrameCountMismatch {
                expected: FRAMES_IN_FLIGHT,
                actual: self.swapchain_image_count,
            });
        }
        Ok(())
    }
}
