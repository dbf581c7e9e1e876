use ash::vk;

use super::GpuDevice;
use crate::error::{vk_context, Result};

/// Collects bindings for one descriptor set layout.
///
/// The built layout is a raw handle; the pass that built it destroys it in
/// its `shutdown`.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// Counts descriptors of `descriptor_type` declared by this layout.
    pub fn count_of(&self, descriptor_type: vk::DescriptorType) -> u32 {
        self.bindings
            .iter()
            .filter(|b| b.descriptor_type == descriptor_type)
            .map(|b| b.descriptor_count)
            .sum()
    }

    pub fn build(&self, device: &dyn GpuDevice, label: &str) -> Result<vk::DescriptorSetLayout> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        device
            .create_descriptor_set_layout(&create_info)
            .map_err(vk_context(&format!("Failed to create {label} descriptor set layout")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::{ObjectKind, RecordingDevice};

    #[test]
    fn counts_descriptors_by_type() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .add_binding(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .add_binding(
                2,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::FRAGMENT,
            );

        assert_eq!(builder.bindings().len(), 3);
        assert_eq!(builder.count_of(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 2);
        assert_eq!(builder.count_of(vk::DescriptorType::UNIFORM_BUFFER), 1);
        assert_eq!(builder.count_of(vk::DescriptorType::STORAGE_BUFFER), 0);
    }

    #[test]
    fn build_reports_failure_with_label() {
        let device = RecordingDevice::new();
        device.fail_next(ObjectKind::DescriptorSetLayout);

        let err = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
            .build(&device, "per-frame")
            .unwrap_err();

        assert!(err.to_string().contains("per-frame descriptor set layout"));
        assert_eq!(device.live_objects(), 0);
    }
}
