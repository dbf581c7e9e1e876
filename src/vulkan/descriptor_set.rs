use ash::vk;

use super::descriptor_layout::DescriptorSetLayoutBuilder;
use super::GpuDevice;
use crate::error::{vk_context, AshError, Result};

/// Sizes a descriptor pool from the layouts it will serve.
///
/// Each call to [`DescriptorPoolPlan::reserve`] accounts for `copies` sets of
/// the given layout, so the pool holds exactly what the pass allocates.
#[derive(Debug, Default)]
pub struct DescriptorPoolPlan {
    max_sets: u32,
    sizes: Vec<vk::DescriptorPoolSize>,
}

impl DescriptorPoolPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, layout: &DescriptorSetLayoutBuilder, copies: u32) -> &mut Self {
        self.max_sets += copies;
        for binding in layout.bindings() {
            let count = binding.descriptor_count * copies;
            match self
                .sizes
                .iter_mut()
                .find(|s| s.ty == binding.descriptor_type)
            {
                Some(size) => size.descriptor_count += count,
                None => self.sizes.push(
                    vk::DescriptorPoolSize::default()
                        .ty(binding.descriptor_type)
                        .descriptor_count(count),
                ),
            }
        }
        self
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    pub fn sizes(&self) -> &[vk::DescriptorPoolSize] {
        &self.sizes
    }

    pub fn create(&self, device: &dyn GpuDevice, label: &str) -> Result<vk::DescriptorPool> {
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(self.max_sets)
            .pool_sizes(&self.sizes);
        let pool = device
            .create_descriptor_pool(&pool_info)
            .map_err(vk_context(&format!("Failed to create {label} descriptor pool")))?;
        log::debug!(
            "Created {label} descriptor pool ({} sets, {} pool sizes)",
            self.max_sets,
            self.sizes.len()
        );
        Ok(pool)
    }
}

/// Allocates one set of `layout` from `pool`.
pub fn allocate_set(
    device: &dyn GpuDevice,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<vk::DescriptorSet> {
    let layouts = [layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    device
        .allocate_descriptor_sets(&alloc_info)
        .map_err(vk_context("Failed to allocate descriptor set"))?
        .into_iter()
        .next()
        .ok_or_else(|| AshError::VulkanError("Descriptor set allocation returned no sets".into()))
}

/// Points `binding` of `set` at a whole buffer range.
pub fn write_buffer(
    device: &dyn GpuDevice,
    set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    buffer: vk::Buffer,
    range: vk::DeviceSize,
) {
    let buffer_info = [vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(descriptor_type)
        .buffer_info(&buffer_info);
    device.update_descriptor_sets(&[write]);
}

/// Points `binding` of `set` at a sampled image.
pub fn write_image(
    device: &dyn GpuDevice,
    set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
    image_layout: vk::ImageLayout,
) {
    let image_info = [vk::DescriptorImageInfo {
        sampler,
        image_view,
        image_layout,
    }];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_info);
    device.update_descriptor_sets(&[write]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_plan_merges_descriptor_types() {
        let per_frame = DescriptorSetLayoutBuilder::new().add_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        );
        let textures = DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .add_binding(
                1,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::FRAGMENT,
            );

        let mut plan = DescriptorPoolPlan::new();
        plan.reserve(&per_frame, 3).reserve(&textures, 3);

        assert_eq!(plan.max_sets(), 6);
        let uniform = plan
            .sizes()
            .iter()
            .find(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER)
            .map(|s| s.descriptor_count);
        let sampler = plan
            .sizes()
            .iter()
            .find(|s| s.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .map(|s| s.descriptor_count);
        assert_eq!(uniform, Some(6));
        assert_eq!(sampler, Some(3));
    }
}
